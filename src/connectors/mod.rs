// @file: kline_engine/src/connectors/mod.rs
// @description: Shared HTTP client factory and per-segment endpoint resolution.
// @author: LAS.

pub mod archive;
pub mod batch;
pub mod binance_rest;

use reqwest::Client;
use std::time::Duration;
use url::Url;
use crate::core::errors::KlineError;
use crate::core::models::{DownloadItem, MarketSegment};

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; BinanceKlinesFetcher/1.0)";


//
// HTTP CLIENT FACTORY
//

/// One client for the whole process. `reqwest::Client` is an `Arc` internally,
/// so the fetcher and the downloader share its connection pool through clones.
pub fn build_http_client(timeout: Duration) -> Result<Client, KlineError> {
    let client: Client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;

    Ok(client)
}


//
// ENDPOINTS
//

#[derive(Debug, Clone)]
pub struct Endpoints {
    rest_hosts: [String; 3], // indexed like MarketSegment
    archive_host: String,
}

impl Endpoints {
    pub fn new(spot: &str, coin_margin: &str, usd_margin: &str, archive: &str) -> Result<Self, KlineError> {
        Ok(Endpoints {
            rest_hosts: [
                normalize_host(spot)?,
                normalize_host(coin_margin)?,
                normalize_host(usd_margin)?,
            ],
            archive_host: normalize_host(archive)?,
        })
    }

    /// Every segment and the archive served from one host (mock servers, proxies).
    pub fn uniform(host: &str) -> Result<Self, KlineError> {
        Endpoints::new(host, host, host, host)
    }

    /// Public Binance hosts taken from the segment profile table.
    pub fn binance() -> Result<Self, KlineError> {
        Endpoints::new(
            MarketSegment::Spot.profile().default_rest_host,
            MarketSegment::CoinMargin.profile().default_rest_host,
            MarketSegment::UsdMargin.profile().default_rest_host,
            "https://data.binance.vision",
        )
    }

    pub fn rest_host(&self, market: MarketSegment) -> &str {
        &self.rest_hosts[market as usize]
    }

    // #1. REST kline endpoint, without query parameters
    pub fn kline_url(&self, market: MarketSegment) -> Result<Url, KlineError> {
        let raw: String = format!("{}{}", self.rest_host(market), market.profile().kline_path);
        parse_url(&raw)
    }

    // #2. Daily archive
    // Format: {host}/data/{prefix}/daily/klines/{SYMBOL}/{freq}/{SYMBOL}-{freq}-{date}.zip
    pub fn archive_url(&self, item: &DownloadItem) -> Result<Url, KlineError> {
        let symbol: String = item.symbol.to_uppercase();
        let raw: String = format!(
            "{}/data/{}/daily/klines/{}/{}/{}-{}-{}.zip",
            self.archive_host,
            item.market.profile().archive_prefix,
            symbol,
            item.frequency,
            symbol,
            item.frequency,
            item.date_label()
        );
        parse_url(&raw)
    }
}


//
// INTERNAL HELPERS
//

fn normalize_host(raw: &str) -> Result<String, KlineError> {
    let trimmed: &str = raw.trim().trim_end_matches('/');
    let url: Url = parse_url(trimmed)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(KlineError::InvalidEndpoint {
            url: raw.to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(trimmed.to_string())
}

fn parse_url(raw: &str) -> Result<Url, KlineError> {
    Url::parse(raw).map_err(|e| KlineError::InvalidEndpoint {
        url: raw.to_string(),
        message: e.to_string(),
    })
}
