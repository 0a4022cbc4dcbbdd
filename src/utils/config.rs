// @file: kline_engine/src/utils/config.rs
// @description: Application configuration with defaults for endpoints, pacing, retries and concurrency.
// @author: LAS.

use serde::Deserialize;
use config::{Config, ConfigError, File, Environment};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use crate::connectors::Endpoints;
use crate::connectors::binance_rest::FetcherSettings;
use crate::core::errors::KlineError;
use crate::utils::retry::RetryPolicy;

//
// TYPE DEFINITIONS
//

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub cache_root: PathBuf,

    // Binance URLs
    pub spot_rest_url: String,
    pub coin_margin_rest_url: String,
    pub usd_margin_rest_url: String,
    pub archive_url: String,

    // REST Pagination
    pub page_limit: usize,
    pub page_delay_ms: u64,
    pub rate_limit_cooldown_secs: u64,
    pub rate_limit_max_retries: u32,
    pub max_page_iterations: u32,
    pub request_timeout_secs: u64,

    // Bulk Downloads
    pub download_concurrency: usize,
    pub download_attempts: u32,
    pub download_retry_delay_secs: u64,
    pub batch_size: usize,
}

impl AppConfig {
    //
    // PUBLIC INTERFACE
    //

    pub fn load() -> Result<Self, ConfigError> {
        let default_cache_root: String = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("data")
            .join("market")
            .to_string_lossy()
            .into_owned();

        let builder = Config::builder()
            .set_default("log_level", "info")?
            .set_default("cache_root", default_cache_root)?

            // Binance Endpoints
            .set_default("spot_rest_url", "https://api.binance.com")?
            .set_default("coin_margin_rest_url", "https://dapi.binance.com")?
            .set_default("usd_margin_rest_url", "https://fapi.binance.com")?
            .set_default("archive_url", "https://data.binance.vision")?

            // REST Pagination
            .set_default("page_limit", 1000)?
            .set_default("page_delay_ms", 100)?
            .set_default("rate_limit_cooldown_secs", 60)?
            .set_default("rate_limit_max_retries", 10)?
            .set_default("max_page_iterations", 1000)?
            .set_default("request_timeout_secs", 30)?

            // Bulk Downloads
            .set_default("download_concurrency", 10)?
            .set_default("download_attempts", 3)?
            .set_default("download_retry_delay_secs", 5)?
            .set_default("batch_size", 10)?

            // File & Env Overrides
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("KLINE").try_parsing(true));

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn endpoints(&self) -> Result<Endpoints, KlineError> {
        Endpoints::new(
            &self.spot_rest_url,
            &self.coin_margin_rest_url,
            &self.usd_margin_rest_url,
            &self.archive_url,
        )
    }

    pub fn fetcher_settings(&self) -> FetcherSettings {
        FetcherSettings {
            page_limit: self.page_limit.max(1),
            page_delay: Duration::from_millis(self.page_delay_ms),
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            rate_limit_max_retries: self.rate_limit_max_retries,
            max_iterations: self.max_page_iterations,
        }
    }

    pub fn download_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.download_attempts,
            Duration::from_secs(self.download_retry_delay_secs),
        )
    }

    // The limiter is created here and handed to the downloader explicitly, so two
    // range requests share it only when the caller passes the same instance.
    pub fn download_limiter(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.download_concurrency.max(1)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
