// @file: kline_engine/src/main.rs
// @description: Command-line entry point: live REST fetches, bulk day downloads and range reads.
// @author: LAS.

use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info, warn};
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use kline_engine::core::interfaces::CacheProbe;
use kline_engine::{
    build_http_client, AppConfig, ArchiveDownloader, Endpoints, FetchReport, FetchWindow,
    Frequency, KlineError, KlineRecord, LocalArchiveCache, MarketSegment, PageFetcher,
    RangeOrchestrator, RangeRequest
};


//
// CLI DEFINITIONS
//

#[derive(Parser)]
#[command(name = "kline_engine", version, about = "Binance kline fetcher and daily archive cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk the REST endpoint over the last N hours
    Fetch(FetchArgs),
    /// Download missing daily archives into the local cache
    Download(RangeArgs),
    /// Download what is missing, then load the whole range
    Read(RangeArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// spot, coin_margin or usd_margin
    #[arg(long)]
    market: MarketSegment,
    #[arg(long)]
    symbol: String,
    #[arg(long, default_value = "1m")]
    interval: Frequency,
    #[arg(long, default_value_t = 24)]
    hours: i64,
}

#[derive(Args)]
struct RangeArgs {
    /// spot, coin_margin or usd_margin
    #[arg(long)]
    market: MarketSegment,
    #[arg(long)]
    symbol: String,
    /// First day, YYYY-MM-DD
    #[arg(long)]
    start: NaiveDate,
    /// Last day (inclusive), defaults to --start
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long, default_value = "1m")]
    interval: Frequency,
}


//
// ENTRY POINT
//

#[tokio::main]
async fn main() {
    // #1. Environment & Configuration
    dotenv().ok();
    let cli: Cli = Cli::parse();

    let config: AppConfig = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    // #2. Logger (RUST_LOG wins over the configured level)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    // #3. Ctrl-C -> Cancellation
    let cancel: CancellationToken = CancellationToken::new();
    let signal_token: CancellationToken = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight requests");
            signal_token.cancel();
        }
    });

    if let Err(e) = run(cli.command, &config, &cancel).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: &AppConfig, cancel: &CancellationToken) -> Result<(), KlineError> {
    let client: Client = build_http_client(config.request_timeout())?;
    let endpoints: Endpoints = config.endpoints()?;

    match command {
        Command::Fetch(args) => {
            let fetcher: PageFetcher = PageFetcher::new(client, endpoints, config.fetcher_settings());

            let end_time: i64 = Utc::now().timestamp_millis();
            let window: FetchWindow = FetchWindow {
                symbol: args.symbol,
                market: args.market,
                frequency: args.interval,
                start_time: end_time - args.hours.max(0) * 60 * 60 * 1000,
                end_time,
            };

            let report: FetchReport = fetcher.fetch(&window, cancel).await?;
            print_fetch_report(&report);
        }

        Command::Download(args) => {
            let orchestrator: RangeOrchestrator = build_orchestrator(config, client, endpoints);
            let request: RangeRequest = args.into_request();

            let summary = orchestrator.prefetch(&request, cancel).await?;
            println!(
                "downloaded: {}  skipped: {}  failed: {}  cancelled: {}",
                summary.downloaded, summary.skipped, summary.failed.len(), summary.cancelled
            );
            for date in &summary.failed {
                println!("  failed: {}", date);
            }
        }

        Command::Read(args) => {
            let orchestrator: RangeOrchestrator = build_orchestrator(config, client, endpoints);
            let request: RangeRequest = args.into_request();

            let records: Vec<KlineRecord> = orchestrator.assemble(&request, cancel).await?;
            println!("{} rows", records.len());
            for record in records.iter().take(5) {
                println!(
                    "{}  o={} h={} l={} c={} v={} sell_base={}",
                    format_millis(record.candle.open_time),
                    record.candle.open,
                    record.candle.high,
                    record.candle.low,
                    record.candle.close,
                    record.candle.volume,
                    record.sell_base_volume
                );
            }
        }
    }

    Ok(())
}


//
// INTERNAL HELPERS
//

impl RangeArgs {
    fn into_request(self) -> RangeRequest {
        RangeRequest::new(self.market, &self.symbol, self.interval, self.start, self.end)
    }
}

fn build_orchestrator(config: &AppConfig, client: Client, endpoints: Endpoints) -> RangeOrchestrator {
    info!("Cache root: {}", config.cache_root.display());

    let cache: Arc<dyn CacheProbe> = Arc::new(LocalArchiveCache::new(config.cache_root.clone()));
    let downloader: ArchiveDownloader = ArchiveDownloader::new(
        client,
        endpoints,
        cache,
        config.download_limiter(),
        config.download_retry_policy(),
    );

    RangeOrchestrator::new(downloader, config.batch_size)
}

fn print_fetch_report(report: &FetchReport) {
    println!("{} rows", report.candles.len());

    if let (Some(first), Some(last)) = (report.candles.first(), report.candles.last()) {
        println!("first open: {}", format_millis(first.open_time));
        println!("last open:  {}", format_millis(last.open_time));
    }

    match &report.partial {
        Some(reason) => println!("partial: {:?}", reason),
        None => println!("complete"),
    }

    if report.skipped_windows > 0 {
        println!("skipped windows: {}", report.skipped_windows);
    }
}

fn format_millis(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}
