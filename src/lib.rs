// @file: kline_engine/src/lib.rs
// @description: Binance kline acquisition: paginated REST walks, bulk daily archives and local range assembly.
// @author: LAS.


pub mod connectors;
pub mod core;
pub mod storage;
pub mod tests;
pub mod utils;

pub use crate::connectors::archive::ArchiveDownloader;
pub use crate::connectors::batch::BatchScheduler;
pub use crate::connectors::binance_rest::{FetcherSettings, PageFetcher};
pub use crate::connectors::{build_http_client, Endpoints};
pub use crate::core::errors::KlineError;
pub use crate::core::models::{
    Candle, CandleSeries, DownloadItem, DownloadStatus, DownloadSummary, FetchReport,
    FetchWindow, Frequency, KlineRecord, MarketSegment, PartialReason
};
pub use crate::core::orchestrator::{RangeOrchestrator, RangeRequest};
pub use crate::storage::local::LocalArchiveCache;
pub use crate::utils::config::AppConfig;
pub use crate::utils::retry::RetryPolicy;
