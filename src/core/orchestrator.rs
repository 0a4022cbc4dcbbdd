// @file: kline_engine/src/core/orchestrator.rs
// @description: Turns a date range into a contiguous, day-ordered kline series backed by the local cache.
// @author: LAS.

use chrono::NaiveDate;
use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::connectors::archive::ArchiveDownloader;
use crate::connectors::batch::BatchScheduler;
use crate::core::errors::KlineError;
use crate::core::interfaces::CacheProbe;
use crate::core::models::{
    DownloadItem, DownloadStatus, DownloadSummary, Frequency, KlineRecord, MarketSegment
};


//
// TYPE DEFINITIONS
//

/// One range request: which series and which calendar days.
#[derive(Debug, Clone)]
pub struct RangeRequest {
    pub market: MarketSegment,
    pub symbol: String,
    pub frequency: Frequency,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>, // defaults to `start`
}

impl RangeRequest {
    pub fn new(market: MarketSegment, symbol: &str, frequency: Frequency, start: NaiveDate, end: Option<NaiveDate>) -> Self {
        RangeRequest {
            market,
            symbol: symbol.to_string(),
            frequency,
            start,
            end,
        }
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.unwrap_or(self.start)
    }

    /// Every calendar day in `[start, end]`, as download items, in date order.
    pub fn items(&self) -> Result<Vec<DownloadItem>, KlineError> {
        let end: NaiveDate = self.end_date();
        if self.start > end {
            return Err(KlineError::InvalidDateRange { start: self.start, end });
        }

        let items: Vec<DownloadItem> = self.start
            .iter_days()
            .take_while(|date| *date <= end)
            .map(|date| DownloadItem {
                market: self.market,
                symbol: self.symbol.clone(),
                date,
                frequency: self.frequency.clone(),
            })
            .collect();

        Ok(items)
    }
}


//
// ORCHESTRATOR
//

pub struct RangeOrchestrator {
    cache: Arc<dyn CacheProbe>,
    downloader: ArchiveDownloader,
    scheduler: BatchScheduler,
}

impl RangeOrchestrator {
    /// The cache probed and loaded from is the one the downloader publishes into.
    pub fn new(downloader: ArchiveDownloader, batch_size: usize) -> Self {
        RangeOrchestrator {
            cache: downloader.cache().clone(),
            downloader,
            scheduler: BatchScheduler::new(batch_size),
        }
    }

    //
    // PUBLIC INTERFACE
    //

    /// Downloads whatever days of the range are not cached yet. Nothing is loaded.
    pub async fn prefetch(&self, request: &RangeRequest, cancel: &CancellationToken) -> Result<DownloadSummary, KlineError> {
        let items: Vec<DownloadItem> = request.items()?;
        Ok(self.fill_missing(&items, cancel).await)
    }

    /// Downloads the missing days, then loads every day in date order.
    ///
    /// A day that is still absent after the downloads settle is a hard
    /// [`KlineError::MissingDay`]; days are never silently dropped.
    pub async fn assemble(&self, request: &RangeRequest, cancel: &CancellationToken) -> Result<Vec<KlineRecord>, KlineError> {
        let items: Vec<DownloadItem> = request.items()?;
        let summary: DownloadSummary = self.fill_missing(&items, cancel).await;

        if summary.cancelled > 0 || cancel.is_cancelled() {
            return Err(KlineError::Cancelled);
        }

        if !summary.failed.is_empty() {
            warn!("{} day(s) failed to download: {:?}", summary.failed.len(), summary.failed);
        }

        // #1. Load in date order
        // Per-day rows are concatenated as they are; days never overlap each other.
        info!(
            "Reading {}:{} {} => {}",
            request.market, request.symbol, request.start, request.end_date()
        );

        let mut records: Vec<KlineRecord> = Vec::new();
        for item in &items {
            let day: Vec<KlineRecord> = self.cache.load_day(item).await?;
            records.extend(day);
        }

        Ok(records)
    }

    //
    // INTERNAL HELPERS
    //

    async fn fill_missing(&self, items: &[DownloadItem], cancel: &CancellationToken) -> DownloadSummary {
        let mut summary: DownloadSummary = DownloadSummary::default();
        let mut missing: Vec<DownloadItem> = Vec::new();

        // #1. Probe
        for item in items {
            if self.cache.contains(item).await {
                summary.record(item.date, &DownloadStatus::Skipped);
            } else {
                missing.push(item.clone());
            }
        }

        if missing.is_empty() {
            return summary;
        }

        let dates: Vec<String> = missing.iter().map(|item| item.date_label()).collect();
        info!("{} file(s) to download: {:?}", missing.len(), dates);

        // #2. Batches
        let downloader: &ArchiveDownloader = &self.downloader;
        let statuses: Vec<DownloadStatus> = self.scheduler
            .run(&missing, cancel, move |item| downloader.download(item, cancel))
            .await;

        for (item, status) in missing.iter().zip(statuses.iter()) {
            summary.record(item.date, status);
        }

        // Items of batches that never started
        for item in missing.iter().skip(statuses.len()) {
            summary.record(item.date, &DownloadStatus::Cancelled);
        }

        info!(
            "Downloads settled: {} downloaded, {} skipped, {} failed, {} cancelled",
            summary.downloaded, summary.skipped, summary.failed.len(), summary.cancelled
        );

        summary
    }
}
