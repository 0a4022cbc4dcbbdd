// @file: kline_engine/src/connectors/archive.rs
// @description: Bounded, idempotent downloader for daily kline archives.
// @author: LAS.

use log::{error, info};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::connectors::Endpoints;
use crate::core::errors::KlineError;
use crate::core::interfaces::CacheProbe;
use crate::core::models::{DownloadItem, DownloadStatus};
use crate::utils::retry::{retry_with, RetryPolicy};


//
// DOWNLOADER
//

/// Fetches one day archive per call and publishes it through the cache.
///
/// The limiter is injected, so independent downloaders can share a single
/// transfer budget or each get their own.
#[derive(Clone)]
pub struct ArchiveDownloader {
    client: Client,
    endpoints: Endpoints,
    cache: Arc<dyn CacheProbe>,
    limiter: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl ArchiveDownloader {
    pub fn new(
        client: Client,
        endpoints: Endpoints,
        cache: Arc<dyn CacheProbe>,
        limiter: Arc<Semaphore>,
        retry: RetryPolicy,
    ) -> Self {
        ArchiveDownloader { client, endpoints, cache, limiter, retry }
    }

    pub fn cache(&self) -> &Arc<dyn CacheProbe> {
        &self.cache
    }

    //
    // PUBLIC INTERFACE
    //

    /// Idempotent: an item already in the cache is skipped without any request.
    /// Failures are reported in the returned status and never raised.
    pub async fn download(&self, item: &DownloadItem, cancel: &CancellationToken) -> DownloadStatus {
        // #1. Fast Exits
        if cancel.is_cancelled() {
            return DownloadStatus::Cancelled;
        }

        if self.cache.contains(item).await {
            info!("File already present: {}", item);
            return DownloadStatus::Skipped;
        }

        let url: Url = match self.endpoints.archive_url(item) {
            Ok(url) => url,
            Err(e) => {
                error!("Cannot build archive url for {}: {}", item, e);
                return DownloadStatus::Failed(e.to_string());
            }
        };

        // #2. Attempts
        // Only transport errors are retried. A non-2xx answer is final.
        let target: &Url = &url;
        let label: String = format!("Download of {}", item);
        let outcome: Result<usize, KlineError> = retry_with(&self.retry, cancel, &label, move |_attempt| {
            self.transfer(target, item, cancel)
        })
        .await;

        // #3. Status
        match outcome {
            Ok(bytes) => {
                info!("Downloaded {} ({} bytes)", item, bytes);
                DownloadStatus::Downloaded { bytes }
            }
            Err(KlineError::Cancelled) => {
                info!("Download of {} cancelled", item);
                DownloadStatus::Cancelled
            }
            Err(KlineError::HttpStatus { status, url }) => {
                error!("Download failed, HTTP status {}, URL: {}", status, url);
                DownloadStatus::Failed(format!("http status {}", status))
            }
            Err(e) => {
                error!("Download error: {}, URL: {}", e, url);
                DownloadStatus::Failed(e.to_string())
            }
        }
    }

    //
    // INTERNAL HELPERS
    //

    // One attempt. The permit covers the request and the write, then drops.
    async fn transfer(&self, url: &Url, item: &DownloadItem, cancel: &CancellationToken) -> Result<usize, KlineError> {
        let _permit: OwnedSemaphorePermit = tokio::select! {
            _ = cancel.cancelled() => return Err(KlineError::Cancelled),
            permit = self.limiter.clone().acquire_owned() => permit.map_err(|_| KlineError::Cancelled)?,
        };

        // Waiting for a slot can take a while
        if cancel.is_cancelled() {
            return Err(KlineError::Cancelled);
        }

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(KlineError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        self.cache.store(item, &body).await?;

        Ok(body.len())
    }
}
