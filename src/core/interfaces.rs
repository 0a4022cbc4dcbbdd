// @file: kline_engine/src/core/interfaces.rs
// @description: Defines the local-cache capability the acquisition engine depends on.
// @author: LAS.

use crate::core::errors::KlineError;
use crate::core::models::{DownloadItem, KlineRecord};
use async_trait::async_trait;

//
// TRAIT DEFINITIONS
//

/// Presence, publication and loading of one day's archive.
///
/// The engine never sees paths: whatever layout the implementation uses, an item
/// is either fully materialised or absent.
#[async_trait]
pub trait CacheProbe: Send + Sync {
    // #1. Presence check used to skip downloads and to plan a range
    async fn contains(&self, item: &DownloadItem) -> bool;

    // #2. Publish downloaded bytes. Must not expose a partial file under the final name.
    async fn store(&self, item: &DownloadItem, bytes: &[u8]) -> Result<(), KlineError>;

    // #3. Load one day, derived volumes included. An absent day is `KlineError::MissingDay`.
    async fn load_day(&self, item: &DownloadItem) -> Result<Vec<KlineRecord>, KlineError>;
}
