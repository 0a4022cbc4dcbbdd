// @file: kline_engine/src/storage/local.rs
// @description: Filesystem cache of daily archives with atomic publication.
// @author: LAS.

use async_trait::async_trait;
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use crate::core::errors::KlineError;
use crate::core::interfaces::CacheProbe;
use crate::core::models::{DownloadItem, KlineRecord};
use crate::storage::decode::read_day_archive;


//
// CONSTANTS
//

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);


//
// CACHE
//

/// Layout: `{root}/{segment dir}/kline/{SYMBOL}_{freq}_{YYYY-MM-DD}.zip`
#[derive(Debug, Clone)]
pub struct LocalArchiveCache {
    root: PathBuf,
}

impl LocalArchiveCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalArchiveCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, item: &DownloadItem) -> PathBuf {
        let file_name: String = format!(
            "{}_{}_{}.zip",
            item.symbol.to_uppercase(),
            item.frequency,
            item.date_label()
        );

        self.root
            .join(item.market.profile().cache_dir)
            .join("kline")
            .join(file_name)
    }

    // Unique per store call: `{file}.{pid}.{seq}.part`
    fn temp_path_for(path: &Path) -> PathBuf {
        let sequence: u64 = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".{}.{}.part", std::process::id(), sequence));
        path.with_file_name(name)
    }
}

#[async_trait]
impl CacheProbe for LocalArchiveCache {
    async fn contains(&self, item: &DownloadItem) -> bool {
        match fs::metadata(self.path_for(item)).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    async fn store(&self, item: &DownloadItem, bytes: &[u8]) -> Result<(), KlineError> {
        let path: PathBuf = self.path_for(item);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // #1. Write aside, then rename into place
        let temp: PathBuf = Self::temp_path_for(&path);
        if let Err(e) = write_then_rename(&temp, &path, bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(())
    }

    async fn load_day(&self, item: &DownloadItem) -> Result<Vec<KlineRecord>, KlineError> {
        if !self.contains(item).await {
            return Err(KlineError::MissingDay {
                market: item.market,
                symbol: item.symbol.clone(),
                date: item.date,
            });
        }

        // #2. Decode off the runtime
        let path: PathBuf = self.path_for(item);
        let records: Vec<KlineRecord> = tokio::task::spawn_blocking(move || read_day_archive(&path))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))??;

        debug!("Loaded {} rows for {}", records.len(), item);
        Ok(records)
    }
}


//
// INTERNAL HELPERS
//

async fn write_then_rename(temp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file: fs::File = fs::File::create(temp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temp, path).await
}
