use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::MarketDataStore;
use crate::config::interval_label;
use crate::models::{Candle, Market, Trade};
use crate::Result;

/// JSON-lines files under a data directory
///
/// ```text
/// <data_dir>/trades/<market>.jsonl
/// <data_dir>/candles/<market>_<interval>.jsonl
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    trades_path: PathBuf,
    candles_path: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl AsRef<Path>, market: &Market, interval: Duration) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            trades_path: data_dir.join("trades").join(format!("{}.jsonl", market)),
            candles_path: data_dir
                .join("candles")
                .join(format!("{}_{}.jsonl", market, interval_label(interval))),
        }
    }

    pub fn trades_path(&self) -> &Path {
        &self.trades_path
    }

    pub fn candles_path(&self) -> &Path {
        &self.candles_path
    }

    async fn append<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read every record; a missing file is empty and a torn line is skipped
    async fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping unreadable record"
                ),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl MarketDataStore for FileStore {
    async fn append_trades(&mut self, trades: &[Trade]) -> Result<()> {
        Self::append(&self.trades_path, trades).await
    }

    async fn append_candles(&mut self, candles: &[Candle]) -> Result<()> {
        Self::append(&self.candles_path, candles).await
    }

    async fn load_candles(&mut self, limit: usize) -> Result<Vec<Candle>> {
        let mut candles: Vec<Candle> = Self::read_all(&self.candles_path).await?;
        let skip = candles.len().saturating_sub(limit);
        candles.drain(..skip);
        Ok(candles)
    }

    async fn load_trades_since(&mut self, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        let trades: Vec<Trade> = Self::read_all(&self.trades_path).await?;
        Ok(trades.into_iter().filter(|t| t.timestamp >= since).collect())
    }

    async fn replace_candles(&mut self, candles: &[Candle]) -> Result<()> {
        if let Some(parent) = self.candles_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // write beside, then rename over
        let tmp = self.candles_path.with_extension("jsonl.tmp");
        let _ = fs::remove_file(&tmp).await;
        Self::append(&tmp, candles).await?;
        if candles.is_empty() {
            fs::write(&tmp, b"").await?;
        }
        fs::rename(&tmp, &self.candles_path).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("files ({})", self.candles_path.display())
    }
}
