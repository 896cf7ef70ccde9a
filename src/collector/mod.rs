//! Signal loading, live feed collection and run archives.

pub mod feeds;

pub use feeds::FeedCollector;

use crate::config::CollectionConfig;
use crate::models::{RankedOpportunity, Signal};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A single source that could not be read. Never fatal on its own.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to fetch feed {feed}: {reason}")]
    Fetch { feed: String, reason: String },

    #[error("failed to parse feed {feed}: {source}")]
    FeedParse {
        feed: String,
        #[source]
        source: feeds::FeedParseError,
    },
}

/// JSON-backed signal source with a lookback window and per-source cap.
pub struct SignalStore {
    lookback_days: u32,
    max_signals_per_source: usize,
}

impl SignalStore {
    pub fn new(config: &CollectionConfig) -> Self {
        Self {
            lookback_days: config.lookback_days,
            max_signals_per_source: config.max_signals_per_source,
        }
    }

    /// Load signals from a JSON file or a directory of JSON files.
    ///
    /// A single file that fails to load is an error. Inside a directory,
    /// unreadable files are logged and skipped.
    pub fn load(&self, path: &Path) -> Result<Vec<Signal>> {
        if path.is_file() {
            return Ok(load_file(path)?);
        }
        if !path.is_dir() {
            anyhow::bail!("Signals path does not exist: {}", path.display());
        }

        let mut signals = Vec::new();
        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let file = entry.path();
            if !entry.file_type().is_file() || !is_signal_file(file) {
                continue;
            }

            match load_file(file) {
                Ok(loaded) => {
                    debug!("Loaded {} signals from {}", loaded.len(), file.display());
                    signals.extend(loaded);
                }
                Err(e) => warn!("Skipping {}", e),
            }
        }

        info!("Loaded {} signals from {}", signals.len(), path.display());
        Ok(signals)
    }

    /// Drop signals outside the lookback window and cap each source.
    pub fn apply_window(&self, signals: Vec<Signal>, now: DateTime<Utc>) -> Vec<Signal> {
        let cutoff = now - Duration::days(i64::from(self.lookback_days));
        let mut per_source: HashMap<String, usize> = HashMap::new();
        let total = signals.len();

        let kept: Vec<Signal> = signals
            .into_iter()
            .filter(|signal| signal.collected_at >= cutoff)
            .filter(|signal| {
                let count = per_source.entry(signal.source.clone()).or_insert(0);
                *count += 1;
                *count <= self.max_signals_per_source
            })
            .collect();

        if kept.len() < total {
            debug!(
                "Kept {} of {} signals (lookback {} days, max {} per source)",
                kept.len(),
                total,
                self.lookback_days,
                self.max_signals_per_source
            );
        }

        kept
    }
}

fn is_signal_file(path: &Path) -> bool {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let is_archived_brief = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("opportunities_"));
    is_json && !is_archived_brief
}

fn load_file(path: &Path) -> Result<Vec<Signal>, CollectionError> {
    let content = std::fs::read_to_string(path).map_err(|source| CollectionError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| CollectionError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the run's signals and ranked list under `data_dir`.
pub fn archive_run(
    data_dir: &Path,
    date: NaiveDate,
    signals: &[Signal],
    ranked: &[RankedOpportunity],
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

    let stamp = date.format("%Y%m%d");
    let signals_path = data_dir.join(format!("signals_{}.json", stamp));
    let ranked_path = data_dir.join(format!("opportunities_{}.json", stamp));

    write_json(&signals_path, signals)?;
    write_json(&ranked_path, ranked)?;

    Ok((signals_path, ranked_path))
}

/// Load a ranked list written by [`archive_run`].
pub fn load_archived_opportunities(path: &Path) -> Result<Vec<RankedOpportunity>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse archived opportunities: {}", path.display()))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize archive")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
