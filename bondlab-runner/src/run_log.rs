//! Run log: JSONL append-only persistence of sync summaries.
//!
//! One JSON object per line, so a crash mid-write loses at most the last
//! line and the file can be tailed or streamed.

use crate::summary::SyncSummary;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Receives one summary per sync run.
pub trait RunLog: Send + Sync {
    fn record(&self, summary: &SyncSummary) -> io::Result<()>;
}

/// Discards summaries. Counters still reach `tracing` via
/// [`SyncSummary::log`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRunLog;

impl RunLog for NullRunLog {
    fn record(&self, _summary: &SyncSummary) -> io::Result<()> {
        Ok(())
    }
}

pub struct JsonlRunLog {
    path: PathBuf,
}

impl JsonlRunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every summary. Malformed lines are skipped.
    pub fn read_all(&self) -> io::Result<Vec<SyncSummary>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut entries = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SyncSummary>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %self.path.display(), line = i + 1, error = %e, "skipping malformed run log line"),
            }
        }

        Ok(entries)
    }

    /// The most recent summary, if any.
    pub fn last(&self) -> io::Result<Option<SyncSummary>> {
        Ok(self.read_all()?.pop())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLog for JsonlRunLog {
    fn record(&self, summary: &SyncSummary) -> io::Result<()> {
        let json = serde_json::to_string(summary)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        file.flush()
    }
}
