use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::portfolio::PortfolioSnapshot;

/// Append-only JSONL persistence for portfolio snapshots.
///
/// One JSON document per line; each append is flushed so a crash loses at
/// most the snapshot being written. Resuming a run reads the last line and
/// restores the portfolio from it.
pub struct SnapshotLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SnapshotLog {
    /// Open for appending, creating the file if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(SnapshotLog {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, snapshot: &PortfolioSnapshot) -> Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All snapshots in append order. Empty files yield an empty vec.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<PortfolioSnapshot>> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let mut snapshots = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            snapshots.push(serde_json::from_str(&line)?);
        }
        Ok(snapshots)
    }

    /// The most recent snapshot, if any.
    pub fn last(path: impl AsRef<Path>) -> Result<Option<PortfolioSnapshot>> {
        let mut snapshots = Self::read_all(path)?;
        if let Some(snap) = snapshots.last() {
            info!(timestamp = snap.timestamp, "resuming from checkpoint");
        }
        Ok(snapshots.pop())
    }
}
