//! Append-only catalog journal
//!
//! One JSON object per line, each carrying a sequence number and one
//! [`CatalogOp`]. Every append is written in full and fsynced before the
//! operation is applied in memory. A record that was only partly written
//! when the process died is dropped on replay if it is the last line; a
//! malformed line anywhere else is corruption.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use vecshard_core::{Error, Result};

use crate::catalog::CatalogOp;

/// One journal line.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JournalEntry {
    pub seq: u64,
    pub op: CatalogOp,
}

/// What a replay found on disk.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    /// Entries newer than the snapshot, in order
    pub entries: Vec<JournalEntry>,
    /// True if a torn last line was skipped
    pub torn: bool,
}

/// Read every entry with `seq > after`. A missing file is an empty journal.
pub(crate) fn replay(path: &Path, after: u64) -> Result<Replay> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Replay::default()),
        Err(e) => return Err(e.into()),
    };

    let mut lines: Vec<String> = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }

    let mut replay = Replay::default();
    let last = lines.len().saturating_sub(1);
    for (n, line) in lines.iter().enumerate() {
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) if entry.seq > after => replay.entries.push(entry),
            Ok(_) => {}
            Err(e) if n == last => {
                warn!(target: "vecshard::driver", path = %path.display(), error = %e, "dropping torn journal tail");
                replay.torn = true;
            }
            Err(e) => {
                return Err(Error::persistence(format!(
                    "journal {} corrupt at line {}: {}",
                    path.display(),
                    n + 1,
                    e
                )));
            }
        }
    }
    Ok(replay)
}

/// Appender for the journal file.
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
    len: u64,
    entries: u64,
}

impl Journal {
    /// Open for appending, creating the file if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Journal {
            path,
            file,
            len,
            entries: 0,
        })
    }

    /// Entries appended since the last [`reset`](Self::reset).
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Write one entry and fsync it. On failure the file is cut back to
    /// its previous length so no partial line stays behind.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let written = self
            .file
            .write_all(&line)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            if let Err(cut) = self.file.set_len(self.len) {
                warn!(target: "vecshard::driver", path = %self.path.display(), error = %cut, "failed to cut back journal");
            }
            return Err(e.into());
        }
        self.len += line.len() as u64;
        self.entries += 1;
        Ok(())
    }

    /// Empty the journal once its entries are covered by a snapshot.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.entries = 0;
        Ok(())
    }
}
