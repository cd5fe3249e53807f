//! Append-only undo ledger.
//!
//! One JSON Lines file per run, named after the run id. Every record is
//! flushed to disk before the next filesystem change, so a crash leaves a
//! ledger describing exactly what was done. Undo consumes a ledger by
//! renaming it with an `.undone` suffix.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kinship_core::MoveAction;

use crate::error::LedgerError;

/// Extension of ledger files.
pub const LEDGER_EXTENSION: &str = "jsonl";

/// Suffix appended to consumed ledgers.
pub const CONSUMED_SUFFIX: &str = ".undone";

/// One line of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "kebab-case")]
pub enum LedgerRecord {
    /// First record of every ledger.
    Header {
        run_id: String,
        created_at: DateTime<Utc>,
        destination_root: PathBuf,
    },
    /// A directory the run created.
    DirectoryCreated { path: PathBuf },
    /// A completed move.
    Moved {
        seq: u64,
        source: PathBuf,
        destination: PathBuf,
        action: MoveAction,
    },
}

/// Run id derived from the current time.
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string()
}

/// Path of the consumed form of a ledger.
pub fn consumed_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(CONSUMED_SUFFIX);
    PathBuf::from(name)
}

/// Writes ledger records, syncing each one.
#[derive(Debug)]
pub struct LedgerWriter {
    path: PathBuf,
    run_id: String,
    file: File,
    next_seq: u64,
}

impl LedgerWriter {
    /// Create a new ledger in `dir` and write its header.
    pub fn create(dir: &Path, destination_root: &Path) -> Result<Self, LedgerError> {
        fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;

        let base = new_run_id();
        let mut attempt = 0u32;
        let (run_id, path, file) = loop {
            let run_id = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = dir.join(format!("{run_id}.{LEDGER_EXTENSION}"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (run_id, path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(LedgerError::io(&path, e)),
            }
        };

        let mut writer = Self {
            path,
            run_id: run_id.clone(),
            file,
            next_seq: 0,
        };
        writer.append(&LedgerRecord::Header {
            run_id,
            created_at: Utc::now(),
            destination_root: destination_root.to_path_buf(),
        })?;
        debug!(ledger = %writer.path.display(), "ledger created");
        Ok(writer)
    }

    /// Writer over a read-only handle, so every append fails.
    #[cfg(test)]
    pub(crate) fn unwritable(path: PathBuf) -> Self {
        fs::write(&path, "").unwrap();
        let file = File::open(&path).unwrap();
        Self {
            path,
            run_id: "unwritable".to_string(),
            file,
            next_seq: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record a created directory.
    pub fn directory_created(&mut self, path: &Path) -> Result<(), LedgerError> {
        self.append(&LedgerRecord::DirectoryCreated {
            path: path.to_path_buf(),
        })
    }

    /// Record a completed move and return its sequence number.
    pub fn moved(
        &mut self,
        source: &Path,
        destination: &Path,
        action: MoveAction,
    ) -> Result<u64, LedgerError> {
        let seq = self.next_seq;
        self.append(&LedgerRecord::Moved {
            seq,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            action,
        })?;
        self.next_seq += 1;
        Ok(seq)
    }

    fn append(&mut self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(record).map_err(|e| LedgerError::Corrupt {
            path: self.path.clone(),
            line: 0,
            message: e.to_string(),
        })?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data())
            .map_err(|e| LedgerError::io(&self.path, e))
    }
}

/// A ledger read back from disk.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub path: PathBuf,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub destination_root: PathBuf,
    /// Records after the header, in write order.
    pub records: Vec<LedgerRecord>,
}

impl Ledger {
    /// Load an unconsumed ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        if path.to_string_lossy().ends_with(CONSUMED_SUFFIX) || consumed_path(path).exists() {
            return Err(LedgerError::AlreadyConsumed {
                path: path.to_path_buf(),
            });
        }
        Self::read(path)
    }

    /// Parse a ledger file, consumed or not.
    fn read(path: &Path) -> Result<Self, LedgerError> {
        let text = fs::read_to_string(path).map_err(|e| LedgerError::io(path, e))?;
        let mut records = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: LedgerRecord =
                serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: e.to_string(),
                })?;
            records.push(record);
        }

        let mut records = records.into_iter();
        let Some(LedgerRecord::Header {
            run_id,
            created_at,
            destination_root,
        }) = records.next()
        else {
            return Err(LedgerError::MissingHeader {
                path: path.to_path_buf(),
            });
        };

        Ok(Self {
            path: path.to_path_buf(),
            run_id,
            created_at,
            destination_root,
            records: records.collect(),
        })
    }

    /// Number of moved records.
    pub fn move_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, LedgerRecord::Moved { .. }))
            .count()
    }

    /// Rename the ledger so it cannot be undone again.
    pub fn mark_consumed(&self) -> Result<PathBuf, LedgerError> {
        let target = consumed_path(&self.path);
        fs::rename(&self.path, &target).map_err(|e| LedgerError::io(&self.path, e))?;
        Ok(target)
    }
}

/// Summary of a stored ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub path: PathBuf,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub destination_root: PathBuf,
    pub moves: usize,
    pub consumed: bool,
}

/// Ledgers stored in a directory, oldest first. Unreadable files are
/// skipped.
pub fn list_ledgers(dir: &Path) -> Result<Vec<LedgerInfo>, LedgerError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LedgerError::io(dir, e)),
    };

    let mut ledgers = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = path.to_string_lossy();
        let consumed = name.ends_with(CONSUMED_SUFFIX);
        let live = name.ends_with(&format!(".{LEDGER_EXTENSION}"));
        if !consumed && !live {
            continue;
        }
        match Ledger::read(&path) {
            Ok(ledger) => ledgers.push(LedgerInfo {
                moves: ledger.move_count(),
                path: ledger.path,
                run_id: ledger.run_id,
                created_at: ledger.created_at,
                destination_root: ledger.destination_root,
                consumed,
            }),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable ledger"),
        }
    }
    ledgers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
    Ok(ledgers)
}
