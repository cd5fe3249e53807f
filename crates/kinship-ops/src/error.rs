//! Error types for plan execution and undo.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use kinship_core::{FailureStage, FileFailure};

/// Ledger could not be written, read or consumed. Fatal for the run.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O error on the ledger file or directory.
    #[error("Ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be parsed.
    #[error("Corrupt ledger {path} at line {line}: {message}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The first record is not a header.
    #[error("Ledger {path} has no header")]
    MissingHeader { path: PathBuf },

    /// The ledger was already undone.
    #[error("Ledger {path} was already undone")]
    AlreadyConsumed { path: PathBuf },

    /// No ledger at the given path.
    #[error("Ledger not found: {path}")]
    NotFound { path: PathBuf },
}

impl LedgerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// A planned move that could not be performed. Earlier moves stay in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

impl MoveFailure {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MoveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {}",
            self.source.display(),
            self.destination.display(),
            self.reason
        )
    }
}

impl From<&MoveFailure> for FileFailure {
    fn from(failure: &MoveFailure) -> Self {
        FileFailure::new(
            &failure.source,
            FailureStage::Move,
            format!("to {}: {}", failure.destination.display(), failure.reason),
        )
    }
}

/// Why a ledger entry could not be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InconsistencyKind {
    /// The file is no longer at its relocated path.
    MissingAtDestination,
    /// Something now occupies the original path.
    OriginalOccupied,
    /// The file was found but could not be moved back.
    RestoreFailed,
}

/// Ledger entry that undo could not reverse. Other entries still run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoInconsistency {
    /// Sequence number of the moved record.
    pub seq: u64,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: InconsistencyKind,
    pub message: String,
}

impl fmt::Display for UndoInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} <- {}: {} ({})",
            self.seq,
            self.source.display(),
            self.destination.display(),
            self.kind,
            self.message
        )
    }
}

impl From<&UndoInconsistency> for FileFailure {
    fn from(inconsistency: &UndoInconsistency) -> Self {
        FileFailure::new(
            &inconsistency.destination,
            FailureStage::Undo,
            format!("{}: {}", inconsistency.kind, inconsistency.message),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_io_not_found() {
        let err = LedgerError::io(
            "/ledgers/x.jsonl",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[test]
    fn test_failure_conversion() {
        let failure = MoveFailure::new("/in/a.txt", "/out/a.txt", "destination exists");
        let file_failure = FileFailure::from(&failure);
        assert_eq!(file_failure.stage, FailureStage::Move);
        assert!(file_failure.reason.contains("destination exists"));

        let inconsistency = UndoInconsistency {
            seq: 3,
            source: "/in/a.txt".into(),
            destination: "/out/a.txt".into(),
            kind: InconsistencyKind::MissingAtDestination,
            message: "file is gone".into(),
        };
        let file_failure = FileFailure::from(&inconsistency);
        assert_eq!(file_failure.stage, FailureStage::Undo);
        assert!(file_failure.reason.starts_with("missing-at-destination"));
    }
}
