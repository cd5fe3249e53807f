//! Progress reporting types for plan execution.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;

use kinship_core::FileFailure;

use crate::apply::ApplyReport;
use crate::error::LedgerError;
use crate::undo::UndoReport;

/// The type of operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OperationType {
    Apply,
    Undo,
}

/// Progress information for an ongoing operation.
#[derive(Debug, Clone)]
pub struct OperationProgress {
    /// The type of operation.
    pub operation_type: OperationType,
    /// Number of ledger or plan entries handled.
    pub files_completed: usize,
    /// Total number of entries to handle.
    pub files_total: usize,
    /// Number of bytes moved so far.
    pub bytes_processed: u64,
    /// The file currently being processed.
    pub current_file: Option<PathBuf>,
    /// Failures seen so far.
    pub failures: usize,
}

impl OperationProgress {
    /// Create a new progress tracker for an operation.
    pub fn new(operation_type: OperationType, files_total: usize) -> Self {
        Self {
            operation_type,
            files_completed: 0,
            files_total,
            bytes_processed: 0,
            current_file: None,
            failures: 0,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.files_total > 0 {
            (self.files_completed as f64 / self.files_total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Update the current file being processed.
    pub fn set_current_file(&mut self, path: Option<PathBuf>) {
        self.current_file = path;
    }

    /// Increment the completed count and add bytes.
    pub fn complete_file(&mut self, bytes: u64) {
        self.files_completed += 1;
        self.bytes_processed += bytes;
    }

    /// Count an entry that failed.
    pub fn fail_file(&mut self) {
        self.files_completed += 1;
        self.failures += 1;
    }
}

/// Update streamed while a plan is applied or a ledger undone.
#[derive(Debug)]
pub enum OperationUpdate {
    /// Progress update.
    Progress(OperationProgress),
    /// One entry failed; the run goes on.
    Failed(FileFailure),
    /// Apply finished.
    Applied(ApplyReport),
    /// Undo finished.
    Undone(UndoReport),
    /// The ledger could not be used; the run stopped.
    Aborted(LedgerError),
}

impl OperationUpdate {
    /// Whether this is the last update of a run.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Applied(_) | Self::Undone(_) | Self::Aborted(_))
    }
}
