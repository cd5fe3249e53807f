//! Reversing an applied plan from its ledger.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use kinship_core::FileFailure;

use crate::apply::move_file;
use crate::error::{InconsistencyKind, LedgerError, UndoInconsistency};
use crate::ledger::{Ledger, LedgerRecord};
use crate::progress::{OperationProgress, OperationType, OperationUpdate};

/// Result of undoing a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoReport {
    pub run_id: String,
    /// Where the consumed ledger now lives.
    pub ledger_path: PathBuf,
    pub restored: usize,
    pub bytes_restored: u64,
    pub directories_removed: usize,
    /// Created directories left behind because they were not empty.
    pub directories_kept: usize,
    pub inconsistencies: Vec<UndoInconsistency>,
    pub duration_ms: u64,
}

impl UndoReport {
    pub fn is_success(&self) -> bool {
        self.inconsistencies.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "Restored {} files, removed {} directories",
            self.restored, self.directories_removed
        );
        if !self.inconsistencies.is_empty() {
            text.push_str(&format!(", {} inconsistent", self.inconsistencies.len()));
        }
        text
    }
}

/// Undo the run recorded in `ledger_path`.
pub fn undo(ledger_path: &Path) -> Result<UndoReport, LedgerError> {
    undo_with_progress(ledger_path, |_| {})
}

/// Undo a run, reporting progress and inconsistencies as they happen.
///
/// Records are replayed newest first, so files leave a directory before
/// the directory itself is removed. The ledger is consumed even when some
/// entries could not be reversed.
pub fn undo_with_progress(
    ledger_path: &Path,
    mut on_update: impl FnMut(OperationUpdate),
) -> Result<UndoReport, LedgerError> {
    let start = Instant::now();
    let ledger = Ledger::load(ledger_path)?;
    let mut progress = OperationProgress::new(OperationType::Undo, ledger.move_count());
    let mut report = UndoReport {
        run_id: ledger.run_id.clone(),
        ledger_path: ledger.path.clone(),
        restored: 0,
        bytes_restored: 0,
        directories_removed: 0,
        directories_kept: 0,
        inconsistencies: Vec::new(),
        duration_ms: 0,
    };

    for record in ledger.records.iter().rev() {
        match record {
            LedgerRecord::Moved {
                seq,
                source,
                destination,
                ..
            } => {
                progress.set_current_file(Some(destination.clone()));
                match restore(source, destination) {
                    Ok(bytes) => {
                        debug!(seq, source = %source.display(), "restored");
                        report.restored += 1;
                        report.bytes_restored += bytes;
                        progress.complete_file(bytes);
                    }
                    Err((kind, message)) => {
                        warn!(seq, destination = %destination.display(), %kind, "cannot undo move");
                        let inconsistency = UndoInconsistency {
                            seq: *seq,
                            source: source.clone(),
                            destination: destination.clone(),
                            kind,
                            message,
                        };
                        on_update(OperationUpdate::Failed(FileFailure::from(&inconsistency)));
                        report.inconsistencies.push(inconsistency);
                        progress.fail_file();
                    }
                }
                on_update(OperationUpdate::Progress(progress.clone()));
            }
            LedgerRecord::DirectoryCreated { path } => match fs::remove_dir(path) {
                Ok(()) => report.directories_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "keeping directory");
                    report.directories_kept += 1;
                }
            },
            LedgerRecord::Header { .. } => {}
        }
    }

    report.ledger_path = ledger.mark_consumed()?;
    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        run_id = %report.run_id,
        restored = report.restored,
        inconsistent = report.inconsistencies.len(),
        "run undone"
    );
    Ok(report)
}

fn restore(source: &Path, destination: &Path) -> Result<u64, (InconsistencyKind, String)> {
    if fs::symlink_metadata(destination).is_err() {
        return Err((
            InconsistencyKind::MissingAtDestination,
            "file is no longer at its relocated path".to_string(),
        ));
    }
    if fs::symlink_metadata(source).is_ok() {
        return Err((
            InconsistencyKind::OriginalOccupied,
            "original path is occupied".to_string(),
        ));
    }
    if let Some(parent) = source.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            (
                InconsistencyKind::RestoreFailed,
                format!("Failed to recreate {}: {}", parent.display(), e),
            )
        })?;
    }
    move_file(destination, source).map_err(|reason| (InconsistencyKind::RestoreFailed, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_restore_checks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("orig/a.txt");
        let dst = temp.path().join("moved.txt");

        let (kind, _) = restore(&src, &dst).unwrap_err();
        assert_eq!(kind, InconsistencyKind::MissingAtDestination);

        fs::write(&dst, "data").unwrap();
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, "other").unwrap();
        let (kind, _) = restore(&src, &dst).unwrap_err();
        assert_eq!(kind, InconsistencyKind::OriginalOccupied);

        fs::remove_file(&src).unwrap();
        fs::remove_dir(src.parent().unwrap()).unwrap();
        assert_eq!(restore(&src, &dst).unwrap(), 4);
        assert_eq!(fs::read_to_string(&src).unwrap(), "data");
    }
}
