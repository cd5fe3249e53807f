//! Applying a move plan.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kinship_core::{FileFailure, MoveAction, MovePlan, MovePlanEntry};

use crate::error::{LedgerError, MoveFailure};
use crate::ledger::LedgerWriter;
use crate::progress::{OperationProgress, OperationType, OperationUpdate};

/// Result of applying a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub run_id: String,
    pub ledger_path: PathBuf,
    /// Files moved, renamed ones included.
    pub moved: usize,
    /// Files moved under a suffixed name.
    pub renamed: usize,
    /// Files already at their destination.
    pub skipped: usize,
    pub bytes_moved: u64,
    pub directories_created: usize,
    pub failures: Vec<MoveFailure>,
    /// Stopped early; the ledger covers what was done.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ApplyReport {
    /// Check if every planned move succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// Get a human-readable summary of the run.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Moved {} files ({} renamed, {} already in place)",
            self.moved, self.renamed, self.skipped
        );
        if !self.failures.is_empty() {
            text.push_str(&format!(", {} failed", self.failures.len()));
        }
        if self.cancelled {
            text.push_str(", cancelled");
        }
        text
    }
}

/// Step failure: per-file, or fatal when the ledger cannot be written.
enum StepError {
    Move(String),
    Ledger(LedgerError),
}

impl From<LedgerError> for StepError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

/// Apply a plan, writing a new ledger into `ledger_dir`.
pub fn apply(
    plan: &MovePlan,
    ledger_dir: &Path,
    cancel: &CancellationToken,
) -> Result<ApplyReport, LedgerError> {
    apply_with_progress(plan, ledger_dir, cancel, |_| {})
}

/// Apply a plan, reporting progress and failures as they happen.
///
/// Moves run in plan order. Cancellation is checked between projects.
/// Only ledger errors stop the run.
pub fn apply_with_progress(
    plan: &MovePlan,
    ledger_dir: &Path,
    cancel: &CancellationToken,
    mut on_update: impl FnMut(OperationUpdate),
) -> Result<ApplyReport, LedgerError> {
    let ledger = LedgerWriter::create(ledger_dir, &plan.destination_root)?;
    apply_to_ledger(plan, ledger, cancel, &mut on_update)
}

fn apply_to_ledger(
    plan: &MovePlan,
    mut ledger: LedgerWriter,
    cancel: &CancellationToken,
    on_update: &mut impl FnMut(OperationUpdate),
) -> Result<ApplyReport, LedgerError> {
    let start = Instant::now();
    let mut progress = OperationProgress::new(OperationType::Apply, plan.entries.len());
    let mut report = ApplyReport {
        run_id: ledger.run_id().to_string(),
        ledger_path: ledger.path().to_path_buf(),
        moved: 0,
        renamed: 0,
        skipped: 0,
        bytes_moved: 0,
        directories_created: 0,
        failures: Vec::new(),
        cancelled: false,
        duration_ms: 0,
    };

    let mut current_project = None;
    for entry in &plan.entries {
        if current_project != Some(entry.project) {
            if cancel.is_cancelled() {
                info!(project = entry.project, "apply cancelled");
                report.cancelled = true;
                break;
            }
            current_project = Some(entry.project);
        }

        progress.set_current_file(Some(entry.source.clone()));
        if entry.action == MoveAction::Skip {
            report.skipped += 1;
            progress.complete_file(0);
            on_update(OperationUpdate::Progress(progress.clone()));
            continue;
        }

        match apply_entry(entry, &mut ledger, &mut report.directories_created) {
            Ok(bytes) => {
                report.moved += 1;
                report.bytes_moved += bytes;
                if entry.action == MoveAction::ConflictRenamed {
                    report.renamed += 1;
                }
                progress.complete_file(bytes);
            }
            Err(StepError::Move(reason)) => {
                warn!(source = %entry.source.display(), %reason, "move failed");
                let failure = MoveFailure::new(&entry.source, &entry.destination, reason);
                on_update(OperationUpdate::Failed(FileFailure::from(&failure)));
                report.failures.push(failure);
                progress.fail_file();
            }
            Err(StepError::Ledger(e)) => return Err(e),
        }
        on_update(OperationUpdate::Progress(progress.clone()));
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        run_id = %report.run_id,
        moved = report.moved,
        failed = report.failures.len(),
        cancelled = report.cancelled,
        "plan applied"
    );
    Ok(report)
}

fn apply_entry(
    entry: &MovePlanEntry,
    ledger: &mut LedgerWriter,
    directories_created: &mut usize,
) -> Result<u64, StepError> {
    if let Some(parent) = entry.destination.parent() {
        *directories_created += create_parents(parent, ledger)?;
    }
    if fs::symlink_metadata(&entry.destination).is_ok() {
        return Err(StepError::Move(
            "destination appeared since planning".to_string(),
        ));
    }

    let bytes = move_file(&entry.source, &entry.destination).map_err(StepError::Move)?;
    let seq = match ledger.moved(&entry.source, &entry.destination, entry.action) {
        Ok(seq) => seq,
        Err(e) => {
            // An unrecorded move could never be undone.
            if let Err(reason) = move_file(&entry.destination, &entry.source) {
                error!(
                    source = %entry.source.display(),
                    destination = %entry.destination.display(),
                    %reason,
                    "unrecorded move could not be reverted"
                );
            }
            return Err(e.into());
        }
    };
    debug!(
        seq,
        source = %entry.source.display(),
        destination = %entry.destination.display(),
        "moved"
    );
    Ok(bytes)
}

/// Create the missing ancestors of `dir` one level at a time, recording
/// each in the ledger.
fn create_parents(dir: &Path, ledger: &mut LedgerWriter) -> Result<usize, StepError> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || path.exists() {
            break;
        }
        missing.push(path);
        current = path.parent();
    }

    let mut created = 0;
    for path in missing.into_iter().rev() {
        match fs::create_dir(path) {
            Ok(()) => {
                if let Err(e) = ledger.directory_created(path) {
                    let _ = fs::remove_dir(path);
                    return Err(e.into());
                }
                created += 1;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(StepError::Move(format!(
                    "Failed to create {}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }
    Ok(created)
}

/// Move a single file, falling back to copy and delete across
/// filesystems. Returns the bytes moved.
pub(crate) fn move_file(source: &Path, dest: &Path) -> Result<u64, String> {
    let size = fs::symlink_metadata(source)
        .map_err(|e| format!("Source unavailable: {}", e))?
        .len();

    if fs::rename(source, dest).is_ok() {
        return Ok(size);
    }

    fs::copy(source, dest).map_err(|e| format!("Failed to copy: {}", e))?;
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(dest);
        return Err(format!("Failed to remove source: {}", e));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinship_core::FileId;
    use tempfile::TempDir;

    #[test]
    fn test_move_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        let dst = temp.path().join("b.txt");
        fs::write(&src, "hello").unwrap();

        assert_eq!(move_file(&src, &dst).unwrap(), 5);
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "hello");

        assert!(move_file(&src, &dst).is_err());
    }

    #[test]
    fn test_report_summary() {
        let report = ApplyReport {
            run_id: "r".into(),
            ledger_path: PathBuf::from("r.jsonl"),
            moved: 3,
            renamed: 1,
            skipped: 2,
            bytes_moved: 0,
            directories_created: 1,
            failures: vec![MoveFailure::new("/a", "/b", "nope")],
            cancelled: false,
            duration_ms: 0,
        };
        assert!(!report.is_success());
        assert_eq!(
            report.summary(),
            "Moved 3 files (1 renamed, 2 already in place), 1 failed"
        );
    }

    fn single_move(source: &Path, destination: &Path) -> MovePlan {
        MovePlan {
            destination_root: destination.parent().unwrap().to_path_buf(),
            layouts: Vec::new(),
            entries: vec![MovePlanEntry {
                file: FileId::new(0),
                project: 0,
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
                action: MoveAction::Move,
            }],
        }
    }

    #[test]
    fn test_unwritable_ledger_reverts_move() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("song.mp3");
        let out = temp.path().join("out");
        let dst = out.join("song.mp3");
        fs::write(&src, "tune").unwrap();
        fs::create_dir(&out).unwrap();

        let ledger = LedgerWriter::unwritable(temp.path().join("run.jsonl"));
        let result = apply_to_ledger(
            &single_move(&src, &dst),
            ledger,
            &CancellationToken::new(),
            &mut |_| {},
        );

        assert!(matches!(result, Err(LedgerError::Io { .. })));
        assert_eq!(fs::read_to_string(&src).unwrap(), "tune");
        assert!(!dst.exists());
    }

    #[test]
    fn test_unwritable_ledger_removes_created_directory() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("song.mp3");
        let dst = temp.path().join("out/Audio/song.mp3");
        fs::write(&src, "tune").unwrap();

        let ledger = LedgerWriter::unwritable(temp.path().join("run.jsonl"));
        let result = apply_to_ledger(
            &single_move(&src, &dst),
            ledger,
            &CancellationToken::new(),
            &mut |_| {},
        );

        assert!(matches!(result, Err(LedgerError::Io { .. })));
        assert!(src.exists());
        assert!(!temp.path().join("out").exists());
    }
}
