//! Async entry points that stream updates over a channel.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kinship_core::MovePlan;

use crate::apply::apply_with_progress;
use crate::progress::OperationUpdate;
use crate::undo::undo_with_progress;
use crate::OPERATION_CHANNEL_SIZE;

/// Start applying a plan on the blocking pool.
///
/// The last update is `Applied` or `Aborted`. Must be called from within
/// a tokio runtime.
pub fn start_apply(
    plan: MovePlan,
    ledger_dir: PathBuf,
    cancel: CancellationToken,
) -> mpsc::Receiver<OperationUpdate> {
    let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);

    tokio::task::spawn_blocking(move || {
        let result = apply_with_progress(&plan, &ledger_dir, &cancel, |update| {
            let _ = tx.blocking_send(update);
        });
        let last = match result {
            Ok(report) => OperationUpdate::Applied(report),
            Err(e) => OperationUpdate::Aborted(e),
        };
        let _ = tx.blocking_send(last);
    });

    rx
}

/// Start undoing a ledger on the blocking pool.
///
/// The last update is `Undone` or `Aborted`.
pub fn start_undo(ledger_path: PathBuf) -> mpsc::Receiver<OperationUpdate> {
    let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);

    tokio::task::spawn_blocking(move || {
        let result = undo_with_progress(&ledger_path, |update| {
            let _ = tx.blocking_send(update);
        });
        let last = match result {
            Ok(report) => OperationUpdate::Undone(report),
            Err(e) => OperationUpdate::Aborted(e),
        };
        let _ = tx.blocking_send(last);
    });

    rx
}
