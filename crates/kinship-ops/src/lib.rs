//! Plan execution and undo for kinship.
//!
//! This crate moves files according to a [`MovePlan`](kinship_core::MovePlan)
//! and keeps an append-only ledger of every change, so a run can be
//! reversed exactly:
//! - Sequential moves with on-demand directory creation
//! - One synced ledger record per created directory and completed move
//! - Reverse replay that restores files and removes emptied directories
//! - Progress streaming over bounded channels

mod apply;
mod error;
mod executor;
mod ledger;
mod progress;
mod undo;

pub use apply::{apply, apply_with_progress, ApplyReport};
pub use error::{InconsistencyKind, LedgerError, MoveFailure, UndoInconsistency};
pub use executor::{start_apply, start_undo};
pub use ledger::{
    consumed_path, list_ledgers, new_run_id, Ledger, LedgerInfo, LedgerRecord, LedgerWriter,
    CONSUMED_SUFFIX, LEDGER_EXTENSION,
};
pub use progress::{OperationProgress, OperationType, OperationUpdate};
pub use undo::{undo, undo_with_progress, UndoReport};

/// Default channel buffer size for operation progress updates.
pub const OPERATION_CHANNEL_SIZE: usize = 100;
