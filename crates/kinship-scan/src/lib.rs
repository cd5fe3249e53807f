//! Source discovery for kinship.
//!
//! Walks one or more source roots with jwalk and turns every regular file
//! into an immutable [`FileRecord`] in stable discovery order. Unreadable
//! entries become [`ScanWarning`]s; a missing root is fatal.
//!
//! # Example
//!
//! ```rust,no_run
//! use kinship_scan::{JwalkScanner, ExtensionSets, ScanConfig};
//!
//! let config = ScanConfig::new("/path/to/inbox");
//! let scanner = JwalkScanner::new();
//! let discovery = scanner.scan(&config, &ExtensionSets::default()).unwrap();
//!
//! println!("Found {} files", discovery.records.len());
//! ```

mod scanner;

pub use scanner::{Discovery, JwalkScanner};

// Re-export core types for convenience
pub use kinship_core::{
    ExtensionSets, FileId, FileKind, FileRecord, ScanConfig, ScanError, ScanWarning, WarningKind,
};
