//! Error types shared across the pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Errors that can occur during discovery. Fatal for the run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No roots to scan.
    #[error("No source roots given")]
    NoRoots,

    /// An ignore pattern failed to compile.
    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// Error reading file/directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// File skipped because it exceeds the size ceiling.
    TooLarge,
}

/// Non-fatal warning encountered during scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a permission denied warning.
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Permission denied: {}", path.display()),
            path,
            kind: WarningKind::PermissionDenied,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("Read error: {error}"),
            path,
            kind: WarningKind::ReadError,
        }
    }

    /// Create a warning for a file above the size ceiling.
    pub fn too_large(path: impl Into<PathBuf>, size: u64, limit: u64) -> Self {
        Self {
            path: path.into(),
            message: format!("Skipped: {size} bytes exceeds limit of {limit}"),
            kind: WarningKind::TooLarge,
        }
    }
}

/// Invalid configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting is out of range.
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    /// Similarity weights are unusable.
    #[error("Invalid similarity weights: {message}")]
    InvalidWeights { message: String },

    /// Configuration file could not be read.
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("Cannot parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Feature extraction failed for one file. The file falls back to
/// name-only features.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container or media format is malformed.
    #[error("Malformed {format}: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },

    /// Extraction was cancelled before this file was processed.
    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Create a format error.
    pub fn malformed(format: &'static str, message: impl ToString) -> Self {
        Self::Malformed {
            format,
            message: message.to_string(),
        }
    }
}

/// Inference provider failure. Triggers the local fallback.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider could not be reached or timed out.
    #[error("Provider unavailable: {message}")]
    Unavailable { message: String },

    /// Provider answered with something unusable.
    #[error("Invalid provider response: {message}")]
    InvalidResponse { message: String },

    /// Provider is not configured.
    #[error("Provider not configured: {message}")]
    NotConfigured { message: String },
}

/// Destination conflict that could not be resolved by renaming.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Every numeric suffix up to the limit is taken.
    #[error("No free name for {path} after {attempts} attempts")]
    Exhausted { path: PathBuf, attempts: u32 },

    /// Destination has no file name to derive a suffix from.
    #[error("Destination has no file name: {path}")]
    NoFileName { path: PathBuf },
}

/// Pipeline stage a per-file failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailureStage {
    /// Discovery could not read the entry.
    Scan,
    /// Feature extraction degraded to name-only features.
    Extraction,
    /// Inference provider fell back to the local implementation.
    Provider,
    /// The file could not be moved.
    Move,
    /// A ledger entry could not be reversed.
    Undo,
}

/// Per-file failure, reported separately from processed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Affected path.
    pub path: PathBuf,
    /// Stage the failure occurred in.
    pub stage: FailureStage,
    /// Human-readable reason.
    pub reason: String,
}

impl FileFailure {
    /// Create a new failure entry.
    pub fn new(path: impl Into<PathBuf>, stage: FailureStage, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            stage,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));

        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_scan_warning_creation() {
        let warning = ScanWarning::permission_denied("/test/path");
        assert_eq!(warning.kind, WarningKind::PermissionDenied);
        assert!(warning.message.contains("Permission denied"));

        let warning = ScanWarning::too_large("/big.iso", 10, 5);
        assert_eq!(warning.kind, WarningKind::TooLarge);
    }

    #[test]
    fn test_file_failure_display() {
        let failure = FileFailure::new(
            "/a/b.pdf",
            FailureStage::Extraction,
            ExtractionError::malformed("pdf", "bad xref"),
        );
        assert_eq!(failure.stage.to_string(), "extraction");
        assert_eq!(failure.reason, "Malformed pdf: bad xref");
    }
}
