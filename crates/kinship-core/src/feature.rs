//! Normalized per-file feature representation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::record::{FileId, FileKind};

/// Comparable features of one file.
///
/// Built once by the feature extractor and never mutated afterwards.
/// Ordered collections keep every derived computation reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Owning file.
    pub id: FileId,
    /// Detected content category of the owning file.
    pub kind: FileKind,
    /// Meaningful tokens of the file stem.
    pub name_tokens: BTreeSet<String>,
    /// Normalized stem with trailing sequence numbering removed.
    pub stem_key: String,
    /// Trailing sequence number of the stem, if any.
    pub sequence: Option<u32>,
    /// Content term weights.
    pub terms: BTreeMap<String, f64>,
    /// Extracted metadata (artist, album, author, taken, ...).
    pub metadata: BTreeMap<String, String>,
    /// Dense embedding from the inference provider.
    pub embedding: Option<Vec<f32>>,
    /// Labels suggested by the inference provider.
    pub labels: BTreeSet<String>,
    /// Immediate parent directory of the file.
    pub parent: PathBuf,
    /// Set when extraction failed and only name features are present.
    pub degraded: bool,
}

impl FeatureVector {
    /// Empty vector for a file.
    pub fn new(id: FileId, kind: FileKind) -> Self {
        Self {
            id,
            kind,
            ..Default::default()
        }
    }

    /// True when every comparable feature matches, ignoring file identity.
    pub fn same_content(&self, other: &FeatureVector) -> bool {
        self.kind == other.kind
            && self.name_tokens == other.name_tokens
            && self.stem_key == other.stem_key
            && self.sequence == other.sequence
            && self.terms == other.terms
            && self.metadata == other.metadata
            && self.embedding == other.embedding
            && self.labels == other.labels
            && self.parent == other.parent
    }

    /// Metadata value, if present and non-empty.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Name tokens and content terms together.
    pub fn keywords(&self) -> BTreeSet<&str> {
        self.name_tokens
            .iter()
            .map(String::as_str)
            .chain(self.terms.keys().map(String::as_str))
            .collect()
    }

    /// Whether any keyword is in the given indicator list.
    pub fn mentions_any(&self, indicators: &[&str]) -> bool {
        indicators
            .iter()
            .any(|w| self.name_tokens.contains(*w) || self.terms.contains_key(*w))
    }
}
