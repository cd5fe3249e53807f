//! Detected project types.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::record::FileId;

/// Closed set of project type labels.
///
/// Variants are declared in lexicographic order so that `Ord` doubles as
/// the tie-break order when two labels carry equal signal strength.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProjectType {
    Academic,
    General,
    Music,
    Photos,
    Work,
}

impl ProjectType {
    /// Title-cased label used in folder names ("Music", "Academic").
    pub fn title(self) -> &'static str {
        match self {
            Self::Academic => "Academic",
            Self::General => "General",
            Self::Music => "Music",
            Self::Photos => "Photos",
            Self::Work => "Work",
        }
    }
}

/// Attributes shared across the members of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonAttributes {
    /// Keywords present in the members' names or content.
    pub keywords: BTreeSet<String>,
    /// Metadata values agreed on by every member that carries the key.
    pub metadata: BTreeMap<String, String>,
}

impl CommonAttributes {
    /// Number of shared attributes (keywords and metadata values).
    pub fn strength(&self) -> usize {
        self.keywords.len() + self.metadata.len()
    }
}

/// A detected group of files judged to share a real-world purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Human-readable project name (not yet sanitized for the filesystem).
    pub name: String,
    /// Type label.
    pub project_type: ProjectType,
    /// Member files in discovery order. Never empty.
    pub members: Vec<FileId>,
    /// Confidence in the grouping, in [0, 1].
    pub confidence: f64,
    /// Attributes shared across members.
    pub common: CommonAttributes,
}

impl Project {
    /// Number of member files.
    pub fn file_count(&self) -> usize {
        self.members.len()
    }

    /// Whether this project holds a single file.
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}
