//! Core types and traits for kinship.
//!
//! This crate provides the data model shared by every stage of the
//! pipeline: discovered file records, feature vectors, detected projects,
//! move plans, configuration and the error taxonomy.

mod config;
mod error;
mod feature;
mod plan;
mod project;
mod record;

pub use config::{
    ExtensionSets, OrganizeConfig, OrganizeConfigBuilder, ProjectMinimums, ProviderConfig,
    ScanConfig, ScanConfigBuilder, SimilarityWeights,
};
pub use error::{
    ConfigError, ConflictError, ExtractionError, FailureStage, FileFailure, ProviderError, ScanError,
    ScanWarning, WarningKind,
};
pub use feature::FeatureVector;
pub use plan::{HierarchyNode, MoveAction, MovePlan, MovePlanEntry, ProjectLayout};
pub use project::{CommonAttributes, Project, ProjectType};
pub use record::{FileId, FileKind, FileRecord};
