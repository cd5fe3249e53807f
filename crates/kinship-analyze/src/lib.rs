//! Semantic grouping for kinship.
//!
//! This crate turns discovered files into projects and a move plan:
//!
//! - **Feature extraction** - per-kind strategies read text, tags and
//!   metadata into a [`FeatureVector`](kinship_core::FeatureVector)
//! - **Similarity** - a weighted, symmetric pairwise score
//! - **Project detection** - union-find over the similarity graph
//! - **Hierarchy** - bounded-depth folder trees and conflict-free
//!   destinations
//! - **Search** - ranking files against a free-text query
//!
//! # Pipeline
//!
//! ```rust,ignore
//! use kinship_analyze::Analyzer;
//! use kinship_core::OrganizeConfig;
//! use kinship_scan::{JwalkScanner, ScanConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = OrganizeConfig::default();
//! let discovery = JwalkScanner::new()
//!     .scan(&ScanConfig::new("/path/to/inbox"), &config.extensions)
//!     .unwrap();
//!
//! let analyzer = Analyzer::new(config).unwrap();
//! let analysis = analyzer
//!     .analyze(discovery.records, "/path/to/organized".as_ref(), &CancellationToken::new())
//!     .unwrap();
//!
//! print!("{}", analysis.plan.preview());
//! ```

pub mod conflict;
pub mod detect;
pub mod features;
pub mod hierarchy;
mod pipeline;
pub mod provider;
pub mod search;
pub mod similarity;
mod tokenize;

pub use conflict::{suffixed_path, DestinationRegistry};
pub use detect::ProjectDetector;
pub use features::{ExtractionOutcome, ExtractionStrategy, FeatureExtractor};
pub use hierarchy::{sanitize_folder_name, HierarchyBuilder};
pub use pipeline::{AnalyzeError, Analysis, Analyzer, ProjectSummary, SizeBucket, SummaryReport};
pub use provider::{
    FallbackProvider, HttpProvider, InferenceProvider, InferenceRequest, InferenceResponse,
    InferenceTask, LocalProvider,
};
pub use search::{SearchHit, DEFAULT_TOP};
pub use similarity::{SignalBreakdown, SimilarityEdge, SimilarityEngine, SimilarityGraph};

// Re-export core types
pub use kinship_core::{FeatureVector, Project, ProjectType};
