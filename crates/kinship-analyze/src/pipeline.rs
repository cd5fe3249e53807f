//! End-to-end analysis: features, projects, hierarchy and move plan.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use kinship_core::{
    ConfigError, ConflictError, ExtractionError, FailureStage, FeatureVector, FileFailure,
    FileRecord, MovePlan, OrganizeConfig, Project, ProjectType, ScanWarning,
};

use crate::detect::ProjectDetector;
use crate::features::{name_features, FeatureExtractor};
use crate::hierarchy::{flat_plan, kind_projects, HierarchyBuilder};
use crate::provider::FallbackProvider;
use crate::search::{self, SearchHit};

/// Errors that stop an analysis run.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

/// Size bucket of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SizeBucket {
    /// One file.
    Single,
    /// 2 to 5 files.
    Small,
    /// 6 to 15 files.
    Medium,
    /// 16 files or more.
    Large,
}

impl SizeBucket {
    pub fn for_count(count: usize) -> Self {
        match count {
            0 | 1 => Self::Single,
            2..=5 => Self::Small,
            6..=15 => Self::Medium,
            _ => Self::Large,
        }
    }
}

/// One line of the report per project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    pub folder: String,
    pub project_type: ProjectType,
    pub files: usize,
    pub confidence: f64,
}

/// Outcome of a run, processed files and failures kept apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Files analyzed.
    pub files: usize,
    pub projects: Vec<ProjectSummary>,
    pub by_type: BTreeMap<ProjectType, usize>,
    pub by_size: BTreeMap<SizeBucket, usize>,
    /// Mean confidence of multi-file projects.
    pub average_confidence: f64,
    /// Destinations renamed to avoid a collision.
    pub conflicts: usize,
    pub failures: Vec<FileFailure>,
    pub duration_ms: u64,
}

impl SummaryReport {
    /// Build a report from a finished analysis.
    pub fn new(
        files: usize,
        projects: &[Project],
        plan: &MovePlan,
        failures: Vec<FileFailure>,
        duration: Duration,
    ) -> Self {
        let mut by_type = BTreeMap::new();
        let mut by_size = BTreeMap::new();
        let mut summaries = Vec::with_capacity(projects.len());
        for (index, project) in projects.iter().enumerate() {
            *by_type.entry(project.project_type).or_insert(0) += 1;
            *by_size
                .entry(SizeBucket::for_count(project.file_count()))
                .or_insert(0) += 1;
            let folder = plan
                .layouts
                .iter()
                .find(|l| l.project == index)
                .map(|l| l.tree.label.clone())
                .unwrap_or_default();
            summaries.push(ProjectSummary {
                name: project.name.clone(),
                folder,
                project_type: project.project_type,
                files: project.file_count(),
                confidence: project.confidence,
            });
        }

        let grouped: Vec<f64> = projects
            .iter()
            .filter(|p| !p.is_singleton())
            .map(|p| p.confidence)
            .collect();
        let average_confidence = if grouped.is_empty() {
            0.0
        } else {
            grouped.iter().sum::<f64>() / grouped.len() as f64
        };

        Self {
            files,
            projects: summaries,
            by_type,
            by_size,
            average_confidence,
            conflicts: plan.conflict_count(),
            failures,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Record scan warnings as failures.
    pub fn add_scan_warnings(&mut self, warnings: &[ScanWarning]) {
        self.failures.extend(
            warnings
                .iter()
                .map(|w| FileFailure::new(&w.path, FailureStage::Scan, &w.message)),
        );
    }

    /// Plain-text rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} files in {} projects ({} ms)",
            self.files,
            self.projects.len(),
            self.duration_ms
        );
        for project in &self.projects {
            let _ = writeln!(
                out,
                "  {:<40} {:<9} {:>4} files  confidence {:.2}",
                project.folder,
                project.project_type.to_string(),
                project.files,
                project.confidence
            );
        }

        let _ = writeln!(
            out,
            "By type: {}",
            self.by_type.iter().map(|(t, n)| format!("{t}: {n}")).join(", ")
        );
        let _ = writeln!(
            out,
            "By size: {}",
            self.by_size.iter().map(|(b, n)| format!("{b}: {n}")).join(", ")
        );
        let _ = writeln!(out, "Average confidence: {:.2}", self.average_confidence);
        let _ = writeln!(out, "Conflicts renamed: {}", self.conflicts);

        if !self.failures.is_empty() {
            let _ = writeln!(out, "Failures ({}):", self.failures.len());
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "  [{}] {}: {}",
                    failure.stage,
                    failure.path.display(),
                    failure.reason
                );
            }
        }
        out
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub records: Vec<FileRecord>,
    pub vectors: Vec<FeatureVector>,
    pub projects: Vec<Project>,
    pub plan: MovePlan,
    pub report: SummaryReport,
}

/// Runs the grouping pipeline for a configuration.
pub struct Analyzer {
    config: OrganizeConfig,
    extractor: FeatureExtractor,
}

impl Analyzer {
    /// Validate the configuration and set up the inference provider.
    ///
    /// Must not be called from inside an async runtime when the remote
    /// provider is enabled.
    pub fn new(config: OrganizeConfig) -> Result<Self, AnalyzeError> {
        config.validate()?;
        let provider = FallbackProvider::from_config(&config.provider);
        Ok(Self::with_provider(config, provider))
    }

    /// Use an explicit provider.
    pub fn with_provider(config: OrganizeConfig, provider: FallbackProvider) -> Self {
        let extractor = FeatureExtractor::new(provider)
            .with_concurrency(config.concurrency)
            .with_excerpt_chars(config.provider.excerpt_chars);
        Self { config, extractor }
    }

    pub fn config(&self) -> &OrganizeConfig {
        &self.config
    }

    /// Analyze discovered records and plan their moves under
    /// `destination_root`. Records must be indexed by FileId.
    pub fn analyze(
        &self,
        records: Vec<FileRecord>,
        destination_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<Analysis, AnalyzeError> {
        let start = Instant::now();

        let outcome = self.extractor.extract_all(&records, cancel)?;
        let vectors = outcome.vectors;

        let projects = ProjectDetector::new(&self.config).detect(&records, &vectors);
        let plan = HierarchyBuilder::new(&self.config).plan(
            &projects,
            &records,
            &vectors,
            destination_root,
        )?;

        let report = SummaryReport::new(
            records.len(),
            &projects,
            &plan,
            outcome.failures,
            start.elapsed(),
        );
        info!(
            files = records.len(),
            projects = projects.len(),
            moves = plan.moves().count(),
            conflicts = report.conflicts,
            failures = report.failures.len(),
            "analysis complete"
        );

        Ok(Analysis {
            records,
            vectors,
            projects,
            plan,
            report,
        })
    }

    /// Plan one folder per file kind under `destination_root`, skipping
    /// content analysis.
    pub fn analyze_by_kind(
        &self,
        records: Vec<FileRecord>,
        destination_root: &Path,
    ) -> Result<Analysis, AnalyzeError> {
        let start = Instant::now();
        let vectors: Vec<FeatureVector> = records.iter().map(name_features).collect();
        let projects = kind_projects(&records);
        let plan = flat_plan(&projects, &records, destination_root)?;
        let report = SummaryReport::new(records.len(), &projects, &plan, Vec::new(), start.elapsed());
        info!(
            files = records.len(),
            folders = projects.len(),
            moves = plan.moves().count(),
            "kind plan complete"
        );

        Ok(Analysis {
            records,
            vectors,
            projects,
            plan,
            report,
        })
    }

    /// Rank discovered records against a free-text query.
    pub fn search(
        &self,
        records: &[FileRecord],
        query: &str,
        top: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>, AnalyzeError> {
        let outcome = self.extractor.extract_all(records, cancel)?;
        let query = self.extractor.query(query);
        let hits = search::rank(&query, records, &outcome.vectors, top);
        info!(files = records.len(), hits = hits.len(), "search complete");
        Ok(hits)
    }
}
