//! Scan and organize configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::project::ProjectType;
use crate::record::FileKind;

/// Configuration for discovery.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Source roots to scan (files or directories).
    #[builder(default)]
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Patterns to ignore (glob syntax, matched against file and directory names).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Skip files larger than this many bytes (None = unlimited).
    #[builder(default = "Some(DEFAULT_MAX_FILE_SIZE)")]
    #[serde(default = "default_max_file_size")]
    pub max_file_size: Option<u64>,

    /// Extensions never picked up (lowercase, without the dot).
    #[builder(default = "default_blocked_extensions()")]
    #[serde(default = "default_blocked_extensions")]
    pub blocked_extensions: Vec<String>,

    /// Number of threads for scanning (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

fn default_max_file_size() -> Option<u64> {
    Some(DEFAULT_MAX_FILE_SIZE)
}

fn default_blocked_extensions() -> Vec<String> {
    ["tmp", "part", "crdownload", "lock", "swp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(Some(0)) = self.max_file_size {
            return Err("max_file_size must be positive".to_string());
        }
        if let Some(ref roots) = self.roots {
            if roots.iter().any(|r| r.as_os_str().is_empty()) {
                return Err("Root path cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning one path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Self::default()
        }
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }

    /// Check if an extension is on the blocklist.
    pub fn is_blocked(&self, extension: &str) -> bool {
        self.blocked_extensions
            .iter()
            .any(|b| b.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            follow_symlinks: false,
            include_hidden: false,
            ignore_patterns: Vec::new(),
            max_file_size: default_max_file_size(),
            blocked_extensions: default_blocked_extensions(),
            threads: 0,
        }
    }
}

/// Weights of the similarity signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub lexical: f64,
    pub metadata: f64,
    pub filename: f64,
    pub directory: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            lexical: 0.35,
            metadata: 0.20,
            filename: 0.30,
            directory: 0.15,
        }
    }
}

impl SimilarityWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.lexical + self.metadata + self.filename + self.directory
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.lexical, self.metadata, self.filename, self.directory];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::InvalidWeights {
                message: "weights must be finite and non-negative".to_string(),
            });
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::InvalidWeights {
                message: "weights must not all be zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Minimum member count for a component to keep each type label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectMinimums {
    pub academic: usize,
    pub general: usize,
    pub music: usize,
    pub photos: usize,
    pub work: usize,
}

impl Default for ProjectMinimums {
    fn default() -> Self {
        Self {
            academic: 2,
            general: 1,
            music: 2,
            photos: 2,
            work: 2,
        }
    }
}

impl ProjectMinimums {
    /// Minimum for a type label.
    pub fn for_type(&self, project_type: ProjectType) -> usize {
        match project_type {
            ProjectType::Academic => self.academic,
            ProjectType::General => self.general,
            ProjectType::Music => self.music,
            ProjectType::Photos => self.photos,
            ProjectType::Work => self.work,
        }
    }
}

/// Extensions (lowercase, without the dot) assigned to each file kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionSets {
    pub document: Vec<String>,
    pub spreadsheet: Vec<String>,
    pub presentation: Vec<String>,
    pub image: Vec<String>,
    pub audio: Vec<String>,
    pub video: Vec<String>,
    pub archive: Vec<String>,
}

fn ext_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for ExtensionSets {
    fn default() -> Self {
        Self {
            document: ext_list(&["pdf", "doc", "docx", "txt", "md", "rtf", "odt", "json"]),
            spreadsheet: ext_list(&["xls", "xlsx", "csv", "tsv", "ods"]),
            presentation: ext_list(&["ppt", "pptx", "odp", "key"]),
            image: ext_list(&[
                "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic",
            ]),
            audio: ext_list(&["mp3", "wav", "flac", "m4a", "ogg", "aac"]),
            video: ext_list(&["mp4", "avi", "mov", "mkv", "flv", "wmv", "webm"]),
            archive: ext_list(&[
                "zip", "rar", "7z", "tar", "gz", "tgz", "xz", "txz", "bz2", "tbz2",
            ]),
        }
    }
}

impl ExtensionSets {
    /// Detect the file kind of a lowercase extension.
    pub fn detect(&self, extension: &str) -> FileKind {
        let sets = [
            (&self.document, FileKind::Document),
            (&self.spreadsheet, FileKind::Spreadsheet),
            (&self.presentation, FileKind::Presentation),
            (&self.image, FileKind::Image),
            (&self.audio, FileKind::Audio),
            (&self.video, FileKind::Video),
            (&self.archive, FileKind::Archive),
        ];
        sets.into_iter()
            .find(|(set, _)| {
                set.iter()
                    .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension))
            })
            .map(|(_, kind)| kind)
            .unwrap_or(FileKind::Other)
    }
}

/// Settings of the optional remote inference provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Use the remote provider (the local one answers otherwise).
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Model used for `embeddings`.
    pub embed_model: String,
    /// Model used for `chat/completions` classification.
    pub classify_model: String,
    /// Environment variable holding the bearer key.
    pub api_key_env: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum characters of file content sent per request.
    pub excerpt_chars: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            embed_model: "nvidia/nv-embedqa-e5-v5".to_string(),
            classify_model: "meta/llama-3.1-8b-instruct".to_string(),
            api_key_env: "INFERENCE_API_KEY".to_string(),
            timeout_ms: 10_000,
            excerpt_chars: 2_000,
        }
    }
}

/// Configuration for analysis, detection and planning.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct OrganizeConfig {
    /// Scores strictly above this join two files.
    #[builder(default = "0.3")]
    pub similarity_threshold: f64,

    /// Signal weights.
    #[builder(default)]
    pub weights: SimilarityWeights,

    /// Components below this confidence are labelled general.
    #[builder(default = "0.4")]
    pub confidence_threshold: f64,

    /// Minimum share of label signal the winning type needs.
    #[builder(default = "0.4")]
    pub type_dominance: f64,

    /// Minimum members per project type.
    #[builder(default)]
    pub min_files_per_project: ProjectMinimums,

    /// A sub-folder is created only for at least this many files.
    #[builder(default = "3")]
    pub min_files_per_folder: usize,

    /// Maximum folder depth, counting the project folder.
    #[builder(default = "3")]
    pub max_depth: usize,

    /// Inputs above this size use a k-nearest-neighbour graph.
    #[builder(default = "2000")]
    pub knn_cutoff: usize,

    /// Neighbours kept per file in the sparse graph.
    #[builder(default = "10")]
    pub knn_k: usize,

    /// Extraction threads (0 = auto-detect).
    #[builder(default = "0")]
    pub concurrency: usize,

    /// Extension to kind mapping.
    #[builder(default)]
    pub extensions: ExtensionSets,

    /// Discovery settings.
    #[builder(default)]
    pub scan: ScanConfig,

    /// Inference provider settings.
    #[builder(default)]
    pub provider: ProviderConfig,

    /// Directory holding undo ledgers (None = platform data dir).
    #[builder(default)]
    pub ledger_dir: Option<PathBuf>,
}

impl OrganizeConfigBuilder {
    /// Validate the values set on the builder, unset fields taking their defaults.
    fn validate(&self) -> Result<(), String> {
        let defaults = OrganizeConfig::default();
        let config = OrganizeConfig {
            similarity_threshold: self.similarity_threshold.unwrap_or(defaults.similarity_threshold),
            weights: self.weights.unwrap_or(defaults.weights),
            confidence_threshold: self.confidence_threshold.unwrap_or(defaults.confidence_threshold),
            type_dominance: self.type_dominance.unwrap_or(defaults.type_dominance),
            min_files_per_project: self
                .min_files_per_project
                .unwrap_or(defaults.min_files_per_project),
            min_files_per_folder: self.min_files_per_folder.unwrap_or(defaults.min_files_per_folder),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            knn_cutoff: self.knn_cutoff.unwrap_or(defaults.knn_cutoff),
            knn_k: self.knn_k.unwrap_or(defaults.knn_k),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            extensions: self.extensions.clone().unwrap_or(defaults.extensions),
            scan: self.scan.clone().unwrap_or(defaults.scan),
            provider: self.provider.clone().unwrap_or(defaults.provider),
            ledger_dir: self.ledger_dir.clone().unwrap_or(defaults.ledger_dir),
        };
        config.validate().map_err(|e| e.to_string())
    }
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            weights: SimilarityWeights::default(),
            confidence_threshold: 0.4,
            type_dominance: 0.4,
            min_files_per_project: ProjectMinimums::default(),
            min_files_per_folder: 3,
            max_depth: 3,
            knn_cutoff: 2000,
            knn_k: 10,
            concurrency: 0,
            extensions: ExtensionSets::default(),
            scan: ScanConfig::default(),
            provider: ProviderConfig::default(),
            ledger_dir: None,
        }
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            expected: "within [0, 1]",
            value: value.to_string(),
        })
    }
}

impl OrganizeConfig {
    /// Create a new organize config builder.
    pub fn builder() -> OrganizeConfigBuilder {
        OrganizeConfigBuilder::default()
    }

    /// Load and validate a TOML configuration file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("similarity_threshold", self.similarity_threshold)?;
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("type_dominance", self.type_dominance)?;
        self.weights.validate()?;
        if self.min_files_per_folder < 2 {
            return Err(ConfigError::OutOfRange {
                field: "min_files_per_folder",
                expected: "at least 2",
                value: self.min_files_per_folder.to_string(),
            });
        }
        if self.max_depth < 1 {
            return Err(ConfigError::OutOfRange {
                field: "max_depth",
                expected: "at least 1",
                value: self.max_depth.to_string(),
            });
        }
        if self.knn_k == 0 {
            return Err(ConfigError::OutOfRange {
                field: "knn_k",
                expected: "at least 1",
                value: "0".to_string(),
            });
        }
        if self.provider.enabled && self.provider.timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "provider.timeout_ms",
                expected: "positive",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Detect the file kind of a lowercase extension.
    pub fn detect_kind(&self, extension: &str) -> FileKind {
        self.extensions.detect(extension)
    }
}
