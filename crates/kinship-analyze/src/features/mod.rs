//! Per-file feature extraction.
//!
//! Each [`FileKind`] maps to one [`ExtractionStrategy`]. Strategies read the
//! file and return raw text plus a metadata mapping; the extractor turns
//! that into a [`FeatureVector`] and asks the inference provider for an
//! embedding. Any strategy failure degrades the file to name-only features.

mod archive;
mod audio;
mod image;
mod text;
mod video;

use std::collections::BTreeMap;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kinship_core::{
    ExtractionError, FailureStage, FeatureVector, FileFailure, FileId, FileKind, FileRecord,
};

use crate::provider::{FallbackProvider, InferenceRequest};
use crate::tokenize::{content_terms, name_tokens, split_sequence, MAX_TERMS};

/// Weight given to provider tags merged into content terms.
const TAG_WEIGHT: f64 = 0.5;

/// Raw output of a strategy.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extracted {
    /// Text the content terms are computed from.
    pub text: String,
    /// Metadata values keyed by attribute name.
    pub metadata: BTreeMap<String, String>,
}

impl Extracted {
    fn insert(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.metadata.insert(key.to_string(), value.to_string());
        }
    }
}

/// How features are read from a file, chosen by its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Text documents, office containers and PDFs.
    Text,
    /// ID3 tags of audio files.
    AudioTags,
    /// Dimensions and EXIF header of images.
    ImageMeta,
    /// Markers in video file names.
    VideoMeta,
    /// Entry names of archives.
    ArchiveListing,
    /// File name and extension only.
    NameOnly,
}

impl ExtractionStrategy {
    /// Strategy for a file kind.
    pub fn for_kind(kind: FileKind) -> Self {
        match kind {
            FileKind::Document | FileKind::Spreadsheet | FileKind::Presentation => Self::Text,
            FileKind::Audio => Self::AudioTags,
            FileKind::Image => Self::ImageMeta,
            FileKind::Video => Self::VideoMeta,
            FileKind::Archive => Self::ArchiveListing,
            FileKind::Other => Self::NameOnly,
        }
    }

    /// Read content terms and metadata from a file.
    pub fn extract(self, record: &FileRecord) -> Result<Extracted, ExtractionError> {
        match self {
            Self::Text => text::extract(record),
            Self::AudioTags => audio::extract(record),
            Self::ImageMeta => image::extract(record),
            Self::VideoMeta => Ok(video::extract(record)),
            Self::ArchiveListing => archive::extract(record),
            Self::NameOnly => Ok(Extracted::default()),
        }
    }
}

/// Vectors of a batch plus the per-file failures met on the way.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// One vector per record, indexed by FileId.
    pub vectors: Vec<FeatureVector>,
    /// Degraded extractions and provider fallbacks.
    pub failures: Vec<FileFailure>,
}

/// Builds feature vectors for discovered files.
pub struct FeatureExtractor {
    provider: FallbackProvider,
    concurrency: usize,
    excerpt_chars: usize,
    classify: bool,
}

impl FeatureExtractor {
    /// Create an extractor backed by the given provider.
    pub fn new(provider: FallbackProvider) -> Self {
        let enriched = provider.has_primary();
        Self {
            provider,
            concurrency: 0,
            excerpt_chars: 2_000,
            classify: enriched,
        }
    }

    /// Bound the number of extraction threads (0 = rayon default).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Maximum characters of content sent to the provider.
    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    /// Ask the provider for type labels.
    pub fn with_classification(mut self, classify: bool) -> Self {
        self.classify = classify;
        self
    }

    /// Extract every record. Cancellation is checked between files.
    pub fn extract_all(
        &self,
        records: &[FileRecord],
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let run = || {
            records
                .par_iter()
                .map(|record| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(self.extract(record))
                })
                .collect::<Vec<_>>()
        };

        let results = if self.concurrency == 0 {
            run()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.concurrency)
                .build()
            {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    warn!(error = %e, "cannot build extraction pool, using the global pool");
                    run()
                }
            }
        };

        if cancel.is_cancelled() {
            info!("extraction cancelled");
            return Err(ExtractionError::Cancelled);
        }

        let mut outcome = ExtractionOutcome {
            vectors: Vec::with_capacity(records.len()),
            failures: Vec::new(),
        };
        for result in results {
            let Some((vector, failures)) = result else {
                return Err(ExtractionError::Cancelled);
            };
            outcome.vectors.push(vector);
            outcome.failures.extend(failures);
        }
        Ok(outcome)
    }

    /// Extract one record. Never fails; problems are returned as failures.
    pub fn extract(&self, record: &FileRecord) -> (FeatureVector, Vec<FileFailure>) {
        let mut failures = Vec::new();
        let mut vector = name_features(record);

        let strategy = ExtractionStrategy::for_kind(record.kind);
        let extracted = match strategy.extract(record) {
            Ok(extracted) => extracted,
            Err(e) => {
                debug!(path = %record.path.display(), error = %e, "extraction degraded");
                vector.degraded = true;
                failures.push(FileFailure::new(&record.path, FailureStage::Extraction, &e));
                Extracted::default()
            }
        };

        vector.terms = content_terms(&extracted.text, MAX_TERMS);
        vector.metadata = extracted.metadata;

        if self.provider.has_primary() {
            self.enrich(record, &mut vector, &extracted.text, &mut failures);
        }

        (vector, failures)
    }

    /// Features of a free-text query, comparable with file vectors.
    pub fn query(&self, text: &str) -> FeatureVector {
        let mut vector = FeatureVector::new(FileId::default(), FileKind::Other);
        vector.name_tokens = name_tokens(text);
        vector.terms = content_terms(text, MAX_TERMS);
        if self.provider.has_primary() {
            let embedded = self.provider.embed_with_fallback(&InferenceRequest::new(text, ""));
            if let Some(e) = embedded.primary_error {
                debug!(error = %e, "query embedding fell back to the local provider");
            }
            vector.embedding = embedded.response.vector.filter(|v| !v.is_empty());
        }
        vector
    }

    fn enrich(
        &self,
        record: &FileRecord,
        vector: &mut FeatureVector,
        text: &str,
        failures: &mut Vec<FileFailure>,
    ) {
        let request = InferenceRequest::new(summary(record, vector), excerpt(text, self.excerpt_chars));

        let embedded = self.provider.embed_with_fallback(&request);
        if let Some(e) = embedded.primary_error {
            failures.push(FileFailure::new(&record.path, FailureStage::Provider, &e));
        }
        vector.embedding = embedded.response.vector.filter(|v| !v.is_empty());

        if self.classify {
            let classified = self.provider.classify_with_fallback(&request);
            if let Some(e) = classified.primary_error {
                failures.push(FileFailure::new(&record.path, FailureStage::Provider, &e));
            }
            vector.labels.extend(classified.response.labels);
        }

        if vector.terms.is_empty() {
            let tagged = self.provider.tag_with_fallback(&request);
            if let Some(e) = tagged.primary_error {
                failures.push(FileFailure::new(&record.path, FailureStage::Provider, &e));
            }
            for tag in tagged.response.labels {
                vector.terms.entry(tag).or_insert(TAG_WEIGHT);
            }
        }
    }
}

/// Name-derived features every file gets, extraction or not.
pub fn name_features(record: &FileRecord) -> FeatureVector {
    let stem = record.stem();
    let (stem_key, sequence) = split_sequence(stem);
    let mut vector = FeatureVector::new(record.id, record.kind);
    vector.name_tokens = name_tokens(stem);
    vector.stem_key = stem_key;
    vector.sequence = sequence;
    vector.parent = record.parent().to_path_buf();
    vector
}

/// One-line description of a file for the provider.
fn summary(record: &FileRecord, vector: &FeatureVector) -> String {
    let mut parts = vec![record.name.to_string(), record.kind.to_string()];
    parts.extend(vector.name_tokens.iter().cloned());
    parts.extend(vector.metadata.values().cloned());
    parts.extend(vector.terms.keys().cloned());
    parts.join(" ")
}

fn excerpt(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
