//! Ranking files against a free-text query.

use std::cmp::Ordering;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use kinship_core::{FeatureVector, FileId, FileRecord};

use crate::similarity::{embedding_cosine, term_cosine};

/// Default number of hits returned.
pub const DEFAULT_TOP: usize = 10;

/// A file matching a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: FileId,
    pub path: PathBuf,
    /// Relevance in [0, 1].
    pub score: f64,
}

/// Relevance of a file to a query vector.
///
/// Content terms and name tokens count equally. When both sides carry an
/// embedding its cosine is averaged in.
pub fn relevance(query: &FeatureVector, file: &FeatureVector) -> f64 {
    let terms = term_cosine(&query.terms, &file.terms);
    let names = if query.name_tokens.is_empty() {
        0.0
    } else {
        let shared = query.name_tokens.intersection(&file.name_tokens).count();
        shared as f64 / query.name_tokens.len() as f64
    };
    let lexical = (terms + names) / 2.0;
    match (&query.embedding, &file.embedding) {
        (Some(q), Some(f)) if q.len() == f.len() && !q.is_empty() => {
            (lexical + embedding_cosine(q, f).max(0.0)) / 2.0
        }
        _ => lexical,
    }
}

/// The `top` most relevant files, best first. Files scoring zero are left
/// out; ties keep discovery order.
pub fn rank(
    query: &FeatureVector,
    records: &[FileRecord],
    vectors: &[FeatureVector],
    top: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = records
        .iter()
        .zip(vectors)
        .filter_map(|(record, vector)| {
            let score = relevance(query, vector);
            (score > 0.0).then(|| SearchHit {
                file: record.id,
                path: record.path.clone(),
                score,
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.file.cmp(&b.file))
    });
    hits.truncate(top);
    hits
}
