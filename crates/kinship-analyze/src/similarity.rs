//! Pairwise similarity between feature vectors.
//!
//! The score is a weighted sum of four independent signals:
//!
//! 1. **lexical** - cosine over content terms, averaged with the embedding
//!    cosine when both files carry one
//! 2. **metadata** - fixed bonuses for shared explicit attributes
//! 3. **filename** - shared stem key or leading token, else token Jaccard
//! 4. **directory** - same immediate parent
//!
//! Every signal is symmetric, so the score is too.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kinship_core::{FeatureVector, FileId, SimilarityWeights};

/// Bonus per shared metadata attribute.
pub const METADATA_BONUSES: &[(&str, f64)] = &[
    ("album", 0.6),
    ("author", 0.5),
    ("event", 0.5),
    ("artist", 0.4),
    ("camera", 0.2),
    ("genre", 0.1),
];

/// Per-signal contribution to a score, before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub lexical: f64,
    pub metadata: f64,
    pub filename: f64,
    pub directory: f64,
}

impl SignalBreakdown {
    /// Every signal at full strength.
    pub fn identical() -> Self {
        Self {
            lexical: 1.0,
            metadata: 1.0,
            filename: 1.0,
            directory: 1.0,
        }
    }
}

/// Weighted edge of the similarity graph. `a` is always the lower id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub a: FileId,
    pub b: FileId,
    pub score: f64,
    pub signals: SignalBreakdown,
}

/// Scores pairs of feature vectors with fixed weights.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    weights: SimilarityWeights,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new(SimilarityWeights::default())
    }
}

impl SimilarityEngine {
    /// Create an engine with the given weights.
    pub fn new(weights: SimilarityWeights) -> Self {
        Self { weights }
    }

    /// Weights in use.
    pub fn weights(&self) -> &SimilarityWeights {
        &self.weights
    }

    /// Score of a pair in [0, 1].
    pub fn score(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
        self.compare(a, b).0
    }

    /// Score of a pair together with its per-signal breakdown.
    pub fn compare(&self, a: &FeatureVector, b: &FeatureVector) -> (f64, SignalBreakdown) {
        if a.same_content(b) {
            return (1.0, SignalBreakdown::identical());
        }

        let signals = SignalBreakdown {
            lexical: lexical(a, b),
            metadata: metadata(a, b),
            filename: filename(a, b),
            directory: directory(a, b),
        };
        let w = &self.weights;
        let total = w.total();
        if total <= 0.0 {
            return (0.0, signals);
        }
        let weighted = w.lexical * signals.lexical
            + w.metadata * signals.metadata
            + w.filename * signals.filename
            + w.directory * signals.directory;
        ((weighted / total).clamp(0.0, 1.0), signals)
    }

    /// Edge between two vectors, ordered by id.
    pub fn edge(&self, a: &FeatureVector, b: &FeatureVector) -> SimilarityEdge {
        let (a, b) = if a.id <= b.id { (a, b) } else { (b, a) };
        let (score, signals) = self.compare(a, b);
        SimilarityEdge {
            a: a.id,
            b: b.id,
            score,
            signals,
        }
    }

    /// Build the similarity graph over all vectors.
    ///
    /// Up to `knn_cutoff` vectors the graph is complete. Beyond that only
    /// the `knn_k` best neighbours of every vector are kept, ties broken by
    /// lower id. Zero-score edges are dropped. Edges come out sorted by
    /// `(a, b)`.
    pub fn graph(
        &self,
        vectors: &[FeatureVector],
        knn_cutoff: usize,
        knn_k: usize,
    ) -> SimilarityGraph {
        let complete = vectors.len() <= knn_cutoff;
        let edges = if complete {
            self.complete_edges(vectors)
        } else {
            self.knn_edges(vectors, knn_k.max(1))
        };
        debug!(
            files = vectors.len(),
            edges = edges.len(),
            complete,
            "similarity graph built"
        );
        SimilarityGraph { edges, complete }
    }

    fn complete_edges(&self, vectors: &[FeatureVector]) -> Vec<SimilarityEdge> {
        (0..vectors.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                vectors[i + 1..]
                    .iter()
                    .map(move |other| self.edge(&vectors[i], other))
                    .filter(|e| e.score > 0.0)
            })
            .collect()
    }

    fn knn_edges(&self, vectors: &[FeatureVector], k: usize) -> Vec<SimilarityEdge> {
        let neighbours: Vec<Vec<SimilarityEdge>> = vectors
            .par_iter()
            .map(|v| {
                let mut row: Vec<SimilarityEdge> = vectors
                    .iter()
                    .filter(|other| other.id != v.id)
                    .map(|other| self.edge(v, other))
                    .filter(|e| e.score > 0.0)
                    .collect();
                row.sort_by(|x, y| {
                    y.score
                        .partial_cmp(&x.score)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| other_end(x, v.id).cmp(&other_end(y, v.id)))
                });
                row.truncate(k);
                row
            })
            .collect();

        let mut kept: BTreeMap<(FileId, FileId), SimilarityEdge> = BTreeMap::new();
        for edge in neighbours.into_iter().flatten() {
            kept.entry((edge.a, edge.b)).or_insert(edge);
        }
        kept.into_values().collect()
    }
}

fn other_end(edge: &SimilarityEdge, id: FileId) -> FileId {
    if edge.a == id { edge.b } else { edge.a }
}

/// Transient similarity graph.
#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    /// Edges with a positive score, sorted by `(a, b)`.
    pub edges: Vec<SimilarityEdge>,
    /// Whether every pair was scored.
    pub complete: bool,
}

impl SimilarityGraph {
    /// Edges whose score strictly exceeds the threshold.
    pub fn above(&self, threshold: f64) -> impl Iterator<Item = &SimilarityEdge> {
        self.edges.iter().filter(move |e| e.score > threshold)
    }
}

fn lexical(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let terms = term_cosine(&a.terms, &b.terms);
    match (&a.embedding, &b.embedding) {
        (Some(x), Some(y)) if x.len() == y.len() && !x.is_empty() => {
            (terms + embedding_cosine(x, y).max(0.0)) / 2.0
        }
        _ => terms,
    }
}

/// Cosine over two sorted term maps, walking both in term order.
pub(crate) fn term_cosine(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut left = a.iter().peekable();
    let mut right = b.iter().peekable();
    while let (Some((ka, va)), Some((kb, vb))) = (left.peek(), right.peek()) {
        match ka.cmp(kb) {
            Ordering::Less => {
                left.next();
            }
            Ordering::Greater => {
                right.next();
            }
            Ordering::Equal => {
                dot += *va * *vb;
                left.next();
                right.next();
            }
        }
    }
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

pub(crate) fn embedding_cosine(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

fn metadata(a: &FeatureVector, b: &FeatureVector) -> f64 {
    let sum: f64 = METADATA_BONUSES
        .iter()
        .filter(|(key, _)| match (a.meta(key), b.meta(key)) {
            (Some(x), Some(y)) => x.to_lowercase() == y.to_lowercase(),
            _ => false,
        })
        .map(|(_, bonus)| bonus)
        .sum();
    sum.min(1.0)
}

fn filename(a: &FeatureVector, b: &FeatureVector) -> f64 {
    if !a.stem_key.is_empty() && a.stem_key == b.stem_key {
        return 1.0;
    }
    if let (Some(x), Some(y)) = (leading_token(a), leading_token(b)) {
        if x == y {
            return 1.0;
        }
    }
    jaccard(&a.name_tokens, &b.name_tokens)
}

/// First piece of the stem key, when it is a meaningful name token.
fn leading_token(v: &FeatureVector) -> Option<&str> {
    let first = v.stem_key.split('_').next()?;
    v.name_tokens.contains(first).then_some(first)
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn directory(a: &FeatureVector, b: &FeatureVector) -> f64 {
    if !a.parent.as_os_str().is_empty() && a.parent == b.parent {
        1.0
    } else {
        0.0
    }
}
