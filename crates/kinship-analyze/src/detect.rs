//! Project detection over the similarity graph.
//!
//! Files connected by edges above the similarity threshold are merged with
//! a union-find; every component becomes one [`Project`]. Components are
//! ordered by their lowest [`FileId`] and keep their members in discovery
//! order, so the output is a deterministic partition of the input.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use tracing::{debug, info};

use kinship_core::{
    CommonAttributes, FeatureVector, FileId, FileKind, FileRecord, OrganizeConfig, Project,
    ProjectMinimums, ProjectType,
};

use crate::provider::TYPE_INDICATORS;
use crate::similarity::{SimilarityEngine, SimilarityGraph};

/// Metadata keys compared when collecting shared attributes.
const SHARED_METADATA_KEYS: &[&str] = &["album", "artist", "author", "camera", "event", "genre"];

/// Shared attributes at which the attribute term of the confidence saturates.
const ATTRIBUTE_SATURATION: f64 = 3.0;

/// Disjoint-set forest over file indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Merge two sets; the lower root becomes the representative.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}

/// Groups feature vectors into projects.
#[derive(Debug, Clone)]
pub struct ProjectDetector {
    engine: SimilarityEngine,
    similarity_threshold: f64,
    confidence_threshold: f64,
    type_dominance: f64,
    minimums: ProjectMinimums,
    knn_cutoff: usize,
    knn_k: usize,
}

impl Default for ProjectDetector {
    fn default() -> Self {
        Self::new(&OrganizeConfig::default())
    }
}

impl ProjectDetector {
    /// Create a detector from configuration.
    pub fn new(config: &OrganizeConfig) -> Self {
        Self {
            engine: SimilarityEngine::new(config.weights),
            similarity_threshold: config.similarity_threshold,
            confidence_threshold: config.confidence_threshold,
            type_dominance: config.type_dominance,
            minimums: config.min_files_per_project,
            knn_cutoff: config.knn_cutoff,
            knn_k: config.knn_k,
        }
    }

    /// Override the similarity threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Similarity engine used to build the graph.
    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    /// Build the similarity graph for a set of vectors.
    pub fn graph(&self, vectors: &[FeatureVector]) -> SimilarityGraph {
        self.engine.graph(vectors, self.knn_cutoff, self.knn_k)
    }

    /// Detect projects. `records` and `vectors` are both indexed by FileId.
    pub fn detect(&self, records: &[FileRecord], vectors: &[FeatureVector]) -> Vec<Project> {
        let graph = self.graph(vectors);
        self.detect_with_graph(&graph, records, vectors)
    }

    /// Detect projects over a prebuilt graph.
    pub fn detect_with_graph(
        &self,
        graph: &SimilarityGraph,
        records: &[FileRecord],
        vectors: &[FeatureVector],
    ) -> Vec<Project> {
        let components = self.components(graph, vectors.len());

        let mut component_of = vec![0usize; vectors.len()];
        for (index, members) in components.iter().enumerate() {
            for id in members {
                component_of[id.index()] = index;
            }
        }

        // Sum and count of intra-component edge scores.
        let mut intra = vec![(0.0f64, 0usize); components.len()];
        for edge in &graph.edges {
            let ca = component_of[edge.a.index()];
            if ca == component_of[edge.b.index()] {
                intra[ca].0 += edge.score;
                intra[ca].1 += 1;
            }
        }

        let projects: Vec<Project> = components
            .into_iter()
            .zip(intra)
            .map(|(members, (sum, count))| {
                let size = members.len();
                let average = if size < 2 {
                    0.0
                } else if graph.complete {
                    sum / (size * (size - 1) / 2) as f64
                } else if count > 0 {
                    sum / count as f64
                } else {
                    0.0
                };
                self.build_project(members, average, records, vectors)
            })
            .collect();

        info!(
            files = vectors.len(),
            projects = projects.len(),
            threshold = self.similarity_threshold,
            "projects detected"
        );
        projects
    }

    /// Connected components above the threshold, ordered by lowest id.
    fn components(&self, graph: &SimilarityGraph, len: usize) -> Vec<Vec<FileId>> {
        let mut sets = UnionFind::new(len);
        for edge in graph.above(self.similarity_threshold) {
            sets.union(edge.a.index(), edge.b.index());
        }

        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<FileId>> = Vec::new();
        for index in 0..len {
            let root = sets.find(index);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[slot].push(FileId::new(index as u32));
        }
        components
    }

    fn build_project(
        &self,
        members: Vec<FileId>,
        average: f64,
        records: &[FileRecord],
        vectors: &[FeatureVector],
    ) -> Project {
        if members.len() == 1 {
            let stem = records
                .get(members[0].index())
                .map(|r| r.stem().to_string())
                .unwrap_or_default();
            return Project {
                name: format!("General_{stem}"),
                project_type: ProjectType::General,
                members,
                confidence: 0.0,
                common: CommonAttributes::default(),
            };
        }

        let member_vectors: Vec<&FeatureVector> =
            members.iter().map(|id| &vectors[id.index()]).collect();
        let common = common_attributes(&member_vectors);
        let size = members.len() as f64;
        let confidence = (0.5 * average
            + 0.25 * (1.0 - 1.0 / size)
            + 0.25 * (common.strength() as f64 / ATTRIBUTE_SATURATION).min(1.0))
        .clamp(0.0, 1.0);

        let mut project_type = classify(&member_vectors, self.type_dominance);
        if members.len() < self.minimums.for_type(project_type)
            || confidence < self.confidence_threshold
        {
            debug!(
                files = members.len(),
                confidence,
                label = %project_type,
                "component relabelled general"
            );
            project_type = ProjectType::General;
        }

        let name = project_name(project_type, &common, &members, records);
        debug!(project = %name, files = members.len(), confidence, "project");
        Project {
            name,
            project_type,
            members,
            confidence,
            common,
        }
    }
}

/// Keywords found in more than half of the members, and metadata values
/// agreed on by every member carrying the key (at least two members).
pub fn common_attributes(members: &[&FeatureVector]) -> CommonAttributes {
    let mut keyword_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in members {
        for keyword in v.keywords() {
            *keyword_counts.entry(keyword).or_default() += 1;
        }
    }
    let keywords = keyword_counts
        .into_iter()
        .filter(|(_, count)| count * 2 > members.len())
        .map(|(k, _)| k.to_string())
        .collect();

    let mut metadata = BTreeMap::new();
    for key in SHARED_METADATA_KEYS {
        let values: Vec<&str> = members.iter().filter_map(|v| v.meta(key)).collect();
        if values.len() < 2 {
            continue;
        }
        let first = values[0].to_lowercase();
        if values.iter().all(|v| v.to_lowercase() == first) {
            metadata.insert((*key).to_string(), values[0].to_string());
        }
    }

    CommonAttributes { keywords, metadata }
}

/// Type label with the strongest signal across members.
///
/// Ties go to the lexicographically first label. Returns general when no
/// label has any signal or the winner's share is below `dominance`.
pub fn classify(members: &[&FeatureVector], dominance: f64) -> ProjectType {
    let mut strength: BTreeMap<ProjectType, usize> = BTreeMap::new();
    for v in members {
        for project_type in member_signals(v) {
            *strength.entry(project_type).or_default() += 1;
        }
    }

    let total: usize = strength.values().sum();
    let Some((winner, count)) = strength
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(t, c)| (*t, *c))
    else {
        return ProjectType::General;
    };
    if total == 0 || (count as f64 / total as f64) < dominance {
        return ProjectType::General;
    }
    winner
}

/// Type signals contributed by one file.
fn member_signals(v: &FeatureVector) -> Vec<ProjectType> {
    let mut signals = Vec::new();
    match v.kind {
        FileKind::Audio => signals.push(ProjectType::Music),
        FileKind::Image | FileKind::Video => signals.push(ProjectType::Photos),
        FileKind::Spreadsheet | FileKind::Presentation => signals.push(ProjectType::Work),
        FileKind::Document | FileKind::Archive | FileKind::Other => {}
    }
    for (project_type, indicators) in TYPE_INDICATORS {
        if v.mentions_any(indicators) {
            signals.push(*project_type);
        }
    }
    if v.meta("album").is_some() || v.meta("artist").is_some() {
        signals.push(ProjectType::Music);
    }
    if v.meta("camera").is_some() || v.meta("taken").is_some() {
        signals.push(ProjectType::Photos);
    }
    for label in &v.labels {
        if let Some(project_type) = ProjectType::iter()
            .find(|t| *t != ProjectType::General && t.to_string() == label.to_lowercase())
        {
            signals.push(project_type);
        }
    }
    signals
}

/// `<Type>_Project_<Keyword>`, falling back to the oldest member's month.
fn project_name(
    project_type: ProjectType,
    common: &CommonAttributes,
    members: &[FileId],
    records: &[FileRecord],
) -> String {
    let suffix = match common.keywords.iter().next() {
        Some(keyword) => title_case(keyword),
        None => members
            .iter()
            .filter_map(|id| records.get(id.index()))
            .map(|r| r.modified)
            .min()
            .map(|oldest| DateTime::<Utc>::from(oldest).format("%Y_%m").to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
    };
    format!("{}_Project_{suffix}", project_type.title())
}

/// Uppercase the first character.
pub(crate) fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
