//! Folder hierarchies for detected projects.
//!
//! Classification is progressive:
//!
//! 1. the project folder
//! 2. a sub-category named after the file kind in the project's context
//!    (`Songs`, `Album_Art`, `Papers_Documents`, ...)
//! 3. a sub-category from a discovered attribute (artist, album, document
//!    status, image purpose, creation month)
//!
//! A level below the project folder only exists when it would hold at
//! least `min_files_per_folder` files; otherwise its files stay one level
//! up. Level 3 additionally needs two such sub-groups.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use kinship_core::{
    CommonAttributes, ConflictError, FeatureVector, FileId, FileKind, FileRecord, HierarchyNode, MovePlan,
    MovePlanEntry, OrganizeConfig, Project, ProjectLayout, ProjectType,
};

use crate::conflict::DestinationRegistry;

/// Longest folder name produced by sanitizing.
pub const MAX_FOLDER_NAME: usize = 50;

/// Generic groups larger than this are split by creation month.
const GENERIC_SPLIT_THRESHOLD: usize = 3;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("invalid character pattern"));
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("underscore pattern"));

/// Document status keywords, checked in order.
const DOCUMENT_STATUS: &[(&str, &[&str])] = &[
    ("Drafts", &["draft", "rough", "outline"]),
    ("Final_Documents", &["final", "submission", "complete"]),
    ("Research_Materials", &["research", "source", "reference"]),
    ("Notes", &["note", "notes", "memo"]),
    ("Reports", &["report", "analysis", "summary"]),
];

const SCREENSHOT_WORDS: &[&str] = &["screenshot", "screen", "capture"];
const PHOTO_WORDS: &[&str] = &["photo", "pic", "picture"];
const GRAPHIC_WORDS: &[&str] = &["art", "design", "graphic"];

/// Make a string safe to use as a folder name.
///
/// Invalid and control characters become `_`, runs of `_` collapse, the
/// result is trimmed and capped at [`MAX_FOLDER_NAME`] characters. An
/// empty result becomes `Untitled`.
pub fn sanitize_folder_name(name: &str) -> String {
    let replaced = INVALID_CHARS.replace_all(name, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches(|c: char| c == '_' || c == '.' || c.is_whitespace());
    let capped: String = trimmed.chars().take(MAX_FOLDER_NAME).collect();
    let capped = capped.trim_end_matches(|c: char| c == '_' || c == '.' || c.is_whitespace());
    if capped.is_empty() {
        "Untitled".to_string()
    } else {
        capped.to_string()
    }
}

/// Level-2 folder for a file kind inside a project of the given type.
pub fn category_folder(project_type: ProjectType, kind: FileKind) -> &'static str {
    match (project_type, kind) {
        (ProjectType::Music, FileKind::Audio) => "Songs",
        (ProjectType::Music, FileKind::Image) => "Album_Art",
        (ProjectType::Music, FileKind::Document) => "Lyrics_Notes",
        (ProjectType::Academic, FileKind::Document) => "Papers_Documents",
        (ProjectType::Academic, FileKind::Image) => "Figures_Images",
        (ProjectType::Photos, FileKind::Image) => "Photos",
        (ProjectType::Photos, FileKind::Video) => "Videos",
        (_, FileKind::Audio) => "Audio",
        (_, FileKind::Image) => "Images",
        (_, FileKind::Video) => "Videos",
        (_, FileKind::Document) => "Documents",
        (_, FileKind::Spreadsheet) => "Spreadsheets",
        (_, FileKind::Presentation) => "Presentations",
        (_, FileKind::Archive) => "Archives",
        (_, FileKind::Other) => "Other",
    }
}

/// Status folder of a document from its keywords.
pub fn document_status(vector: &FeatureVector) -> &'static str {
    DOCUMENT_STATUS
        .iter()
        .find(|(_, words)| vector.mentions_any(words))
        .map(|(folder, _)| *folder)
        .unwrap_or("Documents")
}

fn stamp(time: SystemTime, format: &str) -> String {
    DateTime::<Utc>::from(time).format(format).to_string()
}

/// Builds project trees and the move plan.
#[derive(Debug, Clone)]
pub struct HierarchyBuilder {
    min_files_per_folder: usize,
    max_depth: usize,
}

impl Default for HierarchyBuilder {
    fn default() -> Self {
        Self::new(&OrganizeConfig::default())
    }
}

impl HierarchyBuilder {
    /// Create a builder from configuration.
    pub fn new(config: &OrganizeConfig) -> Self {
        Self {
            min_files_per_folder: config.min_files_per_folder,
            max_depth: config.max_depth,
        }
    }

    /// Tree for one project, rooted at a folder with the given label.
    pub fn build_tree(
        &self,
        label: &str,
        project: &Project,
        records: &[FileRecord],
        vectors: &[FeatureVector],
    ) -> HierarchyNode {
        let mut root = HierarchyNode::new(label);

        let mut by_kind: IndexMap<FileKind, Vec<FileId>> = IndexMap::new();
        for id in &project.members {
            by_kind.entry(vectors[id.index()].kind).or_default().push(*id);
        }

        for (kind, files) in by_kind {
            if self.max_depth < 2 || files.len() < self.min_files_per_folder {
                root.files.extend(files);
                continue;
            }
            let folder = category_folder(project.project_type, kind);
            let groups = self.attribute_groups(project.project_type, kind, &files, records, vectors);
            let node = root.child_mut(folder);
            self.fill(node, files, groups);
        }

        root.files.sort();
        root
    }

    /// Place a level-2 group's files. Level-3 folders appear only when at
    /// least two sub-groups reach the folder minimum.
    fn fill(
        &self,
        node: &mut HierarchyNode,
        files: Vec<FileId>,
        groups: IndexMap<String, Vec<FileId>>,
    ) {
        let qualifying = groups
            .values()
            .filter(|members| members.len() >= self.min_files_per_folder)
            .count();
        if self.max_depth < 3 || qualifying < 2 {
            node.files.extend(files);
            return;
        }
        for (label, members) in groups {
            if members.len() >= self.min_files_per_folder {
                node.child_mut(&sanitize_folder_name(&label))
                    .files
                    .extend(members);
            } else {
                node.files.extend(members);
            }
        }
        node.files.sort();
    }

    /// Attribute sub-groups of one level-2 group, in first-seen order.
    fn attribute_groups(
        &self,
        project_type: ProjectType,
        kind: FileKind,
        files: &[FileId],
        records: &[FileRecord],
        vectors: &[FeatureVector],
    ) -> IndexMap<String, Vec<FileId>> {
        let mut groups: IndexMap<String, Vec<FileId>> = IndexMap::new();
        let modified = |id: FileId| {
            records
                .get(id.index())
                .map(|r| r.modified)
                .unwrap_or(SystemTime::UNIX_EPOCH)
        };

        match (project_type, kind) {
            (ProjectType::Music, FileKind::Audio) => {
                let artists: IndexMap<String, Vec<FileId>> =
                    files.iter().fold(IndexMap::new(), |mut acc, id| {
                        let artist = vectors[id.index()]
                            .meta("artist")
                            .unwrap_or("Unknown_Artist")
                            .to_string();
                        acc.entry(artist).or_insert_with(Vec::new).push(*id);
                        acc
                    });
                if artists.len() > 1 {
                    return artists;
                }
                for id in files {
                    let key = match vectors[id.index()].meta("album") {
                        Some(album) => album.to_string(),
                        None => format!("Created_{}", stamp(modified(*id), "%Y_%m")),
                    };
                    groups.entry(key).or_default().push(*id);
                }
            }
            (ProjectType::Academic, FileKind::Document) => {
                for id in files {
                    let status = document_status(&vectors[id.index()]);
                    groups.entry(status.to_string()).or_default().push(*id);
                }
            }
            (ProjectType::Photos, FileKind::Image) => {
                for id in files {
                    let vector = &vectors[id.index()];
                    let key = if vector.mentions_any(SCREENSHOT_WORDS) {
                        "Screenshots".to_string()
                    } else if vector.mentions_any(PHOTO_WORDS) {
                        format!("Photos_{}", photo_day(vector, modified(*id)))
                    } else if vector.mentions_any(GRAPHIC_WORDS) {
                        "Graphics".to_string()
                    } else {
                        "Images".to_string()
                    };
                    groups.entry(key).or_default().push(*id);
                }
            }
            _ if files.len() > GENERIC_SPLIT_THRESHOLD => {
                for id in files {
                    let key = format!("Created_{}", stamp(modified(*id), "%Y_%m"));
                    groups.entry(key).or_default().push(*id);
                }
            }
            _ => {}
        }
        groups
    }

    /// Build the full move plan. Project folders get unique names in
    /// project order; destinations are resolved in plan order.
    pub fn plan(
        &self,
        projects: &[Project],
        records: &[FileRecord],
        vectors: &[FeatureVector],
        destination_root: &Path,
    ) -> Result<MovePlan, ConflictError> {
        plan_trees(projects, records, destination_root, |label, project| {
            self.build_tree(label, project, records, vectors)
        })
    }
}

/// One project per file kind, in first-seen order, named after the kind's
/// folder.
pub fn kind_projects(records: &[FileRecord]) -> Vec<Project> {
    let mut by_kind: IndexMap<FileKind, Vec<FileId>> = IndexMap::new();
    for record in records {
        by_kind.entry(record.kind).or_default().push(record.id);
    }
    by_kind
        .into_iter()
        .map(|(kind, members)| Project {
            name: category_folder(ProjectType::General, kind).to_string(),
            project_type: ProjectType::General,
            members,
            confidence: 1.0,
            common: CommonAttributes::default(),
        })
        .collect()
}

/// Move plan with every project's files directly inside its folder.
pub fn flat_plan(
    projects: &[Project],
    records: &[FileRecord],
    destination_root: &Path,
) -> Result<MovePlan, ConflictError> {
    plan_trees(projects, records, destination_root, |label, project| {
        let mut tree = HierarchyNode::new(label);
        tree.files = project.members.clone();
        tree
    })
}

fn plan_trees(
    projects: &[Project],
    records: &[FileRecord],
    destination_root: &Path,
    mut build: impl FnMut(&str, &Project) -> HierarchyNode,
) -> Result<MovePlan, ConflictError> {
    let mut plan = MovePlan {
        destination_root: destination_root.to_path_buf(),
        ..MovePlan::default()
    };
    let mut used = HashSet::new();
    let mut registry = DestinationRegistry::new();

    for (index, project) in projects.iter().enumerate() {
        let label = unique_folder(&mut used, &sanitize_folder_name(&project.name));
        let tree = build(&label, project);
        debug!(project = %label, depth = tree.depth(), files = tree.file_count(), "project tree");

        for (file, dir) in tree.assignments(destination_root) {
            let record = &records[file.index()];
            let desired = dir.join(record.name.as_str());
            let (destination, action) = registry.claim(&desired, &record.path)?;
            plan.entries.push(MovePlanEntry {
                file,
                project: index,
                source: record.path.clone(),
                destination,
                action,
            });
        }
        plan.layouts.push(ProjectLayout {
            project: index,
            tree,
        });
    }
    Ok(plan)
}

/// Day a photo was taken (EXIF when parseable, else modification time).
fn photo_day(vector: &FeatureVector, modified: SystemTime) -> String {
    vector
        .meta("taken")
        .and_then(|taken| taken.get(..10))
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .map(|day| day.format("%Y_%m_%d").to_string())
        .unwrap_or_else(|| stamp(modified, "%Y_%m_%d"))
}

fn unique_folder(used: &mut HashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut n = 1;
    while !used.insert(candidate.clone()) {
        n += 1;
        candidate = format!("{base}_{n}");
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn file(id: u32, name: &str, kind: FileKind) -> (FileRecord, FeatureVector) {
        let record = FileRecord::new(
            FileId::new(id),
            PathBuf::from("/nonexistent/kinship/inbox").join(name),
            1,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            kind,
        );
        let vector = crate::features::name_features(&record);
        (record, vector)
    }

    fn project(name: &str, project_type: ProjectType, members: &[u32]) -> Project {
        Project {
            name: name.to_string(),
            project_type,
            members: members.iter().map(|i| FileId::new(*i)).collect(),
            confidence: 0.8,
            common: Default::default(),
        }
    }

    fn split(files: Vec<(FileRecord, FeatureVector)>) -> (Vec<FileRecord>, Vec<FeatureVector>) {
        files.into_iter().unzip()
    }

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_folder_name("AC/DC: Live?"), "AC_DC_ Live");
        assert_eq!(sanitize_folder_name("__a___b__"), "a_b");
        assert_eq!(sanitize_folder_name("///"), "Untitled");
        assert_eq!(sanitize_folder_name(".."), "Untitled");
        assert_eq!(sanitize_folder_name(&"x".repeat(80)).len(), MAX_FOLDER_NAME);
    }

    #[test]
    fn test_category_folder() {
        assert_eq!(category_folder(ProjectType::Music, FileKind::Audio), "Songs");
        assert_eq!(category_folder(ProjectType::Music, FileKind::Video), "Videos");
        assert_eq!(category_folder(ProjectType::Academic, FileKind::Image), "Figures_Images");
        assert_eq!(category_folder(ProjectType::Work, FileKind::Spreadsheet), "Spreadsheets");
    }

    #[test]
    fn test_small_groups_flatten() {
        let (records, vectors) = split(vec![
            file(0, "midnight_song1.mp3", FileKind::Audio),
            file(1, "midnight_song2.mp3", FileKind::Audio),
            file(2, "midnight_album_art.jpg", FileKind::Image),
            file(3, "midnight_lyrics.txt", FileKind::Document),
        ]);
        let project = project("Music_Project_Midnight", ProjectType::Music, &[0, 1, 2, 3]);
        let tree = HierarchyBuilder::default().build_tree("M", &project, &records, &vectors);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.files.len(), 4);
    }

    #[test]
    fn test_status_subfolders() {
        let (records, vectors) = split(vec![
            file(0, "thesis_draft1.docx", FileKind::Document),
            file(1, "thesis_draft2.docx", FileKind::Document),
            file(2, "thesis_draft3.docx", FileKind::Document),
            file(3, "thesis_final.docx", FileKind::Document),
            file(4, "thesis_final_v2.docx", FileKind::Document),
            file(5, "thesis_submission.docx", FileKind::Document),
            file(6, "thesis_notes.txt", FileKind::Document),
        ]);
        let project = project(
            "Academic_Project_Thesis",
            ProjectType::Academic,
            &[0, 1, 2, 3, 4, 5, 6],
        );
        let tree = HierarchyBuilder::default().build_tree("A", &project, &records, &vectors);

        let papers = &tree.children["Papers_Documents"];
        assert_eq!(papers.children["Drafts"].files.len(), 3);
        assert_eq!(papers.children["Final_Documents"].files.len(), 3);
        assert_eq!(papers.files, vec![FileId::new(6)]);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_single_qualifying_subgroup_stays_flat() {
        let (records, vectors) = split(vec![
            file(0, "thesis_draft1.docx", FileKind::Document),
            file(1, "thesis_draft2.docx", FileKind::Document),
            file(2, "thesis_draft3.docx", FileKind::Document),
            file(3, "thesis_final.docx", FileKind::Document),
            file(4, "thesis_notes.txt", FileKind::Document),
        ]);
        let project = project("Academic_Project_Thesis", ProjectType::Academic, &[0, 1, 2, 3, 4]);
        let tree = HierarchyBuilder::default().build_tree("A", &project, &records, &vectors);

        let papers = &tree.children["Papers_Documents"];
        assert!(papers.children.is_empty());
        assert_eq!(papers.files.len(), 5);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_depth_cap() {
        let (records, vectors) = split(vec![
            file(0, "thesis_draft1.docx", FileKind::Document),
            file(1, "thesis_draft2.docx", FileKind::Document),
            file(2, "thesis_draft3.docx", FileKind::Document),
            file(3, "thesis_final.docx", FileKind::Document),
        ]);
        let project = project("Academic_Project_Thesis", ProjectType::Academic, &[0, 1, 2, 3]);
        let config = OrganizeConfig {
            max_depth: 2,
            ..OrganizeConfig::default()
        };
        let tree = HierarchyBuilder::new(&config).build_tree("A", &project, &records, &vectors);
        assert_eq!(tree.depth(), 2);

        let config = OrganizeConfig {
            max_depth: 1,
            ..OrganizeConfig::default()
        };
        let tree = HierarchyBuilder::new(&config).build_tree("A", &project, &records, &vectors);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_artist_folders() {
        let (records, mut vectors) = split(vec![
            file(0, "a.mp3", FileKind::Audio),
            file(1, "b.mp3", FileKind::Audio),
            file(2, "c.mp3", FileKind::Audio),
            file(3, "d.mp3", FileKind::Audio),
            file(4, "e.mp3", FileKind::Audio),
            file(5, "f.mp3", FileKind::Audio),
        ]);
        for (i, v) in vectors.iter_mut().enumerate() {
            let artist = if i < 3 { "Owls" } else { "Larks" };
            v.metadata.insert("artist".into(), artist.into());
        }
        let project = project("Music_Project_Night", ProjectType::Music, &[0, 1, 2, 3, 4, 5]);
        let tree = HierarchyBuilder::default().build_tree("M", &project, &records, &vectors);
        let songs = &tree.children["Songs"];
        let labels: Vec<&str> = songs.children.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["Owls", "Larks"]);
    }

    #[test]
    fn test_plan_unique_folders_and_conflicts() {
        let (records, vectors) = split(vec![
            file(0, "report.pdf", FileKind::Document),
            file(1, "budget.xlsx", FileKind::Spreadsheet),
        ]);
        // Same file name in two directories of one project.
        let mut records = records;
        records.push(FileRecord::new(
            FileId::new(2),
            "/nonexistent/kinship/other/report.pdf",
            1,
            SystemTime::UNIX_EPOCH,
            FileKind::Document,
        ));
        let mut vectors = vectors;
        vectors.push(crate::features::name_features(&records[2]));

        let projects = vec![
            project("Work/Project", ProjectType::Work, &[0, 2]),
            project("Work:Project", ProjectType::Work, &[1]),
        ];
        let plan = HierarchyBuilder::default()
            .plan(&projects, &records, &vectors, Path::new("/nonexistent/kinship/out"))
            .unwrap();

        let labels: Vec<&str> = plan.layouts.iter().map(|l| l.tree.label.as_str()).collect();
        assert_eq!(labels, vec!["Work_Project", "Work_Project_2"]);

        let names: Vec<String> = plan
            .entries
            .iter()
            .map(|e| e.destination.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["report.pdf", "report_1.pdf", "budget.xlsx"]);
        assert_eq!(plan.conflict_count(), 1);
    }

    #[test]
    fn test_kind_projects_flat_plan() {
        let (records, _) = split(vec![
            file(0, "report.pdf", FileKind::Document),
            file(1, "beach.jpg", FileKind::Image),
            file(2, "notes.txt", FileKind::Document),
        ]);
        let mut records = records;
        records.push(FileRecord::new(
            FileId::new(3),
            "/nonexistent/kinship/other/notes.txt",
            1,
            SystemTime::UNIX_EPOCH,
            FileKind::Document,
        ));

        let projects = kind_projects(&records);
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Documents", "Images"]);
        assert_eq!(projects[0].members.len(), 3);

        let out = Path::new("/nonexistent/kinship/out");
        let plan = flat_plan(&projects, &records, out).unwrap();
        let destinations: Vec<PathBuf> = plan.entries.iter().map(|e| e.destination.clone()).collect();
        assert_eq!(
            destinations,
            vec![
                out.join("Documents/report.pdf"),
                out.join("Documents/notes.txt"),
                out.join("Documents/notes_1.txt"),
                out.join("Images/beach.jpg"),
            ]
        );
        assert_eq!(plan.conflict_count(), 1);
        assert!(plan.layouts.iter().all(|l| l.tree.depth() == 1));
    }

    #[test]
    fn test_unique_folder() {
        let mut used = HashSet::new();
        assert_eq!(unique_folder(&mut used, "A"), "A");
        assert_eq!(unique_folder(&mut used, "A_2"), "A_2");
        assert_eq!(unique_folder(&mut used, "A"), "A_3");
        assert_eq!(unique_folder(&mut used, "A"), "A_4");
    }
}
