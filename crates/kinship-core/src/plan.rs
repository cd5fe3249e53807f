//! Folder hierarchies and move plans.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::record::FileId;

/// One level of the output folder tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Folder name of this level.
    pub label: String,
    /// Sub-folders in insertion order.
    pub children: IndexMap<String, HierarchyNode>,
    /// Files placed directly in this folder.
    pub files: Vec<FileId>,
}

impl HierarchyNode {
    /// Create an empty node.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: IndexMap::new(),
            files: Vec::new(),
        }
    }

    /// Number of folder levels in this subtree, counting this node.
    pub fn depth(&self) -> usize {
        1 + self.children.values().map(HierarchyNode::depth).max().unwrap_or(0)
    }

    /// Total number of files in this subtree.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.children.values().map(HierarchyNode::file_count).sum::<usize>()
    }

    /// Get or create the child folder with the given label.
    pub fn child_mut(&mut self, label: &str) -> &mut HierarchyNode {
        self.children
            .entry(label.to_string())
            .or_insert_with(|| HierarchyNode::new(label))
    }

    /// Destination directory of every file in the subtree, rooted at `base`.
    ///
    /// Files of a node come before the files of its children; children are
    /// visited in insertion order.
    pub fn assignments(&self, base: &Path) -> Vec<(FileId, PathBuf)> {
        let mut out = Vec::with_capacity(self.file_count());
        self.collect_assignments(&base.join(&self.label), &mut out);
        out
    }

    fn collect_assignments(&self, dir: &Path, out: &mut Vec<(FileId, PathBuf)>) {
        out.extend(self.files.iter().map(|id| (*id, dir.to_path_buf())));
        for child in self.children.values() {
            child.collect_assignments(&dir.join(&child.label), out);
        }
    }
}

/// Folder tree of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectLayout {
    /// Index of the project in detection order.
    pub project: usize,
    /// Root of the project tree; its label is the unique project folder.
    pub tree: HierarchyNode,
}

/// What the executor does with a planned entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MoveAction {
    /// Move the file to its destination.
    Move,
    /// The file already sits at its destination.
    Skip,
    /// Move under a suffixed name because the destination was taken.
    ConflictRenamed,
}

/// One planned relocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePlanEntry {
    /// File being relocated.
    pub file: FileId,
    /// Index of the owning project.
    pub project: usize,
    /// Current location.
    pub source: PathBuf,
    /// Planned location.
    pub destination: PathBuf,
    /// Planned action.
    pub action: MoveAction,
}

/// Complete, ordered move plan for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovePlan {
    /// Directory every project folder is created under.
    pub destination_root: PathBuf,
    /// Per-project folder trees, in project order.
    pub layouts: Vec<ProjectLayout>,
    /// Entries in project order, then tree order.
    pub entries: Vec<MovePlanEntry>,
}

impl MovePlan {
    /// Entries that relocate a file.
    pub fn moves(&self) -> impl Iterator<Item = &MovePlanEntry> {
        self.entries.iter().filter(|e| e.action != MoveAction::Skip)
    }

    /// Number of entries renamed to avoid a collision.
    pub fn conflict_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.action == MoveAction::ConflictRenamed)
            .count()
    }

    /// Entries belonging to one project.
    pub fn entries_for(&self, project: usize) -> impl Iterator<Item = &MovePlanEntry> {
        self.entries.iter().filter(move |e| e.project == project)
    }

    /// Check if the plan has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.moves().next().is_none()
    }

    /// Human-readable preview of every planned move.
    pub fn preview(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Destination: {}", self.destination_root.display());
        for layout in &self.layouts {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}/", layout.tree.label);
            for entry in self.entries_for(layout.project) {
                let shown = entry
                    .destination
                    .strip_prefix(&self.destination_root)
                    .unwrap_or(&entry.destination);
                let marker = match entry.action {
                    MoveAction::Move => "",
                    MoveAction::Skip => " (already in place)",
                    MoveAction::ConflictRenamed => " (renamed)",
                };
                let _ = writeln!(
                    out,
                    "  {} <- {}{}",
                    shown.display(),
                    entry.source.display(),
                    marker
                );
            }
        }
        out
    }
}
