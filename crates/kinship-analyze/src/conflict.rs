//! Destination conflict resolution.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kinship_core::{ConflictError, MoveAction};

/// Highest numeric suffix tried before giving up.
pub const MAX_SUFFIX: u32 = 10_000;

/// Path with a numeric suffix before the extension.
///
/// For "report.pdf" and `n = 1` this is "report_1.pdf".
pub fn suffixed_path(path: &Path, n: u32) -> Result<PathBuf, ConflictError> {
    let parent = path.parent().unwrap_or(Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .ok_or_else(|| ConflictError::NoFileName {
            path: path.to_path_buf(),
        })?;
    let new_name = match path.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    Ok(parent.join(new_name))
}

/// Destinations claimed so far by a plan.
///
/// A destination is free when no earlier entry claimed it and nothing
/// exists at that path on disk (other than the source itself).
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    taken: HashSet<PathBuf>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `desired` for `source`, renaming on conflict.
    pub fn claim(
        &mut self,
        desired: &Path,
        source: &Path,
    ) -> Result<(PathBuf, MoveAction), ConflictError> {
        if desired == source && !self.taken.contains(desired) {
            self.taken.insert(desired.to_path_buf());
            return Ok((desired.to_path_buf(), MoveAction::Skip));
        }
        if self.is_free(desired, source) {
            self.taken.insert(desired.to_path_buf());
            return Ok((desired.to_path_buf(), MoveAction::Move));
        }

        for n in 1..=MAX_SUFFIX {
            let candidate = suffixed_path(desired, n)?;
            if self.is_free(&candidate, source) {
                self.taken.insert(candidate.clone());
                return Ok((candidate, MoveAction::ConflictRenamed));
            }
        }
        Err(ConflictError::Exhausted {
            path: desired.to_path_buf(),
            attempts: MAX_SUFFIX,
        })
    }

    fn is_free(&self, path: &Path, source: &Path) -> bool {
        !self.taken.contains(path) && (path == source || path.symlink_metadata().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_suffixed_path() {
        let path = PathBuf::from("/out/report.pdf");
        assert_eq!(suffixed_path(&path, 1).unwrap(), PathBuf::from("/out/report_1.pdf"));
        let path = PathBuf::from("/out/README");
        assert_eq!(suffixed_path(&path, 2).unwrap(), PathBuf::from("/out/README_2"));
    }

    #[test]
    fn test_planned_conflict_is_renamed() {
        let mut registry = DestinationRegistry::new();
        let dest = Path::new("/nonexistent/kinship/out/report.pdf");
        let (first, action) = registry.claim(dest, Path::new("/a/report.pdf")).unwrap();
        assert_eq!(first, dest);
        assert_eq!(action, MoveAction::Move);

        let (second, action) = registry.claim(dest, Path::new("/b/report.pdf")).unwrap();
        assert_eq!(second, Path::new("/nonexistent/kinship/out/report_1.pdf"));
        assert_eq!(action, MoveAction::ConflictRenamed);
    }

    #[test]
    fn test_existing_file_is_renamed() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("notes.txt");
        std::fs::write(&dest, "already here").unwrap();

        let mut registry = DestinationRegistry::new();
        let (path, action) = registry.claim(&dest, Path::new("/src/notes.txt")).unwrap();
        assert_eq!(path, temp.path().join("notes_1.txt"));
        assert_eq!(action, MoveAction::ConflictRenamed);
    }

    #[test]
    fn test_source_at_destination_is_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("song.mp3");
        std::fs::write(&path, "x").unwrap();

        let mut registry = DestinationRegistry::new();
        let (dest, action) = registry.claim(&path, &path).unwrap();
        assert_eq!(dest, path);
        assert_eq!(action, MoveAction::Skip);
    }
}
