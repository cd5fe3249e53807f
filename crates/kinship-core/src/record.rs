//! Discovered file records.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Stable identifier of a file: its index in discovery order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FileId(pub u32);

impl FileId {
    /// Create a new FileId from a discovery index.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Index into per-file arenas.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Broad content category detected from the file extension.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileKind {
    Document,
    Spreadsheet,
    Presentation,
    Image,
    Audio,
    Video,
    Archive,
    #[default]
    Other,
}

impl FileKind {
    /// Whether text can be pulled out of the file body.
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Document | Self::Spreadsheet | Self::Presentation)
    }
}

/// Immutable identity of a discovered file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Position in discovery order.
    pub id: FileId,
    /// Absolute path at discovery time.
    pub path: PathBuf,
    /// File name (last path component).
    pub name: CompactString,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Detected content category.
    pub kind: FileKind,
    /// Lowercase extension without the leading dot (empty if none).
    pub extension: CompactString,
}

impl FileRecord {
    /// Create a record, deriving name and extension from the path.
    pub fn new(
        id: FileId,
        path: impl Into<PathBuf>,
        size: u64,
        modified: SystemTime,
        kind: FileKind,
    ) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_default();
        let extension = extension_of(&path);
        Self {
            id,
            path,
            name,
            size,
            modified,
            kind,
            extension,
        }
    }

    /// File stem (name without the final extension).
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => self.name.as_str(),
            Some(idx) => &self.name[..idx],
        }
    }

    /// Immediate parent directory.
    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Lowercase extension of a path, without the dot.
pub(crate) fn extension_of(path: &Path) -> CompactString {
    path.extension()
        .map(|e| CompactString::new(e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_derives_name_and_extension() {
        let record = FileRecord::new(
            FileId::new(3),
            "/music/Midnight_Song1.MP3",
            2048,
            SystemTime::UNIX_EPOCH,
            FileKind::Audio,
        );
        assert_eq!(record.name.as_str(), "Midnight_Song1.MP3");
        assert_eq!(record.extension.as_str(), "mp3");
        assert_eq!(record.stem(), "Midnight_Song1");
        assert_eq!(record.parent(), Path::new("/music"));
    }

    #[test]
    fn test_dotfile_stem() {
        let record = FileRecord::new(
            FileId::new(0),
            "/home/.profile",
            1,
            SystemTime::UNIX_EPOCH,
            FileKind::Other,
        );
        assert_eq!(record.stem(), ".profile");
    }

    #[test]
    fn test_file_kind_parse() {
        assert_eq!("audio".parse::<FileKind>().unwrap(), FileKind::Audio);
        assert_eq!(FileKind::Presentation.to_string(), "presentation");
        assert!(FileKind::Spreadsheet.is_textual());
        assert!(!FileKind::Image.is_textual());
    }
}
