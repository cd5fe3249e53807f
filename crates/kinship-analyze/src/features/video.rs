//! Video metadata from file name markers.

use kinship_core::FileRecord;

use super::Extracted;
use crate::tokenize::split_name;

const RESOLUTIONS: &[&str] = &["480p", "720p", "1080p", "1440p", "2160p", "4k", "8k"];

pub(super) fn extract(record: &FileRecord) -> Extracted {
    let mut extracted = Extracted::default();
    extracted.insert("container", record.extension.as_str());

    let pieces = split_name(record.stem());
    // Letter/digit splitting turns "1080p" into ["1080", "p"].
    let joined: Vec<String> = pieces
        .windows(2)
        .map(|w| format!("{}{}", w[0], w[1]))
        .collect();
    if let Some(resolution) = joined
        .iter()
        .find(|j| RESOLUTIONS.contains(&j.as_str()))
    {
        extracted.insert("resolution", resolution);
    }

    if let Some(year) = pieces.iter().find(|p| is_year(p)) {
        extracted.insert("year", year);
    }
    extracted
}

fn is_year(piece: &str) -> bool {
    piece.len() == 4
        && (piece.starts_with("19") || piece.starts_with("20"))
        && piece.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinship_core::{FileId, FileKind};
    use std::time::SystemTime;

    fn record(path: &str) -> FileRecord {
        FileRecord::new(FileId::new(0), path, 0, SystemTime::UNIX_EPOCH, FileKind::Video)
    }

    #[test]
    fn test_markers() {
        let extracted = extract(&record("/v/Beach_Trip_2023_1080p.MP4"));
        assert_eq!(extracted.metadata["container"], "mp4");
        assert_eq!(extracted.metadata["resolution"], "1080p");
        assert_eq!(extracted.metadata["year"], "2023");
    }

    #[test]
    fn test_no_markers() {
        let extracted = extract(&record("/v/clip.mov"));
        assert_eq!(extracted.metadata.len(), 1);
        assert!(extracted.text.is_empty());
    }
}
