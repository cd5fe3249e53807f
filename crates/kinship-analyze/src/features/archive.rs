//! Entry listings of zip and tar archives.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use kinship_core::{ExtractionError, FileRecord};

use super::Extracted;

/// Entries listed per archive.
const MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Zip,
    Tar,
    TarGz,
    TarXz,
    TarBz2,
}

impl Format {
    fn detect(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else {
            None
        }
    }
}

pub(super) fn extract(record: &FileRecord) -> Result<Extracted, ExtractionError> {
    // Bare compressed streams, rar and 7z have no listing we can read.
    let Some(format) = Format::detect(&record.name) else {
        return Ok(Extracted::default());
    };

    let names = match format {
        Format::Zip => zip_names(&record.path)?,
        Format::Tar => tar_names(open(&record.path)?)?,
        Format::TarGz => tar_names(GzDecoder::new(open(&record.path)?))?,
        Format::TarXz => tar_names(XzDecoder::new(open(&record.path)?))?,
        Format::TarBz2 => tar_names(BzDecoder::new(open(&record.path)?))?,
    };

    let text = names
        .iter()
        .map(|n| n.replace(['/', '\\', '_', '-', '.'], " "))
        .collect::<Vec<_>>()
        .join("\n");
    let mut extracted = Extracted {
        text,
        ..Extracted::default()
    };
    extracted.insert("entries", names.len().to_string());
    Ok(extracted)
}

fn open(path: &Path) -> Result<BufReader<File>, ExtractionError> {
    Ok(BufReader::new(File::open(path)?))
}

fn zip_names(path: &Path) -> Result<Vec<String>, ExtractionError> {
    let archive = zip::ZipArchive::new(open(path)?)
        .map_err(|e| ExtractionError::malformed("zip", e))?;
    Ok(archive
        .file_names()
        .take(MAX_ENTRIES)
        .map(String::from)
        .collect())
}

fn tar_names<R: Read>(reader: R) -> Result<Vec<String>, ExtractionError> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| ExtractionError::malformed("tar", e))?;

    let mut names = Vec::new();
    for entry in entries.take(MAX_ENTRIES) {
        let entry = entry.map_err(|e| ExtractionError::malformed("tar", e))?;
        let path = entry
            .path()
            .map_err(|e| ExtractionError::malformed("tar", e))?;
        names.push(path.to_string_lossy().into_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinship_core::{FileId, FileKind};
    use std::io::Write;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn record(path: &Path) -> FileRecord {
        FileRecord::new(FileId::new(0), path, 0, SystemTime::UNIX_EPOCH, FileKind::Archive)
    }

    #[test]
    fn test_format_detect() {
        assert_eq!(Format::detect("a.ZIP"), Some(Format::Zip));
        assert_eq!(Format::detect("a.tar.gz"), Some(Format::TarGz));
        assert_eq!(Format::detect("a.tbz2"), Some(Format::TarBz2));
        assert_eq!(Format::detect("a.gz"), None);
        assert_eq!(Format::detect("a.7z"), None);
    }

    #[test]
    fn test_zip_listing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stems.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("midnight/vocals_take.wav", options).unwrap();
        zip.write_all(b"RIFF").unwrap();
        zip.finish().unwrap();

        let extracted = extract(&record(&path)).unwrap();
        assert!(extracted.text.contains("midnight vocals take wav"));
        assert_eq!(extracted.metadata["entries"], "1");
    }

    #[test]
    fn test_tar_gz_listing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("photos.tar.gz");
        let encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        let data = b"jpeg";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "vacation/beach.jpg", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let extracted = extract(&record(&path)).unwrap();
        assert!(extracted.text.contains("vacation beach jpg"));
    }

    #[test]
    fn test_corrupt_zip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.zip");
        std::fs::write(&path, "nope").unwrap();
        assert!(extract(&record(&path)).is_err());
    }
}
