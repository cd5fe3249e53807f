//! Text documents, office containers and PDFs.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, Read};
use std::panic::UnwindSafe;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use kinship_core::{ExtractionError, FileRecord};

use super::Extracted;

/// Bytes read from plain-text files.
const MAX_TEXT_BYTES: u64 = 512 * 1024;
/// Characters kept from any extracted text.
const MAX_TEXT_CHARS: usize = 64 * 1024;
/// Larger PDFs are not parsed at all.
const MAX_PDF_BYTES: u64 = 64 * 1024 * 1024;
/// Pages of a PDF that contribute text.
const MAX_PDF_PAGES: usize = 10;

static XML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("xml tag pattern"));

static CORE_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<dc:(creator|title)[^>]*>([^<]*)</dc:(?:creator|title)>")
        .expect("core property pattern")
});

pub(super) fn extract(record: &FileRecord) -> Result<Extracted, ExtractionError> {
    let path = record.path.as_path();
    let mut extracted = match record.extension.as_str() {
        "docx" => office(path, |name| name == "word/document.xml")?,
        "pptx" => office(path, |name| {
            name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
        })?,
        "xlsx" => office(path, |name| name == "xl/sharedStrings.xml")?,
        "odt" | "ods" | "odp" => office(path, |name| name == "content.xml")?,
        "pdf" => pdf(path)?,
        // Legacy binary formats carry no readable text.
        "doc" | "xls" | "ppt" | "key" => Extracted::default(),
        _ => plain(path)?,
    };

    if extracted.text.len() > MAX_TEXT_CHARS {
        extracted.text = extracted.text.chars().take(MAX_TEXT_CHARS).collect();
    }
    Ok(extracted)
}

fn plain(path: &Path) -> Result<Extracted, ExtractionError> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    BufReader::new(file)
        .take(MAX_TEXT_BYTES)
        .read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let mut extracted = Extracted::default();
    front_matter(&text, &mut extracted);
    extracted.text = text;
    Ok(extracted)
}

/// `title:` and `author:` keys of a leading `---` block.
fn front_matter(text: &str, extracted: &mut Extracted) {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some("---") {
        return;
    }
    for line in lines {
        let line = line.trim();
        if line == "---" {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim().to_ascii_lowercase().as_str() {
                "title" => extracted.insert("title", value),
                "author" => extracted.insert("author", value),
                _ => {}
            }
        }
    }
}

/// Text runs of the matching XML parts of a zip container.
fn office(path: &Path, wanted: impl Fn(&str) -> bool) -> Result<Extracted, ExtractionError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| ExtractionError::malformed("office container", e))?;

    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| wanted(n))
        .map(String::from)
        .collect();
    names.sort();

    let mut extracted = Extracted::default();
    for name in names {
        let xml = read_entry(&mut archive, &name)?;
        let text = strip_xml(&xml);
        extracted.text.push_str(&text);
        extracted.text.push('\n');
        if extracted.text.len() > MAX_TEXT_CHARS {
            break;
        }
    }

    if archive.file_names().any(|n| n == "docProps/core.xml") {
        let core = read_entry(&mut archive, "docProps/core.xml")?;
        for caps in CORE_PROPERTY.captures_iter(&core) {
            let key = if &caps[1] == "creator" { "author" } else { "title" };
            extracted.insert(key, unescape(&caps[2]));
        }
    }
    Ok(extracted)
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, ExtractionError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| ExtractionError::malformed("office container", e))?;
    let mut xml = String::new();
    (&mut entry)
        .take(MAX_TEXT_BYTES * 4)
        .read_to_string(&mut xml)?;
    Ok(xml)
}

fn strip_xml(xml: &str) -> String {
    unescape(&XML_TAG.replace_all(xml, " "))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn pdf(path: &Path) -> Result<Extracted, ExtractionError> {
    pdf_with_limit(path, MAX_PDF_BYTES)
}

/// Text of the first [`MAX_PDF_PAGES`] pages. Files above `max_bytes` are
/// not parsed and keep name-only features.
fn pdf_with_limit(path: &Path, max_bytes: u64) -> Result<Extracted, ExtractionError> {
    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        debug!(path = %path.display(), size, "pdf too large to parse");
        return Ok(Extracted::default());
    }
    let bytes = std::fs::read(path)?;
    let pages = guard_parser("pdf", || pdf_extract::extract_text_from_mem_by_pages(&bytes))?;

    let mut extracted = Extracted::default();
    for page in pages.into_iter().take(MAX_PDF_PAGES) {
        extracted.text.push_str(&page);
        if extracted.text.len() > MAX_TEXT_CHARS {
            break;
        }
    }
    Ok(extracted)
}

/// Run a third-party parser, turning its panics into `Malformed`.
///
/// Relies on panics unwinding; the release profile must not set
/// `panic = "abort"`.
fn guard_parser<T, E: Display>(
    format: &'static str,
    parse: impl FnOnce() -> Result<T, E> + UnwindSafe,
) -> Result<T, ExtractionError> {
    match std::panic::catch_unwind(parse) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ExtractionError::malformed(format, e)),
        Err(_) => Err(ExtractionError::malformed(format, "parser panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinship_core::{FileId, FileKind};
    use std::io::Write;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn record(path: &Path) -> FileRecord {
        FileRecord::new(FileId::new(0), path, 0, SystemTime::UNIX_EPOCH, FileKind::Document)
    }

    #[test]
    fn test_plain_text_with_front_matter() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.md");
        std::fs::write(
            &path,
            "---\ntitle: \"Midnight Lyrics\"\nauthor: Dana\n---\nverse chorus verse\n",
        )
        .unwrap();

        let extracted = extract(&record(&path)).unwrap();
        assert_eq!(extracted.metadata.get("title").unwrap(), "Midnight Lyrics");
        assert_eq!(extracted.metadata.get("author").unwrap(), "Dana");
        assert!(extracted.text.contains("chorus"));
    }

    #[test]
    fn test_docx_text_and_core_properties() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("thesis.docx");
        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(b"<w:document><w:p><w:r><w:t>Thesis research &amp; methods</w:t></w:r></w:p></w:document>")
            .unwrap();
        zip.start_file("docProps/core.xml", options).unwrap();
        zip.write_all(b"<cp:coreProperties><dc:title>Thesis</dc:title><dc:creator>R. Lee</dc:creator></cp:coreProperties>")
            .unwrap();
        zip.finish().unwrap();

        let extracted = extract(&record(&path)).unwrap();
        assert!(extracted.text.contains("research & methods"));
        assert_eq!(extracted.metadata.get("author").unwrap(), "R. Lee");
        assert_eq!(extracted.metadata.get("title").unwrap(), "Thesis");
    }

    #[test]
    fn test_corrupt_docx_is_malformed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.docx");
        std::fs::write(&path, "not a zip").unwrap();

        let err = extract(&record(&path)).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed { .. }));
    }

    #[test]
    fn test_legacy_binary_has_no_text() {
        let extracted = extract(&record(Path::new("/nonexistent/old.doc"))).unwrap();
        assert_eq!(extracted, Extracted::default());
    }

    #[test]
    fn test_parser_panic_degrades() {
        let err = guard_parser("pdf", || -> Result<(), String> { panic!("bad xref table") })
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed { format: "pdf", .. }));
        assert_eq!(err.to_string(), "Malformed pdf: parser panicked");

        let err = guard_parser("pdf", || Err::<(), _>("truncated")).unwrap_err();
        assert_eq!(err.to_string(), "Malformed pdf: truncated");
    }

    #[test]
    fn test_oversized_pdf_is_not_parsed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan.pdf");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        assert_eq!(pdf_with_limit(&path, 1024).unwrap(), Extracted::default());
        let err = pdf_with_limit(&path, MAX_PDF_BYTES).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed { format: "pdf", .. }));
    }
}
