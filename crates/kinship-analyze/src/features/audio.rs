//! ID3 tags of audio files.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use kinship_core::{ExtractionError, FileRecord};

use super::Extracted;

/// Largest ID3v2 tag body read.
const MAX_TAG_BYTES: usize = 1024 * 1024;

/// ID3v2.3/2.4 frame ids and ID3v2.2 equivalents.
const FRAMES: &[(&str, &str, &str)] = &[
    ("TIT2", "TT2", "title"),
    ("TPE1", "TP1", "artist"),
    ("TALB", "TAL", "album"),
    ("TCON", "TCO", "genre"),
    ("TYER", "TYE", "year"),
    ("TDRC", "TYE", "year"),
];

pub(super) fn extract(record: &FileRecord) -> Result<Extracted, ExtractionError> {
    let mut file = File::open(&record.path)?;
    let mut extracted = Extracted::default();

    read_id3v2(&mut file, &mut extracted)?;
    if extracted.metadata.is_empty() {
        read_id3v1(&mut file, &mut extracted)?;
    }

    if let Some(genre) = extracted.metadata.get("genre").cloned() {
        extracted.insert("genre", strip_genre_ref(&genre));
    }
    if let Some(year) = extracted.metadata.get("year").cloned() {
        extracted.insert("year", year.chars().take(4).collect::<String>());
    }

    extracted.text = ["title", "artist", "album", "genre"]
        .iter()
        .filter_map(|k| extracted.metadata.get(*k))
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    Ok(extracted)
}

fn read_id3v2(file: &mut File, extracted: &mut Extracted) -> Result<(), ExtractionError> {
    let mut header = [0u8; 10];
    file.seek(SeekFrom::Start(0))?;
    if read_up_to(file, &mut header)? < 10 || &header[..3] != b"ID3" {
        return Ok(());
    }
    let version = header[3];
    let size = syncsafe(&header[6..10]).min(MAX_TAG_BYTES);
    let mut body = vec![0u8; size];
    let read = read_up_to(file, &mut body)?;
    body.truncate(read);

    let (id_len, header_len) = if version == 2 { (3, 6) } else { (4, 10) };
    let mut pos = 0;
    while pos + header_len <= body.len() {
        let id = &body[pos..pos + id_len];
        if id.iter().all(|b| *b == 0) {
            break;
        }
        let frame_size = match version {
            2 => u32::from_be_bytes([0, body[pos + 3], body[pos + 4], body[pos + 5]]) as usize,
            4 => syncsafe(&body[pos + 4..pos + 8]),
            _ => u32::from_be_bytes([body[pos + 4], body[pos + 5], body[pos + 6], body[pos + 7]])
                as usize,
        };
        let start = pos + header_len;
        let end = start.saturating_add(frame_size);
        if frame_size == 0 || end > body.len() {
            break;
        }

        let id = std::str::from_utf8(id).unwrap_or_default();
        if let Some(key) = frame_key(id, version) {
            if !extracted.metadata.contains_key(key) {
                extracted.insert(key, decode_text(&body[start..end]));
            }
        }
        pos = end;
    }
    Ok(())
}

fn frame_key(id: &str, version: u8) -> Option<&'static str> {
    FRAMES
        .iter()
        .find(|(v3, v2, _)| if version == 2 { *v2 == id } else { *v3 == id })
        .map(|(_, _, key)| *key)
}

fn read_id3v1(file: &mut File, extracted: &mut Extracted) -> Result<(), ExtractionError> {
    let len = file.metadata()?.len();
    if len < 128 {
        return Ok(());
    }
    let mut tag = [0u8; 128];
    file.seek(SeekFrom::End(-128))?;
    file.read_exact(&mut tag)?;
    if &tag[..3] != b"TAG" {
        return Ok(());
    }
    extracted.insert("title", latin1(&tag[3..33]));
    extracted.insert("artist", latin1(&tag[33..63]));
    extracted.insert("album", latin1(&tag[63..93]));
    extracted.insert("year", latin1(&tag[93..97]));
    Ok(())
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn syncsafe(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take(4)
        .fold(0usize, |acc, b| (acc << 7) | usize::from(b & 0x7f))
}

/// Decode an ID3 text frame body (encoding byte followed by text).
fn decode_text(frame: &[u8]) -> String {
    let Some((&encoding, text)) = frame.split_first() else {
        return String::new();
    };
    let decoded = match encoding {
        1 => utf16(text, None),
        2 => utf16(text, Some(true)),
        3 => String::from_utf8_lossy(text).into_owned(),
        _ => latin1(text),
    };
    // Multiple values are NUL separated; keep the first.
    decoded
        .split('\0')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn utf16(bytes: &[u8], big_endian: Option<bool>) -> String {
    let (big_endian, body) = match (big_endian, bytes) {
        (Some(be), _) => (be, bytes),
        (None, [0xfe, 0xff, rest @ ..]) => (true, rest),
        (None, [0xff, 0xfe, rest @ ..]) => (false, rest),
        (None, _) => (false, bytes),
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| {
            if big_endian {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn latin1(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| char::from(*b))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `(17)Rock` and `(17)` style genre references.
fn strip_genre_ref(genre: &str) -> String {
    let trimmed = genre.trim();
    if let Some(rest) = trimmed.strip_prefix('(') {
        if let Some((number, name)) = rest.split_once(')') {
            if number.chars().all(|c| c.is_ascii_digit()) && !name.trim().is_empty() {
                return name.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}
