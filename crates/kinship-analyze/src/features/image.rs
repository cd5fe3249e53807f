//! Image dimensions and EXIF header fields.

use std::fs::File;
use std::io::Read;

use kinship_core::{ExtractionError, FileRecord};

use super::Extracted;

/// Bytes scanned for an EXIF block.
const HEADER_BYTES: u64 = 128 * 1024;

const TAG_MAKE: u16 = 0x010f;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TYPE_ASCII: u16 = 2;

pub(super) fn extract(record: &FileRecord) -> Result<Extracted, ExtractionError> {
    let (width, height) = image::image_dimensions(&record.path).map_err(|e| match e {
        image::ImageError::IoError(io) => ExtractionError::Io(io),
        other => ExtractionError::malformed("image", other),
    })?;

    let mut extracted = Extracted::default();
    extracted.insert("width", width.to_string());
    extracted.insert("height", height.to_string());
    let orientation = match width.cmp(&height) {
        std::cmp::Ordering::Greater => "landscape",
        std::cmp::Ordering::Less => "portrait",
        std::cmp::Ordering::Equal => "square",
    };
    extracted.insert("orientation", orientation);

    let mut header = Vec::new();
    File::open(&record.path)?
        .take(HEADER_BYTES)
        .read_to_end(&mut header)?;
    if let Some(exif) = read_exif(&header) {
        if let Some(taken) = exif.taken {
            // "2023:07:14 18:30:00" -> date part becomes the event day.
            let normalized = taken.replacen(':', "-", 2);
            if let Some(day) = normalized.get(..10) {
                extracted.insert("event", day);
            }
            extracted.insert("taken", normalized);
        }
        if let Some(make) = exif.make {
            extracted.insert("camera", make);
        }
    }
    if let Some(camera) = extracted.metadata.get("camera").cloned() {
        extracted.text = camera;
    }
    Ok(extracted)
}

#[derive(Debug, Default, PartialEq)]
struct Exif {
    taken: Option<String>,
    make: Option<String>,
}

/// Locate a TIFF structure (JPEG APP1 `Exif\0\0` block or a bare TIFF file)
/// and read the fields of interest.
fn read_exif(bytes: &[u8]) -> Option<Exif> {
    let start = if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        0
    } else {
        bytes.windows(6).position(|w| w == b"Exif\0\0")? + 6
    };
    let tiff = Tiff::new(&bytes[start..])?;

    let mut exif = Exif::default();
    let ifd0 = tiff.u32_at(4)? as usize;
    let mut date_time = None;
    let mut exif_ifd = None;
    for entry in tiff.entries(ifd0) {
        match entry.tag {
            TAG_MAKE => exif.make = tiff.ascii(&entry),
            TAG_DATE_TIME => date_time = tiff.ascii(&entry),
            TAG_EXIF_IFD => exif_ifd = Some(entry.value_offset as usize),
            _ => {}
        }
    }
    if let Some(offset) = exif_ifd {
        exif.taken = tiff
            .entries(offset)
            .into_iter()
            .find(|e| e.tag == TAG_DATE_TIME_ORIGINAL)
            .and_then(|e| tiff.ascii(&e));
    }
    if exif.taken.is_none() {
        exif.taken = date_time;
    }
    Some(exif)
}

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    value_offset: u32,
    /// Position of the 4-byte value field, for inline values.
    value_pos: usize,
}

struct Tiff<'a> {
    data: &'a [u8],
    little_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let little_endian = match data.get(..2)? {
            b"II" => true,
            b"MM" => false,
            _ => return None,
        };
        Some(Self {
            data,
            little_endian,
        })
    }

    fn u16_at(&self, pos: usize) -> Option<u16> {
        let b: [u8; 2] = self.data.get(pos..pos + 2)?.try_into().ok()?;
        Some(if self.little_endian {
            u16::from_le_bytes(b)
        } else {
            u16::from_be_bytes(b)
        })
    }

    fn u32_at(&self, pos: usize) -> Option<u32> {
        let b: [u8; 4] = self.data.get(pos..pos + 4)?.try_into().ok()?;
        Some(if self.little_endian {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    fn entries(&self, offset: usize) -> Vec<Entry> {
        let Some(count) = self.u16_at(offset) else {
            return Vec::new();
        };
        (0..usize::from(count))
            .map_while(|i| {
                let pos = offset + 2 + i * 12;
                Some(Entry {
                    tag: self.u16_at(pos)?,
                    kind: self.u16_at(pos + 2)?,
                    count: self.u32_at(pos + 4)?,
                    value_offset: self.u32_at(pos + 8)?,
                    value_pos: pos + 8,
                })
            })
            .collect()
    }

    fn ascii(&self, entry: &Entry) -> Option<String> {
        if entry.kind != TYPE_ASCII {
            return None;
        }
        let len = entry.count as usize;
        let pos = if len <= 4 {
            entry.value_pos
        } else {
            entry.value_offset as usize
        };
        let raw = self.data.get(pos..pos.checked_add(len)?)?;
        let text: String = raw
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| char::from(*b))
            .collect();
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}
