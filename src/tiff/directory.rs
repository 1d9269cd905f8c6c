//! Directory (IFD) chain walking and tag value reading.
//!
//! Each directory in a plane file describes one plane. The engine walks the
//! chain once per opened decoder to learn how many planes a file carries,
//! then reads individual directories lazily as planes are requested.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::DecodeError;

use super::header::{ByteOrder, PlaneFileHeader, BIGTIFF_HEADER_LEN};

// =============================================================================
// Tags and field types
// =============================================================================

pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_IMAGE_DESCRIPTION: u16 = 270;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_ROWS_PER_STRIP: u16 = 278;
pub const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub const TAG_PLANAR_CONFIGURATION: u16 = 284;
pub const TAG_TILE_WIDTH: u16 = 322;
pub const TAG_TILE_LENGTH: u16 = 323;
pub const TAG_TILE_OFFSETS: u16 = 324;
pub const TAG_TILE_BYTE_COUNTS: u16 = 325;

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_LONG8: u16 = 16;

/// Upper bound on values read for one tag. Strip/tile offset arrays of real
/// plane files stay far below this; anything larger is a corrupt count.
const MAX_VALUES_PER_TAG: u64 = 4_000_000;

/// Upper bound on directories in one file.
const MAX_DIRECTORIES: usize = 65_536;

fn type_size(field_type: u16) -> Option<u64> {
    match field_type {
        TYPE_BYTE | TYPE_ASCII => Some(1),
        TYPE_SHORT => Some(2),
        TYPE_LONG => Some(4),
        TYPE_LONG8 => Some(8),
        _ => None,
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One directory entry: a tag, a field type, a value count and either an
/// inline value or an offset to the value data.
#[derive(Debug, Clone)]
pub struct Entry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u64,
    /// Raw bytes of the value/offset field (4 bytes classic, 8 BigTIFF)
    value_field: [u8; 8],
    value_field_len: usize,
}

impl Entry {
    /// Whether the value data fits in the value/offset field itself.
    fn is_inline(&self) -> Result<bool, DecodeError> {
        let size = type_size(self.field_type).ok_or(DecodeError::InvalidTagValue {
            tag: "unknown",
            message: format!("unknown field type {}", self.field_type),
        })?;
        Ok(size.saturating_mul(self.count) <= self.value_field_len as u64)
    }

    fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_field_len == 8 {
            byte_order.read_u64(&self.value_field)
        } else {
            byte_order.read_u32(&self.value_field[..4]) as u64
        }
    }
}

// =============================================================================
// Directory
// =============================================================================

/// One parsed directory: its entries and the offset of the next directory
/// in the chain (0 = end).
#[derive(Debug, Clone)]
pub struct Directory {
    pub offset: u64,
    pub next_offset: u64,
    entries: Vec<Entry>,
}

impl Directory {
    /// Read the directory at `offset`.
    pub fn read(
        file: &mut File,
        header: &PlaneFileHeader,
        offset: u64,
    ) -> Result<Self, DecodeError> {
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DecodeError::Io(e.to_string()))?;

        let mut count_buf = [0u8; 8];
        let count_len = header.count_field_len();
        read_exact(file, &mut count_buf[..count_len])?;
        let entry_count = if header.big_tiff {
            header.byte_order.read_u64(&count_buf)
        } else {
            header.byte_order.read_u16(&count_buf[..2]) as u64
        };

        if entry_count as usize > MAX_DIRECTORIES {
            return Err(DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("implausible entry count {entry_count}"),
            });
        }

        let entry_len = header.entry_len();
        let mut raw = vec![0u8; entry_len * entry_count as usize];
        read_exact(file, &mut raw)?;

        let value_field_len = header.offset_field_len();
        let mut entries = Vec::with_capacity(entry_count as usize);
        for chunk in raw.chunks_exact(entry_len) {
            let tag = header.byte_order.read_u16(&chunk[0..2]);
            let field_type = header.byte_order.read_u16(&chunk[2..4]);
            let count = if header.big_tiff {
                header.byte_order.read_u64(&chunk[4..12])
            } else {
                header.byte_order.read_u32(&chunk[4..8]) as u64
            };

            let mut value_field = [0u8; 8];
            let value_start = entry_len - value_field_len;
            value_field[..value_field_len]
                .copy_from_slice(&chunk[value_start..value_start + value_field_len]);

            entries.push(Entry {
                tag,
                field_type,
                count,
                value_field,
                value_field_len,
            });
        }

        let mut next_buf = [0u8; 8];
        let next_len = header.offset_field_len();
        read_exact(file, &mut next_buf[..next_len])?;
        let next_offset = if header.big_tiff {
            header.byte_order.read_u64(&next_buf)
        } else {
            header.byte_order.read_u32(&next_buf[..4]) as u64
        };

        Ok(Directory {
            offset,
            next_offset,
            entries,
        })
    }

    /// Look up an entry by tag.
    pub fn entry(&self, tag: u16) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Read all numeric values of a tag, widened to u64.
    ///
    /// Returns `Ok(None)` when the tag is absent.
    pub fn values(
        &self,
        file: &mut File,
        header: &PlaneFileHeader,
        tag: u16,
    ) -> Result<Option<Vec<u64>>, DecodeError> {
        let entry = match self.entry(tag) {
            Some(e) => e,
            None => return Ok(None),
        };

        if entry.count > MAX_VALUES_PER_TAG {
            return Err(DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("implausible value count {} for tag {}", entry.count, tag),
            });
        }

        let elem_size = type_size(entry.field_type).ok_or(DecodeError::InvalidTagValue {
            tag: "directory",
            message: format!("unknown field type {} for tag {}", entry.field_type, tag),
        })?;
        let data_len = (elem_size * entry.count) as usize;

        let mut data = vec![0u8; data_len];
        if entry.is_inline()? {
            data.copy_from_slice(&entry.value_field[..data_len]);
        } else {
            let offset = entry.value_offset(header.byte_order);
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| DecodeError::Io(e.to_string()))?;
            read_exact(file, &mut data)?;
        }

        let mut values = Vec::with_capacity(entry.count as usize);
        for chunk in data.chunks_exact(elem_size as usize) {
            let value = match entry.field_type {
                TYPE_BYTE | TYPE_ASCII => chunk[0] as u64,
                TYPE_SHORT => header.byte_order.read_u16(chunk) as u64,
                TYPE_LONG => header.byte_order.read_u32(chunk) as u64,
                TYPE_LONG8 => header.byte_order.read_u64(chunk),
                _ => unreachable!(),
            };
            values.push(value);
        }

        Ok(Some(values))
    }

    /// Read the first numeric value of a tag, if present.
    pub fn first_value(
        &self,
        file: &mut File,
        header: &PlaneFileHeader,
        tag: u16,
    ) -> Result<Option<u64>, DecodeError> {
        Ok(self.values(file, header, tag)?.and_then(|v| v.into_iter().next()))
    }

    /// Read an ASCII tag as text, trimming trailing NULs.
    pub fn ascii(
        &self,
        file: &mut File,
        header: &PlaneFileHeader,
        tag: u16,
    ) -> Result<Option<String>, DecodeError> {
        let entry = match self.entry(tag) {
            Some(e) => e,
            None => return Ok(None),
        };

        if entry.field_type != TYPE_ASCII {
            return Err(DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("tag {} is not ASCII", tag),
            });
        }
        if entry.count > MAX_VALUES_PER_TAG {
            return Err(DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("implausible text length {}", entry.count),
            });
        }

        let mut data = vec![0u8; entry.count as usize];
        if entry.is_inline()? {
            let len = data.len();
            data.copy_from_slice(&entry.value_field[..len]);
        } else {
            let offset = entry.value_offset(header.byte_order);
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| DecodeError::Io(e.to_string()))?;
            read_exact(file, &mut data)?;
        }

        while data.last() == Some(&0) {
            data.pop();
        }

        String::from_utf8(data)
            .map(Some)
            .map_err(|e| DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("non-UTF-8 text for tag {tag}: {e}"),
            })
    }
}

// =============================================================================
// Chain walking
// =============================================================================

/// Collect the offsets of every directory in the file, in chain order.
pub fn walk_directory_offsets(
    file: &mut File,
    header: &PlaneFileHeader,
    file_size: u64,
) -> Result<Vec<u64>, DecodeError> {
    let mut offsets = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = header.first_dir_offset;

    while offset != 0 {
        if offset >= file_size {
            return Err(DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("directory offset {offset} outside file of {file_size} bytes"),
            });
        }
        if !seen.insert(offset) {
            return Err(DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("directory chain loops back to offset {offset}"),
            });
        }
        if offsets.len() >= MAX_DIRECTORIES {
            return Err(DecodeError::InvalidTagValue {
                tag: "directory",
                message: format!("more than {MAX_DIRECTORIES} directories"),
            });
        }

        offsets.push(offset);
        let dir = Directory::read(file, header, offset)?;
        offset = dir.next_offset;
    }

    Ok(offsets)
}

// =============================================================================
// Comment extraction
// =============================================================================

/// Extract the embedded description comment from a plane file's first
/// directory, if one is present.
///
/// Datasets without a side-car document embed the companion XML here; the
/// reader hands the extracted text straight to the metadata parser.
pub fn extract_comment(path: &Path) -> Result<Option<String>, DecodeError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DecodeError::NotFound(path.display().to_string()),
        _ => DecodeError::Io(e.to_string()),
    })?;
    let file_size = file.metadata().map_err(|e| DecodeError::Io(e.to_string()))?.len();

    let mut prefix = [0u8; BIGTIFF_HEADER_LEN];
    let filled = file.read(&mut prefix).map_err(|e| DecodeError::Io(e.to_string()))?;
    let header =
        PlaneFileHeader::parse(&prefix[..filled], file_size).map_err(|reason| {
            DecodeError::Sniff {
                path: path.display().to_string(),
                reason,
            }
        })?;

    let dir = Directory::read(&mut file, &header, header.first_dir_offset)?;
    dir.ascii(&mut file, &header, TAG_IMAGE_DESCRIPTION)
}

fn read_exact(file: &mut File, buf: &mut [u8]) -> Result<(), DecodeError> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated {
                required: buf.len() as u64,
                actual: 0,
            }
        } else {
            DecodeError::Io(e.to_string())
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
