//! Plane-file header parsing and the structural sniff.
//!
//! # Header layout
//!
//! ## Classic TIFF (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42)
//! Bytes 4-7: Offset to first directory
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1: Byte order
//! Bytes 2-3: Version (43)
//! Bytes 4-5: Offset byte size (must be 8)
//! Bytes 6-7: Reserved
//! Bytes 8-15: Offset to first directory
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::DecodeError;

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes indicating little-endian byte order ("II")
const MAGIC_LITTLE_ENDIAN: u16 = 0x4949;

/// Magic bytes indicating big-endian byte order ("MM")
const MAGIC_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for classic TIFF
const VERSION_CLASSIC: u16 = 42;

/// Version number for BigTIFF
const VERSION_BIG: u16 = 43;

/// Size of a classic TIFF header in bytes
pub const CLASSIC_HEADER_LEN: usize = 8;

/// Size of a BigTIFF header in bytes. Also the number of bytes the
/// structural sniff reads.
pub const BIGTIFF_HEADER_LEN: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order of a plane file, declared by its first two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from a byte slice using this byte order.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes([bytes[0], bytes[1]]),
            ByteOrder::BigEndian => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            ByteOrder::BigEndian => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Read a u64 from a byte slice using this byte order.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let b: [u8; 8] = bytes[..8].try_into().unwrap();
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(b),
            ByteOrder::BigEndian => u64::from_be_bytes(b),
        }
    }
}

// =============================================================================
// PlaneFileHeader
// =============================================================================

/// Parsed header of a plane file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneFileHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether the file uses 64-bit (BigTIFF) offsets
    pub big_tiff: bool,

    /// Offset of the first directory
    pub first_dir_offset: u64,
}

impl PlaneFileHeader {
    /// Parse a header from the file's leading bytes.
    ///
    /// Returns a human-readable reason on failure; callers wrap it into
    /// [`DecodeError::Sniff`] together with the file path.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, String> {
        if bytes.len() < CLASSIC_HEADER_LEN {
            return Err(format!(
                "file too small for a header: {} byte(s)",
                bytes.len()
            ));
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            MAGIC_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            MAGIC_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(format!("bad magic bytes 0x{magic:04X}")),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        match version {
            VERSION_CLASSIC => {
                let first_dir_offset = byte_order.read_u32(&bytes[4..8]) as u64;
                if first_dir_offset >= file_size {
                    return Err(format!(
                        "first directory offset {first_dir_offset} outside file of {file_size} bytes"
                    ));
                }
                Ok(PlaneFileHeader {
                    byte_order,
                    big_tiff: false,
                    first_dir_offset,
                })
            }
            VERSION_BIG => {
                if bytes.len() < BIGTIFF_HEADER_LEN {
                    return Err(format!(
                        "file too small for a BigTIFF header: {} byte(s)",
                        bytes.len()
                    ));
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(format!("BigTIFF offset size {offset_size}, expected 8"));
                }
                let first_dir_offset = byte_order.read_u64(&bytes[8..16]);
                if first_dir_offset >= file_size {
                    return Err(format!(
                        "first directory offset {first_dir_offset} outside file of {file_size} bytes"
                    ));
                }
                Ok(PlaneFileHeader {
                    byte_order,
                    big_tiff: true,
                    first_dir_offset,
                })
            }
            _ => Err(format!("bad version {version}")),
        }
    }

    /// Size in bytes of one directory entry.
    #[inline]
    pub const fn entry_len(&self) -> usize {
        if self.big_tiff {
            20
        } else {
            12
        }
    }

    /// Size in bytes of the entry-count field at the start of a directory.
    #[inline]
    pub const fn count_field_len(&self) -> usize {
        if self.big_tiff {
            8
        } else {
            2
        }
    }

    /// Size in bytes of the next-directory offset at the end of a directory.
    /// Also the inline-value threshold of an entry.
    #[inline]
    pub const fn offset_field_len(&self) -> usize {
        if self.big_tiff {
            8
        } else {
            4
        }
    }
}

// =============================================================================
// Sniffing
// =============================================================================

/// Quick check that leading bytes look like a plane-file header.
///
/// Cheaper than [`PlaneFileHeader::parse`]: no offset validation, usable
/// before the file size is known.
pub fn looks_like_plane_file(bytes: &[u8]) -> bool {
    if bytes.len() < CLASSIC_HEADER_LEN {
        return false;
    }

    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    let byte_order = match magic {
        MAGIC_LITTLE_ENDIAN => ByteOrder::LittleEndian,
        MAGIC_BIG_ENDIAN => ByteOrder::BigEndian,
        _ => return false,
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == VERSION_CLASSIC || version == VERSION_BIG
}

/// Existence check plus structural sniff for a plane file.
///
/// This is the check the validation cache runs lazily, at most once per
/// file identity: the file must be openable and must start with a
/// well-formed header whose first directory offset lands inside the file.
pub fn sniff_file(path: &Path) -> Result<PlaneFileHeader, DecodeError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DecodeError::NotFound(path.display().to_string()),
        _ => DecodeError::Io(e.to_string()),
    })?;
    let file_size = file.metadata().map_err(|e| DecodeError::Io(e.to_string()))?.len();

    let mut prefix = [0u8; BIGTIFF_HEADER_LEN];
    let mut filled = 0;
    while filled < prefix.len() {
        match file.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => return Err(DecodeError::Io(e.to_string())),
        }
    }

    PlaneFileHeader::parse(&prefix[..filled], file_size).map_err(|reason| DecodeError::Sniff {
        path: path.display().to_string(),
        reason,
    })
}

// =============================================================================
// Tests
// =============================================================================
