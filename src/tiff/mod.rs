//! TIFF plumbing for plane files.
//!
//! Companion datasets store their pixel data as plain (possibly multi-page)
//! TIFF files, one directory entry per plane. This module provides:
//!
//! - [`header`] - byte-order aware header parsing and the cheap structural
//!   sniff used by the validation cache
//! - [`directory`] - directory (IFD) chain walking and tag value reading
//! - [`decoder`] - the default [`PlaneDecoder`] for uncompressed planes
//!
//! The engine never walks a plane file at open time; everything here runs
//! lazily, on first pixel access, against blocking local-file I/O.
//!
//! [`PlaneDecoder`]: crate::decode::PlaneDecoder

pub mod decoder;
pub mod directory;
pub mod header;

pub use decoder::TiffPlaneDecoder;
pub use directory::{extract_comment, Directory};
pub use header::{looks_like_plane_file, sniff_file, ByteOrder, PlaneFileHeader};
