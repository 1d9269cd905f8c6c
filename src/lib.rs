//! # Companion Reader
//!
//! A lazy plane-resolution and validation engine for large
//! multi-dimensional microscopy datasets whose pixel data is spread across
//! many single-plane-bearing TIFF files, described by a side-car companion
//! metadata document.
//!
//! The engine parses the document once, builds an in-memory mapping from
//! logical plane coordinates (channel, depth, time, series) to physical
//! (file, directory-index) locations, and exposes that mapping through a
//! uniform pixel-read interface, without per-file existence checks at open
//! time. A dataset referencing hundreds of thousands of files opens in the
//! time it takes to parse its document; each file is checked lazily, at
//! most once, when its pixels are first requested.
//!
//! ## Features
//!
//! - **Lazy validation**: files are checked on first pixel access; outcomes
//!   are cached per open handle, and failures are contained per file:
//!   planes of a missing file yield fill bytes while every other plane
//!   keeps reading normally
//! - **Indexing disambiguation**: 0- vs 1-based authored coordinates are
//!   detected per axis from the references themselves
//! - **Dimension reconciliation**: declared channel counts are reconciled
//!   against samples-per-pixel so channel arithmetic stays self-consistent
//! - **Bounded resources**: per-file decoders are pooled with an LRU bound
//!   and released deterministically on close
//!
//! ## Architecture
//!
//! - [`metadata`] - companion document model and streaming parser
//! - [`index`] - dimension reconciliation, 0/1-indexing heuristic and the
//!   plane index builder
//! - [`validate`] - the lazy per-file validation cache
//! - [`decode`] - the per-file decoder seam and bounded decoder pool
//! - [`tiff`] - plane-file sniffing, directory walking and the default
//!   uncompressed-plane decoder
//! - [`reader`] - the dataset handle tying everything together
//! - [`config`] - reader options
//!
//! ## Example
//!
//! ```ignore
//! use companion_reader::{CompanionReader, ReaderOptions};
//!
//! let reader = CompanionReader::open_with(
//!     "experiment.companion.ome",
//!     ReaderOptions::default().trust_metadata(false),
//! )?;
//!
//! let width = reader.size_x(0).unwrap();
//! let height = reader.size_y(0).unwrap();
//! let pixels = reader.read_region(0, 0, 0, 0, width, height)?;
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod index;
pub mod metadata;
pub mod reader;
pub mod tiff;
pub mod validate;

// Re-export commonly used types
pub use config::{ReaderOptions, DEFAULT_FILL_VALUE};
pub use decode::{
    DecoderFactory, DecoderPool, PlaneDecoder, TiffDecoderFactory, DEFAULT_MAX_OPEN_DECODERS,
};
pub use error::{DecodeError, MetadataError, OpenError, ReadError};
pub use index::{
    build_index, detect_origins, reconcile_channels, AxisOrigins, DimensionOrder, FileRef,
    FileReferenceTable, PlaneDescriptor, ReconciledChannels, SeriesDescriptor, SeriesIndex,
};
pub use metadata::{
    is_companion_file, parse_companion_xml, CompanionMetadata, ImageMetadata, PixelType,
    PixelsMetadata, PlaneRef, COMPANION_SUFFIX,
};
pub use reader::CompanionReader;
pub use tiff::{looks_like_plane_file, sniff_file, TiffPlaneDecoder};
pub use validate::{FileCheck, FileState, TiffFileCheck, ValidationCache};
