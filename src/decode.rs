//! The per-file decoder seam and the decoder pool.
//!
//! The engine never decodes pixels itself; it resolves *which* file and
//! plane to decode and *whether* that source is currently known to be
//! valid. Actual byte extraction happens behind the [`PlaneDecoder`] trait,
//! with [`TiffDecoderFactory`] providing the default implementation for
//! uncompressed plane files.
//!
//! Decoders are pooled per file identity: one instance per file, lazily
//! created on first use and reused by every plane that references the file.
//! The pool is LRU-bounded because a dataset may reference hundreds of
//! thousands of files and each open decoder holds an OS file handle;
//! eviction closes the decoder and a later read simply recreates it.

use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use tracing::debug;

use crate::error::DecodeError;
use crate::index::FileRef;
use crate::tiff::TiffPlaneDecoder;

/// Default bound on simultaneously open decoders.
pub const DEFAULT_MAX_OPEN_DECODERS: usize = 256;

// =============================================================================
// Traits
// =============================================================================

/// Extracts pixel bytes from one plane file.
///
/// A decoder owns whatever resources it needs (typically an open file
/// handle); dropping it releases them. Implementations are only ever driven
/// by one caller at a time; the engine serializes access through its
/// session lock.
pub trait PlaneDecoder: Send {
    /// Number of planes the file carries.
    fn plane_count(&self) -> u64;

    /// Samples per pixel as recorded in the file's own header, used by the
    /// dimension reconciler when it disagrees with the declared metadata.
    fn samples_per_pixel(&mut self) -> Result<u32, DecodeError>;

    /// Read the `w`x`h` sub-region at (`x`, `y`) of the given plane.
    ///
    /// Returns raw sample bytes in the file's storage order, row-major,
    /// tightly packed.
    fn read_region(
        &mut self,
        plane: u64,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<Vec<u8>, DecodeError>;
}

/// Creates decoders for plane files.
///
/// Injectable so tests (and callers with exotic containers) can substitute
/// their own decoding capability without touching the resolution engine.
pub trait DecoderFactory: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn PlaneDecoder>, DecodeError>;
}

// =============================================================================
// Default factory
// =============================================================================

/// Factory for the built-in uncompressed-plane decoder.
#[derive(Debug, Default)]
pub struct TiffDecoderFactory;

impl DecoderFactory for TiffDecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn PlaneDecoder>, DecodeError> {
        Ok(Box::new(TiffPlaneDecoder::open(path)?))
    }
}

// =============================================================================
// DecoderPool
// =============================================================================

/// LRU-bounded pool of per-file decoders.
///
/// Owned by the engine handle; [`close`](DecoderPool::close) releases every
/// decoder deterministically.
pub struct DecoderPool {
    factory: Box<dyn DecoderFactory>,
    decoders: LruCache<FileRef, Box<dyn PlaneDecoder>>,
}

impl DecoderPool {
    /// Create a pool over the given factory, bounded to `capacity` open
    /// decoders.
    pub fn new(factory: Box<dyn DecoderFactory>, capacity: NonZeroUsize) -> Self {
        Self {
            factory,
            decoders: LruCache::new(capacity),
        }
    }

    /// Run `f` against the decoder for `file`, opening it if needed.
    ///
    /// Opening may evict (and thereby close) the least recently used
    /// decoder when the pool is full.
    pub fn with_decoder<R>(
        &mut self,
        file: &FileRef,
        f: impl FnOnce(&mut dyn PlaneDecoder) -> Result<R, DecodeError>,
    ) -> Result<R, DecodeError> {
        let factory = &self.factory;
        let decoder = self.decoders.try_get_or_insert_mut(file.clone(), || {
            debug!(file = %file, "opening plane decoder");
            factory.open(Path::new(file.as_str()))
        })?;
        f(decoder.as_mut())
    }

    /// Number of currently open decoders.
    pub fn open_count(&self) -> usize {
        self.decoders.len()
    }

    /// Close every pooled decoder.
    pub fn close(&mut self) {
        self.decoders.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
