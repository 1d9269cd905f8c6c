//! The dataset handle: open, inspect, read, close.
//!
//! [`CompanionReader`] ties the pieces together. Opening parses the
//! companion document once and builds the plane index optimistically: no
//! referenced file is touched, which keeps open cheap even when the
//! document names hundreds of thousands of files. The first pixel read of a
//! plane validates its file lazily and caches the outcome; planes of files
//! that turn out to be missing or malformed yield fill bytes instead of
//! errors, and everything else keeps working.
//!
//! # Example
//!
//! ```ignore
//! use companion_reader::{CompanionReader, ReaderOptions};
//!
//! let reader = CompanionReader::open("dataset.companion.ome")?;
//! for series in 0..reader.series_count() {
//!     let (w, h) = (reader.size_x(series).unwrap(), reader.size_y(series).unwrap());
//!     let first_plane = reader.read_region(series, 0, 0, 0, w, h)?;
//!     // first_plane is pixel data, or a fill pattern if the file is gone
//! }
//! ```

use std::fs::File;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::ReaderOptions;
use crate::decode::{DecoderFactory, DecoderPool, TiffDecoderFactory};
use crate::error::{MetadataError, OpenError, ReadError};
use crate::index::{build_index, PlaneDescriptor, SeriesDescriptor};
use crate::metadata::parse_companion_xml;
use crate::tiff::{extract_comment, looks_like_plane_file};
use crate::validate::{FileCheck, FileState, TiffFileCheck, ValidationCache};

// =============================================================================
// Session state
// =============================================================================

/// Mutable per-handle state, guarded by one lock so the check-then-update
/// sequence of the read contract is atomic even under shared use.
struct SessionState {
    planes: Vec<Vec<PlaneDescriptor>>,
    cache: ValidationCache,
    pool: DecoderPool,
    closed: bool,
}

// =============================================================================
// CompanionReader
// =============================================================================

/// An open companion-file dataset.
///
/// Multiple independent handles over the same dataset share nothing; one
/// handle may be used from several threads (reads serialize internally).
/// Closing, explicit or on drop, releases all decoder resources
/// deterministically.
pub struct CompanionReader {
    options: ReaderOptions,
    descriptors: Vec<SeriesDescriptor>,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for CompanionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionReader")
            .field("options", &self.options)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

impl CompanionReader {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Open a dataset with default options.
    ///
    /// Accepts either a companion XML document or a plane file whose
    /// embedded description comment carries the document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        Self::open_with(path, ReaderOptions::default())
    }

    /// Open a dataset with explicit options.
    pub fn open_with(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let xml = load_document(path)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::from_xml(&xml, base_dir, options)
    }

    /// Open a dataset from document text already in memory.
    ///
    /// `base_dir` anchors the document's relative filenames.
    pub fn from_xml(
        xml: &str,
        base_dir: &Path,
        options: ReaderOptions,
    ) -> Result<Self, OpenError> {
        Self::from_xml_with(
            xml,
            base_dir,
            options,
            Box::new(TiffFileCheck),
            Box::new(TiffDecoderFactory),
        )
    }

    /// Open with injected validation and decoding components.
    ///
    /// This is the seam instrumented tests and exotic-container callers
    /// plug into; everything else funnels here.
    pub fn from_xml_with(
        xml: &str,
        base_dir: &Path,
        options: ReaderOptions,
        check: Box<dyn FileCheck>,
        factory: Box<dyn DecoderFactory>,
    ) -> Result<Self, OpenError> {
        options.validate().map_err(OpenError::Options)?;

        let metadata = parse_companion_xml(xml)?;
        let series = build_index(&metadata, base_dir, options.fail_on_missing)?;

        let mut descriptors = Vec::with_capacity(series.len());
        let mut planes = Vec::with_capacity(series.len());
        for s in series {
            descriptors.push(s.descriptor);
            planes.push(s.planes);
        }

        info!(
            series = descriptors.len(),
            planes = planes.iter().map(Vec::len).sum::<usize>(),
            trust_metadata = options.trust_metadata,
            "opened companion dataset"
        );

        let capacity = NonZeroUsize::new(options.max_open_decoders)
            .ok_or_else(|| OpenError::Options("max_open_decoders must be greater than 0".into()))?;

        Ok(Self {
            options,
            descriptors,
            state: Mutex::new(SessionState {
                planes,
                cache: ValidationCache::new(check),
                pool: DecoderPool::new(factory, capacity),
                closed: false,
            }),
        })
    }

    // =========================================================================
    // Metadata accessors
    // =========================================================================

    /// Number of resolved series.
    pub fn series_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Full descriptor of one series.
    pub fn series(&self, series: usize) -> Option<&SeriesDescriptor> {
        self.descriptors.get(series)
    }

    pub fn size_x(&self, series: usize) -> Option<u32> {
        self.series(series).map(|s| s.size_x)
    }

    pub fn size_y(&self, series: usize) -> Option<u32> {
        self.series(series).map(|s| s.size_y)
    }

    pub fn size_z(&self, series: usize) -> Option<u32> {
        self.series(series).map(|s| s.size_z)
    }

    pub fn size_c(&self, series: usize) -> Option<u32> {
        self.series(series).map(|s| s.size_c)
    }

    pub fn size_t(&self, series: usize) -> Option<u32> {
        self.series(series).map(|s| s.size_t)
    }

    /// Addressable planes in one series.
    pub fn image_count(&self, series: usize) -> Option<usize> {
        self.series(series).map(|s| s.image_count)
    }

    /// Preferred tile width for region reads; the full series width when
    /// the metadata declares no tiling.
    pub fn optimal_tile_width(&self, series: usize) -> Option<u32> {
        self.series(series).map(|s| s.tile_width.unwrap_or(s.size_x))
    }

    /// Preferred tile height for region reads; the full series height when
    /// the metadata declares no tiling.
    pub fn optimal_tile_height(&self, series: usize) -> Option<u32> {
        self.series(series).map(|s| s.tile_height.unwrap_or(s.size_y))
    }

    /// Counts of files in each terminal validation state,
    /// `(validated, invalid)`.
    pub fn validation_counts(&self) -> (usize, usize) {
        self.lock_state().cache.counts()
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Read the `w`x`h` pixel region at (`x`, `y`) of one plane.
    ///
    /// Returns `w * h * bytes_per_pixel` bytes: actual samples when the
    /// plane's file is readable, a uniform fill pattern when the file is
    /// missing or malformed. Per-file failures discovered here are cached
    /// and contained; they never fail the call.
    ///
    /// # Errors
    /// Only for malformed requests: unknown series or plane, or a region
    /// outside the series bounds.
    pub fn read_region(
        &self,
        series: usize,
        plane: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<Bytes, ReadError> {
        let descriptor = self
            .descriptors
            .get(series)
            .ok_or(ReadError::SeriesOutOfRange {
                series,
                count: self.descriptors.len(),
            })?;

        if x.saturating_add(w) > descriptor.size_x || y.saturating_add(h) > descriptor.size_y {
            return Err(ReadError::RegionOutOfBounds {
                x,
                y,
                w,
                h,
                width: descriptor.size_x,
                height: descriptor.size_y,
            });
        }

        let buffer_len = w as usize * h as usize * descriptor.bytes_per_pixel();

        let mut state = self.lock_state();
        if state.closed {
            return Err(ReadError::Closed);
        }

        let plane_count = state.planes[series].len();
        let target = state
            .planes[series]
            .get(plane)
            .ok_or(ReadError::PlaneOutOfRange {
                plane,
                count: plane_count,
            })?;

        let file = match (&target.file, target.exists) {
            (Some(file), true) => file.clone(),
            _ => return Ok(self.fill(buffer_len)),
        };
        let ifd = target.ifd;

        match state.cache.state(&file) {
            FileState::Invalid => return Ok(self.fill(buffer_len)),
            FileState::Unknown if !self.options.trust_metadata => {
                if state.cache.resolve(&file) == FileState::Invalid {
                    state.planes[series][plane].exists = false;
                    return Ok(self.fill(buffer_len));
                }
            }
            _ => {}
        }

        match state.pool.with_decoder(&file, |d| d.read_region(ifd, x, y, w, h)) {
            Ok(data) if data.len() == buffer_len => {
                state.cache.record(&file, true);
                Ok(Bytes::from(data))
            }
            Ok(data) => {
                warn!(
                    file = %file,
                    expected = buffer_len,
                    actual = data.len(),
                    "plane geometry disagrees with declared series shape"
                );
                state.cache.record(&file, false);
                state.planes[series][plane].exists = false;
                Ok(self.fill(buffer_len))
            }
            Err(err) => {
                warn!(file = %file, error = %err, "plane read failed; serving fill data");
                state.cache.record(&file, false);
                state.planes[series][plane].exists = false;
                Ok(self.fill(buffer_len))
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the handle: release every decoder and clear the validation
    /// cache. Idempotent; later reads return [`ReadError::Closed`].
    pub fn close(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        debug!(open_decoders = state.pool.open_count(), "closing companion dataset");
        state.pool.close();
        state.cache.reset();
        state.closed = true;
    }

    fn fill(&self, len: usize) -> Bytes {
        Bytes::from(vec![self.options.fill_value; len])
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        // A panic while holding the lock can only have happened outside the
        // engine's own code paths; the state itself stays coherent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CompanionReader {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Document loading
// =============================================================================

/// Load the companion XML from `path`: either the document itself or the
/// embedded comment of a plane file.
fn load_document(path: &Path) -> Result<String, OpenError> {
    let mut file = File::open(path)?;
    let mut prefix = [0u8; 8];
    let mut filled = 0;
    while filled < prefix.len() {
        match file.read(&mut prefix[filled..])? {
            0 => break,
            n => filled += n,
        }
    }

    if looks_like_plane_file(&prefix[..filled]) {
        debug!(path = %path.display(), "extracting companion document from plane file comment");
        let comment = extract_comment(path).map_err(|e| OpenError::Io(e.to_string()))?;
        return comment.ok_or(OpenError::Metadata(MetadataError::MissingRoot));
    }

    let mut text = String::new();
    let mut file = File::open(path)?;
    file.read_to_string(&mut text)?;
    Ok(text)
}

// =============================================================================
// Tests
// =============================================================================
