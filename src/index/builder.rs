//! Plane index construction and series assembly.
//!
//! One pass over the parsed metadata produces, per series, an owned array
//! of [`PlaneDescriptor`]s keyed by linear plane index. Construction is
//! optimistic: every referenced file is assumed to exist (`exists = true`)
//! and nothing on disk is touched. The validation cache flips `exists` off
//! lazily, at first pixel access, when a file turns out to be missing or
//! malformed.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::OpenError;
use crate::metadata::model::{CompanionMetadata, PixelType, PixelsMetadata};

use super::dimensions::{reconcile_channels, DimensionOrder};
use super::heuristic::detect_origins;

// =============================================================================
// FileRef
// =============================================================================

/// Opaque file identity: the resolved path of one plane file.
///
/// Cheap to clone and hash; every structure that refers to a file (plane
/// descriptors, the validation cache, the decoder pool) shares the same
/// identity value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(Arc<str>);

impl FileRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FileRef {
    fn from(path: String) -> Self {
        FileRef(path.into())
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Where one plane's pixels live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneDescriptor {
    /// Resolved file identity; `None` when the reference never resolved to
    /// a filename (deferred) or the slot was never authored
    pub file: Option<FileRef>,

    /// Plane's directory index within its file
    pub ifd: u64,

    /// Optimistically true; flipped off when the file fails validation
    pub exists: bool,

    /// True for explicitly authored slots, false for slots inferred by
    /// contiguous-fill extrapolation
    pub certain: bool,
}

impl PlaneDescriptor {
    fn unpopulated() -> Self {
        PlaneDescriptor {
            file: None,
            ifd: 0,
            exists: true,
            certain: false,
        }
    }
}

/// Resolved shape of one series, immutable after assembly.
#[derive(Debug, Clone)]
pub struct SeriesDescriptor {
    pub name: Option<String>,
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub pixel_type: PixelType,
    pub dimension_order: DimensionOrder,
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
    /// Interleaved samples per pixel after reconciliation
    pub samples_per_pixel: u32,
    pub rgb: bool,
    pub indexed: bool,
    pub false_color: bool,
    pub bits_per_pixel: u32,
    pub big_endian: bool,
    /// Total addressable planes (product of the non-spatial axes)
    pub image_count: usize,
}

impl SeriesDescriptor {
    /// Bytes in one full pixel (all interleaved samples).
    pub fn bytes_per_pixel(&self) -> usize {
        self.pixel_type.bytes_per_sample() * self.samples_per_pixel as usize
    }
}

/// One resolved series: its descriptor and its plane table.
#[derive(Debug, Clone)]
pub struct SeriesIndex {
    pub descriptor: SeriesDescriptor,
    pub planes: Vec<PlaneDescriptor>,
    /// Number of slots actually written by authored references (or their
    /// extrapolation); drives pruning and the single-image collapse
    populated: usize,
}

impl SeriesIndex {
    /// Number of descriptor slots written during the build.
    pub fn populated_count(&self) -> usize {
        self.populated
    }
}

// =============================================================================
// FileReferenceTable
// =============================================================================

/// Resolution table from shared identifiers to file identities.
///
/// A given identifier must resolve to exactly one file identity throughout
/// a series; a second, different resolution is a fatal consistency error.
#[derive(Debug, Default)]
pub struct FileReferenceTable {
    map: HashMap<String, FileRef>,
}

impl FileReferenceTable {
    /// Record that `identifier` names `file`, or verify a prior recording.
    pub fn record(
        &mut self,
        series: usize,
        identifier: &str,
        file: FileRef,
    ) -> Result<(), OpenError> {
        match self.map.get(identifier) {
            None => {
                self.map.insert(identifier.to_string(), file);
                Ok(())
            }
            Some(existing) if *existing == file => Ok(()),
            Some(existing) => Err(OpenError::InconsistentReference {
                series,
                identifier: identifier.to_string(),
                first: existing.as_str().to_string(),
                second: file.as_str().to_string(),
            }),
        }
    }

    /// Look up a previously recorded identifier.
    pub fn lookup(&self, identifier: &str) -> Option<&FileRef> {
        self.map.get(identifier)
    }
}

// =============================================================================
// Index construction
// =============================================================================

/// Build the per-series plane index from parsed metadata.
///
/// `base_dir` anchors relative filenames (normally the companion document's
/// directory). With `fail_on_missing` set, a reference that resolves to no
/// filename at all aborts the open; the default policy keeps it unresolved
/// and defers to read time.
///
/// # Errors
/// - [`OpenError::IncompleteMetadata`] when required Pixels fields are
///   absent
/// - [`OpenError::InconsistentReference`] when a shared identifier resolves
///   to two different files within a series
/// - [`OpenError::UnresolvedReference`] under the strict missing-reference
///   policy
pub fn build_index(
    metadata: &CompanionMetadata,
    base_dir: &Path,
    fail_on_missing: bool,
) -> Result<Vec<SeriesIndex>, OpenError> {
    let mut series_list = Vec::with_capacity(metadata.images.len());

    for (series, image) in metadata.images.iter().enumerate() {
        let index = build_series(
            series,
            image.name.clone(),
            &image.pixels,
            base_dir,
            fail_on_missing,
            series == 0,
        )?;
        series_list.push(index);
    }

    // Drop series whose first plane was never populated and renumber the
    // rest contiguously; their descriptor arrays carry over unchanged.
    let before = series_list.len();
    series_list.retain(|s: &SeriesIndex| {
        s.planes
            .first()
            .is_some_and(|p| p.certain || p.file.is_some())
    });
    if series_list.len() != before {
        debug!(
            dropped = before - series_list.len(),
            remaining = series_list.len(),
            "pruned series without populated first plane"
        );
    }

    collapse_single_image(&mut series_list);

    Ok(series_list)
}

fn build_series(
    series: usize,
    name: Option<String>,
    pixels: &PixelsMetadata,
    base_dir: &Path,
    fail_on_missing: bool,
    first_series: bool,
) -> Result<SeriesIndex, OpenError> {
    let missing = |field: &'static str| OpenError::IncompleteMetadata { series, field };

    let size_x = pixels.size_x.ok_or(missing("SizeX"))?;
    let size_y = pixels.size_y.ok_or(missing("SizeY"))?;
    let size_z = pixels.size_z.ok_or(missing("SizeZ"))?;
    let size_c = pixels.size_c.ok_or(missing("SizeC"))?;
    let size_t = pixels.size_t.ok_or(missing("SizeT"))?;
    let pixel_type = pixels.pixel_type.ok_or(missing("Type"))?;

    let dimension_order = match pixels.dimension_order.as_deref() {
        Some(token) => DimensionOrder::parse(token)?,
        None => {
            debug!(series, "no declared dimension order; assuming XYCZT");
            DimensionOrder::default()
        }
    };

    // Laziness means no file header is probed at open, so the observed
    // samples value is absent here and declared values stand; see the
    // reconciler for the override rules when a probe is supplied.
    let channels = reconcile_channels(
        size_c,
        pixels.declared_samples_per_pixel(),
        None,
        first_series,
    );
    let effective_c = channels.effective_size_c;

    let origins = detect_origins(&pixels.plane_refs, size_c, size_z, size_t);

    let total = effective_c as usize * size_z as usize * size_t as usize;
    let mut planes = vec![PlaneDescriptor::unpopulated(); total];
    let mut populated = 0usize;
    let mut table = FileReferenceTable::default();

    for plane_ref in &pixels.plane_refs {
        // Resolve the file identity first: a direct filename also records
        // the identifier mapping for later identifier-only references.
        let file = match (&plane_ref.file_name, &plane_ref.uuid) {
            (Some(file_name), uuid) => {
                let resolved = resolve_file(base_dir, file_name);
                if let Some(identifier) = uuid {
                    table.record(series, identifier, resolved.clone())?;
                }
                Some(resolved)
            }
            (None, Some(identifier)) => table.lookup(identifier).cloned(),
            (None, None) => None,
        };

        if file.is_none() {
            if fail_on_missing {
                return Err(OpenError::UnresolvedReference { series });
            }
            debug!(series, "plane reference has no resolvable filename; deferring");
        }

        let (c, z, t) = origins.adjust(plane_ref.first_c, plane_ref.first_z, plane_ref.first_t);
        if c >= effective_c || z >= size_z || t >= size_t {
            warn!(
                series,
                c, z, t, "plane reference outside declared bounds; ignoring remaining references"
            );
            break;
        }

        let start = dimension_order.plane_index(c, z, t, effective_c, size_z, size_t) as usize;

        match plane_ref.plane_count {
            Some(0) => {}
            Some(count) => {
                for step in 0..count as usize {
                    let slot = start + step;
                    if slot >= total {
                        warn!(
                            series,
                            start,
                            count,
                            total,
                            "plane run extends past the series plane count; clamping"
                        );
                        break;
                    }
                    if !slot_written(&planes[slot]) {
                        populated += 1;
                    }
                    planes[slot] = PlaneDescriptor {
                        file: file.clone(),
                        ifd: plane_ref.ifd + step as u64,
                        exists: true,
                        certain: true,
                    };
                }
            }
            None => {
                // Unspecified run: claim the starting slot, then extend
                // forward through uncertain slots until one is already
                // claimed by an explicit reference.
                if !slot_written(&planes[start]) {
                    populated += 1;
                }
                planes[start] = PlaneDescriptor {
                    file: file.clone(),
                    ifd: plane_ref.ifd,
                    exists: true,
                    certain: true,
                };
                let mut offset = plane_ref.ifd;
                for slot in start + 1..total {
                    if planes[slot].certain {
                        break;
                    }
                    offset += 1;
                    if !slot_written(&planes[slot]) {
                        populated += 1;
                    }
                    planes[slot] = PlaneDescriptor {
                        file: file.clone(),
                        ifd: offset,
                        exists: true,
                        certain: false,
                    };
                }
            }
        }
    }

    let samples = channels.samples_per_pixel;
    let descriptor = SeriesDescriptor {
        name,
        size_x,
        size_y,
        size_z,
        size_c,
        size_t,
        pixel_type,
        dimension_order,
        tile_width: None,
        tile_height: None,
        samples_per_pixel: samples,
        rgb: samples > 1,
        indexed: false,
        false_color: false,
        bits_per_pixel: pixels
            .significant_bits
            .unwrap_or_else(|| pixel_type.bits_per_sample()),
        big_endian: pixels.big_endian.unwrap_or(false),
        image_count: total,
    };

    Ok(SeriesIndex {
        descriptor,
        planes,
        populated,
    })
}

fn slot_written(plane: &PlaneDescriptor) -> bool {
    plane.certain || plane.file.is_some()
}

fn resolve_file(base_dir: &Path, file_name: &str) -> FileRef {
    FileRef::from(base_dir.join(file_name).to_string_lossy().into_owned())
}

/// Single-image collapse: when the whole dataset describes exactly one
/// populated plane, force depth and time to 1 (and channels, unless the
/// plane is multi-sample RGB). Guards against metadata overstating
/// dimensionality for single-plane acquisitions.
fn collapse_single_image(series_list: &mut [SeriesIndex]) {
    let total_populated: usize = series_list.iter().map(|s| s.populated).sum();
    if total_populated != 1 {
        return;
    }

    for series in series_list.iter_mut() {
        if series.populated != 1 {
            continue;
        }
        let descriptor = &mut series.descriptor;
        if descriptor.image_count == 1 {
            return;
        }
        debug!(
            size_z = descriptor.size_z,
            size_t = descriptor.size_t,
            "collapsing single-image series to one plane"
        );
        descriptor.size_z = 1;
        descriptor.size_t = 1;
        if !descriptor.rgb {
            descriptor.size_c = 1;
        }
        descriptor.image_count = 1;

        // Keep exactly the populated descriptor as the single plane.
        if let Some(plane) = series.planes.iter().find(|p| slot_written(p)).cloned() {
            series.planes = vec![plane];
        } else {
            series.planes.truncate(1);
        }
        return;
    }
}

// =============================================================================
// Tests
// =============================================================================
