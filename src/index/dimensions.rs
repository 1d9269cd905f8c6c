//! Dimension-order arithmetic and channel reconciliation.
//!
//! The dimension order declares how the three non-spatial axes nest when
//! planes are numbered linearly. The reconciler resolves the effective
//! channel count when the declared channel count and samples-per-pixel
//! disagree with what a file header actually says.

use tracing::{debug, warn};

use crate::error::MetadataError;

// =============================================================================
// DimensionOrder
// =============================================================================

/// Declared nesting order of axes for linear plane numbering.
///
/// All six permutations start with XY (the in-plane axes); the remaining
/// three letters give the nesting from fastest-varying to slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimensionOrder {
    #[default]
    Xyczt,
    Xyctz,
    Xyzct,
    Xyztc,
    Xytcz,
    Xytzc,
}

impl DimensionOrder {
    /// Parse the schema token (e.g. `"XYCZT"`).
    pub fn parse(value: &str) -> Result<Self, MetadataError> {
        match value {
            "XYCZT" => Ok(DimensionOrder::Xyczt),
            "XYCTZ" => Ok(DimensionOrder::Xyctz),
            "XYZCT" => Ok(DimensionOrder::Xyzct),
            "XYZTC" => Ok(DimensionOrder::Xyztc),
            "XYTCZ" => Ok(DimensionOrder::Xytcz),
            "XYTZC" => Ok(DimensionOrder::Xytzc),
            _ => Err(MetadataError::InvalidValue {
                element: "Pixels",
                attribute: "DimensionOrder",
                value: value.to_string(),
            }),
        }
    }

    /// The schema token for this order.
    pub const fn as_str(self) -> &'static str {
        match self {
            DimensionOrder::Xyczt => "XYCZT",
            DimensionOrder::Xyctz => "XYCTZ",
            DimensionOrder::Xyzct => "XYZCT",
            DimensionOrder::Xyztc => "XYZTC",
            DimensionOrder::Xytcz => "XYTCZ",
            DimensionOrder::Xytzc => "XYTZC",
        }
    }

    /// Linear plane index of coordinate (`c`, `z`, `t`) under this order,
    /// via the standard mixed-radix formula over the given axis sizes.
    ///
    /// Coordinates must already be zero-based and inside their axes.
    pub fn plane_index(
        self,
        c: u32,
        z: u32,
        t: u32,
        size_c: u32,
        size_z: u32,
        size_t: u32,
    ) -> u64 {
        let (c, z, t) = (c as u64, z as u64, t as u64);
        let (sc, sz, st) = (size_c as u64, size_z as u64, size_t as u64);
        match self {
            DimensionOrder::Xyczt => c + sc * (z + sz * t),
            DimensionOrder::Xyctz => c + sc * (t + st * z),
            DimensionOrder::Xyzct => z + sz * (c + sc * t),
            DimensionOrder::Xyztc => z + sz * (t + st * c),
            DimensionOrder::Xytcz => t + st * (c + sc * z),
            DimensionOrder::Xytzc => t + st * (z + sz * c),
        }
    }
}

// =============================================================================
// Channel reconciliation
// =============================================================================

/// Outcome of reconciling declared channel arithmetic against an observed
/// samples-per-pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciledChannels {
    /// Channel count used for plane numbering
    pub effective_size_c: u32,

    /// Samples per pixel after reconciliation
    pub samples_per_pixel: u32,

    /// Whether the observed value overrode the declared one
    pub corrected: bool,
}

/// Resolve the effective channel count for one series.
///
/// When the declared samples-per-pixel disagrees with the value observed in
/// a representative file header (and either this is the first series or
/// the declared value is unusable), the observed value wins for the rest of
/// that series' processing, so later channel arithmetic stays
/// self-consistent. The effective channel count is `size_c / samples` when
/// that divides evenly, otherwise `size_c` unchanged.
pub fn reconcile_channels(
    size_c: u32,
    declared_samples: Option<u32>,
    observed_samples: Option<u32>,
    first_series: bool,
) -> ReconciledChannels {
    let declared_usable = matches!(declared_samples, Some(s) if s > 0);
    let mut samples = declared_samples.filter(|&s| s > 0).unwrap_or(1);
    let mut corrected = false;

    if let Some(observed) = observed_samples {
        if observed > 0 && observed != samples && (first_series || !declared_usable) {
            warn!(
                declared = samples,
                observed, "samples per pixel disagrees with file header; using observed value"
            );
            samples = observed;
            corrected = true;
        }
    }

    let effective_size_c = if samples > 1 && size_c % samples == 0 {
        size_c / samples
    } else {
        if samples > 1 {
            debug!(
                size_c,
                samples, "channel count not divisible by samples per pixel; keeping declared count"
            );
        }
        size_c
    };

    ReconciledChannels {
        effective_size_c,
        samples_per_pixel: samples,
        corrected,
    }
}

// =============================================================================
// Tests
// =============================================================================
