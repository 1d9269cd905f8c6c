//! Zero/one-indexing disambiguation for authored plane coordinates.
//!
//! Companion documents are externally authored and occasionally number
//! their channel/depth/time coordinates from 1 instead of 0. Each axis is
//! classified independently from one scan over the authored references:
//!
//! - a value at or beyond the axis's declared size, seen before any zero
//!   for that axis, marks the axis one-indexed
//! - the first zero seen for an axis marks it zero-indexed
//! - a reference with all three coordinates at zero is definitive and stops
//!   the scan
//!
//! Axes never definitively classified default to zero-indexed. That default
//! is genuinely ambiguous when no all-zero reference exists in the source
//! data, so it is always logged.

use tracing::{debug, warn};

use crate::metadata::model::PlaneRef;

// =============================================================================
// AxisOrigins
// =============================================================================

/// Per-axis indexing classification, applied to every authored coordinate
/// before linear plane numbering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisOrigins {
    pub c_one_based: bool,
    pub z_one_based: bool,
    pub t_one_based: bool,
}

impl AxisOrigins {
    /// Shift an authored coordinate triple down to zero-based.
    pub fn adjust(&self, c: u32, z: u32, t: u32) -> (u32, u32, u32) {
        (
            if self.c_one_based { c.saturating_sub(1) } else { c },
            if self.z_one_based { z.saturating_sub(1) } else { z },
            if self.t_one_based { t.saturating_sub(1) } else { t },
        )
    }
}

// =============================================================================
// Detection
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum AxisState {
    Undetermined,
    ZeroBased,
    OneBased,
}

/// Classify each axis's indexing origin from the authored references.
pub fn detect_origins(refs: &[PlaneRef], size_c: u32, size_z: u32, size_t: u32) -> AxisOrigins {
    let mut c = AxisState::Undetermined;
    let mut z = AxisState::Undetermined;
    let mut t = AxisState::Undetermined;

    for plane_ref in refs {
        observe(&mut c, plane_ref.first_c, size_c);
        observe(&mut z, plane_ref.first_z, size_z);
        observe(&mut t, plane_ref.first_t, size_t);

        if plane_ref.first_c == 0 && plane_ref.first_z == 0 && plane_ref.first_t == 0 {
            // All three at zero is the definitive disambiguator.
            break;
        }
    }

    for (axis, state) in [("channel", c), ("depth", z), ("time", t)] {
        match state {
            AxisState::OneBased => {
                warn!(axis, "authored coordinates classified one-indexed; shifting down")
            }
            AxisState::Undetermined => {
                debug!(
                    axis,
                    "no definitive zero reference observed; defaulting to zero-indexed"
                )
            }
            AxisState::ZeroBased => {}
        }
    }

    AxisOrigins {
        c_one_based: c == AxisState::OneBased,
        z_one_based: z == AxisState::OneBased,
        t_one_based: t == AxisState::OneBased,
    }
}

fn observe(state: &mut AxisState, value: u32, size: u32) {
    if value == 0 {
        *state = AxisState::ZeroBased;
    } else if value >= size && *state == AxisState::Undetermined {
        *state = AxisState::OneBased;
    }
}

// =============================================================================
// Tests
// =============================================================================
