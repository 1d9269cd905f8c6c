//! Plane index construction.
//!
//! This is where the companion metadata turns into something readable: the
//! declared dimensions are reconciled ([`dimensions`]), the 0/1-indexing of
//! authored coordinates is disambiguated ([`heuristic`]), and every series
//! gets an owned array of plane descriptors keyed by linear plane index
//! ([`builder`]). Construction is optimistic: every referenced file is
//! assumed to exist until a read proves otherwise.

pub mod builder;
pub mod dimensions;
pub mod heuristic;

pub use builder::{
    build_index, FileRef, FileReferenceTable, PlaneDescriptor, SeriesDescriptor, SeriesIndex,
};
pub use dimensions::{reconcile_channels, DimensionOrder, ReconciledChannels};
pub use heuristic::{detect_origins, AxisOrigins};
