use thiserror::Error;

/// Errors produced while parsing the companion metadata document
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// Document is not well-formed XML
    #[error("malformed companion document: {0}")]
    Malformed(String),

    /// Document parsed but its root element is not a companion document
    #[error("companion document has no recognized root element")]
    MissingRoot,

    /// An attribute carried a value that could not be interpreted
    #[error("invalid value {value:?} for {attribute} on <{element}>")]
    InvalidValue {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
}

/// Errors that abort opening a dataset.
///
/// Everything in this enum is fatal at open time. Failures discovered later,
/// at first pixel access, never surface here; they are contained per file
/// by the validation cache and turn into fill reads.
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// The companion document could not be parsed
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Required numeric Pixels fields are missing for a series.
    ///
    /// Size and pixel-type fields are non-negotiable: the plane index
    /// cannot be constructed without them.
    #[error("incomplete metadata for image {series}: missing {field}")]
    IncompleteMetadata { series: usize, field: &'static str },

    /// One shared identifier resolved to two different file identities
    /// within a series
    #[error("identifier {identifier} resolves to both {first:?} and {second:?} in image {series}")]
    InconsistentReference {
        series: usize,
        identifier: String,
        first: String,
        second: String,
    },

    /// A plane reference could not be resolved to any filename.
    ///
    /// Only raised when [`ReaderOptions::fail_on_missing`] is set; the
    /// default policy keeps the reference unresolved and defers.
    ///
    /// [`ReaderOptions::fail_on_missing`]: crate::config::ReaderOptions
    #[error("plane reference in image {series} has no resolvable filename")]
    UnresolvedReference { series: usize },

    /// I/O error reading the companion document itself
    #[error("I/O error: {0}")]
    Io(String),

    /// Reader options failed validation
    #[error("invalid reader options: {0}")]
    Options(String),
}

impl From<std::io::Error> for OpenError {
    fn from(err: std::io::Error) -> Self {
        OpenError::Io(err.to_string())
    }
}

/// Errors from per-file existence checks and plane decoders.
///
/// These never propagate past a single read call: the read path converts
/// them into an `Invalid` cache entry and a fill-pattern result.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// File does not exist or could not be opened
    #[error("file not found: {0}")]
    NotFound(String),

    /// File exists but its header does not match the expected container
    /// format
    #[error("structural check failed for {path}: {reason}")]
    Sniff { path: String, reason: String },

    /// I/O error while reading plane data
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested plane index exceeds the file's plane directory count
    #[error("plane {plane} out of range: file has {count} plane(s)")]
    PlaneOutOfRange { plane: u64, count: u64 },

    /// The file uses a compression scheme this decoder does not handle
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u16),

    /// Plane data ends before the declared region
    #[error("truncated plane data: need {required} bytes, file has {actual}")]
    Truncated { required: u64, actual: u64 },

    /// Requested region falls outside the plane's actual geometry.
    ///
    /// Happens when the metadata-declared series size overstates what the
    /// file really holds; contained like any other decode failure.
    #[error("region {w}x{h}+{x}+{y} outside plane of size {width}x{height}")]
    RegionOutsidePlane {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        width: u32,
        height: u32,
    },

    /// A required directory tag is missing
    #[error("missing required tag: {0}")]
    MissingTag(&'static str),

    /// A directory tag carried an unusable value
    #[error("invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            DecodeError::NotFound(err.to_string())
        } else {
            DecodeError::Io(err.to_string())
        }
    }
}

/// Errors for malformed read requests.
///
/// These indicate caller bugs (out-of-range coordinates), not dataset
/// problems, and are the only errors a region read propagates.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// Series index exceeds the resolved series count
    #[error("series {series} out of range: dataset has {count} series")]
    SeriesOutOfRange { series: usize, count: usize },

    /// Plane index exceeds the series' plane count
    #[error("plane {plane} out of range: series has {count} plane(s)")]
    PlaneOutOfRange { plane: usize, count: usize },

    /// Requested region falls outside the series bounds
    #[error("region {w}x{h}+{x}+{y} out of bounds for series of size {width}x{height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        width: u32,
        height: u32,
    },

    /// Reader has been closed
    #[error("reader is closed")]
    Closed,
}
