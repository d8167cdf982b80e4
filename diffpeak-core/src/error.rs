//! Error types for diffpeak.

use thiserror::Error;

/// Result type alias for diffpeak operations.
pub type Result<T, E = FinderError> = std::result::Result<T, E>;

/// Configuration errors, raised eagerly at setup time.
///
/// None of these are ever silently defaulted: an invalid configuration
/// fails before any frame is read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Convolver key not present in the kernel registry.
    #[error("unknown convolver kernel {0:?}")]
    UnknownKernel(String),

    /// Threshold key not present in the registry.
    #[error("unknown threshold {0:?}")]
    UnknownThreshold(String),

    /// A kernel size or scale parameter that must be strictly positive.
    #[error("parameter `{name}` must be positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f64 },

    /// Gradient kernels need a direction; both or neither is ambiguous.
    #[error("gradient kernel requires exactly one of the `x`/`y` direction parameters")]
    MissingDirection,

    /// Radial annulus bounds out of order.
    #[error("invalid annulus [{r_in}, {r_out}): inner radius must be smaller than outer")]
    InvalidAnnulus { r_in: f64, r_out: f64 },

    /// A kernel whose support contains no pixel at all.
    #[error("kernel {0:?} has empty support and cannot be normalized")]
    DegenerateKernel(String),

    /// Blob size filter bounds out of order.
    #[error("min_size ({min_size}) must be smaller than max_size ({max_size})")]
    InvalidSizeRange { min_size: usize, max_size: usize },

    /// Absolute threshold below zero.
    #[error("threshold must be non-negative, got {0}")]
    NegativeThreshold(f64),

    /// Iterative background estimation needs at least one pass.
    #[error("threshold iteration count must be at least 1")]
    ZeroIterations,

    /// Frame-extent filter must accept at least one frame.
    #[error("max_frames must be at least 1")]
    ZeroMaxFrames,
}

/// Data access errors. Any of these aborts the whole `find` call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// A frame could not be read from the underlying store.
    #[error("failed to read frame {frame} of data set {dataset:?}: {reason}")]
    FrameRead {
        dataset: String,
        frame: usize,
        reason: String,
    },

    /// A frame index beyond the data set bounds.
    #[error("frame index {frame} out of range for data set {dataset:?} ({n_frames} frames)")]
    FrameOutOfRange {
        dataset: String,
        frame: usize,
        n_frames: usize,
    },

    /// A frame whose dimensions disagree with the data set.
    #[error("frame {frame} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        frame: usize,
        got: (usize, usize),
        expected: (usize, usize),
    },

    /// A data set with no frames at all.
    #[error("data set {0:?} contains no frames")]
    Empty(String),
}

/// Top-level outcome of a peak search run.
///
/// Cancellation is a distinguished outcome, never conflated with failure.
/// Per-blob numerical problems are not represented here at all: a degenerate
/// blob is dropped locally and the run continues.
#[derive(Error, Debug)]
pub enum FinderError {
    /// Invalid configuration, reported before any data is touched.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Frame I/O failure; peaks from earlier data sets are discarded.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// The progress monitor requested cancellation.
    #[error("peak search cancelled")]
    Cancelled,
}
