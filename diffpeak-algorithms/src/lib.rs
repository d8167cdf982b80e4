//! diffpeak-algorithms: Peak search algorithms for diffraction frame stacks.
//!
//! This crate implements the search pipeline: FFT frame filtering,
//! thresholding, streaming connected-component labeling, equivalence
//! merging, octree collision detection and the [`PeakFinder`] orchestrator
//! tying them together.
//!

pub mod convolve;
pub mod finder;
pub mod labeling;
pub mod merge;
pub mod octree;
pub mod threshold;

pub use convolve::{Axis, Convolver, ConvolverConfig, GradientOp, KernelKind};
pub use finder::{FinderState, PeakFinder, PeakFinderConfig};
pub use labeling::{find_primary_blobs, stitch_labeled_ranges, LabelCounter, LabeledRange};
pub use merge::{merge_equivalent_blobs, register_equivalence, BlobMap, EquivalenceList};
pub use octree::Octree;
pub use threshold::ThresholdConfig;
