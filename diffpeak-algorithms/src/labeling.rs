//! Streaming connected-component labeling over a frame range.
//!
//! Frames are visited in order; only one label sheet (the previous frame's
//! labels) is kept between frames, so memory stays proportional to one frame
//! regardless of stack depth. Connectivity is 6-neighborhood: left and top
//! within a frame, plus the same pixel on the previous frame. Collisions
//! between labels are recorded as equivalences and resolved later by
//! [`merge_equivalent_blobs`](crate::merge::merge_equivalent_blobs).

#![allow(clippy::cast_precision_loss)]

use std::sync::atomic::{AtomicUsize, Ordering};

use diffpeak_core::{Blob3D, DataError, DataSet};
use log::debug;

use crate::convolve::Convolver;
use crate::merge::{merge_equivalent_blobs, register_equivalence, BlobMap, EquivalenceList};
use crate::threshold::ThresholdConfig;

/// Monotone label source shared across labeling workers.
///
/// Labels start at 1; 0 is reserved for background. Sharing one counter
/// keeps labels globally unique, so per-range blob maps can be folded
/// together without renumbering.
#[derive(Debug, Default)]
pub struct LabelCounter {
    next: AtomicUsize,
}

impl LabelCounter {
    /// Creates a counter whose first label is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next unused label.
    pub fn next(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Result of labeling one contiguous frame range.
///
/// The boundary label sheets let the caller reconnect blobs cut by a range
/// seam: a voxel labeled on the last frame of one range and on the first
/// frame of the next range at the same pixel belongs to one component.
#[derive(Debug)]
pub struct LabeledRange {
    /// Frame range labeled, as `begin..end`.
    pub frames: (usize, usize),
    /// Blobs keyed by label.
    pub blobs: BlobMap,
    /// Label collisions observed within the range.
    pub equivalences: EquivalenceList,
    /// Label sheet of the first frame of the range.
    pub entry_labels: Vec<usize>,
    /// Label sheet of the last frame of the range.
    pub exit_labels: Vec<usize>,
}

/// Labels the frames `begin..end` of one data set and accumulates a blob per
/// label.
///
/// Each frame is filtered through `convolver`; a pixel seeds or extends a
/// blob when its filtered response reaches the threshold evaluated on the
/// raw frame (the threshold itself counts as foreground). Blobs accumulate
/// the raw intensity, never the filtered one.
/// The first frame of the range sees no predecessor, so blobs straddling a
/// range boundary come back as separate entries; the caller stitches them
/// back together through the boundary label sheets.
pub fn find_primary_blobs(
    data: &dyn DataSet,
    convolver: &mut Convolver,
    threshold: &ThresholdConfig,
    counter: &LabelCounter,
    begin: usize,
    end: usize,
) -> Result<LabeledRange, DataError> {
    let rows = data.n_rows();
    let cols = data.n_cols();

    let mut blobs = BlobMap::new();
    let mut equivalences = EquivalenceList::new();
    let mut entry_labels = Vec::new();
    // one label sheet; labels[idx] holds the previous frame's label until
    // the scan overwrites it with the current frame's
    let mut labels = vec![0usize; rows * cols];

    for frame_index in begin..end {
        let raw = data.frame(frame_index)?;
        if raw.dim() != (rows, cols) {
            return Err(DataError::ShapeMismatch {
                frame: frame_index,
                got: raw.dim(),
                expected: (rows, cols),
            });
        }
        let cut = threshold.frame_value(&raw);
        let filtered = convolver.convolve(&raw);

        for r in 0..rows {
            for c in 0..cols {
                let idx = r * cols + c;
                let previous = labels[idx];

                if filtered[(r, c)] < cut {
                    labels[idx] = 0;
                    continue;
                }

                let left = if c > 0 { labels[idx - 1] } else { 0 };
                let top = if r > 0 { labels[idx - cols] } else { 0 };

                let code = usize::from(left != 0)
                    | usize::from(top != 0) << 1
                    | usize::from(previous != 0) << 2;
                let label = match code {
                    0 => counter.next(),
                    1 | 3 | 5 | 7 => left,
                    2 | 6 => top,
                    _ => previous,
                };
                match code {
                    3 => register_equivalence(left, top, &mut equivalences),
                    5 => register_equivalence(left, previous, &mut equivalences),
                    6 => register_equivalence(top, previous, &mut equivalences),
                    7 => {
                        register_equivalence(left, top, &mut equivalences);
                        register_equivalence(left, previous, &mut equivalences);
                        register_equivalence(top, previous, &mut equivalences);
                    }
                    _ => {}
                }

                labels[idx] = label;
                let value = raw[(r, c)];
                blobs
                    .entry(label)
                    .and_modify(|blob| blob.add_point(c as f64, r as f64, frame_index as f64, value))
                    .or_insert_with(|| Blob3D::new(c as f64, r as f64, frame_index as f64, value));
            }
        }
        if frame_index == begin {
            entry_labels = labels.clone();
        }
    }

    Ok(LabeledRange {
        frames: (begin, end),
        blobs,
        equivalences,
        entry_labels,
        exit_labels: labels,
    })
}

/// Folds per-range labeling results into one blob map, stitching blobs cut
/// at range seams.
///
/// Ranges must be contiguous and ordered by frame. Wherever the exit sheet
/// of one range and the entry sheet of the next both carry a label at the
/// same pixel, the two labels are registered equivalent; the single merge at
/// the end then yields the same components a one-range scan would have
/// produced, no matter where the frame range was split.
#[must_use]
pub fn stitch_labeled_ranges(ranges: Vec<LabeledRange>) -> BlobMap {
    let mut blobs = BlobMap::new();
    let mut equivalences = EquivalenceList::new();
    let mut previous_exit: Option<Vec<usize>> = None;
    for range in ranges {
        debug!(
            "frames {}..{}: {} blobs, {} equivalences",
            range.frames.0,
            range.frames.1,
            range.blobs.len(),
            range.equivalences.len()
        );
        if let Some(exit) = previous_exit {
            for (&above, &below) in exit.iter().zip(&range.entry_labels) {
                if above != 0 && below != 0 {
                    register_equivalence(above, below, &mut equivalences);
                }
            }
        }
        previous_exit = Some(range.exit_labels);
        blobs.extend(range.blobs);
        equivalences.extend(range.equivalences);
    }
    merge_equivalent_blobs(&mut blobs, &mut equivalences);
    blobs
}
