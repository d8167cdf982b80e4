//! Peak search orchestration.
//!
//! `PeakFinder` drives the whole pipeline over a list of data sets: frames
//! are partitioned into contiguous ranges labeled in parallel, per-range
//! blob maps are folded together with their seams stitched, touching
//! reflections are joined by ellipsoid collision, and the survivors are
//! fitted and emitted as candidate peaks.

#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;

use log::{debug, info};
use nalgebra::Vector3;
use rayon::prelude::*;

use diffpeak_core::{
    Aabb, CandidatePeak, ConfigError, DataError, DataSet, Ellipsoid, FinderError,
    ProgressMonitor, Result, Signal,
};

use crate::convolve::ConvolverConfig;
use crate::labeling::{find_primary_blobs, stitch_labeled_ranges, LabelCounter, LabeledRange};
use crate::merge::{merge_equivalent_blobs, register_equivalence, BlobMap, EquivalenceList};
use crate::octree::Octree;
use crate::threshold::ThresholdConfig;

/// Extent below which a collision-pass ellipsoid counts as degenerate.
const MIN_COLLISION_EXTENT: f64 = 1e-13;
/// Acceptable extent window for an emitted peak shape.
const MIN_PEAK_EXTENT: f64 = 1e-5;
const MAX_PEAK_EXTENT: f64 = 1e5;

/// Lifecycle of one `PeakFinder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderState {
    /// Built, `find` not yet called.
    Submitted,
    /// A `find` call is in progress.
    Started,
    /// The last `find` call ran to completion.
    Completed,
    /// The last `find` call failed or was cancelled.
    Aborted,
}

/// Peak search parameters.
///
/// Defaults match routine single-crystal processing: an annular filter,
/// a fixed threshold of 80 counts and a 30..=10000 voxel size window.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakFinderConfig {
    /// Pixel threshold evaluator.
    pub threshold: ThresholdConfig,
    /// Frame filter applied before thresholding.
    pub convolver: ConvolverConfig,
    /// Smallest accepted blob, in voxels (inclusive).
    pub min_size: usize,
    /// Largest accepted blob, in voxels (inclusive).
    pub max_size: usize,
    /// Largest accepted frame extent of an emitted peak shape.
    pub max_frames: usize,
    /// Scale applied to fitted shapes during the collision-merge pass.
    pub peak_merging_scale: f64,
    /// First frame to search (inclusive); data set start when `None`.
    pub first_frame: Option<usize>,
    /// Last frame to search (inclusive); data set end when `None`.
    pub last_frame: Option<usize>,
}

impl Default for PeakFinderConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdConfig::default(),
            convolver: ConvolverConfig::default(),
            min_size: 30,
            max_size: 10_000,
            max_frames: 10,
            peak_merging_scale: 1.0,
            first_frame: None,
            last_frame: None,
        }
    }
}

impl PeakFinderConfig {
    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold.validate()?;
        if self.min_size >= self.max_size {
            return Err(ConfigError::InvalidSizeRange {
                min_size: self.min_size,
                max_size: self.max_size,
            });
        }
        if self.max_frames == 0 {
            return Err(ConfigError::ZeroMaxFrames);
        }
        if self.peak_merging_scale <= 0.0 {
            return Err(ConfigError::NonPositiveParameter {
                name: "peak_merging_scale",
                value: self.peak_merging_scale,
            });
        }
        Ok(())
    }
}

/// The peak search engine.
pub struct PeakFinder {
    config: PeakFinderConfig,
    monitor: Option<Arc<dyn ProgressMonitor>>,
    state: FinderState,
    peaks_found: usize,
}

impl PeakFinder {
    /// Creates a finder, validating the configuration eagerly.
    pub fn new(config: PeakFinderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            monitor: None,
            state: FinderState::Submitted,
            peaks_found: 0,
        })
    }

    /// Attaches a progress monitor, polled once per completed data set.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn ProgressMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &PeakFinderConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FinderState {
        self.state
    }

    /// Number of peaks emitted by the last completed `find` call.
    #[must_use]
    pub fn peaks_found(&self) -> usize {
        self.peaks_found
    }

    /// Searches every data set and returns all candidate peaks.
    ///
    /// All-or-nothing: any data error discards peaks already found and
    /// aborts the run. Cancellation through the monitor likewise returns
    /// [`FinderError::Cancelled`] with no partial result.
    pub fn find(&mut self, data: &[Arc<dyn DataSet>]) -> Result<Vec<CandidatePeak>> {
        self.state = FinderState::Started;
        self.peaks_found = 0;
        match self.find_inner(data) {
            Ok(peaks) => {
                self.state = FinderState::Completed;
                self.peaks_found = peaks.len();
                info!("peak search complete: {} peaks", peaks.len());
                Ok(peaks)
            }
            Err(err) => {
                self.state = FinderState::Aborted;
                Err(err)
            }
        }
    }

    fn find_inner(&self, data: &[Arc<dyn DataSet>]) -> Result<Vec<CandidatePeak>> {
        let mut peaks = Vec::new();
        for (index, dataset) in data.iter().enumerate() {
            info!(
                "searching data set {:?} ({} frames of {}x{})",
                dataset.name(),
                dataset.n_frames(),
                dataset.n_rows(),
                dataset.n_cols()
            );
            let result = self.search_dataset(dataset.as_ref());
            dataset.close();
            peaks.extend(result?);

            if let Some(monitor) = &self.monitor {
                let signal = monitor.dataset_complete(dataset.name(), index + 1, data.len());
                if signal == Signal::Cancel && index + 1 < data.len() {
                    info!("peak search cancelled after data set {:?}", dataset.name());
                    return Err(FinderError::Cancelled);
                }
            }
        }
        Ok(peaks)
    }

    fn search_dataset(&self, data: &dyn DataSet) -> Result<Vec<CandidatePeak>> {
        let n_frames = data.n_frames();
        if n_frames == 0 {
            return Err(DataError::Empty(data.name().to_string()).into());
        }
        let begin = self.config.first_frame.unwrap_or(0).min(n_frames);
        let end = self
            .config
            .last_frame
            .map_or(n_frames, |last| (last + 1).min(n_frames));
        if begin >= end {
            return Ok(Vec::new());
        }

        let mut blobs = self.label_partitions(data, begin, end)?;
        debug!(
            "data set {:?}: {} primary blobs in frames {}..{}",
            data.name(),
            blobs.len(),
            begin,
            end
        );

        self.merge_colliding_blobs(data, &mut blobs);
        debug!("data set {:?}: {} blobs after merging", data.name(), blobs.len());

        blobs.retain(|_, blob| {
            blob.n_points() >= self.config.min_size && blob.n_points() <= self.config.max_size
        });
        debug!("data set {:?}: {} blobs within size window", data.name(), blobs.len());

        Ok(self.emit_peaks(data, &blobs))
    }

    /// Labels `begin..end` in contiguous per-worker ranges, then folds the
    /// per-range results into one map. Labels are globally unique, so
    /// folding is plain map union; blobs cut by a range seam are
    /// reconnected through the boundary label sheets before the single
    /// global equivalence merge, which keeps the outcome independent of
    /// how many workers the range was split over.
    fn label_partitions(
        &self,
        data: &dyn DataSet,
        begin: usize,
        end: usize,
    ) -> Result<BlobMap, DataError> {
        let n_frames = end - begin;
        let n_workers = rayon::current_num_threads().max(1).min(n_frames);
        let chunk = n_frames.div_ceil(n_workers);
        let ranges: Vec<(usize, usize)> = (0..n_workers)
            .map(|w| (begin + w * chunk, (begin + (w + 1) * chunk).min(end)))
            .filter(|&(b, e)| b < e)
            .collect();

        let counter = LabelCounter::new();
        let partial: Vec<LabeledRange> = ranges
            .par_iter()
            .map(|&(b, e)| {
                let mut convolver = self.config.convolver.build();
                find_primary_blobs(data, &mut convolver, &self.config.threshold, &counter, b, e)
            })
            .collect::<Result<_, DataError>>()?;

        Ok(stitch_labeled_ranges(partial))
    }

    /// Joins blobs whose scaled fitted ellipsoids overlap, repeating until
    /// no pair collides. With `peak_merging_scale` above 1 this folds
    /// overlapping reflections into one peak.
    fn merge_colliding_blobs(&self, data: &dyn DataSet, blobs: &mut BlobMap) {
        let volume = Aabb::new(
            Vector3::zeros(),
            Vector3::new(
                data.n_cols() as f64,
                data.n_rows() as f64,
                data.n_frames() as f64,
            ),
        );

        loop {
            let mut labels: Vec<usize> = blobs.keys().copied().collect();
            labels.sort_unstable();

            let mut shapes: Vec<(usize, Ellipsoid)> = Vec::with_capacity(labels.len());
            for label in labels {
                let fitted = blobs[&label].fit_ellipsoid(self.config.peak_merging_scale);
                match fitted {
                    Some(shape) if shape.aabb().extents().min() >= MIN_COLLISION_EXTENT => {
                        shapes.push((label, shape));
                    }
                    // degenerate: cannot take part in any further merge
                    _ => {
                        blobs.remove(&label);
                    }
                }
            }

            let mut tree = Octree::new(volume);
            for (index, (_, shape)) in shapes.iter().enumerate() {
                tree.insert(index, shape.aabb());
            }
            let pairs = tree.colliding_pairs(|a, b| shapes[a].1.intersects(&shapes[b].1));
            if pairs.is_empty() {
                return;
            }

            let mut equivalences = EquivalenceList::new();
            for (a, b) in pairs {
                register_equivalence(shapes[a].0, shapes[b].0, &mut equivalences);
            }
            let before = blobs.len();
            merge_equivalent_blobs(blobs, &mut equivalences);
            if blobs.len() >= before {
                return;
            }
        }
    }

    /// Fits surviving blobs at unit scale and emits candidate peaks.
    ///
    /// Shapes with unphysical extents are dropped; shapes clipped by the
    /// usable detector area (the detector shrunk by the kernel half-extent)
    /// are emitted deselected.
    fn emit_peaks(&self, data: &dyn DataSet, blobs: &BlobMap) -> Vec<CandidatePeak> {
        let (half_rows, half_cols) = self.config.convolver.build().half_extent();
        let usable = usable_area(data, half_rows, half_cols);

        let mut labels: Vec<usize> = blobs.keys().copied().collect();
        labels.sort_unstable();

        let mut peaks = Vec::new();
        for label in labels {
            let Some(shape) = blobs[&label].fit_ellipsoid(1.0) else {
                continue;
            };
            let extents = shape.aabb().extents();
            if extents.min() < MIN_PEAK_EXTENT || extents.max() > MAX_PEAK_EXTENT {
                continue;
            }
            if extents[2] > self.config.max_frames as f64 {
                continue;
            }

            let inside = usable.is_some_and(|area| area.contains(&shape.aabb()));
            let mut peak = CandidatePeak::new(data.name(), shape);
            if !inside {
                peak.deselect();
            }
            peaks.push(peak);
        }
        peaks
    }
}

/// Detector area in which a peak shape must fit to stay selected: the full
/// detector shrunk by the kernel half-extent in-plane, frames `0..n-1`.
/// `None` when the kernel support exceeds the detector itself.
fn usable_area(data: &dyn DataSet, half_rows: usize, half_cols: usize) -> Option<Aabb> {
    let x1 = data.n_cols().checked_sub(half_cols)? as f64;
    let y1 = data.n_rows().checked_sub(half_rows)? as f64;
    let (x0, y0) = (half_cols as f64, half_rows as f64);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some(Aabb::new(
        Vector3::new(x0, y0, 0.0),
        Vector3::new(x1, y1, (data.n_frames() - 1) as f64),
    ))
}
