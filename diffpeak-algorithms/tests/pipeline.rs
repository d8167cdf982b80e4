//! End-to-end peak search scenarios over synthetic frame stacks.

use std::sync::Arc;

use approx::assert_relative_eq;
use diffpeak_algorithms::{
    find_primary_blobs, ConvolverConfig, FinderState, KernelKind, LabelCounter, PeakFinder,
    PeakFinderConfig, ThresholdConfig,
};
use diffpeak_core::{
    CancelFlag, CandidatePeak, DataError, DataSet, FinderError, Frame, FrameStack,
};

fn blank_stack(rows: usize, cols: usize, n_frames: usize) -> Vec<Frame> {
    vec![Frame::zeros((rows, cols)); n_frames]
}

/// Fills a `size`-edged cube of intensity `value` with its lower corner at
/// `(x0, y0, z0)` in (col, row, frame) coordinates.
fn add_cube(frames: &mut [Frame], x0: usize, y0: usize, z0: usize, size: usize, value: f64) {
    for frame in frames.iter_mut().skip(z0).take(size) {
        for r in y0..y0 + size {
            for c in x0..x0 + size {
                frame[(r, c)] = value;
            }
        }
    }
}

fn delta_config() -> PeakFinderConfig {
    PeakFinderConfig {
        threshold: ThresholdConfig::Absolute { value: 10.0 },
        convolver: ConvolverConfig::new(KernelKind::Delta).unwrap(),
        min_size: 20,
        max_size: 1000,
        ..PeakFinderConfig::default()
    }
}

fn datasets(stack: FrameStack) -> Vec<Arc<dyn DataSet>> {
    vec![Arc::new(stack)]
}

fn run(config: PeakFinderConfig, stack: FrameStack) -> Vec<CandidatePeak> {
    let mut finder = PeakFinder::new(config).unwrap();
    let peaks = finder.find(&datasets(stack)).unwrap();
    assert_eq!(finder.state(), FinderState::Completed);
    assert_eq!(finder.peaks_found(), peaks.len());
    peaks
}

#[test]
fn test_quiet_stack_yields_no_peaks() {
    let stack = FrameStack::new("quiet", blank_stack(32, 32, 4)).unwrap();
    let peaks = run(delta_config(), stack);
    assert!(peaks.is_empty());
}

#[test]
fn test_single_cube_yields_one_centered_peak() {
    let mut frames = blank_stack(50, 50, 5);
    // 3x3x3 cube centered on (25, 25, 2)
    add_cube(&mut frames, 24, 24, 1, 3, 100.0);
    let stack = FrameStack::new("scan", frames).unwrap();

    let peaks = run(delta_config(), stack);
    assert_eq!(peaks.len(), 1);
    let peak = &peaks[0];
    assert_eq!(peak.dataset(), "scan");
    assert!(peak.selected());
    let center = peak.shape().center();
    assert_relative_eq!(center[0], 25.0, epsilon = 1e-9);
    assert_relative_eq!(center[1], 25.0, epsilon = 1e-9);
    assert_relative_eq!(center[2], 2.0, epsilon = 1e-9);
    let (lo, hi) = peak.frame_range();
    assert!(lo > 0.0 && hi < 4.0);
}

#[test]
fn test_reference_cuboid_scenario() {
    // 50x50x5 zeros with a 5x5x3 cuboid of 100 centered on (25, 25, 2)
    let mut frames = blank_stack(50, 50, 5);
    for frame in frames.iter_mut().skip(1).take(3) {
        for r in 23..28 {
            for c in 23..28 {
                frame[(r, c)] = 100.0;
            }
        }
    }
    let stack = FrameStack::new("reference", frames).unwrap();

    let config = PeakFinderConfig {
        threshold: ThresholdConfig::Absolute { value: 3.0 },
        convolver: ConvolverConfig::new(KernelKind::Delta).unwrap(),
        min_size: 1,
        max_size: 10_000,
        max_frames: 10,
        ..PeakFinderConfig::default()
    };
    let peaks = run(config, stack);
    assert_eq!(peaks.len(), 1);
    let center = peaks[0].shape().center();
    assert!((center[0] - 25.0).abs() < 1.0);
    assert!((center[1] - 25.0).abs() < 1.0);
    assert!((center[2] - 2.0).abs() < 1.0);
}

#[test]
fn test_size_filter_boundaries_are_inclusive() {
    // one 3x3x3 cube: exactly 27 voxels
    let build = || {
        let mut frames = blank_stack(30, 30, 5);
        add_cube(&mut frames, 12, 12, 1, 3, 100.0);
        FrameStack::new("scan", frames).unwrap()
    };
    let with_sizes = |min_size, max_size| {
        let config = PeakFinderConfig {
            min_size,
            max_size,
            ..delta_config()
        };
        run(config, build()).len()
    };

    assert_eq!(with_sizes(27, 1000), 1);
    assert_eq!(with_sizes(28, 1000), 0);
    assert_eq!(with_sizes(1, 27), 1);
    assert_eq!(with_sizes(1, 26), 0);
}

#[test]
fn test_blob_below_min_size_is_dropped() {
    let mut frames = blank_stack(32, 32, 5);
    // 2x2x2 cube: 8 voxels, below the 20 voxel minimum
    add_cube(&mut frames, 10, 10, 1, 2, 100.0);
    let stack = FrameStack::new("scan", frames).unwrap();
    let peaks = run(delta_config(), stack);
    assert!(peaks.is_empty());
}

#[test]
fn test_blob_above_max_size_is_dropped() {
    let mut frames = blank_stack(32, 32, 5);
    add_cube(&mut frames, 10, 10, 1, 3, 100.0);
    let stack = FrameStack::new("scan", frames).unwrap();
    let config = PeakFinderConfig {
        min_size: 1,
        max_size: 20,
        ..delta_config()
    };
    let peaks = run(config, stack);
    assert!(peaks.is_empty());
}

#[test]
fn test_merging_scale_controls_peak_separation() {
    // two 3x3x3 cubes with centers 5 pixels apart in x
    let build = || {
        let mut frames = blank_stack(40, 40, 5);
        add_cube(&mut frames, 9, 9, 1, 3, 100.0);
        add_cube(&mut frames, 14, 9, 1, 3, 100.0);
        FrameStack::new("scan", frames).unwrap()
    };

    // fitted semi-axes ~0.82: no overlap at unit scale
    let separate = run(delta_config(), build());
    assert_eq!(separate.len(), 2);

    // semi-axes ~4.1 at scale 5: the shapes overlap and the blobs merge
    let config = PeakFinderConfig {
        peak_merging_scale: 5.0,
        ..delta_config()
    };
    let merged = run(config, build());
    assert_eq!(merged.len(), 1);
    // merged centroid sits midway between the cubes
    assert_relative_eq!(merged[0].shape().center()[0], 12.5, epsilon = 1e-9);
}

#[test]
fn test_partition_seam_blobs_rejoin() {
    // one cube spanning frames 1..=3; a range split anywhere inside it
    // yields two partial blobs with distinct labels
    let mut frames = blank_stack(30, 30, 5);
    add_cube(&mut frames, 12, 12, 1, 3, 100.0);
    let stack = FrameStack::new("scan", frames).unwrap();

    let counter = LabelCounter::new();
    let convolver_config = ConvolverConfig::new(KernelKind::Delta).unwrap();
    let threshold = ThresholdConfig::Absolute { value: 10.0 };
    let mut conv = convolver_config.build();
    let first = find_primary_blobs(&stack, &mut conv, &threshold, &counter, 0, 2).unwrap();
    let second = find_primary_blobs(&stack, &mut conv, &threshold, &counter, 2, 5).unwrap();
    assert_eq!(first.blobs.len(), 1);
    assert_eq!(second.blobs.len(), 1);

    // the full search joins them back into a single peak
    let peaks = run(delta_config(), stack);
    assert_eq!(peaks.len(), 1);
    assert_relative_eq!(peaks[0].shape().center()[2], 2.0, epsilon = 1e-9);
}

#[test]
fn test_frame_window_excludes_peaks_outside() {
    let mut frames = blank_stack(30, 30, 8);
    add_cube(&mut frames, 12, 12, 4, 3, 100.0);
    let stack = FrameStack::new("scan", frames).unwrap();

    let config = PeakFinderConfig {
        first_frame: Some(0),
        last_frame: Some(2),
        ..delta_config()
    };
    let peaks = run(config, stack);
    assert!(peaks.is_empty());
}

#[test]
fn test_peak_thicker_than_max_frames_is_dropped() {
    let mut frames = blank_stack(30, 30, 5);
    add_cube(&mut frames, 12, 12, 1, 3, 100.0);
    let stack = FrameStack::new("scan", frames).unwrap();

    // the fitted shape spans ~1.6 frames, above a 1-frame ceiling
    let config = PeakFinderConfig {
        max_frames: 1,
        ..delta_config()
    };
    let peaks = run(config, stack);
    assert!(peaks.is_empty());
}

#[test]
fn test_edge_peak_emitted_deselected() {
    let mut frames = blank_stack(40, 40, 5);
    // flush against the left detector edge
    add_cube(&mut frames, 0, 18, 1, 3, 100.0);
    // well inside
    add_cube(&mut frames, 20, 18, 1, 3, 100.0);
    let stack = FrameStack::new("scan", frames).unwrap();

    let config = PeakFinderConfig {
        convolver: ConvolverConfig::new(KernelKind::Constant { size: 5 }).unwrap(),
        threshold: ThresholdConfig::Absolute { value: 3.0 },
        min_size: 20,
        max_size: 5000,
        ..PeakFinderConfig::default()
    };
    let peaks = run(config, stack);
    assert_eq!(peaks.len(), 2);

    let edge = peaks
        .iter()
        .find(|p| p.shape().center()[0] < 10.0)
        .unwrap();
    let inner = peaks
        .iter()
        .find(|p| p.shape().center()[0] > 10.0)
        .unwrap();
    assert!(!edge.selected());
    assert!(inner.selected());
}

#[test]
fn test_cancellation_between_datasets() {
    let stack = |name: &str| {
        let mut frames = blank_stack(30, 30, 5);
        add_cube(&mut frames, 12, 12, 1, 3, 100.0);
        FrameStack::new(name, frames).unwrap()
    };
    let data: Vec<Arc<dyn DataSet>> = vec![Arc::new(stack("a")), Arc::new(stack("b"))];

    let flag = Arc::new(CancelFlag::new());
    flag.cancel();
    let mut finder = PeakFinder::new(delta_config())
        .unwrap()
        .with_monitor(flag);
    let err = finder.find(&data).unwrap_err();
    assert!(matches!(err, FinderError::Cancelled));
    assert_eq!(finder.state(), FinderState::Aborted);
    assert_eq!(finder.peaks_found(), 0);
}

#[test]
fn test_data_error_discards_earlier_peaks() {
    struct Flaky;
    impl DataSet for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }
        fn n_rows(&self) -> usize {
            30
        }
        fn n_cols(&self) -> usize {
            30
        }
        fn n_frames(&self) -> usize {
            5
        }
        fn frame(&self, index: usize) -> Result<Frame, DataError> {
            Err(DataError::FrameRead {
                dataset: "flaky".into(),
                frame: index,
                reason: "device unplugged".into(),
            })
        }
    }

    let mut frames = blank_stack(30, 30, 5);
    add_cube(&mut frames, 12, 12, 1, 3, 100.0);
    let good = FrameStack::new("good", frames).unwrap();
    let data: Vec<Arc<dyn DataSet>> = vec![Arc::new(good), Arc::new(Flaky)];

    let mut finder = PeakFinder::new(delta_config()).unwrap();
    let err = finder.find(&data).unwrap_err();
    assert!(matches!(err, FinderError::Data(DataError::FrameRead { .. })));
    assert_eq!(finder.state(), FinderState::Aborted);
    assert_eq!(finder.peaks_found(), 0);
}

#[test]
fn test_empty_dataset_is_a_data_error() {
    struct Empty;
    impl DataSet for Empty {
        fn name(&self) -> &str {
            "empty"
        }
        fn n_rows(&self) -> usize {
            10
        }
        fn n_cols(&self) -> usize {
            10
        }
        fn n_frames(&self) -> usize {
            0
        }
        fn frame(&self, index: usize) -> Result<Frame, DataError> {
            Err(DataError::FrameOutOfRange {
                dataset: "empty".into(),
                frame: index,
                n_frames: 0,
            })
        }
    }
    let data: Vec<Arc<dyn DataSet>> = vec![Arc::new(Empty)];
    let mut finder = PeakFinder::new(delta_config()).unwrap();
    let err = finder.find(&data).unwrap_err();
    assert!(matches!(err, FinderError::Data(DataError::Empty(_))));
}

#[test]
fn test_annular_filter_finds_peak_on_noisy_background() {
    // constant background plus one bright spot; the annular filter
    // subtracts the local background so a relative-to-background cut works
    let mut frames = blank_stack(48, 48, 5);
    for frame in &mut frames {
        frame.fill(50.0);
    }
    add_cube(&mut frames, 22, 22, 1, 3, 500.0);
    let stack = FrameStack::new("scan", frames).unwrap();

    let config = PeakFinderConfig {
        convolver: ConvolverConfig::default(),
        threshold: ThresholdConfig::Absolute { value: 30.0 },
        min_size: 5,
        max_size: 5000,
        ..PeakFinderConfig::default()
    };
    let peaks = run(config, stack);
    assert_eq!(peaks.len(), 1);
    let center = peaks[0].shape().center();
    assert_relative_eq!(center[0], 23.0, epsilon = 0.5);
    assert_relative_eq!(center[1], 23.0, epsilon = 0.5);
}
