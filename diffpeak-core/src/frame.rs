//! Detector frames and the data set abstraction.

use ndarray::Array2;

use crate::error::DataError;

/// A single detector frame: a rows x cols matrix of intensities.
pub type Frame = Array2<f64>;

/// A lazily-read stack of detector frames.
///
/// Implementations are treated as I/O-backed sequences: the peak search
/// never holds more frames in memory than its current partition needs.
/// A failed `frame` read aborts the whole search.
pub trait DataSet: Send + Sync {
    /// Human-readable identifier, carried onto emitted peaks.
    fn name(&self) -> &str;

    /// Number of detector rows.
    fn n_rows(&self) -> usize;

    /// Number of detector columns.
    fn n_cols(&self) -> usize;

    /// Number of frames in the stack.
    fn n_frames(&self) -> usize;

    /// Reads one frame.
    fn frame(&self, index: usize) -> Result<Frame, DataError>;

    /// Releases underlying resources. Called once per search run.
    fn close(&self) {}
}

/// An in-memory [`DataSet`] over a vector of frames.
///
/// The simplest production adapter and the standard test double. Frame
/// dimensions are validated once at construction.
#[derive(Debug, Clone)]
pub struct FrameStack {
    name: String,
    frames: Vec<Frame>,
    rows: usize,
    cols: usize,
}

impl FrameStack {
    /// Creates a frame stack, validating that all frames share one shape.
    pub fn new(name: impl Into<String>, frames: Vec<Frame>) -> Result<Self, DataError> {
        let name = name.into();
        let Some(first) = frames.first() else {
            return Err(DataError::Empty(name));
        };
        let (rows, cols) = first.dim();
        for (index, frame) in frames.iter().enumerate() {
            if frame.dim() != (rows, cols) {
                return Err(DataError::ShapeMismatch {
                    frame: index,
                    got: frame.dim(),
                    expected: (rows, cols),
                });
            }
        }
        Ok(Self {
            name,
            frames,
            rows,
            cols,
        })
    }
}

impl DataSet for FrameStack {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_rows(&self) -> usize {
        self.rows
    }

    fn n_cols(&self) -> usize {
        self.cols
    }

    fn n_frames(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, index: usize) -> Result<Frame, DataError> {
        self.frames
            .get(index)
            .cloned()
            .ok_or_else(|| DataError::FrameOutOfRange {
                dataset: self.name.clone(),
                frame: index,
                n_frames: self.frames.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_stack_uniform_shape() {
        let frames = vec![Frame::zeros((4, 6)); 3];
        let stack = FrameStack::new("scan", frames).unwrap();
        assert_eq!(stack.n_rows(), 4);
        assert_eq!(stack.n_cols(), 6);
        assert_eq!(stack.n_frames(), 3);
        assert_eq!(stack.frame(2).unwrap().dim(), (4, 6));
    }

    #[test]
    fn test_frame_stack_rejects_mixed_shapes() {
        let frames = vec![Frame::zeros((4, 6)), Frame::zeros((4, 5))];
        let err = FrameStack::new("scan", frames).unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch { frame: 1, .. }));
    }

    #[test]
    fn test_frame_stack_rejects_empty() {
        let err = FrameStack::new("scan", Vec::new()).unwrap_err();
        assert!(matches!(err, DataError::Empty(_)));
    }

    #[test]
    fn test_frame_out_of_range() {
        let stack = FrameStack::new("scan", vec![Frame::zeros((2, 2))]).unwrap();
        let err = stack.frame(1).unwrap_err();
        assert!(matches!(err, DataError::FrameOutOfRange { frame: 1, .. }));
    }
}
