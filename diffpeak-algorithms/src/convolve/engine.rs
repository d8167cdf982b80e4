//! FFT convolution engine.
//!
//! One engine owns one spatial stencil plus FFT plans and the transformed
//! kernel, cached per frame shape and rebuilt when the shape changes.
//! Borders are handled by mirror-padding the frame with one kernel
//! half-extent per side before the transform, so detector-edge response
//! stays free of wraparound artifacts.
//!
//! Plan construction is not assumed thread-safe to share; engines are cheap
//! to build and each labeling worker owns its own.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::sync::Arc;

use diffpeak_core::Frame;
use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::kernel::Stencil;

/// Single-kernel FFT convolver. Reachable only through [`super::Convolver`].
pub struct FftConvolver {
    stencil: Stencil,
    state: Option<PlanState>,
}

/// Plans and kernel transform for one frame shape.
struct PlanState {
    rows: usize,
    cols: usize,
    /// Padded dimensions: frame plus one kernel half-extent per side.
    padded_rows: usize,
    padded_cols: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
    /// Forward transform of the origin-centered kernel.
    kernel_hat: Vec<Complex<f64>>,
}

impl FftConvolver {
    pub(crate) fn new(stencil: Stencil) -> Self {
        Self {
            stencil,
            state: None,
        }
    }

    pub fn half_extent(&self) -> (usize, usize) {
        (self.stencil.half_rows, self.stencil.half_cols)
    }

    /// Convolves one frame, returning a result of the same dimensions.
    pub fn convolve(&mut self, image: &Frame) -> Frame {
        let (rows, cols) = image.dim();
        self.ensure_state(rows, cols);
        let state = self.state.as_ref().expect("state built above");

        let (hr, hc) = self.half_extent();
        let (prows, pcols) = (state.padded_rows, state.padded_cols);

        // mirror-pad, then transform
        let mut data = vec![Complex::new(0.0, 0.0); prows * pcols];
        for r in 0..prows {
            let src_r = mirror_index(r as isize - hr as isize, rows);
            for c in 0..pcols {
                let src_c = mirror_index(c as isize - hc as isize, cols);
                data[r * pcols + c] = Complex::new(image[(src_r, src_c)], 0.0);
            }
        }
        fft_2d(&mut data, prows, pcols, &state.row_forward, &state.col_forward);

        // frequency-domain multiply; fold in the inverse-transform norm here
        let norm = 1.0 / (prows * pcols) as f64;
        for (value, kernel) in data.iter_mut().zip(&state.kernel_hat) {
            *value = *value * *kernel * norm;
        }

        fft_2d(&mut data, prows, pcols, &state.row_inverse, &state.col_inverse);

        // crop the center block
        let mut out = Array2::zeros((rows, cols));
        for r in 0..rows {
            for c in 0..cols {
                out[(r, c)] = data[(r + hr) * pcols + (c + hc)].re;
            }
        }
        out
    }

    fn ensure_state(&mut self, rows: usize, cols: usize) {
        if let Some(state) = &self.state {
            if state.rows == rows && state.cols == cols {
                return;
            }
        }

        let (hr, hc) = self.half_extent();
        let padded_rows = rows + 2 * hr;
        let padded_cols = cols + 2 * hc;

        let mut planner = FftPlanner::new();
        let row_forward = planner.plan_fft_forward(padded_cols);
        let row_inverse = planner.plan_fft_inverse(padded_cols);
        let col_forward = planner.plan_fft_forward(padded_rows);
        let col_inverse = planner.plan_fft_inverse(padded_rows);

        // Embed the centered stencil at the origin with wraparound so that
        // the frequency-domain product computes a correlation aligned with
        // the input grid.
        let mut kernel_hat = vec![Complex::new(0.0, 0.0); padded_rows * padded_cols];
        for kr in 0..self.stencil.weights.nrows() {
            let dr = kr as isize - hr as isize;
            let r = (-dr).rem_euclid(padded_rows as isize) as usize;
            for kc in 0..self.stencil.weights.ncols() {
                let dc = kc as isize - hc as isize;
                let c = (-dc).rem_euclid(padded_cols as isize) as usize;
                kernel_hat[r * padded_cols + c] += Complex::new(self.stencil.weights[(kr, kc)], 0.0);
            }
        }
        fft_2d(&mut kernel_hat, padded_rows, padded_cols, &row_forward, &col_forward);

        self.state = Some(PlanState {
            rows,
            cols,
            padded_rows,
            padded_cols,
            row_forward,
            row_inverse,
            col_forward,
            col_inverse,
            kernel_hat,
        });
    }
}

/// Maps a possibly out-of-range index into `0..len` by mirroring at the
/// borders. A kernel half-extent larger than the frame degenerates to edge
/// clamping.
fn mirror_index(index: isize, len: usize) -> usize {
    let len = len as isize;
    let mirrored = if index < 0 {
        -index - 1
    } else if index >= len {
        2 * len - index - 1
    } else {
        index
    };
    mirrored.clamp(0, len - 1) as usize
}

/// In-place 2D FFT by row-column decomposition.
fn fft_2d(
    data: &mut [Complex<f64>],
    rows: usize,
    cols: usize,
    row_fft: &Arc<dyn Fft<f64>>,
    col_fft: &Arc<dyn Fft<f64>>,
) {
    for r in 0..rows {
        row_fft.process(&mut data[r * cols..(r + 1) * cols]);
    }

    let mut transposed = vec![Complex::new(0.0, 0.0); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            transposed[c * rows + r] = data[r * cols + c];
        }
    }
    for c in 0..cols {
        col_fft.process(&mut transposed[c * rows..(c + 1) * rows]);
    }
    for c in 0..cols {
        for r in 0..rows {
            data[r * cols + c] = transposed[c * rows + r];
        }
    }
}
