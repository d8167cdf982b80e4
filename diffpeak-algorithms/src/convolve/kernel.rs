//! Spatial kernel stencils.
//!
//! All kernels are built as small `(2h + 1) x (2h + 1)` matrices centered on
//! the origin; the FFT engine embeds them into the padded frame size.

use ndarray::Array2;

/// A centered spatial kernel with its half-extent.
#[derive(Debug, Clone)]
pub(crate) struct Stencil {
    /// Weight matrix, `(2 * half_rows + 1) x (2 * half_cols + 1)`.
    pub weights: Array2<f64>,
    pub half_rows: usize,
    pub half_cols: usize,
}

impl Stencil {
    fn from_rows(rows: &[&[f64]]) -> Self {
        let nr = rows.len();
        let nc = rows[0].len();
        let mut weights = Array2::zeros((nr, nc));
        for (r, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                weights[(r, c)] = v;
            }
        }
        Self {
            weights,
            half_rows: nr / 2,
            half_cols: nc / 2,
        }
    }

    /// Sum of all weights.
    #[cfg(test)]
    pub fn sum(&self) -> f64 {
        self.weights.sum()
    }
}

/// Uniform box average of `size x size` pixels, normalized to sum 1.
///
/// Even sizes hang one pixel further towards negative offsets, mirroring the
/// usual convention for even box filters.
pub(crate) fn box_stencil(size: usize) -> Stencil {
    let half = size / 2;
    let n = 2 * half + 1;
    let mut weights = Array2::zeros((n, n));
    let lo = half - (size - 1) / 2;
    let weight = 1.0 / (size * size) as f64;
    for r in lo..lo + size {
        for c in lo..lo + size {
            weights[(r, c)] = weight;
        }
    }
    Stencil {
        weights,
        half_rows: half,
        half_cols: half,
    }
}

/// Indicator kernel over the annulus `r_in <= d < r_out`, normalized to sum 1.
///
/// Returns `None` when no pixel center falls inside the annulus; the
/// configuration layer turns that into an eager error.
pub(crate) fn radial_stencil(r_in: f64, r_out: f64) -> Option<Stencil> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let half = (r_out.ceil() as usize).saturating_sub(1);
    let n = 2 * half + 1;
    let mut weights = Array2::zeros((n, n));
    let mut count = 0usize;
    #[allow(clippy::cast_precision_loss)]
    for r in 0..n {
        for c in 0..n {
            let dr = r as f64 - half as f64;
            let dc = c as f64 - half as f64;
            let d = dr.hypot(dc);
            if d >= r_in && d < r_out {
                weights[(r, c)] = 1.0;
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let norm = 1.0 / count as f64;
    weights.mapv_inplace(|w| w * norm);
    Some(Stencil {
        weights,
        half_rows: half,
        half_cols: half,
    })
}

/// Directional-derivative stencil families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GradientOp {
    /// 3x3 Sobel operator.
    Sobel,
    /// 5x5 Sobel operator.
    Sobel5,
    /// 3x3 Prewitt operator.
    Prewitt,
    /// 2x2 Roberts cross operator.
    Roberts,
    /// Central difference along one axis.
    CentralDifference,
}

/// Derivative direction: `X` along columns, `Y` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// Along columns.
    X,
    /// Along rows.
    Y,
}

fn transposed(stencil: Stencil) -> Stencil {
    Stencil {
        weights: stencil.weights.reversed_axes().as_standard_layout().to_owned(),
        half_rows: stencil.half_cols,
        half_cols: stencil.half_rows,
    }
}

/// Fixed stencil for a gradient operator along an axis.
pub(crate) fn gradient_stencil(op: GradientOp, axis: Axis) -> Stencil {
    let along_x = match op {
        GradientOp::Sobel => Stencil::from_rows(&[
            &[-1.0, 0.0, 1.0],
            &[-2.0, 0.0, 2.0],
            &[-1.0, 0.0, 1.0],
        ]),
        GradientOp::Sobel5 => Stencil::from_rows(&[
            &[-1.0, -2.0, 0.0, 2.0, 1.0],
            &[-4.0, -8.0, 0.0, 8.0, 4.0],
            &[-6.0, -12.0, 0.0, 12.0, 6.0],
            &[-4.0, -8.0, 0.0, 8.0, 4.0],
            &[-1.0, -2.0, 0.0, 2.0, 1.0],
        ]),
        GradientOp::Prewitt => Stencil::from_rows(&[
            &[-1.0, 0.0, 1.0],
            &[-1.0, 0.0, 1.0],
            &[-1.0, 0.0, 1.0],
        ]),
        GradientOp::Roberts => {
            // 2x2 cross embedded in a centered 3x3 support
            Stencil::from_rows(&[
                &[0.0, 0.0, 0.0],
                &[0.0, 1.0, 0.0],
                &[0.0, 0.0, -1.0],
            ])
        }
        GradientOp::CentralDifference => Stencil::from_rows(&[
            &[0.0, 0.0, 0.0],
            &[-0.5, 0.0, 0.5],
            &[0.0, 0.0, 0.0],
        ]),
    };
    match (op, axis) {
        (_, Axis::X) => along_x,
        (GradientOp::Roberts, Axis::Y) => Stencil::from_rows(&[
            &[0.0, 0.0, 0.0],
            &[0.0, 0.0, 1.0],
            &[0.0, -1.0, 0.0],
        ]),
        (_, Axis::Y) => transposed(along_x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_stencil_normalized() {
        let s = box_stencil(3);
        assert_eq!(s.weights.dim(), (3, 3));
        assert_relative_eq!(s.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.weights[(0, 0)], 1.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_box_stencil_size_one_is_identity() {
        let s = box_stencil(1);
        assert_eq!(s.weights.dim(), (1, 1));
        assert_relative_eq!(s.weights[(0, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_radial_disc_includes_center() {
        let s = radial_stencil(0.0, 1.2).unwrap();
        assert_relative_eq!(s.sum(), 1.0, epsilon = 1e-12);
        // center + 4-neighborhood
        assert_relative_eq!(s.weights[(s.half_rows, s.half_cols)], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_radial_annulus_excludes_center() {
        let s = radial_stencil(1.0, 3.0).unwrap();
        assert_relative_eq!(s.weights[(s.half_rows, s.half_cols)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_radial_empty_support() {
        assert!(radial_stencil(0.1, 0.9).is_none());
    }

    #[test]
    fn test_gradient_stencils_sum_to_zero() {
        for op in [
            GradientOp::Sobel,
            GradientOp::Sobel5,
            GradientOp::Prewitt,
            GradientOp::Roberts,
            GradientOp::CentralDifference,
        ] {
            for axis in [Axis::X, Axis::Y] {
                let s = gradient_stencil(op, axis);
                assert_relative_eq!(s.sum(), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_sobel_y_is_transpose_of_x() {
        let x = gradient_stencil(GradientOp::Sobel, Axis::X);
        let y = gradient_stencil(GradientOp::Sobel, Axis::Y);
        assert_relative_eq!(y.weights[(0, 1)], x.weights[(1, 0)], epsilon = 1e-12);
        assert_relative_eq!(y.weights[(0, 0)], x.weights[(0, 0)], epsilon = 1e-12);
    }
}
