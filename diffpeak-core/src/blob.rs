//! Blob accumulators: running moments of a connected voxel set.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::ellipsoid::Ellipsoid;

/// Mass below which a blob cannot be fitted.
const MIN_MASS: f64 = 1e-7;

/// A connected component of above-threshold voxels, kept as running
/// intensity-weighted moments.
///
/// Merging two blobs combines the sums exactly; no voxel is ever revisited.
/// Coordinates are (col, row, frame) to match detector convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob3D {
    /// Zeroth moment: total intensity.
    m0: f64,
    /// First moment: intensity-weighted coordinate sum.
    m1: Vector3<f64>,
    /// Second moment: intensity-weighted outer-product sum.
    m2: Matrix3<f64>,
    /// Number of voxels accumulated.
    n_points: usize,
}

impl Blob3D {
    /// Seeds a blob with its first voxel.
    #[must_use]
    pub fn new(x: f64, y: f64, frame: f64, value: f64) -> Self {
        let mut blob = Self {
            m0: 0.0,
            m1: Vector3::zeros(),
            m2: Matrix3::zeros(),
            n_points: 0,
        };
        blob.add_point(x, y, frame, value);
        blob
    }

    /// Accumulates one voxel.
    pub fn add_point(&mut self, x: f64, y: f64, frame: f64, value: f64) {
        let p = Vector3::new(x, y, frame);
        self.m0 += value;
        self.m1 += value * p;
        self.m2 += value * p * p.transpose();
        self.n_points += 1;
    }

    /// Folds another blob into this one. The argument is consumed: the
    /// caller must erase it from its table afterwards.
    pub fn merge(&mut self, other: &Blob3D) {
        self.m0 += other.m0;
        self.m1 += other.m1;
        self.m2 += other.m2;
        self.n_points += other.n_points;
    }

    /// Number of voxels in the blob.
    #[must_use]
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// Total accumulated intensity.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.m0
    }

    /// Intensity-weighted centroid.
    #[must_use]
    pub fn center(&self) -> Vector3<f64> {
        self.m1 / self.m0
    }

    /// Fits an ellipsoid to the blob's moments, semi-axes scaled by `scale`.
    ///
    /// Center is the weighted centroid, axes come from the eigendecomposition
    /// of the weighted covariance, semi-axis lengths are `scale * sqrt(λ)`.
    /// Returns `None` for numerically degenerate blobs: negligible mass, a
    /// failed eigendecomposition, or a covariance collapsed along some axis.
    /// Callers drop such blobs and continue.
    #[must_use]
    pub fn fit_ellipsoid(&self, scale: f64) -> Option<Ellipsoid> {
        if self.m0 < MIN_MASS {
            return None;
        }

        let center = self.center();
        let covariance = self.m2 / self.m0 - center * center.transpose();
        let eigen = SymmetricEigen::try_new(covariance, 1.0e-12, 200)?;

        let mut semi_axes = Vector3::zeros();
        for i in 0..3 {
            let axis = scale * eigen.eigenvalues[i].abs().sqrt();
            if !axis.is_finite() || axis <= 0.0 {
                return None;
            }
            semi_axes[i] = axis;
        }

        Some(Ellipsoid::new(center, semi_axes, eigen.eigenvectors))
    }
}
