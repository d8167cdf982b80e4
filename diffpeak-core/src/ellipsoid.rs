//! Ellipsoids in metric-tensor form.
//!
//! An ellipsoid is the set of points `x` with `(x - c)^T M (x - c) <= 1`.
//! The metric form makes scaling and the overlap test cheap, and the
//! bounding box falls out of the diagonal of the inverse metric.

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::aabb::Aabb;

/// A fitted ellipsoid: center, metric tensor and cached inverse.
///
/// Immutable once built apart from uniform scaling. Used both as the peak
/// shape and as the bounding primitive fed to the spatial index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ellipsoid {
    center: Vector3<f64>,
    metric: Matrix3<f64>,
    inverse_metric: Matrix3<f64>,
}

impl Ellipsoid {
    /// Builds an ellipsoid from center, semi-axis lengths and an orientation
    /// matrix whose columns are the axis directions.
    ///
    /// Semi-axes must be strictly positive; callers fit blobs through
    /// [`crate::Blob3D::fit_ellipsoid`], which guarantees this.
    #[must_use]
    pub fn new(center: Vector3<f64>, semi_axes: Vector3<f64>, axes: Matrix3<f64>) -> Self {
        let mut d = Matrix3::zeros();
        let mut d_inv = Matrix3::zeros();
        for i in 0..3 {
            d[(i, i)] = 1.0 / (semi_axes[i] * semi_axes[i]);
            d_inv[(i, i)] = semi_axes[i] * semi_axes[i];
        }
        // M U = U D with U the orthonormal axis matrix
        let metric = axes * d * axes.transpose();
        let inverse_metric = axes * d_inv * axes.transpose();
        Self {
            center,
            metric,
            inverse_metric,
        }
    }

    /// Builds a sphere.
    #[must_use]
    pub fn sphere(center: Vector3<f64>, radius: f64) -> Self {
        Self {
            center,
            metric: Matrix3::identity() / (radius * radius),
            inverse_metric: Matrix3::identity() * (radius * radius),
        }
    }

    /// Center of the ellipsoid.
    #[must_use]
    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    /// Metric tensor.
    #[must_use]
    pub fn metric(&self) -> &Matrix3<f64> {
        &self.metric
    }

    /// Semi-axis lengths, unordered.
    #[must_use]
    pub fn radii(&self) -> Vector3<f64> {
        let eigenvalues = self.metric.symmetric_eigenvalues();
        Vector3::new(
            1.0 / eigenvalues[0].sqrt(),
            1.0 / eigenvalues[1].sqrt(),
            1.0 / eigenvalues[2].sqrt(),
        )
    }

    /// Volume enclosed by the ellipsoid.
    #[must_use]
    pub fn volume(&self) -> f64 {
        const C: f64 = 4.0 * std::f64::consts::PI / 3.0;
        C * self.metric.determinant().powf(-0.5)
    }

    /// Scales all semi-axes by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.metric /= factor * factor;
        self.inverse_metric *= factor * factor;
    }

    /// Whether a point lies inside the ellipsoid.
    #[must_use]
    pub fn contains_point(&self, point: &Vector3<f64>) -> bool {
        let u = point - self.center;
        u.dot(&(self.metric * u)) <= 1.0
    }

    /// Tight axis-aligned bounding box.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        let half = Vector3::new(
            self.inverse_metric[(0, 0)].sqrt(),
            self.inverse_metric[(1, 1)].sqrt(),
            self.inverse_metric[(2, 2)].sqrt(),
        );
        Aabb::new(self.center - half, self.center + half)
    }

    /// Exact overlap test between two ellipsoids.
    ///
    /// Lemma 3 of "Continuous Collision Detection for Elliptic Disks" by
    /// Choi, Wang and Liu: the ellipsoids are separated iff the generalized
    /// characteristic equation has a real negative root. A cheap AABB check
    /// runs first, which also keeps the eigenvalue problem well-conditioned.
    #[must_use]
    pub fn intersects(&self, other: &Ellipsoid) -> bool {
        if !self.aabb().intersects(&other.aabb()) {
            return false;
        }

        let roots = (self.homogeneous_inverse() * other.homogeneous()).complex_eigenvalues();

        const EPS: f64 = 1e-5;
        for i in 0..4 {
            if roots[i].im.abs() < EPS && roots[i].re < 0.0 {
                return false;
            }
        }
        true
    }

    fn homogeneous(&self) -> Matrix4<f64> {
        let mc = -self.metric * self.center;
        let mut q = Matrix4::zeros();
        q.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.metric);
        q.fixed_view_mut::<3, 1>(0, 3).copy_from(&mc);
        q.fixed_view_mut::<1, 3>(3, 0).copy_from(&mc.transpose());
        q[(3, 3)] = self.center.dot(&(self.metric * self.center)) - 1.0;
        q
    }

    fn homogeneous_inverse(&self) -> Matrix4<f64> {
        let block = self.inverse_metric - self.center * self.center.transpose();
        let mut q = Matrix4::zeros();
        q.fixed_view_mut::<3, 3>(0, 0).copy_from(&block);
        q.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-self.center));
        q.fixed_view_mut::<1, 3>(3, 0)
            .copy_from(&(-self.center.transpose()));
        q[(3, 3)] = -1.0;
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere(x: f64, y: f64, z: f64, r: f64) -> Ellipsoid {
        Ellipsoid::sphere(Vector3::new(x, y, z), r)
    }

    #[test]
    fn test_sphere_radii_and_volume() {
        let e = sphere(1.0, 2.0, 3.0, 2.0);
        let radii = e.radii();
        for i in 0..3 {
            assert_relative_eq!(radii[i], 2.0, epsilon = 1e-12);
        }
        assert_relative_eq!(
            e.volume(),
            4.0 / 3.0 * std::f64::consts::PI * 8.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_aabb_of_axis_aligned_ellipsoid() {
        let e = Ellipsoid::new(
            Vector3::new(5.0, 5.0, 5.0),
            Vector3::new(1.0, 2.0, 3.0),
            Matrix3::identity(),
        );
        let bb = e.aabb();
        assert_relative_eq!(bb.lower()[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(bb.lower()[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(bb.lower()[2], 2.0, epsilon = 1e-12);
        assert_relative_eq!(bb.upper()[2], 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_changes_radii() {
        let mut e = sphere(0.0, 0.0, 0.0, 1.0);
        e.scale(3.0);
        assert_relative_eq!(e.radii()[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_contains_point() {
        let e = sphere(0.0, 0.0, 0.0, 1.0);
        assert!(e.contains_point(&Vector3::new(0.5, 0.5, 0.5)));
        assert!(!e.contains_point(&Vector3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_overlapping_spheres_intersect() {
        let a = sphere(0.0, 0.0, 0.0, 1.0);
        let b = sphere(1.5, 0.0, 0.0, 1.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn test_separated_spheres_do_not_intersect() {
        let a = sphere(0.0, 0.0, 0.0, 1.0);
        let b = sphere(2.5, 0.0, 0.0, 1.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_close_but_disjoint_with_overlapping_aabbs() {
        // AABBs overlap at the corner, the ellipsoids themselves do not.
        let a = sphere(0.0, 0.0, 0.0, 1.0);
        let b = sphere(1.4, 1.4, 1.4, 1.0);
        assert!(a.aabb().intersects(&b.aabb()));
        assert!(!a.intersects(&b));
    }
}
