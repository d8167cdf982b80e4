//! Axis-aligned bounding boxes in detector space (col, row, frame).

use nalgebra::Vector3;

/// An axis-aligned bounding box.
///
/// Peak extents are always derived from the peak's ellipsoid, never stored
/// independently; this type only ever exists as a derived quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    lower: Vector3<f64>,
    upper: Vector3<f64>,
}

impl Aabb {
    /// Creates a box from its lower and upper corners.
    ///
    /// # Panics
    /// Panics if a lower bound exceeds the matching upper bound.
    #[must_use]
    pub fn new(lower: Vector3<f64>, upper: Vector3<f64>) -> Self {
        assert!(
            (0..3).all(|i| lower[i] <= upper[i]),
            "AABB lower bound exceeds upper bound"
        );
        Self { lower, upper }
    }

    /// Lower corner.
    #[must_use]
    pub fn lower(&self) -> &Vector3<f64> {
        &self.lower
    }

    /// Upper corner.
    #[must_use]
    pub fn upper(&self) -> &Vector3<f64> {
        &self.upper
    }

    /// Geometric center.
    #[must_use]
    pub fn center(&self) -> Vector3<f64> {
        (self.lower + self.upper) * 0.5
    }

    /// Edge lengths.
    #[must_use]
    pub fn extents(&self) -> Vector3<f64> {
        self.upper - self.lower
    }

    /// Whether a point lies inside the box (bounds inclusive).
    #[must_use]
    pub fn contains_point(&self, point: &Vector3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.lower[i] && point[i] <= self.upper[i])
    }

    /// Whether `other` lies completely inside this box.
    #[must_use]
    pub fn contains(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.lower[i] <= other.lower[i] && self.upper[i] >= other.upper[i])
    }

    /// Whether the two boxes overlap (touching counts as overlap).
    #[must_use]
    pub fn intersects(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.lower[i] <= other.upper[i] && self.upper[i] >= other.lower[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(lo: [f64; 3], hi: [f64; 3]) -> Aabb {
        Aabb::new(Vector3::from(lo), Vector3::from(hi))
    }

    #[test]
    fn test_contains_point() {
        let b = aabb([0.0, 0.0, 0.0], [2.0, 3.0, 4.0]);
        assert!(b.contains_point(&Vector3::new(1.0, 1.0, 1.0)));
        assert!(b.contains_point(&Vector3::new(2.0, 3.0, 4.0)));
        assert!(!b.contains_point(&Vector3::new(2.1, 1.0, 1.0)));
    }

    #[test]
    fn test_contains_box() {
        let outer = aabb([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let inner = aabb([1.0, 1.0, 1.0], [9.0, 9.0, 9.0]);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_intersects() {
        let a = aabb([0.0, 0.0, 0.0], [2.0, 2.0, 2.0]);
        let b = aabb([1.0, 1.0, 1.0], [3.0, 3.0, 3.0]);
        let c = aabb([2.5, 2.5, 2.5], [4.0, 4.0, 4.0]);
        assert!(a.intersects(&b));
        assert!(b.intersects(&c));
        assert!(!a.intersects(&c));
    }

    #[test]
    #[should_panic(expected = "lower bound exceeds upper")]
    fn test_inverted_bounds_panic() {
        let _ = aabb([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]);
    }
}
