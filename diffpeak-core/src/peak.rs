//! Candidate peaks emitted by the search.

use crate::ellipsoid::Ellipsoid;

/// A peak candidate: a fitted ellipsoid bound to its source data set.
///
/// Ownership passes to the caller at emission. Peaks whose bounding box is
/// not fully contained in the usable detector area are emitted with
/// `selected == false` rather than dropped, so downstream stages can still
/// inspect them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidatePeak {
    dataset: String,
    shape: Ellipsoid,
    selected: bool,
}

impl CandidatePeak {
    /// Creates a selected peak bound to a data set.
    #[must_use]
    pub fn new(dataset: impl Into<String>, shape: Ellipsoid) -> Self {
        Self {
            dataset: dataset.into(),
            shape,
            selected: true,
        }
    }

    /// Name of the data set the peak was found in.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Fitted shape.
    #[must_use]
    pub fn shape(&self) -> &Ellipsoid {
        &self.shape
    }

    /// Frame interval spanned by the peak, derived from its shape.
    #[must_use]
    pub fn frame_range(&self) -> (f64, f64) {
        let bb = self.shape.aabb();
        (bb.lower()[2], bb.upper()[2])
    }

    /// Whether the peak lies fully inside the usable detector area.
    #[must_use]
    pub fn selected(&self) -> bool {
        self.selected
    }

    /// Marks the peak unselected. Used for peaks clipped by the detector edge.
    pub fn deselect(&mut self) {
        self.selected = false;
    }
}
