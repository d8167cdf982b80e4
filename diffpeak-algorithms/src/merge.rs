//! Equivalence merging for labeled blobs.
//!
//! Forward scanning hands out multiple labels to one connected region
//! whenever it is first seen through different neighbors; the scan records
//! those collisions as equivalence pairs. This module folds a blob map along
//! its equivalence list so that each connected region keeps exactly one
//! blob, under one canonical (smallest) label.

use std::collections::{BTreeMap, HashMap};

use diffpeak_core::Blob3D;

/// Labeled blobs keyed by label. Label `0` is background and never appears.
pub type BlobMap = HashMap<usize, Blob3D>;

/// One observed label collision, stored as `(larger, smaller)`.
pub type EquivalencePair = (usize, usize);

/// All collisions recorded by one or more labeling passes.
pub type EquivalenceList = Vec<EquivalencePair>;

/// Records that `a` and `b` label the same region. Self-pairs are dropped.
pub fn register_equivalence(a: usize, b: usize, equivalences: &mut EquivalenceList) {
    if a == b {
        return;
    }
    equivalences.push((a.max(b), a.min(b)));
}

/// Folds equivalent blobs together, in place.
///
/// Every label in a connected group is redirected to the group's smallest
/// label and the blobs are merged under it, accumulating moments as if the
/// region had been labeled in one pass. Safe to call repeatedly; an empty
/// equivalence list leaves the map untouched.
pub fn merge_equivalent_blobs(blobs: &mut BlobMap, equivalences: &mut EquivalenceList) {
    if equivalences.is_empty() {
        return;
    }
    equivalences.sort_unstable();
    equivalences.dedup();

    // canonical target per label; first insertion wins, so after the sorted
    // scan each label points at the smallest label seen paired with it
    let mut canonical: BTreeMap<usize, usize> = BTreeMap::new();
    for &(larger, smaller) in equivalences.iter() {
        canonical.entry(larger).or_insert(smaller);
    }

    // collapse chains: a -> b -> c becomes a -> c
    let snapshot = canonical.clone();
    for target in canonical.values_mut() {
        while let Some(&next) = snapshot.get(target) {
            *target = next;
        }
    }

    let mut keys: Vec<usize> = blobs.keys().copied().collect();
    keys.sort_unstable();
    for key in keys {
        let Some(&target) = canonical.get(&key) else {
            continue;
        };
        let Some(blob) = blobs.remove(&key) else {
            continue;
        };
        blobs
            .entry(target)
            .and_modify(|existing| existing.merge(&blob))
            .or_insert(blob);
    }
    equivalences.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn blob_at(x: f64, y: f64, frame: f64, value: f64) -> Blob3D {
        Blob3D::new(x, y, frame, value)
    }

    #[test]
    fn test_register_drops_self_pairs() {
        let mut eq = EquivalenceList::new();
        register_equivalence(3, 3, &mut eq);
        assert!(eq.is_empty());
        register_equivalence(2, 7, &mut eq);
        assert_eq!(eq, vec![(7, 2)]);
    }

    #[test]
    fn test_empty_list_is_identity() {
        let mut blobs: BlobMap = HashMap::new();
        blobs.insert(1, blob_at(0.0, 0.0, 0.0, 1.0));
        let mut eq = EquivalenceList::new();
        merge_equivalent_blobs(&mut blobs, &mut eq);
        assert_eq!(blobs.len(), 1);
        assert!(blobs.contains_key(&1));
    }

    #[test]
    fn test_pairwise_merge_keeps_smallest_label() {
        let mut blobs: BlobMap = HashMap::new();
        blobs.insert(1, blob_at(0.0, 0.0, 0.0, 2.0));
        blobs.insert(2, blob_at(4.0, 0.0, 0.0, 2.0));
        let mut eq = EquivalenceList::new();
        register_equivalence(1, 2, &mut eq);
        merge_equivalent_blobs(&mut blobs, &mut eq);

        assert_eq!(blobs.len(), 1);
        let merged = &blobs[&1];
        assert_eq!(merged.n_points(), 2);
        assert_relative_eq!(merged.center()[0], 2.0, epsilon = 1e-12);
        assert!(eq.is_empty());
    }

    #[test]
    fn test_chain_collapses_to_one_blob() {
        // 5 ~ 3, 3 ~ 1: all three end up under label 1
        let mut blobs: BlobMap = HashMap::new();
        blobs.insert(1, blob_at(0.0, 0.0, 0.0, 1.0));
        blobs.insert(3, blob_at(1.0, 0.0, 0.0, 1.0));
        blobs.insert(5, blob_at(2.0, 0.0, 0.0, 1.0));
        let mut eq = EquivalenceList::new();
        register_equivalence(5, 3, &mut eq);
        register_equivalence(3, 1, &mut eq);
        merge_equivalent_blobs(&mut blobs, &mut eq);

        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[&1].n_points(), 3);
        assert_relative_eq!(blobs[&1].center()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_duplicate_pairs_merge_once() {
        let mut blobs: BlobMap = HashMap::new();
        blobs.insert(1, blob_at(0.0, 0.0, 0.0, 1.0));
        blobs.insert(2, blob_at(1.0, 0.0, 0.0, 1.0));
        let mut eq = EquivalenceList::new();
        register_equivalence(1, 2, &mut eq);
        register_equivalence(2, 1, &mut eq);
        register_equivalence(1, 2, &mut eq);
        merge_equivalent_blobs(&mut blobs, &mut eq);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[&1].n_points(), 2);
    }

    #[test]
    fn test_merge_with_absent_representative() {
        // the canonical label may live in another worker's map; the blob is
        // then reinserted under it rather than merged
        let mut blobs: BlobMap = HashMap::new();
        blobs.insert(4, blob_at(1.0, 1.0, 0.0, 1.0));
        let mut eq = EquivalenceList::new();
        register_equivalence(4, 2, &mut eq);
        merge_equivalent_blobs(&mut blobs, &mut eq);
        assert_eq!(blobs.len(), 1);
        assert!(blobs.contains_key(&2));
    }

    #[test]
    fn test_unrelated_blobs_untouched() {
        let mut blobs: BlobMap = HashMap::new();
        blobs.insert(1, blob_at(0.0, 0.0, 0.0, 1.0));
        blobs.insert(2, blob_at(5.0, 5.0, 1.0, 1.0));
        blobs.insert(9, blob_at(9.0, 9.0, 2.0, 1.0));
        let mut eq = EquivalenceList::new();
        register_equivalence(2, 1, &mut eq);
        merge_equivalent_blobs(&mut blobs, &mut eq);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[&9].n_points(), 1);
    }
}
