//! Octree over detector space for broad-phase collision detection.
//!
//! Items are inserted by axis-aligned bounding box; an item overlapping
//! several leaves is stored in each of them. Candidate pairs are gathered
//! per leaf, so two shapes are only ever tested against each other when
//! some leaf contains both.

use std::collections::BTreeSet;

use diffpeak_core::Aabb;
use nalgebra::Vector3;

const DEFAULT_MAX_DEPTH: usize = 6;
const DEFAULT_MAX_STORAGE: usize = 6;

struct Node {
    bounds: Aabb,
    depth: usize,
    /// Index of the first of 8 consecutive children, if split.
    children: Option<usize>,
    /// Indices into the entry arena.
    entries: Vec<usize>,
}

/// A region octree over a fixed volume.
pub struct Octree {
    nodes: Vec<Node>,
    entries: Vec<(usize, Aabb)>,
    max_depth: usize,
    max_storage: usize,
}

impl Octree {
    /// Creates a tree covering `bounds` with default split limits.
    #[must_use]
    pub fn new(bounds: Aabb) -> Self {
        Self::with_limits(bounds, DEFAULT_MAX_DEPTH, DEFAULT_MAX_STORAGE)
    }

    /// Creates a tree with explicit depth and per-leaf storage limits.
    #[must_use]
    pub fn with_limits(bounds: Aabb, max_depth: usize, max_storage: usize) -> Self {
        Self {
            nodes: vec![Node {
                bounds,
                depth: 0,
                children: None,
                entries: Vec::new(),
            }],
            entries: Vec::new(),
            max_depth,
            max_storage,
        }
    }

    /// Inserts an item by bounding box. Items entirely outside the tree
    /// volume are silently kept out of every leaf and never collide.
    pub fn insert(&mut self, item: usize, aabb: Aabb) {
        let entry = self.entries.len();
        self.entries.push((item, aabb));
        self.insert_entry(0, entry);
    }

    fn insert_entry(&mut self, node: usize, entry: usize) {
        if !self.nodes[node].bounds.intersects(&self.entries[entry].1) {
            return;
        }
        if let Some(base) = self.nodes[node].children {
            for child in base..base + 8 {
                self.insert_entry(child, entry);
            }
            return;
        }
        self.nodes[node].entries.push(entry);
        if self.nodes[node].entries.len() > self.max_storage
            && self.nodes[node].depth < self.max_depth
        {
            self.split(node);
        }
    }

    fn split(&mut self, node: usize) {
        let base = self.nodes.len();
        let depth = self.nodes[node].depth;
        let lower = *self.nodes[node].bounds.lower();
        let center = self.nodes[node].bounds.center();
        let upper = *self.nodes[node].bounds.upper();

        for octant in 0..8usize {
            let pick = |bit: usize, axis: usize| {
                if octant & (1 << bit) == 0 {
                    (lower[axis], center[axis])
                } else {
                    (center[axis], upper[axis])
                }
            };
            let (x0, x1) = pick(0, 0);
            let (y0, y1) = pick(1, 1);
            let (z0, z1) = pick(2, 2);
            self.nodes.push(Node {
                bounds: Aabb::new(Vector3::new(x0, y0, z0), Vector3::new(x1, y1, z1)),
                depth: depth + 1,
                children: None,
                entries: Vec::new(),
            });
        }

        let entries = std::mem::take(&mut self.nodes[node].entries);
        self.nodes[node].children = Some(base);
        for entry in entries {
            for child in base..base + 8 {
                self.insert_entry(child, entry);
            }
        }
    }

    /// Collects colliding item pairs, ordered `(smaller, larger)`.
    ///
    /// `narrow` is the exact test, called once per candidate pair that
    /// shares a leaf; the set deduplicates pairs sharing several leaves.
    pub fn colliding_pairs(
        &self,
        narrow: impl Fn(usize, usize) -> bool,
    ) -> BTreeSet<(usize, usize)> {
        let mut pairs = BTreeSet::new();
        for node in &self.nodes {
            if node.children.is_some() {
                continue;
            }
            for (i, &ea) in node.entries.iter().enumerate() {
                for &eb in &node.entries[i + 1..] {
                    let (item_a, ref aabb_a) = self.entries[ea];
                    let (item_b, ref aabb_b) = self.entries[eb];
                    if item_a == item_b {
                        continue;
                    }
                    let key = (item_a.min(item_b), item_a.max(item_b));
                    if pairs.contains(&key) {
                        continue;
                    }
                    if aabb_a.intersects(aabb_b) && narrow(key.0, key.1) {
                        pairs.insert(key);
                    }
                }
            }
        }
        pairs
    }
}
