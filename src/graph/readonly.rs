//! Read-only graph store (C6): identical to the mutable [`super::Graph`]
//! except the per-vertex record omits the weight array. Used for
//! query-only workloads where the smaller footprint matters and edges are
//! never mutated.

use std::collections::HashMap;
use std::sync::Arc;

use super::Graph;
use crate::metric::DistanceSpace;
use crate::storage::FeatureStore;
use crate::visited::VisitedListPool;

/// Compact, weight-free variant of [`Graph`], convertible from one.
pub struct ReadonlyGraph {
    space: DistanceSpace,
    d: usize,
    features: FeatureStore,
    neighbors: Vec<u32>,
    labels: Vec<u32>,
    label_index: HashMap<u32, u32>,
    visited_pool: Arc<VisitedListPool>,
}

impl ReadonlyGraph {
    pub(super) fn from_graph(graph: &Graph) -> Self {
        Self {
            space: graph.space,
            d: graph.d,
            features: graph.features.clone(),
            neighbors: graph.neighbors.clone(),
            labels: graph.labels.clone(),
            label_index: graph.label_index.clone(),
            visited_pool: Arc::new(VisitedListPool::new(graph.capacity())),
        }
    }

    /// Assemble directly from parsed parts (used by the persistence
    /// loader, which never materializes weights for this format).
    pub(crate) fn from_parts(
        space: DistanceSpace,
        d: usize,
        features: FeatureStore,
        neighbors: Vec<u32>,
        labels: Vec<u32>,
    ) -> Self {
        let capacity = features.capacity();
        let label_index = labels
            .iter()
            .enumerate()
            .map(|(idx, &label)| (label, idx as u32))
            .collect();
        Self {
            space,
            d,
            features,
            neighbors,
            labels,
            label_index,
            visited_pool: Arc::new(VisitedListPool::new(capacity)),
        }
    }

    /// Fixed vertex capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.features.capacity()
    }

    /// Current vertex count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    /// Fixed per-vertex degree `d`.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.d
    }

    /// The distance space (C1) this graph was constructed with.
    #[must_use]
    pub fn distance_space(&self) -> &DistanceSpace {
        &self.space
    }

    /// The visited-list pool (C3) shared by all searches over this graph.
    #[must_use]
    pub fn visited_pool(&self) -> &Arc<VisitedListPool> {
        &self.visited_pool
    }

    /// External label stored at dense index `idx`.
    #[must_use]
    pub fn label_of(&self, idx: usize) -> u32 {
        self.labels[idx]
    }

    /// Dense index for `label`, if present.
    #[must_use]
    pub fn index_of(&self, label: u32) -> Option<usize> {
        self.label_index.get(&label).map(|&i| i as usize)
    }

    /// Feature bytes stored at dense index `idx`.
    #[must_use]
    pub fn feature(&self, idx: usize) -> &[u8] {
        self.features.get(idx)
    }

    /// Sorted neighbor indices of vertex `idx`.
    #[must_use]
    pub fn neighbors(&self, idx: usize) -> &[u32] {
        &self.neighbors[idx * self.d..idx * self.d + self.d]
    }

    /// Distance from the stored vertex at `idx` to an external query.
    #[must_use]
    pub fn distance_to(&self, idx: usize, query: &[u8]) -> f32 {
        self.space.distance(self.feature(idx), query)
    }

    /// Whether `v` appears in `neighbors(u)` (binary search).
    #[must_use]
    pub fn has_edge(&self, u: usize, v: u32) -> bool {
        self.neighbors(u).binary_search(&v).is_ok()
    }
}
