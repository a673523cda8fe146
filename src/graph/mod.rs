//! Graph store (C5): a size-bounded, d-regular, undirected weighted graph
//! with a sorted-neighbor-list invariant, plus primitives to add/remove
//! vertices and swap single edges while preserving that invariant.

pub mod readonly;

pub use readonly::ReadonlyGraph;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphError;
use crate::metric::{DistanceSpace, Metric};
use crate::storage::FeatureStore;
use crate::visited::VisitedListPool;

/// Common read surface shared by [`Graph`] (C5) and [`ReadonlyGraph`] (C6),
/// letting the search engine (C7) run against either without caring which.
pub trait GraphLike {
    /// Current vertex count.
    fn size(&self) -> usize;
    /// Sorted neighbor indices of vertex `idx`.
    fn neighbors(&self, idx: usize) -> &[u32];
    /// Feature bytes stored at dense index `idx`.
    fn feature(&self, idx: usize) -> &[u8];
    /// Distance from the stored vertex at `idx` to an external query.
    fn distance_to(&self, idx: usize, query: &[u8]) -> f32;
    /// External label stored at dense index `idx`.
    fn label_of(&self, idx: usize) -> u32;
    /// Dense index for `label`, if present.
    fn index_of(&self, label: u32) -> Option<usize>;
    /// The visited-list pool (C3) shared by all searches over this graph.
    fn visited_pool(&self) -> &Arc<VisitedListPool>;
}

impl GraphLike for Graph {
    fn size(&self) -> usize {
        Graph::size(self)
    }
    fn neighbors(&self, idx: usize) -> &[u32] {
        Graph::neighbors(self, idx)
    }
    fn feature(&self, idx: usize) -> &[u8] {
        Graph::feature(self, idx)
    }
    fn distance_to(&self, idx: usize, query: &[u8]) -> f32 {
        Graph::distance_to(self, idx, query)
    }
    fn label_of(&self, idx: usize) -> u32 {
        Graph::label_of(self, idx)
    }
    fn index_of(&self, label: u32) -> Option<usize> {
        Graph::index_of(self, label)
    }
    fn visited_pool(&self) -> &Arc<VisitedListPool> {
        Graph::visited_pool(self)
    }
}

impl GraphLike for ReadonlyGraph {
    fn size(&self) -> usize {
        ReadonlyGraph::size(self)
    }
    fn neighbors(&self, idx: usize) -> &[u32] {
        ReadonlyGraph::neighbors(self, idx)
    }
    fn feature(&self, idx: usize) -> &[u8] {
        ReadonlyGraph::feature(self, idx)
    }
    fn distance_to(&self, idx: usize, query: &[u8]) -> f32 {
        ReadonlyGraph::distance_to(self, idx, query)
    }
    fn label_of(&self, idx: usize) -> u32 {
        ReadonlyGraph::label_of(self, idx)
    }
    fn index_of(&self, label: u32) -> Option<usize> {
        ReadonlyGraph::index_of(self, label)
    }
    fn visited_pool(&self) -> &Arc<VisitedListPool> {
        ReadonlyGraph::visited_pool(self)
    }
}

/// A mutable, size-bounded DEG: the primary graph store (C5).
pub struct Graph {
    space: DistanceSpace,
    d: usize,
    features: FeatureStore,
    /// Flat, `d`-stride neighbor indices: row `idx` is
    /// `neighbors[idx*d .. idx*d+d]`, ascending, no duplicates (I1).
    neighbors: Vec<u32>,
    /// Parallel to `neighbors`: `weights[idx*d+i] == weight(idx, neighbors[idx*d+i])`.
    weights: Vec<f32>,
    /// Dense index -> external label.
    labels: Vec<u32>,
    /// External label -> dense index (I5).
    label_index: HashMap<u32, u32>,
    visited_pool: Arc<VisitedListPool>,
}

impl Graph {
    /// Construct an empty graph with room for `capacity` vertices, each
    /// carrying `d` neighbor slots, under `metric` over `dim`-element
    /// features.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidConfig`] if `capacity == 0`, `d == 0`,
    /// or `dim == 0`.
    pub fn new(capacity: usize, d: u8, metric: Metric, dim: usize) -> Result<Self, GraphError> {
        if capacity == 0 {
            return Err(GraphError::InvalidConfig("capacity must be > 0".into()));
        }
        if d == 0 {
            return Err(GraphError::InvalidConfig("d must be > 0".into()));
        }
        if dim == 0 {
            return Err(GraphError::InvalidConfig("dim must be > 0".into()));
        }
        let space = DistanceSpace::new(metric, dim);
        let d = d as usize;
        Ok(Self {
            features: FeatureStore::new(capacity, space.data_size()),
            space,
            d,
            neighbors: Vec::with_capacity(capacity * d),
            weights: Vec::with_capacity(capacity * d),
            labels: Vec::with_capacity(capacity),
            label_index: HashMap::with_capacity(capacity),
            visited_pool: Arc::new(VisitedListPool::new(capacity)),
        })
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
    ///
    /// # Panics
    ///
    /// Panics if `idx >= size()`.
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
    ///
    /// # Panics
    ///
    /// Panics if `idx >= size()`.
    #[must_use]
    pub fn feature(&self, idx: usize) -> &[u8] {
        self.features.get(idx)
    }

    /// Sorted neighbor indices of vertex `idx`. Always has length `d()`; a
    /// self-referencing entry denotes a vacant slot (§3).
    ///
    /// # Panics
    ///
    /// Panics if `idx >= size()`.
    #[must_use]
    pub fn neighbors(&self, idx: usize) -> &[u32] {
        &self.neighbors[idx * self.d..idx * self.d + self.d]
    }

    /// Edge weights parallel to [`Self::neighbors`].
    ///
    /// # Panics
    ///
    /// Panics if `idx >= size()`.
    #[must_use]
    pub fn weights_of(&self, idx: usize) -> &[f32] {
        &self.weights[idx * self.d..idx * self.d + self.d]
    }

    /// Distance between two stored vertices, recomputed from their feature
    /// bytes (used to verify I3, and by search/build to score candidates).
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    #[must_use]
    pub fn distance_between(&self, u: usize, v: usize) -> f32 {
        self.space.distance(self.feature(u), self.feature(v))
    }

    /// Distance from the stored vertex at `idx` to an external query.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range or `query.len() != data_size()`.
    #[must_use]
    pub fn distance_to(&self, idx: usize, query: &[u8]) -> f32 {
        self.space.distance(self.feature(idx), query)
    }

    /// Add a new vertex, assigning it dense index `size()` and initializing
    /// all `d` neighbor slots to self-loops of weight 0 (§3).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateLabel`] if `label` is already present,
    /// or [`GraphError::CapacityExceeded`] if the graph is full.
    ///
    /// # Panics
    ///
    /// Panics if `feature.len() != data_size()`.
    pub fn add_vertex(&mut self, label: u32, feature: &[u8]) -> Result<usize, GraphError> {
        if self.label_index.contains_key(&label) {
            return Err(GraphError::DuplicateLabel(label));
        }
        if self.size() >= self.capacity() {
            return Err(GraphError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        let idx = self.features.push(feature);
        for _ in 0..self.d {
            self.neighbors.push(idx as u32);
            self.weights.push(0.0);
        }
        self.labels.push(label);
        self.label_index.insert(label, idx as u32);
        Ok(idx)
    }

    /// Remove the vertex with external label `label`, returning the dense
    /// neighbor list it held just before removal (the builder uses this to
    /// repair the rest of the graph). Implemented via swap-with-last: the
    /// highest-indexed vertex moves into the freed slot and every reference
    /// to its old index is rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownLabel`] if `label` is absent.
    pub fn remove_vertex(&mut self, label: u32) -> Result<Vec<(u32, f32)>, GraphError> {
        let idx = self
            .label_index
            .get(&label)
            .copied()
            .ok_or(GraphError::UnknownLabel(label))? as usize;

        let old_neighbors: Vec<(u32, f32)> = self
            .neighbors(idx)
            .iter()
            .zip(self.weights_of(idx))
            .map(|(&n, &w)| (n, w))
            .collect();

        let last = self.size() - 1;
        if idx != last {
            for slot in 0..self.d {
                let n = self.neighbors[last * self.d + slot] as usize;
                if n != last && n != idx {
                    let weight = self.weights[last * self.d + slot];
                    self.retarget(n, last as u32, idx as u32, weight);
                }
            }
        }
        self.swap_remove_record(idx, last);
        self.label_index.remove(&label);
        Ok(old_neighbors)
    }

    /// Replace `from_nbr` in `neighbors(v)` with `to_nbr` at `weight`,
    /// preserving ascending order (I1). Does not mirror the other endpoint —
    /// callers are responsible for updating `neighbors(to_nbr)`/`neighbors(from_nbr)`
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NeighborNotFound`] if `from_nbr` is not present
    /// in `neighbors(v)`.
    pub fn change_edge(
        &mut self,
        v: usize,
        from_nbr: u32,
        to_nbr: u32,
        weight: f32,
    ) -> Result<(), GraphError> {
        self.replace_in_row(v, from_nbr, to_nbr, weight)
    }

    /// Bulk-replace the entire neighbor row of `v`. Caller guarantees
    /// `nbrs` is sorted ascending, `nbrs.len() == d()`, and contains no
    /// duplicates.
    ///
    /// # Panics
    ///
    /// Panics if `nbrs.len() != d()` or `weights.len() != d()`.
    pub fn change_edges(&mut self, v: usize, nbrs: &[u32], weights: &[f32]) {
        assert_eq!(nbrs.len(), self.d);
        assert_eq!(weights.len(), self.d);
        let base = v * self.d;
        self.neighbors[base..base + self.d].copy_from_slice(nbrs);
        self.weights[base..base + self.d].copy_from_slice(weights);
    }

    /// Whether `v` appears in `neighbors(u)` (binary search).
    #[must_use]
    pub fn has_edge(&self, u: usize, v: u32) -> bool {
        self.neighbors(u).binary_search(&v).is_ok()
    }

    /// The weight of edge `(u, v)`, or `None` if absent (binary search).
    /// Replaces the source's `-1.0` sentinel with a proper sum type (§9).
    #[must_use]
    pub fn edge_weight(&self, u: usize, v: u32) -> Option<f32> {
        self.neighbors(u)
            .binary_search(&v)
            .ok()
            .map(|pos| self.weights_of(u)[pos])
    }

    /// Build a read-only copy (C6) of this graph, stripping the weight
    /// array from every vertex record.
    #[must_use]
    pub fn to_readonly(&self) -> ReadonlyGraph {
        ReadonlyGraph::from_graph(self)
    }

    fn replace_in_row(
        &mut self,
        v: usize,
        from: u32,
        to: u32,
        weight: f32,
    ) -> Result<(), GraphError> {
        let base = v * self.d;
        let row = &self.neighbors[base..base + self.d];
        let pos = row
            .iter()
            .position(|&n| n == from)
            .ok_or(GraphError::NeighborNotFound {
                vertex: self.labels[v],
                neighbor: from,
            })?;
        let mut pairs: Vec<(u32, f32)> = (0..self.d)
            .map(|i| (self.neighbors[base + i], self.weights[base + i]))
            .collect();
        pairs.remove(pos);
        let insert_pos = pairs.partition_point(|&(n, _)| n < to);
        pairs.insert(insert_pos, (to, weight));
        for (i, (n, w)) in pairs.into_iter().enumerate() {
            self.neighbors[base + i] = n;
            self.weights[base + i] = w;
        }
        Ok(())
    }

    fn retarget(&mut self, vertex: usize, from: u32, to: u32, weight: f32) {
        self.replace_in_row(vertex, from, to, weight)
            .expect("swap-with-last retarget: back-reference must exist");
    }

    fn swap_remove_record(&mut self, idx: usize, last: usize) {
        if idx != last {
            for slot in 0..self.d {
                self.neighbors[idx * self.d + slot] = self.neighbors[last * self.d + slot];
                self.weights[idx * self.d + slot] = self.weights[last * self.d + slot];
            }
            self.labels[idx] = self.labels[last];
            self.label_index.insert(self.labels[idx], idx as u32);
        }
        self.neighbors.truncate(last * self.d);
        self.weights.truncate(last * self.d);
        self.labels.truncate(last);
        self.features.swap_remove(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_feature(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn toy_graph() -> Graph {
        // S1: labels 10..50 on a line, dim=2, L2, d=2.
        let mut g = Graph::new(8, 2, Metric::L2F32, 2).unwrap();
        for (label, x) in [(10, 0.0), (20, 1.0), (30, 2.0), (40, 3.0), (50, 4.0)] {
            g.add_vertex(label, &f32_feature(&[x, 0.0])).unwrap();
        }
        g
    }

    #[test]
    fn add_vertex_assigns_dense_indices_and_self_loops() {
        let mut g = Graph::new(4, 2, Metric::L2F32, 2).unwrap();
        let idx = g.add_vertex(7, &f32_feature(&[1.0, 2.0])).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(g.size(), 1);
        assert_eq!(g.neighbors(0), &[0, 0]);
        assert_eq!(g.weights_of(0), &[0.0, 0.0]);
        assert_eq!(g.label_of(0), 7);
        assert_eq!(g.index_of(7), Some(0));
    }

    #[test]
    fn add_vertex_rejects_duplicate_label() {
        let mut g = Graph::new(4, 1, Metric::L2F32, 1).unwrap();
        g.add_vertex(1, &f32_feature(&[0.0])).unwrap();
        let err = g.add_vertex(1, &f32_feature(&[1.0])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateLabel(1));
    }

    #[test]
    fn add_vertex_rejects_past_capacity() {
        let mut g = Graph::new(1, 1, Metric::L2F32, 1).unwrap();
        g.add_vertex(1, &f32_feature(&[0.0])).unwrap();
        assert!(matches!(
            g.add_vertex(2, &f32_feature(&[1.0])),
            Err(GraphError::CapacityExceeded { capacity: 1 })
        ));
    }

    #[test]
    fn change_edge_preserves_sort_order() {
        let mut g = toy_graph();
        // vertex 0's neighbors start as [0, 0]; install [1, 3] directly.
        g.change_edges(0, &[1, 3], &[1.0, 9.0]);
        g.change_edge(0, 3, 2, 4.0).unwrap();
        assert_eq!(g.neighbors(0), &[1, 2]);
        assert_eq!(g.weights_of(0), &[1.0, 4.0]);
    }

    #[test]
    fn change_edge_missing_neighbor_errors() {
        let mut g = toy_graph();
        let err = g.change_edge(0, 99, 1, 1.0).unwrap_err();
        assert!(matches!(err, GraphError::NeighborNotFound { .. }));
    }

    #[test]
    fn has_edge_and_edge_weight_use_binary_search() {
        let mut g = toy_graph();
        g.change_edges(0, &[1, 2], &[1.0, 4.0]);
        assert!(g.has_edge(0, 1));
        assert!(!g.has_edge(0, 4));
        assert_eq!(g.edge_weight(0, 1), Some(1.0));
        assert_eq!(g.edge_weight(0, 4), None);
    }

    #[test]
    fn remove_vertex_swaps_last_into_hole_and_rewrites_back_references() {
        let mut g = toy_graph();
        // wire a small ring: 0-1, 1-2, 2-3, 3-4, 4-0 (each d=2, fully used).
        let edges = [(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (3, 4, 1.0), (4, 0, 1.0)];
        for &(u, v, w) in &edges {
            let from = g.neighbors(u).iter().copied().find(|&n| n == u as u32).unwrap();
            g.change_edge(u, from, v as u32, w).unwrap();
        }
        for &(u, v, w) in &edges {
            let from = g.neighbors(v).iter().copied().find(|&n| n == v as u32).unwrap();
            g.change_edge(v, from, u as u32, w).unwrap();
        }
        assert!(g.has_edge(4, 0));

        // Remove label for index 1 (the new last index is 4, "label 50").
        let removed_label = g.label_of(1);
        let old = g.remove_vertex(removed_label).unwrap();
        assert_eq!(old.len(), 2);
        assert_eq!(g.size(), 4);
        // Former index 4 (label 50) now lives at index 1.
        assert_eq!(g.label_of(1), 50);
        // Whoever referenced old index 4 must now reference index 1.
        assert!(g.has_edge(0, 1));
        assert!(g.index_of(removed_label).is_none());
    }

    #[test]
    fn remove_vertex_unknown_label_errors() {
        let mut g = toy_graph();
        assert_eq!(
            g.remove_vertex(9999).unwrap_err(),
            GraphError::UnknownLabel(9999)
        );
    }

    #[test]
    fn distance_between_matches_distance_space() {
        let g = toy_graph();
        // labels 30 (x=2.0) and 40 (x=3.0): squared L2 = 1.0.
        let i30 = g.index_of(30).unwrap();
        let i40 = g.index_of(40).unwrap();
        assert_eq!(g.distance_between(i30, i40), 1.0);
    }
}
