//! Graph invariant checks and descriptive statistics (§4.8). Pure predicates
//! over a built graph, used by tests and build diagnostics; never called on
//! the search or build hot path.

use std::collections::VecDeque;

use crate::graph::Graph;

/// Checks I1 (exactly `d` distinct, ascending, non-self neighbors per
/// vertex) and, if `check_back_links` is set, I2 (every edge mirrored at
/// the other endpoint with equal weight). Returns the list of violations
/// found; an empty list means the graph is valid.
pub fn check_validity(graph: &Graph, expected_size: usize, check_back_links: bool) -> Vec<String> {
    let mut violations = Vec::new();
    if graph.size() != expected_size {
        violations.push(format!(
            "graph has {} vertices, expected {expected_size}",
            graph.size()
        ));
    }

    let d = graph.degree();
    if graph.size() <= d {
        return violations;
    }

    for v in 0..graph.size() {
        let nbrs = graph.neighbors(v);
        let mut last: Option<u32> = None;
        for (e, &n) in nbrs.iter().enumerate() {
            if n as usize == v {
                violations.push(format!("vertex {v} has a self-loop at position {e}"));
            } else if last == Some(n) {
                violations.push(format!("vertex {v} has a duplicate neighbor {n} at position {e}"));
            } else if last.is_some_and(|l| l > n) {
                violations.push(format!("vertex {v} neighbor order broken at position {e}"));
            } else if check_back_links && !graph.has_edge(n as usize, v as u32) {
                violations.push(format!("neighbor {n} of vertex {v} has no back-link"));
            } else if check_back_links {
                let fwd = graph.edge_weight(v, n).unwrap();
                let back = graph.edge_weight(n as usize, v as u32).unwrap();
                if fwd != back {
                    violations.push(format!(
                        "edge {v}<->{n} has mismatched weights: {fwd} vs {back}"
                    ));
                }
            }
            last = Some(n);
        }
    }
    violations
}

/// I3: every stored edge weight equals the recomputed distance between its
/// endpoints' features, bit for bit.
pub fn check_weights(graph: &Graph) -> bool {
    for v in 0..graph.size() {
        let nbrs = graph.neighbors(v).to_vec();
        let weights = graph.weights_of(v).to_vec();
        for (&n, &w) in nbrs.iter().zip(weights.iter()) {
            if n as usize == v {
                continue;
            }
            if graph.distance_between(v, n as usize) != w {
                return false;
            }
        }
    }
    true
}

/// I4: the graph is a single connected component, checked by BFS from
/// vertex 0.
pub fn check_connectivity(graph: &Graph) -> bool {
    let size = graph.size();
    if size == 0 {
        return true;
    }

    let mut visited = vec![false; size];
    visited[0] = true;
    let mut frontier = VecDeque::from([0usize]);
    let mut visited_count = 1;

    while let Some(v) = frontier.pop_front() {
        for &n in graph.neighbors(v) {
            let n = n as usize;
            if !visited[n] {
                visited[n] = true;
                visited_count += 1;
                frontier.push_back(n);
            }
        }
    }
    visited_count == size
}

/// Every vertex has exactly `d` distinct non-self neighbors.
pub fn check_regularity(graph: &Graph, size: usize) -> bool {
    if graph.size() != size {
        return false;
    }
    let d = graph.degree();
    for v in 0..graph.size() {
        let nbrs = graph.neighbors(v);
        if nbrs.iter().any(|&n| n as usize == v) {
            return false;
        }
        let mut sorted = nbrs.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != d {
            return false;
        }
    }
    true
}

/// Tests whether `vertex` would stay RNG-conformant if connected to
/// `target` at the given weight: no existing neighbor of `vertex` may form
/// a shorter two-edge detour to `target`. Mirrors the check the builder
/// applies during extension (§4.5.1).
fn is_rng_conformant(graph: &Graph, vertex: usize, target: usize, weight: f32) -> bool {
    for (&n, &nw) in graph.neighbors(vertex).iter().zip(graph.weights_of(vertex).iter()) {
        if n as usize == vertex {
            continue;
        }
        if let Some(nt) = graph.edge_weight(n as usize, target as u32) {
            if weight > nw.max(nt) {
                return false;
            }
        }
    }
    true
}

/// Counts edges that violate the relative-neighborhood-graph condition:
/// for directed edge `(v, n)`, some other neighbor of `v` forms a strictly
/// shorter detour to `n`. Counted per direction, so a mutual violation on
/// an undirected edge contributes twice.
pub fn count_non_rng_edges(graph: &Graph) -> usize {
    let mut count = 0;
    for v in 0..graph.size() {
        for (&n, &w) in graph.neighbors(v).iter().zip(graph.weights_of(v).iter()) {
            if n as usize == v {
                continue;
            }
            if !is_rng_conformant(graph, v, n as usize, w) {
                count += 1;
            }
        }
    }
    count
}

/// Mean weight over all non-vacant edge slots.
pub fn avg_edge_weight(graph: &Graph) -> f32 {
    let mut total = 0.0f64;
    let mut count = 0u64;
    for v in 0..graph.size() {
        for &w in graph.weights_of(v) {
            total += w as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (total / count as f64) as f32
    }
}

/// Buckets all non-vacant edge weights into `bin_count` equal-sized bins
/// and returns each bin's average weight. If `sorted`, weights are sorted
/// ascending before binning (bins then describe a cumulative distribution
/// rather than a spatial one). Trailing weights that don't fill a whole
/// bin are dropped, matching the reference implementation.
pub fn edge_weight_histogram(graph: &Graph, sorted: bool, bin_count: usize) -> Vec<f32> {
    let mut weights = Vec::new();
    for v in 0..graph.size() {
        for (&n, &w) in graph.neighbors(v).iter().zip(graph.weights_of(v).iter()) {
            if n as usize != v {
                weights.push(w);
            }
        }
    }
    if sorted {
        weights.sort_by(f32::total_cmp);
    }

    let bin_size = weights.len() / bin_count.max(1);
    let mut bins = vec![0.0f32; bin_count];
    if bin_size == 0 {
        return bins;
    }
    for (bin, slot) in bins.iter_mut().enumerate() {
        let start = bin * bin_size;
        let sum: f32 = weights[start..start + bin_size].iter().sum();
        *slot = sum / bin_size as f32;
    }
    bins
}
