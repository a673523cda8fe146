//! Search engine (C7): best-first k-NN traversal with epsilon relaxation,
//! optional filter and distance-computation budget, plus the builder-only
//! `has_path` variant and the benchmark-oriented `explore`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::filter::Filter;
use crate::graph::GraphLike;

/// A scored vertex, ordered by distance (NaN-free feature vectors are an
/// input precondition enforced by the distance kernels, so `total_cmp`
/// gives a total order here).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    index: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance.total_cmp(&other.distance) == std::cmp::Ordering::Equal
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.total_cmp(&other.distance)
    }
}

/// Scratch state reused across search calls: a min-heap frontier and a
/// `k`-bounded max-heap of results, so repeated searches don't reallocate.
#[derive(Debug, Default)]
pub struct SearchContext {
    frontier: BinaryHeap<Reverse<Candidate>>,
    results: BinaryHeap<Candidate>,
}

impl SearchContext {
    /// A fresh, empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.frontier.clear();
        self.results.clear();
    }
}

/// One result of a k-NN search: a vertex's dense index and its distance to
/// the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Dense index of the matched vertex.
    pub index: usize,
    /// Distance to the query.
    pub distance: f32,
}

/// Run a k-NN search, allocating a fresh [`SearchContext`].
///
/// See [`knn_search_with`] for the full algorithm and parameter meanings.
#[must_use]
pub fn knn_search<G: GraphLike>(
    graph: &G,
    entries: &[usize],
    query: &[u8],
    eps: f32,
    k: usize,
    filter: Option<&Filter>,
    budget: Option<usize>,
) -> Vec<SearchResult> {
    let mut ctx = SearchContext::new();
    knn_search_with(graph, &mut ctx, entries, query, eps, k, filter, budget)
}

/// Best-first, radius-bounded k-NN search (§4.4.1).
///
/// `entries` are the caller-chosen starting vertices. `eps` relaxes the
/// exploration radius beyond the current k-th best distance. `budget`, if
/// `Some`, caps the number of distance computations performed; hitting it
/// returns whatever results have been found so far (not an error, per §7).
/// Results are ordered worst-to-best for the caller to drain.
#[must_use]
pub fn knn_search_with<G: GraphLike>(
    graph: &G,
    ctx: &mut SearchContext,
    entries: &[usize],
    query: &[u8],
    eps: f32,
    k: usize,
    filter: Option<&Filter>,
    budget: Option<usize>,
) -> Vec<SearchResult> {
    if let Some(f) = filter {
        if use_linear_scan(graph.size(), f) {
            log::debug!(
                "knn_search: filter shortcut selected (vertex_count={}, filter_size={}, inclusion_rate={:.4}), falling back to linear scan",
                graph.size(),
                f.size(),
                f.inclusion_rate()
            );
            return linear_scan(graph, query, k, f);
        }
    }

    ctx.clear();
    let mut visited = graph.visited_pool().checkout();
    let mut computations = 0usize;

    for &entry in entries {
        if visited.is_visited(entry) {
            continue;
        }
        visited.visit(entry);
        let distance = graph.distance_to(entry, query);
        computations += 1;
        ctx.frontier.push(Reverse(Candidate {
            distance,
            index: entry as u32,
        }));
        admit(&mut ctx.results, k, Candidate { distance, index: entry as u32 }, filter, graph);
    }

    loop {
        if let Some(b) = budget {
            if computations >= b {
                log::debug!("knn_search: distance-computation budget exhausted at {computations}");
                break;
            }
        }
        let Some(Reverse(current)) = ctx.frontier.pop() else {
            break;
        };
        let radius = current_radius(&ctx.results, k);
        let exploration_radius = relax(radius, eps);
        if current.distance > exploration_radius {
            break;
        }
        for &n in graph.neighbors(current.index as usize) {
            let n = n as usize;
            if visited.is_visited(n) {
                continue;
            }
            visited.visit(n);
            if let Some(b) = budget {
                if computations >= b {
                    break;
                }
            }
            let distance = graph.distance_to(n, query);
            computations += 1;
            let radius = current_radius(&ctx.results, k);
            let exploration_radius = relax(radius, eps);
            if distance <= exploration_radius {
                ctx.frontier.push(Reverse(Candidate {
                    distance,
                    index: n as u32,
                }));
            }
            if distance < radius {
                admit(
                    &mut ctx.results,
                    k,
                    Candidate {
                        distance,
                        index: n as u32,
                    },
                    filter,
                    graph,
                );
            }
        }
    }

    drain_worst_to_best(&mut ctx.results)
}

fn current_radius(results: &BinaryHeap<Candidate>, k: usize) -> f32 {
    if results.len() >= k {
        results.peek().map_or(f32::INFINITY, |c| c.distance)
    } else {
        f32::INFINITY
    }
}

fn relax(radius: f32, eps: f32) -> f32 {
    if radius.is_infinite() {
        return radius;
    }
    if radius < 0.0 {
        radius * (1.0 - eps)
    } else {
        radius * (1.0 + eps)
    }
}

fn admit<G: GraphLike>(
    results: &mut BinaryHeap<Candidate>,
    k: usize,
    candidate: Candidate,
    filter: Option<&Filter>,
    graph: &G,
) {
    if let Some(f) = filter {
        if !f.is_valid(graph.label_of(candidate.index as usize)) {
            return;
        }
    }
    results.push(candidate);
    if results.len() > k {
        results.pop();
    }
}

fn drain_worst_to_best(results: &mut BinaryHeap<Candidate>) -> Vec<SearchResult> {
    let mut out = Vec::with_capacity(results.len());
    while let Some(c) = results.pop() {
        out.push(SearchResult {
            index: c.index as usize,
            distance: c.distance,
        });
    }
    out
}

fn use_linear_scan(vertex_count: usize, filter: &Filter) -> bool {
    vertex_count < 1000 || filter.size() < 10_000 || filter.inclusion_rate() < 0.10
}

fn linear_scan<G: GraphLike>(
    graph: &G,
    query: &[u8],
    k: usize,
    filter: &Filter,
) -> Vec<SearchResult> {
    let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
    filter.for_each_valid_label(|label| {
        let Some(idx) = graph.index_of(label) else {
            return;
        };
        let distance = graph.distance_to(idx, query);
        results.push(Candidate {
            distance,
            index: idx as u32,
        });
        if results.len() > k {
            results.pop();
        }
    });
    drain_worst_to_best(&mut results)
}

/// One hop of a `has_path` trace-back chain: the predecessor vertex and the
/// distance used to reach it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStep {
    /// Predecessor's dense index.
    pub predecessor: usize,
    /// Distance from the predecessor to the next hop toward the target.
    pub distance: f32,
}

/// Builder-only connectivity check (§4.4.2): same best-first traversal as
/// [`knn_search`], but the "filter" is a single target vertex, and on
/// discovery the trace-back chain from target to an entry is returned.
#[must_use]
pub fn has_path<G: GraphLike>(
    graph: &G,
    entries: &[usize],
    target: usize,
    eps: f32,
    k: usize,
) -> Option<Vec<PathStep>> {
    let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut visited = graph.visited_pool().checkout();
    let mut predecessor: Vec<Option<(usize, f32)>> = vec![None; graph.size()];
    // has_path reuses `target`'s own feature as the traversal's query,
    // matching the radius-bounded search shape but homing in on one vertex.
    let query = graph.feature(target).to_vec();

    for &entry in entries {
        if entry == target {
            return Some(Vec::new());
        }
        if visited.is_visited(entry) {
            continue;
        }
        visited.visit(entry);
        let distance = graph.distance_to(entry, &query);
        frontier.push(Reverse(Candidate {
            distance,
            index: entry as u32,
        }));
        results.push(Candidate {
            distance,
            index: entry as u32,
        });
        if results.len() > k {
            results.pop();
        }
    }

    while let Some(Reverse(current)) = frontier.pop() {
        let radius = current_radius(&results, k);
        let exploration_radius = relax(radius, eps);
        if current.distance > exploration_radius {
            break;
        }
        let current_idx = current.index as usize;
        for &n in graph.neighbors(current_idx) {
            let n = n as usize;
            if visited.is_visited(n) {
                continue;
            }
            visited.visit(n);
            let distance = graph.distance_to(n, &query);
            predecessor[n] = Some((current_idx, distance));
            if n == target {
                return Some(trace_back(&predecessor, target));
            }
            let radius = current_radius(&results, k);
            let exploration_radius = relax(radius, eps);
            if distance <= exploration_radius {
                frontier.push(Reverse(Candidate {
                    distance,
                    index: n as u32,
                }));
            }
            if distance < radius {
                results.push(Candidate {
                    distance,
                    index: n as u32,
                });
                if results.len() > k {
                    results.pop();
                }
            }
        }
    }
    None
}

fn trace_back(predecessor: &[Option<(usize, f32)>], target: usize) -> Vec<PathStep> {
    let mut chain = Vec::new();
    let mut current = target;
    while let Some((pred, distance)) = predecessor[current] {
        chain.push(PathStep {
            predecessor: pred,
            distance,
        });
        current = pred;
    }
    chain
}

/// Bounded-depth exploration from a single entry vertex (§4.4.3). Used to
/// enumerate a neighborhood for benchmarks, never by the builder. `budget`
/// must be strictly positive; `eps` is derived from it as
/// `log10(budget / k)`, a heuristic preserved from the source without
/// further justification (§9).
///
/// # Panics
///
/// Panics if `budget == 0` or `k == 0`.
#[must_use]
pub fn explore<G: GraphLike>(graph: &G, entry: usize, k: usize, budget: usize) -> Vec<SearchResult> {
    assert!(budget > 0, "explore requires a strictly positive budget");
    assert!(k > 0, "explore requires k > 0");
    let query = graph.feature(entry).to_vec();
    #[allow(clippy::cast_precision_loss)]
    let eps = ((budget as f64) / (k as f64)).log10() as f32;
    knn_search(graph, &[entry], &query, eps, k, None, Some(budget))
}

/// Runs independent k-NN searches concurrently across a thread pool (§5:
/// "searches are thread-safe and may run in parallel against an immutable
/// graph"). Each query gets its own [`SearchContext`], so there is no
/// contention beyond the visited-list pool's checkout mutex.
#[cfg(feature = "parallel")]
pub fn par_knn_search<G>(
    graph: &G,
    entries: &[usize],
    queries: &[Vec<u8>],
    eps: f32,
    k: usize,
    filter: Option<&Filter>,
    budget: Option<usize>,
) -> Vec<Vec<SearchResult>>
where
    G: GraphLike + Sync,
{
    use rayon::prelude::*;

    queries
        .par_iter()
        .map(|query| knn_search(graph, entries, query, eps, k, filter, budget))
        .collect()
}
