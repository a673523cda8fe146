//! Builder (C8): the queue-driven insert/remove scheduler plus the
//! edge-improvement swap algorithm that keeps the graph close to RNG
//! conformance as it grows and shrinks.

mod improve;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{BuilderError, GraphError};
use crate::graph::{Graph, GraphLike};
use crate::search;

/// Fixed search/tuning parameters for a [`Builder`], set at construction.
#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    /// `k` used when searching for extension candidates.
    pub k_ext: usize,
    /// `eps` used when searching for extension candidates.
    pub eps_ext: f32,
    /// `k` used by the edge-improvement search.
    pub k_opt: usize,
    /// `eps` used by the edge-improvement search.
    pub eps_opt: f32,
    /// Maximum recursion depth (`max_path_length`) of `improve_edges`'s walk.
    pub i_opt: usize,
    /// Improvement attempts per build step.
    pub swap_tries: usize,
    /// Attempts refunded to the counter on every successful improvement.
    pub additional_swap_tries: usize,
    /// Whether extension enforces approximate RNG pruning (phase 1).
    pub use_rng: bool,
}

enum Task {
    Add { label: u32, feature: Vec<u8> },
    Remove { label: u32 },
}

struct Queued {
    seq: u64,
    task: Task,
}

/// Shared cancellation flag: callbacks can call [`StopToken::stop`] to end a
/// running [`Builder::build`] loop after the current step, without needing
/// a second mutable borrow of the builder.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    /// Request that the owning `build` loop stop after this step.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Observed state after one build step, passed to the `build` callback.
#[derive(Debug, Clone, Copy)]
pub struct BuildStatus {
    /// Label added this step, if the dispatched task was an add.
    pub added: Option<u32>,
    /// Label removed this step, if the dispatched task was a remove.
    pub removed: Option<u32>,
    /// Tasks still queued after this step.
    pub pending: usize,
}

/// Queue-driven builder over a [`Graph`] (C8).
pub struct Builder {
    graph: Graph,
    config: BuilderConfig,
    rng: ChaCha8Rng,
    next_seq: u64,
    queue: VecDeque<Queued>,
    stop_token: StopToken,
}

impl Builder {
    /// Construct a builder over `graph`, seeded deterministically by
    /// `rng_seed`.
    #[must_use]
    pub fn new(graph: Graph, rng_seed: u64, config: BuilderConfig) -> Self {
        Self {
            graph,
            config,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            next_seq: 0,
            queue: VecDeque::new(),
            stop_token: StopToken::default(),
        }
    }

    /// Enqueue an insertion.
    pub fn add_entry(&mut self, label: u32, feature: Vec<u8>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(Queued {
            seq,
            task: Task::Add { label, feature },
        });
    }

    /// Enqueue a removal.
    pub fn remove_entry(&mut self, label: u32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(Queued {
            seq,
            task: Task::Remove { label },
        });
    }

    /// Request the running `build` loop stop after its current step. Can
    /// also be requested from inside the `build` callback via the
    /// [`StopToken`] it receives.
    pub fn stop(&self) {
        log::debug!("builder: stop requested");
        self.stop_token.stop();
    }

    /// A cloneable handle that can request a stop from outside this builder
    /// (e.g. from another thread monitoring a deadline).
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.stop_token.clone()
    }

    /// Access the graph under construction.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Consume the builder, returning the graph under construction.
    #[must_use]
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Drain the task queue, invoking `callback` after each step. If
    /// `infinite` is true, keeps running (pure improvement steps) after the
    /// queue empties until `stop()` is called.
    ///
    /// # Errors
    ///
    /// Returns the first [`BuilderError`] raised by a dispatched task.
    pub fn build<F: FnMut(&BuildStatus, &StopToken)>(&mut self, mut callback: F, infinite: bool) -> Result<(), BuilderError> {
        loop {
            if self.stop_token.is_stopped() {
                break;
            }
            if self.queue.is_empty() && !infinite {
                break;
            }

            let dispatched = self.queue.pop_front();
            let (added, removed) = match dispatched {
                Some(Queued { task: Task::Add { label, feature }, .. }) => {
                    self.extend(label, &feature)?;
                    (Some(label), None)
                }
                Some(Queued { task: Task::Remove { label }, .. }) => {
                    self.remove(label)?;
                    (None, Some(label))
                }
                None => (None, None),
            };

            self.improvement_round();

            let status = BuildStatus {
                added,
                removed,
                pending: self.queue.len(),
            };
            callback(&status, &self.stop_token);

            if self.stop_token.is_stopped() {
                break;
            }
            if self.queue.is_empty() && !infinite {
                break;
            }
        }
        Ok(())
    }

    fn improvement_round(&mut self) {
        if self.graph.size() < 2 {
            return;
        }
        let mut tries = self.config.swap_tries;
        let mut ran = 0;
        while ran < tries {
            ran += 1;
            let u = self.rng.gen_range(0..self.graph.size());
            let neighbors: Vec<(u32, f32)> = self
                .graph
                .neighbors(u)
                .iter()
                .copied()
                .zip(self.graph.weights_of(u).iter().copied())
                .collect();
            let mut improved_any = false;
            for &(n, w) in &neighbors {
                if n as usize == u {
                    continue;
                }
                if self.config.use_rng && is_rng_conformant(&self.graph, u, n as usize) {
                    continue;
                }
                if improve::improve_edges(&mut self.graph, &self.config, u, n as usize, w) {
                    improved_any = true;
                }
            }
            if let Some((heaviest_n, heaviest_w)) = neighbors
                .iter()
                .filter(|&&(n, _)| n as usize != u)
                .copied()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            {
                if improve::improve_edges(&mut self.graph, &self.config, u, heaviest_n as usize, heaviest_w) {
                    improved_any = true;
                }
            }
            if improved_any {
                tries += self.config.additional_swap_tries;
            }
        }
    }

    fn extend(&mut self, label: u32, feature: &[u8]) -> Result<(), BuilderError> {
        let d = self.graph.degree();

        if self.graph.size() < d + 1 {
            let idx = self.graph.add_vertex(label, feature)?;
            for j in 0..idx {
                let weight = self.graph.distance_between(idx, j);
                self.graph.change_edge(idx, idx as u32, j as u32, weight)?;
                self.graph.change_edge(j, j as u32, idx as u32, weight)?;
            }
            return Ok(());
        }

        let entry = self.rng.gen_range(0..self.graph.size());
        let k = self.config.k_ext.max(d);
        let mut ranked = search::knn_search(&self.graph, &[entry], feature, self.config.eps_ext, k, None, None);
        ranked.reverse(); // knn_search returns worst-to-best; we want closest first.
        if ranked.len() < d {
            return Err(BuilderError::InsufficientCandidates {
                found: ranked.len(),
                needed: d,
            });
        }
        let original: HashSet<u32> = ranked.iter().map(|r| r.index as u32).collect();

        let idx = self.graph.add_vertex(label, feature)?;

        let mut installed: Vec<(u32, f32)> = Vec::new();
        let mut connected: HashSet<u32> = HashSet::new();

        for use_rng_phase in [true, false] {
            if installed.len() >= d || (use_rng_phase && !self.config.use_rng) {
                continue;
            }
            if !use_rng_phase && self.config.use_rng {
                log::debug!(
                    "extend: RNG-conformant phase installed {}/{d} edges for vertex {idx}, falling back to unrestricted phase",
                    installed.len()
                );
            }
            loop {
                if installed.len() >= d {
                    break;
                }
                let mut progress = false;
                for cand in &ranked {
                    if installed.len() >= d {
                        break;
                    }
                    let c = cand.index;
                    if c == idx || connected.contains(&(c as u32)) {
                        continue;
                    }
                    if use_rng_phase && !is_rng_conformant(&self.graph, idx, c) {
                        continue;
                    }
                    if self.accept_candidate(idx, c, &mut installed, &mut connected)? {
                        progress = true;
                    }
                }
                if !progress {
                    break;
                }
            }
        }

        if installed.len() < d {
            return Err(BuilderError::InsufficientCandidates {
                found: installed.len(),
                needed: d,
            });
        }

        installed.sort_by_key(|&(n, _)| n);
        let nbrs: Vec<u32> = installed.iter().map(|&(n, _)| n).collect();
        let weights: Vec<f32> = installed.iter().map(|&(_, w)| w).collect();
        self.graph.change_edges(idx, &nbrs, &weights);

        let mut non_perfect: Vec<(u32, f32)> = installed
            .iter()
            .copied()
            .filter(|&(n, _)| !original.contains(&n))
            .collect();
        non_perfect.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (i, &(n, w)) in non_perfect.iter().enumerate() {
            if i % 2 == 0 {
                improve::improve_edges(&mut self.graph, &self.config, idx, n as usize, w);
            }
        }

        Ok(())
    }

    /// Accept candidate `c` as a neighbor of `v`: find `c`'s heaviest edge
    /// to an endpoint `w` not yet connected to `v`, break `(c, w)`, and
    /// install `(c, v)` and `(w, v)`. If this is the odd-degree finishing
    /// slot (it would overshoot `d` by one), `w` is left untouched and only
    /// `c` is kept, restoring `(c, w)`.
    fn accept_candidate(
        &mut self,
        v: usize,
        c: usize,
        installed: &mut Vec<(u32, f32)>,
        connected: &mut HashSet<u32>,
    ) -> Result<bool, GraphError> {
        let d = self.graph.degree();
        let c_row: Vec<(u32, f32)> = self
            .graph
            .neighbors(c)
            .iter()
            .copied()
            .zip(self.graph.weights_of(c).iter().copied())
            .collect();
        let best = c_row
            .iter()
            .filter(|&&(n, _)| n as usize != c && n as usize != v && !connected.contains(&n))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some(&(w, old_weight)) = best else {
            return Ok(false);
        };

        let dist_cv = self.graph.distance_between(c, v);
        self.graph.change_edge(c, w, v as u32, dist_cv)?;
        self.graph.change_edge(w as usize, c as u32, v as u32, old_weight)?;

        installed.push((c as u32, dist_cv));
        connected.insert(c as u32);

        if installed.len() + 1 > d {
            // Odd-degree finishing slot: keep only `c`, restore `(c, w)`.
            self.graph.change_edge(c, v as u32, w, old_weight)?;
            self.graph.change_edge(w as usize, v as u32, c as u32, old_weight)?;
        } else {
            let dist_wv = self.graph.distance_between(w as usize, v);
            self.graph.change_edge(w as usize, c as u32, v as u32, dist_wv)?;
            installed.push((w, dist_wv));
            connected.insert(w);
        }

        Ok(true)
    }

    fn remove(&mut self, label: u32) -> Result<(), BuilderError> {
        let v = self
            .graph
            .index_of(label)
            .ok_or(GraphError::UnknownLabel(label))?;
        let d = self.graph.degree();

        let involved: Vec<u32> = {
            let mut seen: HashSet<u32> = HashSet::new();
            self.graph
                .neighbors(v)
                .iter()
                .copied()
                .filter(|&n| n as usize != v && seen.insert(n))
                .collect()
        };
        for &u in &involved {
            self.graph.change_edge(u as usize, v as u32, u, 0.0)?;
        }

        if self.graph.size() - 1 <= d {
            self.graph.remove_vertex(label)?;
            return Ok(());
        }

        let involved_set: HashSet<u32> = involved.iter().copied().collect();
        let mut parent: HashMap<u32, u32> = involved.iter().map(|&u| (u, u)).collect();
        for &u in &involved {
            let row: Vec<u32> = self.graph.neighbors(u as usize).to_vec();
            for n in row {
                if n != u && involved_set.contains(&n) {
                    union(&mut parent, u, n);
                }
            }
        }

        let singleton_roots: Vec<u32> = {
            let mut counts: HashMap<u32, usize> = HashMap::new();
            for &u in &involved {
                *counts.entry(find(&mut parent, u)).or_insert(0) += 1;
            }
            counts
                .into_iter()
                .filter(|&(_, count)| count == 1)
                .map(|(root, _)| root)
                .collect()
        };
        for s in singleton_roots {
            let others: Vec<usize> = involved
                .iter()
                .copied()
                .filter(|&u| u != s)
                .map(|u| u as usize)
                .collect();
            if others.is_empty() {
                continue;
            }
            let path = search::has_path(&self.graph, &others, s as usize, self.config.eps_opt, self.config.k_opt)
                .or_else(|| search::has_path(&self.graph, &others, s as usize, f32::INFINITY, self.graph.size()));
            if let Some(chain) = path {
                if let Some(first_hop) = chain.last() {
                    union(&mut parent, s, first_hop.predecessor as u32);
                }
            }
        }

        let mut groups_by_root: HashMap<u32, Vec<u32>> = HashMap::new();
        for &u in &involved {
            let root = find(&mut parent, u);
            groups_by_root.entry(root).or_default().push(u);
        }
        let mut groups: Vec<Vec<u32>> = groups_by_root.into_values().collect();
        groups.sort_by_key(Vec::len);

        let mut new_edges: Vec<(u32, u32)> = Vec::new();
        while groups.len() > 1 {
            let small = groups.remove(0);
            let target_idx = groups.len() - 1;
            let mut linked = false;
            'search: for &x in &small {
                for &y in &groups[target_idx] {
                    if !self.graph.has_edge(x as usize, y) {
                        let weight = self.graph.distance_between(x as usize, y as usize);
                        self.graph.change_edge(x as usize, x, y, weight)?;
                        self.graph.change_edge(y as usize, y, x, weight)?;
                        new_edges.push((x, y));
                        linked = true;
                        break 'search;
                    }
                }
            }
            if linked {
                let mut merged = small;
                merged.extend(groups[target_idx].iter().copied());
                groups[target_idx] = merged;
            } else {
                // No vacant pairing found between these two groups; carry
                // the small group forward unmerged rather than stalling.
                groups[target_idx].extend(small);
            }
        }

        // Vertices to re-check for vacancies: starts as the removed
        // vertex's former neighbors, but the two-hop fallback below can
        // open a fresh vacancy on a vertex outside that set, which must be
        // tracked too or it would keep an illegal self-loop (I1).
        let mut tracked: Vec<u32> = involved.clone();
        loop {
            let vacant: Vec<u32> = tracked
                .iter()
                .copied()
                .filter(|&x| self.graph.has_edge(x as usize, x))
                .collect();
            if vacant.is_empty() {
                break;
            }
            let x = vacant[0];
            let mut best_pair: Option<(u32, f32)> = None;
            for &y in &vacant[1..] {
                if self.graph.has_edge(x as usize, y) {
                    continue;
                }
                let dist = self.graph.distance_between(x as usize, y as usize);
                if best_pair.map_or(true, |(_, bd)| dist < bd) {
                    best_pair = Some((y, dist));
                }
            }
            if let Some((y, dist)) = best_pair {
                self.graph.change_edge(x as usize, x, y, dist)?;
                self.graph.change_edge(y as usize, y, x, dist)?;
                new_edges.push((x, y));
                continue;
            }

            // Two-hop swap fallback: find x's nearest two-hop neighbor y'
            // and reconnect through it, freeing one of its edges for x.
            if let Some((y_prime, w_prime)) = self.nearest_two_hop(x) {
                let old_weight = self.graph.edge_weight(y_prime as usize, w_prime).unwrap();
                self.graph.change_edge(y_prime as usize, w_prime, x, old_weight)?;
                self.graph.change_edge(x as usize, x, y_prime, old_weight)?;
                self.graph.change_edge(w_prime as usize, y_prime, w_prime, 0.0)?;
                new_edges.push((x, y_prime));
                if !tracked.contains(&w_prime) {
                    tracked.push(w_prime);
                }
                continue;
            }
            log::debug!("builder: could not fill remaining vacancy for vertex {x} during removal");
            break;
        }

        self.graph.remove_vertex(label)?;

        for (x, y) in new_edges {
            let x = x as usize;
            let y = y as usize;
            // Indices may have shifted by the swap-with-last above; skip an
            // edge whose endpoint no longer resolves (it was the removed
            // vertex's old slot or got moved).
            if x >= self.graph.size() || y >= self.graph.size() {
                continue;
            }
            if let Some(w) = self.graph.edge_weight(x, y as u32) {
                improve::improve_edges(&mut self.graph, &self.config, x, y, w);
            }
        }

        Ok(())
    }

    fn nearest_two_hop(&self, x: u32) -> Option<(u32, u32)> {
        let mut best: Option<(u32, u32, f32)> = None;
        for &n in self.graph.neighbors(x as usize) {
            if n == x {
                continue;
            }
            for &n2 in self.graph.neighbors(n as usize) {
                if n2 == n || n2 == x {
                    continue;
                }
                if self.graph.has_edge(x as usize, n2) {
                    continue;
                }
                let dist = self.graph.distance_between(x as usize, n2 as usize);
                if best.map_or(true, |(_, _, bd)| dist < bd) {
                    best = Some((n, n2, dist));
                }
            }
        }
        best.map(|(n, n2, _)| (n2, n))
    }
}

fn find(parent: &mut HashMap<u32, u32>, x: u32) -> u32 {
    let p = *parent.get(&x).unwrap_or(&x);
    if p == x {
        x
    } else {
        let root = find(parent, p);
        parent.insert(x, root);
        root
    }
}

fn union(parent: &mut HashMap<u32, u32>, a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent.insert(ra, rb);
    }
}

/// RNG (Relative Neighborhood Graph) conformance check for candidate `c`
/// with respect to new vertex `v`: no existing neighbor `w` of `c` may be
/// strictly closer to both `c` and `v` than `c` is to `v`.
fn is_rng_conformant(graph: &Graph, v: usize, c: usize) -> bool {
    let dist_vc = graph.distance_between(v, c);
    for &w in graph.neighbors(c) {
        if w as usize == c || w as usize == v {
            continue;
        }
        let dist_cw = graph.distance_between(c, w as usize);
        let dist_vw = graph.distance_between(v, w as usize);
        if dist_vc > dist_cw.max(dist_vw) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;

    fn f32_feature(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn default_config() -> BuilderConfig {
        BuilderConfig {
            k_ext: 4,
            eps_ext: 0.2,
            k_opt: 4,
            eps_opt: 0.2,
            i_opt: 5,
            swap_tries: 2,
            additional_swap_tries: 1,
            use_rng: true,
        }
    }

    #[test]
    fn scenario_s1_extension_builds_expected_line_neighbors() {
        let graph = Graph::new(16, 2, Metric::L2F32, 2).unwrap();
        let mut builder = Builder::new(graph, 42, default_config());
        for (label, x) in [(10, 0.0), (20, 1.0), (30, 2.0), (40, 3.0), (50, 4.0)] {
            builder.add_entry(label, f32_feature(&[x, 0.0]));
        }
        builder.build(|_, _| {}, false).unwrap();

        let g = builder.graph();
        assert_eq!(g.size(), 5);
        let i30 = g.index_of(30).unwrap();
        let mut neighbor_labels: Vec<u32> = g.neighbors(i30).iter().map(|&n| g.label_of(n as usize)).collect();
        neighbor_labels.sort_unstable();
        assert_eq!(neighbor_labels, vec![20, 40]);
    }

    #[test]
    fn small_graph_below_d_plus_one_is_fully_connected() {
        let graph = Graph::new(8, 3, Metric::L2F32, 1).unwrap();
        let mut builder = Builder::new(graph, 7, default_config());
        for (label, x) in [(1, 0.0), (2, 1.0), (3, 2.0)] {
            builder.add_entry(label, f32_feature(&[x]));
        }
        builder.build(|_, _| {}, false).unwrap();
        let g = builder.graph();
        for u in 0..3 {
            assert_eq!(g.neighbors(u).iter().filter(|&&n| n as usize != u).count(), 2);
        }
    }

    #[test]
    fn scenario_s2_removal_leaves_no_self_loops() {
        let graph = Graph::new(16, 2, Metric::L2F32, 2).unwrap();
        let mut builder = Builder::new(graph, 11, default_config());
        for (label, x) in [(10, 0.0), (20, 1.0), (30, 2.0), (40, 3.0), (50, 4.0)] {
            builder.add_entry(label, f32_feature(&[x, 0.0]));
        }
        builder.remove_entry(20);
        builder.build(|_, _| {}, false).unwrap();

        let g = builder.graph();
        assert_eq!(g.size(), 4);
        for idx in 0..g.size() {
            for &n in g.neighbors(idx) {
                assert_ne!(n as usize, idx, "vertex {idx} still has a self-loop after removal");
            }
        }
    }

    #[test]
    fn stop_from_callback_halts_remaining_queue() {
        let graph = Graph::new(16, 2, Metric::L2F32, 1).unwrap();
        let mut builder = Builder::new(graph, 3, default_config());
        for (label, x) in [(1, 0.0), (2, 1.0), (3, 2.0), (4, 3.0), (5, 4.0)] {
            builder.add_entry(label, f32_feature(&[x]));
        }
        let mut steps = 0;
        builder
            .build(
                |_status, token| {
                    steps += 1;
                    if steps == 2 {
                        token.stop();
                    }
                },
                false,
            )
            .unwrap();
        assert_eq!(steps, 2);
        assert_eq!(builder.graph().size(), 2);
    }

    #[test]
    fn runs_to_completion_without_stopping() {
        let graph = Graph::new(16, 2, Metric::L2F32, 1).unwrap();
        let mut builder = Builder::new(graph, 3, default_config());
        for (label, x) in [(1, 0.0), (2, 1.0), (3, 2.0), (4, 3.0), (5, 4.0)] {
            builder.add_entry(label, f32_feature(&[x]));
        }
        let mut steps = 0;
        builder.build(|_, _| steps += 1, false).unwrap();
        assert_eq!(steps, 5);
    }
}
