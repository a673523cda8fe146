//! Edge-improvement swap algorithm (§4.5.3): the algorithmic core of the
//! builder. Breaks one edge, then walks a bounded-depth chain of swaps
//! looking for a net-positive weight change ("gain"), undoing everything
//! if the walk fails to close.

use crate::graph::Graph;
use crate::search;

use super::BuilderConfig;

/// One applied primitive edit, kept so a failed walk can be undone bit for
/// bit.
struct Edit {
    vertex: usize,
    old_neighbor: u32,
    old_weight: f32,
    new_neighbor: u32,
}

fn apply_edit(
    graph: &mut Graph,
    vertex: usize,
    old_neighbor: u32,
    new_neighbor: u32,
    new_weight: f32,
    log: &mut Vec<Edit>,
) {
    let old_weight = graph
        .edge_weight(vertex, old_neighbor)
        .unwrap_or(0.0);
    graph
        .change_edge(vertex, old_neighbor, new_neighbor, new_weight)
        .expect("improve_edges: edited slot must exist");
    log.push(Edit {
        vertex,
        old_neighbor,
        old_weight,
        new_neighbor,
    });
}

fn undo_all(graph: &mut Graph, log: &[Edit]) {
    for edit in log.iter().rev() {
        graph
            .change_edge(edit.vertex, edit.new_neighbor, edit.old_neighbor, edit.old_weight)
            .expect("improve_edges: undo target slot must exist");
    }
}

/// Attempt to improve the local neighborhood around edge `(v1, v2)` of
/// weight `w12`. Returns whether a net-positive sequence of swaps was
/// found and committed; on failure the graph is restored exactly.
pub(super) fn improve_edges(graph: &mut Graph, config: &BuilderConfig, v1: usize, v2: usize, w12: f32) -> bool {
    let mut log = Vec::new();
    apply_edit(graph, v1, v2 as u32, v1 as u32, 0.0, &mut log);
    apply_edit(graph, v2, v1 as u32, v2 as u32, 0.0, &mut log);

    if walk(graph, config, v1, v2, v1, v1, w12, 0, &mut log) {
        true
    } else {
        undo_all(graph, &log);
        false
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    graph: &mut Graph,
    config: &BuilderConfig,
    v1: usize,
    v2: usize,
    v3: usize,
    v4: usize,
    gain: f32,
    step: usize,
    log: &mut Vec<Edit>,
) -> bool {
    let query = graph.feature(v2).to_vec();
    let candidates = search::knn_search(graph, &[v3, v4], &query, config.eps_opt, config.k_opt, None, None);

    let mut best: Option<(usize, usize, f32)> = None;
    for cand in &candidates {
        let nv3 = cand.index;
        if nv3 == v1 || nv3 == v2 || graph.has_edge(v2, nv3 as u32) {
            continue;
        }
        for &nv4 in graph.neighbors(nv3) {
            if nv4 as usize == v2 || nv4 == nv3 as u32 {
                continue;
            }
            let new_gain = gain - graph.distance_between(v2, nv3)
                + graph.edge_weight(nv3, nv4).unwrap_or(0.0);
            if best.map_or(true, |(_, _, g)| new_gain > g) {
                best = Some((nv3, nv4 as usize, new_gain));
            }
        }
    }

    let Some((nv3, nv4, new_gain)) = best else {
        return false;
    };
    if new_gain <= gain {
        return false;
    }
    let gain = new_gain;

    let dist_v2_nv3 = graph.distance_between(v2, nv3);
    apply_edit(graph, v2, v2 as u32, nv3 as u32, dist_v2_nv3, log);
    apply_edit(graph, nv3, nv4 as u32, v2 as u32, dist_v2_nv3, log);
    apply_edit(graph, nv4, nv3 as u32, nv4 as u32, 0.0, log);

    if v1 == nv4 {
        // v1 now carries two vacant self-loop slots: one left over from the
        // caller's initial break, one from the v2/nv3/nv4 edits above
        // landing back on v1. Close both at once by picking a "good vertex"
        // and one of its neighbors ("selected neighbor"), absorbing their
        // shared edge into two new edges to v1 (the same shape as extending
        // a fresh vertex).
        let query_v1 = graph.feature(v1).to_vec();
        let candidates = search::knn_search(graph, &[v2, nv3], &query_v1, config.eps_opt, config.k_opt, None, None);

        let mut best: Option<(usize, usize, f32, f32, f32)> = None;
        for cand in &candidates {
            let good_vertex = cand.index;
            if good_vertex == v1 || graph.has_edge(v1, good_vertex as u32) {
                continue;
            }
            let good_vertex_dist = cand.distance;
            for &sel in graph.neighbors(good_vertex) {
                let selected_neighbor = sel as usize;
                if selected_neighbor == v1 || graph.has_edge(v1, selected_neighbor as u32) {
                    continue;
                }
                let old_neighbor_dist = graph.edge_weight(good_vertex, sel).unwrap_or(0.0);
                let new_neighbor_dist = graph.distance_between(v1, selected_neighbor);
                let new_gain = (gain + old_neighbor_dist) - (good_vertex_dist + new_neighbor_dist);
                if best.map_or(new_gain > 0.0, |(_, _, _, _, g)| new_gain > g) {
                    best = Some((good_vertex, selected_neighbor, good_vertex_dist, new_neighbor_dist, new_gain));
                }
            }
        }

        if let Some((good_vertex, selected_neighbor, good_vertex_dist, new_neighbor_dist, best_gain)) = best {
            if best_gain > 0.0 {
                apply_edit(graph, v1, v1 as u32, good_vertex as u32, good_vertex_dist, log);
                apply_edit(graph, v1, v1 as u32, selected_neighbor as u32, new_neighbor_dist, log);
                apply_edit(graph, good_vertex, selected_neighbor as u32, v1 as u32, good_vertex_dist, log);
                apply_edit(graph, selected_neighbor, good_vertex as u32, v1 as u32, new_neighbor_dist, log);
                return true;
            }
        }
    } else if !graph.has_edge(v1, nv4 as u32) {
        let candidate_gain = gain - graph.distance_between(v1, nv4);
        if candidate_gain > 0.0 {
            let reachable = search::has_path(graph, &[v2, nv3], v1, config.eps_opt, config.k_opt).is_some()
                || search::has_path(graph, &[v2, nv3], nv4, config.eps_opt, config.k_opt).is_some();
            if reachable {
                let dist_v1_nv4 = graph.distance_between(v1, nv4);
                apply_edit(graph, v1, v1 as u32, nv4 as u32, dist_v1_nv4, log);
                apply_edit(graph, nv4, nv4 as u32, v1 as u32, dist_v1_nv4, log);
                return true;
            }
        }
    }

    if step >= config.i_opt {
        return false;
    }
    if gain < 0.0 {
        return false;
    }
    let (v1, v4) = if step % 2 == 1 { (v4, v1) } else { (v1, v4) };
    walk(graph, config, v1, nv4, v2, nv3, gain, step + 1, log)
}
