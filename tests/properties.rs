//! Property-based coverage for the invariants and boundary behaviors of
//! spec §8 (P1, P2, P6, P9) plus monotonicity (S6-style) over randomly
//! generated small graphs.

use degraph::builder::{Builder, BuilderConfig};
use degraph::filter::Filter;
use degraph::graph::Graph;
use degraph::metric::{DistanceSpace, Metric};
use degraph::{analysis, search};
use proptest::prelude::*;

fn f32_feature(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

fn config(d: usize) -> BuilderConfig {
    BuilderConfig {
        k_ext: (d * 3).max(4),
        eps_ext: 0.2,
        k_opt: d,
        eps_opt: 0.2,
        i_opt: 3,
        swap_tries: 2,
        additional_swap_tries: 1,
        use_rng: true,
    }
}

fn points_strategy() -> impl Strategy<Value = Vec<(f32, f32)>> {
    prop::collection::vec((-50.0f32..50.0, -50.0f32..50.0), 5..40)
}

proptest! {
    /// P1: I1-I5 hold after any successful sequence of additions, and still
    /// hold after a subsequent sequence of removals.
    #[test]
    fn p1_validity_holds_after_add_and_remove(points in points_strategy(), remove_every in 2usize..5) {
        let d = 3u8;
        let graph = Graph::new(points.len() + 1, d, Metric::L2F32, 2).unwrap();
        let mut builder = Builder::new(graph, 1, config(d as usize));
        for (label, (x, y)) in points.iter().enumerate() {
            builder.add_entry(label as u32, f32_feature(&[*x, *y]));
        }
        builder.build(|_, _| {}, false).unwrap();

        let size_after_add = builder.graph().size();
        prop_assert!(analysis::check_validity(builder.graph(), size_after_add, true).is_empty());

        let mut remaining = points.len();
        for label in (0..points.len() as u32).step_by(remove_every) {
            builder.remove_entry(label);
            remaining -= 1;
        }
        builder.build(|_, _| {}, false).unwrap();

        prop_assert_eq!(builder.graph().size(), remaining);
        prop_assert!(analysis::check_validity(builder.graph(), remaining, true).is_empty());
    }

    /// P2 / P6: every stored edge weight equals the recomputed distance
    /// between its endpoints, both right after the build step and on a
    /// direct per-slot check.
    #[test]
    fn p2_and_p6_weights_match_recomputed_distance(points in points_strategy()) {
        let d = 4u8;
        let graph = Graph::new(points.len() + 1, d, Metric::L2F32, 2).unwrap();
        let mut builder = Builder::new(graph, 2, config(d as usize));
        for (label, (x, y)) in points.iter().enumerate() {
            builder.add_entry(label as u32, f32_feature(&[*x, *y]));
        }
        builder.build(|_, _| {}, false).unwrap();

        let g = builder.graph();
        prop_assert!(analysis::check_weights(g));

        for v in 0..g.size() {
            for (&n, &w) in g.neighbors(v).iter().zip(g.weights_of(v)) {
                if n as usize == v {
                    continue;
                }
                prop_assert_eq!(w, g.distance_between(v, n as usize));
            }
        }
    }

    /// P9: a filter admitting fewer than 10 labels makes search fall back
    /// to a linear scan, returning exactly the top-min(k, count) by
    /// distance.
    #[test]
    fn p9_small_filter_returns_exact_top_k(points in points_strategy(), k in 1usize..8) {
        let d = 4u8;
        let graph = Graph::new(points.len() + 1, d, Metric::L2F32, 2).unwrap();
        let mut builder = Builder::new(graph, 3, config(d as usize));
        for (label, (x, y)) in points.iter().enumerate() {
            builder.add_entry(label as u32, f32_feature(&[*x, *y]));
        }
        builder.build(|_, _| {}, false).unwrap();
        let g = builder.graph();

        let selected: Vec<u32> = (0..points.len() as u32).take(5).collect();
        prop_assume!(selected.len() < 10);
        let filter = Filter::from_labels(&selected);

        let query = f32_feature(&[0.0, 0.0]);
        let entry = g.index_of(0).unwrap();
        let results = search::knn_search(g, &[entry], &query, 0.0, k, Some(&filter), None);

        let space = DistanceSpace::new(Metric::L2F32, 2);
        let mut brute: Vec<(u32, f32)> = selected
            .iter()
            .map(|&label| {
                let idx = g.index_of(label).unwrap();
                (label, space.distance(g.feature(idx), &query))
            })
            .collect();
        brute.sort_by(|a, b| a.1.total_cmp(&b.1));

        let expected_count = k.min(selected.len());
        prop_assert_eq!(results.len(), expected_count);
        let mut result_distances: Vec<f32> = results.iter().map(|r| r.distance).collect();
        result_distances.sort_by(f32::total_cmp);
        let expected_distances: Vec<f32> = brute[..expected_count].iter().map(|(_, dist)| *dist).collect();
        for (a, b) in result_distances.iter().zip(expected_distances.iter()) {
            prop_assert!((a - b).abs() < 1e-3);
        }
    }

    /// S6-style monotonicity: widening the distance-computation budget
    /// never shrinks the result set returned for the same query and k.
    #[test]
    fn budget_monotonicity_never_shrinks_results(points in points_strategy()) {
        let d = 4u8;
        let graph = Graph::new(points.len() + 1, d, Metric::L2F32, 2).unwrap();
        let mut builder = Builder::new(graph, 4, config(d as usize));
        for (label, (x, y)) in points.iter().enumerate() {
            builder.add_entry(label as u32, f32_feature(&[*x, *y]));
        }
        builder.build(|_, _| {}, false).unwrap();
        let g = builder.graph();

        let query = f32_feature(&[0.0, 0.0]);
        let entry = g.index_of(0).unwrap();
        let k = 5.min(g.size());

        let small = search::knn_search(g, &[entry], &query, 1.0, k, None, Some(3));
        let large = search::knn_search(g, &[entry], &query, 1.0, k, None, Some(10_000));
        prop_assert!(large.len() >= small.len());
    }
}
