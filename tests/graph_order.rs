use std::collections::BTreeSet;

use gatework::graph::DirectedGraph;
use proptest::prelude::*;

fn graph_of(vertices: u32, edges: &[(u32, u32)]) -> DirectedGraph<u32> {
    let mut graph = DirectedGraph::new();
    for v in 0..vertices {
        graph.add_vertex(v);
    }
    for &(v, w) in edges {
        graph.add_edge(v, w).unwrap();
    }
    graph
}

fn position(order: &[u32], v: u32) -> usize {
    order.iter().position(|&x| x == v).unwrap()
}

#[test]
fn acyclic_graph_orders_without_cuts() {
    let edges = [(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)];
    let graph = graph_of(5, &edges);
    let order = graph.get_order(&0);
    assert!(order.cut_edges.is_empty());
    for (v, w) in edges {
        assert!(position(&order.order, v) < position(&order.order, w));
    }
}

#[test]
fn simple_cycle_costs_one_cut_at_its_entry() {
    // 1 -> 2 -> 3 -> 1 is entered from 0 at 1.
    let graph = graph_of(5, &[(0, 1), (1, 2), (2, 3), (3, 1), (3, 4)]);
    let order = graph.get_order(&0);
    assert_eq!(order.cut_edges, BTreeSet::from([(3, 1)]));
    assert_eq!(order.order, vec![0, 1, 2, 3, 4]);
}

#[test]
fn disjoint_cycles_are_cut_once_each() {
    let graph = graph_of(5, &[(0, 1), (1, 2), (2, 1), (0, 3), (3, 4), (4, 3)]);
    let order = graph.get_order(&0);
    assert_eq!(order.cut_edges, BTreeSet::from([(2, 1), (4, 3)]));
}

#[test]
fn self_loop_is_cut() {
    let graph = graph_of(2, &[(0, 1), (1, 1)]);
    let order = graph.get_order(&0);
    assert_eq!(order.cut_edges, BTreeSet::from([(1, 1)]));
    assert_eq!(order.order, vec![0, 1]);
}

#[test]
fn unreachable_cycle_is_still_ordered() {
    let graph = graph_of(4, &[(0, 1), (2, 3), (3, 2)]);
    let order = graph.get_order(&0);
    assert_eq!(order.order.len(), 4);
    assert_eq!(order.cut_edges.len(), 1);
}

proptest! {
    #[test]
    fn forward_only_graphs_never_need_cuts(
        raw in prop::collection::vec((0u32..12, 0u32..12), 0..40),
    ) {
        let edges: Vec<(u32, u32)> = raw
            .into_iter()
            .filter(|(v, w)| v != w)
            .map(|(v, w)| (v.min(w), v.max(w)))
            .collect();
        let graph = graph_of(12, &edges);
        let order = graph.get_order(&0);
        prop_assert!(order.cut_edges.is_empty());
        prop_assert_eq!(order.order.len(), 12);
        for (v, w) in edges {
            prop_assert!(position(&order.order, v) < position(&order.order, w));
        }
    }

    #[test]
    fn ordering_is_deterministic(
        raw in prop::collection::vec((0u32..10, 0u32..10), 0..30),
    ) {
        let graph = graph_of(10, &raw);
        prop_assert_eq!(graph.get_order(&0), graph.get_order(&0));
    }
}
