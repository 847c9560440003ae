//! Graph module: adjacency-set directed graphs with cycle-aware ordering.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use crate::invariant_ppt::{assert_invariant, GRAPH_LEGALITY, ORDER_SOUNDNESS};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An edge endpoint is not a vertex of the graph.
    #[error("vertex is not in the graph")]
    MissingVertex,
    /// A strict topological order was requested from a cyclic graph.
    #[error("graph contains a cycle")]
    CycleDetected,
}

/// A linear evaluation order plus the edges that had to be cut to obtain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order<V: Ord> {
    /// Every vertex exactly once.
    pub order: Vec<V>,
    /// Edges `(from, to)` whose source is read from the previous step.
    pub cut_edges: BTreeSet<(V, V)>,
}

/// A directed graph stored as forward and backward adjacency sets.
///
/// Vertices are opaque ordered identifiers. Ordered sets keep every traversal
/// deterministic, which in turn makes [`DirectedGraph::get_order`] pick the
/// same cut edges for the same graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectedGraph<V: Ord> {
    successors: BTreeMap<V, BTreeSet<V>>,
    predecessors: BTreeMap<V, BTreeSet<V>>,
}

impl<V: Ord + Clone> DirectedGraph<V> {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
        }
    }

    /// Add a vertex if it is not already present.
    pub fn add_vertex(&mut self, v: V) {
        if !self.successors.contains_key(&v) {
            self.successors.insert(v.clone(), BTreeSet::new());
            self.predecessors.insert(v, BTreeSet::new());
        }
    }

    /// Remove a vertex together with every incident edge.
    pub fn remove_vertex(&mut self, v: &V) -> bool {
        let Some(outgoing) = self.successors.remove(v) else {
            return false;
        };
        let incoming = self.predecessors.remove(v).unwrap_or_default();
        for w in &outgoing {
            if let Some(preds) = self.predecessors.get_mut(w) {
                preds.remove(v);
            }
        }
        for w in &incoming {
            if let Some(succs) = self.successors.get_mut(w) {
                succs.remove(v);
            }
        }
        true
    }

    /// Whether `v` is a vertex.
    pub fn contains_vertex(&self, v: &V) -> bool {
        self.successors.contains_key(v)
    }

    /// All vertices in order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.successors.keys()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.successors.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.successors.values().map(BTreeSet::len).sum()
    }

    /// Add an edge from `v` to `w`. Both endpoints must already exist.
    pub fn add_edge(&mut self, v: V, w: V) -> Result<(), GraphError> {
        if !self.contains_vertex(&v) || !self.contains_vertex(&w) {
            return Err(GraphError::MissingVertex);
        }
        if let Some(succs) = self.successors.get_mut(&v) {
            succs.insert(w.clone());
        }
        if let Some(preds) = self.predecessors.get_mut(&w) {
            preds.insert(v.clone());
        }

        assert_invariant(
            GRAPH_LEGALITY,
            self.has_edge(&v, &w),
            "Edge recorded in both adjacency maps",
            Some("add_edge"),
        );
        Ok(())
    }

    /// Remove the edge from `v` to `w` if it exists.
    pub fn remove_edge(&mut self, v: &V, w: &V) -> bool {
        let removed = self
            .successors
            .get_mut(v)
            .map(|succs| succs.remove(w))
            .unwrap_or(false);
        if let Some(preds) = self.predecessors.get_mut(w) {
            preds.remove(v);
        }
        removed
    }

    /// Whether the edge `v -> w` exists.
    pub fn has_edge(&self, v: &V, w: &V) -> bool {
        self.successors
            .get(v)
            .map(|succs| succs.contains(w))
            .unwrap_or(false)
    }

    /// Vertices with an edge from `v`.
    pub fn direct_successors<'a>(&'a self, v: &V) -> impl Iterator<Item = &'a V> + 'a {
        self.successors.get(v).into_iter().flatten()
    }

    /// Vertices with an edge into `v`.
    pub fn direct_predecessors<'a>(&'a self, v: &V) -> impl Iterator<Item = &'a V> + 'a {
        self.predecessors.get(v).into_iter().flatten()
    }

    /// Every vertex reachable from `v`, excluding `v` itself.
    pub fn all_successors(&self, v: &V) -> BTreeSet<V> {
        Self::reach(&self.successors, v)
    }

    /// Every vertex that can reach `v`, excluding `v` itself.
    pub fn all_predecessors(&self, v: &V) -> BTreeSet<V> {
        Self::reach(&self.predecessors, v)
    }

    fn reach(adjacency: &BTreeMap<V, BTreeSet<V>>, start: &V) -> BTreeSet<V> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(start.clone());
        queue.push_back(start.clone());
        while let Some(v) = queue.pop_front() {
            for w in adjacency.get(&v).into_iter().flatten() {
                if seen.insert(w.clone()) {
                    queue.push_back(w.clone());
                }
            }
        }
        seen.remove(start);
        seen
    }

    /// Whether `to` is reachable from `from` (a vertex always reaches itself).
    pub fn reaches(&self, from: &V, to: &V) -> bool {
        if from == to {
            return self.contains_vertex(from);
        }
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(x) = stack.pop() {
            if x == to {
                return true;
            }
            if seen.insert(x) {
                stack.extend(self.direct_successors(x));
            }
        }
        false
    }

    /// Whether an edge `v -> w` is, or would be, part of a cycle.
    pub fn check_edge(&self, v: &V, w: &V) -> bool {
        self.reaches(w, v)
    }

    /// BFS distances from `source`. Unreachable vertices are absent.
    pub fn shortest_paths(&self, source: &V) -> BTreeMap<V, usize> {
        let mut lengths = BTreeMap::new();
        if !self.contains_vertex(source) {
            return lengths;
        }
        let mut queue = VecDeque::new();
        lengths.insert(source.clone(), 0);
        queue.push_back(source.clone());
        while let Some(v) = queue.pop_front() {
            let next = lengths[&v] + 1;
            for w in self.direct_successors(&v) {
                if !lengths.contains_key(w) {
                    lengths.insert(w.clone(), next);
                    queue.push_back(w.clone());
                }
            }
        }
        lengths
    }

    /// Tarjan's strongly connected components, in topological order of the
    /// condensed graph. Members of each component are sorted.
    pub fn strongly_connected_components(&self) -> Vec<Vec<V>> {
        const UNVISITED: usize = usize::MAX;

        let vertices: Vec<&V> = self.successors.keys().collect();
        let position: BTreeMap<&V, usize> =
            vertices.iter().enumerate().map(|(i, v)| (*v, i)).collect();
        let adjacency: Vec<Vec<usize>> = vertices
            .iter()
            .map(|v| self.direct_successors(v).map(|w| position[w]).collect())
            .collect();

        let n = vertices.len();
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0; n];
        let mut on_stack = vec![false; n];
        let mut stack = Vec::new();
        let mut next_index = 0;
        let mut components = Vec::new();

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            // Explicit call stack of (vertex, next child to visit)
            let mut calls = vec![(root, 0usize)];
            index[root] = next_index;
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;

            while let Some(frame) = calls.last_mut() {
                let v = frame.0;
                if frame.1 < adjacency[v].len() {
                    let w = adjacency[v][frame.1];
                    frame.1 += 1;
                    if index[w] == UNVISITED {
                        index[w] = next_index;
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        calls.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                    continue;
                }

                calls.pop();
                if let Some(&(parent, _)) = calls.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    component.sort_unstable();
                    components.push(component.into_iter().map(|i| vertices[i].clone()).collect());
                }
            }
        }

        components.reverse();
        components
    }

    /// Order every vertex so that, ignoring the returned cut edges, each
    /// vertex comes after all of its predecessors.
    ///
    /// Each multi-vertex component is entered at the member closest to
    /// `source`; the edges into that entry are cut and the rest of the
    /// component is ordered recursively. Self-loops are always cut.
    pub fn get_order(&self, source: &V) -> Order<V> {
        let distances = self.shortest_paths(source);
        let mut order = Vec::with_capacity(self.vertex_count());
        let mut cut_edges = BTreeSet::new();

        for component in self.strongly_connected_components() {
            if let [v] = component.as_slice() {
                if self.has_edge(v, v) {
                    cut_edges.insert((v.clone(), v.clone()));
                }
                order.push(v.clone());
                continue;
            }

            let Some(entry) = component
                .iter()
                .min_by_key(|v| distances.get(*v).copied().unwrap_or(usize::MAX))
                .cloned()
            else {
                continue;
            };
            let members: BTreeSet<&V> = component.iter().collect();

            let mut inner = DirectedGraph::new();
            for v in &component {
                inner.add_vertex(v.clone());
            }
            for w in &component {
                for v in self.direct_predecessors(w) {
                    if !members.contains(v) {
                        continue;
                    }
                    if *w == entry {
                        cut_edges.insert((v.clone(), w.clone()));
                    } else {
                        inner.link(v.clone(), w.clone());
                    }
                }
            }

            let nested = inner.get_order(&entry);
            order.extend(nested.order);
            cut_edges.extend(nested.cut_edges);
        }

        assert_invariant(
            ORDER_SOUNDNESS,
            order.len() == self.vertex_count(),
            "Order covers every vertex exactly once",
            Some("get_order"),
        );
        Order { order, cut_edges }
    }

    /// Strict topological order; fails if any cycle exists.
    pub fn topological_order(&self) -> Result<Vec<V>, GraphError> {
        let mut order = Vec::with_capacity(self.vertex_count());
        for component in self.strongly_connected_components() {
            match component.as_slice() {
                [v] if !self.has_edge(v, v) => order.push(v.clone()),
                _ => return Err(GraphError::CycleDetected),
            }
        }
        Ok(order)
    }

    /// Rename a vertex, keeping its edges (self-loops included).
    pub fn relabel_vertex(&mut self, old: &V, new: V) -> Result<(), GraphError> {
        if !self.contains_vertex(old) {
            return Err(GraphError::MissingVertex);
        }
        let self_loop = self.has_edge(old, old);
        let outgoing: Vec<V> = self.direct_successors(old).filter(|w| *w != old).cloned().collect();
        let incoming: Vec<V> = self.direct_predecessors(old).filter(|w| *w != old).cloned().collect();
        self.remove_vertex(old);
        self.add_vertex(new.clone());
        for w in outgoing {
            self.link(new.clone(), w);
        }
        for w in incoming {
            self.link(w, new.clone());
        }
        if self_loop {
            self.link(new.clone(), new);
        }
        Ok(())
    }

    /// Forward adjacency, suitable for persistence.
    pub fn adjacency(&self) -> BTreeMap<V, Vec<V>> {
        self.successors
            .iter()
            .map(|(v, ws)| (v.clone(), ws.iter().cloned().collect()))
            .collect()
    }

    // Both endpoints are known to exist.
    fn link(&mut self, v: V, w: V) {
        self.successors.entry(v.clone()).or_default().insert(w.clone());
        self.predecessors.entry(w).or_default().insert(v);
    }
}

impl<V: Ord + Clone> Default for DirectedGraph<V> {
    fn default() -> Self {
        Self::new()
    }
}
