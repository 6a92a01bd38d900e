//! Topology utilities shared by the capture optimizers.

use std::collections::VecDeque;

use fixedbitset::FixedBitSet;
use itertools::Itertools;

use crate::error::{CaptureError, Result};
use crate::graph::{CaptureGraph, NodeIndex};

/// Reverse-postorder topological sort.
///
/// Iterative DFS with a two-pass visit-then-emit discipline: a node is pushed
/// once to discover it and again to emit it after its subtree. Every
/// predecessor precedes its successors in the output. Deterministic for a
/// given node and successor enumeration order.
pub fn toposort<S>(graph: &CaptureGraph<S>) -> Vec<NodeIndex> {
    let bound = graph.node_bound();
    let mut visited = FixedBitSet::with_capacity(bound);
    let mut emitted = FixedBitSet::with_capacity(bound);
    let mut order = Vec::with_capacity(graph.node_count());
    let mut dfs: Vec<NodeIndex> = Vec::new();

    for root in graph.node_indices() {
        if !visited.contains(root.index()) {
            dfs.push(root);
        }

        while let Some(u) = dfs.pop() {
            if visited.contains(u.index()) {
                // Second pop: the subtree below u is done. A node can sit on
                // the stack twice when two ancestors discover it, so guard
                // against emitting it again.
                if !emitted.contains(u.index()) {
                    emitted.insert(u.index());
                    order.push(u);
                }
                continue;
            }

            visited.insert(u.index());
            dfs.push(u);
            for s in graph.successors(u) {
                if !visited.contains(s.index()) {
                    dfs.push(s);
                }
            }
        }
    }

    order.reverse();

    #[cfg(debug_assertions)]
    assert_topological(graph, &order);

    order
}

/// Cycle detection is best-effort and debug-only; well-formed inputs are
/// acyclic by contract.
#[cfg(debug_assertions)]
fn assert_topological<S>(graph: &CaptureGraph<S>, order: &[NodeIndex]) {
    let mut position = vec![usize::MAX; graph.node_bound()];
    for (i, n) in order.iter().enumerate() {
        position[n.index()] = i;
    }
    for u in graph.node_indices() {
        for v in graph.successors(u) {
            debug_assert!(
                position[u.index()] < position[v.index()],
                "capture graph contains a cycle through '{}'",
                graph.name(u),
            );
        }
    }
}

/// Longest-path levelization.
///
/// Assigns every node its distance from the root set measured along the
/// longest path, buckets nodes by level in enumeration order, and writes
/// `level`/`idx` metadata. For every edge (u, v), `level(v) >= level(u) + 1`
/// holds with equality against the deepest predecessor.
///
/// All capture metadata is reset before the walk, so nothing leaks between
/// optimize calls.
pub fn levelize<S>(graph: &mut CaptureGraph<S>) -> Result<Vec<Vec<NodeIndex>>> {
    graph.reset_meta();
    if graph.is_empty() {
        return Ok(Vec::new());
    }

    let bound = graph.node_bound();
    let mut indegree = vec![0usize; bound];
    for u in graph.node_indices() {
        for v in graph.successors(u) {
            indegree[v.index()] += 1;
        }
    }

    // Roots (no dependents) seed the queue at level 0.
    let mut bfs: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|n| indegree[n.index()] == 0)
        .collect();

    let mut max_level = 0;
    let mut placed = 0;
    while let Some(u) = bfs.pop_front() {
        placed += 1;
        let next = graph.meta(u).level + 1;
        max_level = max_level.max(graph.meta(u).level);

        for v in graph.successors(u).collect_vec() {
            let mv = graph.meta_mut(v);
            // A node is enqueued only once all predecessors settled, so the
            // max here is the longest-path distance.
            if next > mv.level {
                mv.level = next;
            }
            indegree[v.index()] -= 1;
            if indegree[v.index()] == 0 {
                bfs.push_back(v);
            }
        }
    }

    if placed != graph.node_count() {
        return Err(CaptureError::Cycle);
    }

    let mut levels: Vec<Vec<NodeIndex>> = vec![Vec::new(); max_level + 1];
    for n in graph.node_indices().collect_vec() {
        let level = graph.meta(n).level;
        let idx = levels[level].len();
        graph.meta_mut(n).idx = idx;
        levels[level].push(n);
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceStream;

    fn node(graph: &mut CaptureGraph<TraceStream>, name: &str) -> NodeIndex {
        graph.add_node(name, |_| Ok(()))
    }

    #[test]
    fn toposort_chain() {
        let mut g = CaptureGraph::new();
        let a = node(&mut g, "a");
        let b = node(&mut g, "b");
        let c = node(&mut g, "c");
        g.add_edge(a, b);
        g.add_edge(b, c);
        assert_eq!(toposort(&g), vec![a, b, c]);
    }

    #[test]
    fn toposort_emits_each_node_once() {
        // p -> {x, y}, y -> q, q -> x: q discovers x while an earlier push of
        // x is still on the DFS stack.
        let mut g = CaptureGraph::new();
        let p = node(&mut g, "p");
        let x = node(&mut g, "x");
        let y = node(&mut g, "y");
        let q = node(&mut g, "q");
        g.add_edge(p, x);
        g.add_edge(p, y);
        g.add_edge(y, q);
        g.add_edge(q, x);

        let order = toposort(&g);
        assert_eq!(order.len(), 4);
        let pos = |n: NodeIndex| order.iter().position(|&m| m == n).unwrap();
        assert!(pos(p) < pos(x));
        assert!(pos(p) < pos(y));
        assert!(pos(y) < pos(q));
        assert!(pos(q) < pos(x));
    }

    #[test]
    fn levelize_uses_longest_path() {
        // Enumeration order b, a, c with a -> b -> c: a first-path BFS from b
        // would give c level 1; the longest path demands 2.
        let mut g = CaptureGraph::new();
        let b = node(&mut g, "b");
        let a = node(&mut g, "a");
        let c = node(&mut g, "c");
        g.add_edge(a, b);
        g.add_edge(b, c);

        let levels = levelize(&mut g).unwrap();
        assert_eq!(levels, vec![vec![a], vec![b], vec![c]]);
        assert_eq!(g.meta(a).level, 0);
        assert_eq!(g.meta(b).level, 1);
        assert_eq!(g.meta(c).level, 2);
    }

    #[test]
    fn levelize_assigns_in_level_positions_in_enumeration_order() {
        let mut g = CaptureGraph::new();
        let a = node(&mut g, "a");
        let b = node(&mut g, "b");
        let c = node(&mut g, "c");
        let d = node(&mut g, "d");
        g.add_edge(a, b);
        g.add_edge(a, c);
        g.add_edge(b, d);
        g.add_edge(c, d);

        let levels = levelize(&mut g).unwrap();
        assert_eq!(levels, vec![vec![a], vec![b, c], vec![d]]);
        assert_eq!(g.meta(b).idx, 0);
        assert_eq!(g.meta(c).idx, 1);
        assert_eq!(g.meta(d).idx, 0);
    }

    #[test]
    fn levelize_rejects_cycles() {
        let mut g = CaptureGraph::new();
        let a = node(&mut g, "a");
        let b = node(&mut g, "b");
        g.add_edge(a, b);
        g.add_edge(b, a);
        assert!(matches!(levelize(&mut g), Err(CaptureError::Cycle)));
    }

    #[test]
    fn levelize_empty_graph() {
        let mut g: CaptureGraph<TraceStream> = CaptureGraph::new();
        assert!(levelize(&mut g).unwrap().is_empty());
    }

    #[test]
    fn levelize_resets_stale_metadata() {
        let mut g = CaptureGraph::new();
        let a = node(&mut g, "a");
        let b = node(&mut g, "b");
        g.add_edge(a, b);

        levelize(&mut g).unwrap();
        g.meta_mut(a).event = Some(7);
        levelize(&mut g).unwrap();
        assert_eq!(g.meta(a).event, None);
    }
}
