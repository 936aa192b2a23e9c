//! Transform record bookkeeping: the dependency graph over derived columns
//! within one table, and the queries the pipeline needs against it.

use crate::errors::DolexError;
use crate::types::Layer;
use indexmap::IndexMap;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

/// One derived (or working-layer) column: its defining expression, the
/// columns it reads, and where it lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRecord {
    pub column: String,
    pub expr: String,
    pub layer: Layer,
    pub depends_on: Vec<String>,
    pub partition_by: Option<String>,
}

/// Dependency graph over the derived columns of a single table, keyed by
/// column name. Source (non-derived) columns participate as graph nodes with
/// no incoming edges but are never themselves `TransformRecord`s.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index_of: IndexMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index_of.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index_of.insert(name.to_string(), idx);
        idx
    }

    /// Register `column` as depending on each of `depends_on`. Source columns
    /// referenced here become leaf nodes automatically.
    pub fn insert(&mut self, column: &str, depends_on: &[String]) {
        let to = self.node(column);
        for dep in depends_on {
            let from = self.node(dep);
            self.graph.add_edge(from, to, ());
        }
    }

    /// Remove a column and every edge touching it.
    pub fn remove(&mut self, column: &str) {
        if let Some(idx) = self.index_of.shift_remove(column) {
            self.graph.remove_node(idx);
            // `remove_node` swaps the last node into the freed slot; re-sync indices.
            self.index_of.clear();
            for idx in self.graph.node_indices() {
                let name = self.graph[idx].clone();
                self.index_of.insert(name, idx);
            }
        }
    }

    /// Would adding an edge `depends_on -> column` close a cycle? Used before
    /// committing a new transform so the caller can reject it with the
    /// offending cycle path.
    pub fn would_cycle(&self, column: &str, depends_on: &[String]) -> Option<Vec<String>> {
        let mut probe = self.graph.clone();
        let mut probe_index = self.index_of.clone();
        let mut node_of = |probe: &mut DiGraph<String, ()>, idx_map: &mut IndexMap<String, NodeIndex>, name: &str| {
            if let Some(idx) = idx_map.get(name) {
                return *idx;
            }
            let idx = probe.add_node(name.to_string());
            idx_map.insert(name.to_string(), idx);
            idx
        };
        let to = node_of(&mut probe, &mut probe_index, column);
        for dep in depends_on {
            let from = node_of(&mut probe, &mut probe_index, dep);
            probe.add_edge(from, to, ());
        }

        if !is_cyclic_directed(&probe) {
            return None;
        }

        // Reconstruct a human-readable cycle path via DFS from `column`.
        find_cycle_path(&probe, to)
    }

    /// Every column, topologically ordered (dependencies before dependents).
    /// Ties among independent columns keep graph insertion order.
    pub fn topological_order(&self) -> Result<Vec<String>, DolexError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|idx| self.graph[idx].clone()).collect())
            .map_err(|cycle| {
                let name = self.graph[cycle.node_id()].clone();
                DolexError::CircularDependency { cycle: vec![name.clone(), name] }
            })
    }

    /// Columns that transitively depend on `column` (excluding itself),
    /// topologically ordered — used to decide what a drop or overwrite
    /// invalidates.
    pub fn find_dependents(&self, column: &str) -> Vec<String> {
        let Some(&start) = self.index_of.get(column) else { return Vec::new() };
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for neighbor in self.graph.neighbors_directed(node, petgraph::Direction::Outgoing) {
                if visited.insert(neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        let order = toposort(&self.graph, None).unwrap_or_default();
        order
            .into_iter()
            .filter(|idx| visited.contains(idx))
            .map(|idx| self.graph[idx].clone())
            .collect()
    }
}

fn find_cycle_path(graph: &DiGraph<String, ()>, start: NodeIndex) -> Option<Vec<String>> {
    let mut path = Vec::new();
    let mut on_stack = std::collections::HashSet::new();
    let mut visited = std::collections::HashSet::new();

    fn dfs(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        path: &mut Vec<NodeIndex>,
        on_stack: &mut std::collections::HashSet<NodeIndex>,
        visited: &mut std::collections::HashSet<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        path.push(node);
        on_stack.insert(node);
        visited.insert(node);
        for neighbor in graph.neighbors_directed(node, petgraph::Direction::Outgoing) {
            if on_stack.contains(&neighbor) {
                let start_pos = path.iter().position(|&n| n == neighbor).unwrap();
                let mut cycle = path[start_pos..].to_vec();
                cycle.push(neighbor);
                return Some(cycle);
            }
            if !visited.contains(&neighbor) {
                if let Some(cycle) = dfs(graph, neighbor, path, on_stack, visited) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        on_stack.remove(&node);
        None
    }

    let cycle = dfs(graph, start, &mut path, &mut on_stack, &mut visited)?;
    Some(cycle.into_iter().map(|idx| graph[idx].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topological_order_respects_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.insert("b", &["a".to_string()]);
        graph.insert("c", &["b".to_string()]);
        let order = graph.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|c| c == name).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn would_cycle_detects_direct_self_reference() {
        let mut graph = DependencyGraph::new();
        graph.insert("a", &["source".to_string()]);
        let cycle = graph.would_cycle("source", &["a".to_string()]);
        assert!(cycle.is_some());
    }

    #[test]
    fn would_cycle_none_for_acyclic_addition() {
        let mut graph = DependencyGraph::new();
        graph.insert("b", &["a".to_string()]);
        assert!(graph.would_cycle("c", &["b".to_string()]).is_none());
    }

    #[test]
    fn find_dependents_includes_transitive_chain() {
        let mut graph = DependencyGraph::new();
        graph.insert("b", &["a".to_string()]);
        graph.insert("c", &["b".to_string()]);
        graph.insert("d", &["x".to_string()]);
        let dependents = graph.find_dependents("a");
        assert_eq!(dependents, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn remove_drops_column_and_its_edges() {
        let mut graph = DependencyGraph::new();
        graph.insert("b", &["a".to_string()]);
        graph.remove("b");
        assert!(graph.find_dependents("a").is_empty());
    }
}
