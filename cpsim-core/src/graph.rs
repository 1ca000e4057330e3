//! Per-pattern graph view.
//!
//! One node per function, one directed edge per (msgType, methodCode)
//! connection. Cross-pattern edges keep the destination pattern name and live
//! beside the graph since their target node belongs to another pattern.

use crate::error::VerifyError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use std::collections::HashMap;

/// Edge payload for an internal connection.
#[derive(Clone, Debug, PartialEq)]
pub struct PtnEdge {
    pub msg_type: String,
    pub method_code: String,
}

/// A cross-pattern connection out of this graph.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtPtnEdge {
    pub src_label: String,
    pub msg_type: String,
    pub dst_cp: String,
    pub dst_label: String,
    pub method_code: String,
}

pub struct CmpPtnGraph {
    graph: DiGraph<String, PtnEdge>,
    nodes: HashMap<String, NodeIndex>,
    ext_edges: Vec<ExtPtnEdge>,
}

impl CmpPtnGraph {
    pub fn new(labels: impl IntoIterator<Item = String>) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for label in labels {
            let idx = graph.add_node(label.clone());
            nodes.insert(label, idx);
        }
        Self {
            graph,
            nodes,
            ext_edges: Vec::new(),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    /// Add an internal edge. Exact duplicates are dropped; unknown labels are
    /// rejected. Returns whether the edge was newly added.
    pub fn add_edge(
        &mut self,
        src: &str,
        msg_type: &str,
        dst: &str,
        method_code: &str,
    ) -> Result<bool, VerifyError> {
        let src_idx = *self
            .nodes
            .get(src)
            .ok_or_else(|| VerifyError::on(src, "edge references undeclared source label"))?;
        let dst_idx = *self
            .nodes
            .get(dst)
            .ok_or_else(|| VerifyError::on(dst, "edge references undeclared destination label"))?;

        let duplicate = self.graph.edges_connecting(src_idx, dst_idx).any(|e| {
            e.weight().msg_type == msg_type && e.weight().method_code == method_code
        });
        if duplicate {
            return Ok(false);
        }
        self.graph.add_edge(
            src_idx,
            dst_idx,
            PtnEdge {
                msg_type: msg_type.to_string(),
                method_code: method_code.to_string(),
            },
        );
        Ok(true)
    }

    /// Add a cross-pattern edge out of `src`. The destination is validated
    /// against the other pattern during model verification.
    pub fn add_ext_edge(
        &mut self,
        src: &str,
        msg_type: &str,
        dst_cp: &str,
        dst_label: &str,
        method_code: &str,
    ) -> Result<bool, VerifyError> {
        if !self.nodes.contains_key(src) {
            return Err(VerifyError::on(
                src,
                "external edge references undeclared source label",
            ));
        }
        let edge = ExtPtnEdge {
            src_label: src.to_string(),
            msg_type: msg_type.to_string(),
            dst_cp: dst_cp.to_string(),
            dst_label: dst_label.to_string(),
            method_code: method_code.to_string(),
        };
        if self.ext_edges.contains(&edge) {
            return Ok(false);
        }
        self.ext_edges.push(edge);
        Ok(true)
    }

    /// Internal edges leaving `label` as (dstLabel, msgType, methodCode).
    pub fn out_edges(&self, label: &str) -> Vec<(String, String, String)> {
        let Some(&idx) = self.nodes.get(label) else {
            return Vec::new();
        };
        self.graph
            .edges(idx)
            .map(|e| {
                (
                    self.graph[e.target()].clone(),
                    e.weight().msg_type.clone(),
                    e.weight().method_code.clone(),
                )
            })
            .collect()
    }

    /// Internal edges arriving at `label` as (srcLabel, msgType, methodCode).
    pub fn in_edges(&self, label: &str) -> Vec<(String, String, String)> {
        let Some(&idx) = self.nodes.get(label) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .map(|e| {
                (
                    self.graph[e.source()].clone(),
                    e.weight().msg_type.clone(),
                    e.weight().method_code.clone(),
                )
            })
            .collect()
    }

    pub fn ext_edges(&self) -> &[ExtPtnEdge] {
        &self.ext_edges
    }

    /// Labels not reachable from any of `roots` along internal edges.
    /// Functions fed only by external edges should be passed as roots too.
    pub fn unreachable_from(&self, roots: &[String]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        for root in roots {
            if let Some(&idx) = self.nodes.get(root) {
                let mut dfs = Dfs::new(&self.graph, idx);
                while let Some(nx) = dfs.next(&self.graph) {
                    seen.insert(nx);
                }
            }
        }
        let mut missing: Vec<String> = self
            .graph
            .node_indices()
            .filter(|idx| !seen.contains(idx))
            .map(|idx| self.graph[idx].clone())
            .collect();
        missing.sort();
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut g = CmpPtnGraph::new(labels(&["a", "b"]));
        assert!(g.add_edge("a", "ping", "b", "default").unwrap());
        assert!(!g.add_edge("a", "ping", "b", "default").unwrap());
        assert_eq!(g.out_edges("a").len(), 1);
    }

    #[test]
    fn unknown_label_rejected() {
        let mut g = CmpPtnGraph::new(labels(&["a"]));
        assert!(g.add_edge("a", "ping", "ghost", "default").is_err());
        assert!(g.add_edge("ghost", "ping", "a", "default").is_err());
    }

    #[test]
    fn reachability_flags_orphans() {
        let mut g = CmpPtnGraph::new(labels(&["a", "b", "orphan"]));
        g.add_edge("a", "ping", "b", "default").unwrap();
        let missing = g.unreachable_from(&["a".to_string()]);
        assert_eq!(missing, vec!["orphan".to_string()]);
    }

    #[test]
    fn ext_edges_kept_beside_graph() {
        let mut g = CmpPtnGraph::new(labels(&["a"]));
        assert!(g.add_ext_edge("a", "q", "other", "svc", "default").unwrap());
        assert!(!g.add_ext_edge("a", "q", "other", "svc", "default").unwrap());
        assert_eq!(g.ext_edges().len(), 1);
    }
}
