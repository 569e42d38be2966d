//! Knowledge graph payload handed to the external renderer.
//!
//! The backend returns `{nodes, links}`. Older endpoints label nodes with
//! `name`, newer ones with `label`; both are accepted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One entity or note in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(alias = "name", default)]
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Relative size hint for the renderer.
    #[serde(default = "default_node_val")]
    pub val: f64,
}

fn default_node_val() -> f64 {
    1.0
}

/// A directed, labelled relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Finished node/edge list for the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub links: Vec<GraphLink>,
}

impl KnowledgeGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Collapse duplicate node ids (first occurrence wins) and drop links whose
    /// source or target is not a known node.
    ///
    /// Returns the number of links dropped.
    pub fn normalize(&mut self) -> usize {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        self.nodes.retain(|node| seen.insert(node.id.clone()));

        let before = self.links.len();
        self.links
            .retain(|link| seen.contains(&link.source) && seen.contains(&link.target));
        before - self.links.len()
    }

    /// Number of links touching the node with the given id.
    pub fn degree(&self, id: &str) -> usize {
        self.links
            .iter()
            .filter(|l| l.source == id || l.target == id)
            .count()
    }
}
