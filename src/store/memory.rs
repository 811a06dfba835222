//! In-memory graph store.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::graph::{GraphStore, Vertex, VertexKey};
use crate::Result;

/// Adjacency held in memory, indexed by edge destination.
///
/// Edges whose source vertex was never added are ignored on lookup.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    labels: HashMap<VertexKey, String>,
    in_edges: HashMap<VertexKey, Vec<(String, VertexKey)>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex keyed `label$$local_id` and return its key.
    pub fn add_vertex(&mut self, label: &str, local_id: &str) -> VertexKey {
        let key = VertexKey::new(label, local_id);
        self.labels.insert(key.clone(), label.to_string());
        key
    }

    /// Add a vertex under a key taken verbatim, without validating its shape.
    pub fn add_raw_vertex(&mut self, key: &str, label: &str) -> VertexKey {
        let key = VertexKey::from_raw(key);
        self.labels.insert(key.clone(), label.to_string());
        key
    }

    /// Add a directed edge `src --kind--> dst`.
    pub fn add_edge(&mut self, src: &VertexKey, kind: &str, dst: &VertexKey) {
        self.in_edges
            .entry(dst.clone())
            .or_default()
            .push((kind.to_string(), src.clone()));
    }

    pub fn vertex_count(&self) -> usize {
        self.labels.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn vertex(&self, key: &VertexKey) -> Result<Option<Vertex>> {
        Ok(self.labels.get(key).map(|label| Vertex {
            key: key.clone(),
            label: label.clone(),
        }))
    }

    async fn in_neighbors(&self, key: &VertexKey, kinds: &[&str]) -> Result<Vec<Vertex>> {
        let Some(edges) = self.in_edges.get(key) else {
            return Ok(Vec::new());
        };

        Ok(edges
            .iter()
            .filter(|(kind, _)| kinds.contains(&kind.as_str()))
            .filter_map(|(_, src)| {
                self.labels.get(src).map(|label| Vertex {
                    key: src.clone(),
                    label: label.clone(),
                })
            })
            .collect())
    }
}
