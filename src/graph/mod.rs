//! Graph data model: namespaced vertex keys, entity types and the store capability.
//!
//! Vertex keys are opaque strings of the form `label$$localId`. Each entity
//! type maps to a root vertex label and an ordered set of traversable edge kinds.

mod closure;

pub use closure::{expand_simple_paths, resolve_accounts};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::{RelmapError, Result};

/// Separator between label and local id inside a vertex key.
pub const VERTEX_ID_SEPARATOR: &str = "$$";

/// Label of the terminal account vertices emitted by closure resolution.
pub const ACCOUNT_LABEL: &str = "aws__account";

const SFID_VERTEX_LABEL: &str = "aws__sfid";
const SFID_EDGES: &[&str] = &["aws__has_sfid"];

const CUST_VERTEX_LABEL: &str = "cwb__aws__customer";
const CUST_EDGES: &[&str] = &["aws__has_sfid", "cwb__aws__has_customer"];

/// Namespaced vertex key (`label$$localId`).
///
/// Keys are constructed from parts or taken verbatim from the store; they are
/// only validated when parsed back into their parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexKey(String);

impl VertexKey {
    /// Build a key from a label and a local id.
    pub fn new(label: &str, local_id: &str) -> Self {
        Self(format!("{}{}{}", label, VERTEX_ID_SEPARATOR, local_id))
    }

    /// Wrap a key exactly as the store returned it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(label, local_id)`.
    ///
    /// Exactly one separator with non-empty text on both sides is accepted;
    /// anything else is a `MalformedVertexKey`.
    pub fn parts(&self) -> Result<(&str, &str)> {
        let mut parts = self.0.split(VERTEX_ID_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(label), Some(local_id), None) if !label.is_empty() && !local_id.is_empty() => {
                Ok((label, local_id))
            }
            _ => Err(RelmapError::MalformedVertexKey(self.0.clone())),
        }
    }

    pub fn label(&self) -> Result<&str> {
        self.parts().map(|(label, _)| label)
    }

    pub fn local_id(&self) -> Result<&str> {
        self.parts().map(|(_, local_id)| local_id)
    }
}

impl fmt::Display for VertexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity types a relation job may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Sfid,
    Customer,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Sfid => "sfid",
            EntityType::Customer => "customer",
        }
    }

    /// Label of the root vertex for this type.
    pub fn vertex_label(&self) -> &'static str {
        match self {
            EntityType::Sfid => SFID_VERTEX_LABEL,
            EntityType::Customer => CUST_VERTEX_LABEL,
        }
    }

    /// Edge kinds traversable (backwards) when resolving this type.
    pub fn edge_filter(&self) -> &'static [&'static str] {
        match self {
            EntityType::Sfid => SFID_EDGES,
            EntityType::Customer => CUST_EDGES,
        }
    }

    pub fn root_key(&self, entity_id: &str) -> VertexKey {
        VertexKey::new(self.vertex_label(), entity_id)
    }
}

impl FromStr for EntityType {
    type Err = RelmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sfid" => Ok(EntityType::Sfid),
            "customer" => Ok(EntityType::Customer),
            other => Err(RelmapError::UnknownEntityType(other.to_string())),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vertex as seen through the store: its key and label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    pub key: VertexKey,
    pub label: String,
}

/// Read-only graph store capability.
///
/// Implementations are shared between all workers behind an `Arc`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fetch a vertex by key.
    async fn vertex(&self, key: &VertexKey) -> Result<Option<Vertex>>;

    /// Sources of the in-edges of `key` whose kind is in `kinds`.
    /// Parallel edges yield one entry each.
    async fn in_neighbors(&self, key: &VertexKey, kinds: &[&str]) -> Result<Vec<Vertex>>;

    /// Repeated backward expansion from `root` along `kinds` over simple paths,
    /// emitting every vertex labelled `target_label` at every depth.
    ///
    /// Remote stores override this to evaluate the traversal in one round trip.
    async fn expand(
        &self,
        root: &VertexKey,
        kinds: &[&str],
        target_label: &str,
    ) -> Result<Vec<VertexKey>> {
        expand_simple_paths(self, root, kinds, target_label).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_key_roundtrip_parts() {
        let key = VertexKey::new(ACCOUNT_LABEL, "123456789012");
        assert_eq!(key.as_str(), "aws__account$$123456789012");
        assert_eq!(key.label().unwrap(), ACCOUNT_LABEL);
        assert_eq!(key.local_id().unwrap(), "123456789012");
    }

    #[test]
    fn test_vertex_key_without_separator_is_malformed() {
        let key = VertexKey::from_raw("aws__account_123");
        let err = key.local_id().unwrap_err();
        assert!(matches!(err, RelmapError::MalformedVertexKey(ref k) if k == "aws__account_123"));
    }

    #[test]
    fn test_vertex_key_with_two_separators_is_malformed() {
        let key = VertexKey::from_raw("aws__account$$a$$b");
        assert!(matches!(key.parts(), Err(RelmapError::MalformedVertexKey(_))));
    }

    #[test]
    fn test_vertex_key_with_empty_part_is_malformed() {
        assert!(VertexKey::from_raw("aws__account$$").parts().is_err());
        assert!(VertexKey::from_raw("$$123").parts().is_err());
    }

    #[test]
    fn test_entity_type_tables() {
        let customer: EntityType = "customer".parse().unwrap();
        assert_eq!(customer, EntityType::Customer);
        assert_eq!(customer.root_key("c_x").as_str(), "cwb__aws__customer$$c_x");
        assert_eq!(customer.edge_filter(), &["aws__has_sfid", "cwb__aws__has_customer"]);

        let sfid: EntityType = "sfid".parse().unwrap();
        assert_eq!(sfid.root_key("sf_1").as_str(), "aws__sfid$$sf_1");
        assert_eq!(sfid.edge_filter(), &["aws__has_sfid"]);
    }

    #[test]
    fn test_entity_type_unknown() {
        let err = "widget".parse::<EntityType>().unwrap_err();
        assert!(matches!(err, RelmapError::UnknownEntityType(ref t) if t == "widget"));
        // Matching is exact, not case-insensitive
        assert!("Customer".parse::<EntityType>().is_err());
    }
}
