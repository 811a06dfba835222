//! Graph store implementations and endpoint selection.

mod gremlin;
mod memory;
mod sqlite;

pub use gremlin::GremlinHttpStore;
pub use memory::MemoryGraph;
pub use sqlite::{parse_snapshot_row, ImportStats, SnapshotRow, SqliteGraph};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::graph::GraphStore;
use crate::{RelmapError, Result};

/// Default Gremlin port used when the endpoint names only a host.
pub const DEFAULT_GREMLIN_PORT: u16 = 8182;

/// Where the graph lives, parsed from the endpoint argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEndpoint {
    /// `sqlite:<path>`
    Sqlite(PathBuf),
    /// `memory:` (an empty graph, mostly for dry runs)
    Memory,
    /// `http(s)://...` or a bare `host[:port]`
    Gremlin(Url),
}

impl StoreEndpoint {
    /// Parse an endpoint string.
    ///
    /// A bare host becomes `https://<host>:8182/gremlin`; an explicit URL is
    /// used as given.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(RelmapError::Config("Graph store endpoint is empty".to_string()));
        }

        if let Some(path) = endpoint.strip_prefix("sqlite:") {
            if path.is_empty() {
                return Err(RelmapError::Config("sqlite: endpoint needs a path".to_string()));
            }
            return Ok(StoreEndpoint::Sqlite(PathBuf::from(path)));
        }

        if endpoint == "memory:" {
            return Ok(StoreEndpoint::Memory);
        }

        let raw = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.contains("://") {
            return Err(RelmapError::Config(format!(
                "Unsupported graph store scheme: {}",
                endpoint
            )));
        } else if endpoint.contains(':') {
            format!("https://{}/gremlin", endpoint)
        } else {
            format!("https://{}:{}/gremlin", endpoint, DEFAULT_GREMLIN_PORT)
        };

        let url = Url::parse(&raw)
            .map_err(|e| RelmapError::Config(format!("Invalid graph store endpoint {}: {}", endpoint, e)))?;
        Ok(StoreEndpoint::Gremlin(url))
    }
}

/// Open the store behind `endpoint`, failing fast if it is unreachable.
pub async fn connect(endpoint: &StoreEndpoint, query_timeout: Duration) -> Result<Arc<dyn GraphStore>> {
    match endpoint {
        StoreEndpoint::Sqlite(path) => {
            if !path.exists() {
                return Err(RelmapError::Config(format!(
                    "SQLite graph store not found: {}",
                    path.display()
                )));
            }
            Ok(Arc::new(SqliteGraph::open(path).await?))
        }
        StoreEndpoint::Memory => {
            log::warn!("Using an empty in-memory graph store; every job will fail to find its root vertex");
            Ok(Arc::new(MemoryGraph::new()))
        }
        StoreEndpoint::Gremlin(url) => {
            let store = GremlinHttpStore::new(url.clone(), query_timeout)?;
            store.ping().await?;
            log::info!("Connected to Gremlin endpoint {}", url);
            Ok(Arc::new(store))
        }
    }
}
