//! Embedded graph store on SQLite.
//!
//! Snapshot files loaded by [`SqliteGraph::import_snapshot`] are line oriented:
//! `V,<key>,<label>` declares a vertex and `E,<src>,<kind>,<dst>` a directed
//! edge. Blank lines and lines starting with `#` are skipped.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::db::{migrate, Db};
use crate::graph::{GraphStore, Vertex, VertexKey};
use crate::{RelmapError, Result};

/// One parsed snapshot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRow {
    Vertex { key: String, label: String },
    Edge { src: String, kind: String, dst: String },
}

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub vertices: usize,
    pub edges: usize,
}

/// Parse one snapshot line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_snapshot_row(line: &str) -> Result<Option<SnapshotRow>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    match fields.as_slice() {
        ["V", key, label] if !key.is_empty() && !label.is_empty() => Ok(Some(SnapshotRow::Vertex {
            key: key.to_string(),
            label: label.to_string(),
        })),
        ["E", src, kind, dst] if !src.is_empty() && !kind.is_empty() && !dst.is_empty() => {
            Ok(Some(SnapshotRow::Edge {
                src: src.to_string(),
                kind: kind.to_string(),
                dst: dst.to_string(),
            }))
        }
        _ => Err(RelmapError::InvalidInput(format!("Malformed snapshot row: {}", line))),
    }
}

/// Graph store backed by a SQLite file with `vertices` and `edges` tables.
#[derive(Debug, Clone)]
pub struct SqliteGraph {
    db: Db,
}

impl SqliteGraph {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::new(path);
        db.with_connection(migrate::run_migrations).await?;
        log::info!("Opened SQLite graph store at {}", db.path().display());
        Ok(Self { db })
    }

    pub async fn add_vertex(&self, key: &VertexKey, label: &str) -> Result<()> {
        let key = key.to_string();
        let label = label.to_string();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO vertices (key, label) VALUES (?1, ?2)",
                    params![key, label],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn add_edge(&self, src: &VertexKey, kind: &str, dst: &VertexKey) -> Result<()> {
        let (src, kind, dst) = (src.to_string(), kind.to_string(), dst.to_string());
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO edges (src, kind, dst) VALUES (?1, ?2, ?3)",
                    params![src, kind, dst],
                )?;
                Ok(())
            })
            .await
    }

    /// Load a snapshot file in a single transaction.
    ///
    /// Any malformed row aborts the import and nothing is written.
    pub async fn import_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<ImportStats> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;

        let mut rows = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            match parse_snapshot_row(line) {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(_) => {
                    return Err(RelmapError::InvalidInput(format!(
                        "Malformed snapshot row at line {}: {}",
                        idx + 1,
                        line.trim()
                    )));
                }
            }
        }

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let mut stats = ImportStats::default();
                {
                    let mut vertex_stmt =
                        tx.prepare("INSERT OR REPLACE INTO vertices (key, label) VALUES (?1, ?2)")?;
                    let mut edge_stmt =
                        tx.prepare("INSERT INTO edges (src, kind, dst) VALUES (?1, ?2, ?3)")?;
                    for row in &rows {
                        match row {
                            SnapshotRow::Vertex { key, label } => {
                                vertex_stmt.execute(params![key, label])?;
                                stats.vertices += 1;
                            }
                            SnapshotRow::Edge { src, kind, dst } => {
                                edge_stmt.execute(params![src, kind, dst])?;
                                stats.edges += 1;
                            }
                        }
                    }
                }
                tx.commit()?;
                Ok(stats)
            })
            .await
    }
}

#[async_trait]
impl GraphStore for SqliteGraph {
    async fn vertex(&self, key: &VertexKey) -> Result<Option<Vertex>> {
        let key = key.to_string();
        self.db
            .with_connection(move |conn| {
                let label: Option<String> = conn
                    .query_row(
                        "SELECT label FROM vertices WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(label.map(|label| Vertex {
                    key: VertexKey::from_raw(key),
                    label,
                }))
            })
            .await
    }

    async fn in_neighbors(&self, key: &VertexKey, kinds: &[&str]) -> Result<Vec<Vertex>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = kinds.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT e.src, v.label FROM edges e \
             JOIN vertices v ON v.key = e.src \
             WHERE e.dst = ? AND e.kind IN ({}) \
             ORDER BY e.rowid",
            placeholders
        );
        let mut bound: Vec<String> = Vec::with_capacity(kinds.len() + 1);
        bound.push(key.to_string());
        bound.extend(kinds.iter().map(|k| k.to_string()));

        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
                    Ok(Vertex {
                        key: VertexKey::from_raw(row.get::<_, String>(0)?),
                        label: row.get(1)?,
                    })
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }
}
