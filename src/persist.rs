//! Result persistence: one output file per resolved entity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::graph::EntityType;
use crate::Result;

/// Destination for the resolved relation lines of one job.
#[async_trait]
pub trait ResultPersister: Send + Sync {
    /// Replace whatever was stored for `(entity_type, entity_id)` with `lines`.
    async fn persist(&self, entity_type: EntityType, entity_id: &str, lines: Vec<String>) -> Result<()>;
}

/// Writes `<dir>/<type>__<id>`, one line per relation.
#[derive(Debug, Clone)]
pub struct FsPersister {
    dir: PathBuf,
}

impl FsPersister {
    /// Create the persister, creating `dir` (and parents) if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn output_path(&self, entity_type: EntityType, entity_id: &str) -> PathBuf {
        self.dir.join(format!("{}__{}", entity_type, entity_id))
    }
}

#[async_trait]
impl ResultPersister for FsPersister {
    async fn persist(&self, entity_type: EntityType, entity_id: &str, lines: Vec<String>) -> Result<()> {
        let mut content = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in &lines {
            content.push_str(line);
            content.push('\n');
        }

        let path = self.output_path(entity_type, entity_id);
        tokio::fs::write(&path, content).await?;
        log::debug!("Wrote {} lines to {}", lines.len(), path.display());
        Ok(())
    }
}
