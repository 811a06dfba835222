//! Per-job pipeline: parse the line, resolve related accounts, persist them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::JobHandler;
use crate::graph::{resolve_accounts, GraphStore};
use crate::job::RelationJob;
use crate::persist::ResultPersister;
use crate::Result;

/// Resolves one job against the shared store and hands the lines to the persister.
pub struct RelationDumper {
    store: Arc<dyn GraphStore>,
    persister: Arc<dyn ResultPersister>,
}

impl RelationDumper {
    pub fn new(store: Arc<dyn GraphStore>, persister: Arc<dyn ResultPersister>) -> Self {
        Self { store, persister }
    }

    /// Process one input line, returning the number of relation lines written.
    pub async fn process(&self, line: &str) -> Result<usize> {
        let job = RelationJob::parse(line)?;

        let account_ids = resolve_accounts(self.store.as_ref(), job.entity_type, &job.entity_id).await?;
        let lines: Vec<String> = account_ids
            .iter()
            .map(|account_id| job.relation_line(account_id))
            .collect();
        let count = lines.len();

        self.persister
            .persist(job.entity_type, &job.entity_id, lines)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl JobHandler for RelationDumper {
    async fn handle(&self, line: &str) -> Result<()> {
        let count = self.process(line).await?;
        log::debug!("Resolved {} relations for {}", count, line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{VertexKey, ACCOUNT_LABEL};
    use crate::persist::FsPersister;
    use crate::store::MemoryGraph;
    use crate::RelmapError;
    use tempfile::TempDir;

    fn graph() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        let sf = g.add_vertex("aws__sfid", "sf_1");
        let a1 = g.add_vertex(ACCOUNT_LABEL, "a1");
        g.add_edge(&a1, "aws__has_sfid", &sf);
        g
    }

    fn dumper(g: MemoryGraph, temp: &TempDir) -> RelationDumper {
        let persister = FsPersister::new(temp.path()).unwrap();
        RelationDumper::new(Arc::new(g), Arc::new(persister))
    }

    #[tokio::test]
    async fn test_process_writes_relation_file() {
        let temp = TempDir::new().unwrap();
        let dumper = dumper(graph(), &temp);

        let count = dumper.process("sfid,sf_1").await.unwrap();
        assert_eq!(count, 1);
        let content = std::fs::read_to_string(temp.path().join("sfid__sf_1")).unwrap();
        assert_eq!(content, "sfid,sf_1,a1\n");
    }

    #[tokio::test]
    async fn test_unknown_type_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let dumper = dumper(graph(), &temp);

        let err = dumper.process("widget,sf_1").await.unwrap_err();
        assert!(matches!(err, RelmapError::UnknownEntityType(_)));
        assert!(!temp.path().join("widget__sf_1").exists());
    }

    #[tokio::test]
    async fn test_malformed_key_fails_job_without_output() {
        let temp = TempDir::new().unwrap();
        let mut g = graph();
        let bad = g.add_raw_vertex("aws__account$$a$$2", ACCOUNT_LABEL);
        g.add_edge(&bad, "aws__has_sfid", &VertexKey::new("aws__sfid", "sf_1"));
        let dumper = dumper(g, &temp);

        let err = dumper.handle("sfid,sf_1").await.unwrap_err();
        assert!(matches!(err, RelmapError::MalformedVertexKey(_)));
        assert!(!temp.path().join("sfid__sf_1").exists());
    }
}
