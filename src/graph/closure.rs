//! Closure resolution: repeated backward expansion over simple paths.

use std::collections::VecDeque;

use crate::graph::{EntityType, GraphStore, VertexKey, ACCOUNT_LABEL};
use crate::{RelmapError, Result};

/// A partial path under expansion. `path` ends with `head` and starts at the root.
struct Traverser {
    head: VertexKey,
    path: Vec<VertexKey>,
}

/// Expand `root` backwards along `kinds` until no simple path can grow.
///
/// Every vertex labelled `target_label` is emitted once per simple path that
/// reaches it, at whatever depth it is found; emitted vertices keep expanding.
/// The root itself is never emitted. Results are in breadth-first order and
/// are not deduplicated.
pub async fn expand_simple_paths<S>(
    store: &S,
    root: &VertexKey,
    kinds: &[&str],
    target_label: &str,
) -> Result<Vec<VertexKey>>
where
    S: GraphStore + ?Sized,
{
    let mut queue = VecDeque::new();
    let mut emitted = Vec::new();
    let mut expansions = 0usize;

    queue.push_back(Traverser {
        head: root.clone(),
        path: vec![root.clone()],
    });

    while let Some(traverser) = queue.pop_front() {
        let predecessors = store.in_neighbors(&traverser.head, kinds).await?;
        expansions += 1;

        for vertex in predecessors {
            if traverser.path.contains(&vertex.key) {
                continue;
            }
            if vertex.label == target_label {
                emitted.push(vertex.key.clone());
            }
            let mut path = Vec::with_capacity(traverser.path.len() + 1);
            path.extend(traverser.path.iter().cloned());
            path.push(vertex.key.clone());
            queue.push_back(Traverser {
                head: vertex.key,
                path,
            });
        }
    }

    log::debug!(
        "Expanded {} traversers from {}, emitted {} {} vertices",
        expansions,
        root,
        emitted.len(),
        target_label
    );

    Ok(emitted)
}

/// Resolve the local ids of all accounts reachable from an entity.
///
/// Fails with `VertexNotFound` when the root vertex is absent and with
/// `MalformedVertexKey` if any emitted key cannot be split.
pub async fn resolve_accounts<S>(
    store: &S,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<Vec<String>>
where
    S: GraphStore + ?Sized,
{
    let root = entity_type.root_key(entity_id);

    if store.vertex(&root).await?.is_none() {
        return Err(RelmapError::VertexNotFound(root.to_string()));
    }

    let keys = store
        .expand(&root, entity_type.edge_filter(), ACCOUNT_LABEL)
        .await?;

    keys.iter()
        .map(|key| key.local_id().map(str::to_string))
        .collect()
}
