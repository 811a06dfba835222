use anyhow::{Context, Result};
use clap::Parser;
use relmap::store::SqliteGraph;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Load graph snapshot files into a SQLite graph store")]
struct Args {
    /// SQLite database to create or extend
    db: PathBuf,

    /// Snapshot files (`V,key,label` and `E,src,kind,dst` rows)
    #[arg(required = true)]
    snapshots: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    let graph = SqliteGraph::open(&args.db)
        .await
        .with_context(|| format!("Failed to open graph store {}", args.db.display()))?;

    let start = Instant::now();
    let mut total_vertices = 0;
    let mut total_edges = 0;

    for (idx, snapshot) in args.snapshots.iter().enumerate() {
        log::info!("[{}/{}] Importing: {}", idx + 1, args.snapshots.len(), snapshot.display());
        let stats = graph
            .import_snapshot(snapshot)
            .await
            .with_context(|| format!("Failed to import {}", snapshot.display()))?;
        log::info!("✓ {} ({} vertices, {} edges)", snapshot.display(), stats.vertices, stats.edges);
        total_vertices += stats.vertices;
        total_edges += stats.edges;
    }

    log::info!("=== Import Complete ===");
    log::info!("Vertices: {}", total_vertices);
    log::info!("Edges: {}", total_edges);
    log::info!("Time: {:?}", start.elapsed());

    Ok(())
}
