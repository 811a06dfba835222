use anyhow::{Context, Result};
use clap::Parser;
use relmap::store::{self, StoreEndpoint};
use relmap::{Config, Dispatcher, FsPersister, RelationDumper, RelmapError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "relmap")]
#[command(about = "Resolve the accounts related to each entity listed in an input file")]
struct Args {
    /// Graph store endpoint: host[:port], http(s) URL, sqlite:<path> or memory:
    endpoint: String,

    /// File with one `type,id` record per line
    input: PathBuf,

    /// Number of concurrent workers
    pool_size: usize,

    /// Query evaluation timeout in minutes
    query_timeout_minutes: u64,

    /// Directory for the per-entity output files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// How long to wait for in-flight jobs after the input is exhausted
    #[arg(long)]
    drain_timeout_minutes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    log::info!("Starting relmap v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load()?;
    config.store.endpoint = Some(args.endpoint.clone());
    config.store.query_timeout_minutes = args.query_timeout_minutes;
    config.dispatch.pool_size = args.pool_size;
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }
    if let Some(minutes) = args.drain_timeout_minutes {
        config.dispatch.drain_timeout_minutes = minutes;
    }
    config.validate()?;

    log::info!("Graph store: {}", args.endpoint);
    log::info!("Input: {}", args.input.display());
    log::info!("Output directory: {}", config.output_dir().display());
    log::info!(
        "Workers: {}, query timeout: {} min",
        config.dispatch.pool_size,
        config.store.query_timeout_minutes
    );

    let endpoint = StoreEndpoint::parse(&args.endpoint)?;
    let graph = store::connect(&endpoint, config.query_timeout())
        .await
        .with_context(|| format!("Failed to connect to graph store {}", args.endpoint))?;

    let persister = FsPersister::new(config.output_dir()).with_context(|| {
        format!("Failed to create output directory {}", config.output_dir().display())
    })?;
    let dumper = Arc::new(RelationDumper::new(graph, Arc::new(persister)));

    let input = tokio::fs::File::open(&args.input)
        .await
        .with_context(|| format!("Failed to open input file {}", args.input.display()))?;

    let dispatcher = Dispatcher::new(config.dispatch.pool_size, dumper)?
        .with_drain_timeout(config.drain_timeout());

    let start = Instant::now();
    let mut lines = BufReader::new(input).lines();
    let mut read_error = None;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                dispatcher.submit(&line).await?;
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed reading {}: {}", args.input.display(), e);
                read_error = Some(e);
                break;
            }
        }
    }

    // Jobs already admitted still get their chance to finish.
    match dispatcher.close().await {
        Ok(report) => {
            log::info!("=== Resolution Complete ===");
            log::info!("Jobs submitted: {}", report.submitted);
            log::info!("  Succeeded: {}", report.succeeded);
            log::info!("  Failed: {}", report.failed);
            log::info!("Time: {:?}", start.elapsed());
            if report.failed > 0 {
                log::warn!("Some jobs failed. Check logs above for details.");
            }
        }
        Err(RelmapError::DrainTimeout(waited)) => {
            log::error!("Waited for {:?}, forced exit", waited);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(e) = read_error {
        return Err(e).with_context(|| format!("Failed reading input file {}", args.input.display()));
    }

    Ok(())
}
