use anyhow::{Context, Result};
use clap::Parser;
use relmap::store::{self, StoreEndpoint};
use relmap::{resolve_accounts, RelationJob};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "resolve")]
#[command(about = "Resolve a single entity and print its relation lines")]
struct Args {
    /// Graph store endpoint: host[:port], http(s) URL, sqlite:<path> or memory:
    endpoint: String,

    /// Job record, e.g. `customer,c_123`
    job: String,

    /// Query evaluation timeout in minutes
    #[arg(long, default_value_t = 10)]
    timeout_minutes: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let job = RelationJob::parse(args.job.trim())?;

    let endpoint = StoreEndpoint::parse(&args.endpoint)?;
    let graph = store::connect(&endpoint, Duration::from_secs(args.timeout_minutes * 60))
        .await
        .with_context(|| format!("Failed to connect to graph store {}", args.endpoint))?;

    let start = Instant::now();
    let account_ids = resolve_accounts(graph.as_ref(), job.entity_type, &job.entity_id).await?;

    for account_id in &account_ids {
        println!("{}", job.relation_line(account_id));
    }

    log::info!("Resolved {} relations in {:?}", account_ids.len(), start.elapsed());
    Ok(())
}
