use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bucketgate::config::LimitersFile;
use bucketgate::ratelimit::RateLimiter;
use bucketgate::store::MemoryStore;

/// Replay `<cost> <timestamp>` lines from stdin through a configured limiter.
#[derive(Debug, Parser)]
#[command(name = "bucketgate", version, about)]
struct Args {
    /// YAML file with limiter definitions
    #[arg(short, long)]
    config: PathBuf,

    /// Name of the limiter to replay against
    #[arg(short, long)]
    limiter: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if args.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let file = LimitersFile::from_file(&args.config)?;
    let config = file
        .get(&args.limiter)
        .cloned()
        .with_context(|| format!("no limiter named '{}' in {}", args.limiter, args.config.display()))?;

    let store = Arc::new(MemoryStore::new());
    let mut limiter = RateLimiter::load(config.with_store(store.clone())).await?;
    info!(limiter = %limiter.name(), max = limiter.max(), "Limiter loaded");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((cost, timestamp)) = line.split_once(char::is_whitespace) else {
            warn!(line = line_no, "Expected '<cost> <timestamp>'");
            continue;
        };
        let cost: f64 = match cost.parse() {
            Ok(cost) => cost,
            Err(e) => {
                warn!(line = line_no, error = %e, "Invalid cost");
                continue;
            }
        };

        let admitted = match limiter.update(cost, timestamp.trim()).await {
            Ok(admitted) => admitted,
            Err(e) if e.as_validation().is_some() => {
                warn!(line = line_no, error = %e, "Skipping invalid event");
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("line {}", line_no)),
        };
        println!(
            "{} {} {}",
            if admitted { "admit" } else { "deny" },
            cost,
            limiter.value_of().unwrap_or_default()
        );
    }

    if let Some(window) = limiter.window() {
        println!("{}", serde_json::to_string_pretty(&window.to_snapshot())?);
    }

    info!(stored = store.len(), "Replay finished");
    Ok(())
}
