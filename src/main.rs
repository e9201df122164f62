//! Broadcast join enrichment CLI

use broadcast_join::execution::{print_results, ExecutionContext, SessionConfig};
use broadcast_join::pipeline::{self, PipelineConfig};
use broadcast_join::sources::HttpJsonSource;
use broadcast_join::storage::DeltaTable;
use broadcast_join::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "broadcast_join")]
#[command(about = "Enrich sample sales with country data using a broadcast hash join")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, join and write the enriched sales table
    Run {
        /// Pages of users and carts to fetch
        #[arg(long, default_value_t = pipeline::DEFAULT_MAX_PAGES)]
        max_pages: usize,

        /// Output table location
        #[arg(short, long, default_value = pipeline::DEFAULT_OUTPUT_PATH)]
        output: PathBuf,

        /// Country list endpoint
        #[arg(long, default_value = pipeline::DEFAULT_COUNTRIES_URL)]
        countries_url: String,

        /// Base URL of the users/carts API
        #[arg(long, default_value = pipeline::DEFAULT_DUMMYJSON_URL)]
        dummyjson_url: String,

        /// Per-request HTTP timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Number of execution partitions (defaults to CPU count)
        #[arg(short, long)]
        partitions: Option<usize>,

        /// Size in bytes below which a join input is broadcast without a hint (0 disables)
        #[arg(long, default_value_t = broadcast_join::execution::DEFAULT_BROADCAST_THRESHOLD)]
        broadcast_threshold: u64,

        /// Do not mark the country table for broadcast
        #[arg(long)]
        no_broadcast_hint: bool,
    },

    /// Show the latest version of a table
    Show {
        /// Table location
        #[arg(short, long)]
        path: PathBuf,

        /// Rows to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the commit history of a table
    History {
        /// Table location
        #[arg(short, long)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            max_pages,
            output,
            countries_url,
            dummyjson_url,
            timeout_secs,
            partitions,
            broadcast_threshold,
            no_broadcast_hint,
        } => {
            let mut session = SessionConfig::new().with_broadcast_threshold(broadcast_threshold);
            if let Some(partitions) = partitions {
                session = session.with_target_partitions(partitions);
            }
            let config = PipelineConfig {
                countries_url,
                dummyjson_url,
                max_pages,
                timeout: Duration::from_secs(timeout_secs),
                output_path: output,
                broadcast_hint: !no_broadcast_hint,
                ..PipelineConfig::default()
            };
            run(session, config).await
        }
        Commands::Show { path, limit } => show(path, limit).await,
        Commands::History { path } => history(path),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(session: SessionConfig, config: PipelineConfig) -> Result<()> {
    let ctx = ExecutionContext::with_config(session);
    let source = HttpJsonSource::new(config.timeout)?;

    let summary = pipeline::run(&ctx, &source, &config).await?;
    tracing::info!(
        countries = summary.countries,
        users = summary.users,
        carts = summary.carts,
        sales = summary.sales,
        enriched = summary.enriched,
        strategy = ?summary.strategy,
        version = summary.table_version,
        "Run complete"
    );
    Ok(())
}

async fn show(path: PathBuf, limit: usize) -> Result<()> {
    let table = DeltaTable::open(&path)?;
    println!("Table: {}", path.display());
    println!("Version: {}", table.version());
    println!("Files: {}", table.snapshot().files().len());
    if let Some(rows) = table.snapshot().num_records() {
        println!("Rows: {}", pipeline::format_count(rows as usize));
    }
    println!("Schema:");
    for field in table.snapshot().schema().fields() {
        let null = if field.is_nullable() { "" } else { " NOT NULL" };
        println!("  {}: {}{}", field.name(), field.data_type(), null);
    }
    println!();

    let ctx = ExecutionContext::with_config(SessionConfig::new().with_target_partitions(1));
    ctx.register_delta("t", &path)?;
    let mut result = ctx.table("t")?.execute().await?;

    let mut remaining = limit;
    result.batches = result
        .batches
        .into_iter()
        .filter_map(|batch| {
            let take = remaining.min(batch.num_rows());
            remaining -= take;
            (take > 0).then(|| batch.slice(0, take))
        })
        .collect();
    print_results(&result);
    Ok(())
}

fn history(path: PathBuf) -> Result<()> {
    for record in DeltaTable::history(&path)? {
        match record.info {
            Some(info) => {
                let when = chrono::DateTime::from_timestamp_millis(info.timestamp)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| info.timestamp.to_string());
                let mode = info
                    .operation_parameters
                    .get("mode")
                    .map(String::as_str)
                    .unwrap_or("-");
                let rows = info
                    .operation_metrics
                    .get("numOutputRows")
                    .map(String::as_str)
                    .unwrap_or("-");
                println!(
                    "{:>5}  {}  {} mode={} rows={}",
                    record.version, when, info.operation, mode, rows
                );
            }
            None => println!("{:>5}  (no commit info)", record.version),
        }
    }
    Ok(())
}
