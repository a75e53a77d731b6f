//! Trellis CLI - inspect datasets by engine URL

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use trellis_connect::kafka::KafkaConnector;
use trellis_connect::{ConnectParams, Connector, ConnectorRegistry};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Read datasets the way Trellis jobs see them")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a dataset's records as JSON lines
    Cat {
        /// Engine URL of the dataset (e.g. flowerpot:///data/pot.tar.gz)
        url: String,

        /// Only records of this logical table
        #[arg(short, long)]
        table: Option<String>,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,

        /// Option relayed to the connector, as key=value
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },

    /// List the logical tables of an archive
    Tables {
        url: String,

        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },

    /// Show the schema inferred for a dataset
    Schema {
        url: String,

        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },

    /// Show the partition offset windows of a kafka:// URL
    Windows { url: String },
}

fn parse_option(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn params(url: &str, options: Vec<(String, String)>) -> ConnectParams {
    options
        .into_iter()
        .fold(ConnectParams::engine_url(url), |params, (k, v)| {
            params.with_option(k, v)
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean JSON
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry =
        ConnectorRegistry::try_shared().context("invalid TRELLIS_* environment configuration")?;

    match cli.command {
        Commands::Cat {
            url,
            table,
            limit,
            options,
        } => cat(&registry, &url, table.as_deref(), limit, options).await?,
        Commands::Tables { url, options } => show_tables(&registry, &url, options).await?,
        Commands::Schema { url, options } => show_schema(&registry, &url, options).await?,
        Commands::Windows { url } => show_windows(&registry, &url).await?,
    }

    Ok(())
}

async fn cat(
    registry: &ConnectorRegistry,
    url: &str,
    table: Option<&str>,
    limit: Option<usize>,
    options: Vec<(String, String)>,
) -> Result<()> {
    let connection = registry
        .resolve(&params(url, options))
        .with_context(|| format!("cannot resolve {}", url))?;

    let records = match table {
        Some(_) => connection.query(table).await?,
        None => connection.data().await?,
    };
    let mut records = records.take(limit.unwrap_or(usize::MAX));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    while let Some(record) = records.next().await {
        let record = record.with_context(|| format!("reading {}", url))?;
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    info!("Read {} records from {}", count, url);
    Ok(())
}

async fn show_tables(
    registry: &ConnectorRegistry,
    url: &str,
    options: Vec<(String, String)>,
) -> Result<()> {
    let connection = registry
        .resolve(&params(url, options))
        .with_context(|| format!("cannot resolve {}", url))?;
    for table in connection.tables().await? {
        println!("{}", table);
    }
    Ok(())
}

async fn show_schema(
    registry: &ConnectorRegistry,
    url: &str,
    options: Vec<(String, String)>,
) -> Result<()> {
    let connection = registry
        .resolve(&params(url, options))
        .with_context(|| format!("cannot resolve {}", url))?;
    let schema = connection.schema().await?;
    for field in schema.fields() {
        println!(
            "{}: {}{}",
            field.name(),
            field.data_type(),
            if field.is_nullable() { " (nullable)" } else { "" }
        );
    }
    Ok(())
}

async fn show_windows(registry: &ConnectorRegistry, url: &str) -> Result<()> {
    let kafka = KafkaConnector::new(url, &ConnectParams::default(), registry.config())?;
    let windows = kafka.partition_windows().await?;
    if windows.is_empty() {
        println!("No messages between {} and {}", kafka.engine().start, kafka.engine().end);
    }
    for window in windows {
        println!(
            "partition {}: offsets {}..{} ({} messages)",
            window.partition,
            window.start_offset,
            window.end_offset,
            window.len()
        );
    }
    Ok(())
}
