//! pimflow CLI - inspect and sync product data sources

mod config;
mod sink;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pimflow_connectors::{
    connect_with_timeout, default_registry, Connector, ExcelConnector, McpConnector, SyncRunner,
};
use pimflow_core::{ConnectorConfig, ConnectorKind, DiscardSink, FieldMapping};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::CliConfig;
use crate::sink::JsonLinesSink;

#[derive(Parser)]
#[command(name = "pimflow")]
#[command(about = "Product data connectors - test, inspect and sync data sources")]
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
    /// Check that a configured source is reachable
    Test {
        /// Path to the connector config JSON file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the inferred schema of a source
    Schema {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the first records of a source
    Preview {
        #[arg(short, long)]
        config: PathBuf,

        /// Number of records (defaults to PIMFLOW_PREVIEW_LIMIT)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Project every record through a field mapping
    Sync {
        #[arg(short, long)]
        config: PathBuf,

        /// Path to a JSON array of {source, target, transform?}
        #[arg(short, long)]
        mapping: PathBuf,

        /// Write projected records as JSON Lines
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the sheets of a spreadsheet source
    Sheets {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List the tools and resources of an MCP source
    Tools {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List the supported connector types
    Types,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = CliConfig::from_env()?;

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { settings.log_level };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Test { config } => test_source(&config, &settings).await?,
        Commands::Schema { config } => show_schema(&config, &settings).await?,
        Commands::Preview { config, limit } => {
            preview_source(&config, limit.unwrap_or(settings.preview_limit), &settings).await?
        }
        Commands::Sync {
            config,
            mapping,
            output,
        } => sync_source(&config, &mapping, output.as_deref(), &settings).await?,
        Commands::Sheets { config } => list_sheets(&config, &settings).await?,
        Commands::Tools { config } => list_tools(&config, &settings).await?,
        Commands::Types => print_json(&default_registry().descriptors())?,
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load a connector config file. A missing `id` gets a random one.
fn load_config(path: &Path) -> Result<ConnectorConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let mut raw: Value =
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))?;
    if let Some(object) = raw.as_object_mut() {
        object
            .entry("id")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    }
    serde_json::from_value(raw).with_context(|| format!("Invalid connector config in {:?}", path))
}

fn load_mapping(path: &Path) -> Result<Vec<FieldMapping>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid field mapping in {:?}", path))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn expect_kind(config: &ConnectorConfig, expected: ConnectorKind) -> Result<()> {
    let kind: ConnectorKind = config.kind.parse()?;
    if kind != expected {
        anyhow::bail!("'{}' is a {} source, this command needs {}", config.name, kind, expected);
    }
    Ok(())
}

/// Build and connect the connector described by `config`.
async fn open(config: &ConnectorConfig, settings: &CliConfig) -> Result<Box<dyn Connector>> {
    let mut connector = default_registry().from_config(config)?;
    connect_with_timeout(connector.as_mut(), &config.config, settings.connect_timeout())
        .await
        .with_context(|| format!("Failed to connect '{}'", config.name))?;
    Ok(connector)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn test_source(config_path: &Path, settings: &CliConfig) -> Result<()> {
    let config = load_config(config_path)?;
    let mut connector = default_registry().from_config(&config)?;

    let connected =
        connect_with_timeout(connector.as_mut(), &config.config, settings.connect_timeout()).await;
    let reachable = match &connected {
        Ok(()) => connector.test_connection().await,
        Err(_) => false,
    };
    connector.disconnect().await;

    match connected {
        Ok(()) if reachable => println!("OK: '{}' ({}) is reachable", config.name, config.kind),
        Ok(()) => anyhow::bail!("'{}' connected but failed the reachability check", config.name),
        Err(e) => anyhow::bail!("'{}' is not reachable: {}", config.name, e),
    }
    Ok(())
}

async fn show_schema(config_path: &Path, settings: &CliConfig) -> Result<()> {
    let config = load_config(config_path)?;
    let mut connector = open(&config, settings).await?;
    let schema = connector.get_schema().await;
    connector.disconnect().await;
    print_json(&schema?)
}

async fn preview_source(config_path: &Path, limit: usize, settings: &CliConfig) -> Result<()> {
    let config = load_config(config_path)?;
    let mut connector = open(&config, settings).await?;
    let records = connector.preview(limit).await;
    connector.disconnect().await;
    print_json(&records?)
}

async fn sync_source(
    config_path: &Path,
    mapping_path: &Path,
    output: Option<&Path>,
    settings: &CliConfig,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mapping = load_mapping(mapping_path)?;
    info!("Syncing '{}' with {} mapping entries", config.name, mapping.len());

    let runner = SyncRunner::default().with_connect_timeout(settings.connect_timeout());
    let result = match output {
        Some(path) => {
            let mut sink = JsonLinesSink::create(path)?;
            let result = runner.run(&config, &mapping, &mut sink).await?;
            let written = sink.finish()?;
            info!("Wrote {} records to {:?}", written, path);
            result
        }
        None => runner.run(&config, &mapping, &mut DiscardSink).await?,
    };

    print_json(&result)?;
    if !result.success {
        anyhow::bail!("{} of {} records failed", result.records_failed, result.records_processed);
    }
    Ok(())
}

async fn list_sheets(config_path: &Path, settings: &CliConfig) -> Result<()> {
    let config = load_config(config_path)?;
    expect_kind(&config, ConnectorKind::Excel)?;

    let mut connector = ExcelConnector::new(&config.id, &config.name);
    connect_with_timeout(&mut connector, &config.config, settings.connect_timeout())
        .await
        .with_context(|| format!("Failed to connect '{}'", config.name))?;
    let sheets = connector.sheet_names().map(<[String]>::to_vec);
    connector.disconnect().await;
    print_json(&sheets?)
}

async fn list_tools(config_path: &Path, settings: &CliConfig) -> Result<()> {
    let config = load_config(config_path)?;
    expect_kind(&config, ConnectorKind::Mcp)?;

    let mut connector = McpConnector::new(&config.id, &config.name);
    connect_with_timeout(&mut connector, &config.config, settings.connect_timeout())
        .await
        .with_context(|| format!("Failed to connect '{}'", config.name))?;
    let listing = serde_json::json!({
        "tools": connector.cached_tools(),
        "resources": connector.cached_resources(),
    });
    connector.disconnect().await;
    print_json(&listing)
}
