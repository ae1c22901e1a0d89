//! ctimap CLI - load STIX bundles into TypeDB

use clap::{Parser, Subcommand};
use ctimap::config::StoreKind;
use ctimap::{Bundle, Config, Migrator, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ctimap")]
#[command(about = "Compile STIX documents into TypeDB write pipelines and load them", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store implementation
    #[arg(long, global = true, value_enum)]
    store: Option<StoreKind>,

    /// TypeDB HTTP address
    #[arg(long, global = true)]
    address: Option<String>,

    /// Database name
    #[arg(long, global = true)]
    database: Option<String>,

    /// Statement groups per transaction
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Maximum simultaneously open write transactions
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and define the schema
    Setup {
        /// Drop an existing database first
        #[arg(long)]
        force: bool,

        /// Schema files (TypeQL define queries)
        #[arg(required = true)]
        schema: Vec<PathBuf>,
    },

    /// Load a bundle file or a directory of bundles
    Ingest {
        path: PathBuf,
    },

    /// Print one stored object as JSON
    Fetch {
        /// STIX id of the object
        id: String,

        /// Mapping to fetch with (defaults to the id prefix)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,
    },

    /// Print the planned queries per phase without touching a store
    Compile {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli).await?;

    match cli.command {
        Commands::Setup { force, schema } => setup(&config, &schema, force).await,
        Commands::Ingest { path } => ingest(&config, path).await,
        Commands::Fetch { id, type_name } => fetch(&config, &id, type_name.as_deref()).await,
        Commands::Compile { path } => compile(&config, path).await,
    }
}

/// Configuration file (or defaults) overridden by command-line flags
async fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };

    if let Some(kind) = cli.store {
        config.store.kind = kind;
    }
    if let Some(address) = &cli.address {
        config.store.address = address.clone();
    }
    if let Some(database) = &cli.database {
        config.store.database = database.clone();
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }

    config.validate()?;
    Ok(config)
}

async fn setup(config: &Config, schema: &[PathBuf], force: bool) -> anyhow::Result<()> {
    let migrator = Migrator::open(config)?;
    migrator.setup(schema, force).await?;
    println!("Database '{}' is ready.", config.store.database);
    Ok(())
}

async fn ingest(config: &Config, path: PathBuf) -> anyhow::Result<()> {
    let migrator = Migrator::open(config)?;

    let cancellation = migrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing in-flight batches");
            cancellation.cancel();
        }
    });

    let report = match migrator.ingest_path(&path).await {
        Ok(report) => report,
        Err(e) => {
            if let Some(hint) = e.suggestion() {
                eprintln!("hint: {}", hint);
            }
            return Err(e.into());
        }
    };

    for phase in &report.phases {
        println!("{}", phase);
    }
    if !report.skipped.is_empty() {
        println!();
        println!("Skipped {} document(s):", report.skipped.len());
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.origin, skipped.reason);
        }
    }
    Ok(())
}

async fn fetch(config: &Config, id: &str, type_name: Option<&str>) -> anyhow::Result<()> {
    let migrator = Migrator::open(config)?;
    let answer = match type_name {
        Some(type_name) => migrator.fetch(type_name, &Value::from(id)).await?,
        None => migrator.fetch_id(id).await?,
    };

    match answer {
        Some(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        None => println!("No object with id '{}'.", id),
    }
    Ok(())
}

async fn compile(config: &Config, path: PathBuf) -> anyhow::Result<()> {
    let migrator = Migrator::open(config)?;
    let documents = Bundle::open(&path).read().await?;
    let plan = migrator.plan(&documents);

    for (phase, groups) in plan.phases() {
        if groups.is_empty() {
            continue;
        }
        println!("# phase: {} ({} group(s))", phase, groups.len());
        for group in groups {
            println!("# {}", group.origin);
            println!("{}", group.query);
            println!();
        }
    }

    for skipped in &plan.skipped {
        eprintln!("skipped {}: {}", skipped.origin, skipped.reason);
    }
    Ok(())
}
