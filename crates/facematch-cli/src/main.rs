use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch_store::{KeyedRecord, SqliteDocumentStore};
use facematchd::config::Config;
use facematchd::pipeline::UploadStatus;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facematch", about = "facematch administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage identity records
    Records {
        #[command(subcommand)]
        command: RecordsCommand,
    },
    /// Preload the known faces, then match one local image
    Probe {
        /// Image file to match
        image: PathBuf,
    },
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// Upsert records from a JSON array of {key, label, fechaNacimiento, ...}
    Import {
        file: PathBuf,
    },
    /// List stored records
    List,
    /// Remove the record stored under KEY
    Remove {
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Records { command } => records(&config, command).await,
        Commands::Probe { image } => probe(&config, &image).await,
    }
}

async fn records(config: &Config, command: RecordsCommand) -> Result<()> {
    let store = SqliteDocumentStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;

    match command {
        RecordsCommand::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let records: Vec<KeyedRecord> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", file.display()))?;
            let count = records.len();
            for keyed in records {
                store.put(&keyed.key, keyed.record).await?;
            }
            println!("Imported {count} record(s) into {}", config.db_path.display());
        }
        RecordsCommand::List => {
            let records = store.list().await?;
            if records.is_empty() {
                println!("No records");
            }
            for keyed in records {
                println!("{}\t{}\t{}", keyed.key, keyed.record.label, keyed.record.cedula);
            }
        }
        RecordsCommand::Remove { key } => {
            if store.remove(&key).await? {
                println!("Removed {key}");
            } else {
                anyhow::bail!("no record stored under {key:?}");
            }
        }
    }
    Ok(())
}

async fn probe(config: &Config, image: &Path) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;

    let engine = facematchd::start_engine(config)?;
    let pipeline = facematchd::prepare(config, engine).await?;
    let policy = pipeline.policy();
    eprintln!(
        "{} known face(s), metric {}, threshold {}",
        pipeline.index().len(),
        policy.metric,
        policy.threshold
    );

    let outcome = pipeline.handle_upload(Some(bytes)).await;
    println!("{}", serde_json::to_string_pretty(&outcome.body)?);
    if outcome.status == UploadStatus::ServerError {
        anyhow::bail!("matching failed; run with RUST_LOG=facematchd=debug for details");
    }
    Ok(())
}
