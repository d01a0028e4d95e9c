//! `simstore` command-line front end.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use simstore_core::{EngineConfig, Metadata};
use simstore_engine::{IngestRequest, LocalEmbedding, MetadataFilter, Query, QueryEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SNAPSHOT_FILE: &str = "records.jsonl";

#[derive(Parser)]
#[command(name = "simstore", about = "simstore: embedding similarity store")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "simstore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest items from a JSONL file of `{id?, text, metadata?}` lines
    Ingest {
        /// Input file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Rank stored records against a text query
    Query {
        /// Query text
        text: String,
        /// Number of hits
        #[arg(short, default_value_t = 10)]
        k: usize,
        /// Semantic weight in [0, 1]; lower values favour keyword matches
        #[arg(long)]
        weight: Option<f64>,
        /// Metadata equality filter `key=value`; repeat to require several
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Delete a record by id
    Delete {
        /// Record id
        id: String,
    },
    /// Rebuild the clustered index
    Rebuild {
        /// Cluster count (overrides config)
        #[arg(long)]
        clusters: Option<usize>,
    },
    /// Print engine statistics
    Stats,
}

#[derive(Deserialize, Default)]
struct SimstoreConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    embedding: EmbeddingConfig,
}

#[derive(Deserialize)]
struct EmbeddingConfig {
    #[serde(default = "default_embedding_dimension")]
    dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_embedding_dimension(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_embedding_dimension() -> usize {
    256
}

/// One line of an ingest file.
#[derive(Deserialize)]
struct IngestLine {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

async fn load_config(path: &Path) -> anyhow::Result<SimstoreConfig> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(SimstoreConfig {
            data_dir: default_data_dir(),
            ..SimstoreConfig::default()
        });
    }
    let config_str = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config: SimstoreConfig = toml::from_str(&config_str)?;
    Ok(config)
}

fn parse_ingest_lines(data: &str) -> anyhow::Result<Vec<IngestRequest>> {
    data.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(lineno, line)| {
            let item: IngestLine = serde_json::from_str(line)
                .with_context(|| format!("Invalid ingest item on line {}", lineno + 1))?;
            let mut request = IngestRequest::text(item.text).with_metadata(item.metadata);
            request.id = item.id;
            Ok(request)
        })
        .collect()
}

fn build_filter(exprs: &[String]) -> anyhow::Result<Option<MetadataFilter>> {
    let mut filters = exprs
        .iter()
        .map(|expr| {
            MetadataFilter::parse_eq(expr)
                .with_context(|| format!("Filter '{expr}' is not of the form key=value"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(MetadataFilter::And(filters)),
    })
}

async fn open_engine(config: &SimstoreConfig) -> anyhow::Result<QueryEngine> {
    let mut engine_config = config.engine.clone();
    let dimension = *engine_config
        .dimension
        .get_or_insert(config.embedding.dimension);
    anyhow::ensure!(
        dimension == config.embedding.dimension,
        "engine.dimension ({dimension}) differs from embedding.dimension ({})",
        config.embedding.dimension
    );

    let engine = QueryEngine::new(
        engine_config,
        Arc::new(LocalEmbedding::new(config.embedding.dimension)),
    )?;
    let snapshot = config.data_dir.join(SNAPSHOT_FILE);
    if tokio::fs::try_exists(&snapshot).await.unwrap_or(false) {
        engine.import_snapshot(&snapshot).await?;
    }
    Ok(engine)
}

async fn run(command: Commands, config: &SimstoreConfig) -> anyhow::Result<serde_json::Value> {
    let engine = open_engine(config).await?;
    let snapshot = config.data_dir.join(SNAPSHOT_FILE);

    let output = match command {
        Commands::Ingest { file } => {
            let data = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let mut ids = Vec::new();
            for request in parse_ingest_lines(&data)? {
                ids.push(engine.ingest(request).await?);
            }
            engine.export_snapshot(&snapshot).await?;
            info!(count = ids.len(), "Items ingested");
            json!({ "ingested": ids.len(), "ids": ids })
        }
        Commands::Query {
            text,
            k,
            weight,
            filters,
        } => {
            let mut query = Query::text(text).with_k(k);
            if let Some(weight) = weight {
                query = query.with_semantic_weight(weight);
            }
            if let Some(filter) = build_filter(&filters)? {
                query = query.with_filter(filter);
            }
            serde_json::to_value(engine.query(query).await?)?
        }
        Commands::Delete { id } => {
            let deleted = engine.delete(&id).await;
            if deleted {
                engine.export_snapshot(&snapshot).await?;
            }
            json!({ "id": id, "deleted": deleted })
        }
        Commands::Rebuild { clusters } => {
            let built = engine.rebuild_index(clusters).await?;
            json!({ "clusters": built, "stats": engine.stats() })
        }
        Commands::Stats => serde_json::to_value(engine.stats())?,
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let output = run(cli.command, &config).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
