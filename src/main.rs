// VecUpload — main.rs
// Binary entry point: upload a JSONL file of code entities, or query the index.
// Author: d65v <https://github.com/d65v>

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use vupload::{
    Config, ConfigOverrides, IdSource, PineconeClient, Projector, Query, RecordReader, Uploader,
    BATCH_SIZE,
};

#[derive(Parser, Debug)]
#[command(
    name = "vecupload",
    version,
    about = "Upload precomputed name/type embeddings to a Pinecone index"
)]
struct Cli {
    #[command(flatten)]
    index: IndexArgs,

    #[command(subcommand)]
    command: Command,
}

/// Connection settings. Anything left out is read from the environment.
#[derive(Args, Debug)]
struct IndexArgs {
    /// API key [env: PINECONE_API_KEY]
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Project id [env: PINECONE_PROJECT]
    #[arg(long, global = true)]
    project: Option<String>,

    /// Index name [env: PINECONE_INDEX]
    #[arg(long, global = true)]
    index: Option<String>,

    /// Environment / region, e.g. us-east1-gcp [env: PINECONE_ENVIRONMENT]
    #[arg(long, global = true)]
    environment: Option<String>,

    /// Full index host, overrides the derived one [env: PINECONE_HOST]
    #[arg(long, global = true)]
    host: Option<String>,
}

impl From<IndexArgs> for ConfigOverrides {
    fn from(a: IndexArgs) -> Self {
        ConfigOverrides {
            api_key: a.api_key,
            project: a.project,
            index: a.index,
            environment: a.environment,
            host: a.host,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload every record of a JSONL file in batches
    Upload {
        /// Line-delimited JSON records
        file: PathBuf,

        /// Records per batch
        #[arg(long, default_value_t = BATCH_SIZE)]
        batch_size: usize,

        /// Hash used as the id of type-partition vectors
        #[arg(long, value_enum, default_value_t = TypeIds::NameHash)]
        type_ids: TypeIds,
    },

    /// Nearest-neighbour query against one namespace
    Query {
        /// Namespace to search ("name" or "type")
        #[arg(long)]
        namespace: Option<String>,

        /// Query vector: JSON array or comma/space separated floats
        #[arg(long, value_parser = parse_vector)]
        vector: QueryVector,

        #[arg(long, default_value_t = 10)]
        top_k: u32,

        #[arg(long)]
        include_values: bool,

        #[arg(long)]
        include_metadata: bool,

        /// Metadata filter as a JSON object
        #[arg(long, value_parser = parse_filter)]
        filter: Option<serde_json::Value>,
    },
}

#[derive(Clone, Debug)]
struct QueryVector(Vec<f32>);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TypeIds {
    NameHash,
    TypeHash,
}

impl From<TypeIds> for IdSource {
    fn from(t: TypeIds) -> Self {
        match t {
            TypeIds::NameHash => IdSource::NameHash,
            TypeIds::TypeHash => IdSource::PartitionHash,
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger — respects RUST_LOG env var
    env_logger::init();

    // Load .env if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let config = Config::resolve(cli.index.into()).context("cannot resolve index settings")?;
    log::info!("Config: {:?}", config);

    match cli.command {
        Command::Upload {
            file,
            batch_size,
            type_ids,
        } => run_upload(&config, file, batch_size, type_ids.into()),
        Command::Query {
            namespace,
            vector,
            top_k,
            include_values,
            include_metadata,
            filter,
        } => run_query(
            &config,
            Query {
                namespace,
                top_k,
                include_values,
                include_metadata,
                vector: vector.0,
                filter,
            },
        ),
    }
}

fn run_upload(config: &Config, file: PathBuf, batch_size: usize, ids: IdSource) -> Result<()> {
    let records = RecordReader::open(&file)
        .with_context(|| format!("cannot open {}", file.display()))?;
    let client = PineconeClient::connect(config)?;
    let uploader = Uploader::new(client)
        .with_batch_size(batch_size)
        .with_projector(Projector::new(ids));

    log::info!("Uploading {} in batches of {}", file.display(), batch_size);

    let summary = uploader
        .run(records, |r| {
            println!(
                "Uploaded {} for {} batch of size {}",
                r.upserted, r.partition, r.attempted
            );
        })
        .with_context(|| format!("upload of {} failed", file.display()))?;

    println!(
        "Done: {} records, {} batches, {} name + {} type vectors upserted",
        summary.records_read, summary.batches, summary.name_upserted, summary.type_upserted
    );
    Ok(())
}

fn run_query(config: &Config, query: Query) -> Result<()> {
    let client = PineconeClient::connect(config)?;
    let resp = client.query(&query).context("query failed")?;

    println!("namespace '{}': {} matches", resp.namespace, resp.matches.len());
    for m in &resp.matches {
        let meta = m
            .metadata
            .as_ref()
            .map(|md| serde_json::Value::Object(md.clone()).to_string())
            .unwrap_or_default();
        println!("  id={:20}  score={:.6}  {}", m.id, m.score, meta);
    }
    Ok(())
}

fn parse_vector(text: &str) -> std::result::Result<QueryVector, String> {
    let trimmed = text.trim();
    let values: Vec<f32> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| format!("invalid JSON vector: {}", e))?
    } else {
        trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<f32>().map_err(|_| format!("not a number: '{}'", s)))
            .collect::<std::result::Result<_, _>>()?
    };
    if values.is_empty() {
        return Err("query vector is empty".into());
    }
    Ok(QueryVector(values))
}

fn parse_filter(text: &str) -> std::result::Result<serde_json::Value, String> {
    match serde_json::from_str(text) {
        Ok(v @ serde_json::Value::Object(_)) => Ok(v),
        Ok(_) => Err("filter must be a JSON object".into()),
        Err(e) => Err(format!("invalid JSON filter: {}", e)),
    }
}
