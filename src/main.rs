use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;

use bulkpipe::batch::{Batch, Batcher};
use bulkpipe::classify::ErrorSummary;
use bulkpipe::config::{IngestConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_IN_FLIGHT};
use bulkpipe::decode::JsonDecoder;
use bulkpipe::error::{Error, Result};
use bulkpipe::pipeline::chain::PipeExt;
use bulkpipe::pipeline::pipe::Pipe;
use bulkpipe::pipeline::runtime::Runtime;
use bulkpipe::sink::{BulkApi, BulkSink, ElasticClient};
use bulkpipe::source::{FsSource, StdinSource};
use bulkpipe::track::CompletionTracker;
use bulkpipe::Document;

const EXIT_NO_INDEX: u8 = 1;
const EXIT_PROCESSING: u8 = 2;
// Process exit codes are 8-bit; 401 truncates the same way exit(401) would.
const EXIT_UNAUTHORIZED: u8 = (401 % 256) as u8;

/// Stream JSON documents into an Elasticsearch index via the bulk API.
#[derive(Parser, Debug)]
#[command(name = "bulkpipe", version)]
struct Args {
    /// Elasticsearch base URI; falls back to the ELASTIC_URI environment
    /// variable, then to http://localhost:9200
    #[arg(long)]
    uri: Option<String>,

    /// Target index
    #[arg(long)]
    index: Option<String>,

    /// Documents per bulk request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// JSON file with index mappings, applied before ingestion
    #[arg(long)]
    mappings_file: Option<PathBuf>,

    /// Top-level key excluded from the content hash; repeatable
    #[arg(long = "exclude-key")]
    exclude_keys: Vec<String>,

    /// Create the index from the mappings file and exit without ingesting
    #[arg(long)]
    no_data: bool,

    /// Count skipped duplicates in the final summary
    #[arg(short, long)]
    verbose: bool,

    /// Upsert by --id-field instead of create-by-content-hash
    #[arg(long)]
    upsert: bool,

    /// Document field whose value becomes the write identifier in upsert mode
    #[arg(long, default_value = "")]
    id_field: String,

    /// Maximum concurrent in-flight bulk requests
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,

    /// Input file; reads stdin when omitted
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bulkpipe=info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            match err {
                Error::MissingIndex => ExitCode::from(EXIT_NO_INDEX),
                Error::Unauthorized { .. } => ExitCode::from(EXIT_UNAUTHORIZED),
                _ => ExitCode::from(EXIT_PROCESSING),
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let uri = args
        .uri
        .or_else(|| std::env::var("ELASTIC_URI").ok())
        .unwrap_or_else(|| "http://localhost:9200".to_owned());

    let mut config = IngestConfig::new(uri, args.index.unwrap_or_default())
        .batch_size(args.batch_size)
        .exclude_keys(args.exclude_keys)
        .verbose(args.verbose)
        .max_in_flight(args.max_in_flight);
    if args.upsert {
        config = config.upsert(args.id_field);
    }
    config.validate()?;

    let client = ElasticClient::new(&config.elastic_uri);

    if let Some(path) = &args.mappings_file {
        bootstrap(&client, &config.index, path).await?;
    }
    if args.no_data {
        return Ok(());
    }

    let config = Arc::new(config);
    match args.input {
        Some(path) => {
            let path = path.to_string_lossy().into_owned();
            ingest(FsSource::new(path), client, config).await
        }
        None => ingest(StdinSource::new(), client, config).await,
    }
}

/// Reads and applies the mappings file. An unreadable or unparseable file is
/// a configuration error; an already-existing index is not.
async fn bootstrap(client: &ElasticClient, index: &str, path: &PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::config(format!("cannot read mappings file {path:?}: {err}")))?;
    let mappings: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| Error::config(format!("cannot parse mappings file {path:?}: {err}")))?;
    client.create_index(index, &mappings).await
}

async fn ingest<S>(source: S, client: ElasticClient, config: Arc<IngestConfig>) -> Result<()>
where
    S: Pipe<(), Bytes> + Send + Sync + 'static,
{
    let tracker = Arc::new(CompletionTracker::new());
    let summary = Arc::new(ErrorSummary::new());

    let pipe = source
        .pipe::<Document, _>(JsonDecoder::new())
        .pipe::<Batch, _>(Batcher::new(config.batch_size, tracker.clone()))
        .pipe::<(), _>(BulkSink::new(client, config, tracker, summary));

    let rt = Runtime::new().buffer(16);
    let (tx, _rx, _cancel, handle) = rt.spawn(pipe);

    tx.send(())
        .await
        .map_err(|_| Error::pipeline("pipeline refused start signal"))?;
    drop(tx);

    handle.await??;
    Ok(())
}
