//! `docmind`: ingest extracted document text and ask questions about it.
//!
//! Provider and store settings come from the environment (a `.env` file is
//! loaded first); `--collection` and `--store` override the store settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use docmind_rag::{
    DocumentKind, Metadata, ProviderSettings, RagConfig, RagPipeline, SourceDocument, VectorIndex,
    build_embedding_provider, build_generation_provider,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docmind")]
#[command(about = "Ask questions about your documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Collection to operate on (overrides VECTOR_COLLECTION_NAME).
    #[arg(short, long, global = true)]
    collection: Option<String>,

    /// Directory holding collection artifacts (overrides VECTOR_STORE_PATH).
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Chunk, embed and store an extracted text file")]
    Ingest {
        #[arg(help = "Path to a UTF-8 text file produced by upstream extraction")]
        path: PathBuf,

        #[arg(short, long, value_enum, help = "Document kind (defaults to the file extension)")]
        kind: Option<KindArg>,

        #[arg(long, help = "Document id (defaults to the file stem)")]
        id: Option<String>,
    },

    #[command(about = "Answer a question from the stored documents")]
    Ask {
        question: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    #[command(about = "Show the stored texts most similar to a question")]
    Search {
        question: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    #[command(about = "Delete stored documents by id")]
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    #[command(about = "Show collection statistics")]
    Info,

    #[command(about = "Remove the collection and its artifacts")]
    Drop,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Text,
    Pdf,
    Docx,
    Image,
}

impl From<KindArg> for DocumentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Text => DocumentKind::Text,
            KindArg::Pdf => DocumentKind::Pdf,
            KindArg::Docx => DocumentKind::Docx,
            KindArg::Image => DocumentKind::Image,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ingest { path, kind, id } => ingest(config, &path, kind, id).await,
        Commands::Ask { question, top_k } => {
            let top_k = top_k.unwrap_or(config.top_k);
            let pipeline = build_pipeline(config)?;
            let output = pipeline.query(&question, top_k).await?;
            println!("{}", output.answer);
            Ok(())
        }
        Commands::Search { question, top_k } => {
            let top_k = top_k.unwrap_or(config.top_k);
            let pipeline = build_pipeline(config)?;
            for (rank, result) in pipeline.retrieve(&question, top_k).await?.iter().enumerate() {
                println!("{}. [{:.4}] {}", rank + 1, result.score, result.document_id);
                println!("   {}", result.text.replace('\n', " "));
            }
            Ok(())
        }
        Commands::Delete { ids } => {
            let index = VectorIndex::open(&config.store_path)?;
            let removed = index.delete_documents(&config.collection, &ids).await?;
            println!("Removed {removed} of {} document(s)", ids.len());
            Ok(())
        }
        Commands::Info => {
            let index = VectorIndex::open(&config.store_path)?;
            let info = index.collection_info(&config.collection).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Drop => {
            let index = VectorIndex::open(&config.store_path)?;
            index.delete_collection(&config.collection).await?;
            println!("Dropped collection '{}'", config.collection);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<RagConfig> {
    let env_config = RagConfig::from_env().context("invalid store configuration")?;
    let config = RagConfig::builder()
        .chunk_size(env_config.chunk_size)
        .chunk_overlap(env_config.chunk_overlap)
        .collection(cli.collection.clone().unwrap_or(env_config.collection))
        .store_path(cli.store.clone().unwrap_or(env_config.store_path))
        .build()?;
    Ok(config)
}

fn build_pipeline(config: RagConfig) -> Result<RagPipeline> {
    let settings = ProviderSettings::from_env().context("invalid provider configuration")?;
    info!(provider = ?settings.kind, collection = %config.collection, "starting pipeline");

    let index = Arc::new(VectorIndex::open(&config.store_path)?);
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(build_embedding_provider(&settings)?)
        .generation_provider(build_generation_provider(&settings)?)
        .index(index)
        .build()?;
    Ok(pipeline)
}

async fn ingest(
    config: RagConfig,
    path: &Path,
    kind: Option<KindArg>,
    id: Option<String>,
) -> Result<()> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let kind = match kind {
        Some(kind) => kind.into(),
        None => match DocumentKind::from_extension(extension) {
            Some(kind) => kind,
            None => bail!("cannot infer document kind from '{}'; pass --kind", path.display()),
        },
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let document_id = id.unwrap_or_else(|| {
        path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| filename.clone())
    });

    let document = SourceDocument {
        document_id,
        filename,
        source: path.display().to_string(),
        kind,
        text,
        metadata: Metadata::new(),
    };

    let pipeline = build_pipeline(config)?;
    let report = pipeline.ingest(&document).await?;
    println!(
        "Ingested '{}': {} chunk(s) from {} characters",
        report.document_id, report.chunks_processed, report.text_length
    );
    Ok(())
}
