mod settings;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    classify_folder, EmbedderBackend, ExtractiveResponder, LopdfReader, QueryAnswer,
    RagConfig, ResponderBackend, RetrievalOrchestrator, WorkerPool,
};
use settings::Overrides;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(long, default_value = settings::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Binary vector index file
    #[arg(long, env = "PDF_RAG_INDEX_PATH")]
    index_path: Option<PathBuf>,

    /// JSON document map file
    #[arg(long, env = "PDF_RAG_DOC_MAP_PATH")]
    doc_map_path: Option<PathBuf>,

    /// Worker count for page classification and chunking
    #[arg(long)]
    workers: Option<usize>,

    /// Process every PDF on a single worker
    #[arg(long, default_value_t = false)]
    no_parallel: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Classify, chunk and embed every PDF in a folder, appending to the index.
    Ingest {
        /// Folder containing the PDFs (not searched recursively).
        #[arg(long)]
        input_dir: PathBuf,
    },
    /// Answer a question from the index with source citations.
    Query {
        /// Question text
        #[arg(long)]
        query: String,
        /// Number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the ranked chunks with their distances.
        #[arg(long, default_value_t = false)]
        show_hits: bool,
    },
    /// Report text-bearing and image-only pages for every PDF in a folder.
    Classify {
        /// Folder containing the PDFs (not searched recursively).
        #[arg(long)]
        input_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        index_path: cli.index_path.clone(),
        doc_map_path: cli.doc_map_path.clone(),
        workers: cli.workers,
        no_parallel: cli.no_parallel,
        top_k: match &cli.command {
            Command::Query { top_k, .. } => *top_k,
            _ => None,
        },
    };
    let config = settings::load(&cli.config, &overrides).map_err(|error| {
        anyhow::anyhow!(
            "failed to load configuration from {}: {error}",
            cli.config.display()
        )
    })?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Ingest { input_dir } => ingest(config, input_dir).await,
        Command::Query {
            query, show_hits, ..
        } => answer(config, &query, show_hits).await,
        Command::Classify { input_dir } => classify(&config, input_dir),
    }
}

async fn ingest(config: RagConfig, input_dir: PathBuf) -> anyhow::Result<()> {
    let embedder =
        EmbedderBackend::from_settings(&config.embedder).context("embedder configuration")?;
    let orchestrator = RetrievalOrchestrator::new(
        config,
        embedder,
        ResponderBackend::Extractive(ExtractiveResponder),
    )?;

    let report = orchestrator
        .ingest(&input_dir)
        .await
        .with_context(|| format!("ingestion of {} failed", input_dir.display()))?;

    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
    }

    println!(
        "{} file(s) processed, {} skipped; {} text page(s), {} image-only page(s)",
        report.files_processed,
        report.skipped_files.len(),
        report.text_pages,
        report.image_pages
    );
    println!(
        "{} chunks ingested at {}; index now holds {} vectors",
        report.chunks_added,
        report.completed_at.to_rfc3339(),
        report.index_len
    );
    Ok(())
}

async fn answer(config: RagConfig, query: &str, show_hits: bool) -> anyhow::Result<()> {
    let embedder =
        EmbedderBackend::from_settings(&config.embedder).context("embedder configuration")?;
    let responder =
        ResponderBackend::from_settings(&config.responder).context("responder configuration")?;
    let orchestrator = RetrievalOrchestrator::new(config, embedder, responder)?;

    let answer = orchestrator.query(query).await.context("query failed")?;
    print_answer(&answer, show_hits);
    Ok(())
}

fn print_answer(answer: &QueryAnswer, show_hits: bool) {
    println!("query: {}", answer.query);
    println!("{}", answer.content);

    if !answer.citations.is_empty() {
        println!("\ncitations:");
        for citation in &answer.citations {
            println!("  - {citation}");
        }
    }

    if show_hits {
        if answer.hits.is_empty() {
            println!("\nno results found");
        }
        for (rank, hit) in answer.hits.iter().enumerate() {
            println!("\nrank {}: id={} distance={:.4}", rank + 1, hit.chunk_id, hit.distance);
            println!("{}", hit.text);
        }
    }
}

fn classify(config: &RagConfig, input_dir: PathBuf) -> anyhow::Result<()> {
    config.validate()?;
    let pool = WorkerPool::new(config.worker_count())?;
    let results = classify_folder(&LopdfReader, &pool, &input_dir)?;

    if results.is_empty() {
        println!("no pdf files found in {}", input_dir.display());
    }
    for (file, pages) in results {
        println!("file: {file}");
        println!("  text pages: {:?}", pages.text_pages);
        println!("  image pages: {:?}", pages.image_pages);
        if pages.gaps() > 0 {
            println!("  unclassified pages: {}", pages.gaps());
        }
    }
    Ok(())
}
