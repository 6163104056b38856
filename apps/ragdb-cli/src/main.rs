use anyhow::Result;
use clap::Parser as _;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use ragdb_core::config::Config;
use ragdb_core::loader::DocumentLoader;
use ragdb_core::{GenerativeModel, RagConfig};
use ragdb_engine::RagEngine;

mod cli;
mod providers;

use cli::{Cli, Commands, StoreKind};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ragdb=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let rag = config.rag()?;
    let providers = config.providers()?;

    let generator = match cli.command {
        Commands::Ask { .. } => providers::build_generator(&rag, &providers.generation)?,
        _ => providers::build_generator_or_placeholder(&rag, &providers.generation),
    };
    let embedder = providers::build_embedder(&rag, &providers.embedding)?;

    match cli.command {
        Commands::Ingest { paths, rebuild, ext } => {
            let engine = build_engine(cli.store, rag, generator, embedder).await?;
            handle_ingest(&engine, paths, rebuild, ext).await?;
        }
        Commands::Ask { question, sources } => {
            let engine = build_engine(cli.store, rag, generator, embedder).await?;
            handle_ask(&engine, &question, sources).await?;
        }
        Commands::Status => {
            let engine = build_engine(cli.store, rag, generator, embedder).await?;
            let status = engine.status().await?;
            println!("State:      {:?}", status.state);
            println!("Records:    {}", status.records);
            match status.dimension {
                Some(d) => println!("Dimension:  {d}"),
                None => println!("Dimension:  (not set)"),
            }
            println!("Embedding:  {}", status.embedding_model);
            println!("Generation: {}", status.generative_model);
            println!("Location:   {}", engine.config().persist_path().display());
        }
        Commands::Clear => {
            let engine = build_engine(cli.store, rag, generator, embedder).await?;
            engine.clear().await?;
            println!("✅ Index cleared");
        }
    }

    Ok(())
}

async fn build_engine(
    store: StoreKind,
    rag: RagConfig,
    generator: Arc<dyn GenerativeModel>,
    embedder: Arc<dyn ragdb_core::EmbeddingProvider>,
) -> Result<RagEngine> {
    let store = providers::open_store(store, &rag).await?;
    Ok(RagEngine::new(rag, embedder, generator, store).await?)
}

async fn handle_ingest(engine: &RagEngine, paths: Vec<PathBuf>, rebuild: bool, ext: Vec<String>) -> Result<()> {
    let loader = DocumentLoader::with_extensions(ext);

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} paths {msg}")?
            .progress_chars("#>-"),
    );
    let mut documents = Vec::new();
    for path in &paths {
        pb.set_message(path.display().to_string());
        documents.extend(loader.load_path(path)?);
        pb.inc(1);
    }
    pb.finish_with_message(format!("loaded {} documents", documents.len()));

    if documents.is_empty() {
        anyhow::bail!("no documents found under the given paths");
    }

    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("embedding {} documents", documents.len()));
    let report = if rebuild { engine.rebuild(documents).await } else { engine.ingest(documents).await };
    spinner.finish_and_clear();
    let report = report?;

    println!(
        "✅ Ingested {} documents as {} chunks ({} records in index)",
        report.documents, report.chunks, report.total_records
    );
    Ok(())
}

async fn handle_ask(engine: &RagEngine, question: &str, show_sources: bool) -> Result<()> {
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let result = engine.query_until(question, cancel).await?;

    println!("{}", result.answer.trim());
    if show_sources {
        println!();
        for (i, chunk) in result.sources.iter().enumerate() {
            println!("[{}] {} (chars {}..{})", i + 1, chunk.document_id, chunk.start_offset, chunk.end_offset);
            println!("    {}", chunk.text.replace('\n', " ").chars().take(200).collect::<String>());
        }
    }
    Ok(())
}
