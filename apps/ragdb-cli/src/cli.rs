use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragdb")]
#[command(about = "Ask questions over your own documents", long_about = None)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = StoreKind::Flat, global = true, help = "Vector store backend")]
    pub store: StoreKind,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// JSON snapshot under `persist_directory`
    Flat,
    /// LanceDB table under `persist_directory` (needs the `lance` feature)
    Lance,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Chunk, embed and store files or directories")]
    Ingest {
        #[arg(required = true, help = "Files or directories to ingest")]
        paths: Vec<PathBuf>,

        #[arg(long, help = "Drop the existing index first")]
        rebuild: bool,

        #[arg(long, value_delimiter = ',', default_value = "txt,md", help = "File extensions to pick up")]
        ext: Vec<String>,
    },

    #[command(about = "Answer a question from the ingested documents")]
    Ask {
        #[arg(help = "The question")]
        question: String,

        #[arg(short, long, help = "Print the supporting passages")]
        sources: bool,
    },

    #[command(about = "Show index state")]
    Status,

    #[command(about = "Remove every ingested record")]
    Clear,
}
