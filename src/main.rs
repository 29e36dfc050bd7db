use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kbqa::cli;
use kbqa::config::Settings;

#[derive(Parser)]
#[command(name = "kbqa")]
#[command(about = "Knowledge-base question answering with a locally hosted model", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed knowledge-base files into the vector index
    Ingest {
        /// Knowledge-base directory (default: KB_PATH)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Index directory (default: PERSIST_DIRECTORY)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Answer a question from the knowledge base
    Ask {
        /// The question
        question: String,

        /// Number of snippets to retrieve (default: RETRIEVAL_TOP_K)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show detected capabilities and the backend that would be used
    Backends,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kbqa=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Ingest {
            input,
            index,
            recursive,
        } => {
            cli::ingest(settings, input, index, recursive).await?;
        }

        Commands::Ask { question, top_k } => {
            cli::ask(settings, question, top_k).await?;
        }

        Commands::Backends => {
            cli::backends(settings).await?;
        }
    }

    Ok(())
}
