//! # DocumentGPT CLI (`docgpt`)
//!
//! ## Usage
//!
//! ```bash
//! docgpt --config ./config/docgpt.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docgpt ingest <path>` | Ingest one file and print chunk and cache stats |
//! | `docgpt search <path> "<query>"` | Ingest a file and print the nearest chunks |
//! | `docgpt chat [--file <path>]` | Chat about an uploaded document |
//! | `docgpt echo` | Ungated chat that echoes every message |
//!
//! ## Examples
//!
//! ```bash
//! # Embed a report (second run is served from the disk cache)
//! docgpt ingest ./reports/q3.pdf
//!
//! # Top 2 chunks for a question
//! docgpt search ./reports/q3.pdf "what drove revenue?" --k 2
//!
//! # Interactive chat with the report preloaded
//! docgpt chat --file ./reports/q3.pdf
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use document_gpt::{config, ingest, repl, search};

/// DocumentGPT: chat with your document.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "docgpt",
    about = "DocumentGPT: upload a document, index it, and chat about it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docgpt.toml")]
    config: PathBuf,

    /// Log pipeline progress to stderr (same as `RUST_LOG=info`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file: store it, split it, and embed every chunk.
    ///
    /// Chunk embeddings are cached on disk, so re-ingesting unchanged text
    /// makes no provider calls.
    Ingest {
        /// File to ingest (`.txt`, `.md`, `.pdf`, `.docx`).
        path: PathBuf,
    },

    /// Ingest a file and print the chunks most similar to a query.
    Search {
        /// File to search.
        path: PathBuf,

        /// The query string.
        query: String,

        /// Number of chunks to return. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Chat about a document.
    ///
    /// Input is gated until a file is selected, either with `--file` or the
    /// `/open <path>` command. `/close` deselects and clears the history,
    /// `/history` repaints it, `/quit` exits.
    Chat {
        /// File to select before the first prompt.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Ungated chat that replies `You said: <message>`.
    Echo,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { path } => {
            ingest::run_ingest(&cfg, &path).await?;
        }
        Commands::Search { path, query, k } => {
            search::run_search(&cfg, &path, &query, k).await?;
        }
        Commands::Chat { file } => {
            repl::run_chat(&cfg, file).await?;
        }
        Commands::Echo => {
            repl::run_echo(&cfg).await?;
        }
    }

    Ok(())
}
