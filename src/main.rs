use clap::{Parser, Subcommand};
use docs_rag::Result;
use docs_rag::commands::{
    ask, build_index, clear_history, count_history, search, show_history, summarize_history,
};
use docs_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Answer questions from a local document folder, with per-user conversation memory")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and relative data paths (default: ~/.docs-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build or refresh the chunk manifest and vector index
    Index,
    /// Print the document chunks nearest to a query
    Search {
        query: String,
        /// Number of chunks to return
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Ask questions interactively
    Ask {
        /// Whose conversation history to use
        #[arg(long, default_value = "user")]
        user: String,
    },
    /// Inspect or manage stored conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print every stored exchange
    Show { user: String },
    /// Delete the user's history
    Clear { user: String },
    /// Print how many exchanges are stored
    Count { user: String },
    /// Summarize what the user has asked about and been told
    Summarize { user: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Index => build_index(&config)?,
        Commands::Search { query, k } => search(&config, &query, k)?,
        Commands::Ask { user } => ask(&config, &user)?,
        Commands::History { action } => match action {
            HistoryAction::Show { user } => show_history(&config, &user)?,
            HistoryAction::Clear { user } => clear_history(&config, &user)?,
            HistoryAction::Count { user } => count_history(&config, &user)?,
            HistoryAction::Summarize { user } => summarize_history(&config, &user)?,
        },
    }

    Ok(())
}
