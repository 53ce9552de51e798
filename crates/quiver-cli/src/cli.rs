//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "quiver", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "QUIVER_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the store configuration without connecting.
    Validate,

    /// Index documents from a JSON Lines file.
    Index {
        /// File with one `{"id", "content", "metadata"}` object per line.
        file: String,

        /// Documents per index call.
        #[arg(short, long, default_value = "100")]
        batch_size: usize,
    },

    /// Search the store.
    Search {
        /// Query text.
        query: String,

        /// Maximum number of results.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Metadata filter as JSON, e.g. '{"lang": "rust", "stars": {"$gte": 10}}'.
        #[arg(short, long)]
        filter: Option<String>,

        /// Include document content.
        #[arg(long)]
        content: bool,

        /// Include document metadata.
        #[arg(long)]
        metadata: bool,

        /// Attach a snippet and highlights.
        #[arg(long)]
        snippet: bool,
    },

    /// Remove documents by id.
    Remove {
        /// Document ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Remove every document.
    Clear,

    /// Configuration operations.
    Config(ConfigCommand),

    /// Print version information.
    Version,
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML, secrets redacted.
    Show,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
