//! The Quiver CLI application.
//!
//! [`QuiverCli`] owns the loaded configuration and dispatches commands.
//! Store commands open one adapter per invocation and close it afterwards
//! when the backend supports closing.

use crate::cli::{CliArgs, Command};
use crate::config::QuiverConfig;
use crate::config_handlers;
use crate::store_handlers::{self, SearchOptions};
use quiver_core::{Error, Result};
use quiver_vector::{Severity, ValidationReport, VectorAdapter, create_adapter, validate_config};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// QuiverCli
// ============================================================================

/// The CLI application.
pub struct QuiverCli {
    name: String,
    config: QuiverConfig,
    version: String,
}

impl QuiverCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(name: impl Into<String>, args: &CliArgs) -> Result<Self> {
        let config = QuiverConfig::load(args.config.as_deref())?;
        Ok(Self::new(name, config))
    }

    /// Create a new CLI application.
    pub fn new(name: impl Into<String>, config: QuiverConfig) -> Self {
        Self {
            name: name.into(),
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// The loaded configuration.
    pub fn config(&self) -> &QuiverConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // Ignore error if a subscriber is already set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);
        tracing::debug!(
            store = self.config.store.name(),
            embedding = ?self.config.embedding.provider,
            "Loaded configuration"
        );

        match args.command {
            Some(Command::Version) => {
                println!("{} {}", self.name, self.version);
                Ok(())
            }
            Some(Command::Validate) => {
                let report = validate_config(&self.config.store);
                print_report(&report);
                report.into_result().map(|_| ())
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            Some(command) => {
                let adapter = self.open_adapter().await?;
                let result = self.run_store_command(adapter.as_ref(), command).await;
                close_after(adapter.as_ref(), result).await
            }
            None => {
                println!("{} {} (use --help for usage)", self.name, self.version);
                Ok(())
            }
        }
    }

    /// Build the adapter described by the configuration.
    pub async fn open_adapter(&self) -> Result<Box<dyn VectorAdapter>> {
        let embedding = self.config.embedding.to_embedding_config()?;
        create_adapter(&self.config.store, Some(Arc::new(embedding))).await
    }

    async fn run_store_command(&self, adapter: &dyn VectorAdapter, command: Command) -> Result<()> {
        match command {
            Command::Index { file, batch_size } => {
                let summary = store_handlers::handle_index(adapter, Path::new(&file), batch_size).await?;
                println!(
                    "Indexed {} documents into {} ({} dimensions)",
                    summary.indexed,
                    adapter.name(),
                    summary.dimensions
                );
                Ok(())
            }
            Command::Search {
                query,
                limit,
                filter,
                content,
                metadata,
                snippet,
            } => {
                let options = SearchOptions {
                    query,
                    limit,
                    filter,
                    content,
                    metadata,
                    snippet,
                };
                for result in store_handlers::handle_search(adapter, options).await? {
                    println!("{}", serde_json::to_string(&result)?);
                }
                Ok(())
            }
            Command::Remove { ids } => {
                let removed = store_handlers::handle_remove(adapter, &ids).await?;
                println!("Removed {removed} ids from {}", adapter.name());
                Ok(())
            }
            Command::Clear => {
                store_handlers::handle_clear(adapter).await?;
                println!("Cleared {}", adapter.name());
                Ok(())
            }
            other => Err(Error::operation(format!("not a store command: {other:?}"))),
        }
    }
}

/// Close `adapter` when it supports closing. A command error wins over a
/// close error.
async fn close_after(adapter: &dyn VectorAdapter, result: Result<()>) -> Result<()> {
    let closed = if adapter.capabilities().close {
        adapter.close().await
    } else {
        Ok(())
    };
    result.and(closed)
}

/// Print a validation report, one issue per line.
fn print_report(report: &ValidationReport) {
    let status = if report.ok { "ok" } else { "invalid" };
    println!("{}: {status}", report.provider);
    for issue in &report.issues {
        let severity = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!("  {severity} [{}] {}: {}", issue.code, issue.field, issue.message);
    }
}

// ============================================================================
// Tests
// ============================================================================
