//! Command-line interface for Quiver.
//!
//! Loads a [`QuiverConfig`](config::QuiverConfig), opens the configured
//! store through [`quiver_vector::create_adapter`] and runs one command
//! against it.

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod store_handlers;

pub use app::QuiverCli;
pub use cli::{CliArgs, Command};
pub use config::{EmbeddingBackend, EmbeddingSettings, QuiverConfig};
