//! Pre-flight validation of provider options.
//!
//! [`validate_config`] is pure and synchronous: it never opens a connection
//! or resolves an embedding, so it can run before anything expensive and
//! report every problem at once instead of failing on the first.

use quiver_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::filter::is_identifier;
use crate::options::{
    MemoryOptions, PineconeOptions, PostgresOptions, ProviderOptions, QdrantOptions, SqliteOptions,
};

// ============================================================================
// Types
// ============================================================================

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The adapter cannot be constructed.
    Error,
    /// The adapter works, possibly not as intended.
    Warning,
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Error or warning.
    pub severity: Severity,
    /// Issue code, e.g. `missing_field`.
    pub code: String,
    /// Option the issue refers to.
    pub field: String,
    /// Human-readable message.
    pub message: String,
}

/// Outcome of validating one provider's options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Provider that was validated.
    pub provider: String,
    /// `true` when there is no error-level issue.
    pub ok: bool,
    /// All findings, in check order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Create an empty (ok) report for `provider`.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ok: true,
            issues: Vec::new(),
        }
    }

    /// Add an error (marks the report as not ok).
    pub fn add_error(&mut self, code: &str, field: &str, message: impl Into<String>) {
        self.ok = false;
        self.push(Severity::Error, code, field, message.into());
    }

    /// Add a warning.
    pub fn add_warning(&mut self, code: &str, field: &str, message: impl Into<String>) {
        self.push(Severity::Warning, code, field, message.into());
    }

    fn push(&mut self, severity: Severity, code: &str, field: &str, message: String) {
        self.issues.push(ValidationIssue {
            severity,
            code: code.to_string(),
            field: field.to_string(),
            message,
        });
    }

    /// Error-level issues.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning-level issues.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Turn error-level issues into a configuration error.
    pub fn into_result(self) -> Result<Self> {
        if self.ok {
            return Ok(self);
        }
        let messages: Vec<String> = self
            .errors()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect();
        Err(Error::config(format!(
            "invalid {} options: {}",
            self.provider,
            messages.join("; ")
        )))
    }
}

// ============================================================================
// Validation functions
// ============================================================================

/// Validate `options` without touching the network or the filesystem.
pub fn validate_config(options: &ProviderOptions) -> ValidationReport {
    let mut report = ValidationReport::new(options.name());
    match options {
        ProviderOptions::Sqlite(o) => check_sqlite(o, &mut report),
        ProviderOptions::Postgres(o) => check_postgres(o, &mut report),
        ProviderOptions::Pinecone(o) => check_pinecone(o, &mut report),
        ProviderOptions::Qdrant(o) => check_qdrant(o, &mut report),
        ProviderOptions::Memory(o) => check_memory(o, &mut report),
    }
    report
}

/// Whether the Postgres store is compiled in.
pub fn postgres_available() -> bool {
    cfg!(feature = "store-postgres")
}

// ============================================================================
// Individual checks
// ============================================================================

fn check_sqlite(o: &SqliteOptions, report: &mut ValidationReport) {
    if o.path.trim().is_empty() {
        report.add_error("missing_field", "path", "a database path is required");
    } else if o.path == ":memory:" {
        report.add_warning(
            "not_persisted",
            "path",
            "in-memory database; documents are lost when the adapter closes",
        );
    }
    check_table(&o.table, report);
    check_dimensions(o.dimensions, report);
}

fn check_postgres(o: &PostgresOptions, report: &mut ValidationReport) {
    if !postgres_available() {
        report.add_error(
            "unavailable",
            "provider",
            "postgres support is not compiled in (enable the `store-postgres` feature)",
        );
    }
    if o.url.trim().is_empty() {
        report.add_error("missing_field", "url", "a connection URL is required");
    } else if !(o.url.starts_with("postgres://") || o.url.starts_with("postgresql://")) {
        report.add_error(
            "invalid_url",
            "url",
            "connection URL must start with postgres:// or postgresql://",
        );
    }
    check_table(&o.table, report);
    check_dimensions(o.dimensions, report);
    if o.max_connections == Some(0) {
        report.add_error("invalid_value", "max_connections", "must be greater than 0");
    }
}

fn check_pinecone(o: &PineconeOptions, report: &mut ValidationReport) {
    if o.api_key.trim().is_empty() {
        report.add_error("missing_field", "api_key", "an API key is required");
    }
    match (&o.host, &o.index) {
        (None, None) => report.add_error(
            "missing_field",
            "host",
            "either `host` or `index` is required",
        ),
        (Some(_), Some(_)) => report.add_warning(
            "ignored_field",
            "index",
            "both `host` and `index` are set; `host` is used",
        ),
        _ => {}
    }
    if let Some(url) = &o.controller_url {
        check_http_url(url, "controller_url", report);
    }
}

fn check_qdrant(o: &QdrantOptions, report: &mut ValidationReport) {
    if o.url.trim().is_empty() {
        report.add_error("missing_field", "url", "a REST endpoint URL is required");
    } else {
        check_http_url(&o.url, "url", report);
    }
    if o.collection.trim().is_empty() {
        report.add_error("missing_field", "collection", "a collection name is required");
    } else if !is_collection_name(&o.collection) {
        report.add_error(
            "invalid_identifier",
            "collection",
            format!("'{}' is not a valid collection name", o.collection),
        );
    }
    if o.api_key.is_none() {
        report.add_warning(
            "missing_credentials",
            "api_key",
            "no API key set; only unauthenticated servers will accept requests",
        );
    }
}

/// Qdrant collection names travel as a URL path segment.
fn is_collection_name(name: &str) -> bool {
    (1..=255).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && name != "."
        && name != ".."
}

fn check_memory(_o: &MemoryOptions, report: &mut ValidationReport) {
    report.add_warning(
        "not_persisted",
        "provider",
        "memory store; documents are lost when the process exits",
    );
}

fn check_table(table: &str, report: &mut ValidationReport) {
    if !is_identifier(table) {
        report.add_error(
            "invalid_identifier",
            "table",
            format!("'{table}' is not a valid SQL identifier"),
        );
    }
}

fn check_dimensions(dimensions: Option<usize>, report: &mut ValidationReport) {
    if dimensions == Some(0) {
        report.add_error("invalid_value", "dimensions", "must be greater than 0");
    }
}

fn check_http_url(url: &str, field: &str, report: &mut ValidationReport) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        report.add_error(
            "invalid_url",
            field,
            format!("'{url}' must start with http:// or https://"),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
