//! Handler functions for store commands.
//!
//! Each handler takes an opened adapter and returns what it did, so the
//! caller decides how to print it.

use quiver_core::{Error, Result};
use quiver_vector::snippet::DEFAULT_CONTEXT_LINES;
use quiver_vector::{
    IndexSummary, VectorAdapter, VectorDocument, VectorSearchFilter, VectorSearchParams,
    VectorSearchResult,
};
use std::io::BufRead;
use std::path::Path;

// ============================================================================
// Input parsing
// ============================================================================

/// Read one [`VectorDocument`] per non-blank line.
pub fn load_documents(path: &Path) -> Result<Vec<VectorDocument>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut documents = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: VectorDocument = serde_json::from_str(&line).map_err(|e| {
            Error::invalid_data(format!("{}:{}: {e}", path.display(), index + 1))
        })?;
        documents.push(doc);
    }
    Ok(documents)
}

/// Parse a `--filter` argument.
pub fn parse_filter(raw: &str) -> Result<VectorSearchFilter> {
    serde_json::from_str(raw).map_err(|e| Error::invalid_filter(format!("{raw}: {e}")))
}

// ============================================================================
// Handlers
// ============================================================================

/// Options for [`handle_search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Query text.
    pub query: String,
    /// Maximum number of results.
    pub limit: usize,
    /// Raw JSON filter.
    pub filter: Option<String>,
    /// Include content.
    pub content: bool,
    /// Include metadata.
    pub metadata: bool,
    /// Attach snippets.
    pub snippet: bool,
}

/// Index a JSON Lines file in batches of `batch_size`.
pub async fn handle_index(
    adapter: &dyn VectorAdapter,
    path: &Path,
    batch_size: usize,
) -> Result<IndexSummary> {
    if batch_size == 0 {
        return Err(Error::config("batch size must be greater than 0"));
    }
    let documents = load_documents(path)?;
    log::info!("Indexing {} documents from {}", documents.len(), path.display());

    let mut total = IndexSummary {
        indexed: 0,
        dimensions: adapter.dimensions(),
    };
    for batch in documents.chunks(batch_size) {
        let summary = adapter.index(batch).await?;
        total.indexed += summary.indexed;
        log::debug!("Indexed batch of {} ({} total)", summary.indexed, total.indexed);
    }
    Ok(total)
}

/// Run a search.
pub async fn handle_search(
    adapter: &dyn VectorAdapter,
    options: SearchOptions,
) -> Result<Vec<VectorSearchResult>> {
    let mut params = VectorSearchParams::new(options.query).with_limit(options.limit);
    if let Some(raw) = &options.filter {
        params = params.with_filters(parse_filter(raw)?);
    }
    if options.content {
        params = params.with_content();
    }
    if options.metadata {
        params = params.with_metadata();
    }
    if options.snippet {
        params = params.with_snippet(DEFAULT_CONTEXT_LINES);
    }
    adapter.search(&params).await
}

/// Remove documents by id.
pub async fn handle_remove(adapter: &dyn VectorAdapter, ids: &[String]) -> Result<usize> {
    adapter.remove(ids).await?;
    Ok(ids.len())
}

/// Remove every document.
pub async fn handle_clear(adapter: &dyn VectorAdapter) -> Result<()> {
    adapter.clear().await
}

// ============================================================================
// Tests
// ============================================================================
