//! Process-local vector client.
//!
//! Brute-force cosine similarity over a map held in memory. Used as a
//! zero-dependency store for tests and demos and, with
//! [`MemoryVectorClient::with_capabilities`], to exercise how callers handle
//! unsupported operations.

use async_trait::async_trait;
use quiver_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::rest::{Payload, RestMatch, RestRecord, RestVectorClient};
use crate::score::{ScoreScale, cosine_similarity};
use crate::types::Capabilities;

#[derive(Default)]
struct State {
    dimensions: Option<usize>,
    records: BTreeMap<String, (Vec<f32>, Payload)>,
}

/// In-memory [`RestVectorClient`].
pub struct MemoryVectorClient {
    state: Mutex<State>,
    capabilities: Capabilities,
}

impl MemoryVectorClient {
    /// Create an empty client supporting `remove` and `clear`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            capabilities: Capabilities {
                remove: true,
                clear: true,
                close: false,
                filter: false,
            },
        }
    }

    /// Override the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.records.len())
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))
    }
}

impl Default for MemoryVectorClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RestVectorClient for MemoryVectorClient {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn score_scale(&self) -> ScoreScale {
        ScoreScale::CosineSimilarity
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let mut state = self.lock()?;
        match state.dimensions {
            Some(existing) if existing != dimensions => Err(Error::DimensionMismatch {
                expected: existing,
                actual: dimensions,
            }),
            _ => {
                state.dimensions = Some(dimensions);
                Ok(())
            }
        }
    }

    async fn upsert(&self, records: Vec<RestRecord>) -> Result<()> {
        let mut state = self.lock()?;
        for record in records {
            state
                .records
                .insert(record.id, (record.vector, record.payload));
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RestMatch>> {
        let state = self.lock()?;
        let mut matches: Vec<RestMatch> = state
            .records
            .iter()
            .map(|(id, (stored, payload))| RestMatch {
                id: id.clone(),
                score: cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut state = self.lock()?;
        for id in ids {
            state.records.remove(id);
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.lock()?.records.clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryVectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVectorClient")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
