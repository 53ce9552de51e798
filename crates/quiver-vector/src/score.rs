//! Score normalization.
//!
//! Every backend reports closeness on its own scale. [`ScoreScale`] maps a
//! backend-native value into `[0, 1]`, higher meaning more similar, so that
//! results are comparable across adapters.

use serde::{Deserialize, Serialize};

/// Native scale of a backend's distance or similarity value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    /// Cosine distance in `[0, 2]`: `max(0, 1 - d)`.
    CosineDistance,
    /// Cosine similarity in `[-1, 1]`, negatives treated as unrelated: `max(0, s)`.
    CosineSimilarity,
    /// Similarity or inner product in `[-1, 1]`: `(s + 1) / 2`.
    Similarity,
    /// Already in `[0, 1]`.
    Unit,
}

impl ScoreScale {
    /// Map a native value into `[0, 1]`. `NaN` maps to `0`.
    pub fn normalize(self, raw: f32) -> f32 {
        let score = match self {
            Self::CosineDistance => 1.0 - raw,
            Self::CosineSimilarity | Self::Unit => raw,
            Self::Similarity => (raw + 1.0) / 2.0,
        };
        clamp_unit(score)
    }
}

/// Clamp into `[0, 1]`, mapping `NaN` to `0`.
pub fn clamp_unit(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Cosine similarity of two vectors; `0` when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = l2_norm(a) * l2_norm(b);
    if norm > 0.0 { dot / norm } else { 0.0 }
}

/// Euclidean norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
