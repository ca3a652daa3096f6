//! Per-position feature distances for the edit-distance engine.

use serde::{Deserialize, Serialize};

/// Distance between two per-position feature vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureMetric {
    /// Number of differing entries. Drives the sparsity measure.
    #[default]
    CountDiffs,
    /// Euclidean norm of the difference. Drives the similarity measure.
    Euclidean,
    /// Cosine distance. Zero vectors yield distance 1 instead of NaN, so
    /// indels cost one unit under this metric.
    Cosine,
}

impl FeatureMetric {
    /// Distance between two vectors of equal length.
    #[inline]
    pub fn between(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            FeatureMetric::CountDiffs => {
                a.iter().zip(b).filter(|(x, y)| x != y).count() as f64
            }
            FeatureMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            FeatureMetric::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let nb: f64 = b.iter().map(|y| y * y).sum::<f64>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
        }
    }

    /// Distance from a vector to the zero vector. This is the default cost
    /// of deleting or inserting the position that carries `a`.
    #[inline]
    pub fn to_zero(&self, a: &[f64]) -> f64 {
        match self {
            FeatureMetric::CountDiffs => a.iter().filter(|x| **x != 0.0).count() as f64,
            FeatureMetric::Euclidean => a.iter().map(|x| x * x).sum::<f64>().sqrt(),
            FeatureMetric::Cosine => 1.0,
        }
    }
}
