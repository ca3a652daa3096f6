//! Outcome oracle boundary.
//!
//! The search treats the classifier under explanation as a black box: any
//! model that maps a batch of cases to desired-outcome probabilities can
//! drive it. [`LinearOracle`] is a small built-in implementation for tests,
//! benchmarks, and smoke runs.

use serde::{Deserialize, Serialize};

use crate::schema::{Cases, ImprovementMode};

/// Probabilities are clamped to this range before forming odds.
const ODDS_CLAMP: f64 = 1e-7;

/// Errors surfaced by oracle implementations and their callers.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle prediction failed: {0}")]
    Prediction(String),

    #[error("Oracle returned {actual} scores for {expected} cases")]
    OutputLength { expected: usize, actual: usize },

    #[error("Oracle expects {expected} features per position but cases carry {actual}")]
    FeatureWidth { expected: usize, actual: usize },
}

/// Classifier under explanation.
///
/// `predict` returns one desired-outcome probability in `[0, 1]` per case,
/// in case order. Implementations run on worker threads during scoring and
/// must be `Send + Sync`.
pub trait OutcomeOracle: Send + Sync {
    fn predict(&self, cases: &Cases) -> Result<Vec<f64>, OracleError>;
}

/// Logistic model over mean-pooled position features.
///
/// Each case is pooled to one vector by averaging its occupied positions'
/// features, then scored as `sigmoid(w . pooled + bias)`. A case with no
/// occupied positions pools to zeros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearOracle {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearOracle {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        LinearOracle { weights, bias }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl OutcomeOracle for LinearOracle {
    fn predict(&self, cases: &Cases) -> Result<Vec<f64>, OracleError> {
        if cases.num_features() != self.weights.len() {
            return Err(OracleError::FeatureWidth {
                expected: self.weights.len(),
                actual: cases.num_features(),
            });
        }
        let nf = cases.num_features();
        let mut scores = Vec::with_capacity(cases.len());
        for case in 0..cases.len() {
            let mut pooled = vec![0.0; nf];
            let mut occupied = 0usize;
            for (pos, &event) in cases.events_row(case).iter().enumerate() {
                if event == 0 {
                    continue;
                }
                for (p, v) in pooled.iter_mut().zip(cases.feature_at(case, pos)) {
                    *p += v;
                }
                occupied += 1;
            }
            if occupied > 0 {
                for p in &mut pooled {
                    *p /= occupied as f64;
                }
            }
            let logit: f64 = self
                .weights
                .iter()
                .zip(&pooled)
                .map(|(w, p)| w * p)
                .sum::<f64>()
                + self.bias;
            scores.push(sigmoid(logit));
        }
        Ok(scores)
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
fn odds(p: f64) -> f64 {
    let p = p.clamp(ODDS_CLAMP, 1.0 - ODDS_CLAMP);
    p / (1.0 - p)
}

/// Raw and normalized improvement of a candidate probability over the
/// factual's.
///
/// `Difference` keeps the signed gap and maps `[-1, 1]` onto `[0, 1]`.
/// `OddsRatio` forms the candidate-to-factual odds ratio and squashes it
/// through `r / (1 + r)`, so parity lands on 0.5 either way.
pub fn improvement(mode: ImprovementMode, p_factual: f64, p_candidate: f64) -> (f64, f64) {
    match mode {
        ImprovementMode::Difference => {
            let raw = p_candidate - p_factual;
            (raw, (raw + 1.0) / 2.0)
        }
        ImprovementMode::OddsRatio => {
            let raw = odds(p_candidate) / odds(p_factual);
            (raw, raw / (1.0 + raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_case(events: Vec<u32>, features: Vec<f64>, nf: usize) -> Cases {
        let max_len = events.len();
        Cases::new(events, features, max_len, nf).unwrap()
    }

    #[test]
    fn test_linear_oracle_orders_by_logit() {
        let oracle = LinearOracle::new(vec![1.0, 0.0], 0.0);
        let low = single_case(vec![1, 1], vec![-2.0, 9.0, -2.0, 9.0], 2);
        let high = single_case(vec![1, 1], vec![2.0, 9.0, 2.0, 9.0], 2);

        let p_low = oracle.predict(&low).unwrap()[0];
        let p_high = oracle.predict(&high).unwrap()[0];
        assert!(p_low < 0.5);
        assert!(p_high > 0.5);
        assert!(p_low < p_high);
    }

    #[test]
    fn test_linear_oracle_ignores_padding() {
        let oracle = LinearOracle::new(vec![1.0], 0.0);
        // Padding position carries a huge feature value that must not count.
        let cases = single_case(vec![1, 0], vec![1.0, 1e6], 1);
        let p = oracle.predict(&cases).unwrap()[0];
        assert!((p - sigmoid(1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_linear_oracle_empty_sequence_scores_bias() {
        let oracle = LinearOracle::new(vec![3.0], -1.0);
        let cases = single_case(vec![0, 0], vec![5.0, 5.0], 1);
        let p = oracle.predict(&cases).unwrap()[0];
        assert!((p - sigmoid(-1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_linear_oracle_rejects_width_mismatch() {
        let oracle = LinearOracle::new(vec![1.0, 1.0, 1.0], 0.0);
        let cases = single_case(vec![1], vec![1.0, 2.0], 2);
        assert!(matches!(
            oracle.predict(&cases),
            Err(OracleError::FeatureWidth {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_difference_improvement() {
        let (raw, norm) = improvement(ImprovementMode::Difference, 0.2, 0.9);
        assert!((raw - 0.7).abs() < 1e-12);
        assert!((norm - 0.85).abs() < 1e-12);

        // No change sits at the midpoint.
        let (raw, norm) = improvement(ImprovementMode::Difference, 0.4, 0.4);
        assert_eq!(raw, 0.0);
        assert_eq!(norm, 0.5);

        // Worst case maps to zero.
        let (_, norm) = improvement(ImprovementMode::Difference, 1.0, 0.0);
        assert_eq!(norm, 0.0);
    }

    #[test]
    fn test_odds_ratio_improvement() {
        // odds(0.8) = 4, odds(0.5) = 1.
        let (raw, norm) = improvement(ImprovementMode::OddsRatio, 0.5, 0.8);
        assert!((raw - 4.0).abs() < 1e-9);
        assert!((norm - 0.8).abs() < 1e-9);

        // Parity also lands on the midpoint.
        let (raw, norm) = improvement(ImprovementMode::OddsRatio, 0.3, 0.3);
        assert!((raw - 1.0).abs() < 1e-12);
        assert!((norm - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_odds_ratio_saturated_probabilities_stay_finite() {
        let (raw, norm) = improvement(ImprovementMode::OddsRatio, 0.0, 1.0);
        assert!(raw.is_finite());
        assert!(norm.is_finite());
        assert!(norm > 0.999);

        let (raw, norm) = improvement(ImprovementMode::OddsRatio, 1.0, 0.0);
        assert!(raw > 0.0);
        assert!(norm < 0.001);
    }
}
