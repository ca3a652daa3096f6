//! Bernoulli and multinoulli emissions for discrete feature groups.
//!
//! Both distributions score a row through its log mass with probabilities
//! clamped away from zero, so a value never seen in training degrades the
//! score instead of collapsing it to negative infinity. Fractional
//! activations are scored as-is: the exponent interpolates between the
//! pure outcomes.

use serde::{Deserialize, Serialize};

/// Probabilities are clamped to `[PROB_FLOOR, 1 - PROB_FLOOR]` before
/// taking logs.
pub(crate) const PROB_FLOOR: f64 = 1e-10;

#[inline]
fn clamp_prob(p: f64) -> f64 {
    p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR)
}

/// Single binary indicator column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BernoulliGroup {
    /// Probability of the column being active.
    pub p: f64,
    /// Number of training rows behind the estimate.
    pub support: usize,
}

impl BernoulliGroup {
    /// Estimate activation probability from the column's training values.
    pub fn from_values(values: &[f64]) -> BernoulliGroup {
        let n = values.len();
        let positives = values.iter().filter(|v| **v > 0.5).count();
        let p = if n == 0 {
            0.0
        } else {
            positives as f64 / n as f64
        };
        BernoulliGroup { p, support: n }
    }

    /// Log mass of one activation value.
    pub fn log_mass(&self, x: f64) -> f64 {
        let p = clamp_prob(self.p);
        x * p.ln() + (1.0 - x) * (1.0 - p).ln()
    }

    /// Draw 0.0 or 1.0.
    pub fn sample<R: rand::Rng>(&self, rng: &mut R) -> f64 {
        if rng.r#gen::<f64>() < self.p { 1.0 } else { 0.0 }
    }
}

/// One-hot categorical block spanning several columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultinoulliGroup {
    /// Per-column activation probabilities, normalized over the block.
    pub probs: Vec<f64>,
    /// Number of training rows behind the estimate.
    pub support: usize,
}

impl MultinoulliGroup {
    /// Estimate category probabilities from training rows restricted to the
    /// block's columns. Rows with no active column contribute nothing, and a
    /// block with no signal at all keeps zero probabilities.
    pub fn from_rows(rows: &[Vec<f64>]) -> MultinoulliGroup {
        let width = rows.first().map_or(0, Vec::len);
        let mut sums = vec![0.0; width];
        for row in rows {
            for (s, v) in sums.iter_mut().zip(row.iter()) {
                *s += v;
            }
        }
        let total: f64 = sums.iter().sum();
        let probs = if total > 0.0 {
            sums.iter().map(|s| s / total).collect()
        } else {
            sums
        };
        MultinoulliGroup {
            probs,
            support: rows.len(),
        }
    }

    /// Log mass of one block row. An all-zero row scores 0 (probability 1):
    /// absence of a category is no evidence either way.
    pub fn log_mass(&self, x: &[f64]) -> f64 {
        x.iter()
            .zip(&self.probs)
            .filter(|(xi, _)| **xi != 0.0)
            .map(|(xi, p)| xi * clamp_prob(*p).ln())
            .sum()
    }

    /// Draw a one-hot row, or an all-zero row when the block carries no
    /// training signal.
    pub fn sample_into<R: rand::Rng>(&self, rng: &mut R, out: &mut [f64]) {
        out.fill(0.0);
        let total: f64 = self.probs.iter().sum();
        if total <= 0.0 {
            return;
        }
        let draw = rng.r#gen::<f64>() * total;
        let mut acc = 0.0;
        for (i, p) in self.probs.iter().enumerate() {
            acc += p;
            if draw < acc {
                out[i] = 1.0;
                return;
            }
        }
        out[self.probs.len() - 1] = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_bernoulli_estimate() {
        let group = BernoulliGroup::from_values(&[1.0, 0.0, 1.0, 1.0]);
        assert!((group.p - 0.75).abs() < 1e-12);
        assert_eq!(group.support, 4);
    }

    #[test]
    fn test_bernoulli_zero_positives_scores_absence_as_certain() {
        let group = BernoulliGroup::from_values(&[0.0, 0.0, 0.0]);
        assert_eq!(group.p, 0.0);
        // ln(1 - floor) is effectively zero.
        assert!(group.log_mass(0.0).abs() < 1e-9);
        // An activation is heavily penalized but stays finite.
        let active = group.log_mass(1.0);
        assert!(active.is_finite());
        assert!(active < -20.0);
    }

    #[test]
    fn test_bernoulli_even_split() {
        let group = BernoulliGroup::from_values(&[1.0, 0.0]);
        let half = 0.5f64.ln();
        assert!((group.log_mass(1.0) - half).abs() < 1e-12);
        assert!((group.log_mass(0.0) - half).abs() < 1e-12);
    }

    #[test]
    fn test_bernoulli_sampling_is_binary() {
        let group = BernoulliGroup::from_values(&[1.0, 0.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let v = group.sample(&mut rng);
            assert!(v == 0.0 || v == 1.0);
        }
    }

    #[test]
    fn test_multinoulli_one_hot_mass() {
        let rows = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let group = MultinoulliGroup::from_rows(&rows);
        assert!((group.probs[0] - 0.5).abs() < 1e-12);
        assert!((group.log_mass(&[1.0, 0.0, 0.0]) - 0.5f64.ln()).abs() < 1e-12);
        assert!((group.log_mass(&[0.0, 1.0, 0.0]) - 0.25f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_multinoulli_all_zero_row_is_free() {
        let rows = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let group = MultinoulliGroup::from_rows(&rows);
        assert_eq!(group.log_mass(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_multinoulli_unseen_category_stays_finite() {
        let rows = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        let group = MultinoulliGroup::from_rows(&rows);
        let mass = group.log_mass(&[0.0, 1.0]);
        assert!(mass.is_finite());
        assert!(mass < -20.0);
    }

    #[test]
    fn test_multinoulli_silent_block_samples_zeros() {
        let rows = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let group = MultinoulliGroup::from_rows(&rows);
        let mut rng = StdRng::seed_from_u64(7);
        let mut out = vec![9.0; 2];
        group.sample_into(&mut rng, &mut out);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_multinoulli_samples_are_one_hot() {
        let rows = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
        let group = MultinoulliGroup::from_rows(&rows);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let mut out = vec![0.0; 3];
            group.sample_into(&mut rng, &mut out);
            let ones = out.iter().filter(|v| **v == 1.0).count();
            let zeros = out.iter().filter(|v| **v == 0.0).count();
            assert_eq!(ones, 1);
            assert_eq!(zeros, 2);
        }
    }
}
