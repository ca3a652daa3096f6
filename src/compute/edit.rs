//! Damerau-Levenshtein distance over event sequences with feature-aware
//! position costs.
//!
//! # Overview
//!
//! Costs are driven by a [`FeatureMetric`] over the per-position feature
//! vectors:
//!
//! - deleting position i of `a` costs `dist(features_a[i], 0)`,
//! - inserting position j of `b` costs `dist(features_b[j], 0)`,
//! - substituting costs `dist(features_a[i], features_b[j])` when the event
//!   ids match (same activity, drifted features), and the sum of both
//!   deletion/insertion defaults when they differ,
//! - transposing is allowed when adjacent event ids are swapped.
//!
//! Padding positions carry zero features, so they cost nothing to delete or
//! insert and align freely.
//!
//! Two implementations produce identical results: [`EditDistance::pair`]
//! runs the straightforward full-table DP for one pair, and
//! [`EditDistance::batch`] runs a three-row rolling DP per candidate,
//! parallelized over the batch.

use rayon::prelude::*;

use crate::schema::{Cases, CasesError};

use super::distance::FeatureMetric;

/// Raw distance plus the per-pair normalizing constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditOutcome {
    /// Damerau-Levenshtein distance.
    pub raw: f64,
    /// Cost of deleting all of `a` and inserting all of `b`, the worst
    /// corner path through the DP table.
    pub bound: f64,
}

impl EditOutcome {
    /// Similarity in [0, 1]: identical pairs score 1, maximally distant
    /// pairs score 0. Two empty sequences are identical.
    pub fn normalized(&self) -> f64 {
        if self.bound <= f64::EPSILON {
            if self.raw <= f64::EPSILON { 1.0 } else { 0.0 }
        } else {
            (1.0 - self.raw / self.bound).clamp(0.0, 1.0)
        }
    }
}

/// Damerau-Levenshtein engine for one feature metric.
#[derive(Debug, Clone, Copy)]
pub struct EditDistance {
    metric: FeatureMetric,
}

impl EditDistance {
    /// Engine using the given per-position metric.
    pub fn new(metric: FeatureMetric) -> Self {
        Self { metric }
    }

    /// The configured metric.
    pub fn metric(&self) -> FeatureMetric {
        self.metric
    }

    /// Straightforward full-table DP for a single pair. Reference
    /// implementation; `batch` must agree with it exactly.
    pub fn pair(
        &self,
        a_events: &[u32],
        a_features: &[f64],
        b_events: &[u32],
        b_features: &[f64],
        num_features: usize,
    ) -> EditOutcome {
        let la = a_events.len();
        let lb = b_events.len();
        let ft_a = |i: usize| &a_features[i * num_features..(i + 1) * num_features];
        let ft_b = |j: usize| &b_features[j * num_features..(j + 1) * num_features];

        let del: Vec<f64> = (0..la).map(|i| self.metric.to_zero(ft_a(i))).collect();
        let ins: Vec<f64> = (0..lb).map(|j| self.metric.to_zero(ft_b(j))).collect();

        let w = lb + 1;
        let mut d = vec![0.0f64; (la + 1) * w];
        for i in 1..=la {
            d[i * w] = d[(i - 1) * w] + del[i - 1];
        }
        for j in 1..=lb {
            d[j] = d[j - 1] + ins[j - 1];
        }

        for i in 1..=la {
            for j in 1..=lb {
                let sub_cost = if a_events[i - 1] == b_events[j - 1] {
                    self.metric.between(ft_a(i - 1), ft_b(j - 1))
                } else {
                    del[i - 1] + ins[j - 1]
                };
                let mut best = (d[(i - 1) * w + j] + del[i - 1])
                    .min(d[i * w + j - 1] + ins[j - 1])
                    .min(d[(i - 1) * w + j - 1] + sub_cost);
                if i > 1
                    && j > 1
                    && a_events[i - 1] == b_events[j - 2]
                    && a_events[i - 2] == b_events[j - 1]
                {
                    best = best.min(d[(i - 2) * w + j - 2] + sub_cost);
                }
                d[i * w + j] = best;
            }
        }

        EditOutcome {
            raw: d[la * w + lb],
            bound: d[la * w] + d[lb],
        }
    }

    /// Distance from the first case of `factual` to every candidate.
    /// One rolling DP per candidate, run in parallel across the batch.
    pub fn batch(
        &self,
        factual: &Cases,
        candidates: &Cases,
    ) -> Result<Vec<EditOutcome>, CasesError> {
        if factual.is_empty() {
            return Err(CasesError::EmptyCases);
        }
        if factual.max_len() != candidates.max_len()
            || factual.num_features() != candidates.num_features()
        {
            return Err(CasesError::DimsMismatch {
                left: (factual.max_len(), factual.num_features()),
                right: (candidates.max_len(), candidates.num_features()),
            });
        }

        let nf = factual.num_features();
        let fa_events = factual.events_row(0);
        let fa_features = factual.features_row(0);
        let fa_del: Vec<f64> = (0..factual.max_len())
            .map(|i| self.metric.to_zero(&fa_features[i * nf..(i + 1) * nf]))
            .collect();

        Ok((0..candidates.len())
            .into_par_iter()
            .map(|c| {
                self.pair_rolling(
                    fa_events,
                    fa_features,
                    &fa_del,
                    candidates.events_row(c),
                    candidates.features_row(c),
                    nf,
                )
            })
            .collect())
    }

    /// Rolling three-row DP (transpositions need two previous rows).
    fn pair_rolling(
        &self,
        a_events: &[u32],
        a_features: &[f64],
        a_del: &[f64],
        b_events: &[u32],
        b_features: &[f64],
        num_features: usize,
    ) -> EditOutcome {
        let la = a_events.len();
        let lb = b_events.len();
        let ft_a = |i: usize| &a_features[i * num_features..(i + 1) * num_features];
        let ft_b = |j: usize| &b_features[j * num_features..(j + 1) * num_features];

        let b_ins: Vec<f64> = (0..lb).map(|j| self.metric.to_zero(ft_b(j))).collect();

        let mut prev2 = vec![0.0f64; lb + 1];
        let mut prev = vec![0.0f64; lb + 1];
        let mut curr = vec![0.0f64; lb + 1];
        for j in 1..=lb {
            prev[j] = prev[j - 1] + b_ins[j - 1];
        }
        let insert_all = prev[lb];

        let mut delete_all = 0.0;
        for i in 1..=la {
            curr[0] = prev[0] + a_del[i - 1];
            delete_all = curr[0];
            for j in 1..=lb {
                let sub_cost = if a_events[i - 1] == b_events[j - 1] {
                    self.metric.between(ft_a(i - 1), ft_b(j - 1))
                } else {
                    a_del[i - 1] + b_ins[j - 1]
                };
                let mut best = (prev[j] + a_del[i - 1])
                    .min(curr[j - 1] + b_ins[j - 1])
                    .min(prev[j - 1] + sub_cost);
                if i > 1
                    && j > 1
                    && a_events[i - 1] == b_events[j - 2]
                    && a_events[i - 2] == b_events[j - 1]
                {
                    best = best.min(prev2[j - 2] + sub_cost);
                }
                curr[j] = best;
            }
            std::mem::swap(&mut prev2, &mut prev);
            std::mem::swap(&mut prev, &mut curr);
        }

        EditOutcome {
            raw: prev[lb],
            bound: delete_all + insert_all,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn random_cases(n: usize, max_len: usize, nf: usize, seed: u64) -> Cases {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut events = Vec::with_capacity(n * max_len);
        let mut features = Vec::with_capacity(n * max_len * nf);
        for _ in 0..n * max_len {
            let ev: u32 = rng.gen_range(0..4);
            events.push(ev);
            for _ in 0..nf {
                let val = if ev == 0 { 0.0 } else { rng.gen_range(-1.0..1.0) };
                features.push(val);
            }
        }
        Cases::new(events, features, max_len, nf).unwrap()
    }

    #[test]
    fn test_identical_sequences_are_free() {
        let engine = EditDistance::new(FeatureMetric::CountDiffs);
        let events = vec![1, 2, 3, 0];
        let features = vec![1.0, 0.0, 1.0, 1.0, 0.5, 0.5, 0.0, 0.0];
        let out = engine.pair(&events, &features, &events, &features, 2);
        assert_eq!(out.raw, 0.0);
        assert_eq!(out.normalized(), 1.0);
    }

    #[test]
    fn test_event_substitution_costs_both_defaults() {
        let engine = EditDistance::new(FeatureMetric::CountDiffs);
        // a = [1, 2], b = [1, 3]; position features carry one nonzero entry.
        let a_ev = vec![1, 2];
        let a_ft = vec![1.0, 0.0, 1.0, 0.0];
        let b_ev = vec![1, 3];
        let b_ft = vec![1.0, 0.0, 0.0, 1.0];
        let out = engine.pair(&a_ev, &a_ft, &b_ev, &b_ft, 2);
        assert_eq!(out.raw, 2.0);
        assert_eq!(out.bound, 4.0);
        assert!((out.normalized() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_same_event_feature_drift() {
        let engine = EditDistance::new(FeatureMetric::CountDiffs);
        let a_ev = vec![1];
        let b_ev = vec![1];
        let out = engine.pair(&a_ev, &[0.5, 0.2], &b_ev, &[0.7, 0.2], 2);
        assert_eq!(out.raw, 1.0);
    }

    #[test]
    fn test_adjacent_swap_uses_transposition() {
        let engine = EditDistance::new(FeatureMetric::CountDiffs);
        let a_ev = vec![1, 2];
        let a_ft = vec![1.0, 0.0, 0.0, 1.0];
        let b_ev = vec![2, 1];
        let b_ft = vec![0.0, 1.0, 1.0, 0.0];
        let out = engine.pair(&a_ev, &a_ft, &b_ev, &b_ft, 2);
        assert_eq!(out.raw, 2.0);
    }

    #[test]
    fn test_padding_aligns_freely() {
        let engine = EditDistance::new(FeatureMetric::CountDiffs);
        let a_ev = vec![1, 0, 0];
        let a_ft = vec![1.0, 0.0, 0.0];
        let b_ev = vec![1, 0, 0];
        let b_ft = vec![1.0, 0.0, 0.0];
        let out = engine.pair(&a_ev, &a_ft, &b_ev, &b_ft, 1);
        assert_eq!(out.raw, 0.0);
        assert_eq!(out.bound, 2.0);
    }

    #[test]
    fn test_empty_pair_normalizes_to_one() {
        let engine = EditDistance::new(FeatureMetric::Euclidean);
        let out = engine.pair(&[0, 0], &[0.0, 0.0], &[0, 0], &[0.0, 0.0], 1);
        assert_eq!(out.raw, 0.0);
        assert_eq!(out.bound, 0.0);
        assert_eq!(out.normalized(), 1.0);
    }

    #[test]
    fn test_batch_matches_reference_exactly() {
        let factual = random_cases(1, 8, 3, 11);
        let candidates = random_cases(40, 8, 3, 12);
        for metric in [
            FeatureMetric::CountDiffs,
            FeatureMetric::Euclidean,
            FeatureMetric::Cosine,
        ] {
            let engine = EditDistance::new(metric);
            let batched = engine.batch(&factual, &candidates).unwrap();
            for (c, out) in batched.iter().enumerate() {
                let reference = engine.pair(
                    factual.events_row(0),
                    factual.features_row(0),
                    candidates.events_row(c),
                    candidates.features_row(c),
                    3,
                );
                assert_eq!(out.raw, reference.raw, "metric {metric:?} case {c}");
                assert_eq!(out.bound, reference.bound, "metric {metric:?} case {c}");
            }
        }
    }

    #[test]
    fn test_batch_rejects_mismatched_shapes() {
        let engine = EditDistance::new(FeatureMetric::CountDiffs);
        let factual = random_cases(1, 8, 3, 1);
        let candidates = random_cases(4, 6, 3, 2);
        assert!(matches!(
            engine.batch(&factual, &candidates),
            Err(CasesError::DimsMismatch { .. })
        ));
        let empty = Cases::empty(8, 3).unwrap();
        assert!(matches!(
            engine.batch(&empty, &candidates),
            Err(CasesError::EmptyCases)
        ));
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric(
            a_ev in proptest::collection::vec(0u32..4, 5),
            b_ev in proptest::collection::vec(0u32..4, 5),
            a_ft in proptest::collection::vec(-1.0f64..1.0, 10),
            b_ft in proptest::collection::vec(-1.0f64..1.0, 10),
        ) {
            for metric in [
                FeatureMetric::CountDiffs,
                FeatureMetric::Euclidean,
                FeatureMetric::Cosine,
            ] {
                let engine = EditDistance::new(metric);
                let ab = engine.pair(&a_ev, &a_ft, &b_ev, &b_ft, 2);
                let ba = engine.pair(&b_ev, &b_ft, &a_ev, &a_ft, 2);
                prop_assert_eq!(ab.raw, ba.raw);
                prop_assert_eq!(ab.bound, ba.bound);
            }
        }
    }

}
