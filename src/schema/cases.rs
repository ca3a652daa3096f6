//! Batch containers for event sequences and their viability scores.
//!
//! A batch stores N sequences in flat arrays: `events` is N x max_len event
//! ids with `0` as padding, `features` is N x max_len x num_features. Three
//! containers cover the search lifecycle:
//!
//! - [`Cases`]: plain sequences, optionally with known outcomes.
//! - [`Population`]: the live pool inside the engine; viability is attached
//!   after scoring, and each candidate carries the mutation it was bred with.
//! - [`EvaluatedCases`]: final results with viability guaranteed present.

use serde::{Deserialize, Serialize};

/// Batch of event sequences with per-position feature vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cases {
    /// Event ids, `num_cases * max_len`, 0 = padding.
    events: Vec<u32>,
    /// Feature values, `num_cases * max_len * num_features`.
    features: Vec<f64>,
    /// Known outcome per case (factuals only).
    outcomes: Option<Vec<f64>>,
    num_cases: usize,
    max_len: usize,
    num_features: usize,
}

impl Cases {
    /// Create a batch from flat arrays, validating shapes.
    pub fn new(
        events: Vec<u32>,
        features: Vec<f64>,
        max_len: usize,
        num_features: usize,
    ) -> Result<Self, CasesError> {
        if max_len == 0 || num_features == 0 {
            return Err(CasesError::InvalidShape {
                max_len,
                num_features,
            });
        }
        if events.len() % max_len != 0 {
            return Err(CasesError::EventsNotDivisible {
                len: events.len(),
                max_len,
            });
        }
        let num_cases = events.len() / max_len;
        let expected = num_cases * max_len * num_features;
        if features.len() != expected {
            return Err(CasesError::FeatureLenMismatch {
                expected,
                actual: features.len(),
            });
        }
        Ok(Self {
            events,
            features,
            outcomes: None,
            num_cases,
            max_len,
            num_features,
        })
    }

    /// Empty batch with the given row shape.
    pub fn empty(max_len: usize, num_features: usize) -> Result<Self, CasesError> {
        Self::new(Vec::new(), Vec::new(), max_len, num_features)
    }

    /// Attach known outcomes (one per case).
    pub fn with_outcomes(mut self, outcomes: Vec<f64>) -> Result<Self, CasesError> {
        if outcomes.len() != self.num_cases {
            return Err(CasesError::OutcomeLenMismatch {
                expected: self.num_cases,
                actual: outcomes.len(),
            });
        }
        self.outcomes = Some(outcomes);
        Ok(self)
    }

    /// Number of cases in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_cases
    }

    /// True when the batch holds no cases.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_cases == 0
    }

    /// Padded sequence length.
    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Feature vector width.
    #[inline]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// All event ids, row-major.
    #[inline]
    pub fn events(&self) -> &[u32] {
        &self.events
    }

    /// All feature values, row-major.
    #[inline]
    pub fn features(&self) -> &[f64] {
        &self.features
    }

    /// Known outcomes, if attached.
    #[inline]
    pub fn outcomes(&self) -> Option<&[f64]> {
        self.outcomes.as_deref()
    }

    #[inline]
    fn ev_idx(&self, case: usize) -> usize {
        case * self.max_len
    }

    #[inline]
    fn ft_idx(&self, case: usize) -> usize {
        case * self.max_len * self.num_features
    }

    /// Event row of one case.
    #[inline]
    pub fn events_row(&self, case: usize) -> &[u32] {
        let start = self.ev_idx(case);
        &self.events[start..start + self.max_len]
    }

    /// Feature row of one case (`max_len * num_features` values).
    #[inline]
    pub fn features_row(&self, case: usize) -> &[f64] {
        let start = self.ft_idx(case);
        &self.features[start..start + self.max_len * self.num_features]
    }

    /// Feature vector at one position of one case.
    #[inline]
    pub fn feature_at(&self, case: usize, pos: usize) -> &[f64] {
        let start = self.ft_idx(case) + pos * self.num_features;
        &self.features[start..start + self.num_features]
    }

    /// Number of occupied (non-padding) positions in one case.
    pub fn seq_len(&self, case: usize) -> usize {
        self.events_row(case).iter().filter(|e| **e != 0).count()
    }

    /// Average share of padding positions across the batch.
    pub fn avg_padding_share(&self) -> f64 {
        if self.num_cases == 0 {
            return 0.0;
        }
        let padding: usize = (0..self.num_cases)
            .map(|i| self.max_len - self.seq_len(i))
            .sum();
        padding as f64 / (self.num_cases * self.max_len) as f64
    }

    /// Copy of a single case as a one-row batch.
    pub fn case(&self, index: usize) -> Result<Cases, CasesError> {
        if index >= self.num_cases {
            return Err(CasesError::IndexOutOfRange {
                index,
                len: self.num_cases,
            });
        }
        let mut single = Cases::new(
            self.events_row(index).to_vec(),
            self.features_row(index).to_vec(),
            self.max_len,
            self.num_features,
        )?;
        if let Some(outcomes) = &self.outcomes {
            single = single.with_outcomes(vec![outcomes[index]])?;
        }
        Ok(single)
    }

    /// Gather rows by index. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> Result<Cases, CasesError> {
        let mut events = Vec::with_capacity(indices.len() * self.max_len);
        let mut features = Vec::with_capacity(indices.len() * self.max_len * self.num_features);
        for &i in indices {
            if i >= self.num_cases {
                return Err(CasesError::IndexOutOfRange {
                    index: i,
                    len: self.num_cases,
                });
            }
            events.extend_from_slice(self.events_row(i));
            features.extend_from_slice(self.features_row(i));
        }
        let mut out = Cases::new(events, features, self.max_len, self.num_features)?;
        if let Some(outcomes) = &self.outcomes {
            out = out.with_outcomes(indices.iter().map(|&i| outcomes[i]).collect())?;
        }
        Ok(out)
    }

    /// Append another batch with the same row shape.
    pub fn concat(&self, other: &Cases) -> Result<Cases, CasesError> {
        if self.max_len != other.max_len || self.num_features != other.num_features {
            return Err(CasesError::DimsMismatch {
                left: (self.max_len, self.num_features),
                right: (other.max_len, other.num_features),
            });
        }
        let mut events = self.events.clone();
        events.extend_from_slice(&other.events);
        let mut features = self.features.clone();
        features.extend_from_slice(&other.features);
        let mut out = Cases::new(events, features, self.max_len, self.num_features)?;
        if let (Some(a), Some(b)) = (&self.outcomes, &other.outcomes) {
            let mut outcomes = a.clone();
            outcomes.extend_from_slice(b);
            out = out.with_outcomes(outcomes)?;
        }
        Ok(out)
    }

    /// Draw `k` distinct rows without replacement.
    pub fn sample<R: rand::Rng>(&self, k: usize, rng: &mut R) -> Result<Cases, CasesError> {
        let indices = sample_indices(self.num_cases, k, rng)?;
        self.select(&indices)
    }
}

/// Draw `k` distinct indices out of `0..n` (partial Fisher-Yates).
pub(crate) fn sample_indices<R: rand::Rng>(
    n: usize,
    k: usize,
    rng: &mut R,
) -> Result<Vec<usize>, CasesError> {
    if k > n {
        return Err(CasesError::SampleTooLarge {
            requested: k,
            available: n,
        });
    }
    let mut pool: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        pool.swap(i, j);
    }
    pool.truncate(k);
    Ok(pool)
}

/// Raw and normalized values of one viability term.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasureColumn {
    /// Raw measure output (distance, density, probability gain).
    pub raw: Vec<f64>,
    /// Normalized value used in the aggregate.
    pub normalized: Vec<f64>,
}

impl MeasureColumn {
    fn select(&self, indices: &[usize]) -> MeasureColumn {
        MeasureColumn {
            raw: indices.iter().map(|&i| self.raw[i]).collect(),
            normalized: indices.iter().map(|&i| self.normalized[i]).collect(),
        }
    }
}

/// Per-candidate viability: four partial terms plus the aggregate total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viability {
    sparsity: MeasureColumn,
    similarity: MeasureColumn,
    feasibility: MeasureColumn,
    improvement: MeasureColumn,
    total: Vec<f64>,
}

impl Viability {
    /// Assemble from per-term columns, validating lengths.
    pub fn new(
        sparsity: MeasureColumn,
        similarity: MeasureColumn,
        feasibility: MeasureColumn,
        improvement: MeasureColumn,
        total: Vec<f64>,
    ) -> Result<Self, CasesError> {
        let expected = total.len();
        for column in [&sparsity, &similarity, &feasibility, &improvement] {
            for len in [column.raw.len(), column.normalized.len()] {
                if len != expected {
                    return Err(CasesError::ColumnLenMismatch {
                        expected,
                        actual: len,
                    });
                }
            }
        }
        Ok(Self {
            sparsity,
            similarity,
            feasibility,
            improvement,
            total,
        })
    }

    /// Number of scored candidates.
    #[inline]
    pub fn len(&self) -> usize {
        self.total.len()
    }

    /// True when no candidates are scored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    /// Aggregate totals, one per candidate.
    #[inline]
    pub fn total(&self) -> &[f64] {
        &self.total
    }

    /// Sparsity term.
    #[inline]
    pub fn sparsity(&self) -> &MeasureColumn {
        &self.sparsity
    }

    /// Similarity term.
    #[inline]
    pub fn similarity(&self) -> &MeasureColumn {
        &self.similarity
    }

    /// Feasibility term.
    #[inline]
    pub fn feasibility(&self) -> &MeasureColumn {
        &self.feasibility
    }

    /// Improvement term.
    #[inline]
    pub fn improvement(&self) -> &MeasureColumn {
        &self.improvement
    }

    /// Gather scored rows by index. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> Result<Viability, CasesError> {
        for &i in indices {
            if i >= self.total.len() {
                return Err(CasesError::IndexOutOfRange {
                    index: i,
                    len: self.total.len(),
                });
            }
        }
        Viability::new(
            self.sparsity.select(indices),
            self.similarity.select(indices),
            self.feasibility.select(indices),
            self.improvement.select(indices),
            indices.iter().map(|&i| self.total[i]).collect(),
        )
    }
}

/// Mutation applied to a candidate in the cycle it was bred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Not mutated (initial candidates and carried-over parents).
    #[default]
    None,
    /// Occupied positions zeroed out.
    Delete,
    /// Occupied positions redrawn.
    Change,
    /// Padding positions filled.
    Insert,
    /// Positions exchanged with their successor.
    Swap,
}

/// The live candidate pool inside the evolutionary engine.
///
/// Viability is optional until the pool has been scored; the statistics
/// accessors fail with [`CasesError::ViabilityNotSet`] before that, since
/// reading fitness off an unscored pool is a caller bug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    cases: Cases,
    viability: Option<Viability>,
    mutations: Vec<MutationKind>,
}

impl Population {
    /// Wrap a batch as an unscored pool.
    pub fn from_cases(cases: Cases) -> Self {
        let mutations = vec![MutationKind::None; cases.len()];
        Self {
            cases,
            viability: None,
            mutations,
        }
    }

    /// Wrap freshly mutated candidates with their mutation labels.
    pub fn with_mutations(
        cases: Cases,
        mutations: Vec<MutationKind>,
    ) -> Result<Self, CasesError> {
        if mutations.len() != cases.len() {
            return Err(CasesError::MutationLenMismatch {
                expected: cases.len(),
                actual: mutations.len(),
            });
        }
        Ok(Self {
            cases,
            viability: None,
            mutations,
        })
    }

    /// Number of candidates.
    #[inline]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// True when the pool is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// The underlying sequences.
    #[inline]
    pub fn cases(&self) -> &Cases {
        &self.cases
    }

    /// Per-candidate mutation labels.
    #[inline]
    pub fn mutations(&self) -> &[MutationKind] {
        &self.mutations
    }

    /// Attach viability scores, validating the length.
    pub fn set_viability(&mut self, viability: Viability) -> Result<(), CasesError> {
        if viability.len() != self.cases.len() {
            return Err(CasesError::ViabilityLenMismatch {
                expected: self.cases.len(),
                actual: viability.len(),
            });
        }
        self.viability = Some(viability);
        Ok(())
    }

    /// Attached viability, or the viability-not-set error.
    pub fn viability(&self) -> Result<&Viability, CasesError> {
        self.viability.as_ref().ok_or(CasesError::ViabilityNotSet)
    }

    /// Viability totals, one per candidate.
    pub fn fitness(&self) -> Result<&[f64], CasesError> {
        Ok(self.viability()?.total())
    }

    /// Mean viability total.
    pub fn avg_fitness(&self) -> Result<f64, CasesError> {
        mean(self.fitness()?)
    }

    /// Median viability total.
    pub fn median_fitness(&self) -> Result<f64, CasesError> {
        median(self.fitness()?)
    }

    /// Highest viability total.
    pub fn max_fitness(&self) -> Result<f64, CasesError> {
        let fitness = self.fitness()?;
        if fitness.is_empty() {
            return Err(CasesError::EmptyCases);
        }
        Ok(fitness.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)))
    }

    /// Indices sorted by descending fitness, ties by original order.
    pub fn ranked_indices(&self) -> Result<Vec<usize>, CasesError> {
        let fitness = self.fitness()?;
        let mut indices: Vec<usize> = (0..fitness.len()).collect();
        indices.sort_by(|&a, &b| fitness[b].total_cmp(&fitness[a]).then(a.cmp(&b)));
        Ok(indices)
    }

    /// Gather candidates by index, carrying labels and any attached scores.
    pub fn select(&self, indices: &[usize]) -> Result<Population, CasesError> {
        let cases = self.cases.select(indices)?;
        let viability = match &self.viability {
            Some(v) => Some(v.select(indices)?),
            None => None,
        };
        let mutations = indices.iter().map(|&i| self.mutations[i]).collect();
        Ok(Population {
            cases,
            viability,
            mutations,
        })
    }

    /// Mutated candidates first, then the parent pool. The merged pool is
    /// unscored; any attached viability is dropped so the whole pool gets
    /// re-scored in one batch.
    pub fn merge(&self, parents: &Population) -> Result<Population, CasesError> {
        let cases = self.cases.concat(&parents.cases)?;
        let mut mutations = self.mutations.clone();
        mutations.extend_from_slice(&parents.mutations);
        Ok(Population {
            cases,
            viability: None,
            mutations,
        })
    }

    /// Clear mutation labels (survivors become plain parents).
    pub fn reset_mutations(&mut self) {
        self.mutations.fill(MutationKind::None);
    }

    /// Convert into final results; requires viability to be set.
    pub fn into_evaluated(self) -> Result<EvaluatedCases, CasesError> {
        let viability = self.viability.ok_or(CasesError::ViabilityNotSet)?;
        EvaluatedCases::new(self.cases, viability)
    }
}

/// Scored sequences: a batch with viability guaranteed present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedCases {
    cases: Cases,
    viability: Viability,
}

impl EvaluatedCases {
    /// Pair a batch with its viability, validating lengths.
    pub fn new(cases: Cases, viability: Viability) -> Result<Self, CasesError> {
        if viability.len() != cases.len() {
            return Err(CasesError::ViabilityLenMismatch {
                expected: cases.len(),
                actual: viability.len(),
            });
        }
        Ok(Self { cases, viability })
    }

    /// Number of cases.
    #[inline]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// True when empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// The underlying sequences.
    #[inline]
    pub fn cases(&self) -> &Cases {
        &self.cases
    }

    /// The attached viability.
    #[inline]
    pub fn viability(&self) -> &Viability {
        &self.viability
    }

    fn ranked_desc(&self) -> Vec<usize> {
        let total = self.viability.total();
        let mut indices: Vec<usize> = (0..total.len()).collect();
        indices.sort_by(|&a, &b| total[b].total_cmp(&total[a]).then(a.cmp(&b)));
        indices
    }

    /// Copy sorted by ascending viability total.
    pub fn sort(&self) -> Result<EvaluatedCases, CasesError> {
        let mut indices = self.ranked_desc();
        indices.reverse();
        self.select(&indices)
    }

    /// The `k` highest-viability cases, best first, ties broken by original
    /// order. Input order does not matter. `k` beyond the batch returns all.
    pub fn topk(&self, k: usize) -> Result<EvaluatedCases, CasesError> {
        let mut indices = self.ranked_desc();
        indices.truncate(k);
        self.select(&indices)
    }

    /// Draw `k` distinct cases without replacement.
    pub fn sample<R: rand::Rng>(
        &self,
        k: usize,
        rng: &mut R,
    ) -> Result<EvaluatedCases, CasesError> {
        let indices = sample_indices(self.cases.len(), k, rng)?;
        self.select(&indices)
    }

    fn select(&self, indices: &[usize]) -> Result<EvaluatedCases, CasesError> {
        EvaluatedCases::new(self.cases.select(indices)?, self.viability.select(indices)?)
    }

    /// Mean viability total.
    pub fn avg_viability(&self) -> Result<f64, CasesError> {
        mean(self.viability.total())
    }

    /// Median viability total.
    pub fn median_viability(&self) -> Result<f64, CasesError> {
        median(self.viability.total())
    }

    /// Highest viability total.
    pub fn max_viability(&self) -> Result<f64, CasesError> {
        let total = self.viability.total();
        if total.is_empty() {
            return Err(CasesError::EmptyCases);
        }
        Ok(total.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)))
    }
}

fn mean(values: &[f64]) -> Result<f64, CasesError> {
    if values.is_empty() {
        return Err(CasesError::EmptyCases);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Result<f64, CasesError> {
    if values.is_empty() {
        return Err(CasesError::EmptyCases);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Ok(sorted[mid])
    }
}

/// Batch container errors.
#[derive(Debug, thiserror::Error)]
pub enum CasesError {
    #[error("Row shape must be non-zero, got max_len {max_len} x {num_features} features")]
    InvalidShape { max_len: usize, num_features: usize },
    #[error("Event array length {len} is not divisible by max_len {max_len}")]
    EventsNotDivisible { len: usize, max_len: usize },
    #[error("Feature array length {actual} does not match expected {expected}")]
    FeatureLenMismatch { expected: usize, actual: usize },
    #[error("Outcome count {actual} does not match case count {expected}")]
    OutcomeLenMismatch { expected: usize, actual: usize },
    #[error("Viability length {actual} does not match case count {expected}")]
    ViabilityLenMismatch { expected: usize, actual: usize },
    #[error("Mutation label count {actual} does not match case count {expected}")]
    MutationLenMismatch { expected: usize, actual: usize },
    #[error("Viability column length {actual} does not match total length {expected}")]
    ColumnLenMismatch { expected: usize, actual: usize },
    #[error("Viability is not set; score the pool before reading fitness")]
    ViabilityNotSet,
    #[error("Operation requires a non-empty batch")]
    EmptyCases,
    #[error("Case index {index} out of range for batch of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Cannot sample {requested} cases from a batch of {available}")]
    SampleTooLarge { requested: usize, available: usize },
    #[error("Batch shapes differ: {left:?} vs {right:?}")]
    DimsMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn test_cases(n: usize) -> Cases {
        let max_len = 4;
        let num_features = 2;
        let mut events = Vec::new();
        let mut features = Vec::new();
        for i in 0..n {
            for pos in 0..max_len {
                // Last position padded.
                let ev = if pos < 3 { (i + pos + 1) as u32 } else { 0 };
                events.push(ev);
                for f in 0..num_features {
                    let val = if ev == 0 {
                        0.0
                    } else {
                        (i * 10 + pos * 2 + f) as f64
                    };
                    features.push(val);
                }
            }
        }
        Cases::new(events, features, max_len, num_features).unwrap()
    }

    fn uniform_viability(totals: Vec<f64>) -> Viability {
        let n = totals.len();
        let col = MeasureColumn {
            raw: vec![0.0; n],
            normalized: vec![0.0; n],
        };
        Viability::new(col.clone(), col.clone(), col.clone(), col, totals).unwrap()
    }

    #[test]
    fn test_construction_validates_shapes() {
        assert!(matches!(
            Cases::new(vec![1, 2, 3], vec![0.0; 6], 2, 1),
            Err(CasesError::EventsNotDivisible { .. })
        ));
        assert!(matches!(
            Cases::new(vec![1, 2], vec![0.0; 3], 2, 2),
            Err(CasesError::FeatureLenMismatch { .. })
        ));
        assert!(matches!(
            Cases::new(vec![], vec![], 0, 2),
            Err(CasesError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_outcome_length_checked() {
        let cases = test_cases(3);
        assert!(matches!(
            cases.clone().with_outcomes(vec![1.0, 0.0]),
            Err(CasesError::OutcomeLenMismatch { .. })
        ));
        let cases = cases.with_outcomes(vec![1.0, 0.0, 1.0]).unwrap();
        assert_eq!(cases.outcomes(), Some(&[1.0, 0.0, 1.0][..]));
    }

    #[test]
    fn test_row_accessors() {
        let cases = test_cases(2);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases.events_row(0), &[1, 2, 3, 0]);
        assert_eq!(cases.seq_len(0), 3);
        assert_eq!(cases.feature_at(1, 1), &[12.0, 13.0]);
        assert!((cases.avg_padding_share() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_case_out_of_range() {
        let cases = test_cases(2);
        assert!(matches!(
            cases.case(2),
            Err(CasesError::IndexOutOfRange { index: 2, len: 2 })
        ));
        let single = cases.case(1).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single.events_row(0), cases.events_row(1));
    }

    #[test]
    fn test_select_and_concat() {
        let cases = test_cases(3);
        let picked = cases.select(&[2, 0, 2]).unwrap();
        assert_eq!(picked.len(), 3);
        assert_eq!(picked.events_row(0), cases.events_row(2));
        assert_eq!(picked.events_row(1), cases.events_row(0));

        let merged = cases.concat(&picked).unwrap();
        assert_eq!(merged.len(), 6);
        assert_eq!(merged.events_row(3), cases.events_row(2));

        let other = Cases::new(vec![1, 0], vec![0.0, 0.0], 2, 1).unwrap();
        assert!(matches!(
            cases.concat(&other),
            Err(CasesError::DimsMismatch { .. })
        ));
    }

    #[test]
    fn test_sample_without_replacement() {
        let cases = test_cases(10);
        let mut rng = StdRng::seed_from_u64(3);
        let sampled = cases.sample(10, &mut rng).unwrap();
        // Exhaustive sample covers every row exactly once.
        let mut firsts: Vec<u32> = (0..10).map(|i| sampled.events_row(i)[0]).collect();
        firsts.sort_unstable();
        let mut expected: Vec<u32> = (0..10).map(|i| cases.events_row(i)[0]).collect();
        expected.sort_unstable();
        assert_eq!(firsts, expected);

        assert!(matches!(
            cases.sample(11, &mut rng),
            Err(CasesError::SampleTooLarge { .. })
        ));
    }

    #[test]
    fn test_fitness_requires_viability() {
        let pool = Population::from_cases(test_cases(3));
        assert!(matches!(pool.fitness(), Err(CasesError::ViabilityNotSet)));
        assert!(matches!(
            pool.avg_fitness(),
            Err(CasesError::ViabilityNotSet)
        ));
        assert!(matches!(
            pool.ranked_indices(),
            Err(CasesError::ViabilityNotSet)
        ));
    }

    #[test]
    fn test_set_viability_length_checked() {
        let mut pool = Population::from_cases(test_cases(3));
        assert!(matches!(
            pool.set_viability(uniform_viability(vec![1.0, 2.0])),
            Err(CasesError::ViabilityLenMismatch { .. })
        ));
        pool.set_viability(uniform_viability(vec![1.0, 3.0, 2.0]))
            .unwrap();
        assert_eq!(pool.fitness().unwrap(), &[1.0, 3.0, 2.0]);
        assert!((pool.avg_fitness().unwrap() - 2.0).abs() < 1e-12);
        assert!((pool.max_fitness().unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ranked_indices_break_ties_by_order() {
        let mut pool = Population::from_cases(test_cases(4));
        pool.set_viability(uniform_viability(vec![1.0, 2.0, 2.0, 0.5]))
            .unwrap();
        assert_eq!(pool.ranked_indices().unwrap(), vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_merge_puts_mutated_first_and_drops_scores() {
        let mutated = Population::with_mutations(
            test_cases(2),
            vec![MutationKind::Delete, MutationKind::Swap],
        )
        .unwrap();
        let mut parents = Population::from_cases(test_cases(3));
        parents
            .set_viability(uniform_viability(vec![1.0, 2.0, 3.0]))
            .unwrap();

        let merged = mutated.merge(&parents).unwrap();
        assert_eq!(merged.len(), 5);
        assert_eq!(merged.mutations()[0], MutationKind::Delete);
        assert_eq!(merged.mutations()[2], MutationKind::None);
        assert!(matches!(merged.fitness(), Err(CasesError::ViabilityNotSet)));
    }

    #[test]
    fn test_topk_returns_highest_regardless_of_order() {
        // Totals 0..=99 laid out in a scrambled order.
        let n = 100;
        let mut totals = vec![0.0; n];
        for i in 0..n {
            totals[i] = ((i * 37) % 100) as f64;
        }
        let cases = test_cases(n);
        let evaluated = EvaluatedCases::new(cases, uniform_viability(totals)).unwrap();

        let top = evaluated.topk(5).unwrap();
        let got: Vec<f64> = top.viability().total().to_vec();
        assert_eq!(got, vec![99.0, 98.0, 97.0, 96.0, 95.0]);

        // Requesting more than the batch returns everything.
        assert_eq!(evaluated.topk(200).unwrap().len(), n);
    }

    #[test]
    fn test_sort_ascending() {
        let evaluated = EvaluatedCases::new(
            test_cases(4),
            uniform_viability(vec![3.0, 1.0, 2.0, 0.0]),
        )
        .unwrap();
        let sorted = evaluated.sort().unwrap();
        assert_eq!(sorted.viability().total(), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_median_handles_even_and_odd() {
        assert!((median(&[3.0, 1.0, 2.0]).unwrap() - 2.0).abs() < 1e-12);
        assert!((median(&[4.0, 1.0, 2.0, 3.0]).unwrap() - 2.5).abs() < 1e-12);
        assert!(matches!(median(&[]), Err(CasesError::EmptyCases)));
    }

    #[test]
    fn test_into_evaluated_requires_scores() {
        let pool = Population::from_cases(test_cases(2));
        assert!(matches!(
            pool.clone().into_evaluated(),
            Err(CasesError::ViabilityNotSet)
        ));
        let mut scored = pool;
        scored
            .set_viability(uniform_viability(vec![0.5, 0.25]))
            .unwrap();
        let evaluated = scored.into_evaluated().unwrap();
        assert_eq!(evaluated.viability().total(), &[0.5, 0.25]);
    }
}
