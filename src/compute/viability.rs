//! Multi-term viability scoring.
//!
//! A candidate counterfactual is viable when it stays close to the factual
//! sequence (few edits, small feature drift), looks like the training data,
//! and actually flips the classifier toward the desired outcome. Each
//! concern is one term; the aggregate drives selection pressure in the
//! evolutionary loop.
//!
//! Terms are always computed in raw and normalized form. The mask only
//! controls which normalized terms enter the total, so a disabled term can
//! still be inspected on the scored batch.

use std::sync::Arc;

use crate::compute::distance::FeatureMetric;
use crate::compute::edit::EditDistance;
use crate::compute::emission::{EmissionTable, FeatureLayout, ModelError};
use crate::compute::oracle::{OracleError, OutcomeOracle, improvement};
use crate::schema::{
    Cases, CasesError, CombinationMode, ConfigError, MeasureColumn, Viability, ViabilityConfig,
};

/// Errors raised while assembling or applying the measure.
#[derive(Debug, thiserror::Error)]
pub enum ViabilityError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cases(#[from] CasesError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Factual batch must contain exactly one case, got {0}")]
    FactualNotSingle(usize),
}

/// Scores candidate batches against one factual case.
///
/// Owns the fitted emission table and the oracle handle, so one measure can
/// score any number of batches and searches over the same training corpus.
pub struct ViabilityMeasure {
    sparsity: EditDistance,
    similarity: EditDistance,
    emissions: EmissionTable,
    oracle: Arc<dyn OutcomeOracle>,
    cfg: ViabilityConfig,
}

impl ViabilityMeasure {
    /// Fit emission models on the training corpus and wire up the terms.
    pub fn new(
        training: &Cases,
        layout: FeatureLayout,
        oracle: Arc<dyn OutcomeOracle>,
        cfg: ViabilityConfig,
    ) -> Result<Self, ViabilityError> {
        if !cfg.mask.any() {
            return Err(ConfigError::EmptyMeasureMask.into());
        }
        let emissions = EmissionTable::fit(training, layout)?;
        Ok(ViabilityMeasure {
            sparsity: EditDistance::new(FeatureMetric::CountDiffs),
            similarity: EditDistance::new(FeatureMetric::Euclidean),
            emissions,
            oracle,
            cfg,
        })
    }

    /// Fitted emission models, shared with sampling operators.
    pub fn emissions(&self) -> &EmissionTable {
        &self.emissions
    }

    pub fn config(&self) -> &ViabilityConfig {
        &self.cfg
    }

    /// Score every candidate against the factual.
    ///
    /// All four terms are computed regardless of the mask; the mask decides
    /// which normalized values reach the total.
    pub fn score(&self, factual: &Cases, candidates: &Cases) -> Result<Viability, ViabilityError> {
        if factual.len() != 1 {
            return Err(ViabilityError::FactualNotSingle(factual.len()));
        }
        let n = candidates.len();

        let sparsity = edit_column(&self.sparsity, factual, candidates)?;
        let similarity = edit_column(&self.similarity, factual, candidates)?;

        let feasibility_raw = self.emissions.batch_feasibility(candidates)?;
        let feasibility = MeasureColumn {
            normalized: normalize_feasibility(&feasibility_raw, self.cfg.normalize),
            raw: feasibility_raw,
        };

        let p_factual = predict_checked(self.oracle.as_ref(), factual)?[0];
        let p_candidates = predict_checked(self.oracle.as_ref(), candidates)?;
        let mut improvement_col = MeasureColumn {
            raw: Vec::with_capacity(n),
            normalized: Vec::with_capacity(n),
        };
        for &p in &p_candidates {
            let (raw, normalized) = improvement(self.cfg.improvement, p_factual, p);
            improvement_col.raw.push(raw);
            improvement_col.normalized.push(normalized);
        }

        let mask = self.cfg.mask;
        let total: Vec<f64> = (0..n)
            .map(|i| {
                let mut terms = Vec::with_capacity(4);
                if mask.sparsity {
                    terms.push(sparsity.normalized[i]);
                }
                if mask.similarity {
                    terms.push(similarity.normalized[i]);
                }
                if mask.feasibility {
                    terms.push(feasibility.normalized[i]);
                }
                if mask.improvement {
                    terms.push(improvement_col.normalized[i]);
                }
                match self.cfg.combination {
                    CombinationMode::Sum => terms.iter().sum(),
                    CombinationMode::Product => terms.iter().product(),
                }
            })
            .collect();

        Ok(Viability::new(
            sparsity,
            similarity,
            feasibility,
            improvement_col,
            total,
        )?)
    }
}

fn edit_column(
    engine: &EditDistance,
    factual: &Cases,
    candidates: &Cases,
) -> Result<MeasureColumn, ViabilityError> {
    let outcomes = engine.batch(factual, candidates)?;
    Ok(MeasureColumn {
        raw: outcomes.iter().map(|o| o.raw).collect(),
        normalized: outcomes.iter().map(|o| o.normalized()).collect(),
    })
}

fn predict_checked(
    oracle: &dyn OutcomeOracle,
    cases: &Cases,
) -> Result<Vec<f64>, ViabilityError> {
    let scores = oracle.predict(cases)?;
    if scores.len() != cases.len() {
        return Err(OracleError::OutputLength {
            expected: cases.len(),
            actual: scores.len(),
        }
        .into());
    }
    Ok(scores)
}

/// Batch-max normalization maps the best candidate to 1 and scales the rest
/// proportionally. Without it, values are clamped into the unit interval.
fn normalize_feasibility(raw: &[f64], normalize: bool) -> Vec<f64> {
    if !normalize {
        return raw.iter().map(|v| v.clamp(0.0, 1.0)).collect();
    }
    let max = raw.iter().copied().fold(0.0f64, f64::max);
    if max > 0.0 {
        raw.iter().map(|v| v / max).collect()
    } else {
        vec![0.0; raw.len()]
    }
}
