//! Per-activity emission models fitted from a training corpus.
//!
//! Every distinct event id in the corpus gets its own [`ActivityModel`]: a
//! product of group distributions over the feature columns, laid out by a
//! [`FeatureLayout`]. A pooled model over all rows backs lookups for event
//! ids that never occurred in training.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compute::emission::discrete::{BernoulliGroup, MultinoulliGroup};
use crate::compute::emission::gaussian::{
    ApproxMode, ApproximationLevel, DEFAULT_EPSILON, EpsilonMode, GaussianParams, LOG_FLOOR,
    MultivariateGaussian,
};
use crate::schema::Cases;

/// Errors from layout validation and model fitting.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Training corpus has no occupied positions to fit on")]
    EmptyCorpus,

    #[error("Layout covers {layout} feature columns but cases carry {cases}")]
    LayoutMismatch { layout: usize, cases: usize },

    #[error("Layout column {column} is out of range for {num_features} features")]
    ColumnOutOfRange { column: usize, num_features: usize },

    #[error("Layout column {column} appears in more than one group")]
    ColumnReused { column: usize },

    #[error("Layout contains a group with no columns")]
    EmptyGroup,

    #[error("Layout leaves column {column} uncovered")]
    UncoveredColumn { column: usize },
}

/// One block of feature columns and the distribution family that models it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureGroup {
    /// Jointly Gaussian columns.
    Continuous { columns: Vec<usize> },
    /// Single 0/1 indicator column.
    Binary { column: usize },
    /// One-hot block over several columns.
    Categorical { columns: Vec<usize> },
}

impl FeatureGroup {
    fn columns(&self) -> Vec<usize> {
        match self {
            FeatureGroup::Continuous { columns } => columns.clone(),
            FeatureGroup::Binary { column } => vec![*column],
            FeatureGroup::Categorical { columns } => columns.clone(),
        }
    }
}

/// Partition of the feature columns into typed groups.
///
/// Every column must belong to exactly one group; sampling and scoring both
/// walk the groups, so a gap would leave columns unmodeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    groups: Vec<FeatureGroup>,
    num_features: usize,
}

impl FeatureLayout {
    pub fn new(groups: Vec<FeatureGroup>, num_features: usize) -> Result<Self, ModelError> {
        let mut seen = vec![false; num_features];
        for group in &groups {
            let columns = group.columns();
            if columns.is_empty() {
                return Err(ModelError::EmptyGroup);
            }
            for column in columns {
                if column >= num_features {
                    return Err(ModelError::ColumnOutOfRange {
                        column,
                        num_features,
                    });
                }
                if seen[column] {
                    return Err(ModelError::ColumnReused { column });
                }
                seen[column] = true;
            }
        }
        if let Some(column) = seen.iter().position(|covered| !covered) {
            return Err(ModelError::UncoveredColumn { column });
        }
        Ok(FeatureLayout {
            groups,
            num_features,
        })
    }

    /// Single Gaussian block over every column. The usual choice when
    /// nothing is known about the feature semantics.
    pub fn all_continuous(num_features: usize) -> Self {
        FeatureLayout {
            groups: vec![FeatureGroup::Continuous {
                columns: (0..num_features).collect(),
            }],
            num_features,
        }
    }

    pub fn groups(&self) -> &[FeatureGroup] {
        &self.groups
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

/// A fitted distribution bound to its columns.
#[derive(Debug, Clone)]
enum GroupModel {
    Gaussian {
        columns: Vec<usize>,
        dist: MultivariateGaussian,
    },
    Bernoulli {
        column: usize,
        dist: BernoulliGroup,
    },
    Multinoulli {
        columns: Vec<usize>,
        dist: MultinoulliGroup,
    },
}

impl GroupModel {
    fn log_mass(&self, row: &[f64]) -> f64 {
        match self {
            GroupModel::Gaussian { columns, dist } => {
                let block: Vec<f64> = columns.iter().map(|&c| row[c]).collect();
                dist.log_pdf(&block)
            }
            GroupModel::Bernoulli { column, dist } => dist.log_mass(row[*column]),
            GroupModel::Multinoulli { columns, dist } => {
                let block: Vec<f64> = columns.iter().map(|&c| row[c]).collect();
                dist.log_mass(&block)
            }
        }
    }

    fn sample_into<R: rand::Rng>(&self, rng: &mut R, row: &mut [f64]) {
        match self {
            GroupModel::Gaussian { columns, dist } => {
                let mut block = vec![0.0; columns.len()];
                dist.sample_into(rng, &mut block);
                for (&c, v) in columns.iter().zip(&block) {
                    row[c] = *v;
                }
            }
            GroupModel::Bernoulli { column, dist } => {
                row[*column] = dist.sample(rng);
            }
            GroupModel::Multinoulli { columns, dist } => {
                let mut block = vec![0.0; columns.len()];
                dist.sample_into(rng, &mut block);
                for (&c, v) in columns.iter().zip(&block) {
                    row[c] = *v;
                }
            }
        }
    }
}

/// Joint feature distribution of one activity: a product over the layout's
/// groups.
#[derive(Debug, Clone)]
pub struct ActivityModel {
    groups: Vec<GroupModel>,
    support: usize,
}

impl ActivityModel {
    fn fit(rows: &[&[f64]], layout: &FeatureLayout, epsilon: f64) -> ActivityModel {
        let groups = layout
            .groups()
            .iter()
            .map(|group| match group {
                FeatureGroup::Continuous { columns } => {
                    let blocks: Vec<Vec<f64>> = rows
                        .iter()
                        .map(|r| columns.iter().map(|&c| r[c]).collect())
                        .collect();
                    let refs: Vec<&[f64]> = blocks.iter().map(Vec::as_slice).collect();
                    let params = GaussianParams::from_rows(&refs, columns.len());
                    GroupModel::Gaussian {
                        columns: columns.clone(),
                        dist: MultivariateGaussian::fit(&params, epsilon),
                    }
                }
                FeatureGroup::Binary { column } => {
                    let values: Vec<f64> = rows.iter().map(|r| r[*column]).collect();
                    GroupModel::Bernoulli {
                        column: *column,
                        dist: BernoulliGroup::from_values(&values),
                    }
                }
                FeatureGroup::Categorical { columns } => {
                    let blocks: Vec<Vec<f64>> = rows
                        .iter()
                        .map(|r| columns.iter().map(|&c| r[c]).collect())
                        .collect();
                    GroupModel::Multinoulli {
                        columns: columns.clone(),
                        dist: MultinoulliGroup::from_rows(&blocks),
                    }
                }
            })
            .collect();
        ActivityModel {
            groups,
            support: rows.len(),
        }
    }

    /// Number of training rows behind the model.
    pub fn support(&self) -> usize {
        self.support
    }

    /// Joint log density of one feature row, floored so a wild row degrades
    /// the score instead of sinking it to negative infinity.
    pub fn log_density(&self, row: &[f64]) -> f64 {
        let raw: f64 = self.groups.iter().map(|g| g.log_mass(row)).sum();
        raw.max(LOG_FLOOR)
    }

    /// Construction tag of the continuous block, when the layout has one.
    pub fn level(&self) -> Option<ApproximationLevel> {
        self.groups.iter().find_map(|g| match g {
            GroupModel::Gaussian { dist, .. } => Some(dist.level()),
            _ => None,
        })
    }

    /// Draw a full-width feature row.
    pub fn sample_row<R: rand::Rng>(&self, rng: &mut R, num_features: usize) -> Vec<f64> {
        let mut row = vec![0.0; num_features];
        for group in &self.groups {
            group.sample_into(rng, &mut row);
        }
        row
    }
}

/// Emission models keyed by event id, with a pooled fallback for ids that
/// never occurred in training.
#[derive(Debug, Clone)]
pub struct EmissionTable {
    models: HashMap<u32, ActivityModel>,
    fallback: ActivityModel,
    layout: FeatureLayout,
}

impl EmissionTable {
    /// Fit with the default ladder epsilon.
    pub fn fit(training: &Cases, layout: FeatureLayout) -> Result<Self, ModelError> {
        Self::fit_with_epsilon(training, layout, DEFAULT_EPSILON)
    }

    pub fn fit_with_epsilon(
        training: &Cases,
        layout: FeatureLayout,
        epsilon: f64,
    ) -> Result<Self, ModelError> {
        if layout.num_features() != training.num_features() {
            return Err(ModelError::LayoutMismatch {
                layout: layout.num_features(),
                cases: training.num_features(),
            });
        }

        let mut by_event: HashMap<u32, Vec<&[f64]>> = HashMap::new();
        let mut pooled: Vec<&[f64]> = Vec::new();
        for case in 0..training.len() {
            for (pos, &event) in training.events_row(case).iter().enumerate() {
                if event == 0 {
                    continue;
                }
                let row = training.feature_at(case, pos);
                by_event.entry(event).or_default().push(row);
                pooled.push(row);
            }
        }
        if pooled.is_empty() {
            return Err(ModelError::EmptyCorpus);
        }

        let models: HashMap<u32, ActivityModel> = by_event
            .into_iter()
            .map(|(event, rows)| (event, ActivityModel::fit(&rows, &layout, epsilon)))
            .collect();

        let mut ids: Vec<u32> = models.keys().copied().collect();
        ids.sort_unstable();
        for id in &ids {
            if let Some(level) = models[id].level() {
                if matches!(
                    level.approximation,
                    ApproxMode::Everywhere | ApproxMode::LastResort
                ) {
                    log::warn!(
                        "emission model for event {id} fell back to {level} (support {})",
                        models[id].support()
                    );
                } else {
                    log::debug!("emission model for event {id}: {level}");
                }
            }
        }

        let fallback = ActivityModel::fit(&pooled, &layout, epsilon);
        Ok(EmissionTable {
            models,
            fallback,
            layout,
        })
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// Event ids with a dedicated model, ascending.
    pub fn known_events(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.models.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Model for an event id. Unseen ids route to the pooled fallback.
    pub fn model(&self, event: u32) -> &ActivityModel {
        self.models.get(&event).unwrap_or(&self.fallback)
    }

    /// Construction tag for an event id, [`ApproximationLevel::UNSEEN`] when
    /// the id has no dedicated model.
    pub fn level(&self, event: u32) -> ApproximationLevel {
        match self.models.get(&event) {
            Some(model) => model.level().unwrap_or(ApproximationLevel {
                epsilon: EpsilonMode::NotApplicable,
                approximation: ApproxMode::Direct,
            }),
            None => ApproximationLevel::UNSEEN,
        }
    }

    /// Floored log density of one position.
    pub fn log_density(&self, event: u32, row: &[f64]) -> f64 {
        self.model(event).log_density(row)
    }

    /// Geometric-mean likelihood of one sequence over its occupied
    /// positions. A sequence with no occupied positions scores 0.
    pub fn sequence_feasibility(&self, events: &[u32], features: &[f64]) -> f64 {
        let nf = self.layout.num_features();
        let mut sum = 0.0;
        let mut count = 0usize;
        for (pos, &event) in events.iter().enumerate() {
            if event == 0 {
                continue;
            }
            sum += self.log_density(event, &features[pos * nf..(pos + 1) * nf]);
            count += 1;
        }
        if count == 0 {
            return 0.0;
        }
        (sum / count as f64).exp()
    }

    /// Per-case feasibility over a batch.
    pub fn batch_feasibility(&self, cases: &Cases) -> Result<Vec<f64>, ModelError> {
        if cases.num_features() != self.layout.num_features() {
            return Err(ModelError::LayoutMismatch {
                layout: self.layout.num_features(),
                cases: cases.num_features(),
            });
        }
        Ok((0..cases.len())
            .into_par_iter()
            .map(|i| self.sequence_feasibility(cases.events_row(i), cases.features_row(i)))
            .collect())
    }

    /// Draw a feature row from the event's model.
    pub fn sample_row<R: rand::Rng>(&self, event: u32, rng: &mut R) -> Vec<f64> {
        self.model(event)
            .sample_row(rng, self.layout.num_features())
    }
}
