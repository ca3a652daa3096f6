//! Configuration types for counterfactual search runs.

use serde::{Deserialize, Serialize};

fn default_population_size() -> usize {
    1000
}
fn default_num_survivors() -> usize {
    250
}
fn default_max_cycles() -> usize {
    100
}
fn default_edit_rate() -> f64 {
    0.1
}
fn default_recombination_rate() -> f64 {
    0.5
}
fn default_normalize() -> bool {
    true
}

/// Top-level configuration for a counterfactual search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of candidates created by the initiator.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Number of candidates kept by the recombiner each cycle.
    #[serde(default = "default_num_survivors")]
    pub num_survivors: usize,
    /// Hard cycle budget for the evolutionary loop.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
    /// Share of sequence positions a single mutation may touch (0.0-1.0).
    #[serde(default = "default_edit_rate")]
    pub edit_rate: f64,
    /// Gene-flip threshold for uniform crossover (0.0-1.0). Positions whose
    /// draw exceeds it take the father's gene, so lower values mix more.
    #[serde(default = "default_recombination_rate")]
    pub recombination_rate: f64,
    /// Relative weights of the four mutation operations.
    #[serde(default)]
    pub mutation_rate: MutationRate,
    /// Operator strategy selection.
    #[serde(default)]
    pub operators: OperatorKinds,
    /// Viability measure settings.
    #[serde(default)]
    pub viability: ViabilityConfig,
    /// Stop early after this many cycles without improvement.
    #[serde(default)]
    pub stagnation_limit: Option<usize>,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            num_survivors: default_num_survivors(),
            max_cycles: default_max_cycles(),
            edit_rate: default_edit_rate(),
            recombination_rate: default_recombination_rate(),
            mutation_rate: MutationRate::default(),
            operators: OperatorKinds::default(),
            viability: ViabilityConfig::default(),
            stagnation_limit: None,
            random_seed: None,
        }
    }
}

impl SearchConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::InvalidPopulationSize);
        }
        if self.num_survivors == 0 || self.num_survivors > self.population_size {
            return Err(ConfigError::InvalidSurvivorCount {
                survivors: self.num_survivors,
                population: self.population_size,
            });
        }
        if self.max_cycles == 0 {
            return Err(ConfigError::InvalidCycleBudget);
        }
        if !(0.0..=1.0).contains(&self.edit_rate) {
            return Err(ConfigError::InvalidRate {
                name: "edit_rate",
                value: self.edit_rate,
            });
        }
        if !(0.0..=1.0).contains(&self.recombination_rate) {
            return Err(ConfigError::InvalidRate {
                name: "recombination_rate",
                value: self.recombination_rate,
            });
        }
        self.mutation_rate.validate()?;
        if !self.viability.mask.any() {
            return Err(ConfigError::EmptyMeasureMask);
        }
        Ok(())
    }
}

/// Relative weights of the four mutation operations.
///
/// Weights are normalized on use, so they do not have to sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MutationRate {
    /// Weight of zeroing out an occupied position.
    pub delete: f64,
    /// Weight of redrawing an occupied position.
    pub change: f64,
    /// Weight of filling a padding position.
    pub insert: f64,
    /// Weight of exchanging a position with its successor.
    pub swap: f64,
}

impl Default for MutationRate {
    fn default() -> Self {
        Self {
            delete: 0.01,
            change: 0.3,
            insert: 0.3,
            swap: 0.3,
        }
    }
}

impl MutationRate {
    /// Create a rate, rejecting negative weights and an all-zero vector.
    pub fn new(delete: f64, change: f64, insert: f64, swap: f64) -> Result<Self, ConfigError> {
        let rate = Self {
            delete,
            change,
            insert,
            swap,
        };
        rate.validate()?;
        Ok(rate)
    }

    /// Validate the weight vector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.delete, self.change, self.insert, self.swap];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0
        {
            return Err(ConfigError::InvalidMutationRate {
                delete: self.delete,
                change: self.change,
                insert: self.insert,
                swap: self.swap,
            });
        }
        Ok(())
    }

    /// Normalized weights in order delete, change, insert, swap.
    pub fn probs(&self) -> [f64; 4] {
        let sum = self.delete + self.change + self.insert + self.swap;
        [
            self.delete / sum,
            self.change / sum,
            self.insert / sum,
            self.swap / sum,
        ]
    }

    /// Cumulative normalized weights, for inverse-transform draws.
    pub fn cumulative(&self) -> [f64; 4] {
        let p = self.probs();
        [p[0], p[0] + p[1], p[0] + p[1] + p[2], 1.0]
    }
}

/// Enables or disables each viability term, for ablation studies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureMask {
    /// Sparsity term (few edits).
    pub sparsity: bool,
    /// Similarity term (feature closeness).
    pub similarity: bool,
    /// Feasibility term (data likelihood).
    pub feasibility: bool,
    /// Improvement term (outcome likelihood).
    pub improvement: bool,
}

impl Default for MeasureMask {
    fn default() -> Self {
        Self::all()
    }
}

impl MeasureMask {
    /// Mask with every term enabled.
    pub fn all() -> Self {
        Self {
            sparsity: true,
            similarity: true,
            feasibility: true,
            improvement: true,
        }
    }

    /// True when at least one term is enabled.
    pub fn any(&self) -> bool {
        self.sparsity || self.similarity || self.feasibility || self.improvement
    }

    /// Number of enabled terms.
    pub fn count(&self) -> usize {
        [
            self.sparsity,
            self.similarity,
            self.feasibility,
            self.improvement,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    /// Bit encoding, sparsity as the highest bit. Used to label ablation runs.
    pub fn bits(&self) -> u8 {
        (self.sparsity as u8) << 3
            | (self.similarity as u8) << 2
            | (self.feasibility as u8) << 1
            | self.improvement as u8
    }

    /// All 16 masks, ordered by `bits()`.
    pub fn combinations() -> Vec<MeasureMask> {
        (0u8..16)
            .map(|b| MeasureMask {
                sparsity: b & 0b1000 != 0,
                similarity: b & 0b0100 != 0,
                feasibility: b & 0b0010 != 0,
                improvement: b & 0b0001 != 0,
            })
            .collect()
    }
}

/// Viability measure settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViabilityConfig {
    /// Term mask.
    #[serde(default)]
    pub mask: MeasureMask,
    /// Normalize feasibility by the batch maximum. The distance and
    /// improvement terms carry intrinsic scales and are unaffected.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    /// How enabled terms are combined into the total.
    #[serde(default)]
    pub combination: CombinationMode,
    /// Outcome-improvement formulation.
    #[serde(default)]
    pub improvement: ImprovementMode,
}

impl Default for ViabilityConfig {
    fn default() -> Self {
        Self {
            mask: MeasureMask::default(),
            normalize: default_normalize(),
            combination: CombinationMode::default(),
            improvement: ImprovementMode::default(),
        }
    }
}

/// How enabled viability terms are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CombinationMode {
    /// Sum of enabled terms.
    #[default]
    Sum,
    /// Product of enabled terms.
    Product,
}

/// Outcome-improvement formulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImprovementMode {
    /// Signed probability difference, normalized to [0, 1].
    #[default]
    Difference,
    /// Odds ratio of candidate vs factual, normalized to [0, 1].
    OddsRatio,
}

/// Initiator strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InitiatorKind {
    /// Repeat the factual seed.
    Factual,
    /// Uniform random events and Gaussian random features.
    Random,
    /// Sample rows from the training corpus.
    #[default]
    CaseBased,
    /// Random events with features drawn from the emission models.
    Sampled,
}

/// Selector strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SelectorKind {
    /// Viability-proportional draws with replacement.
    #[default]
    RouletteWheel,
    /// Random pairs, better viability wins.
    Tournament,
    /// Top half by viability.
    Elitism,
}

/// Crosser strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CrosserKind {
    /// Single cut point.
    OnePoint,
    /// Two cut points, father supplies the middle segment.
    #[default]
    TwoPoint,
    /// Per-position gene flips at the mother's occupied positions.
    Uniform,
}

/// Mutator strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MutatorKind {
    /// Redraws use uniform events and Gaussian features.
    #[default]
    Random,
    /// Redraws use the per-activity emission models.
    Sampled,
}

/// Recombiner strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecombinerKind {
    /// Keep the overall top `num_survivors`.
    #[default]
    FittestSurvivor,
    /// Reserve survivor slots for offspring before backfilling with parents.
    BestBreed,
}

/// Operator strategy selection, one kind per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorKinds {
    #[serde(default)]
    pub initiator: InitiatorKind,
    #[serde(default)]
    pub selector: SelectorKind,
    #[serde(default)]
    pub crosser: CrosserKind,
    #[serde(default)]
    pub mutator: MutatorKind,
    #[serde(default)]
    pub recombiner: RecombinerKind,
}

impl OperatorKinds {
    /// Short code identifying the bundle, e.g. `CBI-RWS-TPC-RMU-FSR`.
    pub fn code(&self) -> String {
        let init = match self.initiator {
            InitiatorKind::Factual => "FAI",
            InitiatorKind::Random => "RNI",
            InitiatorKind::CaseBased => "CBI",
            InitiatorKind::Sampled => "SMI",
        };
        let select = match self.selector {
            SelectorKind::RouletteWheel => "RWS",
            SelectorKind::Tournament => "TNS",
            SelectorKind::Elitism => "ELS",
        };
        let cross = match self.crosser {
            CrosserKind::OnePoint => "OPC",
            CrosserKind::TwoPoint => "TPC",
            CrosserKind::Uniform => "UNC",
        };
        let mutate = match self.mutator {
            MutatorKind::Random => "RMU",
            MutatorKind::Sampled => "SMU",
        };
        let recombine = match self.recombiner {
            RecombinerKind::FittestSurvivor => "FSR",
            RecombinerKind::BestBreed => "BBR",
        };
        format!("{init}-{select}-{cross}-{mutate}-{recombine}")
    }

    /// Cartesian product of all operator kinds, for grid experiments.
    pub fn combinations() -> Vec<OperatorKinds> {
        let initiators = [
            InitiatorKind::Factual,
            InitiatorKind::Random,
            InitiatorKind::CaseBased,
            InitiatorKind::Sampled,
        ];
        let selectors = [
            SelectorKind::RouletteWheel,
            SelectorKind::Tournament,
            SelectorKind::Elitism,
        ];
        let crossers = [
            CrosserKind::OnePoint,
            CrosserKind::TwoPoint,
            CrosserKind::Uniform,
        ];
        let mutators = [MutatorKind::Random, MutatorKind::Sampled];
        let recombiners = [RecombinerKind::FittestSurvivor, RecombinerKind::BestBreed];

        let mut out = Vec::with_capacity(
            initiators.len() * selectors.len() * crossers.len() * mutators.len()
                * recombiners.len(),
        );
        for &initiator in &initiators {
            for &selector in &selectors {
                for &crosser in &crossers {
                    for &mutator in &mutators {
                        for &recombiner in &recombiners {
                            out.push(OperatorKinds {
                                initiator,
                                selector,
                                crosser,
                                mutator,
                                recombiner,
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be non-zero")]
    InvalidPopulationSize,
    #[error("Survivor count {survivors} must be in 1..={population}")]
    InvalidSurvivorCount { survivors: usize, population: usize },
    #[error("Cycle budget must be non-zero")]
    InvalidCycleBudget,
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidRate { name: &'static str, value: f64 },
    #[error(
        "Mutation weights must be nonnegative with a positive sum, \
         got ({delete}, {change}, {insert}, {swap})"
    )]
    InvalidMutationRate {
        delete: f64,
        change: f64,
        insert: f64,
        swap: f64,
    },
    #[error("Measure mask disables every viability term")]
    EmptyMeasureMask,
}
