//! The evolutionary counterfactual search loop.
//!
//! One engine owns a [`ViabilityMeasure`], an operator bundle, and the
//! training corpus. [`CounterfactualEngine::explain`] runs the full
//! generation loop for a single factual case: initiate and score, then
//! select, cross, mutate, merge with the parents, re-score the merged pool
//! in one batch, and recombine, until the cycle budget runs out, the best
//! viability stagnates, or the cancellation flag is raised. The pool at the
//! start of every cycle is a complete, valid snapshot, so stopping between
//! cycles never leaves partial state behind.
//!
//! Runs are deterministic for a fixed `random_seed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::compute::viability::{ViabilityError, ViabilityMeasure};
use crate::schema::{
    Cases, CasesError, ConfigError, CycleStats, EvaluatedCases, MutationCounts, Population,
    SearchConfig, SearchHistory, SearchResult, SearchStats, StopReason,
};

use super::operators::{EvoConfig, EvoContext, OperatorError};
use super::rng::SearchRng;

/// Errors raised while setting up or running a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cases(#[from] CasesError),

    #[error(transparent)]
    Viability(#[from] ViabilityError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error("Factual batch must contain exactly one case, got {0}")]
    FactualNotSingle(usize),

    #[error(
        "Factual row shape {factual_max_len}x{factual_features} does not match \
         the training corpus {corpus_max_len}x{corpus_features}"
    )]
    ShapeMismatch {
        factual_max_len: usize,
        factual_features: usize,
        corpus_max_len: usize,
        corpus_features: usize,
    },
}

/// Searches counterfactual sequences for factual cases.
pub struct CounterfactualEngine {
    config: SearchConfig,
    operators: EvoConfig,
    measure: ViabilityMeasure,
    training: Cases,
    vocab: u32,
    rng: SearchRng,
    cancelled: Arc<AtomicBool>,
}

impl CounterfactualEngine {
    /// Create an engine over a fitted measure and its training corpus.
    ///
    /// The event vocabulary is taken from the corpus: mutation and
    /// initiation draw ids up to the highest observed event.
    pub fn new(
        config: SearchConfig,
        measure: ViabilityMeasure,
        training: Cases,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if training.is_empty() {
            return Err(CasesError::EmptyCases.into());
        }
        let vocab = training.events().iter().copied().max().unwrap_or(1).max(1);
        let operators = EvoConfig::from_kinds(config.operators);
        let rng = match config.random_seed {
            Some(seed) => SearchRng::new(seed),
            None => SearchRng::random(),
        };
        Ok(Self {
            config,
            operators,
            measure,
            training,
            vocab,
            rng,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Swap in a custom operator bundle, e.g. from a sweep grid.
    pub fn with_operators(mut self, operators: EvoConfig) -> Self {
        self.operators = operators;
        self
    }

    /// Handle for stopping the engine from another thread. The flag is
    /// checked between cycles; a raised flag also stops every remaining
    /// run of a batched [`CounterfactualEngine::generate`] call.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The measure scoring every candidate batch.
    pub fn measure(&self) -> &ViabilityMeasure {
        &self.measure
    }

    /// Run the evolutionary loop for one factual case.
    ///
    /// Returns the final survivors ranked best first, plus the stop reason
    /// and the per-cycle history.
    pub fn explain(&mut self, factual: &Cases) -> Result<SearchResult, SearchError> {
        if factual.len() != 1 {
            return Err(SearchError::FactualNotSingle(factual.len()));
        }
        if factual.max_len() != self.training.max_len()
            || factual.num_features() != self.training.num_features()
        {
            return Err(SearchError::ShapeMismatch {
                factual_max_len: factual.max_len(),
                factual_features: factual.num_features(),
                corpus_max_len: self.training.max_len(),
                corpus_features: self.training.num_features(),
            });
        }

        let started = std::time::Instant::now();
        let CounterfactualEngine {
            config,
            operators,
            measure,
            training,
            vocab,
            rng,
            cancelled,
        } = self;
        let mut ctx = EvoContext {
            rng,
            max_len: training.max_len(),
            num_features: training.num_features(),
            vocab: *vocab,
            sample_size: config.population_size,
            num_survivors: config.num_survivors,
            edit_rate: config.edit_rate,
            recombination_rate: config.recombination_rate,
            mutation_rate: config.mutation_rate,
            training: Some(training),
            emissions: Some(measure.emissions()),
        };

        let mut history = SearchHistory::new();
        let mut evaluations = 0usize;

        let initial = operators.initiator.initiate(factual, &mut ctx)?;
        let mut population = Population::from_cases(initial);
        let scores = measure.score(factual, population.cases())?;
        population.set_viability(scores)?;
        evaluations += population.len();

        let mut best = population.max_fitness()?;
        let mut stale = 0usize;
        let mut stop_reason = StopReason::MaxCycles;

        for cycle in 1..=config.max_cycles {
            if cancelled.load(Ordering::Relaxed) {
                stop_reason = StopReason::Cancelled;
                break;
            }

            let n_population = population.len();
            let selection = operators.selector.select(&population, &mut ctx)?;
            let offspring = operators.crosser.cross(&selection, &mut ctx)?;
            let mutated = operators.mutator.mutate(&offspring, &mut ctx)?;
            let mutations = MutationCounts::from_labels(mutated.mutations());

            let mut candidates = mutated.merge(&population)?;
            let scores = measure.score(factual, candidates.cases())?;
            candidates.set_viability(scores)?;
            evaluations += candidates.len();

            let n_candidates = candidates.len();
            let survivors = operators.recombiner.recombine(candidates, &mut ctx)?;

            let record = CycleStats {
                cycle,
                n_population,
                n_selected: selection.len(),
                n_offspring: offspring.len(),
                n_mutated: mutated.len(),
                n_candidates,
                n_survivors: survivors.len(),
                mutations,
                avg_viability: survivors.avg_fitness()?,
                median_viability: survivors.median_fitness()?,
                max_viability: survivors.max_fitness()?,
                avg_padding_share: survivors.cases().avg_padding_share(),
            };
            log::debug!(
                "cycle {}: best {:.4}, avg {:.4}, candidates {}",
                cycle,
                record.max_viability,
                record.avg_viability,
                record.n_candidates
            );

            if record.max_viability > best {
                best = record.max_viability;
                stale = 0;
            } else {
                stale += 1;
            }
            history.push(record);

            population = survivors;
            population.reset_mutations();

            if let Some(limit) = config.stagnation_limit
                && stale >= limit
            {
                stop_reason = StopReason::Stagnation { cycles: stale };
                break;
            }
        }

        let stats = SearchStats {
            cycles_run: history.len(),
            evaluations,
            best_viability: best,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        let pool = population.into_evaluated()?;
        let survivors = pool.topk(pool.len())?;

        Ok(SearchResult {
            survivors,
            stop_reason,
            history,
            stats,
        })
    }

    /// Run one search per factual and keep each run's `top_k` best.
    pub fn generate(
        &mut self,
        factuals: &Cases,
        top_k: usize,
    ) -> Result<Vec<EvaluatedCases>, SearchError> {
        if factuals.is_empty() {
            return Err(CasesError::EmptyCases.into());
        }
        let mut results = Vec::with_capacity(factuals.len());
        for i in 0..factuals.len() {
            let factual = factuals.case(i)?;
            let result = self.explain(&factual)?;
            results.push(result.survivors.topk(top_k)?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::emission::FeatureLayout;
    use crate::compute::oracle::{LinearOracle, OutcomeOracle};
    use crate::schema::{InitiatorKind, MeasureMask, OperatorKinds, ViabilityConfig};

    const MAX_LEN: usize = 6;
    const NUM_FEATURES: usize = 2;

    /// Corpus over events 1..=3 whose first feature tracks the event id.
    fn training_corpus() -> Cases {
        let mut events = Vec::new();
        let mut features = Vec::new();
        for case in 0..12u32 {
            for pos in 0..MAX_LEN as u32 {
                let event = if pos < 4 { (case + pos) % 3 + 1 } else { 0 };
                events.push(event);
                if event == 0 {
                    features.extend_from_slice(&[0.0, 0.0]);
                } else {
                    features.push(event as f64 + 0.1 * (case % 3) as f64);
                    features.push(-(event as f64) - 0.1 * (pos % 2) as f64);
                }
            }
        }
        Cases::new(events, features, MAX_LEN, NUM_FEATURES).unwrap()
    }

    fn factual() -> Cases {
        let events = vec![1, 2, 3, 1, 0, 0];
        let mut features = vec![0.0; MAX_LEN * NUM_FEATURES];
        for (pos, &event) in events.iter().enumerate() {
            if event != 0 {
                features[pos * NUM_FEATURES] = event as f64;
                features[pos * NUM_FEATURES + 1] = -(event as f64);
            }
        }
        Cases::new(events, features, MAX_LEN, NUM_FEATURES).unwrap()
    }

    fn engine_with(config: SearchConfig, oracle: Arc<dyn OutcomeOracle>) -> CounterfactualEngine {
        let training = training_corpus();
        let measure = ViabilityMeasure::new(
            &training,
            FeatureLayout::all_continuous(NUM_FEATURES),
            oracle,
            config.viability,
        )
        .unwrap();
        CounterfactualEngine::new(config, measure, training).unwrap()
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            population_size: 30,
            num_survivors: 10,
            max_cycles: 8,
            random_seed: Some(7),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let config = SearchConfig {
            num_survivors: 0,
            ..small_config()
        };
        let training = training_corpus();
        let oracle = Arc::new(LinearOracle::new(vec![1.0, 0.0], 0.0));
        let measure = ViabilityMeasure::new(
            &training,
            FeatureLayout::all_continuous(NUM_FEATURES),
            oracle,
            ViabilityConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            CounterfactualEngine::new(config, measure, training),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn test_explain_rejects_multi_factual() {
        let oracle = Arc::new(LinearOracle::new(vec![1.0, 0.0], 0.0));
        let mut engine = engine_with(small_config(), oracle);
        let two = training_corpus().select(&[0, 1]).unwrap();
        assert!(matches!(
            engine.explain(&two),
            Err(SearchError::FactualNotSingle(2))
        ));
    }

    #[test]
    fn test_explain_rejects_shape_mismatch() {
        let oracle = Arc::new(LinearOracle::new(vec![1.0, 0.0], 0.0));
        let mut engine = engine_with(small_config(), oracle);
        let narrow = Cases::new(vec![1, 2, 0], vec![0.0; 6], 3, NUM_FEATURES).unwrap();
        assert!(matches!(
            engine.explain(&narrow),
            Err(SearchError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_search_exhausts_cycle_budget() {
        let oracle = Arc::new(LinearOracle::new(vec![1.0, 0.0], 0.0));
        let mut engine = engine_with(small_config(), oracle);
        let result = engine.explain(&factual()).unwrap();

        assert_eq!(result.stop_reason, StopReason::MaxCycles);
        assert_eq!(result.history.len(), 8);
        assert_eq!(result.stats.cycles_run, 8);
        assert_eq!(result.survivors.len(), 10);
        assert!(result.stats.evaluations > 30);
        assert!(result.stats.elapsed_secs >= 0.0);

        // Survivors come back best first.
        let totals = result.survivors.viability().total();
        for pair in totals.windows(2) {
            assert!(pair[0] >= pair[1]);
        }

        // Every cycle recorded the staged counts.
        for (i, record) in result.history.cycles().iter().enumerate() {
            assert_eq!(record.cycle, i + 1);
            assert_eq!(record.n_mutated, record.n_offspring);
            assert_eq!(
                record.n_candidates,
                record.n_mutated + record.n_population
            );
            assert_eq!(record.n_survivors, 10);
        }
    }

    #[test]
    fn test_search_never_loses_the_best_candidate() {
        // Factual start plus an elitist recombiner: with deterministic
        // scoring the merged pool always contains last cycle's best, so
        // the running best may not decrease.
        let config = SearchConfig {
            max_cycles: 12,
            operators: OperatorKinds {
                initiator: InitiatorKind::Factual,
                ..OperatorKinds::default()
            },
            viability: ViabilityConfig {
                mask: MeasureMask {
                    sparsity: false,
                    similarity: false,
                    feasibility: false,
                    improvement: true,
                },
                ..ViabilityConfig::default()
            },
            ..small_config()
        };
        let oracle = Arc::new(LinearOracle::new(vec![1.0, 0.0], -2.0));
        let mut engine = engine_with(config, oracle);
        let result = engine.explain(&factual()).unwrap();

        let best_per_cycle: Vec<f64> = result
            .history
            .cycles()
            .iter()
            .map(|r| r.max_viability)
            .collect();
        for pair in best_per_cycle.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        // The factual itself scores 0.5 on the improvement term.
        assert!(result.stats.best_viability >= 0.5);
    }

    #[test]
    fn test_full_scale_run_stays_within_bounds() {
        // Larger end-to-end run: factual start, improvement-only scoring,
        // 50 cycles at population 100 / survivors 25.
        let ml = 10;
        let mut events = Vec::new();
        let mut features = Vec::new();
        for case in 0..20u32 {
            for pos in 0..ml as u32 {
                let event = if pos < 6 + case % 4 { (case + pos) % 4 + 1 } else { 0 };
                events.push(event);
                if event == 0 {
                    features.extend_from_slice(&[0.0, 0.0]);
                } else {
                    features.push(event as f64 * 0.5);
                    features.push(0.25 * (case % 5) as f64 - 0.5);
                }
            }
        }
        let training = Cases::new(events, features, ml, NUM_FEATURES).unwrap();
        let factual = training.case(3).unwrap();

        let config = SearchConfig {
            population_size: 100,
            num_survivors: 25,
            max_cycles: 50,
            random_seed: Some(13),
            operators: OperatorKinds {
                initiator: InitiatorKind::Factual,
                ..OperatorKinds::default()
            },
            viability: ViabilityConfig {
                mask: MeasureMask {
                    sparsity: false,
                    similarity: false,
                    feasibility: false,
                    improvement: true,
                },
                ..ViabilityConfig::default()
            },
            ..SearchConfig::default()
        };
        let oracle = Arc::new(LinearOracle::new(vec![1.5, 0.5], -1.0));
        let measure = ViabilityMeasure::new(
            &training,
            FeatureLayout::all_continuous(NUM_FEATURES),
            oracle,
            config.viability,
        )
        .unwrap();
        let mut engine = CounterfactualEngine::new(config, measure, training).unwrap();

        let result = engine.explain(&factual).unwrap();
        assert_eq!(result.stop_reason, StopReason::MaxCycles);
        assert_eq!(result.history.len(), 50);
        for record in result.history.cycles() {
            assert_eq!(record.n_survivors, 25);
            assert!(record.n_candidates <= 200);
        }
        // The factual seeds the pool and scores 0.5 on the improvement
        // term; the running best never drops below it.
        assert!(result.stats.best_viability >= 0.5);
    }

    #[test]
    fn test_cancellation_stops_before_first_cycle() {
        let oracle = Arc::new(LinearOracle::new(vec![1.0, 0.0], 0.0));
        let mut engine = engine_with(small_config(), oracle);
        let cancel = engine.cancel_handle();
        cancel.store(true, Ordering::Relaxed);

        let result = engine.explain(&factual()).unwrap();
        assert_eq!(result.stop_reason, StopReason::Cancelled);
        assert!(result.history.is_empty());
        // The initial pool is returned as-is, scored and ranked.
        assert_eq!(result.survivors.len(), 30);
    }

    #[test]
    fn test_stagnation_stops_early() {
        // A constant oracle makes every candidate score the same on the
        // improvement-only measure, so the best can never move.
        let config = SearchConfig {
            stagnation_limit: Some(3),
            viability: ViabilityConfig {
                mask: MeasureMask {
                    sparsity: false,
                    similarity: false,
                    feasibility: false,
                    improvement: true,
                },
                ..ViabilityConfig::default()
            },
            ..small_config()
        };
        let oracle = Arc::new(LinearOracle::new(vec![0.0, 0.0], 0.0));
        let mut engine = engine_with(config, oracle);
        let result = engine.explain(&factual()).unwrap();

        assert_eq!(result.stop_reason, StopReason::Stagnation { cycles: 3 });
        assert_eq!(result.history.len(), 3);
    }

    #[test]
    fn test_generate_returns_topk_per_factual() {
        let oracle = Arc::new(LinearOracle::new(vec![1.0, 0.0], 0.0));
        let mut engine = engine_with(small_config(), oracle);
        let factuals = training_corpus().select(&[0, 5]).unwrap();

        let results = engine.generate(&factuals, 5).unwrap();
        assert_eq!(results.len(), 2);
        for survivors in &results {
            assert_eq!(survivors.len(), 5);
            let totals = survivors.viability().total();
            for pair in totals.windows(2) {
                assert!(pair[0] >= pair[1]);
            }
        }
    }

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let oracle: Arc<dyn OutcomeOracle> = Arc::new(LinearOracle::new(vec![1.0, 0.0], 0.0));
        let mut first = engine_with(small_config(), Arc::clone(&oracle));
        let mut second = engine_with(small_config(), oracle);

        let a = first.explain(&factual()).unwrap();
        let b = second.explain(&factual()).unwrap();
        assert_eq!(a.survivors.viability().total(), b.survivors.viability().total());
        assert_eq!(a.survivors.cases().events(), b.survivors.cases().events());
    }
}
