//! Quick counterfactual search performance test

use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

use countertrace::compute::emission::FeatureLayout;
use countertrace::compute::evolution::{CounterfactualEngine, SearchRng};
use countertrace::compute::{LinearOracle, OutcomeOracle, ViabilityMeasure};
use countertrace::schema::{
    Cases, CrosserKind, InitiatorKind, MutatorKind, OperatorKinds, RecombinerKind, SearchConfig,
    SelectorKind,
};

const MAX_LEN: usize = 12;
const NUM_FEATURES: usize = 3;
const VOCAB: u32 = 6;

/// Sequences whose features correlate with their event ids, so the fitted
/// emission models have something to learn.
fn synthetic_corpus(rng: &mut SearchRng, num_cases: usize) -> Result<Cases, Box<dyn Error>> {
    let mut events = Vec::with_capacity(num_cases * MAX_LEN);
    let mut features = Vec::with_capacity(num_cases * MAX_LEN * NUM_FEATURES);
    for _ in 0..num_cases {
        let len = 4 + rng.index(MAX_LEN - 3);
        for pos in 0..MAX_LEN {
            if pos < len {
                let event = rng.event(VOCAB);
                events.push(event);
                features.push(event as f64 + 0.5 * rng.standard_normal());
                features.push(-(event as f64) / 2.0 + 0.3 * rng.standard_normal());
                features.push(rng.standard_normal());
            } else {
                events.push(0);
                features.extend_from_slice(&[0.0; NUM_FEATURES]);
            }
        }
    }
    Ok(Cases::new(events, features, MAX_LEN, NUM_FEATURES)?)
}

fn engine_for(
    config: SearchConfig,
    training: &Cases,
    oracle: Arc<dyn OutcomeOracle>,
) -> Result<CounterfactualEngine, Box<dyn Error>> {
    let measure = ViabilityMeasure::new(
        training,
        FeatureLayout::all_continuous(NUM_FEATURES),
        oracle,
        config.viability,
    )?;
    Ok(CounterfactualEngine::new(
        config,
        measure,
        training.clone(),
    )?)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut rng = SearchRng::new(42);
    let training = synthetic_corpus(&mut rng, 200)?;
    let factual = training.case(0)?;
    let oracle: Arc<dyn OutcomeOracle> =
        Arc::new(LinearOracle::new(vec![0.9, -0.4, 0.15], -1.2));

    println!("=== Search Performance Test ===\n");

    for population_size in [100, 250, 500] {
        let config = SearchConfig {
            population_size,
            num_survivors: population_size / 4,
            max_cycles: 10,
            random_seed: Some(42),
            ..SearchConfig::default()
        };

        let start = Instant::now();
        let mut engine = engine_for(config, &training, Arc::clone(&oracle))?;
        let result = engine.explain(&factual)?;
        let elapsed = start.elapsed();

        let evals_per_sec = result.stats.evaluations as f64 / elapsed.as_secs_f64();

        println!("Population size: {}", population_size);
        println!("  Cycles:          {}", result.stats.cycles_run);
        println!("  Evaluations:     {}", result.stats.evaluations);
        println!("  Elapsed:         {:.2}s", elapsed.as_secs_f64());
        println!("  Evals/sec:       {:.1}", evals_per_sec);
        println!("  Best viability:  {:.4}", result.stats.best_viability);
        println!();
    }

    println!("=== Operator Bundles (population 250) ===\n");

    let bundles = [
        OperatorKinds::default(),
        OperatorKinds {
            initiator: InitiatorKind::Factual,
            selector: SelectorKind::Tournament,
            crosser: CrosserKind::OnePoint,
            mutator: MutatorKind::Random,
            recombiner: RecombinerKind::BestBreed,
        },
        OperatorKinds {
            initiator: InitiatorKind::Sampled,
            selector: SelectorKind::Elitism,
            crosser: CrosserKind::TwoPoint,
            mutator: MutatorKind::Sampled,
            recombiner: RecombinerKind::FittestSurvivor,
        },
    ];

    for kinds in bundles {
        let config = SearchConfig {
            population_size: 250,
            num_survivors: 62,
            max_cycles: 10,
            operators: kinds,
            random_seed: Some(42),
            ..SearchConfig::default()
        };

        let start = Instant::now();
        let mut engine = engine_for(config, &training, Arc::clone(&oracle))?;
        let result = engine.explain(&factual)?;

        println!(
            "{}: best {:.4} in {:.2}s ({} evaluations)",
            kinds.code(),
            result.stats.best_viability,
            start.elapsed().as_secs_f64(),
            result.stats.evaluations
        );
    }

    Ok(())
}
