//! Evolutionary search module for generating counterfactual sequences.
//!
//! This module provides the generation loop and the pluggable operators
//! that drive it.
//!
//! # Overview
//!
//! The search system consists of:
//!
//! - **Operators** (`operators`): Strategy traits for the five roles of a
//!   cycle (initiate, select, cross, mutate, recombine) and the stock
//!   implementations, bundled per run in an [`EvoConfig`]
//! - **Engine** (`search`): The cycle loop, stop conditions, statistics
//!   collection, and the per-factual [`explain`](CounterfactualEngine::explain)
//!   / batched [`generate`](CounterfactualEngine::generate) entry points
//! - **Randomness** (`rng`): Seedable draws shared by every operator
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use countertrace::compute::emission::FeatureLayout;
//! use countertrace::compute::evolution::CounterfactualEngine;
//! use countertrace::compute::{LinearOracle, ViabilityMeasure};
//! use countertrace::schema::{Cases, SearchConfig};
//!
//! # fn run(training: Cases, factual: Cases) -> Result<(), Box<dyn std::error::Error>> {
//! let config = SearchConfig::default();
//! let oracle = Arc::new(LinearOracle::new(vec![0.4, -0.2], 0.1));
//! let measure = ViabilityMeasure::new(
//!     &training,
//!     FeatureLayout::all_continuous(2),
//!     oracle,
//!     config.viability,
//! )?;
//!
//! let mut engine = CounterfactualEngine::new(config, measure, training)?;
//! let result = engine.explain(&factual)?;
//!
//! println!("best viability: {:.3}", result.stats.best_viability);
//! println!("cycles run: {}", result.stats.cycles_run);
//! # Ok(())
//! # }
//! ```
//!
//! # Operator strategies
//!
//! Stock implementations per role:
//!
//! - Initiators: `Factual`, `Random`, `CaseBased`, `Sampled`
//! - Selectors: `RouletteWheel`, `Tournament`, `Elitism`
//! - Crossers: `OnePoint`, `TwoPoint`, `Uniform`
//! - Mutators: `Random`, `Sampled`
//! - Recombiners: `FittestSurvivor`, `BestBreed`
//!
//! [`EvoConfig::combinations`] enumerates every bundle for sweep
//! experiments; custom strategies plug in through the role traits.

mod operators;
mod rng;
mod search;

pub use operators::{
    Crosser, EvoConfig, EvoContext, Initiator, Mutator, OperatorError, Recombiner, Selector,
};
pub use rng::SearchRng;
pub use search::{CounterfactualEngine, SearchError};
