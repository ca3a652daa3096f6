//! Countertrace - Counterfactual explanations for sequence classifiers.
//!
//! This crate searches for counterfactual sequences: minimally edited
//! variants of a factual case that a classifier scores toward the desired
//! outcome while staying plausible under the training data. The search is
//! an evolutionary loop whose fitness is a multi-term viability measure
//! (edit sparsity, feature similarity, data feasibility, outcome
//! improvement).
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration types, batch containers, and run statistics
//! - `compute`: Numerical computation (edit distances, emission models,
//!   viability scoring, the evolutionary engine)
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
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Training corpus: two cases, three positions, two features each.
//! let training = Cases::new(
//!     vec![1, 2, 0, 2, 1, 1],
//!     vec![
//!         0.3, 1.0, 0.7, -0.2, 0.0, 0.0, //
//!         0.6, -0.1, 0.4, 0.9, 0.5, 0.2,
//!     ],
//!     3,
//!     2,
//! )?;
//! let factual = training.case(0)?;
//!
//! // Wire the measure to a classifier and fit the emission models.
//! let config = SearchConfig::default();
//! let oracle = Arc::new(LinearOracle::new(vec![0.8, -0.3], 0.1));
//! let measure = ViabilityMeasure::new(
//!     &training,
//!     FeatureLayout::all_continuous(2),
//!     oracle,
//!     config.viability,
//! )?;
//!
//! // Search counterfactuals for the factual case.
//! let mut engine = CounterfactualEngine::new(config, measure, training)?;
//! let result = engine.explain(&factual)?;
//!
//! println!(
//!     "best viability after {} cycles: {:.3}",
//!     result.stats.cycles_run, result.stats.best_viability
//! );
//! # Ok(())
//! # }
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{CounterfactualEngine, SearchError};
pub use compute::{LinearOracle, OutcomeOracle, ViabilityMeasure};
pub use schema::{Cases, SearchConfig, SearchResult};
