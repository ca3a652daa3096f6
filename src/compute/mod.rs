//! Compute module - Distance, likelihood, and search numerics for
//! counterfactual generation.

mod distance;
mod edit;
mod oracle;
mod viability;

pub mod emission;
pub mod evolution;

pub use distance::*;
pub use edit::*;
pub use oracle::*;
pub use viability::*;
