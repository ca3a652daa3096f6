//! Per-activity probability models for feature emissions.
//!
//! Likelihood scoring asks "how plausible are these feature values for this
//! event id, given the training corpus". The module answers that with one
//! fitted model per event id plus a pooled fallback:
//!
//! - **Gaussian blocks** (`gaussian`): Multivariate normal over continuous
//!   columns with a deterministic repair ladder for degenerate covariance
//! - **Discrete blocks** (`discrete`): Bernoulli indicators and one-hot
//!   multinoulli categories
//! - **Model table** (`table`): Column layout, per-activity fitting, and
//!   batch feasibility scoring
//!
//! Scoring never fails and never returns negative infinity. Ill-conditioned
//! training data degrades through tagged approximation levels instead, and
//! per-position likelihoods are floored before the log.

mod discrete;
mod gaussian;
mod table;

pub use discrete::{BernoulliGroup, MultinoulliGroup};
pub use gaussian::{
    ApproxMode, ApproximationLevel, DEFAULT_EPSILON, EpsilonMode, GaussianParams,
    MultivariateGaussian,
};
pub use table::{ActivityModel, EmissionTable, FeatureGroup, FeatureLayout, ModelError};
