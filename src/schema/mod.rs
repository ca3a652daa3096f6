//! Schema module - Configuration, batch containers, and run statistics.

mod cases;
mod config;
mod stats;

pub use cases::*;
pub use config::*;
pub use stats::*;
