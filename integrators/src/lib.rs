//! Integrators

#[macro_use]
extern crate log;

mod candidate;
mod controller;
mod correlation;
mod cost;
mod estimator;
mod knobs;
mod mis;
mod optimizer;
mod stats;

// Re-export.
pub use candidate::*;
pub use controller::*;
pub use correlation::*;
pub use cost::*;
pub use estimator::*;
pub use knobs::*;
pub use mis::*;
pub use optimizer::*;
pub use stats::*;
