//! # Pose Filter
//!
//! Exponential moving averages over the raw marker pose and vehicle telemetry, plus the derived
//! distance to the target.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during PoseFilter operation.
#[derive(Debug, thiserror::Error)]
pub enum PoseFilterError {
    #[error("Could not load the pose filter parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Field group {0} has an EMA window of {1}, must be at least 1")]
    InvalidWindow(&'static str, f64),
}
