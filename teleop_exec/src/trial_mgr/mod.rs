//! # Trial Manager
//!
//! Governs the lifecycle of an experiment trial and the arming of the vehicle. The two are
//! independent: a trial can run whether or not the vehicle is armed, and the vehicle can be armed
//! outside of a trial.
//!
//! A trial goes `Idle -> Running -> Idle`, concluding as either a pass or a failure. While it runs
//! the trial owns the data log and the two video recordings, which are closed when it concludes.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod arming;
mod params;
mod record;
mod state;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use arming::*;
pub use params::*;
pub use record::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TrialMgrError {
    #[error("Failed to load TrialMgr parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("A trial is already running, conclude it before starting another")]
    AlreadyRunning,

    #[error("No trial is running")]
    NotRunning,

    #[error("A trial cannot start without a condition")]
    NoCondition,

    #[error("A trial cannot start without a participant ID")]
    NoParticipant,

    #[error("The participant ID {0:?} cannot be used in a file name")]
    InvalidParticipant(String),

    #[error("Trial log error: {0}")]
    LogError(crate::tm_logger::TmLoggerError),

    #[error("Trial video error: {0}")]
    VideoError(crate::video_log::VideoLogError),
}
