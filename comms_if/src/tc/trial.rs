//! # Trial telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of a trial start command, as entered in the setup row of the operator surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
pub struct StartTrial {
    /// Participant identifier, must not be empty.
    pub participant_id: String,

    /// Experimental condition of the trial. A trial cannot start without one.
    #[structopt(long)]
    #[serde(default)]
    pub condition: Option<Condition>,

    /// Repeat number of this trial. If not given the control core's own repeat counter is used.
    #[structopt(long)]
    #[serde(default)]
    pub repeat: Option<u32>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Commands controlling the lifecycle of an experiment trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
pub enum TrialCmd {
    /// Start a new trial, opening its log and video files.
    #[structopt(name = "start")]
    Start(StartTrial),

    /// Conclude the running trial as a pass.
    #[structopt(name = "pass")]
    Pass,

    /// Conclude the running trial as a failure.
    #[structopt(name = "fail")]
    Fail,
}

/// Experimental conditions a trial can be run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Cross-current present, haptic feedback active
    Haptics,

    /// Cross-current present, no haptic feedback
    NoHaptics,

    /// No cross-current
    NoCurrent,

    /// Participant training run
    Training,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Condition {
    /// Name of the condition as used in log file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Haptics => "Haptics",
            Condition::NoHaptics => "NoHaptics",
            Condition::NoCurrent => "NoCurrent",
            Condition::Training => "Training",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "haptics" => Ok(Condition::Haptics),
            "nohaptics" | "no-haptics" => Ok(Condition::NoHaptics),
            "nocurrent" | "no-current" => Ok(Condition::NoCurrent),
            "training" => Ok(Condition::Training),
            _ => Err(format!(
                "{} is not a condition, expected one of haptics, no-haptics, no-current, training",
                s
            )),
        }
    }
}
