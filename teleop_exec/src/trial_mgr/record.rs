//! Trial records

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use comms_if::tc::Condition;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything known about a trial. Created when the trial starts and completed, once, when it
/// concludes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub participant_id: String,

    pub condition: Condition,

    pub repeat: u32,

    /// Size of the marker in use
    ///
    /// Units: meters
    pub tag_size_m: f64,

    /// Wall clock time the trial started
    pub start_wall: DateTime<Utc>,

    /// Monotonic session time the trial started. Trial times and the timeout are measured from
    /// this, `start_wall` only names the files.
    ///
    /// Units: seconds
    pub start_time_s: f64,

    /// Vehicle heading at the start
    ///
    /// Units: degrees
    pub start_heading_deg: f64,

    /// Finger position taken as "no turn" for this trial
    pub finger_zero: f64,

    /// Common stem of the trial's file names
    pub file_stem: String,

    /// Nominal frame rate of the trial's videos, `None` if not recorded
    pub video_fps: Option<f64>,

    pub outcome: Option<TrialOutcome>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How a trial concluded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TrialOutcome {
    Pass {
        end_time_s: f64,
    },
    Fail {
        end_time_s: f64,
        reason: FailReason,
    },
}

/// Why a trial failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailReason {
    /// Failed by the operator
    Unspecified,

    /// Ran for longer than the trial timeout
    Timeout,

    /// The vehicle stopped responding
    VehicleLinkLost,

    /// The haptic device stopped responding
    HapticLinkLost,

    /// The executable stopped while the trial was running
    Shutdown,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrialRecord {
    /// Build the file stem `PID_{pid}_CONDITION_{cond}_REPEAT_{n}_TIME_{ts}`.
    pub fn make_file_stem(
        participant_id: &str,
        condition: Condition,
        repeat: u32,
        start_wall: &DateTime<Utc>,
    ) -> String {
        format!(
            "PID_{}_CONDITION_{}_REPEAT_{}_TIME_{}",
            participant_id,
            condition,
            repeat,
            start_wall.format(util::session::TIMESTAMP_FORMAT)
        )
    }

    pub fn data_file_name(&self) -> String {
        format!("{}.txt", self.file_stem)
    }

    pub fn raw_video_file_name(&self) -> String {
        format!("{}_raw.mjpeg", self.file_stem)
    }

    pub fn markup_video_file_name(&self) -> String {
        format!("{}_markup.mjpeg", self.file_stem)
    }

    pub fn passed(&self) -> bool {
        matches!(self.outcome, Some(TrialOutcome::Pass { .. }))
    }
}

impl TrialOutcome {
    /// Terminal line of the data log.
    pub fn log_line(&self) -> String {
        match self {
            TrialOutcome::Pass { .. } => "PASS".into(),
            TrialOutcome::Fail { reason, .. } => format!("FAIL - {}", reason),
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailReason::Unspecified => "Unspecified",
            FailReason::Timeout => "timeout",
            FailReason::VehicleLinkLost => "vehicle link lost",
            FailReason::HapticLinkLost => "haptic link lost",
            FailReason::Shutdown => "shutdown",
        })
    }
}
