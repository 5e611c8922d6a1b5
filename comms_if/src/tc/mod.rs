//! # Telecommand module
//!
//! Telecommands (TCs) are the instructions sent to the control core by the operator surface, one
//! per button press. They arrive either over the network from the operator surface or from a
//! timed script.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod trial;
pub mod vehicle;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use thiserror::Error;

// Internal
pub use trial::{Condition, StartTrial, TrialCmd};
pub use vehicle::{ArmCmd, HapticCmd, JogCmd, LightSignal, StillKind, VehicleMode};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A telecommand, i.e. an instruction sent to the control core by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
pub enum Tc {
    /// Experiment trial lifecycle commands (start, pass, fail).
    #[structopt(name = "trial")]
    Trial(TrialCmd),

    /// Vehicle arming commands (arm, confirm, disarm).
    #[structopt(name = "arm")]
    Arm(ArmCmd),

    /// Fixed-rate jog commands on the motion channels.
    #[structopt(name = "jog")]
    Jog(JogCmd),

    /// Change the autopilot flight mode.
    #[structopt(name = "mode")]
    SetMode(VehicleMode),

    /// Toggle touchpad control of the vehicle.
    #[structopt(name = "touch")]
    TouchControl,

    /// Haptic device test and zeroing controls.
    #[structopt(name = "haptic")]
    Haptic(HapticCmd),

    /// Save a still image of the current camera view.
    #[structopt(name = "still")]
    Still(StillKind),

    /// Flash a cue to the diver using the vehicle light.
    #[structopt(name = "light")]
    LightSignal(LightSignal),

    /// Set the size of the fiducial marker in use, in meters.
    ///
    /// The value is kept as the text typed by the operator and validated by the control core.
    #[structopt(name = "tag")]
    SetTagSize {
        /// Marker size in meters, for example `1.12`.
        tag_size: String,
    },
}

/// Response sent back to the operator surface for every TC received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcResponse {
    /// The TC was accepted and executed
    Ok,

    /// The TC could not be parsed
    Invalid,

    /// The TC was understood but cannot be executed in the current state
    CannotExecute,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)
    }

    /// Serialise the TC into a JSON packet
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tc_json_layout() {
        assert_eq!(
            Tc::from_json(r#"{"Arm": "Confirm"}"#).unwrap(),
            Tc::Arm(ArmCmd::Confirm)
        );
        assert_eq!(Tc::from_json(r#""TouchControl""#).unwrap(), Tc::TouchControl);
        assert_eq!(
            Tc::from_json(
                r#"{"Trial": {"Start": {"participant_id": "12", "condition": "NoCurrent"}}}"#
            )
            .unwrap(),
            Tc::Trial(TrialCmd::Start(StartTrial {
                participant_id: "12".into(),
                condition: Some(Condition::NoCurrent),
                repeat: None,
            }))
        );
        assert!(Tc::from_json(r#"{"Jog": "Sideways"}"#).is_err());
    }

    #[test]
    fn test_tc_from_console_args() {
        let tc = Tc::from_iter_safe(&["tc", "trial", "start", "4", "--condition", "haptics"])
            .unwrap();
        assert_eq!(
            tc,
            Tc::Trial(TrialCmd::Start(StartTrial {
                participant_id: "4".into(),
                condition: Some(Condition::Haptics),
                repeat: None,
            }))
        );

        let tc = Tc::from_iter_safe(&["tc", "jog", "strafe-left"]).unwrap();
        assert_eq!(tc, Tc::Jog(JogCmd::StrafeLeft));
    }
}
