//! # Vehicle and haptic telecommands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Arming commands. Arming is a two step process, `Request` then `Confirm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StructOpt)]
pub enum ArmCmd {
    /// Request arming, which must then be confirmed.
    #[structopt(name = "request")]
    Request,

    /// Confirm a previous arm request and arm the vehicle.
    #[structopt(name = "confirm")]
    Confirm,

    /// Disarm the vehicle.
    #[structopt(name = "disarm")]
    Disarm,
}

/// Fixed-rate motion commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StructOpt)]
pub enum JogCmd {
    Forward,
    Reverse,
    Left,
    Right,
    Up,
    Down,
    StrafeLeft,
    StrafeRight,
    /// Zero the throttle, yaw, and lateral channels, keeping forward motion.
    Straight,
    /// Return all motion channels to neutral.
    AllStop,
}

/// Autopilot flight modes the operator can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StructOpt)]
pub enum VehicleMode {
    /// Direct pass-through of the channel setpoints
    Manual,

    /// Depth-holding mode (ALT_HOLD)
    Stabilize,
}

/// Haptic device controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StructOpt)]
pub enum HapticCmd {
    StartVibration,
    StopVibration,
    GoHard,
    GoSoft,
    /// Set the touchpad zero reference to the current finger position.
    Zero,
    /// Log the current finger position and force.
    Print,
}

/// Which camera view to save as a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StructOpt)]
pub enum StillKind {
    /// The frame as received from the camera
    Raw,
    /// The frame with the participant's aiming circle drawn on it
    Circle,
    /// The frame annotated by the marker detector
    Annotated,
}

/// Light cues which can be flashed to the diver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StructOpt)]
pub enum LightSignal {
    ReadyToStart,
    ReadyToEnd,
    MoveArea,
    Emergency,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleMode {
    /// The autopilot's name for this mode, used to look it up in the vehicle's mode mapping.
    pub fn autopilot_name(&self) -> &'static str {
        match self {
            VehicleMode::Manual => "MANUAL",
            VehicleMode::Stabilize => "ALT_HOLD",
        }
    }
}
