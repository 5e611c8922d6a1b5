//! # Vehicle Link Messages
//!
//! Messages exchanged with the vehicle autopilot. The field layout follows the autopilot's own
//! messages (heartbeat, RC channel override, command long/ack, scaled IMU, VFR HUD, system status)
//! so a bridge on the vehicle side can translate them one to one.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of RC channels carried by a channel override message.
pub const NUM_RC_CHANNELS: usize = 18;

/// Pulse width value meaning "do not override this channel".
pub const RC_NO_OVERRIDE: u16 = 65535;

/// Neutral pulse width for motion channels, in microseconds.
pub const PWM_NEUTRAL_US: u16 = 1500;

/// Number of main outputs before the AUX outputs start, servo numbers are offset by this.
pub const NUM_MAIN_OUTPUTS: u8 = 8;

/// Autopilot command identifiers.
pub mod cmd_id {
    /// Set the flight mode
    pub const DO_SET_MODE: u16 = 176;

    /// Set a servo output pulse width
    pub const DO_SET_SERVO: u16 = 183;

    /// Arm or disarm the motors
    pub const COMPONENT_ARM_DISARM: u16 = 400;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Heartbeat received from the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatData {
    /// True if the motors are armed
    pub armed: bool,

    /// Autopilot-specific mode number
    pub custom_mode: u32,
}

/// Acknowledgement of a command sent to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Identifier of the command being acknowledged, see [`cmd_id`].
    pub command: u16,

    /// Result of the command
    pub result: AckResult,
}

/// Raw IMU sample (scaled IMU 2 on the autopilot).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Acceleration in milli-g
    pub xacc: f64,
    pub yacc: f64,
    pub zacc: f64,

    /// Angular rate in milli-radians/second
    pub xgyro: f64,
    pub ygyro: f64,
    pub zgyro: f64,
}

/// Heads up display data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HudSample {
    /// Compass heading
    ///
    /// Units: degrees
    pub heading_deg: f64,

    /// Ground speed
    ///
    /// Units: meters/second
    pub groundspeed_ms: f64,

    /// Altitude, negative underwater
    ///
    /// Units: meters
    pub alt_m: f64,
}

/// System status summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SysStatus {
    /// Remaining battery in percent, -1 if unknown.
    pub battery_remaining_pct: i8,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Messages sent from the control core to the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VehicleCommand {
    /// Ground station liveness signal
    Heartbeat,

    /// Override of all RC channels, [`RC_NO_OVERRIDE`] releases a channel.
    RcChannelsOverride([u16; NUM_RC_CHANNELS]),

    /// Arm (`true`) or disarm (`false`) the motors.
    ArmDisarm { arm: bool },

    /// Set the flight mode to the given autopilot mode number.
    SetMode { custom_mode: u32 },

    /// Set the pulse width of an output.
    SetServo { servo: u8, pwm_us: u16 },
}

/// Messages received from the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VehicleTelemetry {
    Heartbeat(HeartbeatData),
    CommandAck(CommandAck),
    /// Names of the autopilot's flight modes and their mode numbers
    ModeMapping(HashMap<String, u32>),
    Imu(ImuSample),
    Hud(HudSample),
    SysStatus(SysStatus),
}

/// Result of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckResult {
    Accepted,
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    InProgress,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleCommand {
    /// Build a command setting AUX output `aux_n` (starting at 1) to the given pulse width.
    pub fn set_aux_servo(aux_n: u8, pwm_us: u16) -> Self {
        VehicleCommand::SetServo {
            servo: aux_n + NUM_MAIN_OUTPUTS,
            pwm_us,
        }
    }

    /// Identifier of the command in the autopilot numbering, if this message is a command.
    pub fn cmd_id(&self) -> Option<u16> {
        match self {
            VehicleCommand::ArmDisarm { .. } => Some(cmd_id::COMPONENT_ARM_DISARM),
            VehicleCommand::SetMode { .. } => Some(cmd_id::DO_SET_MODE),
            VehicleCommand::SetServo { .. } => Some(cmd_id::DO_SET_SERVO),
            _ => None,
        }
    }
}

impl AckResult {
    /// Human readable description of the result.
    pub fn description(&self) -> &'static str {
        match self {
            AckResult::Accepted => "Command is valid and was executed",
            AckResult::TemporarilyRejected => "Command is valid but cannot be executed now",
            AckResult::Denied => "Command is invalid",
            AckResult::Unsupported => "Command is not supported",
            AckResult::Failed => "Command is valid but execution failed",
            AckResult::InProgress => "Command is being executed",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aux_servo_offset() {
        assert_eq!(
            VehicleCommand::set_aux_servo(1, 1500),
            VehicleCommand::SetServo {
                servo: 9,
                pwm_us: 1500
            }
        );
    }

    #[test]
    fn test_override_serialises_all_channels() {
        let mut channels = [RC_NO_OVERRIDE; NUM_RC_CHANNELS];
        channels[4] = 1550;
        let json = serde_json::to_string(&VehicleCommand::RcChannelsOverride(channels)).unwrap();
        let back: VehicleCommand = serde_json::from_str(&json).unwrap();

        match back {
            VehicleCommand::RcChannelsOverride(c) => {
                assert_eq!(c.len(), NUM_RC_CHANNELS);
                assert_eq!(c[4], 1550);
                assert_eq!(c[0], RC_NO_OVERRIDE);
            }
            c => panic!("Unexpected command {:?}", c),
        }
    }
}
