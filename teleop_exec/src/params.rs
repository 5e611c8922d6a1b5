//! # Teleoperation Executable Parameters
//!
//! This module provides parameters for the teleoperation executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use comms_if::{net::NetParams, tc::VehicleMode};

use crate::vehicle_client;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeleopExecParams {
    /// Minimum level of the log, for example `"info"` or `"trace"`
    pub log_level: String,

    /// Target period of one cycle of the main loop
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Period between heartbeats sent to the vehicle
    ///
    /// Units: seconds
    pub heartbeat_period_s: f64,

    /// Use the simulated vehicle instead of the vehicle link
    pub simulate_vehicle: bool,

    /// Flight mode the vehicle is put in at startup
    pub initial_mode: VehicleMode,

    /// How long to wait for the haptic device to accept the connection
    ///
    /// Units: seconds
    pub haptic_connect_timeout_s: f64,

    /// Finger position used as the touch control zero until one is set
    pub initial_finger_zero: f64,

    /// Marker size used until the operator sets one
    ///
    /// Units: meters
    pub initial_tag_size_m: f64,

    /// The operator is warned once the battery drops below this
    ///
    /// Units: percent
    pub battery_warn_pct: i8,

    /// Directory trial logs and videos are written to, relative to the software root
    pub trial_log_dir: String,

    /// Network endpoints
    pub net: NetParams,

    /// Vehicle command timeouts
    pub vehicle: vehicle_client::Params,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_file_parses() {
        let params: TeleopExecParams =
            util::params::from_str(include_str!("../../params/teleop_exec.toml")).unwrap();

        assert_eq!(params.cycle_period_s, 0.05);
        assert_eq!(params.heartbeat_period_s, 0.9);
        assert_eq!(params.initial_mode, VehicleMode::Stabilize);
        assert_eq!(params.initial_finger_zero, 1000.0);
        assert_eq!(params.vehicle.arm_timeout_s, 5.0);
        assert!(params.net.tc_endpoint.starts_with("tcp://"));
    }
}
