//! # TM Server
//!
//! Publishes a status packet every cycle for the operator display.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

use comms_if::{
    eqpt::{
        cam::PoseSample,
        haptic::{HapticDemand, HapticReading},
        vehicle::{HudSample, ImuSample},
    },
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

use crate::{
    cmd_mapper::TouchDemands,
    data_store::{DataStore, TouchControl},
    pose_filter::FilteredPose,
    trial_mgr::{ArmingState, HapticCues, TrialRecord},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry server
pub struct TmServer {
    socket: MonitoredSocket,
}

/// Telemetry packet that is output by the server.
#[derive(Debug, Serialize)]
pub struct TmPacket<'a> {
    pub session_time_s: f64,

    pub num_cycles: u128,

    pub arming: ArmingState,

    /// Flight mode name reported by the vehicle
    pub vehicle_mode: Option<&'a str>,

    pub vehicle_armed: Option<bool>,

    pub battery_remaining_pct: Option<i8>,

    pub battery_low: bool,

    pub imu: Option<ImuSample>,

    pub hud: Option<HudSample>,

    pub raw_pose: PoseSample,

    pub filtered_pose: FilteredPose,

    /// Marker size the vision pipeline should use
    pub tag_size_m: f64,

    pub num_dropped_frames: u64,

    pub haptic_alive: bool,

    pub haptic_reading: HapticReading,

    pub haptic_demand: HapticDemand,

    pub finger_zero: f64,

    pub haptic_cues: HapticCues,

    pub touch_control: TouchControl,

    pub touch_demands: TouchDemands,

    /// The running trial, if any
    pub trial: Option<&'a TrialRecord>,

    pub trial_elapsed_s: Option<f64>,

    pub next_repeat: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send telemetry: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmServer {
    /// Create a new instance of the TM Server.
    ///
    /// This function will not block until a client connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, TmServerError> {
        let socket_options = SocketOptions {
            bind: true,
            recv_timeout: 10,
            send_timeout: 10,
            ..SocketOptions::link()
        };

        let socket = MonitoredSocket::new(ctx, zmq::PUB, socket_options, &params.tm_endpoint)
            .map_err(TmServerError::SocketError)?;

        Ok(Self { socket })
    }

    /// Publish the packet for this cycle.
    pub fn send(&mut self, packet: &TmPacket) -> Result<(), TmServerError> {
        let packet_string =
            serde_json::to_string(packet).map_err(TmServerError::SerializationError)?;

        self.socket
            .send(packet_string.as_str(), 0)
            .map_err(TmServerError::SendError)
    }
}

impl<'a> TmPacket<'a> {
    /// Build the packet from the data store and the running trial.
    pub fn new(ds: &'a DataStore, trial: Option<&'a TrialRecord>, next_repeat: u32) -> Self {
        let tm = &ds.vehicle_tm;

        Self {
            session_time_s: ds.session_time_s,
            num_cycles: ds.num_cycles,
            arming: ds.arming.state(),
            vehicle_mode: tm.mode_name(),
            vehicle_armed: tm.heartbeat.latest.map(|hb| hb.armed),
            battery_remaining_pct: tm.sys_status.latest.map(|s| s.battery_remaining_pct),
            battery_low: ds.battery_warned,
            imu: tm.imu.latest,
            hud: tm.hud.latest,
            raw_pose: ds.raw_pose,
            filtered_pose: ds.filtered_pose,
            tag_size_m: ds.tag_size_m,
            num_dropped_frames: ds.num_dropped_frames,
            haptic_alive: ds.haptic_alive,
            haptic_reading: ds.haptic_reading,
            haptic_demand: ds.haptic_demand,
            finger_zero: ds.finger_zero,
            haptic_cues: ds.haptic_cues,
            touch_control: ds.touch_control,
            touch_demands: ds.touch_demands,
            trial,
            trial_elapsed_s: ds.trial_elapsed_s,
            next_repeat,
        }
    }
}
