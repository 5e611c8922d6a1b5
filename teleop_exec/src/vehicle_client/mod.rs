//! # Vehicle Client
//!
//! The vehicle client owns the main loop's end of the vehicle link. It caches the latest telemetry
//! of each kind and provides the commands which need confirmation from the vehicle (arm, disarm,
//! mode changes). Every wait for confirmation is bounded by a timeout, while waiting any other
//! telemetry received is cached and acknowledgements for other commands are ignored.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod link;
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use comms_if::eqpt::vehicle::{
    cmd_id, AckResult, CommandAck, HeartbeatData, HudSample, ImuSample, SysStatus,
    VehicleCommand, VehicleTelemetry,
};

pub use link::{UdpVehicleLink, VehicleLink, VehicleLinkError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Vehicle client
pub struct VehicleClient {
    link: Arc<dyn VehicleLink>,

    params: Params,

    cache: TelemetryCache,
}

/// Timeouts used by the vehicle client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    /// How long to wait for a command acknowledgement
    pub ack_timeout_s: f64,

    /// How long to wait for the heartbeat confirming an arm or disarm
    pub arm_timeout_s: f64,

    /// How long to wait for a heartbeat after a mode change
    pub heartbeat_timeout_s: f64,

    /// How long to wait for the vehicle to appear at startup
    pub startup_timeout_s: f64,
}

/// Latest value of a telemetry item, and whether it was received this cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Cached<T> {
    pub latest: Option<T>,
    pub fresh: bool,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            latest: None,
            fresh: false,
        }
    }
}

/// Latest telemetry received from the vehicle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryCache {
    pub heartbeat: Cached<HeartbeatData>,
    pub imu: Cached<ImuSample>,
    pub hud: Cached<HudSample>,
    pub sys_status: Cached<SysStatus>,

    /// Flight mode names and their numbers
    pub mode_mapping: HashMap<String, u32>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VehicleClientError {
    #[error("Vehicle link error: {0}")]
    LinkError(VehicleLinkError),

    #[error("No acknowledgement for command {0} within {1} s")]
    AckTimeout(u16, f64),

    #[error("Command {0} was not accepted: {}", .1.description())]
    CommandRejected(u16, AckResult),

    #[error("No heartbeat from the vehicle within {0} s")]
    HeartbeatTimeout(f64),

    #[error("The vehicle did not report being {0} within {1} s")]
    ArmTimeout(&'static str, f64),

    #[error("The vehicle has not sent its flight mode table")]
    NoModeMapping,

    #[error("The vehicle has no flight mode called {0}")]
    UnknownMode(String),
}

/// Outcome of receiving one message while waiting for something else.
enum Waited<T> {
    Done(T),
    Continue,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            ack_timeout_s: 3.0,
            arm_timeout_s: 5.0,
            heartbeat_timeout_s: 3.0,
            startup_timeout_s: 30.0,
        }
    }
}

impl<T> Cached<T> {
    fn update(&mut self, value: T) {
        self.latest = Some(value);
        self.fresh = true;
    }

    /// Get the value only if it was received this cycle.
    pub fn fresh(&self) -> Option<&T> {
        match self.fresh {
            true => self.latest.as_ref(),
            false => None,
        }
    }
}

impl TelemetryCache {
    /// Mark all items as stale, called at the start of each cycle.
    pub fn age(&mut self) {
        self.heartbeat.fresh = false;
        self.imu.fresh = false;
        self.hud.fresh = false;
        self.sys_status.fresh = false;
    }

    /// Store a telemetry message. Acknowledgements are not cached and are returned instead.
    fn store(&mut self, tm: VehicleTelemetry) -> Option<CommandAck> {
        match tm {
            VehicleTelemetry::Heartbeat(hb) => self.heartbeat.update(hb),
            VehicleTelemetry::Imu(imu) => self.imu.update(imu),
            VehicleTelemetry::Hud(hud) => self.hud.update(hud),
            VehicleTelemetry::SysStatus(s) => self.sys_status.update(s),
            VehicleTelemetry::ModeMapping(m) => self.mode_mapping = m,
            VehicleTelemetry::CommandAck(ack) => return Some(ack),
        }
        None
    }

    /// Name of the mode the vehicle last reported being in.
    pub fn mode_name(&self) -> Option<&str> {
        let mode = self.heartbeat.latest?.custom_mode;
        self.mode_mapping
            .iter()
            .find(|(_, m)| **m == mode)
            .map(|(n, _)| n.as_str())
    }
}

impl VehicleClient {
    /// Create a new client on the given link.
    pub fn new(link: Arc<dyn VehicleLink>, params: Params) -> Self {
        Self {
            link,
            params,
            cache: TelemetryCache::default(),
        }
    }

    /// Get a handle to the link, for use by other threads (heartbeat, lights).
    pub fn link(&self) -> Arc<dyn VehicleLink> {
        self.link.clone()
    }

    /// Latest telemetry.
    pub fn telemetry(&self) -> &TelemetryCache {
        &self.cache
    }

    /// Mark the cached telemetry as stale, called at the start of each cycle.
    pub fn cycle_start(&mut self) {
        self.cache.age();
    }

    /// Receive all pending telemetry without blocking.
    ///
    /// Returns the number of messages received. Messages which cannot be decoded are skipped with
    /// a warning, any other link error is returned.
    pub fn poll(&mut self) -> Result<usize, VehicleClientError> {
        let mut num = 0;

        loop {
            match self.link.try_recv() {
                Ok(Some(tm)) => {
                    num += 1;
                    if let Some(ack) = self.cache.store(tm) {
                        debug!("Unsolicited acknowledgement ignored: {:?}", ack);
                    }
                }
                Ok(None) => break,
                Err(VehicleLinkError::DeserializeError(e)) => {
                    warn!("Could not decode message from the vehicle: {}", e)
                }
                Err(e) => return Err(VehicleClientError::LinkError(e)),
            }
        }

        Ok(num)
    }

    /// Send a command without waiting for any confirmation.
    pub fn send(&self, cmd: &VehicleCommand) -> Result<(), VehicleClientError> {
        trace!("Sending {:?}", cmd);
        self.link.send(cmd).map_err(VehicleClientError::LinkError)
    }

    /// Wait for the acknowledgement of the given command, ignoring acknowledgements of any other
    /// command.
    pub fn wait_for_ack(
        &mut self,
        command: u16,
        timeout: Duration,
    ) -> Result<AckResult, VehicleClientError> {
        self.wait(timeout, |_, tm| match tm {
            Some(ack) if ack.command == command => Waited::Done(ack.result),
            Some(ack) => {
                debug!(
                    "Ignoring acknowledgement of command {} while waiting for {}",
                    ack.command, command
                );
                Waited::Continue
            }
            None => Waited::Continue,
        })
        .map_err(|e| match e {
            WaitError::Timeout => VehicleClientError::AckTimeout(command, timeout.as_secs_f64()),
            WaitError::Link(e) => VehicleClientError::LinkError(e),
        })
    }

    /// Wait for the next heartbeat from the vehicle.
    pub fn wait_heartbeat(&mut self, timeout: Duration) -> Result<HeartbeatData, VehicleClientError> {
        // Heartbeats already in the cache don't count
        self.cache.heartbeat.fresh = false;

        self.wait(timeout, |cache, _| match cache.heartbeat.fresh() {
            Some(hb) => Waited::Done(*hb),
            None => Waited::Continue,
        })
        .map_err(|e| match e {
            WaitError::Timeout => VehicleClientError::HeartbeatTimeout(timeout.as_secs_f64()),
            WaitError::Link(e) => VehicleClientError::LinkError(e),
        })
    }

    /// Wait for a heartbeat reporting the motors in the given armed state.
    pub fn wait_armed(&mut self, armed: bool, timeout: Duration) -> Result<(), VehicleClientError> {
        self.cache.heartbeat.fresh = false;

        self.wait(timeout, |cache, _| match cache.heartbeat.fresh() {
            Some(hb) if hb.armed == armed => Waited::Done(()),
            _ => Waited::Continue,
        })
        .map_err(|e| match e {
            WaitError::Timeout => VehicleClientError::ArmTimeout(
                if armed { "armed" } else { "disarmed" },
                timeout.as_secs_f64(),
            ),
            WaitError::Link(e) => VehicleClientError::LinkError(e),
        })
    }

    /// Arm the motors and wait for the vehicle to report them armed.
    pub fn arm(&mut self) -> Result<(), VehicleClientError> {
        self.set_armed(true)
    }

    /// Disarm the motors and wait for the vehicle to report them disarmed.
    pub fn disarm(&mut self) -> Result<(), VehicleClientError> {
        self.set_armed(false)
    }

    /// Change the flight mode, waiting for the acknowledgement and the following heartbeat.
    pub fn set_mode(&mut self, mode_name: &str) -> Result<(), VehicleClientError> {
        if self.cache.mode_mapping.is_empty() {
            return Err(VehicleClientError::NoModeMapping);
        }

        let custom_mode = match self.cache.mode_mapping.get(mode_name) {
            Some(m) => *m,
            None => return Err(VehicleClientError::UnknownMode(mode_name.into())),
        };

        self.send(&VehicleCommand::SetMode { custom_mode })?;

        let result =
            self.wait_for_ack(cmd_id::DO_SET_MODE, secs(self.params.ack_timeout_s))?;
        if result != AckResult::Accepted {
            return Err(VehicleClientError::CommandRejected(cmd_id::DO_SET_MODE, result));
        }

        self.wait_heartbeat(secs(self.params.heartbeat_timeout_s))?;

        info!("Vehicle mode set to {}", mode_name);
        Ok(())
    }

    /// Wait for the vehicle to appear and put it in the initial flight mode.
    pub fn startup_handshake(&mut self, initial_mode: &str) -> Result<(), VehicleClientError> {
        let timeout = secs(self.params.startup_timeout_s);

        info!("Waiting for the vehicle heartbeat...");
        let hb = self.wait_heartbeat(timeout)?;
        info!(
            "Heartbeat received (armed: {}, mode: {})",
            hb.armed, hb.custom_mode
        );

        if self.cache.mode_mapping.is_empty() {
            self.wait(timeout, |cache, _| match cache.mode_mapping.is_empty() {
                false => Waited::Done(()),
                true => Waited::Continue,
            })
            .map_err(|e| match e {
                WaitError::Timeout => VehicleClientError::NoModeMapping,
                WaitError::Link(e) => VehicleClientError::LinkError(e),
            })?;
        }

        self.set_mode(initial_mode)
    }

    fn set_armed(&mut self, armed: bool) -> Result<(), VehicleClientError> {
        self.send(&VehicleCommand::ArmDisarm { arm: armed })?;
        self.wait_armed(armed, secs(self.params.arm_timeout_s))
    }

    /// Receive messages until `check` is done or the timeout elapses. `check` is called after
    /// every message with the updated cache and the acknowledgement, if the message was one.
    fn wait<T, F>(&mut self, timeout: Duration, mut check: F) -> Result<T, WaitError>
    where
        F: FnMut(&TelemetryCache, Option<CommandAck>) -> Waited<T>,
    {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(r) if r > Duration::from_secs(0) => r,
                _ => return Err(WaitError::Timeout),
            };

            let tm = match self.link.recv_timeout(remaining) {
                Ok(Some(tm)) => tm,
                Ok(None) => continue,
                Err(VehicleLinkError::DeserializeError(e)) => {
                    warn!("Could not decode message from the vehicle: {}", e);
                    continue;
                }
                Err(e) => return Err(WaitError::Link(e)),
            };

            let ack = self.cache.store(tm);
            if let Waited::Done(t) = check(&self.cache, ack) {
                return Ok(t);
            }
        }
    }
}

enum WaitError {
    Timeout,
    Link(VehicleLinkError),
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::vehicle::NUM_MAIN_OUTPUTS;
    use sim::SimVehicle;

    fn fast_params() -> Params {
        Params {
            ack_timeout_s: 0.1,
            arm_timeout_s: 0.1,
            heartbeat_timeout_s: 0.1,
            startup_timeout_s: 0.1,
        }
    }

    fn client() -> (Arc<SimVehicle>, VehicleClient) {
        let sim = Arc::new(SimVehicle::new());
        let client = VehicleClient::new(sim.clone(), fast_params());
        (sim, client)
    }

    #[test]
    fn test_poll_caches_telemetry() {
        let (sim, mut client) = client();
        sim.push_telemetry(VehicleTelemetry::Imu(ImuSample {
            xacc: 1.0,
            ..Default::default()
        }));

        assert_eq!(client.poll().unwrap(), 3);
        assert_eq!(client.telemetry().imu.fresh().map(|i| i.xacc), Some(1.0));
        assert_eq!(client.telemetry().mode_name(), Some("ALT_HOLD"));

        client.cycle_start();
        assert!(client.telemetry().imu.fresh().is_none());
        assert!(client.telemetry().imu.latest.is_some());
    }

    #[test]
    fn test_ack_wait_ignores_other_commands() {
        let (sim, mut client) = client();
        sim.push_telemetry(VehicleTelemetry::CommandAck(CommandAck {
            command: cmd_id::DO_SET_SERVO,
            result: AckResult::Accepted,
        }));
        sim.push_telemetry(VehicleTelemetry::CommandAck(CommandAck {
            command: cmd_id::DO_SET_MODE,
            result: AckResult::Denied,
        }));

        assert_eq!(
            client
                .wait_for_ack(cmd_id::DO_SET_MODE, Duration::from_millis(100))
                .unwrap(),
            AckResult::Denied
        );
    }

    #[test]
    fn test_ack_wait_times_out() {
        let (sim, mut client) = client();
        sim.push_telemetry(VehicleTelemetry::CommandAck(CommandAck {
            command: cmd_id::COMPONENT_ARM_DISARM,
            result: AckResult::Accepted,
        }));

        let start = Instant::now();
        assert!(matches!(
            client.wait_for_ack(cmd_id::DO_SET_MODE, Duration::from_millis(50)),
            Err(VehicleClientError::AckTimeout(cmd_id::DO_SET_MODE, _))
        ));
        assert!(start.elapsed() >= Duration::from_millis(50));

        // Other telemetry received while waiting is still cached
        assert!(client.telemetry().heartbeat.latest.is_some());
    }

    #[test]
    fn test_arm_and_disarm() {
        let (sim, mut client) = client();

        client.arm().unwrap();
        assert!(sim.is_armed());
        client.disarm().unwrap();
        assert!(!sim.is_armed());

        sim.set_responsive(false);
        assert!(matches!(
            client.arm(),
            Err(VehicleClientError::ArmTimeout("armed", _))
        ));
    }

    #[test]
    fn test_set_mode() {
        let (sim, mut client) = client();
        client.poll().unwrap();

        client.set_mode("MANUAL").unwrap();
        assert_eq!(sim.custom_mode(), 19);

        assert!(matches!(
            client.set_mode("ACRO"),
            Err(VehicleClientError::UnknownMode(_))
        ));
    }

    #[test]
    fn test_startup_handshake() {
        let (sim, mut client) = client();
        client.startup_handshake("MANUAL").unwrap();
        assert_eq!(sim.custom_mode(), 19);
        assert!(client.telemetry().heartbeat.latest.is_some());

        // A vehicle which never appears
        let silent = Arc::new(SimVehicle::new());
        while silent.try_recv().unwrap().is_some() {}
        let mut client = VehicleClient::new(silent, fast_params());
        assert!(matches!(
            client.startup_handshake("ALT_HOLD"),
            Err(VehicleClientError::HeartbeatTimeout(_))
        ));
    }

    #[test]
    fn test_link_loss_is_reported() {
        let (sim, client) = client();
        sim.set_link_down(true);

        assert!(matches!(
            client.send(&VehicleCommand::set_aux_servo(1, 1500)),
            Err(VehicleClientError::LinkError(_))
        ));
        assert_eq!(sim.last_servo(NUM_MAIN_OUTPUTS + 1), None);
    }
}
