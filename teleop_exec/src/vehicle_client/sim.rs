//! # Simulated Vehicle
//!
//! In-memory [`VehicleLink`] which behaves like a (very obedient) autopilot. Used to run the control
//! core without a vehicle and by the tests.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    thread,
    time::Duration,
};

use comms_if::eqpt::vehicle::{
    AckResult, CommandAck, HeartbeatData, VehicleCommand, VehicleTelemetry, NUM_RC_CHANNELS,
};

use super::link::{VehicleLink, VehicleLinkError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Mode numbers reported by the simulated autopilot.
pub const SIM_MODES: [(&str, u32); 4] = [
    ("STABILIZE", 0),
    ("ALT_HOLD", 2),
    ("POSHOLD", 16),
    ("MANUAL", 19),
];

/// How long `recv_timeout` sleeps between checks of the inbox.
const POLL_PERIOD: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A simulated vehicle.
pub struct SimVehicle {
    state: Mutex<SimState>,
}

struct SimState {
    armed: bool,
    custom_mode: u32,

    /// If false commands are recorded but never acknowledged or acted on
    responsive: bool,

    /// If true every send fails as if the link had gone down
    link_down: bool,

    /// Telemetry waiting to be received by the control core
    inbox: VecDeque<VehicleTelemetry>,

    /// Every command sent by the control core, oldest first
    sent: Vec<VehicleCommand>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimVehicle {
    /// Create a disarmed vehicle in ALT_HOLD which has already sent its first heartbeat and mode
    /// mapping.
    pub fn new() -> Self {
        let sim = Self {
            state: Mutex::new(SimState {
                armed: false,
                custom_mode: 2,
                responsive: true,
                link_down: false,
                inbox: VecDeque::new(),
                sent: Vec::new(),
            }),
        };

        sim.push_telemetry(VehicleTelemetry::ModeMapping(
            SIM_MODES.iter().map(|(n, m)| (n.to_string(), *m)).collect::<HashMap<_, _>>(),
        ));
        sim.push_heartbeat();

        sim
    }

    /// Queue a telemetry message for the control core.
    pub fn push_telemetry(&self, tm: VehicleTelemetry) {
        self.lock().inbox.push_back(tm);
    }

    /// Queue a heartbeat reflecting the current state.
    pub fn push_heartbeat(&self) {
        let mut state = self.lock();
        let hb = VehicleTelemetry::Heartbeat(HeartbeatData {
            armed: state.armed,
            custom_mode: state.custom_mode,
        });
        state.inbox.push_back(hb);
    }

    /// Stop (or restart) responding to commands.
    pub fn set_responsive(&self, responsive: bool) {
        self.lock().responsive = responsive;
    }

    /// Make all further sends and receives fail.
    pub fn set_link_down(&self, down: bool) {
        self.lock().link_down = down;
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    pub fn custom_mode(&self) -> u32 {
        self.lock().custom_mode
    }

    /// All commands sent so far.
    pub fn sent(&self) -> Vec<VehicleCommand> {
        self.lock().sent.clone()
    }

    /// Number of heartbeats the control core has sent.
    pub fn num_heartbeats(&self) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|c| **c == VehicleCommand::Heartbeat)
            .count()
    }

    /// The last channel override sent, if any.
    pub fn last_override(&self) -> Option<[u16; NUM_RC_CHANNELS]> {
        self.lock().sent.iter().rev().find_map(|c| match c {
            VehicleCommand::RcChannelsOverride(ch) => Some(*ch),
            _ => None,
        })
    }

    /// The last servo command sent for the given output, if any.
    pub fn last_servo(&self, servo: u8) -> Option<u16> {
        self.lock().sent.iter().rev().find_map(|c| match c {
            VehicleCommand::SetServo { servo: s, pwm_us } if *s == servo => Some(*pwm_us),
            _ => None,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("SimVehicle: state mutex poisoned")
    }
}

impl Default for SimVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimState {
    fn ack(&mut self, command: u16, result: AckResult) {
        self.inbox
            .push_back(VehicleTelemetry::CommandAck(CommandAck { command, result }));
    }

    fn heartbeat(&mut self) {
        let hb = VehicleTelemetry::Heartbeat(HeartbeatData {
            armed: self.armed,
            custom_mode: self.custom_mode,
        });
        self.inbox.push_back(hb);
    }
}

impl VehicleLink for SimVehicle {
    fn send(&self, cmd: &VehicleCommand) -> Result<(), VehicleLinkError> {
        let mut state = self.lock();

        if state.link_down {
            return Err(VehicleLinkError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated link down",
            )));
        }

        state.sent.push(cmd.clone());

        if !state.responsive {
            return Ok(());
        }

        let id = cmd.cmd_id();
        match *cmd {
            VehicleCommand::ArmDisarm { arm } => {
                state.armed = arm;
                if let Some(id) = id {
                    state.ack(id, AckResult::Accepted);
                }
                state.heartbeat();
            }
            VehicleCommand::SetMode { custom_mode } => {
                let known = SIM_MODES.iter().any(|(_, m)| *m == custom_mode);
                if let Some(id) = id {
                    if known {
                        state.custom_mode = custom_mode;
                        state.ack(id, AckResult::Accepted);
                    } else {
                        state.ack(id, AckResult::Denied);
                    }
                }
                state.heartbeat();
            }
            VehicleCommand::SetServo { .. } => {
                if let Some(id) = id {
                    state.ack(id, AckResult::Accepted);
                }
            }
            VehicleCommand::Heartbeat | VehicleCommand::RcChannelsOverride(_) => (),
        }

        Ok(())
    }

    fn try_recv(&self) -> Result<Option<VehicleTelemetry>, VehicleLinkError> {
        let mut state = self.lock();

        if state.link_down {
            return Err(VehicleLinkError::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "simulated link down",
            )));
        }

        Ok(state.inbox.pop_front())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<VehicleTelemetry>, VehicleLinkError> {
        let deadline = std::time::Instant::now() + timeout;

        loop {
            if let Some(tm) = self.lock().inbox.pop_front() {
                return Ok(Some(tm));
            }
            if std::time::Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_PERIOD);
        }
    }
}
