//! # Heartbeat Emitter
//!
//! Sends a heartbeat to the vehicle at a fixed period on a background thread. The vehicle's
//! failsafe triggers if it stops hearing from the ground station, so a failed send ends the
//! thread and is flagged for the main loop to act on.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use comms_if::eqpt::vehicle::VehicleCommand;

use crate::vehicle_client::VehicleLink;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(900);

/// Granularity at which the thread checks for a stop request while sleeping.
const STOP_CHECK_PERIOD: Duration = Duration::from_millis(20);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Heartbeat emitter
pub struct HeartbeatEmitter {
    bg_jh: Option<JoinHandle<()>>,

    bg_run: Arc<AtomicBool>,

    failed: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HeartbeatEmitter {
    /// Start sending heartbeats on the given link. The first heartbeat is sent immediately.
    pub fn start(link: Arc<dyn VehicleLink>, period: Duration) -> Self {
        let bg_run = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicBool::new(false));

        let run_clone = bg_run.clone();
        let failed_clone = failed.clone();
        let bg_jh = thread::spawn(move || bg_thread(link, period, run_clone, failed_clone));

        Self {
            bg_jh: Some(bg_jh),
            bg_run,
            failed,
        }
    }

    /// True if a heartbeat could not be sent and the emitter has stopped.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Stop the emitter and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            jh.join().ok();
        }
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn bg_thread(
    link: Arc<dyn VehicleLink>,
    period: Duration,
    run: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
) {
    let mut next = Instant::now();

    while run.load(Ordering::Relaxed) {
        if Instant::now() >= next {
            if let Err(e) = link.send(&VehicleCommand::Heartbeat) {
                error!("Could not send heartbeat, emitter stopped: {}", e);
                failed.store(true, Ordering::Relaxed);
                return;
            }
            next += period;
        }

        thread::sleep(STOP_CHECK_PERIOD.min(period));
    }

    debug!("Heartbeat emitter stopped");
}
