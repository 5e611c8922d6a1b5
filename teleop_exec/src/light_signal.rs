//! # Light Signaller
//!
//! The vehicle light (AUX output 1) shows the diver whether the vehicle is armed, and flashes cues
//! requested by the operator. A cue runs on its own thread so the main loop isn't held up, and a
//! new cue cancels the one in progress.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use comms_if::{eqpt::vehicle::VehicleCommand, tc::LightSignal};

use crate::vehicle_client::{VehicleLink, VehicleLinkError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// AUX output the light is connected to.
pub const LIGHT_AUX_OUTPUT: u8 = 1;

/// Light pulse widths.
///
/// Units: microseconds
pub const LIGHT_ON_PWM_US: u16 = 1500;
pub const LIGHT_OFF_PWM_US: u16 = 1100;

/// Fast flash timing, (on, off)
pub const FAST_FLASH: (Duration, Duration) =
    (Duration::from_millis(250), Duration::from_millis(500));

/// Slow flash timing, (on, off)
pub const SLOW_FLASH: (Duration, Duration) =
    (Duration::from_millis(750), Duration::from_millis(500));

/// Granularity at which a cue checks for cancellation.
const CANCEL_CHECK_PERIOD: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A sequence of flashes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlashPattern {
    pub num_fast: u32,
    pub num_slow: u32,
}

/// Light signaller
pub struct LightSignaller {
    link: Arc<dyn VehicleLink>,

    /// Timing used for (fast, slow) flashes
    timing: [(Duration, Duration); 2],

    cue: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FlashPattern {
    /// The pattern flashed for each cue.
    pub fn for_signal(signal: LightSignal) -> Self {
        let num_fast = match signal {
            LightSignal::ReadyToStart => 1,
            LightSignal::ReadyToEnd => 2,
            LightSignal::MoveArea => 3,
            LightSignal::Emergency => 1000,
        };

        Self {
            num_fast,
            num_slow: 0,
        }
    }
}

impl LightSignaller {
    pub fn new(link: Arc<dyn VehicleLink>) -> Self {
        Self::with_timing(link, FAST_FLASH, SLOW_FLASH)
    }

    /// Create a signaller with non-standard flash timings.
    pub fn with_timing(
        link: Arc<dyn VehicleLink>,
        fast: (Duration, Duration),
        slow: (Duration, Duration),
    ) -> Self {
        Self {
            link,
            timing: [fast, slow],
            cue: None,
        }
    }

    /// Turn the light on or off, cancelling any cue in progress.
    pub fn set_light(&mut self, on: bool) -> Result<(), VehicleLinkError> {
        self.cancel();
        set_light(&*self.link, on)
    }

    /// Start flashing the given cue.
    pub fn signal(&mut self, signal: LightSignal) {
        self.cancel();

        let pattern = FlashPattern::for_signal(signal);
        info!("Signalling {:?} with the light ({} flashes)", signal, pattern.num_fast);

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_clone = cancel.clone();
        let link = self.link.clone();
        let timing = self.timing;

        let jh = thread::spawn(move || {
            if let Err(e) = flash(&*link, pattern, timing, &cancel_clone) {
                warn!("Light cue {:?} aborted: {}", signal, e);
            }
        });

        self.cue = Some((cancel, jh));
    }

    /// True while a cue is being flashed.
    pub fn is_signalling(&self) -> bool {
        match self.cue {
            Some((ref cancel, _)) => !cancel.load(Ordering::Relaxed),
            None => false,
        }
    }

    /// Cancel the cue in progress, if any, leaving the light off.
    pub fn cancel(&mut self) {
        if let Some((cancel, jh)) = self.cue.take() {
            cancel.store(true, Ordering::Relaxed);
            jh.join().ok();
            debug!("Light cue finished");
        }
    }
}

impl Drop for LightSignaller {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn set_light(link: &dyn VehicleLink, on: bool) -> Result<(), VehicleLinkError> {
    let pwm = if on { LIGHT_ON_PWM_US } else { LIGHT_OFF_PWM_US };
    link.send(&VehicleCommand::set_aux_servo(LIGHT_AUX_OUTPUT, pwm))
}

fn flash(
    link: &dyn VehicleLink,
    pattern: FlashPattern,
    timing: [(Duration, Duration); 2],
    cancel: &AtomicBool,
) -> Result<(), VehicleLinkError> {
    let flashes = (0..pattern.num_fast)
        .map(|_| timing[0])
        .chain((0..pattern.num_slow).map(|_| timing[1]));

    for (on, off) in flashes {
        set_light(link, true)?;
        let cancelled = sleep_unless_cancelled(on, cancel);
        set_light(link, false)?;

        if cancelled || sleep_unless_cancelled(off, cancel) {
            break;
        }
    }

    // Mark as done so is_signalling reports false
    cancel.store(true, Ordering::Relaxed);

    Ok(())
}

/// Sleep for `dur`, returning early with `true` if cancelled.
fn sleep_unless_cancelled(dur: Duration, cancel: &AtomicBool) -> bool {
    let end = Instant::now() + dur;

    while Instant::now() < end {
        if cancel.load(Ordering::Relaxed) {
            return true;
        }
        thread::sleep(CANCEL_CHECK_PERIOD.min(end - Instant::now()));
    }

    cancel.load(Ordering::Relaxed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle_client::sim::SimVehicle;
    use comms_if::eqpt::vehicle::NUM_MAIN_OUTPUTS;

    const LIGHT_SERVO: u8 = NUM_MAIN_OUTPUTS + LIGHT_AUX_OUTPUT;

    fn quick(sim: &Arc<SimVehicle>) -> LightSignaller {
        LightSignaller::with_timing(
            sim.clone(),
            (Duration::from_millis(5), Duration::from_millis(5)),
            (Duration::from_millis(10), Duration::from_millis(5)),
        )
    }

    fn num_light_cmds(sim: &SimVehicle, pwm: u16) -> usize {
        sim.sent()
            .iter()
            .filter(|c| {
                **c == VehicleCommand::SetServo {
                    servo: LIGHT_SERVO,
                    pwm_us: pwm,
                }
            })
            .count()
    }

    #[test]
    fn test_cue_patterns() {
        assert_eq!(FlashPattern::for_signal(LightSignal::ReadyToStart).num_fast, 1);
        assert_eq!(FlashPattern::for_signal(LightSignal::ReadyToEnd).num_fast, 2);
        assert_eq!(FlashPattern::for_signal(LightSignal::MoveArea).num_fast, 3);
        assert_eq!(FlashPattern::for_signal(LightSignal::Emergency).num_fast, 1000);
    }

    #[test]
    fn test_set_light() {
        let sim = Arc::new(SimVehicle::new());
        let mut lights = LightSignaller::new(sim.clone());

        lights.set_light(true).unwrap();
        assert_eq!(sim.last_servo(LIGHT_SERVO), Some(LIGHT_ON_PWM_US));
        lights.set_light(false).unwrap();
        assert_eq!(sim.last_servo(LIGHT_SERVO), Some(LIGHT_OFF_PWM_US));
    }

    #[test]
    fn test_move_area_flashes_three_times() {
        let sim = Arc::new(SimVehicle::new());
        let mut lights = quick(&sim);

        lights.signal(LightSignal::MoveArea);
        let deadline = Instant::now() + Duration::from_secs(5);
        while lights.is_signalling() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        lights.cancel();

        assert_eq!(num_light_cmds(&sim, LIGHT_ON_PWM_US), 3);
        assert_eq!(num_light_cmds(&sim, LIGHT_OFF_PWM_US), 3);
    }

    #[test]
    fn test_new_cue_cancels_emergency() {
        let sim = Arc::new(SimVehicle::new());
        let mut lights = quick(&sim);

        lights.signal(LightSignal::Emergency);
        thread::sleep(Duration::from_millis(30));
        lights.set_light(false).unwrap();

        assert!(!lights.is_signalling());
        assert_eq!(sim.last_servo(LIGHT_SERVO), Some(LIGHT_OFF_PWM_US));
        assert!(num_light_cmds(&sim, LIGHT_ON_PWM_US) < 1000);
    }
}
