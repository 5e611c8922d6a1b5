//! # Command Mapper
//!
//! Turns operator inputs (haptic device readings and jog commands) into motion channel setpoints.
//! Nothing here talks to the vehicle, the setpoints are applied by the channel sink.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use comms_if::{eqpt::haptic::HapticReading, eqpt::vehicle::PWM_NEUTRAL_US, tc::JogCmd};
use util::maths::map_range;

use crate::channel_sink::MotionChannel;

pub use params::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command mapper, holds the parameters used for the mapping.
#[derive(Debug, Clone, Default)]
pub struct CmdMapper {
    params: Params,
}

/// Result of mapping a haptic reading into touch control demands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TouchDemands {
    /// Finger position after the deadzone
    pub adjusted_pos: f64,

    /// Finger force after the minimum force threshold
    pub adjusted_force: f64,

    /// Forward channel pulse
    pub speed_pwm: u16,

    /// Yaw channel pulse
    pub turn_pwm: u16,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What a jog command does to the motion channels.
#[derive(Debug, Clone, PartialEq)]
pub enum JogAction {
    /// Set each channel to the given pulse
    Set(Vec<(MotionChannel, u16)>),

    /// Set all motion channels to neutral
    AllStop,
}

#[derive(Debug, thiserror::Error)]
pub enum CmdMapperError {
    #[error("The finger zero reference ({0}) must be non-zero and finite")]
    InvalidZero(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TouchDemands {
    /// Demands which command no motion, logged while touch control is not driving.
    pub fn neutral(finger_zero: f64) -> Self {
        Self {
            adjusted_pos: finger_zero,
            adjusted_force: 0.0,
            speed_pwm: PWM_NEUTRAL_US,
            turn_pwm: PWM_NEUTRAL_US,
        }
    }
}

impl CmdMapper {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Map a haptic reading into forward and turn pulses.
    ///
    /// `zero` is the finger position which commands no turn.
    pub fn touch_demands(
        &self,
        reading: &HapticReading,
        zero: f64,
    ) -> Result<TouchDemands, CmdMapperError> {
        if zero == 0.0 || !zero.is_finite() {
            return Err(CmdMapperError::InvalidZero(zero));
        }

        let p = &self.params.touch;

        let (adjusted_force, speed) = force_to_speed(reading.finger_force, p);
        let (adjusted_pos, turn) = deadzone_turn(reading.finger_pos, reading.finger_force, zero, p);

        Ok(TouchDemands {
            adjusted_pos,
            adjusted_force,
            speed_pwm: speed,
            turn_pwm: turn,
        })
    }

    /// Get the channel setpoints for a jog command.
    pub fn jog_action(&self, jog: JogCmd) -> JogAction {
        let up = PWM_NEUTRAL_US + self.params.jog.step_us;
        let down = PWM_NEUTRAL_US - self.params.jog.step_us;

        use MotionChannel::*;
        let set = match jog {
            JogCmd::Forward => vec![(Forward, up)],
            JogCmd::Reverse => vec![(Forward, down)],
            JogCmd::Left => vec![(Yaw, down)],
            JogCmd::Right => vec![(Yaw, up)],
            JogCmd::Up => vec![(Throttle, up)],
            JogCmd::Down => vec![(Throttle, down)],
            JogCmd::StrafeLeft => vec![(Lateral, down)],
            JogCmd::StrafeRight => vec![(Lateral, up)],
            JogCmd::Straight => vec![
                (Throttle, PWM_NEUTRAL_US),
                (Yaw, PWM_NEUTRAL_US),
                (Lateral, PWM_NEUTRAL_US),
            ],
            JogCmd::AllStop => return JogAction::AllStop,
        };

        JogAction::Set(set)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a finger force into a forward pulse.
///
/// Forces below the minimum are treated as zero. Returns the adjusted force and the pulse.
pub fn force_to_speed(force: f64, params: &TouchParams) -> (f64, u16) {
    let adjusted = if force < params.min_force { 0.0 } else { force };

    let speed = map_range(adjusted, params.force_range, params.speed_pwm_range);

    (adjusted, to_pwm(speed))
}

/// Map a finger position into a turn pulse.
///
/// Positions within the deadzone around `zero`, or any position while the force is below the
/// minimum, command no turn. Returns the adjusted position and the pulse.
pub fn deadzone_turn(pos: f64, force: f64, zero: f64, params: &TouchParams) -> (f64, u16) {
    let adjusted = if (pos - zero).abs() < params.deadzone || force < params.min_force {
        zero
    } else {
        pos
    };

    let turn = map_range(adjusted, (0.0, 2.0 * zero), params.turn_pwm_range)
        .max(params.min_turn_pwm);

    (adjusted, to_pwm(turn))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Truncate a pulse to whole microseconds.
fn to_pwm(value: f64) -> u16 {
    value.trunc().max(0.0).min((u16::MAX - 1) as f64) as u16
}

#[cfg(test)]
mod test {
    use super::*;

    fn reading(finger_pos: f64, finger_force: f64) -> HapticReading {
        HapticReading {
            finger_pos,
            finger_force,
        }
    }

    #[test]
    fn test_force_to_speed() {
        let p = TouchParams::default();

        assert_eq!(force_to_speed(39.9, &p), (0.0, 1500));
        assert_eq!(force_to_speed(40.0, &p), (40.0, 1516));
        assert_eq!(force_to_speed(250.0, &p), (250.0, 1600));
        assert_eq!(force_to_speed(500.0, &p), (500.0, 1700));
        // Not clamped above the force range
        assert_eq!(force_to_speed(750.0, &p), (750.0, 1800));
    }

    #[test]
    fn test_deadzone_turn() {
        let p = TouchParams::default();

        // Inside the deadzone
        assert_eq!(deadzone_turn(1049.0, 100.0, 1000.0, &p), (1000.0, 1500));
        assert_eq!(deadzone_turn(951.0, 100.0, 1000.0, &p), (1000.0, 1500));

        // Outside the deadzone
        assert_eq!(deadzone_turn(1500.0, 100.0, 1000.0, &p), (1500.0, 1550));
        assert_eq!(deadzone_turn(0.0, 100.0, 1000.0, &p), (0.0, 1400));

        // No force, no turn
        assert_eq!(deadzone_turn(1500.0, 10.0, 1000.0, &p), (1000.0, 1500));

        // Far out of range is clamped to the minimum turn
        assert_eq!(deadzone_turn(-5000.0, 100.0, 1000.0, &p), (-5000.0, 1100));
    }

    #[test]
    fn test_touch_demands() {
        let mapper = CmdMapper::default();

        let d = mapper.touch_demands(&reading(1200.0, 500.0), 1000.0).unwrap();
        assert_eq!(d.speed_pwm, 1700);
        assert_eq!(d.turn_pwm, 1520);
        assert_eq!(d.adjusted_pos, 1200.0);

        assert!(matches!(
            mapper.touch_demands(&reading(1200.0, 500.0), 0.0),
            Err(CmdMapperError::InvalidZero(_))
        ));
    }

    #[test]
    fn test_jog_table() {
        let mapper = CmdMapper::default();

        assert_eq!(
            mapper.jog_action(JogCmd::Forward),
            JogAction::Set(vec![(MotionChannel::Forward, 1550)])
        );
        assert_eq!(
            mapper.jog_action(JogCmd::Left),
            JogAction::Set(vec![(MotionChannel::Yaw, 1450)])
        );
        assert_eq!(
            mapper.jog_action(JogCmd::Down),
            JogAction::Set(vec![(MotionChannel::Throttle, 1450)])
        );
        assert_eq!(
            mapper.jog_action(JogCmd::StrafeRight),
            JogAction::Set(vec![(MotionChannel::Lateral, 1550)])
        );
        assert_eq!(mapper.jog_action(JogCmd::AllStop), JogAction::AllStop);

        match mapper.jog_action(JogCmd::Straight) {
            JogAction::Set(s) => {
                assert_eq!(s.len(), 3);
                assert!(s.iter().all(|(_, p)| *p == 1500));
                assert!(!s.iter().any(|(c, _)| *c == MotionChannel::Forward));
            }
            a => panic!("Unexpected jog action {:?}", a),
        }
    }

    #[test]
    fn test_params_from_toml() {
        let params: Params = util::params::from_str(
            r#"
            [touch]
            min_force = 40.0
            force_range = [0.0, 500.0]
            speed_pwm_range = [1500.0, 1700.0]
            deadzone = 50.0
            turn_pwm_range = [1400.0, 1600.0]
            min_turn_pwm = 1100.0

            [jog]
            step_us = 60
            "#,
        )
        .unwrap();

        assert_eq!(params.touch.force_range, (0.0, 500.0));
        assert_eq!(
            CmdMapper::new(params).jog_action(JogCmd::Reverse),
            JogAction::Set(vec![(MotionChannel::Forward, 1440)])
        );
    }
}
