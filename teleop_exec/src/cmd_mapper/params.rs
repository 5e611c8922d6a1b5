//! Parameters structure for the command mapper

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the command mapper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Params {
    pub touch: TouchParams,

    pub jog: JogParams,
}

/// Touch control parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TouchParams {
    /// Finger forces below this are treated as no touch
    pub min_force: f64,

    /// Range of finger force mapped onto the speed pulse range
    pub force_range: (f64, f64),

    /// Forward channel pulse range
    ///
    /// Units: microseconds
    pub speed_pwm_range: (f64, f64),

    /// Half width of the band around the zero reference in which no turn is commanded
    pub deadzone: f64,

    /// Yaw channel pulse range, the finger position range is `(0, 2 * zero)`
    ///
    /// Units: microseconds
    pub turn_pwm_range: (f64, f64),

    /// Turn pulses are never commanded below this
    ///
    /// Units: microseconds
    pub min_turn_pwm: f64,
}

/// Jog command parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct JogParams {
    /// Offset from neutral commanded by a jog
    ///
    /// Units: microseconds
    pub step_us: u16,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TouchParams {
    fn default() -> Self {
        Self {
            min_force: 40.0,
            force_range: (0.0, 500.0),
            speed_pwm_range: (1500.0, 1700.0),
            deadzone: 50.0,
            turn_pwm_range: (1400.0, 1600.0),
            min_turn_pwm: 1100.0,
        }
    }
}

impl Default for JogParams {
    fn default() -> Self {
        Self { step_us: 50 }
    }
}
