//! Trial manager parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::video_log::VideoParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// A running trial fails automatically once it has lasted longer than this.
    ///
    /// Units: seconds
    pub timeout_s: f64,

    /// Record the raw and annotated video of each trial
    pub record_video: bool,

    pub video: VideoParams,

    pub cues: CueParams,
}

/// Thresholds of the haptic cues given during a `Haptics` trial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CueParams {
    /// The vibration cue is on while the filtered z position is strictly inside this band.
    ///
    /// Units: meters
    pub vibration_band_m: (f64, f64),

    /// The hardness cue is on while the target distance is below this.
    ///
    /// Units: meters
    pub hardness_dist_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            timeout_s: 120.0,
            record_video: true,
            video: VideoParams::default(),
            cues: CueParams::default(),
        }
    }
}

impl Default for CueParams {
    fn default() -> Self {
        Self {
            vibration_band_m: (3.7, 4.1),
            hardness_dist_m: 0.5,
        }
    }
}
