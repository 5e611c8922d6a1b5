//! Parameters structure for PoseFilter

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the pose filter.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Depth of the target below the camera, subtracted from the filtered z before computing the
    /// target distance.
    ///
    /// Units: meters
    pub z_offset_m: f64,

    /// Filter applied to the marker position (x, y, z)
    pub position: FieldFilter,

    /// Filter applied to the roll and pitch rates
    pub rates: FieldFilter,

    /// Where the heading comes from
    pub heading_source: HeadingSource,

    /// Filter applied to the heading
    pub heading: FieldFilter,

    /// Filter applied to the ground speed
    pub ground_speed: FieldFilter,

    /// Filter applied to the depth
    pub depth: FieldFilter,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How a field group is filtered.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode")]
pub enum FieldFilter {
    /// Exponential moving average equivalent to a `window` sample moving average
    Ema { window: f64 },

    /// The latest raw value is used as is
    PassThrough,
}

/// Source of the heading value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum HeadingSource {
    /// Stabilised compass heading reported in the HUD telemetry
    Compass,

    /// Yaw rate from the IMU gyro, used when no stabilised heading is available
    YawRate,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            z_offset_m: 2.0,
            position: FieldFilter::Ema { window: 15.0 },
            rates: FieldFilter::Ema { window: 15.0 },
            heading_source: HeadingSource::Compass,
            heading: FieldFilter::PassThrough,
            ground_speed: FieldFilter::PassThrough,
            depth: FieldFilter::PassThrough,
        }
    }
}

impl FieldFilter {
    /// Apply the filter to the previous filtered value given a new raw value.
    pub fn apply(&self, filtered: f64, raw: f64) -> f64 {
        match self {
            FieldFilter::Ema { window } => filtered - filtered / window + raw / window,
            FieldFilter::PassThrough => raw,
        }
    }

    pub(crate) fn check(&self, group: &'static str) -> Result<(), super::PoseFilterError> {
        match *self {
            FieldFilter::Ema { window } if !(window >= 1.0) => {
                Err(super::PoseFilterError::InvalidWindow(group, window))
            }
            _ => Ok(()),
        }
    }
}
