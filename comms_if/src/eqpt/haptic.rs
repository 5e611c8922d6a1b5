//! # Haptic Device Communications Module
//!
//! The haptic device exchanges fixed size frames with the control core over a TCP stream. Each
//! frame is two little-endian `f64` values:
//!
//! | Direction | Value 0 | Value 1 |
//! |---|---|---|
//! | Core to device | Vibration flag (0 or 1) | Hardness (0 to 500) |
//! | Device to core | Finger position | Finger force |

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Length of a haptic frame in bytes, in either direction.
pub const HAPTIC_FRAME_LEN: usize = 16;

/// Hardness sent to make the device feel rigid.
pub const HARDNESS_HARD: f64 = 500.0;

/// Hardness sent to make the device feel soft.
pub const HARDNESS_SOFT: f64 = 0.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demand sent to the haptic device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HapticDemand {
    /// 1 to vibrate, 0 to stop
    pub vibration: f64,

    /// Stiffness of the device surface
    pub hardness: f64,
}

/// Reading returned by the haptic device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HapticReading {
    pub finger_pos: f64,
    pub finger_force: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HapticFrameError {
    #[error("Expected a 16 byte frame, got {0} bytes")]
    WrongLength(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for HapticDemand {
    fn default() -> Self {
        Self {
            vibration: 0.0,
            hardness: HARDNESS_HARD,
        }
    }
}

impl HapticDemand {
    /// Encode the demand into a frame.
    pub fn to_frame(&self) -> [u8; HAPTIC_FRAME_LEN] {
        encode_pair(self.vibration, self.hardness)
    }

    /// Decode a demand from a frame, this is what the device side does.
    pub fn from_frame(frame: &[u8]) -> Result<Self, HapticFrameError> {
        let (vibration, hardness) = decode_pair(frame)?;
        Ok(Self {
            vibration,
            hardness,
        })
    }
}

impl HapticReading {
    /// Encode the reading into a frame, this is what the device side does.
    pub fn to_frame(&self) -> [u8; HAPTIC_FRAME_LEN] {
        encode_pair(self.finger_pos, self.finger_force)
    }

    /// Decode a reading from a frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self, HapticFrameError> {
        let (finger_pos, finger_force) = decode_pair(frame)?;
        Ok(Self {
            finger_pos,
            finger_force,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn encode_pair(a: f64, b: f64) -> [u8; HAPTIC_FRAME_LEN] {
    let mut frame = [0u8; HAPTIC_FRAME_LEN];
    LittleEndian::write_f64(&mut frame[0..8], a);
    LittleEndian::write_f64(&mut frame[8..16], b);
    frame
}

fn decode_pair(frame: &[u8]) -> Result<(f64, f64), HapticFrameError> {
    if frame.len() != HAPTIC_FRAME_LEN {
        return Err(HapticFrameError::WrongLength(frame.len()));
    }

    Ok((
        LittleEndian::read_f64(&frame[0..8]),
        LittleEndian::read_f64(&frame[8..16]),
    ))
}
