//! # Camera Communications Module
//!
//! The vision pipeline publishes one [`VisionFrame`] per decoded video frame. It carries the raw
//! frame, the frame annotated with the detected marker (if any), and the marker pose estimate.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use image::{DynamicImage, ImageResult};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An individual encoded frame from the camera
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CamFrame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// The format of this frame
    pub format: ImageFormat,

    /// The formatted image data, base64 encoded on the wire
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// A decoded camera frame.
#[derive(Clone)]
pub struct CamImage {
    /// UTC timestamp at which the frame was acquired
    pub timestamp: DateTime<Utc>,

    /// The image itself
    pub image: DynamicImage,
}

/// Marker pose estimate for a single frame.
///
/// When no marker is detected the estimator reports the zero vector rather than nothing, use
/// [`PoseSample::is_detection`] to tell the two apart.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct PoseSample {
    /// Marker translation in the camera frame
    ///
    /// Units: meters
    pub translation_m: [f64; 3],

    /// Marker rotation vector in the camera frame
    ///
    /// Units: radians
    pub rotation_rad: [f64; 3],
}

/// Everything the vision pipeline knows about one video frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VisionFrame {
    /// The frame as captured
    pub raw: CamFrame,

    /// The frame with the detected marker drawn on it
    pub annotated: Option<CamFrame>,

    /// The frame with the marker circled, used for stills
    #[serde(default)]
    pub circled: Option<CamFrame>,

    /// Marker pose estimate
    pub pose: PoseSample,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible formats for camera images. This is used rather than image::ImageFormat to:
///     1. Restrict the formats that can be sent back and forth
///     2. Allow serialisation as image::ImageFormat does not implement serde.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum ImageFormat {
    /// PNG image
    Png,

    /// JPEG image with a quality value between 1 and 100, where 100 is best.
    Jpeg(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamFrame {
    /// Convert this camera frame into a camera image
    pub fn to_cam_image(&self) -> ImageResult<CamImage> {
        let format = match self.format {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg(_) => image::ImageFormat::Jpeg,
        };

        Ok(CamImage {
            timestamp: self.timestamp,
            image: image::load_from_memory_with_format(&self.data, format)?,
        })
    }
}

impl CamImage {
    /// Convert this camera image into a camera frame with the given format
    pub fn to_cam_frame(&self, format: ImageFormat) -> ImageResult<CamFrame> {
        let mut data = Vec::<u8>::new();

        let output_format = match format {
            ImageFormat::Png => image::ImageOutputFormat::Png,
            ImageFormat::Jpeg(q) => image::ImageOutputFormat::Jpeg(q),
        };

        self.image.write_to(&mut data, output_format)?;

        Ok(CamFrame {
            timestamp: self.timestamp,
            format,
            data,
        })
    }
}

impl PoseSample {
    /// True if the estimator found a marker in the frame.
    pub fn is_detection(&self) -> bool {
        self.translation_m.iter().any(|v| *v != 0.0)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE MODULES
// ------------------------------------------------------------------------------------------------

mod base64_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::decode(s.as_bytes()).map_err(D::Error::custom)
    }
}
