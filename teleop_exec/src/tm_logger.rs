//! # Telemetry Logger
//!
//! Writes the data log of a trial: a couple of free-text header lines, one JSON record per cycle,
//! and a terminal outcome line. Lines are only ever appended.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Trial data log writer.
pub struct TmLogger {
    path: PathBuf,

    writer: BufWriter<File>,

    num_records: u64,
}

/// One cycle of the trial data log.
///
/// Field names are those read by the experiment analysis scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Time since the start of the trial
    ///
    /// Units: seconds
    pub time: f64,

    pub xacc: f64,
    pub yacc: f64,
    pub zacc: f64,
    pub xgyro: f64,
    pub ygyro: f64,
    pub zgyro: f64,

    #[serde(rename = "fingerZero")]
    pub finger_zero: f64,
    #[serde(rename = "fingerPos")]
    pub finger_pos: f64,
    #[serde(rename = "fingerForce")]
    pub finger_force: f64,
    #[serde(rename = "adjustedFingerPos")]
    pub adjusted_finger_pos: f64,
    #[serde(rename = "adjustedFingerForce")]
    pub adjusted_finger_force: f64,

    /// Vibration flag sent to the haptic device
    pub vibration: f64,
    /// Hardness sent to the haptic device
    pub hardness: f64,

    #[serde(rename = "visualTranslation0")]
    pub visual_translation_0: f64,
    #[serde(rename = "visualTranslation1")]
    pub visual_translation_1: f64,
    #[serde(rename = "visualTranslation2")]
    pub visual_translation_2: f64,
    #[serde(rename = "visualRotation0")]
    pub visual_rotation_0: f64,
    #[serde(rename = "visualRotation1")]
    pub visual_rotation_1: f64,
    #[serde(rename = "visualRotation2")]
    pub visual_rotation_2: f64,

    #[serde(rename = "avgxloc")]
    pub avg_x_loc: f64,
    #[serde(rename = "avgyloc")]
    pub avg_y_loc: f64,
    #[serde(rename = "avgzloc")]
    pub avg_z_loc: f64,

    pub heading: f64,

    #[serde(rename = "tgtDist")]
    pub target_dist: f64,

    #[serde(rename = "speedDemand")]
    pub speed_demand: u16,
    #[serde(rename = "turnDemand")]
    pub turn_demand: u16,

    #[serde(rename = "groundSpeed")]
    pub ground_speed: f64,

    pub depth: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmLoggerError {
    #[error("Could not create the log file {0:?}: {1}")]
    CreateError(PathBuf, std::io::Error),

    #[error("Could not write to the log file: {0}")]
    WriteError(std::io::Error),

    #[error("Could not serialize the log record: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmLogger {
    /// Create a new log file, its parent directory is created if needed. Fails if the file
    /// already exists, an earlier trial's log is never overwritten.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, TmLoggerError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TmLoggerError::CreateError(path.clone(), e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| TmLoggerError::CreateError(path.clone(), e))?;

        debug!("Trial log opened at {:?}", path);

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            num_records: 0,
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written.
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Append a line of text.
    pub fn write_line(&mut self, line: &str) -> Result<(), TmLoggerError> {
        writeln!(self.writer, "{}", line).map_err(TmLoggerError::WriteError)
    }

    /// Append a line of text prefixed by a time, `"{time_s}: {text}"`.
    pub fn write_timed(&mut self, time_s: f64, text: &str) -> Result<(), TmLoggerError> {
        self.write_line(&format!("{}: {}", time_s, text))
    }

    /// Append a record as a single line of JSON.
    pub fn write_record(&mut self, record: &LogRecord) -> Result<(), TmLoggerError> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(TmLoggerError::SerializationError)?;
        self.writer
            .write_all(b"\n")
            .map_err(TmLoggerError::WriteError)?;

        self.num_records += 1;

        Ok(())
    }

    /// Flush and close the log, returning its path.
    pub fn close(mut self) -> Result<PathBuf, TmLoggerError> {
        self.writer.flush().map_err(TmLoggerError::WriteError)?;
        debug!(
            "Trial log {:?} closed after {} records",
            self.path, self.num_records
        );
        Ok(self.path)
    }

    /// Close the log and delete it.
    pub fn discard(self) {
        let Self { path, writer, .. } = self;
        drop(writer);

        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Could not remove {:?}: {}", path, e);
        }
    }
}
