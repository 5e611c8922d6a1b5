//! Parameter file loading
//!
//! Parameters are TOML files kept in `$ROV_TELEOP_ROOT/params`, one per module.

use serde::de::DeserializeOwned;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (ROV_TELEOP_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot open the parameter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Invalid parameters: {0}")]
    DeserialiseError(toml::de::Error),
}

/// Full path of a file in the parameter directory.
pub fn path(file_name: &str) -> Result<PathBuf, LoadError> {
    crate::host::get_sw_root()
        .map(|root| root.join("params").join(file_name))
        .map_err(|_| LoadError::SwRootNotSet)
}

/// Load a file from the parameter directory.
pub fn load<P: DeserializeOwned>(file_name: &str) -> Result<P, LoadError> {
    load_from(path(file_name)?)
}

/// Load parameters from an explicit path.
pub fn load_from<P: DeserializeOwned, F: AsRef<Path>>(path: F) -> Result<P, LoadError> {
    let text = fs::read_to_string(path.as_ref())
        .map_err(|e| LoadError::FileLoadError(path.as_ref().to_path_buf(), e))?;

    from_str(&text)
}

pub fn from_str<P: DeserializeOwned>(text: &str) -> Result<P, LoadError> {
    toml::from_str(text).map_err(LoadError::DeserialiseError)
}
