//! Shared utilities for the ROV teleoperation executables: sessions, logging, parameter loading,
//! and TC scripts.

pub mod host;
#[macro_use]
pub mod logger;
pub mod maths;
pub mod module;
pub mod params;
pub mod script_interpreter;
pub mod session;
pub mod time;

/// Log an error and panic.
///
/// Only for states the executable cannot continue from. Anything the operator could recover from
/// should be returned as an error.
#[macro_export]
macro_rules! raise_error {
    () => ({
        log::error!("Unrecoverable error");
        std::panic!("Unrecoverable error");
    });
    ($($arg:tt)+) => ({
        log::error!($($arg)+);
        std::panic!("Unrecoverable error");
    });
}
