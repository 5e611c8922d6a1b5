//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the teleoperation software: operator
//! telecommands, vehicle link messages, the haptic device frame format, and camera frames.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator telecommands
pub mod tc;

/// Command, telemetry, and frame definitions for equipment (vehicle, haptic device, cameras)
pub mod eqpt;

/// Network module
pub mod net;
