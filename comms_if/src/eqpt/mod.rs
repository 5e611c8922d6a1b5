//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the equipment around the
//! control core: the vehicle autopilot, the haptic device, and the vision pipeline.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod cam;
pub mod haptic;
pub mod vehicle;
