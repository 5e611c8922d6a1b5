//! # Teleoperation library.
//!
//! This library allows other crates in the workspace (and the integration tests) to access items
//! defined inside the teleoperation executable crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Camera client - subscribes to the vision pipeline and fills the frame relay
pub mod cam_client;

/// Channel sink - validated RC channel overrides sent to the vehicle
pub mod channel_sink;

/// Command mapper - turns haptic readings and jogs into channel setpoints
pub mod cmd_mapper;

/// Global data store for the executable
pub mod data_store;

/// Frame relay - single slot hand-off of the latest vision frame
pub mod frame_relay;

/// Haptic client - exchanges frames with the haptic device on its own thread
pub mod haptic_client;

/// Heartbeat emitter - keeps the vehicle link alive
pub mod heartbeat;

/// Light signaller - flashes cues to the diver with the vehicle light
pub mod light_signal;

/// Executable parameters
pub mod params;

/// Pose filter - smooths the marker pose and vehicle telemetry
pub mod pose_filter;

/// Telecommand client - receives TCs from the operator surface
pub mod tc_client;

/// Telemetry logger - one JSON record per cycle while a trial runs
pub mod tm_logger;

/// Telemetry server - publishes a status packet every cycle
pub mod tm_server;

/// Trial manager - experiment trial and vehicle arming state machines
pub mod trial_mgr;

/// Vehicle client - vehicle link, telemetry cache, and acknowledged commands
pub mod vehicle_client;

/// Video logger - motion JPEG recording of trials
pub mod video_log;
