//! Cyclic module interface
//!
//! A cyclic module is initialised once from its parameter file and then stepped once per control
//! cycle by the main loop. Keeping init and step behind one trait lets tests drive a module
//! without the executable around it.

use crate::session::Session;

/// State of a module stepped once per control cycle.
pub trait State {
    /// What `init` needs, normally the parameter file name
    type InitData;
    type InitError;

    type InputData;
    type OutputData;

    /// Diagnostics from a single step, logged by the caller if needed
    type StatusReport;
    type ProcError;

    /// Load parameters and reset the module.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Step the module with this cycle's inputs.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
