//! Vehicle arming state machine
//!
//! Arming takes two operator steps, a request and a confirmation, so a single stray command can't
//! start the thrusters. Motion commands are only allowed while armed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use serde::Serialize;

use crate::{
    channel_sink::{ChannelSink, ChannelSinkError},
    light_signal::LightSignaller,
    vehicle_client::{VehicleClient, VehicleClientError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Arming state machine
#[derive(Debug, Default)]
pub struct Arming {
    state: ArmingState,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArmingState {
    Disarmed,

    /// Arm requested, waiting for the operator to confirm
    AwaitingConfirm,

    Armed,
}

#[derive(Debug, thiserror::Error)]
pub enum ArmingError {
    #[error("Cannot {0} while {1:?}")]
    InvalidTransition(&'static str, ArmingState),

    #[error("Could not clear the motion channels: {0}")]
    ChannelError(ChannelSinkError),

    #[error("Vehicle error: {0}")]
    VehicleError(VehicleClientError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ArmingState {
    fn default() -> Self {
        ArmingState::Disarmed
    }
}

impl ArmingError {
    /// True if the error was caused by the vehicle link failing, rather than the vehicle not
    /// responding in time or an invalid request.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            ArmingError::ChannelError(ChannelSinkError::LinkError(_))
                | ArmingError::VehicleError(VehicleClientError::LinkError(_))
        )
    }
}

impl Arming {
    pub fn state(&self) -> ArmingState {
        self.state
    }

    /// Motion commands (jogs, touch control) are only allowed while armed.
    pub fn allows_motion(&self) -> bool {
        self.state == ArmingState::Armed
    }

    /// First step of arming.
    pub fn request(&mut self) -> Result<(), ArmingError> {
        match self.state {
            ArmingState::Disarmed => {
                info!("Arm requested, waiting for confirmation");
                self.state = ArmingState::AwaitingConfirm;
                Ok(())
            }
            s => Err(ArmingError::InvalidTransition("request arming", s)),
        }
    }

    /// Second step of arming: stop all motion, arm the vehicle, and wait for it to report armed.
    ///
    /// If the vehicle does not confirm the state goes back to `Disarmed`.
    pub fn confirm(
        &mut self,
        vehicle: &mut VehicleClient,
        sink: &mut ChannelSink,
        lights: &mut LightSignaller,
    ) -> Result<(), ArmingError> {
        if self.state != ArmingState::AwaitingConfirm {
            return Err(ArmingError::InvalidTransition("confirm arming", self.state));
        }

        // Whatever happens the request has been used up
        self.state = ArmingState::Disarmed;

        sink.clear_motion().map_err(ArmingError::ChannelError)?;
        vehicle.arm().map_err(ArmingError::VehicleError)?;

        self.state = ArmingState::Armed;
        info!("Vehicle armed");

        if let Err(e) = lights.set_light(true) {
            warn!("Could not turn the light on: {}", e);
        }

        Ok(())
    }

    /// Stop all motion, disarm the vehicle, and wait for it to report disarmed.
    ///
    /// A pending arm request is simply cancelled. If the vehicle does not confirm the state stays
    /// `Armed`.
    pub fn disarm(
        &mut self,
        vehicle: &mut VehicleClient,
        sink: &mut ChannelSink,
        lights: &mut LightSignaller,
    ) -> Result<(), ArmingError> {
        match self.state {
            ArmingState::Armed => (),
            ArmingState::AwaitingConfirm => {
                info!("Arm request cancelled");
                self.state = ArmingState::Disarmed;
                return Ok(());
            }
            s => return Err(ArmingError::InvalidTransition("disarm", s)),
        }

        sink.clear_motion().map_err(ArmingError::ChannelError)?;
        vehicle.disarm().map_err(ArmingError::VehicleError)?;

        self.state = ArmingState::Disarmed;
        info!("Vehicle disarmed");

        if let Err(e) = lights.set_light(false) {
            warn!("Could not turn the light off: {}", e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        light_signal::{LIGHT_AUX_OUTPUT, LIGHT_OFF_PWM_US, LIGHT_ON_PWM_US},
        vehicle_client::{sim::SimVehicle, Params},
    };
    use comms_if::eqpt::vehicle::{VehicleCommand, NUM_MAIN_OUTPUTS, PWM_NEUTRAL_US};
    use std::sync::Arc;

    struct Rig {
        sim: Arc<SimVehicle>,
        vehicle: VehicleClient,
        sink: ChannelSink,
        lights: LightSignaller,
    }

    fn rig() -> Rig {
        let sim = Arc::new(SimVehicle::new());
        let params = Params {
            arm_timeout_s: 0.1,
            ..Default::default()
        };
        Rig {
            vehicle: VehicleClient::new(sim.clone(), params),
            sink: ChannelSink::new(sim.clone()),
            lights: LightSignaller::new(sim.clone()),
            sim,
        }
    }

    fn light(sim: &SimVehicle) -> Option<u16> {
        sim.last_servo(NUM_MAIN_OUTPUTS + LIGHT_AUX_OUTPUT)
    }

    #[test]
    fn test_arming_requires_confirm() {
        let mut r = rig();
        let mut arming = Arming::default();

        assert!(matches!(
            arming.confirm(&mut r.vehicle, &mut r.sink, &mut r.lights),
            Err(ArmingError::InvalidTransition(_, ArmingState::Disarmed))
        ));
        assert!(!r.sim.is_armed());

        arming.request().unwrap();
        assert_eq!(arming.state(), ArmingState::AwaitingConfirm);
        assert!(!arming.allows_motion());
        assert!(arming.request().is_err());

        arming
            .confirm(&mut r.vehicle, &mut r.sink, &mut r.lights)
            .unwrap();
        assert_eq!(arming.state(), ArmingState::Armed);
        assert!(arming.allows_motion());
        assert!(r.sim.is_armed());
        assert_eq!(light(&r.sim), Some(LIGHT_ON_PWM_US));

        // Motion was cleared before arming
        let sent = r.sim.sent();
        let clear = sent
            .iter()
            .position(|c| matches!(c, VehicleCommand::RcChannelsOverride(ch) if ch[0..6].iter().all(|p| *p == PWM_NEUTRAL_US)))
            .unwrap();
        let arm = sent
            .iter()
            .position(|c| *c == VehicleCommand::ArmDisarm { arm: true })
            .unwrap();
        assert!(clear < arm);

        arming
            .disarm(&mut r.vehicle, &mut r.sink, &mut r.lights)
            .unwrap();
        assert_eq!(arming.state(), ArmingState::Disarmed);
        assert!(!r.sim.is_armed());
        assert_eq!(light(&r.sim), Some(LIGHT_OFF_PWM_US));
    }

    #[test]
    fn test_arm_timeout_returns_to_disarmed() {
        let mut r = rig();
        let mut arming = Arming::default();
        r.sim.set_responsive(false);

        arming.request().unwrap();
        let err = arming
            .confirm(&mut r.vehicle, &mut r.sink, &mut r.lights)
            .unwrap_err();

        assert!(matches!(
            err,
            ArmingError::VehicleError(VehicleClientError::ArmTimeout(..))
        ));
        assert!(!err.is_link_failure());
        assert_eq!(arming.state(), ArmingState::Disarmed);
    }

    #[test]
    fn test_disarm_timeout_stays_armed() {
        let mut r = rig();
        let mut arming = Arming::default();

        arming.request().unwrap();
        arming
            .confirm(&mut r.vehicle, &mut r.sink, &mut r.lights)
            .unwrap();

        r.sim.set_responsive(false);
        assert!(arming
            .disarm(&mut r.vehicle, &mut r.sink, &mut r.lights)
            .is_err());
        assert_eq!(arming.state(), ArmingState::Armed);
    }

    #[test]
    fn test_link_loss_while_arming() {
        let mut r = rig();
        let mut arming = Arming::default();

        arming.request().unwrap();
        r.sim.set_link_down(true);

        let err = arming
            .confirm(&mut r.vehicle, &mut r.sink, &mut r.lights)
            .unwrap_err();
        assert!(err.is_link_failure());
        assert_eq!(arming.state(), ArmingState::Disarmed);
    }

    #[test]
    fn test_disarm_cancels_request() {
        let mut r = rig();
        let mut arming = Arming::default();

        arming.request().unwrap();
        arming
            .disarm(&mut r.vehicle, &mut r.sink, &mut r.lights)
            .unwrap();
        assert_eq!(arming.state(), ArmingState::Disarmed);
        assert!(r.sim.sent().is_empty());
    }
}
