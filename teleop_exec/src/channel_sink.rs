//! # Channel Sink
//!
//! Holds the RC channel override vector sent to the vehicle. Channels are numbered from 1 like
//! the autopilot's RC inputs, every change transmits the whole vector.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{trace, warn};
use std::sync::Arc;

use comms_if::eqpt::vehicle::{
    VehicleCommand, NUM_RC_CHANNELS, PWM_NEUTRAL_US, RC_NO_OVERRIDE,
};

use crate::vehicle_client::{VehicleLink, VehicleLinkError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// RC channel override producer.
pub struct ChannelSink {
    link: Arc<dyn VehicleLink>,

    channels: [u16; NUM_RC_CHANNELS],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The channels which move the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionChannel {
    Pitch = 1,
    Roll = 2,
    Throttle = 3,
    Yaw = 4,
    Forward = 5,
    Lateral = 6,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelSinkError {
    #[error("Channel {0} does not exist, channels are numbered 1 to 18")]
    InvalidChannel(usize),

    #[error("Could not send the channel overrides: {0}")]
    LinkError(VehicleLinkError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionChannel {
    pub const ALL: [MotionChannel; 6] = [
        MotionChannel::Pitch,
        MotionChannel::Roll,
        MotionChannel::Throttle,
        MotionChannel::Yaw,
        MotionChannel::Forward,
        MotionChannel::Lateral,
    ];

    /// Channel number of this motion channel.
    pub fn id(self) -> usize {
        self as usize
    }
}

impl ChannelSink {
    /// Create a new sink with no channel overridden.
    pub fn new(link: Arc<dyn VehicleLink>) -> Self {
        Self {
            link,
            channels: [RC_NO_OVERRIDE; NUM_RC_CHANNELS],
        }
    }

    /// Set a single channel and transmit the full override vector.
    ///
    /// Channel IDs outside `1..=18` are rejected without changing anything.
    pub fn set_channel(&mut self, channel_id: usize, pulse_width: u16) -> Result<(), ChannelSinkError> {
        if channel_id < 1 || channel_id > NUM_RC_CHANNELS {
            warn!("Channel {} does not exist, request ignored", channel_id);
            return Err(ChannelSinkError::InvalidChannel(channel_id));
        }

        self.channels[channel_id - 1] = pulse_width;
        trace!("Channel {} set to {} us", channel_id, pulse_width);

        self.transmit()
    }

    /// Set one of the motion channels.
    pub fn set_motion(&mut self, channel: MotionChannel, pulse_width: u16) -> Result<(), ChannelSinkError> {
        self.set_channel(channel.id(), pulse_width)
    }

    /// Set all motion channels to neutral and transmit. This does not disarm the vehicle.
    pub fn clear_motion(&mut self) -> Result<(), ChannelSinkError> {
        for ch in MotionChannel::ALL.iter() {
            self.channels[ch.id() - 1] = PWM_NEUTRAL_US;
        }

        self.transmit()
    }

    /// Current override vector, index 0 is channel 1.
    pub fn channels(&self) -> &[u16; NUM_RC_CHANNELS] {
        &self.channels
    }

    /// Current value of a channel, `None` for an invalid channel ID.
    pub fn channel(&self, channel_id: usize) -> Option<u16> {
        match channel_id {
            1..=NUM_RC_CHANNELS => Some(self.channels[channel_id - 1]),
            _ => None,
        }
    }

    fn transmit(&self) -> Result<(), ChannelSinkError> {
        self.link
            .send(&VehicleCommand::RcChannelsOverride(self.channels))
            .map_err(ChannelSinkError::LinkError)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle_client::sim::SimVehicle;

    fn sink() -> (Arc<SimVehicle>, ChannelSink) {
        let sim = Arc::new(SimVehicle::new());
        let sink = ChannelSink::new(sim.clone());
        (sim, sink)
    }

    #[test]
    fn test_out_of_range_channels_rejected() {
        let (sim, mut sink) = sink();

        assert!(matches!(
            sink.set_channel(0, 1500),
            Err(ChannelSinkError::InvalidChannel(0))
        ));
        assert!(matches!(
            sink.set_channel(19, 1500),
            Err(ChannelSinkError::InvalidChannel(19))
        ));

        assert!(sink.channels().iter().all(|c| *c == RC_NO_OVERRIDE));
        assert!(sim.last_override().is_none());
    }

    #[test]
    fn test_edge_channels_accepted() {
        let (sim, mut sink) = sink();

        sink.set_channel(1, 1600).unwrap();
        sink.set_channel(18, 1200).unwrap();

        let sent = sim.last_override().unwrap();
        assert_eq!(sent[0], 1600);
        assert_eq!(sent[17], 1200);
        assert!(sent[1..17].iter().all(|c| *c == RC_NO_OVERRIDE));
        assert_eq!(sink.channel(18), Some(1200));
        assert_eq!(sink.channel(19), None);
    }

    #[test]
    fn test_clear_motion() {
        let (sim, mut sink) = sink();

        sink.set_motion(MotionChannel::Forward, 1700).unwrap();
        sink.set_channel(9, 1900).unwrap();
        sink.clear_motion().unwrap();

        let sent = sim.last_override().unwrap();
        assert!(sent[0..6].iter().all(|c| *c == PWM_NEUTRAL_US));
        assert_eq!(sent[8], 1900);

        // Never arms or disarms
        assert!(!sim
            .sent()
            .iter()
            .any(|c| matches!(c, VehicleCommand::ArmDisarm { .. })));
    }
}
