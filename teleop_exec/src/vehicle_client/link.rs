//! # Vehicle Link
//!
//! Transport between the control core and the vehicle. Each UDP datagram carries one JSON
//! serialised [`VehicleCommand`] or [`VehicleTelemetry`] message, a bridge on the vehicle side
//! translates them to and from the autopilot protocol.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use std::{
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Mutex,
    time::Duration,
};

use comms_if::eqpt::vehicle::{VehicleCommand, VehicleTelemetry};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest payload a UDP datagram can carry.
const MAX_DATAGRAM_LEN: usize = 65_507;

/// Shortest read timeout accepted, zero durations are rejected by the OS.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A bidirectional link to a vehicle.
///
/// Links are shared between the main loop and the heartbeat and light threads, so all methods take
/// `&self`. Only the main loop receives.
pub trait VehicleLink: Send + Sync {
    /// Send a command to the vehicle.
    fn send(&self, cmd: &VehicleCommand) -> Result<(), VehicleLinkError>;

    /// Receive a pending telemetry message without blocking.
    fn try_recv(&self) -> Result<Option<VehicleTelemetry>, VehicleLinkError>;

    /// Receive the next telemetry message, waiting at most `timeout`.
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<VehicleTelemetry>, VehicleLinkError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Vehicle link over UDP.
pub struct UdpVehicleLink {
    socket: UdpSocket,

    /// Address of the vehicle bridge, learned from the first datagram if not configured.
    peer: Mutex<Option<SocketAddr>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VehicleLinkError {
    #[error("Could not bind the vehicle link socket to {0}: {1}")]
    BindError(String, std::io::Error),

    #[error("Could not resolve the vehicle address {0}")]
    InvalidAddress(String),

    #[error("No datagram has been received from the vehicle yet so its address is unknown")]
    NoPeer,

    #[error("Could not serialize the command: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize a message from the vehicle: {0}")]
    DeserializeError(serde_json::Error),

    #[error("Vehicle link IO error: {0}")]
    IoError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl UdpVehicleLink {
    /// Bind the link to a local address, optionally with a fixed peer address.
    pub fn new(bind_addr: &str, peer_addr: Option<&str>) -> Result<Self, VehicleLinkError> {
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| VehicleLinkError::BindError(bind_addr.into(), e))?;

        let peer = match peer_addr {
            Some(a) => Some(resolve(a)?),
            None => None,
        };

        Ok(Self {
            socket,
            peer: Mutex::new(peer),
        })
    }

    /// Local address the link is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, VehicleLinkError> {
        self.socket.local_addr().map_err(VehicleLinkError::IoError)
    }

    fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().expect("UdpVehicleLink: peer mutex poisoned")
    }

    fn recv(&self) -> Result<Option<VehicleTelemetry>, VehicleLinkError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

        let (len, from) = match self.socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(None)
            }
            Err(e) => return Err(VehicleLinkError::IoError(e)),
        };

        {
            let mut peer = self.peer.lock().expect("UdpVehicleLink: peer mutex poisoned");
            if peer.is_none() {
                trace!("Vehicle peer address learned: {}", from);
                *peer = Some(from);
            }
        }

        serde_json::from_slice(&buf[..len])
            .map(Some)
            .map_err(VehicleLinkError::DeserializeError)
    }
}

impl VehicleLink for UdpVehicleLink {
    fn send(&self, cmd: &VehicleCommand) -> Result<(), VehicleLinkError> {
        let peer = self.peer().ok_or(VehicleLinkError::NoPeer)?;

        let data = serde_json::to_vec(cmd).map_err(VehicleLinkError::SerializationError)?;

        self.socket
            .send_to(&data, peer)
            .map(|_| ())
            .map_err(VehicleLinkError::IoError)
    }

    fn try_recv(&self) -> Result<Option<VehicleTelemetry>, VehicleLinkError> {
        self.socket
            .set_nonblocking(true)
            .map_err(VehicleLinkError::IoError)?;

        self.recv()
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<VehicleTelemetry>, VehicleLinkError> {
        self.socket
            .set_nonblocking(false)
            .map_err(VehicleLinkError::IoError)?;
        self.socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .map_err(VehicleLinkError::IoError)?;

        self.recv()
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn resolve(addr: &str) -> Result<SocketAddr, VehicleLinkError> {
    addr.to_socket_addrs()
        .ok()
        .and_then(|mut a| a.next())
        .ok_or_else(|| VehicleLinkError::InvalidAddress(addr.into()))
}
