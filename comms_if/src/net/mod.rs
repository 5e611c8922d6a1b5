//! # Network Module
//!
//! ZMQ sockets for the operator TC/TM links and the vision frame feed, plus the endpoint
//! parameters shared by every executable.
//!
//! Each [`MonitoredSocket`] has a monitor thread which counts the peers connected to it, so the
//! executables can tell the operator whether anything is listening.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};
use zmq::{Context, Socket, SocketEvent, SocketType};

pub use zmq;

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Used to give each monitor a unique inproc endpoint.
static MONITOR_COUNT: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A ZMQ socket with a monitor thread tracking its peers.
///
/// Derefs to the underlying [`Socket`] for sending and receiving.
pub struct MonitoredSocket {
    socket: Socket,

    monitor_endpoint: String,

    monitor_jh: Option<thread::JoinHandle<()>>,

    stop: Arc<AtomicBool>,

    peers: Arc<AtomicUsize>,
}

/// Network endpoints of the control core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetParams {
    /// Endpoint of the TC server (REP), e.g. `"tcp://*:5020"`
    pub tc_endpoint: String,

    /// Endpoint of the TM publisher (PUB)
    pub tm_endpoint: String,

    /// Endpoint of the vision frame publisher to subscribe to
    pub cam_endpoint: String,

    /// Local UDP address the vehicle link binds to, e.g. `"0.0.0.0:14550"`
    pub vehicle_bind_addr: String,

    /// Address of the vehicle bridge. If unset the peer is learned from the first datagram.
    #[serde(default)]
    pub vehicle_peer_addr: Option<String>,

    /// Address of the haptic device, e.g. `"10.55.0.1:8787"`
    pub haptic_addr: String,
}

/// Options applied to a [`MonitoredSocket`] before it connects.
///
/// Times are in milliseconds and map onto the `zmq_setsockopt` options of the same name.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Bind to the endpoint instead of connecting to it. Set for servers.
    pub bind: bool,

    /// Block in `MonitoredSocket::new()` until the first connection is made or `connect_timeout`
    /// expires.
    pub block_on_first_connect: bool,

    pub req_correlate: bool,
    pub req_relaxed: bool,

    pub linger: i32,
    pub reconnect_ivl: i32,
    pub reconnect_ivl_max: i32,
    pub connect_timeout: i32,

    /// `-1` blocks forever, `0` returns at once
    pub recv_timeout: i32,
    pub send_timeout: i32,

    /// ZMTP heartbeats, used to notice a dropped operator station quickly
    pub heartbeat_ivl: i32,
    pub heartbeat_timeout: i32,
    pub heartbeat_ttl: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not connect the socket: {0:?}")]
    CouldNotConnect(Option<zmq::Error>),

    #[error("Could not read event from monitor socket: {0}")]
    EventReadError(zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(&'static str, zmq::Error),

    #[error("Could not start the monitor thread: {0}")]
    MonitorThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Create the socket, apply `socket_options` and connect or bind it to `endpoint`.
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        socket_options: SocketOptions,
        endpoint: &str,
    ) -> Result<Self, MonitoredSocketError> {
        let socket = ctx
            .socket(socket_type)
            .map_err(MonitoredSocketError::CreateSocketError)?;

        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            MONITOR_COUNT.fetch_add(1, Ordering::Relaxed)
        );
        socket
            .monitor(&monitor_endpoint, SocketEvent::ALL as i32)
            .map_err(MonitoredSocketError::MonitoringEnableError)?;
        let monitor = ctx
            .socket(zmq::PAIR)
            .map_err(MonitoredSocketError::CreateSocketError)?;
        monitor
            .connect(&monitor_endpoint)
            .map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        socket_options.apply(&socket)?;

        if socket_options.bind {
            socket.bind(endpoint)
        } else {
            socket.connect(endpoint)
        }
        .map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        let peers = Arc::new(AtomicUsize::new(0));

        if socket_options.block_on_first_connect {
            wait_for_connection(&monitor)?;
            peers.store(1, Ordering::Relaxed);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let monitor_jh = {
            let stop = stop.clone();
            let peers = peers.clone();
            let name = monitor_endpoint.clone();
            thread::Builder::new()
                .name("socket_monitor".into())
                .spawn(move || monitor_thread(monitor, name, stop, peers))
                .map_err(MonitoredSocketError::MonitorThreadError)?
        };

        Ok(Self {
            socket,
            monitor_endpoint,
            monitor_jh: Some(monitor_jh),
            stop,
            peers,
        })
    }

    /// Number of peers currently connected to the socket.
    pub fn peers(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }

    pub fn connected(&self) -> bool {
        self.peers() > 0
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        // The monitor thread is blocked on its next event, which only arrives once the socket
        // closes, so it is left to exit on its own.
        if self.monitor_jh.take().is_some() {
            debug!("Monitor {} detached", self.monitor_endpoint);
        }
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl std::ops::DerefMut for MonitoredSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.socket
    }
}

impl SocketOptions {
    /// Options shared by the operator and vision links: non-blocking startup, heartbeats and a
    /// short linger so the executable can exit with the operator station gone.
    pub fn link() -> Self {
        Self {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            ..Default::default()
        }
    }

    /// Apply these options to `socket`.
    pub fn apply(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        fn opt<T>(
            name: &'static str,
            f: impl FnOnce(T) -> zmq::Result<()>,
            val: T,
        ) -> Result<(), MonitoredSocketError> {
            f(val).map_err(|e| MonitoredSocketError::SocketOptionError(name, e))
        }

        opt("connect_timeout", |v| socket.set_connect_timeout(v), self.connect_timeout)?;
        opt("heartbeat_ivl", |v| socket.set_heartbeat_ivl(v), self.heartbeat_ivl)?;
        opt("heartbeat_timeout", |v| socket.set_heartbeat_timeout(v), self.heartbeat_timeout)?;
        opt("heartbeat_ttl", |v| socket.set_heartbeat_ttl(v), self.heartbeat_ttl)?;
        opt("linger", |v| socket.set_linger(v), self.linger)?;
        opt("reconnect_ivl", |v| socket.set_reconnect_ivl(v), self.reconnect_ivl)?;
        opt("reconnect_ivl_max", |v| socket.set_reconnect_ivl_max(v), self.reconnect_ivl_max)?;
        opt("rcvtimeo", |v| socket.set_rcvtimeo(v), self.recv_timeout)?;
        opt("sndtimeo", |v| socket.set_sndtimeo(v), self.send_timeout)?;

        // REQ only
        if let Ok(SocketType::REQ) = socket.get_socket_type() {
            opt("req_correlate", |v| socket.set_req_correlate(v), self.req_correlate)?;
            opt("req_relaxed", |v| socket.set_req_relaxed(v), self.req_relaxed)?;
        }

        Ok(())
    }
}

impl Default for SocketOptions {
    /// The ZMQ defaults, blocking on the first connection.
    fn default() -> Self {
        Self {
            bind: false,
            block_on_first_connect: true,
            connect_timeout: 0,
            heartbeat_ivl: 0,
            heartbeat_timeout: 0,
            heartbeat_ttl: 0,
            linger: 30_000,
            reconnect_ivl: 100,
            reconnect_ivl_max: 0,
            recv_timeout: -1,
            req_correlate: false,
            req_relaxed: false,
            send_timeout: 0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read one event from a monitor socket.
///
/// Events arrive as two frames: a 6 byte header holding the event id, then the peer address.
fn read_event(monitor: &Socket) -> Result<SocketEvent, zmq::Error> {
    let header = monitor.recv_msg(0)?;
    if header.len() < 2 || !monitor.get_rcvmore()? {
        return Err(zmq::Error::EINVAL);
    }
    let id = u16::from_ne_bytes([header[0], header[1]]);

    monitor.recv_msg(0)?;

    Ok(SocketEvent::from_raw(id))
}

fn wait_for_connection(monitor: &Socket) -> Result<(), MonitoredSocketError> {
    loop {
        match read_event(monitor).map_err(MonitoredSocketError::EventReadError)? {
            SocketEvent::CONNECTED => return Ok(()),
            SocketEvent::CONNECT_DELAYED => (),
            _ => return Err(MonitoredSocketError::CouldNotConnect(None)),
        }
    }
}

fn monitor_thread(
    monitor: Socket,
    name: String,
    stop: Arc<AtomicBool>,
    peers: Arc<AtomicUsize>,
) {
    while !stop.load(Ordering::Relaxed) {
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading event from monitor {}: {}", name, e);
                peers.store(0, Ordering::Relaxed);
                return;
            }
        };

        match event {
            SocketEvent::CONNECTED | SocketEvent::ACCEPTED => {
                peers.fetch_add(1, Ordering::Relaxed);
            }
            SocketEvent::DISCONNECTED => {
                // Saturate at zero, a blocking connect may have been counted before the monitor
                // saw its event
                peers
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
                    .ok();
            }
            SocketEvent::MONITOR_STOPPED => return,
            _ => (),
        }

        trace!("{}: {:?}, {} peers", name, event, peers.load(Ordering::Relaxed));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_net_params_peer_optional() {
        let params: NetParams = serde_json::from_str(
            r#"{
                "tc_endpoint": "tcp://*:5020",
                "tm_endpoint": "tcp://*:5021",
                "cam_endpoint": "tcp://localhost:5030",
                "vehicle_bind_addr": "0.0.0.0:14550",
                "haptic_addr": "10.55.0.1:8787"
            }"#,
        )
        .unwrap();

        assert!(params.vehicle_peer_addr.is_none());
        assert_eq!(params.haptic_addr, "10.55.0.1:8787");
    }

    #[test]
    fn test_link_options() {
        let opts = SocketOptions::link();
        assert!(!opts.bind);
        assert!(!opts.block_on_first_connect);
        assert_eq!(opts.heartbeat_ivl, 500);
        assert_eq!(opts.recv_timeout, -1);
    }

    #[test]
    fn test_bound_socket_does_not_block() {
        let ctx = Context::new();
        let socket = MonitoredSocket::new(
            &ctx,
            zmq::PUB,
            SocketOptions {
                bind: true,
                linger: 0,
                ..SocketOptions::link()
            },
            "inproc://net_test_pub",
        )
        .unwrap();

        assert!(!socket.connected());
        assert_eq!(socket.peers(), 0);
    }
}
