//! # Camera Client
//!
//! Subscribes to the vision pipeline on a background thread. Every vision frame received is
//! published into a [`FrameRelay`](crate::frame_relay::FrameRelay), so the main loop only sees the
//! latest one.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use comms_if::{
    eqpt::cam::VisionFrame,
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

use crate::frame_relay::FramePublisher;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The camera client
pub struct CamClient {
    bg_jh: Option<JoinHandle<()>>,

    bg_run: Arc<AtomicBool>,

    connected: Arc<AtomicBool>,

    num_bad_frames: Arc<AtomicU64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CamClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not subscribe to the vision frames: {0}")]
    SubscribeError(zmq::Error),
}

/// Errors receiving a single frame, these are logged and the frame skipped.
#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error("Could not recieve a message from the server: {0}")]
    RecvError(zmq::Error),

    #[error("The server sent a message which was not valid UTF-8")]
    NonUtf8,

    #[error("Could not deserialize the vision frame: {0}")]
    DeserializeError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamClient {
    /// Create a new instance of the camera client, frames received are published with
    /// `publisher`.
    ///
    /// This function will not block until the server connects.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        publisher: FramePublisher<VisionFrame>,
    ) -> Result<Self, CamClientError> {
        let socket_options = SocketOptions {
            recv_timeout: 100,
            ..SocketOptions::link()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, &params.cam_endpoint)
            .map_err(CamClientError::SocketError)?;
        socket
            .set_subscribe(b"")
            .map_err(CamClientError::SubscribeError)?;

        let bg_run = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(false));
        let num_bad_frames = Arc::new(AtomicU64::new(0));

        let run_clone = bg_run.clone();
        let connected_clone = connected.clone();
        let bad_clone = num_bad_frames.clone();
        let bg_jh = thread::spawn(move || {
            bg_thread(socket, publisher, run_clone, connected_clone, bad_clone)
        });

        Ok(Self {
            bg_jh: Some(bg_jh),
            bg_run,
            connected,
            num_bad_frames,
        })
    }

    /// Check if the client is connected to the vision pipeline
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Number of messages which could not be decoded.
    pub fn num_bad_frames(&self) -> u64 {
        self.num_bad_frames.load(Ordering::Relaxed)
    }

    /// Stop the background thread.
    pub fn stop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            jh.join().ok();
        }
    }
}

impl Drop for CamClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn bg_thread(
    socket: MonitoredSocket,
    publisher: FramePublisher<VisionFrame>,
    run: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    num_bad_frames: Arc<AtomicU64>,
) {
    while run.load(Ordering::Relaxed) {
        connected.store(socket.connected(), Ordering::Relaxed);

        match recv_frame(&socket) {
            Ok(Some(frame)) => publisher.publish(frame),
            Ok(None) => (),
            Err(e) => {
                num_bad_frames.fetch_add(1, Ordering::Relaxed);
                warn!("Vision frame skipped: {}", e);
            }
        }
    }

    debug!("Camera client stopped");
}

/// Receive one frame, `None` if nothing arrived within the socket's receive timeout.
fn recv_frame(socket: &MonitoredSocket) -> Result<Option<VisionFrame>, FrameError> {
    let msg = match socket.recv_string(0) {
        Ok(Ok(s)) => s,
        Ok(Err(_)) => return Err(FrameError::NonUtf8),
        Err(zmq::Error::EAGAIN) => return Ok(None),
        Err(e) => return Err(FrameError::RecvError(e)),
    };

    serde_json::from_str(&msg)
        .map(Some)
        .map_err(FrameError::DeserializeError)
}
