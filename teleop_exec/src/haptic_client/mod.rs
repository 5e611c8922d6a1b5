//! # Haptic Client
//!
//! Exchanges frames with the haptic device over a persistent TCP stream on a background thread.
//! The thread sends the current demand, blocks until the device replies with a reading, stores it,
//! and goes round again with no pause. Sends and receives are not paired, the main loop only ever
//! sees the latest reading.
//!
//! The link is not reconnected: any read, write, or decode error ends the thread and marks the
//! client as dead, which the main loop polls with [`HapticClient::is_alive`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod cells;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error, info, trace};
use std::{
    io::{Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use comms_if::eqpt::haptic::{
    HapticDemand, HapticFrameError, HapticReading, HAPTIC_FRAME_LEN, HARDNESS_HARD,
    HARDNESS_SOFT,
};

pub use cells::{AtomicF64, HapticCells};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Haptic device client
pub struct HapticClient {
    cells: Arc<HapticCells>,

    stop: Arc<AtomicBool>,

    /// Clone of the stream used to unblock the thread on stop
    shutdown_handle: Option<TcpStream>,

    bg_jh: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HapticClientError {
    #[error("Could not resolve the haptic device address {0}")]
    InvalidAddress(String),

    #[error("Could not connect to the haptic device at {0}: {1}")]
    ConnectError(String, std::io::Error),

    #[error("Could not configure the haptic device socket: {0}")]
    SocketError(std::io::Error),
}

/// Reasons the exchange thread stops.
#[derive(Debug, thiserror::Error)]
enum ExchangeError {
    #[error("could not send the demand: {0}")]
    Send(std::io::Error),

    #[error("could not read the reading: {0}")]
    Recv(std::io::Error),

    #[error("could not decode the reading: {0}")]
    Decode(HapticFrameError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HapticClient {
    /// Connect to the haptic device and start exchanging frames.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, HapticClientError> {
        let sock_addr = addr
            .to_socket_addrs()
            .ok()
            .and_then(|mut a| a.next())
            .ok_or_else(|| HapticClientError::InvalidAddress(addr.into()))?;

        let stream = TcpStream::connect_timeout(&sock_addr, timeout)
            .map_err(|e| HapticClientError::ConnectError(addr.into(), e))?;

        info!("Connected to the haptic device at {}", addr);

        Self::from_stream(stream)
    }

    /// Start exchanging frames over an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, HapticClientError> {
        stream
            .set_nodelay(true)
            .map_err(HapticClientError::SocketError)?;
        let shutdown_handle = stream
            .try_clone()
            .map_err(HapticClientError::SocketError)?;

        let cells = Arc::new(HapticCells::new(HapticDemand::default(), true));
        let stop = Arc::new(AtomicBool::new(false));

        let cells_clone = cells.clone();
        let stop_clone = stop.clone();
        let bg_jh = thread::Builder::new()
            .name("haptic_client".into())
            .spawn(move || exchange_thread(stream, cells_clone, stop_clone))
            .map_err(HapticClientError::SocketError)?;

        Ok(Self {
            cells,
            stop,
            shutdown_handle: Some(shutdown_handle),
            bg_jh: Some(bg_jh),
        })
    }

    /// A client with no device. Readings stay at zero and it is never alive.
    pub fn offline() -> Self {
        Self {
            cells: Arc::new(HapticCells::new(HapticDemand::default(), false)),
            stop: Arc::new(AtomicBool::new(true)),
            shutdown_handle: None,
            bg_jh: None,
        }
    }

    /// Latest reading from the device.
    pub fn reading(&self) -> HapticReading {
        self.cells.reading()
    }

    /// Demand currently being sent to the device.
    pub fn demand(&self) -> HapticDemand {
        self.cells.demand()
    }

    /// Start or stop the vibration.
    pub fn set_vibration(&self, on: bool) {
        self.cells.vibration.store(if on { 1.0 } else { 0.0 });
    }

    /// Set the hardness, between [`HARDNESS_SOFT`] and [`HARDNESS_HARD`].
    pub fn set_hardness(&self, hardness: f64) {
        self.cells
            .hardness
            .store(hardness.max(HARDNESS_SOFT).min(HARDNESS_HARD));
    }

    /// False if the link was never up or the exchange thread has stopped.
    pub fn is_alive(&self) -> bool {
        self.cells.is_alive()
    }

    /// Number of completed exchanges with the device.
    pub fn num_exchanges(&self) -> u64 {
        self.cells.num_exchanges.load(Ordering::Relaxed)
    }

    /// Stop the exchange thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(s) = self.shutdown_handle.take() {
            s.shutdown(Shutdown::Both).ok();
        }

        if let Some(jh) = self.bg_jh.take() {
            jh.join().ok();
        }
    }
}

impl Drop for HapticClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, exchanges frames with the device until an error occurs or a stop is
/// requested.
fn exchange_thread(mut stream: TcpStream, cells: Arc<HapticCells>, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; HAPTIC_FRAME_LEN];

    let result = loop {
        if stop.load(Ordering::Relaxed) {
            break Ok(());
        }

        match exchange(&mut stream, &cells, &mut buf) {
            Ok(r) => trace!("Haptic reading: {:?}", r),
            Err(e) => break Err(e),
        }
    };

    cells.alive.store(false, Ordering::Relaxed);

    match result {
        Ok(()) => debug!("Haptic exchange thread stopped"),
        Err(_) if stop.load(Ordering::Relaxed) => debug!("Haptic exchange thread stopped"),
        Err(e) => error!("Haptic link lost, {}", e),
    }
}

/// One send/receive exchange with the device.
fn exchange<S: Read + Write>(
    stream: &mut S,
    cells: &HapticCells,
    buf: &mut [u8; HAPTIC_FRAME_LEN],
) -> Result<HapticReading, ExchangeError> {
    stream
        .write_all(&cells.demand().to_frame())
        .map_err(ExchangeError::Send)?;

    stream.read_exact(buf).map_err(ExchangeError::Recv)?;

    let reading = HapticReading::from_frame(buf).map_err(ExchangeError::Decode)?;
    cells.store_reading(&reading);

    Ok(reading)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{net::TcpListener, time::Instant};

    /// Summary of what a fake device saw.
    struct DeviceLog {
        first_demand: Option<HapticDemand>,
        saw_vibration: bool,
    }

    /// A fake device which replies to each demand with an increasing position and the demanded
    /// hardness as the force. It stops after `max_replies` replies, or when the client hangs up.
    fn fake_device(max_replies: Option<usize>) -> (String, JoinHandle<DeviceLog>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let jh = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut log = DeviceLog {
                first_demand: None,
                saw_vibration: false,
            };
            let mut buf = [0u8; HAPTIC_FRAME_LEN];
            let mut i = 0;

            while max_replies.map(|m| i < m).unwrap_or(true) {
                if stream.read_exact(&mut buf).is_err() {
                    break;
                }
                let demand = HapticDemand::from_frame(&buf).unwrap();
                log.first_demand.get_or_insert(demand);
                log.saw_vibration |= demand.vibration == 1.0;

                let reading = HapticReading {
                    finger_pos: 1000.0 + i as f64,
                    finger_force: demand.hardness,
                };
                if stream.write_all(&reading.to_frame()).is_err() {
                    break;
                }
                i += 1;
            }

            log
        });

        (addr, jh)
    }

    fn wait_until<F: Fn() -> bool>(f: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_exchange_with_device() {
        let (addr, device) = fake_device(None);
        let mut client = HapticClient::connect(&addr, Duration::from_secs(1)).unwrap();

        assert!(wait_until(|| client.num_exchanges() >= 10));
        assert!(client.reading().finger_pos >= 1000.0);
        assert_eq!(client.reading().finger_force, HARDNESS_HARD);

        client.set_vibration(true);
        client.set_hardness(-20.0);
        assert_eq!(client.demand().hardness, HARDNESS_SOFT);
        assert!(wait_until(|| client.reading().finger_force == HARDNESS_SOFT));

        client.stop();
        assert!(!client.is_alive());

        let log = device.join().unwrap();
        assert_eq!(log.first_demand, Some(HapticDemand::default()));
        assert!(log.saw_vibration);
    }

    #[test]
    fn test_device_loss_ends_thread() {
        let (addr, device) = fake_device(Some(3));
        let client = HapticClient::connect(&addr, Duration::from_secs(1)).unwrap();

        device.join().unwrap();
        assert!(wait_until(|| !client.is_alive()));
        assert_eq!(client.num_exchanges(), 3);
    }

    #[test]
    fn test_short_reply_ends_thread() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let device = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; HAPTIC_FRAME_LEN];
            stream.read_exact(&mut buf).unwrap();
            // Half a frame then hang up
            stream.write_all(&[0u8; 8]).unwrap();
        });

        let client = HapticClient::connect(&addr, Duration::from_secs(1)).unwrap();
        device.join().unwrap();

        assert!(wait_until(|| !client.is_alive()));
        assert_eq!(client.num_exchanges(), 0);
    }

    #[test]
    fn test_offline_client() {
        let client = HapticClient::offline();
        assert!(!client.is_alive());
        assert_eq!(client.reading(), HapticReading::default());
        assert_eq!(client.demand(), HapticDemand::default());
    }
}
