//! Session management
//!
//! A session is one run of an executable. It owns a timestamped directory under the sessions
//! directory which holds the log file, trial records, and stills, and it fixes the epoch all
//! log and trial times are measured from. Only one session can exist per process.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use erased_serde::Serialize;
use log::{debug, warn};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::mpsc::{channel, Receiver, Sender},
    thread::{self, JoinHandle},
    time::Instant,
};
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<Epoch> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// chrono format of the timestamps in session directory and trial file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Start of the session. Elapsed time is measured on the monotonic clock, the wall clock time is
/// only used for names and log headers.
struct Epoch {
    wall: DateTime<Utc>,
    mono: Instant,
}

/// Data waiting to be written, with its session-relative path
type SaveItem = (PathBuf, Box<dyn Serialize + Send>);

/// The current session.
pub struct Session {
    /// Directory of this session
    pub session_root: PathBuf,

    /// The session's log file
    pub log_file_path: PathBuf,

    save_sender: Option<Sender<SaveItem>>,

    save_jh: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (ROV_TELEOP_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error("A session has already been started in this process ({0})")]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot start the save thread: {0}")]
    CannotStartSaver(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start the session in `$ROV_TELEOP_ROOT/{sessions_dir}/{exec_name}_{timestamp}`.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = crate::host::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        Self::new_in(exec_name, root.join(sessions_dir))
    }

    /// Start the session in `{sessions_dir}/{exec_name}_{timestamp}`.
    pub fn new_in<P: AsRef<Path>>(exec_name: &str, sessions_dir: P) -> Result<Self, SessionError> {
        SESSION_EPOCH
            .try_init_once(|| Epoch {
                wall: Utc::now(),
                mono: Instant::now(),
            })
            .map_err(SessionError::CannotInitEpoch)?;
        let epoch = get_epoch();

        let session_root = sessions_dir
            .as_ref()
            .join(format!("{}_{}", exec_name, epoch.format(TIMESTAMP_FORMAT)));
        fs::create_dir_all(&session_root).map_err(SessionError::CannotCreateDir)?;

        let log_file_path = session_root.join(format!("{}.log", exec_name));

        let (tx, rx) = channel();
        let root = session_root.clone();
        let save_jh = thread::Builder::new()
            .name("session_save".into())
            .spawn(move || save_thread(root, rx))
            .map_err(SessionError::CannotStartSaver)?;

        Ok(Session {
            session_root,
            log_file_path,
            save_sender: Some(tx),
            save_jh: Some(save_jh),
        })
    }

    /// Path of a file or directory inside the session.
    pub fn path<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.session_root.join(rel)
    }

    /// Write `data` as JSON to a session-relative path, on the save thread.
    ///
    /// Only `.json` paths are accepted. Missing directories are created.
    pub fn save<P: AsRef<Path>, T: Serialize + Send + 'static>(&self, path: P, data: T) {
        let sent = match self.save_sender {
            Some(ref tx) => tx.send((path.as_ref().to_path_buf(), Box::new(data))).is_ok(),
            None => false,
        };

        if !sent {
            warn!("Save thread is not running, {:?} was not saved", path.as_ref());
        }
    }

    /// End the session, waiting for all pending saves to be written.
    pub fn exit(mut self) {
        self.stop_saver();
    }

    fn stop_saver(&mut self) {
        // Closing the channel ends the save thread once the queue is empty
        self.save_sender.take();

        if let Some(jh) = self.save_jh.take() {
            jh.join().ok();
            debug!("Session save thread stopped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_saver();
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Monotonic seconds elapsed since the session started.
///
/// This is `NAN` before the session exists, so early log lines can still be printed.
pub fn get_elapsed_seconds() -> f64 {
    SESSION_EPOCH
        .get()
        .map(|e| time::seconds_between(e.mono, Instant::now()))
        .unwrap_or(std::f64::NAN)
}

/// Return the wall clock time the session started at.
///
/// # Panics
/// - If no session has been started.
pub fn get_epoch() -> &'static DateTime<Utc> {
    match SESSION_EPOCH.get() {
        Some(e) => &e.wall,
        None => panic!("Cannot get the session epoch!"),
    }
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn save_thread(session_root: PathBuf, receiver: Receiver<SaveItem>) {
    for (path, data) in receiver.iter() {
        let full_path = session_root.join(&path);

        if let Err(e) = write_json(&full_path, &data) {
            warn!("Could not save {:?}: {}", full_path, e);
        }
    }
}

fn write_json(full_path: &Path, data: &dyn Serialize) -> Result<(), String> {
    match full_path.extension().and_then(|s| s.to_str()) {
        Some("json") => (),
        ext => return Err(format!("unsupported extension {:?}", ext)),
    }

    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let file = fs::File::create(full_path).map_err(|e| e.to_string())?;
    serde_json::to_writer_pretty(&file, data).map_err(|e| e.to_string())
}
