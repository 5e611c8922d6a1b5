//! # Video Logger
//!
//! Records a trial's video as a motion JPEG stream: every frame is JPEG encoded at the recording
//! resolution and appended to the file. The stream carries no timing, the nominal frame rate is
//! kept in the trial record instead.
//!
//! Frames are handed to a writer thread so the control cycle never waits on image coding. JPEG
//! frames already at the recording size are written as received, anything else is transcoded.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageOutputFormat};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fs::File,
    io::{BufWriter, Cursor, Write},
    path::{Path, PathBuf},
    sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError},
    thread::{self, JoinHandle},
};

use comms_if::eqpt::cam::{CamFrame, ImageFormat};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Frames waiting for the writer thread before new frames are dropped.
const WRITER_QUEUE_LEN: usize = 8;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Recording settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    /// Nominal frame rate of the recording
    ///
    /// Units: frames/second
    pub fps: f64,

    /// Frame size, frames of any other size are resized
    ///
    /// Units: pixels
    pub width: u32,
    pub height: u32,

    /// JPEG quality, 1 to 100
    pub jpeg_quality: u8,
}

/// A motion JPEG file being written by a background thread.
pub struct VideoLog {
    path: PathBuf,

    sender: Option<SyncSender<CamFrame>>,

    writer_jh: Option<JoinHandle<Result<u64, VideoLogError>>>,

    num_queued: u64,

    num_dropped: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VideoLogError {
    #[error("Could not create the video file {0:?}: {1}")]
    CreateError(PathBuf, std::io::Error),

    #[error("Could not start the video writer thread: {0}")]
    ThreadStartError(std::io::Error),

    #[error("The video writer has stopped")]
    WriterStopped,

    #[error("The video writer panicked")]
    WriterPanicked,

    #[error("Could not decode the frame: {0}")]
    DecodeError(image::ImageError),

    #[error("Could not encode the frame: {0}")]
    EncodeError(image::ImageError),

    #[error("Could not write to the video file: {0}")]
    WriteError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            fps: 17.4,
            width: 1280,
            height: 720,
            jpeg_quality: 90,
        }
    }
}

impl VideoLog {
    /// Create the file and start its writer. Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P, params: VideoParams) -> Result<Self, VideoLogError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VideoLogError::CreateError(path.clone(), e))?;
        }

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| VideoLogError::CreateError(path.clone(), e))?;

        let (sender, receiver) = sync_channel(WRITER_QUEUE_LEN);
        let writer = BufWriter::new(file);
        let writer_jh = thread::Builder::new()
            .name("video_log".into())
            .spawn(move || writer_thread(writer, params, receiver))
            .map_err(VideoLogError::ThreadStartError)?;

        debug!(
            "Recording {}x{} video at {} fps to {:?}",
            params.width, params.height, params.fps, path
        );

        Ok(Self {
            path,
            sender: Some(sender),
            writer_jh: Some(writer_jh),
            num_queued: 0,
            num_dropped: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames accepted for writing.
    pub fn num_frames(&self) -> u64 {
        self.num_queued
    }

    /// Frames dropped because the writer was behind.
    pub fn num_dropped(&self) -> u64 {
        self.num_dropped
    }

    /// Queue a camera frame for writing. Never blocks, the frame is dropped if the writer is
    /// behind.
    pub fn write_frame(&mut self, frame: &CamFrame) -> Result<(), VideoLogError> {
        let sender = self.sender.as_ref().ok_or(VideoLogError::WriterStopped)?;

        match sender.try_send(frame.clone()) {
            Ok(()) => {
                self.num_queued += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.num_dropped += 1;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(VideoLogError::WriterStopped),
        }
    }

    /// Write the queued frames and close the file, returning its path.
    ///
    /// If the writer failed earlier its error is returned here.
    pub fn finish(mut self) -> Result<PathBuf, VideoLogError> {
        let written = self.stop_writer()?;

        if self.num_dropped > 0 {
            warn!(
                "Video {:?}: {} frames dropped while the writer was behind",
                self.path, self.num_dropped
            );
        }
        debug!("Video {:?} closed after {} frames", self.path, written);

        Ok(self.path.clone())
    }

    /// Stop the writer and delete the file.
    pub fn discard(mut self) {
        self.stop_writer().ok();

        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not remove {:?}: {}", self.path, e);
        }
    }

    fn stop_writer(&mut self) -> Result<u64, VideoLogError> {
        // The writer drains the queue and exits once the sender is gone
        self.sender.take();

        match self.writer_jh.take() {
            Some(jh) => jh.join().map_err(|_| VideoLogError::WriterPanicked)?,
            None => Err(VideoLogError::WriterStopped),
        }
    }
}

impl Drop for VideoLog {
    fn drop(&mut self) {
        if self.writer_jh.is_some() {
            self.stop_writer().ok();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn writer_thread(
    mut writer: BufWriter<File>,
    params: VideoParams,
    receiver: Receiver<CamFrame>,
) -> Result<u64, VideoLogError> {
    let mut num_written = 0;

    for frame in receiver.iter() {
        // A bad frame is skipped, only file errors end the recording
        let jpeg = match encode_frame(&frame, &params) {
            Ok(j) => j,
            Err(e) => {
                warn!("Frame not recorded: {}", e);
                continue;
            }
        };

        writer.write_all(&jpeg).map_err(VideoLogError::WriteError)?;
        num_written += 1;
    }

    writer.flush().map_err(VideoLogError::WriteError)?;

    Ok(num_written)
}

/// JPEG data for a frame at the recording size.
fn encode_frame<'a>(
    frame: &'a CamFrame,
    params: &VideoParams,
) -> Result<Cow<'a, [u8]>, VideoLogError> {
    if let ImageFormat::Jpeg(_) = frame.format {
        let dims = image::io::Reader::with_format(Cursor::new(&frame.data[..]), image::ImageFormat::Jpeg)
            .into_dimensions()
            .map_err(VideoLogError::DecodeError)?;

        if dims == (params.width, params.height) {
            return Ok(Cow::Borrowed(&frame.data));
        }
    }

    let image = frame.to_cam_image().map_err(VideoLogError::DecodeError)?;
    encode_image(&image.image, params).map(Cow::Owned)
}

/// Encode an image as JPEG, resizing it to the recording size if needed.
fn encode_image(image: &DynamicImage, params: &VideoParams) -> Result<Vec<u8>, VideoLogError> {
    let (w, h) = (params.width, params.height);
    let format = ImageOutputFormat::Jpeg(params.jpeg_quality);

    let mut buf = Vec::new();
    if image.dimensions() == (w, h) {
        image.write_to(&mut buf, format)
    } else {
        image
            .resize_exact(w, h, FilterType::Triangle)
            .write_to(&mut buf, format)
    }
    .map_err(VideoLogError::EncodeError)?;

    Ok(buf)
}
