//! Trial state machine

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

use comms_if::{eqpt::cam::CamFrame, tc::{Condition, StartTrial}};
use util::{maths::in_open_band, time::format_wall_clock};

use super::{FailReason, Params, TrialMgrError, TrialOutcome, TrialRecord};
use crate::{
    pose_filter::FilteredPose,
    tm_logger::{LogRecord, TmLogger},
    video_log::VideoLog,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Trial manager
pub struct TrialMgr {
    params: Params,

    /// Directory the trial files are written to
    log_dir: PathBuf,

    state: TrialState,

    /// Repeat number given to the next trial unless the start command names one
    next_repeat: u32,
}

/// A running trial and the files it is writing.
pub struct ActiveTrial {
    record: TrialRecord,

    log: TmLogger,

    /// Raw and annotated recordings
    videos: Option<(VideoLog, VideoLog)>,
}

/// State of the vehicle and haptic device when a trial starts.
#[derive(Debug, Clone, Copy)]
pub struct StartContext {
    /// Monotonic session time
    ///
    /// Units: seconds
    pub now_s: f64,

    pub wall: DateTime<Utc>,

    /// Units: degrees
    pub heading_deg: f64,

    /// Current finger position, becomes the trial's zero reference
    pub finger_pos: f64,

    /// Units: meters
    pub tag_size_m: f64,
}

/// Cues computed from the filtered pose for the haptic condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HapticCues {
    /// The vehicle is at the vibration depth band
    pub vibration: bool,

    /// The vehicle is close to the target
    pub hardness: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

pub enum TrialState {
    Idle,
    Running(ActiveTrial),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrialMgr {
    /// Create a new manager writing trial files into `log_dir`. The first trial is repeat 1.
    pub fn new<P: AsRef<Path>>(params: Params, log_dir: P) -> Self {
        Self {
            params,
            log_dir: log_dir.as_ref().to_path_buf(),
            state: TrialState::Idle,
            next_repeat: 1,
        }
    }

    /// Load the parameters from the given file in the parameters directory.
    pub fn from_params_file<P: AsRef<Path>>(
        param_file: &str,
        log_dir: P,
    ) -> Result<Self, TrialMgrError> {
        let params = util::params::load(param_file).map_err(TrialMgrError::ParamLoadError)?;
        Ok(Self::new(params, log_dir))
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TrialState::Running(_))
    }

    /// Record of the running trial.
    pub fn record(&self) -> Option<&TrialRecord> {
        match self.state {
            TrialState::Running(ref t) => Some(&t.record),
            TrialState::Idle => None,
        }
    }

    pub fn next_repeat(&self) -> u32 {
        self.next_repeat
    }

    /// Time since the running trial started.
    pub fn elapsed_s(&self, now_s: f64) -> Option<f64> {
        self.record().map(|r| now_s - r.start_time_s)
    }

    /// Start a new trial, opening its data log and video recordings.
    pub fn start(
        &mut self,
        cmd: &StartTrial,
        ctx: &StartContext,
    ) -> Result<&TrialRecord, TrialMgrError> {
        if self.is_running() {
            return Err(TrialMgrError::AlreadyRunning);
        }

        let condition = cmd.condition.ok_or(TrialMgrError::NoCondition)?;
        let participant_id = cmd.participant_id.trim();
        if participant_id.is_empty() {
            return Err(TrialMgrError::NoParticipant);
        }
        if participant_id.contains(|c: char| c == '/' || c == '\\') {
            return Err(TrialMgrError::InvalidParticipant(participant_id.into()));
        }

        let repeat = cmd.repeat.unwrap_or(self.next_repeat);
        let file_stem = TrialRecord::make_file_stem(participant_id, condition, repeat, &ctx.wall);

        let mut record = TrialRecord {
            participant_id: participant_id.into(),
            condition,
            repeat,
            tag_size_m: ctx.tag_size_m,
            start_wall: ctx.wall,
            start_time_s: ctx.now_s,
            start_heading_deg: ctx.heading_deg,
            finger_zero: ctx.finger_pos,
            file_stem,
            video_fps: None,
            outcome: None,
        };

        let mut log = TmLogger::create(self.log_dir.join(record.data_file_name()))
            .map_err(TrialMgrError::LogError)?;
        let header = log
            .write_timed(
                ctx.now_s,
                &format!("Trial conducted on: {}", format_wall_clock(&ctx.wall)),
            )
            .and_then(|_| {
                log.write_timed(ctx.now_s, &format!("Initial heading: {}", ctx.heading_deg))
            });
        if let Err(e) = header {
            log.discard();
            return Err(TrialMgrError::LogError(e));
        }

        // A trial which cannot record leaves no files behind
        let videos = if self.params.record_video {
            match self.create_videos(&record) {
                Ok(v) => {
                    record.video_fps = Some(self.params.video.fps);
                    Some(v)
                }
                Err(e) => {
                    log.discard();
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Trial started: participant {}, {} condition, repeat {}, finger zero {}",
            record.participant_id, record.condition, record.repeat, record.finger_zero
        );

        self.next_repeat = repeat;
        self.state = TrialState::Running(ActiveTrial {
            record,
            log,
            videos,
        });

        self.record().ok_or(TrialMgrError::NotRunning)
    }

    /// Conclude the running trial as a pass.
    pub fn pass(&mut self, now_s: f64, wall: DateTime<Utc>) -> Result<TrialRecord, TrialMgrError> {
        self.conclude(TrialOutcome::Pass { end_time_s: now_s }, now_s, wall)
    }

    /// Conclude the running trial as a failure.
    pub fn fail(
        &mut self,
        reason: FailReason,
        now_s: f64,
        wall: DateTime<Utc>,
    ) -> Result<TrialRecord, TrialMgrError> {
        self.conclude(
            TrialOutcome::Fail {
                end_time_s: now_s,
                reason,
            },
            now_s,
            wall,
        )
    }

    /// Fail the running trial if it has lasted longer than the timeout.
    ///
    /// Returns the concluded record if the trial timed out.
    pub fn check_timeout(
        &mut self,
        now_s: f64,
        wall: DateTime<Utc>,
    ) -> Result<Option<TrialRecord>, TrialMgrError> {
        match self.elapsed_s(now_s) {
            Some(e) if e > self.params.timeout_s => {
                warn!("Trial timed out after {:.2} s", e);
                self.fail(FailReason::Timeout, now_s, wall).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Append a cycle record to the running trial's log, the record's time is set to the trial
    /// time. Does nothing if no trial is running.
    pub fn log_tick(&mut self, now_s: f64, record: &mut LogRecord) -> Result<(), TrialMgrError> {
        if let TrialState::Running(ref mut t) = self.state {
            record.time = now_s - t.record.start_time_s;
            t.log.write_record(record).map_err(TrialMgrError::LogError)?;
        }

        Ok(())
    }

    /// Append an event line to the running trial's log. Does nothing if no trial is running.
    pub fn log_event(&mut self, now_s: f64, text: &str) -> Result<(), TrialMgrError> {
        if let TrialState::Running(ref mut t) = self.state {
            t.log.write_timed(now_s, text).map_err(TrialMgrError::LogError)?;
        }

        Ok(())
    }

    /// Append a new vision frame to the running trial's videos. Frames without an annotated
    /// version are recorded unchanged in both videos.
    pub fn write_frames(
        &mut self,
        raw: &CamFrame,
        annotated: Option<&CamFrame>,
    ) -> Result<(), TrialMgrError> {
        if let TrialState::Running(ActiveTrial {
            videos: Some((ref mut raw_log, ref mut markup_log)),
            ..
        }) = self.state
        {
            raw_log.write_frame(raw).map_err(TrialMgrError::VideoError)?;
            markup_log
                .write_frame(annotated.unwrap_or(raw))
                .map_err(TrialMgrError::VideoError)?;
        }

        Ok(())
    }

    /// Haptic cues for the current pose. Cues are only given while a `Haptics` trial is running.
    pub fn haptic_cues(&self, pose: &FilteredPose) -> HapticCues {
        match self.record() {
            Some(r) if r.condition == Condition::Haptics => HapticCues {
                vibration: in_open_band(pose.z_m, self.params.cues.vibration_band_m),
                hardness: pose.target_dist_m < self.params.cues.hardness_dist_m,
            },
            _ => HapticCues::default(),
        }
    }

    fn create_videos(&self, record: &TrialRecord) -> Result<(VideoLog, VideoLog), TrialMgrError> {
        let raw = VideoLog::create(
            self.log_dir.join(record.raw_video_file_name()),
            self.params.video,
        )
        .map_err(TrialMgrError::VideoError)?;

        match VideoLog::create(
            self.log_dir.join(record.markup_video_file_name()),
            self.params.video,
        ) {
            Ok(markup) => Ok((raw, markup)),
            Err(e) => {
                raw.discard();
                Err(TrialMgrError::VideoError(e))
            }
        }
    }

    fn conclude(
        &mut self,
        outcome: TrialOutcome,
        now_s: f64,
        wall: DateTime<Utc>,
    ) -> Result<TrialRecord, TrialMgrError> {
        let active = match std::mem::replace(&mut self.state, TrialState::Idle) {
            TrialState::Running(t) => t,
            TrialState::Idle => return Err(TrialMgrError::NotRunning),
        };

        let ActiveTrial {
            mut record,
            mut log,
            videos,
        } = active;

        record.outcome = Some(outcome);
        self.next_repeat = record.repeat + 1;

        // The trial is over whatever happens to its files, so close everything before reporting
        // the first error.
        let mut result = log
            .write_line(&outcome.log_line())
            .and_then(|_| {
                log.write_timed(
                    now_s,
                    &format!("Trial concluded at: {}", format_wall_clock(&wall)),
                )
            })
            .map_err(TrialMgrError::LogError);
        if let Err(e) = log.close() {
            result = result.and(Err(TrialMgrError::LogError(e)));
        }

        if let Some((raw, markup)) = videos {
            for video in vec![raw, markup] {
                if let Err(e) = video.finish() {
                    result = result.and(Err(TrialMgrError::VideoError(e)));
                }
            }
        }

        match outcome {
            TrialOutcome::Pass { .. } => info!("Trial passed"),
            TrialOutcome::Fail { reason, .. } => warn!("Trial failed: {}", reason),
        }

        result.map(|_| record)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::cam::{CamImage, ImageFormat};
    use image::{DynamicImage, ImageBuffer, Rgb};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("teleop_trial_{}_{}", name, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    fn small_video_params() -> Params {
        let mut params = Params::default();
        params.video.width = 32;
        params.video.height = 18;
        params
    }

    fn start_cmd(condition: Option<Condition>) -> StartTrial {
        StartTrial {
            participant_id: "P4".into(),
            condition,
            repeat: None,
        }
    }

    fn ctx(now_s: f64) -> StartContext {
        StartContext {
            now_s,
            wall: Utc::now(),
            heading_deg: 123.0,
            finger_pos: 980.0,
            tag_size_m: 1.12,
        }
    }

    fn read_lines(path: PathBuf) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_start_then_pass() {
        let dir = test_dir("pass");
        let mut mgr = TrialMgr::new(small_video_params(), &dir);

        let record = mgr.start(&start_cmd(Some(Condition::NoCurrent)), &ctx(10.0)).unwrap();
        assert_eq!(record.repeat, 1);
        assert_eq!(record.finger_zero, 980.0);
        assert_eq!(record.start_heading_deg, 123.0);
        assert_eq!(record.video_fps, Some(17.4));
        assert!(mgr.is_running());

        let mut tick = LogRecord::default();
        mgr.log_tick(12.5, &mut tick).unwrap();
        assert_eq!(tick.time, 2.5);

        let record = mgr.pass(13.0, Utc::now()).unwrap();
        assert!(record.passed());
        assert!(!mgr.is_running());
        assert_eq!(mgr.next_repeat(), 2);

        let lines = read_lines(dir.join(record.data_file_name()));
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("10: Trial conducted on: "));
        assert_eq!(lines[1], "10: Initial heading: 123");
        assert!(lines[2].starts_with('{'));
        assert_eq!(lines.iter().filter(|l| *l == "PASS").count(), 1);
        assert!(lines[4].starts_with("13: Trial concluded at: "));

        assert!(dir.join(record.raw_video_file_name()).exists());
        assert!(dir.join(record.markup_video_file_name()).exists());

        // Logging stops with the trial
        mgr.log_tick(14.0, &mut tick).unwrap();
        mgr.log_event(14.0, "Armed!").unwrap();
        assert_eq!(read_lines(dir.join(record.data_file_name())).len(), 5);
    }

    #[test]
    fn test_timeout_fails_trial() {
        let dir = test_dir("timeout");
        let mut mgr = TrialMgr::new(small_video_params(), &dir);

        mgr.start(&start_cmd(Some(Condition::Haptics)), &ctx(0.0)).unwrap();

        assert!(mgr.check_timeout(119.9, Utc::now()).unwrap().is_none());
        assert!(mgr.is_running());

        let record = mgr.check_timeout(120.1, Utc::now()).unwrap().unwrap();
        assert_eq!(
            record.outcome,
            Some(TrialOutcome::Fail {
                end_time_s: 120.1,
                reason: FailReason::Timeout
            })
        );
        assert!(!mgr.is_running());

        let lines = read_lines(dir.join(record.data_file_name()));
        assert!(lines.contains(&"FAIL - timeout".to_string()));

        // A manual fail of the next trial is unspecified again
        mgr.start(&start_cmd(Some(Condition::Haptics)), &ctx(200.0)).unwrap();
        let record = mgr.fail(FailReason::Unspecified, 201.0, Utc::now()).unwrap();
        assert_eq!(record.repeat, 2);
        let lines = read_lines(dir.join(record.data_file_name()));
        assert!(lines.contains(&"FAIL - Unspecified".to_string()));
    }

    #[test]
    fn test_trial_time_ignores_wall_clock_steps() {
        let dir = test_dir("clock_step");
        let mut params = Params::default();
        params.record_video = false;
        let mut mgr = TrialMgr::new(params, &dir);

        let start = ctx(50.0);
        mgr.start(&start_cmd(Some(Condition::Haptics)), &start).unwrap();

        // Wall clock jumps forward an hour, then back two, while 30 s pass on the session clock
        let jumped = start.wall + chrono::Duration::hours(1);
        assert!(mgr.check_timeout(80.0, jumped).unwrap().is_none());
        let stepped_back = start.wall - chrono::Duration::hours(1);
        assert!(mgr.check_timeout(80.0, stepped_back).unwrap().is_none());

        let mut tick = LogRecord::default();
        mgr.log_tick(80.0, &mut tick).unwrap();
        assert_eq!(tick.time, 30.0);
        assert_eq!(mgr.elapsed_s(80.0), Some(30.0));

        let record = mgr.check_timeout(170.5, stepped_back).unwrap().unwrap();
        assert_eq!(
            record.outcome,
            Some(TrialOutcome::Fail {
                end_time_s: 170.5,
                reason: FailReason::Timeout
            })
        );
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let dir = test_dir("invalid");
        let mut params = Params::default();
        params.record_video = false;
        let mut mgr = TrialMgr::new(params, &dir);

        assert!(matches!(
            mgr.pass(0.0, Utc::now()),
            Err(TrialMgrError::NotRunning)
        ));
        assert!(matches!(
            mgr.fail(FailReason::Unspecified, 0.0, Utc::now()),
            Err(TrialMgrError::NotRunning)
        ));
        assert!(matches!(
            mgr.start(&start_cmd(None), &ctx(0.0)),
            Err(TrialMgrError::NoCondition)
        ));

        let mut no_pid = start_cmd(Some(Condition::Training));
        no_pid.participant_id = "  ".into();
        assert!(matches!(
            mgr.start(&no_pid, &ctx(0.0)),
            Err(TrialMgrError::NoParticipant)
        ));
        assert!(!mgr.is_running());
        assert!(!dir.exists());

        let first = mgr
            .start(&start_cmd(Some(Condition::Training)), &ctx(1.0))
            .unwrap()
            .clone();
        assert!(matches!(
            mgr.start(&start_cmd(Some(Condition::Haptics)), &ctx(2.0)),
            Err(TrialMgrError::AlreadyRunning)
        ));
        assert_eq!(mgr.record(), Some(&first));
        assert_eq!(first.video_fps, None);
    }

    #[test]
    fn test_failed_start_leaves_no_files() {
        let dir = test_dir("failed_start");
        let mut mgr = TrialMgr::new(small_video_params(), &dir);

        let start = ctx(0.0);
        let stem = TrialRecord::make_file_stem("P4", Condition::Haptics, 1, &start.wall);

        // Something already holds the markup video's name
        std::fs::create_dir_all(&dir).unwrap();
        let markup = dir.join(format!("{}_markup.mjpeg", stem));
        std::fs::write(&markup, b"other").unwrap();

        assert!(matches!(
            mgr.start(&start_cmd(Some(Condition::Haptics)), &start),
            Err(TrialMgrError::VideoError(_))
        ));
        assert!(!mgr.is_running());
        assert!(!dir.join(format!("{}.txt", stem)).exists());
        assert!(!dir.join(format!("{}_raw.mjpeg", stem)).exists());
        assert_eq!(std::fs::read(&markup).unwrap(), b"other");
    }

    #[test]
    fn test_same_repeat_in_same_second_rejected() {
        let dir = test_dir("same_repeat");
        let mut params = Params::default();
        params.record_video = false;
        let mut mgr = TrialMgr::new(params, &dir);

        let start = ctx(0.0);
        let mut cmd = start_cmd(Some(Condition::NoHaptics));
        cmd.repeat = Some(3);

        mgr.start(&cmd, &start).unwrap();
        let first = mgr.pass(1.0, Utc::now()).unwrap();

        assert!(matches!(
            mgr.start(&cmd, &start),
            Err(TrialMgrError::LogError(_))
        ));
        assert!(!mgr.is_running());

        let lines = read_lines(dir.join(first.data_file_name()));
        assert_eq!(lines.iter().filter(|l| *l == "PASS").count(), 1);
    }

    #[test]
    fn test_repeat_from_command() {
        let dir = test_dir("repeat");
        let mut params = Params::default();
        params.record_video = false;
        let mut mgr = TrialMgr::new(params, &dir);

        let mut cmd = start_cmd(Some(Condition::NoHaptics));
        cmd.repeat = Some(5);
        mgr.start(&cmd, &ctx(0.0)).unwrap();
        mgr.pass(1.0, Utc::now()).unwrap();

        assert_eq!(mgr.next_repeat(), 6);
    }

    #[test]
    fn test_haptic_cues_only_in_haptics_trials() {
        let dir = test_dir("cues");
        let mut params = Params::default();
        params.record_video = false;
        let mut mgr = TrialMgr::new(params, &dir);

        let pose = FilteredPose {
            z_m: 3.9,
            target_dist_m: 0.2,
            ..Default::default()
        };
        assert_eq!(mgr.haptic_cues(&pose), HapticCues::default());

        mgr.start(&start_cmd(Some(Condition::NoHaptics)), &ctx(0.0)).unwrap();
        assert_eq!(mgr.haptic_cues(&pose), HapticCues::default());
        mgr.pass(1.0, Utc::now()).unwrap();

        mgr.start(&start_cmd(Some(Condition::Haptics)), &ctx(2.0)).unwrap();
        assert_eq!(
            mgr.haptic_cues(&pose),
            HapticCues {
                vibration: true,
                hardness: true
            }
        );

        let far = FilteredPose {
            z_m: 4.1,
            target_dist_m: 0.5,
            ..Default::default()
        };
        assert_eq!(mgr.haptic_cues(&far), HapticCues::default());
    }

    #[test]
    fn test_frames_recorded_while_running() {
        let dir = test_dir("frames");
        let mut mgr = TrialMgr::new(small_video_params(), &dir);

        let frame = CamImage {
            timestamp: Utc::now(),
            image: DynamicImage::ImageRgb8(ImageBuffer::from_pixel(64, 36, Rgb([9u8, 9, 9]))),
        }
        .to_cam_frame(ImageFormat::Png)
        .unwrap();

        // Ignored while idle
        mgr.write_frames(&frame, None).unwrap();

        mgr.start(&start_cmd(Some(Condition::Training)), &ctx(0.0)).unwrap();
        mgr.write_frames(&frame, None).unwrap();
        mgr.write_frames(&frame, Some(&frame)).unwrap();
        let record = mgr.pass(1.0, Utc::now()).unwrap();

        let raw = std::fs::read(dir.join(record.raw_video_file_name())).unwrap();
        let markup = std::fs::read(dir.join(record.markup_video_file_name())).unwrap();
        assert!(!raw.is_empty());
        assert_eq!(raw.len(), markup.len());
    }
}
