//! # Telecommand processor module
//!
//! The telecommand processor handles the TCs coming from the operator surface or a script, and
//! decides the response sent back for each one.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};

// Internal
use comms_if::{
    eqpt::{
        cam::{CamFrame, ImageFormat},
        haptic::{HARDNESS_HARD, HARDNESS_SOFT},
    },
    tc::{ArmCmd, HapticCmd, StillKind, Tc, TcResponse, TrialCmd},
};
use teleop_lib::{
    channel_sink::ChannelSinkError,
    cmd_mapper::JogAction,
    data_store::DataStore,
    trial_mgr::{ArmingError, FailReason, StartContext, TrialMgrError, TrialRecord},
};
use util::session::Session;

use crate::Eqpt;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a telecommand.
///
/// Returns the response to send back to the operator. Commands which are understood but not
/// allowed in the current state get `CannotExecute`.
pub(crate) fn exec(ds: &mut DataStore, eqpt: &mut Eqpt, session: &Session, tc: &Tc) -> TcResponse {
    debug!("Executing TC: {:?}", tc);

    match tc {
        Tc::Trial(cmd) => exec_trial(ds, eqpt, session, cmd),

        Tc::Arm(cmd) => exec_arm(ds, eqpt, *cmd),

        Tc::Jog(jog) => {
            if !ds.arming.allows_motion() {
                warn!("Jog {:?} ignored, the vehicle is not armed", jog);
                return TcResponse::CannotExecute;
            }

            let result = match ds.cmd_mapper.jog_action(*jog) {
                JogAction::Set(channels) => channels
                    .into_iter()
                    .try_for_each(|(ch, pwm)| eqpt.sink.set_motion(ch, pwm)),
                JogAction::AllStop => eqpt.sink.clear_motion(),
            };

            match result {
                Ok(()) => TcResponse::Ok,
                Err(ChannelSinkError::LinkError(e)) => {
                    error!("Could not send the jog to the vehicle: {}", e);
                    eqpt.vehicle_link_lost = true;
                    TcResponse::CannotExecute
                }
                Err(e) => {
                    warn!("Could not jog: {}", e);
                    TcResponse::CannotExecute
                }
            }
        }

        Tc::SetMode(mode) => match eqpt.vehicle.set_mode(mode.autopilot_name()) {
            Ok(()) => {
                info!("Vehicle mode set to {}", mode.autopilot_name());
                TcResponse::Ok
            }
            Err(e) => {
                warn!("Could not change the vehicle mode: {}", e);
                TcResponse::CannotExecute
            }
        },

        Tc::TouchControl => match ds.toggle_touch_control() {
            true => TcResponse::Ok,
            false => TcResponse::CannotExecute,
        },

        Tc::Haptic(cmd) => exec_haptic(ds, eqpt, *cmd),

        Tc::Still(kind) => {
            let frame = match ds.vision_frame {
                Some(ref vf) => match kind {
                    StillKind::Raw => Some(&vf.raw),
                    StillKind::Circle => vf.circled.as_ref(),
                    StillKind::Annotated => vf.annotated.as_ref(),
                },
                None => None,
            };

            let frame = match frame {
                Some(f) => f,
                None => {
                    warn!("No {:?} frame available for a still", kind);
                    return TcResponse::CannotExecute;
                }
            };

            let path = still_path(&session.path("stills"), *kind, frame);
            match save_still(frame, &path) {
                Ok(()) => {
                    info!("Still saved to {:?}", path);
                    TcResponse::Ok
                }
                Err(e) => {
                    warn!("Could not save the still to {:?}: {}", path, e);
                    TcResponse::CannotExecute
                }
            }
        }

        Tc::LightSignal(signal) => {
            info!("Signalling {:?} to the diver", signal);
            eqpt.lights.signal(*signal);
            TcResponse::Ok
        }

        Tc::SetTagSize { tag_size } => match parse_tag_size(tag_size) {
            Some(s) => {
                info!("Tag size set to {} m", s);
                ds.tag_size_m = s;
                TcResponse::Ok
            }
            None => {
                warn!("Invalid tag size \"{}\"", tag_size);
                TcResponse::CannotExecute
            }
        },
    }
}

/// Save a concluded trial's record into the session directory.
pub(crate) fn save_record(session: &Session, record: TrialRecord) {
    info!(
        "Trial {} concluded: {}",
        record.file_stem,
        record
            .outcome
            .as_ref()
            .map(|o| o.log_line())
            .unwrap_or_default()
    );
    session.save(format!("trials/{}.json", record.file_stem), record);
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn exec_trial(ds: &mut DataStore, eqpt: &mut Eqpt, session: &Session, cmd: &TrialCmd) -> TcResponse {
    let now_s = ds.session_time_s;

    let result = match cmd {
        TrialCmd::Start(start) => {
            let finger_pos = match ds.haptic_alive {
                true => ds.haptic_reading.finger_pos,
                false => ds.finger_zero,
            };
            let ctx = StartContext {
                now_s,
                wall: Utc::now(),
                heading_deg: ds.filtered_pose.heading_deg,
                finger_pos,
                tag_size_m: ds.tag_size_m,
            };

            match eqpt.trial_mgr.start(start, &ctx) {
                Ok(record) => {
                    info!("Trial {} started", record.file_stem);
                    ds.finger_zero = record.finger_zero;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        TrialCmd::Pass => eqpt
            .trial_mgr
            .pass(now_s, Utc::now())
            .map(|r| save_record(session, r)),
        TrialCmd::Fail => eqpt
            .trial_mgr
            .fail(FailReason::Unspecified, now_s, Utc::now())
            .map(|r| save_record(session, r)),
    };

    match result {
        Ok(()) => TcResponse::Ok,
        Err(e @ TrialMgrError::LogError(_)) | Err(e @ TrialMgrError::VideoError(_)) => {
            error!("Trial file error: {}", e);
            TcResponse::CannotExecute
        }
        Err(e) => {
            warn!("Trial command rejected: {}", e);
            TcResponse::CannotExecute
        }
    }
}

fn exec_arm(ds: &mut DataStore, eqpt: &mut Eqpt, cmd: ArmCmd) -> TcResponse {
    let result = match cmd {
        ArmCmd::Request => ds.arming.request(),
        ArmCmd::Confirm => ds
            .arming
            .confirm(&mut eqpt.vehicle, &mut eqpt.sink, &mut eqpt.lights)
            .map(|_| log_arming_event(ds, eqpt, "Armed!")),
        ArmCmd::Disarm => {
            let was_armed = ds.arming.allows_motion();
            ds.arming
                .disarm(&mut eqpt.vehicle, &mut eqpt.sink, &mut eqpt.lights)
                .map(|_| {
                    ds.stop_touch_control();
                    if was_armed {
                        log_arming_event(ds, eqpt, "Disarmed!");
                    }
                })
        }
    };

    match result {
        Ok(()) => TcResponse::Ok,
        Err(e) if e.is_link_failure() => {
            error!("Vehicle link failed during {:?}: {}", cmd, e);
            eqpt.vehicle_link_lost = true;
            TcResponse::CannotExecute
        }
        Err(e @ ArmingError::InvalidTransition(..)) => {
            warn!("{}", e);
            TcResponse::CannotExecute
        }
        Err(e) => {
            warn!("Could not complete {:?}: {}", cmd, e);
            TcResponse::CannotExecute
        }
    }
}

fn log_arming_event(ds: &DataStore, eqpt: &mut Eqpt, text: &str) {
    if let Err(e) = eqpt.trial_mgr.log_event(ds.session_time_s, &format!("{}\n", text)) {
        warn!("Could not write to the trial log: {}", e);
    }
}

fn exec_haptic(ds: &mut DataStore, eqpt: &mut Eqpt, cmd: HapticCmd) -> TcResponse {
    match cmd {
        HapticCmd::StartVibration => eqpt.haptic.set_vibration(true),
        HapticCmd::StopVibration => eqpt.haptic.set_vibration(false),
        HapticCmd::GoHard => eqpt.haptic.set_hardness(HARDNESS_HARD),
        HapticCmd::GoSoft => eqpt.haptic.set_hardness(HARDNESS_SOFT),
        HapticCmd::Zero => {
            if !ds.haptic_alive {
                warn!("Cannot zero the finger position, the haptic device is not connected");
                return TcResponse::CannotExecute;
            }
            ds.finger_zero = ds.haptic_reading.finger_pos;
            info!("Finger zero set to {}", ds.finger_zero);
        }
        HapticCmd::Print => info!(
            "Finger position: {}, finger force: {}",
            ds.haptic_reading.finger_pos, ds.haptic_reading.finger_force
        ),
    }

    TcResponse::Ok
}

/// Parse the tag size typed by the operator, `None` if it isn't a positive size.
fn parse_tag_size(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || text == "0." {
        return None;
    }

    match text.parse::<f64>() {
        Ok(s) if s > 0.0 && s.is_finite() => Some(s),
        _ => None,
    }
}

fn still_path(stills_dir: &Path, kind: StillKind, frame: &CamFrame) -> PathBuf {
    let tag = match kind {
        StillKind::Raw => "raw",
        StillKind::Circle => "circle",
        StillKind::Annotated => "cv",
    };

    stills_dir.join(format!(
        "ROVCam_{}_{}.jpg",
        tag,
        frame.timestamp.timestamp_millis()
    ))
}

/// Write a frame as a JPEG file. JPEG frames are written as received.
fn save_still(frame: &CamFrame, path: &Path) -> image::ImageResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    match frame.format {
        ImageFormat::Jpeg(_) => std::fs::write(path, &frame.data)?,
        ImageFormat::Png => frame
            .to_cam_image()?
            .image
            .save_with_format(path, image::ImageFormat::Jpeg)?,
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tag_size_validation() {
        assert_eq!(parse_tag_size("1.12"), Some(1.12));
        assert_eq!(parse_tag_size(" 0.5 "), Some(0.5));
        assert_eq!(parse_tag_size(""), None);
        assert_eq!(parse_tag_size("0."), None);
        assert_eq!(parse_tag_size("0"), None);
        assert_eq!(parse_tag_size("-1"), None);
        assert_eq!(parse_tag_size("big"), None);
    }

    #[test]
    fn test_still_names() {
        let frame = CamFrame {
            timestamp: Utc.timestamp_millis(1_678_197_771_250),
            format: ImageFormat::Jpeg(90),
            data: Vec::new(),
        };

        let path = still_path(Path::new("/tmp/session/stills"), StillKind::Annotated, &frame);
        assert_eq!(
            path,
            PathBuf::from("/tmp/session/stills/ROVCam_cv_1678197771250.jpg")
        );
    }
}
