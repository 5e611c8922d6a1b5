//! Closed loop tests running the control core components together, without a session or network.

use chrono::Utc;
use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use comms_if::{
    eqpt::{
        cam::PoseSample,
        haptic::{HapticReading, HAPTIC_FRAME_LEN},
        vehicle::PWM_NEUTRAL_US,
    },
    tc::{Condition, StartTrial},
};
use teleop_lib::{
    channel_sink::{ChannelSink, MotionChannel},
    data_store::{DataStore, Link, TouchControl},
    haptic_client::HapticClient,
    light_signal::LightSignaller,
    pose_filter::{self, PoseFilter},
    trial_mgr::{self, FailReason, StartContext, TrialMgr, TrialOutcome},
    vehicle_client::{self, sim::SimVehicle, VehicleClient},
};
use util::module::State;

fn start_trial(trial_mgr: &mut TrialMgr, now_s: f64) {
    trial_mgr
        .start(
            &StartTrial {
                participant_id: "9".into(),
                condition: Some(Condition::Haptics),
                repeat: None,
            },
            &StartContext {
                now_s,
                wall: Utc::now(),
                heading_deg: 0.0,
                finger_pos: 1000.0,
                tag_size_m: 1.12,
            },
        )
        .unwrap();
}

/// Arm the vehicle and turn touch control on.
fn arm_with_touch(sim: &Arc<SimVehicle>, vehicle: &mut VehicleClient, ds: &mut DataStore) {
    let mut sink = ChannelSink::new(sim.clone());
    let mut lights = LightSignaller::new(sim.clone());

    ds.arming.request().unwrap();
    ds.arming.confirm(vehicle, &mut sink, &mut lights).unwrap();
    assert!(ds.toggle_touch_control());
}

fn trial_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("teleop_closed_loop_{}_{}", name, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

#[test]
fn test_pose_stream_drives_hardness_cue() {
    let mut filter = PoseFilter::with_params(pose_filter::Params {
        z_offset_m: 2.0,
        ..Default::default()
    })
    .unwrap();

    let dir = trial_dir("hardness");
    let mut trial_mgr = TrialMgr::new(
        trial_mgr::Params {
            record_video: false,
            ..Default::default()
        },
        &dir,
    );
    trial_mgr
        .start(
            &StartTrial {
                participant_id: "7".into(),
                condition: Some(Condition::Haptics),
                repeat: None,
            },
            &StartContext {
                now_s: 0.0,
                wall: Utc::now(),
                heading_deg: 90.0,
                finger_pos: 1000.0,
                tag_size_m: 1.12,
            },
        )
        .unwrap();

    let input = pose_filter::InputData {
        pose: Some(PoseSample {
            translation_m: [0.0, 0.0, 2.0],
            rotation_rad: [0.0; 3],
        }),
        ..Default::default()
    };

    let mut first_hard_tick = None;
    let mut last_dist = f64::MAX;

    for tick in 0..300 {
        let (pose, report) = filter.proc(&input).unwrap();
        assert!(report.marker_detected);

        // The distance only ever shrinks towards the target
        assert!(pose.target_dist_m <= last_dist);
        last_dist = pose.target_dist_m;

        let cues = trial_mgr.haptic_cues(&pose);
        assert!(!cues.vibration);

        match (cues.hardness, first_hard_tick) {
            (true, None) => first_hard_tick = Some(tick),
            (false, Some(_)) => panic!("hardness cue dropped out at tick {}", tick),
            _ => (),
        }
    }

    assert!(last_dist.abs() < 1e-6, "target distance {}", last_dist);

    // Distance is 2 * (14/15)^n after n updates, below 0.5 m from the 21st update
    assert_eq!(first_hard_tick, Some(20));

    trial_mgr.pass(30.0, Utc::now()).unwrap();
    assert!(!trial_mgr.haptic_cues(filter.filtered()).hardness);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_no_cues_outside_haptics_condition() {
    let mut filter = PoseFilter::with_params(pose_filter::Params {
        position: pose_filter::FieldFilter::PassThrough,
        ..Default::default()
    })
    .unwrap();

    let dir = trial_dir("no_haptics");
    let mut trial_mgr = TrialMgr::new(
        trial_mgr::Params {
            record_video: false,
            ..Default::default()
        },
        &dir,
    );
    trial_mgr
        .start(
            &StartTrial {
                participant_id: "7".into(),
                condition: Some(Condition::NoHaptics),
                repeat: Some(2),
            },
            &StartContext {
                now_s: 0.0,
                wall: Utc::now(),
                heading_deg: 0.0,
                finger_pos: 1000.0,
                tag_size_m: 1.12,
            },
        )
        .unwrap();

    let (pose, _) = filter
        .proc(&pose_filter::InputData {
            pose: Some(PoseSample {
                translation_m: [0.0, 0.0, 3.9],
                rotation_rad: [0.0; 3],
            }),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(pose.z_m, 3.9);
    let cues = trial_mgr.haptic_cues(&pose);
    assert!(!cues.vibration && !cues.hardness);

    trial_mgr.fail(trial_mgr::FailReason::Unspecified, 5.0, Utc::now()).unwrap();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_touch_control_drives_channels_once_armed() {
    let sim = Arc::new(SimVehicle::new());
    let mut vehicle = VehicleClient::new(sim.clone(), vehicle_client::Params::default());
    vehicle.startup_handshake("ALT_HOLD").unwrap();

    let mut sink = ChannelSink::new(sim.clone());
    let mut lights = LightSignaller::new(sim.clone());
    let mut ds = DataStore::default();

    // Touch control refused until armed
    assert!(!ds.toggle_touch_control());

    ds.arming.request().unwrap();
    ds.arming.confirm(&mut vehicle, &mut sink, &mut lights).unwrap();
    assert!(sim.is_armed());
    assert!(ds.toggle_touch_control());
    assert!(ds.touch_control_active());

    // Hard press at the zero position, full speed and no turn
    let reading = HapticReading {
        finger_pos: ds.finger_zero,
        finger_force: 500.0,
    };
    let demands = ds.cmd_mapper.touch_demands(&reading, ds.finger_zero).unwrap();
    sink.set_motion(MotionChannel::Forward, demands.speed_pwm).unwrap();
    sink.set_motion(MotionChannel::Yaw, demands.turn_pwm).unwrap();

    let sent = sim.last_override().unwrap();
    assert_eq!(sent[MotionChannel::Forward.id() - 1], 1700);
    assert_eq!(sent[MotionChannel::Yaw.id() - 1], 1500);

    // Disarming stops all motion
    ds.arming.disarm(&mut vehicle, &mut sink, &mut lights).unwrap();
    assert!(!sim.is_armed());
    assert!(!ds.touch_control_active());
    let sent = sim.last_override().unwrap();
    assert!(MotionChannel::ALL
        .iter()
        .all(|ch| sent[ch.id() - 1] == PWM_NEUTRAL_US));
}

#[test]
fn test_haptic_device_hang_up_fails_trial() {
    // Device answers a few exchanges once told to, then hangs up
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
    let device = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        go_rx.recv().unwrap();
        let mut buf = [0u8; HAPTIC_FRAME_LEN];
        for _ in 0..5 {
            stream.read_exact(&mut buf).unwrap();
            let reading = HapticReading {
                finger_pos: 1010.0,
                finger_force: 300.0,
            };
            stream.write_all(&reading.to_frame()).unwrap();
        }
    });
    let mut haptic = HapticClient::connect(&addr, Duration::from_secs(1)).unwrap();

    let sim = Arc::new(SimVehicle::new());
    let mut vehicle = VehicleClient::new(sim.clone(), vehicle_client::Params::default());
    vehicle.startup_handshake("ALT_HOLD").unwrap();
    let mut ds = DataStore::default();
    arm_with_touch(&sim, &mut vehicle, &mut ds);

    let dir = trial_dir("haptic_loss");
    let mut trial_mgr = TrialMgr::new(
        trial_mgr::Params {
            record_video: false,
            ..Default::default()
        },
        &dir,
    );
    start_trial(&mut trial_mgr, 0.0);

    assert!(ds
        .update_haptic_alive(haptic.is_alive(), &mut trial_mgr, Utc::now())
        .is_none());
    assert!(ds.haptic_alive);

    go_tx.send(()).unwrap();
    device.join().unwrap();

    // Step the loop until the client notices
    ds.session_time_s = 4.0;
    let deadline = Instant::now() + Duration::from_secs(5);
    let record = loop {
        if let Some(r) = ds.update_haptic_alive(haptic.is_alive(), &mut trial_mgr, Utc::now()) {
            break r;
        }
        assert!(Instant::now() < deadline, "haptic loss not detected");
        thread::sleep(Duration::from_millis(5));
    };

    assert_eq!(
        record.outcome,
        Some(TrialOutcome::Fail {
            end_time_s: 4.0,
            reason: FailReason::HapticLinkLost
        })
    );
    assert!(!trial_mgr.is_running());
    assert_eq!(ds.touch_control, TouchControl::Off);
    assert!(!ds.touch_control_active());
    assert_eq!(ds.log_record().speed_demand, PWM_NEUTRAL_US);

    let log = std::fs::read_to_string(dir.join(record.data_file_name())).unwrap();
    assert_eq!(log.lines().filter(|l| *l == "FAIL - haptic link lost").count(), 1);

    // The run carries on, the next trial can start
    start_trial(&mut trial_mgr, 10.0);
    assert!(trial_mgr.is_running());

    haptic.stop();
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_vehicle_link_loss_fails_trial() {
    let sim = Arc::new(SimVehicle::new());
    let mut vehicle = VehicleClient::new(sim.clone(), vehicle_client::Params::default());
    vehicle.startup_handshake("ALT_HOLD").unwrap();

    let mut ds = DataStore::default();
    arm_with_touch(&sim, &mut vehicle, &mut ds);

    let dir = trial_dir("vehicle_loss");
    let mut trial_mgr = TrialMgr::new(
        trial_mgr::Params {
            record_video: false,
            ..Default::default()
        },
        &dir,
    );
    start_trial(&mut trial_mgr, 1.0);

    vehicle.poll().unwrap();
    sim.set_link_down(true);
    assert!(vehicle.poll().is_err());

    ds.session_time_s = 7.5;
    let record = ds
        .link_lost(Link::Vehicle, &mut trial_mgr, Utc::now())
        .unwrap();

    assert_eq!(
        record.outcome,
        Some(TrialOutcome::Fail {
            end_time_s: 7.5,
            reason: FailReason::VehicleLinkLost
        })
    );
    assert_eq!(ds.touch_control, TouchControl::Off);
    assert!(ds.trial_elapsed_s.is_none());

    let log = std::fs::read_to_string(dir.join(record.data_file_name())).unwrap();
    assert!(log.lines().any(|l| l == "FAIL - vehicle link lost"));

    // Nothing left to fail
    assert!(ds
        .link_lost(Link::Vehicle, &mut trial_mgr, Utc::now())
        .is_none());

    std::fs::remove_dir_all(&dir).ok();
}
