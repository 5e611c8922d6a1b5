//! Teleoperation control core executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules and equipment
//!     - Main loop:
//!         - System input acquisition:
//!             - Vehicle telemetry
//!             - Haptic device reading
//!             - Latest vision frame
//!         - Pose filtering
//!         - Telecommand processing and handling
//!         - Trial timeout check
//!         - Touch control mapping
//!         - Haptic cue evaluation
//!         - Trial logging and video recording
//!         - Telemetry publication
//!
//! The heartbeat emitter, haptic client, camera client, and light signaller run on their own
//! threads alongside the main loop.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod tc_processor;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, error, info, warn};
use std::{
    env,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

// Internal
use comms_if::{eqpt::cam::VisionFrame, tc::TcResponse};
use teleop_lib::{
    cam_client::CamClient,
    channel_sink::{ChannelSink, MotionChannel},
    cmd_mapper::CmdMapper,
    data_store::{DataStore, Link},
    frame_relay::FrameRelay,
    haptic_client::HapticClient,
    heartbeat::HeartbeatEmitter,
    light_signal::LightSignaller,
    params::TeleopExecParams,
    tc_client::{TcClient, TcClientError},
    tm_server::{TmPacket, TmServer},
    trial_mgr::{FailReason, TrialMgr},
    vehicle_client::{sim::SimVehicle, UdpVehicleLink, VehicleClient, VehicleLink},
};
use util::{
    host,
    logger::{level_from_str, logger_init},
    module::State,
    raise_error,
    script_interpreter::{PendingTcs, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Equipment handles owned by the main loop.
pub(crate) struct Eqpt {
    pub vehicle: VehicleClient,
    pub sink: ChannelSink,
    pub lights: LightSignaller,
    pub haptic: HapticClient,
    pub trial_mgr: TrialMgr,

    /// Set when a command could not be sent to the vehicle
    pub vehicle_link_lost: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Various sources for the telecommands incoming to the exec.
#[allow(dead_code)]
enum TcSource {
    None,
    Remote(TcClient),
    Script(ScriptInterpreter),
}

/// Why the main loop ended.
enum ExitCause {
    EndOfScript,
    VehicleLinkLost,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("teleop_exec", "sessions").wrap_err("Failed to create the session")?;

    // Parameters are needed for the log level so are loaded before the logger
    let params: TeleopExecParams = util::params::load("teleop_exec.toml")
        .wrap_err("Could not load the executable parameters")?;

    // Initialise logger
    logger_init(
        level_from_str(&params.log_level).wrap_err("Invalid log level")?,
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("ROV Teleoperation Executable\n");
    info!("Running on: {}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    let cycle_period = Duration::from_secs_f64(params.cycle_period_s);
    let cycle_frequency_hz = 1.0 / params.cycle_period_s;

    // ---- INITIALISE TC SOURCE ----

    // TC source is used to determine whether we're getting TCs from a script or from the operator
    // surface.
    let mut tc_source = TcSource::None;
    let mut use_tc_client = false;

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    // If we have a single argument use it as the script path
    if args.len() == 2 {
        info!("Loading script from \"{}\"", &args[1]);

        let si = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

        info!(
            "Loaded script lasts {:.02} s and contains {} TCs\n",
            si.get_duration(),
            si.get_num_tcs()
        );

        tc_source = TcSource::Script(si);
    } else if args.len() == 1 {
        info!("No script provided, the operator surface will be used via the TcClient\n");
        use_tc_client = true;
    } else {
        return Err(eyre!(
            "Expected either zero or one argument, found {}",
            args.len() - 1
        ));
    }

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();
    ds.finger_zero = params.initial_finger_zero;
    ds.tag_size_m = params.initial_tag_size_m;

    // ---- INITIALISE MODULES ----

    ds.pose_filter
        .init("pose_filter.toml", &session)
        .wrap_err("Failed to initialise PoseFilter")?;
    info!("PoseFilter init complete");

    ds.cmd_mapper = CmdMapper::new(
        util::params::load("cmd_mapper.toml").wrap_err("Could not load CmdMapper parameters")?,
    );
    info!("CmdMapper init complete");

    let trial_log_dir = host::get_sw_root()
        .wrap_err("The software root is not set")?
        .join(&params.trial_log_dir);
    let trial_mgr = TrialMgr::from_params_file("trial_mgr.toml", &trial_log_dir)
        .wrap_err("Failed to initialise TrialMgr")?;
    info!("TrialMgr init complete, trials are logged in {:?}", trial_log_dir);

    info!("Module initialisation complete\n");

    // ---- INITIALISE EQUIPMENT ----

    info!("Initialising equipment");

    let link: Arc<dyn VehicleLink> = match params.simulate_vehicle {
        true => {
            warn!("Using the simulated vehicle");
            Arc::new(SimVehicle::new())
        }
        false => Arc::new(
            UdpVehicleLink::new(
                &params.net.vehicle_bind_addr,
                params.net.vehicle_peer_addr.as_deref(),
            )
            .wrap_err("Failed to open the vehicle link")?,
        ),
    };

    let mut vehicle = VehicleClient::new(link.clone(), params.vehicle);
    vehicle
        .startup_handshake(params.initial_mode.autopilot_name())
        .wrap_err("Vehicle startup handshake failed")?;
    info!("VehicleClient initialised");

    let mut heartbeat = HeartbeatEmitter::start(
        link.clone(),
        Duration::from_secs_f64(params.heartbeat_period_s),
    );
    info!("HeartbeatEmitter started");

    let haptic = match HapticClient::connect(
        &params.net.haptic_addr,
        Duration::from_secs_f64(params.haptic_connect_timeout_s),
    ) {
        Ok(h) => h,
        Err(e) => {
            warn!("{}, continuing without haptics", e);
            HapticClient::offline()
        }
    };

    let mut eqpt = Eqpt {
        vehicle,
        sink: ChannelSink::new(link.clone()),
        lights: LightSignaller::new(link),
        haptic,
        trial_mgr,
        vehicle_link_lost: false,
    };

    info!("Equipment initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    if use_tc_client {
        tc_source = TcSource::Remote(
            TcClient::new(&zmq_ctx, &params.net).wrap_err("Failed to initialise the TcClient")?,
        );
        info!("TcClient initialised");
    }

    let frame_relay = FrameRelay::<VisionFrame>::new();
    let mut cam_client = {
        let c = CamClient::new(&zmq_ctx, &params.net, frame_relay.publisher())
            .wrap_err("Failed to initialise CamClient")?;
        info!("CamClient initialised");
        c
    };

    let mut tm_server = {
        let s = TmServer::new(&zmq_ctx, &params.net).wrap_err("Failed to initialise TmServer")?;
        info!("TmServer initialised");
        s
    };

    info!("Network initialisation complete");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let exit_cause = loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(cycle_frequency_hz);
        eqpt.vehicle.cycle_start();

        // ---- DATA INPUT ----

        if let Err(e) = eqpt.vehicle.poll() {
            error!("Could not receive vehicle telemetry: {}", e);
            eqpt.vehicle_link_lost = true;
        }
        if heartbeat.has_failed() {
            eqpt.vehicle_link_lost = true;
        }
        if eqpt.vehicle_link_lost {
            break ExitCause::VehicleLinkLost;
        }
        ds.vehicle_tm = eqpt.vehicle.telemetry().clone();

        let haptic_alive = eqpt.haptic.is_alive();
        if let Some(record) = ds.update_haptic_alive(haptic_alive, &mut eqpt.trial_mgr, Utc::now())
        {
            tc_processor::save_record(&session, record);
        }
        ds.haptic_reading = eqpt.haptic.reading();
        ds.haptic_demand = eqpt.haptic.demand();

        if let Some(vf) = frame_relay.try_take() {
            ds.raw_pose = vf.pose;
            ds.pose_filter_input.pose = Some(vf.pose);
            ds.vision_frame = Some(vf);
            ds.new_frame = true;
        }
        ds.num_dropped_frames = frame_relay.num_dropped();

        ds.pose_filter_input.imu = ds.vehicle_tm.imu.fresh().copied();
        ds.pose_filter_input.hud = ds.vehicle_tm.hud.fresh().copied();

        // ---- POSE FILTERING ----

        match ds.pose_filter.proc(&ds.pose_filter_input) {
            Ok((o, r)) => {
                ds.filtered_pose = o;
                ds.pose_filter_status_rpt = r;
            }
            Err(e) => warn!("Error during PoseFilter processing: {}", e),
        }

        // ---- TELECOMMAND PROCESSING ----

        match tc_source {
            TcSource::None => raise_error!("No TC source present"),

            TcSource::Remote(ref client) => loop {
                match client.recieve_tc() {
                    Ok(Some(tc)) => {
                        let response = tc_processor::exec(&mut ds, &mut eqpt, &session, &tc);
                        if let Err(e) = client.send_response(response) {
                            warn!("Could not respond to TC: {}", e);
                        }
                    }
                    Ok(None) => break,
                    Err(TcClientError::TcParseError(e)) => {
                        warn!("Could not parse recieved TC: {}", e);
                    }
                    Err(TcClientError::NonUtf8Message) => {
                        warn!("Recieved a TC which is not valid UTF-8");
                    }
                    Err(e) => {
                        warn!("Error while receiving TCs: {}", e);
                        break;
                    }
                }
            },

            TcSource::Script(ref mut si) => match si.get_pending_tcs() {
                PendingTcs::None => (),
                PendingTcs::Some(tc_vec) => {
                    for tc in tc_vec.iter() {
                        match tc_processor::exec(&mut ds, &mut eqpt, &session, tc) {
                            TcResponse::Ok => (),
                            r => warn!("Script TC {:?} was not executed ({:?})", tc, r),
                        }
                    }
                }
                PendingTcs::EndOfScript => {
                    info!("End of TC script reached, stopping");
                    break ExitCause::EndOfScript;
                }
            },
        };

        if eqpt.vehicle_link_lost {
            break ExitCause::VehicleLinkLost;
        }

        // ---- TRIAL TIMEOUT ----

        match eqpt.trial_mgr.check_timeout(ds.session_time_s, Utc::now()) {
            Ok(Some(record)) => tc_processor::save_record(&session, record),
            Ok(None) => (),
            Err(e) => error!("Could not conclude the timed out trial: {}", e),
        }

        // ---- TOUCH CONTROL ----

        if ds.touch_control_active() {
            match ds
                .cmd_mapper
                .touch_demands(&ds.haptic_reading, ds.finger_zero)
            {
                Ok(d) => {
                    ds.touch_demands = d;
                    let result = eqpt
                        .sink
                        .set_motion(MotionChannel::Forward, d.speed_pwm)
                        .and_then(|_| eqpt.sink.set_motion(MotionChannel::Yaw, d.turn_pwm));

                    if let Err(e) = result {
                        error!("Could not send the touch control demands: {}", e);
                        break ExitCause::VehicleLinkLost;
                    }
                }
                Err(e) => warn!("Touch control disabled: {}", e),
            }
        }

        // ---- HAPTIC CUES ----

        ds.haptic_cues = eqpt.trial_mgr.haptic_cues(&ds.filtered_pose);

        // ---- TRIAL LOGGING ----

        ds.trial_elapsed_s = eqpt.trial_mgr.elapsed_s(ds.session_time_s);

        if eqpt.trial_mgr.is_running() {
            let mut record = ds.log_record();
            if let Err(e) = eqpt.trial_mgr.log_tick(ds.session_time_s, &mut record) {
                error!("Could not write the trial log: {}", e);
            }

            if let (true, Some(vf)) = (ds.new_frame, ds.vision_frame.as_ref()) {
                if let Err(e) = eqpt.trial_mgr.write_frames(&vf.raw, vf.annotated.as_ref()) {
                    warn!("Could not record the frame: {}", e);
                }
            }
        }

        // ---- MONITORING ----

        ds.check_battery(params.battery_warn_pct);

        if ds.is_1_hz_cycle && cam_client.num_bad_frames() > 0 {
            debug!("{} bad vision frames so far", cam_client.num_bad_frames());
        }

        // ---- TELEMETRY ----

        let packet = TmPacket::new(&ds, eqpt.trial_mgr.record(), eqpt.trial_mgr.next_repeat());
        if let Err(e) = tm_server.send(&packet) {
            warn!("TmServer error: {}", e)
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        ds.num_cycles += 1;
    };

    // ---- SHUTDOWN ----

    let result = match exit_cause {
        ExitCause::EndOfScript => {
            fail_trial(&mut ds, &mut eqpt, &session, FailReason::Shutdown);
            Ok(())
        }
        ExitCause::VehicleLinkLost => {
            error!("Vehicle link lost");
            if let Some(record) = ds.link_lost(Link::Vehicle, &mut eqpt.trial_mgr, Utc::now()) {
                tc_processor::save_record(&session, record);
            }
            Err(eyre!("The vehicle link was lost"))
        }
    };

    heartbeat.stop();
    eqpt.lights.cancel();
    eqpt.haptic.stop();
    cam_client.stop();

    info!("End of execution");

    session.exit();

    result
}

/// Fail the running trial, if any, and save its record.
fn fail_trial(ds: &mut DataStore, eqpt: &mut Eqpt, session: &Session, reason: FailReason) {
    if !eqpt.trial_mgr.is_running() {
        return;
    }

    match eqpt.trial_mgr.fail(reason, ds.session_time_s, Utc::now()) {
        Ok(record) => tc_processor::save_record(session, record),
        Err(e) => error!("Could not conclude the trial: {}", e),
    }

    ds.trial_elapsed_s = None;
}
