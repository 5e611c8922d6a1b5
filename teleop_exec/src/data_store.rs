//! # Data Store
//!
//! Everything the main loop knows during a cycle. Modules read their inputs from here and write
//! their outputs back, the TM packet is built from it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use comms_if::eqpt::{
    cam::{PoseSample, VisionFrame},
    haptic::{HapticDemand, HapticReading},
};
use log::{error, info, warn};

use crate::{
    cmd_mapper::{CmdMapper, TouchDemands},
    pose_filter::{self, FilteredPose, PoseFilter},
    tm_logger::LogRecord,
    trial_mgr::{Arming, FailReason, HapticCues, TrialMgr, TrialRecord},
    vehicle_client::TelemetryCache,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Finger position taken as the touch control zero until the operator sets one.
pub const DEFAULT_FINGER_ZERO: f64 = 1000.0;

/// Marker size assumed until the operator sets one.
///
/// Units: meters
pub const DEFAULT_TAG_SIZE_M: f64 = 1.12;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A transport whose loss ends the running trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Vehicle,
    Haptic,
}

/// Whether the haptic device steers the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TouchControl {
    Off,
    On,
}

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Global data store for the executable.
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Session elapsed time at the start of the cycle
    pub session_time_s: f64,

    // Vision
    /// Latest vision frame, kept for stills
    pub vision_frame: Option<VisionFrame>,

    /// True if `vision_frame` arrived this cycle
    pub new_frame: bool,

    /// Pose of the latest frame, zero when no marker was seen
    pub raw_pose: PoseSample,

    /// Size of the marker in use, sent to the vision pipeline
    ///
    /// Units: meters
    pub tag_size_m: f64,

    // Pose filter
    pub pose_filter: PoseFilter,
    pub pose_filter_input: pose_filter::InputData,
    pub filtered_pose: FilteredPose,
    pub pose_filter_status_rpt: pose_filter::StatusReport,

    // Vehicle
    /// Copy of the vehicle client's telemetry cache
    pub vehicle_tm: TelemetryCache,

    pub arming: Arming,

    // Haptics
    pub haptic_reading: HapticReading,
    pub haptic_demand: HapticDemand,
    pub haptic_alive: bool,

    /// Finger position which commands no turn
    pub finger_zero: f64,

    pub haptic_cues: HapticCues,

    // Touch control
    pub cmd_mapper: CmdMapper,
    pub touch_control: TouchControl,
    pub touch_demands: TouchDemands,

    // Trial
    /// Elapsed time of the running trial
    pub trial_elapsed_s: Option<f64>,

    // Monitoring
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    /// Number of vision frames dropped before the main loop could use them
    pub num_dropped_frames: u64,

    /// True once the low battery warning has been issued
    pub battery_warned: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DataStore {
    fn default() -> Self {
        Self {
            num_cycles: 0,
            is_1_hz_cycle: false,
            session_time_s: 0.0,
            vision_frame: None,
            new_frame: false,
            raw_pose: PoseSample::default(),
            tag_size_m: DEFAULT_TAG_SIZE_M,
            pose_filter: PoseFilter::default(),
            pose_filter_input: pose_filter::InputData::default(),
            filtered_pose: FilteredPose::default(),
            pose_filter_status_rpt: pose_filter::StatusReport::default(),
            vehicle_tm: TelemetryCache::default(),
            arming: Arming::default(),
            haptic_reading: HapticReading::default(),
            haptic_demand: HapticDemand::default(),
            haptic_alive: false,
            finger_zero: DEFAULT_FINGER_ZERO,
            haptic_cues: HapticCues::default(),
            cmd_mapper: CmdMapper::default(),
            touch_control: TouchControl::Off,
            touch_demands: TouchDemands::neutral(DEFAULT_FINGER_ZERO),
            trial_elapsed_s: None,
            num_consec_cycle_overruns: 0,
            num_dropped_frames: 0,
            battery_warned: false,
        }
    }
}

impl DataStore {
    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        self.is_1_hz_cycle = self.num_cycles % (cycle_frequency_hz.max(1.0) as u128) == 0;

        self.new_frame = false;
        self.pose_filter_input = pose_filter::InputData::default();
        self.pose_filter_status_rpt = pose_filter::StatusReport::default();

        self.session_time_s = util::session::get_elapsed_seconds();
    }

    /// Turn touch control on or off, it can only be turned on while the vehicle is armed.
    ///
    /// Returns `false` if the request was refused.
    pub fn toggle_touch_control(&mut self) -> bool {
        match self.touch_control {
            TouchControl::On => {
                info!("Touch control disabled");
                self.stop_touch_control();
                true
            }
            TouchControl::Off if self.arming.allows_motion() => {
                info!("Touch control enabled");
                self.touch_control = TouchControl::On;
                true
            }
            TouchControl::Off => {
                warn!("Touch control can only be enabled while armed");
                false
            }
        }
    }

    /// Turn touch control off, the logged demands return to neutral.
    pub fn stop_touch_control(&mut self) {
        self.touch_control = TouchControl::Off;
        self.touch_demands = TouchDemands::neutral(self.finger_zero);
    }

    /// Record this cycle's haptic link state, reacting to the link dropping.
    ///
    /// Returns the record of the trial failed by the loss, if any.
    pub fn update_haptic_alive(
        &mut self,
        alive: bool,
        trial_mgr: &mut TrialMgr,
        wall: DateTime<Utc>,
    ) -> Option<TrialRecord> {
        let lost = self.haptic_alive && !alive;
        self.haptic_alive = alive;

        if lost {
            error!("Haptic link lost, continuing without haptics");
            self.link_lost(Link::Haptic, trial_mgr, wall)
        } else {
            None
        }
    }

    /// Stop touch control and fail the running trial after a transport is lost.
    ///
    /// Returns the record of the failed trial, if one was running.
    pub fn link_lost(
        &mut self,
        link: Link,
        trial_mgr: &mut TrialMgr,
        wall: DateTime<Utc>,
    ) -> Option<TrialRecord> {
        let reason = match link {
            Link::Vehicle => FailReason::VehicleLinkLost,
            Link::Haptic => {
                self.haptic_alive = false;
                FailReason::HapticLinkLost
            }
        };

        if self.touch_control == TouchControl::On {
            warn!("Touch control disabled by the {:?} link loss", link);
        }
        self.stop_touch_control();

        if !trial_mgr.is_running() {
            return None;
        }

        self.trial_elapsed_s = None;
        match trial_mgr.fail(reason, self.session_time_s, wall) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Could not conclude the trial: {}", e);
                None
            }
        }
    }

    /// True if touch control should drive the vehicle this cycle.
    pub fn touch_control_active(&self) -> bool {
        self.touch_control == TouchControl::On && self.arming.allows_motion()
    }

    /// Issue the low battery warning once the remaining charge drops below the threshold.
    pub fn check_battery(&mut self, warn_pct: i8) {
        let remaining = match self.vehicle_tm.sys_status.latest {
            Some(s) => s.battery_remaining_pct,
            None => return,
        };

        if remaining >= 0 && remaining < warn_pct {
            if !self.battery_warned {
                warn!("Vehicle battery low: {}% remaining", remaining);
                self.battery_warned = true;
            }
        } else {
            self.battery_warned = false;
        }
    }

    /// Build this cycle's trial log record. The trial time is filled in by the trial manager.
    pub fn log_record(&self) -> LogRecord {
        let imu = self.vehicle_tm.imu.latest.unwrap_or_default();
        let t = self.raw_pose.translation_m;
        let r = self.raw_pose.rotation_rad;

        LogRecord {
            time: 0.0,
            xacc: imu.xacc,
            yacc: imu.yacc,
            zacc: imu.zacc,
            xgyro: imu.xgyro,
            ygyro: imu.ygyro,
            zgyro: imu.zgyro,
            finger_zero: self.finger_zero,
            finger_pos: self.haptic_reading.finger_pos,
            finger_force: self.haptic_reading.finger_force,
            adjusted_finger_pos: self.touch_demands.adjusted_pos,
            adjusted_finger_force: self.touch_demands.adjusted_force,
            vibration: self.haptic_demand.vibration,
            hardness: self.haptic_demand.hardness,
            visual_translation_0: t[0],
            visual_translation_1: t[1],
            visual_translation_2: t[2],
            visual_rotation_0: r[0],
            visual_rotation_1: r[1],
            visual_rotation_2: r[2],
            avg_x_loc: self.filtered_pose.x_m,
            avg_y_loc: self.filtered_pose.y_m,
            avg_z_loc: self.filtered_pose.z_m,
            heading: self.filtered_pose.heading_deg,
            target_dist: self.filtered_pose.target_dist_m,
            speed_demand: self.touch_demands.speed_pwm,
            turn_demand: self.touch_demands.turn_pwm,
            ground_speed: self.filtered_pose.ground_speed_ms,
            depth: self.filtered_pose.depth_m,
        }
    }
}
