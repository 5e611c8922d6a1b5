//! Implementations for the PoseFilter state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::{FieldFilter, HeadingSource, Params, PoseFilterError};
use comms_if::eqpt::{
    cam::PoseSample,
    vehicle::{HudSample, ImuSample},
};
use util::{maths::norm_2d, module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Pose filter module state
#[derive(Default)]
pub struct PoseFilter {
    pub(crate) params: Params,

    pub(crate) filtered: FilteredPose,
}

/// Input data to the pose filter, only samples received this cycle should be set.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    /// Marker pose estimate from the latest vision frame
    pub pose: Option<PoseSample>,

    /// IMU sample from the vehicle
    pub imu: Option<ImuSample>,

    /// HUD sample from the vehicle
    pub hud: Option<HudSample>,
}

/// Filtered pose and telemetry.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct FilteredPose {
    /// Filtered marker position
    ///
    /// Units: meters
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,

    /// Filtered roll rate (from the y gyro)
    ///
    /// Units: milli-radians/second
    pub roll_rate: f64,

    /// Filtered pitch rate (from the x gyro)
    ///
    /// Units: milli-radians/second
    pub pitch_rate: f64,

    /// Units: degrees
    pub heading_deg: f64,

    /// Units: meters/second
    pub ground_speed_ms: f64,

    /// Units: meters
    pub depth_m: f64,

    /// Distance from the filtered position to the target, ignoring y
    ///
    /// Units: meters
    pub target_dist_m: f64,
}

/// Status report for PoseFilter processing.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// A pose sample was provided this cycle
    pub pose_fresh: bool,

    /// The pose sample contained a marker detection
    pub marker_detected: bool,

    pub imu_fresh: bool,
    pub hud_fresh: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for PoseFilter {
    type InitData = &'static str;
    type InitError = PoseFilterError;

    type InputData = InputData;
    type OutputData = FilteredPose;
    type StatusReport = StatusReport;
    type ProcError = PoseFilterError;

    /// Initialise the PoseFilter module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session) -> Result<(), Self::InitError> {
        let params: Params = params::load(init_data).map_err(PoseFilterError::ParamLoadError)?;

        *self = Self::with_params(params)?;

        Ok(())
    }

    /// Run one filter update.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let mut report = StatusReport::default();

        // Zero pose means no marker was found, the position is held
        if let Some(pose) = input_data.pose {
            report.pose_fresh = true;

            if pose.is_detection() {
                report.marker_detected = true;
                let [x, y, z] = pose.translation_m;
                let f = self.params.position;
                self.filtered.x_m = f.apply(self.filtered.x_m, x);
                self.filtered.y_m = f.apply(self.filtered.y_m, y);
                self.filtered.z_m = f.apply(self.filtered.z_m, z);
            }
        }

        if let Some(imu) = input_data.imu {
            report.imu_fresh = true;

            let f = self.params.rates;
            self.filtered.roll_rate = f.apply(self.filtered.roll_rate, imu.ygyro);
            self.filtered.pitch_rate = f.apply(self.filtered.pitch_rate, imu.xgyro);

            if self.params.heading_source == HeadingSource::YawRate {
                self.filtered.heading_deg =
                    self.params.heading.apply(self.filtered.heading_deg, imu.zgyro);
            }
        }

        if let Some(hud) = input_data.hud {
            report.hud_fresh = true;

            if self.params.heading_source == HeadingSource::Compass {
                self.filtered.heading_deg =
                    self.params.heading.apply(self.filtered.heading_deg, hud.heading_deg);
            }
            self.filtered.ground_speed_ms = self
                .params
                .ground_speed
                .apply(self.filtered.ground_speed_ms, hud.groundspeed_ms);
            self.filtered.depth_m = self.params.depth.apply(self.filtered.depth_m, hud.alt_m);
        }

        self.filtered.target_dist_m = norm_2d(
            self.filtered.x_m,
            self.filtered.z_m - self.params.z_offset_m,
        );

        trace!(
            "PoseFilter output: ({:.3}, {:.3}, {:.3}) m, target {:.3} m",
            self.filtered.x_m,
            self.filtered.y_m,
            self.filtered.z_m,
            self.filtered.target_dist_m
        );

        Ok((self.filtered, report))
    }
}

impl PoseFilter {
    /// Create a filter from already loaded parameters.
    pub fn with_params(params: Params) -> Result<Self, PoseFilterError> {
        params.position.check("position")?;
        params.rates.check("rates")?;
        params.heading.check("heading")?;
        params.ground_speed.check("ground_speed")?;
        params.depth.check("depth")?;

        Ok(Self {
            params,
            filtered: FilteredPose::default(),
        })
    }

    /// Get the current filtered values.
    pub fn filtered(&self) -> &FilteredPose {
        &self.filtered
    }

    /// Shorthand for a filter update which cannot fail.
    pub fn update(&mut self, input: &InputData) -> FilteredPose {
        match self.proc(input) {
            Ok((o, _)) => o,
            Err(_) => self.filtered,
        }
    }
}

impl FieldFilter {
    /// Number of updates of a constant input after which the filtered value is within
    /// `fraction` of the input (starting from zero).
    pub fn settling_updates(&self, fraction: f64) -> usize {
        match self {
            FieldFilter::Ema { window } => {
                (fraction.ln() / (1.0 - 1.0 / window).ln()).ceil().max(0.0) as usize
            }
            FieldFilter::PassThrough => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pose(x: f64, y: f64, z: f64) -> PoseSample {
        PoseSample {
            translation_m: [x, y, z],
            rotation_rad: [0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn test_converges_on_constant_input() {
        let mut pf = PoseFilter::with_params(Params::default()).unwrap();

        let n = FieldFilter::Ema { window: 15.0 }.settling_updates(0.01);
        for _ in 0..n {
            pf.update(&InputData {
                pose: Some(pose(1.0, -0.5, 3.0)),
                ..Default::default()
            });
        }

        let f = pf.filtered();
        assert!((f.x_m - 1.0).abs() <= 0.01);
        assert!((f.y_m + 0.5).abs() <= 0.005);
        assert!((f.z_m - 3.0).abs() <= 0.03);

        // One update short of the bound is not yet inside it
        let mut pf = PoseFilter::with_params(Params::default()).unwrap();
        for _ in 0..(n - 1) {
            pf.update(&InputData {
                pose: Some(pose(1.0, 0.0, 0.0)),
                ..Default::default()
            });
        }
        assert!((pf.filtered().x_m - 1.0).abs() > 0.01);
    }

    #[test]
    fn test_first_update_is_one_window_step() {
        let mut pf = PoseFilter::with_params(Params::default()).unwrap();
        let out = pf.update(&InputData {
            pose: Some(pose(15.0, 0.0, 0.0)),
            ..Default::default()
        });
        assert!((out.x_m - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_or_zero_pose_holds_value() {
        let mut pf = PoseFilter::with_params(Params::default()).unwrap();
        for _ in 0..50 {
            pf.update(&InputData {
                pose: Some(pose(0.5, 0.0, 4.0)),
                ..Default::default()
            });
        }
        let before = *pf.filtered();

        // No sample at all
        pf.update(&InputData::default());
        assert_eq!(pf.filtered().z_m, before.z_m);

        // Zero sample
        let (out, report) = pf
            .proc(&InputData {
                pose: Some(PoseSample::default()),
                ..Default::default()
            })
            .unwrap();
        assert!(report.pose_fresh);
        assert!(!report.marker_detected);
        assert_eq!(out.x_m, before.x_m);
        assert_eq!(out.z_m, before.z_m);
        assert_eq!(out.target_dist_m, before.target_dist_m);
    }

    #[test]
    fn test_telemetry_pass_through() {
        let mut pf = PoseFilter::with_params(Params::default()).unwrap();
        let out = pf.update(&InputData {
            imu: Some(ImuSample {
                xgyro: 30.0,
                ygyro: 15.0,
                ..Default::default()
            }),
            hud: Some(HudSample {
                heading_deg: 270.0,
                groundspeed_ms: 0.4,
                alt_m: -3.5,
            }),
            ..Default::default()
        });

        assert_eq!(out.heading_deg, 270.0);
        assert_eq!(out.ground_speed_ms, 0.4);
        assert_eq!(out.depth_m, -3.5);
        assert!((out.roll_rate - 1.0).abs() < 1e-12);
        assert!((out.pitch_rate - 2.0).abs() < 1e-12);

        // Stale telemetry isn't fed in again
        let out = pf.update(&InputData::default());
        assert!((out.roll_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_target_distance() {
        let mut params = Params::default();
        params.position = FieldFilter::PassThrough;
        let mut pf = PoseFilter::with_params(params).unwrap();

        let out = pf.update(&InputData {
            pose: Some(pose(3.0, 7.0, 6.0)),
            ..Default::default()
        });
        assert!((out.target_dist_m - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let mut params = Params::default();
        params.rates = FieldFilter::Ema { window: 0.5 };
        assert!(matches!(
            PoseFilter::with_params(params),
            Err(PoseFilterError::InvalidWindow("rates", _))
        ));
    }

    #[test]
    fn test_params_from_toml() {
        let params: Params = util::params::from_str(
            r#"
            z_offset_m = 2.0
            heading_source = "Compass"
            position = { mode = "Ema", window = 15.0 }
            rates = { mode = "Ema", window = 10.0 }
            heading = { mode = "PassThrough" }
            ground_speed = { mode = "PassThrough" }
            depth = { mode = "PassThrough" }
            "#,
        )
        .unwrap();

        assert_eq!(params.rates, FieldFilter::Ema { window: 10.0 });
        assert_eq!(params.depth, FieldFilter::PassThrough);
    }
}
