//! # Lateral plant simulation
//!
//! A kinematic bicycle model following a straight reference line along the X
//! axis. The cross-track error is the lateral offset of the vehicle from the
//! line, positive to the left. Steering is saturated and offset by a constant
//! bias (a misaligned steering rack), which is what the integral term is for.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use crate::pid::{PidController, DEFAULT_STEPS};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the lateral plant
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PlantParams {
    /// Constant forward speed
    pub speed_ms: f64,

    /// Distance between the front and rear axles
    pub wheelbase_m: f64,

    /// Duration of one control cycle
    pub cycle_period_s: f64,

    /// Steering demand saturation limit
    pub max_steer_rad: f64,

    /// Bias added to the saturated steering angle
    pub steer_bias_rad: f64,

    /// Lateral offset at the start of each run
    pub initial_offset_m: f64,

    /// Heading relative to the reference line at the start of each run
    pub initial_heading_rad: f64,
}

/// The simulated vehicle.
#[derive(Debug, Clone)]
pub struct LateralPlant {
    params: PlantParams,

    offset_m: f64,

    heading_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LateralPlant {
    pub fn new(params: PlantParams) -> Self {
        Self {
            offset_m: params.initial_offset_m,
            heading_rad: params.initial_heading_rad,
            params,
        }
    }

    /// Put the vehicle back at its initial pose.
    pub fn reset(&mut self) {
        self.offset_m = self.params.initial_offset_m;
        self.heading_rad = self.params.initial_heading_rad;
    }

    /// The current cross-track error.
    pub fn cte(&self) -> f64 {
        self.offset_m
    }

    pub fn heading_rad(&self) -> f64 {
        self.heading_rad
    }

    /// Advance the plant by one cycle with the given steering demand.
    ///
    /// Positive steering turns left.
    pub fn step(&mut self, steer_dem_rad: f64) {
        let steer_rad = steer_dem_rad.clamp(-self.params.max_steer_rad, self.params.max_steer_rad)
            + self.params.steer_bias_rad;
        let dt = self.params.cycle_period_s;

        self.heading_rad += self.params.speed_ms / self.params.wheelbase_m * steer_rad.tan() * dt;
        self.offset_m += self.params.speed_ms * self.heading_rad.sin() * dt;
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Mean squared CTE of a fresh run of `cycles` cycles with fixed gains.
///
/// The loop is the same one the tuning driver sees during a run segment, so
/// this gives the fitness twiddle would measure for these gains. Returns
/// `None` if `cycles` is zero.
pub fn evaluate(gains: [f64; 3], params: &PlantParams, cycles: u64) -> Option<f64> {
    let mut pid = PidController::with_steps(gains, DEFAULT_STEPS);
    let mut plant = LateralPlant::new(params.clone());

    for _ in 0..cycles {
        pid.update_error(plant.cte());
        pid.count_cycle();
        plant.step(-pid.total_error());
    }

    pid.run().mean_sq_err()
}
