//! # PID controller module
//!
//! This module provides the PID controller itself: the gains, the error terms
//! tracked from the cross-track error, and the run accumulator used as the
//! fitness signal by twiddle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::twiddle::TwiddleState;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default twiddle step sizes, in `[dp, di, dd]` order.
///
/// These come from an offline tuning run and are only a starting search
/// scale, signs included.
pub const DEFAULT_STEPS: [f64; 3] = [-0.147789, 0.00106112, 2.95378];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller with online twiddle tuning of its gains.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Gains in `[k_p, k_i, k_d]` order
    pub(super) gains: [f64; 3],

    /// Twiddle step sizes in `[dp, di, dd]` order
    pub(super) steps: [f64; 3],

    /// Error terms
    pub(super) errors: ErrorState,

    /// Accumulated error of the current run segment
    pub(super) run: TuningRun,

    /// Twiddle state machine
    pub(super) twiddle: TwiddleState,
}

/// The error terms of the controller.
#[derive(Debug, Default, Serialize, Clone, Copy, PartialEq)]
pub struct ErrorState {
    /// Proportional error, the latest CTE
    pub p: f64,

    /// Integral error, the sum of all CTEs since initialisation
    pub i: f64,

    /// Derivative error, the latest CTE minus the previous one
    pub d: f64,
}

/// Accumulated squared error over one run segment.
///
/// The controller only ever adds to `cumulative_err`. Counting cycles and
/// resetting between segments is the driver's job.
#[derive(Debug, Default, Serialize, Clone, Copy, PartialEq)]
pub struct TuningRun {
    /// Sum of the squared CTE seen during the segment
    pub cumulative_err: f64,

    /// Number of cycles in the segment
    pub num_cycles: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// One of the three PID coefficients.
///
/// Twiddle tunes them in the fixed cycle `Kp -> Ki -> Kd -> Kp`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Coefficient {
    Kp,
    Ki,
    Kd,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Coefficient {
    /// All coefficients in tuning order.
    pub const ALL: [Coefficient; 3] = [Coefficient::Kp, Coefficient::Ki, Coefficient::Kd];

    /// Position of this coefficient in gain and step arrays.
    pub fn index(self) -> usize {
        match self {
            Coefficient::Kp => 0,
            Coefficient::Ki => 1,
            Coefficient::Kd => 2,
        }
    }

    /// The coefficient tuned after this one.
    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

impl TuningRun {
    /// Mean squared error of the segment, or `None` if no cycles were counted.
    pub fn mean_sq_err(&self) -> Option<f64> {
        match self.num_cycles {
            0 => None,
            n => Some(self.cumulative_err / n as f64),
        }
    }
}

impl PidController {
    /// Create a new controller with the given gains and the default step
    /// sizes.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self::with_steps([k_p, k_i, k_d], DEFAULT_STEPS)
    }

    /// Create a new controller with the given gains and twiddle step sizes.
    ///
    /// Error terms and the run accumulator start at zero, twiddle starts on
    /// the first stage of `Kp`.
    pub fn with_steps(gains: [f64; 3], steps: [f64; 3]) -> Self {
        Self {
            gains,
            steps,
            errors: ErrorState::default(),
            run: TuningRun::default(),
            twiddle: TwiddleState::default(),
        }
    }

    /// Update the error terms with the latest cross-track error.
    pub fn update_error(&mut self, cte: f64) {
        self.run.cumulative_err += cte * cte;

        // Derivative must use the previous proportional error
        self.errors.d = cte - self.errors.p;
        self.errors.p = cte;
        self.errors.i += cte;

        trace!(
            "cte = {:.6}, p = {:.6}, i = {:.6}, d = {:.6}",
            cte,
            self.errors.p,
            self.errors.i,
            self.errors.d
        );
    }

    /// Get the output of the controller for the current error terms.
    pub fn total_error(&self) -> f64 {
        self.k_p() * self.errors.p + self.k_d() * self.errors.d + self.k_i() * self.errors.i
    }

    /// Zero the error terms, keeping gains, steps and twiddle state.
    ///
    /// Used when the controlled system is restarted for a new trial.
    pub fn reset_errors(&mut self) {
        self.errors = ErrorState::default();
    }

    /// Zero the run accumulator ready for the next segment.
    pub fn reset_run(&mut self) {
        self.run = TuningRun::default();
    }

    /// Count one cycle into the current run segment.
    pub fn count_cycle(&mut self) {
        self.run.num_cycles += 1;
    }

    pub fn k_p(&self) -> f64 {
        self.gains[Coefficient::Kp.index()]
    }

    pub fn k_i(&self) -> f64 {
        self.gains[Coefficient::Ki.index()]
    }

    pub fn k_d(&self) -> f64 {
        self.gains[Coefficient::Kd.index()]
    }

    /// Gain of the given coefficient.
    pub fn gain(&self, coeff: Coefficient) -> f64 {
        self.gains[coeff.index()]
    }

    /// Twiddle step size of the given coefficient.
    pub fn step(&self, coeff: Coefficient) -> f64 {
        self.steps[coeff.index()]
    }

    /// All gains in `[k_p, k_i, k_d]` order.
    pub fn gains(&self) -> [f64; 3] {
        self.gains
    }

    /// All step sizes in `[dp, di, dd]` order.
    pub fn steps(&self) -> [f64; 3] {
        self.steps
    }

    /// Sum of the magnitudes of the step sizes.
    ///
    /// Twiddle has converged once this drops below some tolerance.
    pub fn step_magnitude(&self) -> f64 {
        self.steps.iter().map(|s| s.abs()).sum()
    }

    pub fn errors(&self) -> &ErrorState {
        &self.errors
    }

    pub fn run(&self) -> &TuningRun {
        &self.run
    }

    /// Mutable access to the run accumulator, for drivers which keep their
    /// own cycle count.
    pub fn run_mut(&mut self) -> &mut TuningRun {
        &mut self.run
    }

    pub fn twiddle_state(&self) -> &TwiddleState {
        &self.twiddle
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pid::TwiddleStage;

    #[test]
    fn test_new_state() {
        let pid = PidController::new(0.2, 0.004, 3.0);

        assert_eq!(pid.gains(), [0.2, 0.004, 3.0]);
        assert_eq!(pid.steps(), DEFAULT_STEPS);
        assert_eq!(*pid.errors(), ErrorState::default());
        assert_eq!(*pid.run(), TuningRun::default());
        assert_eq!(pid.total_error(), 0.0);

        // Twiddle starts with a fresh probe of Kp and no best error
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::One);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Kp);
        assert_eq!(pid.twiddle_state().best_err(), 0.0);
    }

    #[test]
    fn test_integral_is_running_sum() {
        let mut pid = PidController::new(0.0, 0.0, 0.0);
        let ctes = [0.5, -1.25, 2.0, 0.0, -0.75];

        let mut sum = 0.0;
        for cte in ctes.iter() {
            pid.update_error(*cte);
            sum += cte;
            assert_eq!(pid.errors().i, sum);
        }
    }

    #[test]
    fn test_derivative_uses_previous_cte() {
        let mut pid = PidController::new(0.0, 0.0, 0.0);

        // First call differences against zero
        pid.update_error(1.5);
        assert_eq!(pid.errors().d, 1.5);
        assert_eq!(pid.errors().p, 1.5);

        pid.update_error(0.5);
        assert_eq!(pid.errors().d, -1.0);
        assert_eq!(pid.errors().p, 0.5);

        pid.update_error(-2.0);
        assert_eq!(pid.errors().d, -2.5);
    }

    #[test]
    fn test_total_error() {
        let mut pid = PidController::new(2.0, 0.5, 10.0);
        pid.update_error(1.0);
        pid.update_error(3.0);

        // p = 3, i = 4, d = 2
        assert_eq!(pid.total_error(), 2.0 * 3.0 + 0.5 * 4.0 + 10.0 * 2.0);

        // Pure read
        assert_eq!(pid.total_error(), pid.total_error());
    }

    #[test]
    fn test_run_accumulation() {
        let mut pid = PidController::new(0.0, 0.0, 0.0);
        assert_eq!(pid.run().mean_sq_err(), None);

        for cte in [1.0, -2.0, 3.0].iter() {
            pid.update_error(*cte);
            pid.count_cycle();
        }

        assert_eq!(pid.run().cumulative_err, 14.0);
        assert_eq!(pid.run().num_cycles, 3);
        assert_eq!(pid.run().mean_sq_err(), Some(14.0 / 3.0));

        pid.reset_run();
        assert_eq!(*pid.run(), TuningRun::default());

        // Error terms survive a run reset but not an error reset
        assert_eq!(pid.errors().p, 3.0);
        pid.reset_errors();
        assert_eq!(*pid.errors(), ErrorState::default());
    }

    #[test]
    fn test_coefficient_cycle() {
        assert_eq!(Coefficient::Kp.next(), Coefficient::Ki);
        assert_eq!(Coefficient::Ki.next(), Coefficient::Kd);
        assert_eq!(Coefficient::Kd.next(), Coefficient::Kp);

        for (i, c) in Coefficient::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn test_step_magnitude() {
        let pid = PidController::with_steps([0.0; 3], [-1.0, 0.5, 2.0]);
        assert_eq!(pid.step_magnitude(), 3.5);
    }
}
