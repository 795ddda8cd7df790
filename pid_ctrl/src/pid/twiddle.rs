//! # Twiddle tuning
//!
//! Twiddle is a coordinate-ascent search over the three PID gains. One gain
//! is perturbed at a time by its step size, first upwards then downwards, and
//! the mean squared CTE of the following run segment decides whether the
//! perturbation is kept. Successful directions grow the step, a failure in
//! both directions restores the gain and shrinks the step.
//!
//! Each call to `PidController::twiddle_update` consumes one completed run
//! segment:
//!
//! | Stage  | Action                                                    | Next     |
//! |--------|-----------------------------------------------------------|----------|
//! | One    | record fitness as best, `gain += step`                    | Two      |
//! | Two    | improved: grow step, next coefficient                     | One      |
//! |        | otherwise: `gain -= 2 * step`                             | Three    |
//! | Three  | improved: grow step; otherwise `gain += step`, shrink step | One (next coefficient) |
//!
//! Only a strictly lower fitness counts as an improvement. The search never
//! terminates by itself, the driver decides when to stop calling it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::Serialize;

// Internal
use super::controllers::{Coefficient, PidController};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Step multiplier applied after a successful trial.
pub const STEP_GROWTH: f64 = 1.1;

/// Step multiplier applied after both directions failed.
pub const STEP_SHRINK: f64 = 0.9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of the twiddle search.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct TwiddleState {
    /// Stage to execute on the next update
    stage: TwiddleStage,

    /// Coefficient currently being tuned
    coefficient: Coefficient,

    /// Best fitness seen for the current coefficient, set on stage one
    best_err: f64,
}

/// A record of a single twiddle update, flat so it can be archived as a CSV
/// row.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct TwiddleRecord {
    /// Coefficient that was updated
    pub coefficient: Coefficient,

    /// Stage that was executed
    pub stage: TwiddleStage,

    /// Fitness of the segment that was consumed
    pub mean_sq_err: f64,

    /// Best fitness after the update
    pub best_err: f64,

    /// Whether the segment improved on the best fitness, `None` on stage one
    /// where there is nothing to compare against
    pub improved: Option<bool>,

    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,
    pub dp: f64,
    pub di: f64,
    pub dd: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The stages of the twiddle state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum TwiddleStage {
    /// Fresh probe, the `+step` trial is about to be applied
    One,

    /// The `+step` trial has been run
    Two,

    /// The `-step` trial has been run
    Three,
}

/// Errors which can occur during a twiddle update.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TwiddleError {
    /// The run segment contains no cycles so it has no fitness. Nothing is
    /// modified when this is returned.
    #[error("Cannot twiddle on a run segment with no cycles")]
    EmptySegment,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TwiddleState {
    fn default() -> Self {
        Self {
            stage: TwiddleStage::One,
            coefficient: Coefficient::Kp,
            best_err: 0.0,
        }
    }
}

impl TwiddleState {
    pub fn stage(&self) -> TwiddleStage {
        self.stage
    }

    pub fn coefficient(&self) -> Coefficient {
        self.coefficient
    }

    pub fn best_err(&self) -> f64 {
        self.best_err
    }

    /// Execute the current stage for the given fitness on the selected
    /// gain/step pair.
    ///
    /// Returns whether the fitness improved on the best, or `None` on stage
    /// one.
    fn execute(&mut self, err: f64, gain: &mut f64, step: &mut f64) -> Option<bool> {
        match self.stage {
            TwiddleStage::One => {
                self.best_err = err;
                *gain += *step;
                self.stage = TwiddleStage::Two;
                None
            }
            TwiddleStage::Two => {
                if err < self.best_err {
                    self.best_err = err;
                    *step *= STEP_GROWTH;
                    self.next_coefficient();
                    Some(true)
                } else {
                    // Undo the +step trial and try -step
                    *gain -= 2.0 * *step;
                    self.stage = TwiddleStage::Three;
                    Some(false)
                }
            }
            TwiddleStage::Three => {
                let improved = err < self.best_err;
                if improved {
                    self.best_err = err;
                    *step *= STEP_GROWTH;
                } else {
                    // Back to the original gain
                    *gain += *step;
                    *step *= STEP_SHRINK;
                }
                self.next_coefficient();
                Some(improved)
            }
        }
    }

    fn next_coefficient(&mut self) {
        self.coefficient = self.coefficient.next();
        self.stage = TwiddleStage::One;
    }
}

impl PidController {
    /// Advance twiddle using the completed run segment as the fitness sample.
    ///
    /// The fitness is the mean squared CTE of the segment, lower is better.
    /// Exactly one gain/step pair is modified. The run accumulator is not
    /// reset, the caller must do so (see `reset_run`) before starting the
    /// next segment.
    pub fn twiddle_update(&mut self) -> Result<TwiddleRecord, TwiddleError> {
        let err = self.run.mean_sq_err().ok_or(TwiddleError::EmptySegment)?;

        let coefficient = self.twiddle.coefficient;
        let stage = self.twiddle.stage;
        let i = coefficient.index();

        let improved = self
            .twiddle
            .execute(err, &mut self.gains[i], &mut self.steps[i]);

        debug!(
            "Twiddle {:?} stage {:?}: err = {:.6}, best = {:.6}, gain = {:.6}, step = {:.6}",
            coefficient, stage, err, self.twiddle.best_err, self.gains[i], self.steps[i]
        );

        Ok(TwiddleRecord {
            coefficient,
            stage,
            mean_sq_err: err,
            best_err: self.twiddle.best_err,
            improved,
            k_p: self.k_p(),
            k_i: self.k_i(),
            k_d: self.k_d(),
            dp: self.steps[0],
            di: self.steps[1],
            dd: self.steps[2],
        })
    }

    /// Undo the trial step that is applied but not yet evaluated, if any.
    ///
    /// After stage one the gain carries `+step`, after a failed stage two it
    /// carries `-step`. The gain is put back to its value before the probe and
    /// the search restarts at stage one of the same coefficient. Steps and the
    /// best error are untouched.
    pub fn abandon_trial(&mut self) {
        let i = self.twiddle.coefficient.index();

        match self.twiddle.stage {
            TwiddleStage::One => return,
            TwiddleStage::Two => self.gains[i] -= self.steps[i],
            TwiddleStage::Three => self.gains[i] += self.steps[i],
        }

        debug!(
            "Abandoned {:?} trial at stage {:?}, gain back to {:.6}",
            self.twiddle.coefficient, self.twiddle.stage, self.gains[i]
        );

        self.twiddle.stage = TwiddleStage::One;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pid::{TuningRun, DEFAULT_STEPS};

    /// Feed one single-cycle segment with the given fitness.
    fn segment(pid: &mut PidController, mean_sq_err: f64) -> TwiddleRecord {
        *pid.run_mut() = TuningRun {
            cumulative_err: mean_sq_err,
            num_cycles: 1,
        };
        let rec = pid.twiddle_update().unwrap();
        pid.reset_run();
        rec
    }

    #[test]
    fn test_first_probe() {
        let mut pid = PidController::new(0.0, 0.0, 0.0);

        pid.update_error(1.0);
        pid.count_cycle();
        let rec = pid.twiddle_update().unwrap();

        assert_eq!(rec.mean_sq_err, 1.0);
        assert_eq!(rec.improved, None);
        assert_eq!(pid.twiddle_state().best_err(), 1.0);
        assert_eq!(pid.k_p(), DEFAULT_STEPS[0]);
        assert_eq!(pid.k_i(), 0.0);
        assert_eq!(pid.k_d(), 0.0);
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::Two);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Kp);
    }

    #[test]
    fn test_fitness_is_mean() {
        let mut pid = PidController::new(0.0, 0.0, 0.0);

        for cte in [1.0, 2.0, 3.0, 4.0].iter() {
            pid.update_error(*cte);
            pid.count_cycle();
        }

        assert_eq!(pid.twiddle_update().unwrap().mean_sq_err, 30.0 / 4.0);
    }

    #[test]
    fn test_empty_segment() {
        let mut pid = PidController::new(1.0, 2.0, 3.0);
        pid.update_error(4.0);
        let before = pid.clone();

        assert_eq!(pid.twiddle_update(), Err(TwiddleError::EmptySegment));
        assert_eq!(pid.gains(), before.gains());
        assert_eq!(pid.steps(), before.steps());
        assert_eq!(pid.twiddle_state(), before.twiddle_state());
    }

    #[test]
    fn test_plus_step_success() {
        let mut pid = PidController::with_steps([1.0, 0.0, 0.0], [0.5, 0.1, 0.2]);

        segment(&mut pid, 2.0);
        let rec = segment(&mut pid, 1.0);

        assert_eq!(rec.improved, Some(true));
        assert_eq!(pid.k_p(), 1.5);
        assert!((pid.step(Coefficient::Kp) - 0.55).abs() < 1e-12);
        assert_eq!(pid.twiddle_state().best_err(), 1.0);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Ki);
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::One);
    }

    #[test]
    fn test_equal_fitness_is_not_improvement() {
        let mut pid = PidController::with_steps([1.0, 0.0, 0.0], [0.5, 0.1, 0.2]);

        segment(&mut pid, 1.0);
        let rec = segment(&mut pid, 1.0);

        assert_eq!(rec.improved, Some(false));
        assert_eq!(pid.k_p(), 0.5);
        assert_eq!(pid.step(Coefficient::Kp), 0.5);
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::Three);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Kp);

        // Equal again on the -step trial falls back as well
        let rec = segment(&mut pid, 1.0);
        assert_eq!(rec.improved, Some(false));
        assert_eq!(pid.k_p(), 1.0);
    }

    #[test]
    fn test_minus_step_success() {
        let mut pid = PidController::with_steps([1.0, 0.0, 0.0], [0.5, 0.1, 0.2]);

        segment(&mut pid, 1.0);
        segment(&mut pid, 2.0);
        let rec = segment(&mut pid, 0.5);

        assert_eq!(rec.improved, Some(true));
        assert_eq!(pid.k_p(), 0.5);
        assert!((pid.step(Coefficient::Kp) - 0.55).abs() < 1e-12);
        assert_eq!(pid.twiddle_state().best_err(), 0.5);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Ki);
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::One);
    }

    #[test]
    fn test_double_failure_restores_gain() {
        let k_d = 0.123456789;
        let mut pid = PidController::with_steps([0.0, 0.0, k_d], DEFAULT_STEPS);

        // Move on to Kd with two successful Kp and Ki probes
        segment(&mut pid, 10.0);
        segment(&mut pid, 9.0);
        segment(&mut pid, 8.0);
        segment(&mut pid, 7.0);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Kd);

        segment(&mut pid, 1.0);
        segment(&mut pid, 1.5);
        let rec = segment(&mut pid, 2.0);

        assert_eq!(rec.improved, Some(false));
        assert!((pid.k_d() - k_d).abs() < 1e-12);
        assert!((pid.step(Coefficient::Kd) - DEFAULT_STEPS[2] * 0.9).abs() < 1e-12);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Kp);
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::One);
    }

    #[test]
    fn test_coefficient_cycle() {
        let mut pid = PidController::new(0.0, 0.0, 0.0);
        let mut visited = vec![];
        let mut err = 100.0;

        for _ in 0..4 {
            visited.push(pid.twiddle_state().coefficient());
            segment(&mut pid, err);
            segment(&mut pid, err - 1.0);
            err -= 2.0;
        }

        assert_eq!(
            visited,
            vec![
                Coefficient::Kp,
                Coefficient::Ki,
                Coefficient::Kd,
                Coefficient::Kp
            ]
        );
    }

    #[test]
    fn test_step_grows_on_every_success() {
        let mut pid = PidController::new(0.0, 0.0, 0.0);
        let mut err = 1000.0;
        let mut last_mag = pid.step(Coefficient::Kp).abs();

        for round in 1..=5 {
            for _ in Coefficient::ALL.iter() {
                segment(&mut pid, err);
                segment(&mut pid, err - 1.0);
                err -= 2.0;
            }

            let mag = pid.step(Coefficient::Kp).abs();
            assert!(mag > last_mag);
            let expected = DEFAULT_STEPS[0].abs() * STEP_GROWTH.powi(round);
            assert!((mag - expected).abs() < 1e-12);
            last_mag = mag;
        }
    }

    #[test]
    fn test_only_current_pair_changes() {
        let mut pid = PidController::with_steps([1.0, 2.0, 3.0], [0.1, 0.2, 0.3]);

        segment(&mut pid, 5.0);
        segment(&mut pid, 6.0);
        segment(&mut pid, 7.0);

        assert_eq!(pid.k_i(), 2.0);
        assert_eq!(pid.k_d(), 3.0);
        assert_eq!(pid.step(Coefficient::Ki), 0.2);
        assert_eq!(pid.step(Coefficient::Kd), 0.3);
    }

    #[test]
    fn test_abandon_trial() {
        let mut pid = PidController::with_steps([1.0, 2.0, 3.0], [0.5, 0.1, 0.2]);

        // Nothing pending on a fresh controller
        pid.abandon_trial();
        assert_eq!(pid.gains(), [1.0, 2.0, 3.0]);

        // Pending +step
        segment(&mut pid, 1.0);
        assert_eq!(pid.k_p(), 1.5);
        pid.abandon_trial();
        assert_eq!(pid.k_p(), 1.0);
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::One);
        assert_eq!(pid.twiddle_state().coefficient(), Coefficient::Kp);

        // Pending -step
        segment(&mut pid, 1.0);
        segment(&mut pid, 2.0);
        assert_eq!(pid.k_p(), 0.5);
        pid.abandon_trial();
        assert_eq!(pid.k_p(), 1.0);
        assert_eq!(pid.twiddle_state().stage(), TwiddleStage::One);
        assert_eq!(pid.steps(), [0.5, 0.1, 0.2]);
    }
}
