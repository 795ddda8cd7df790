//! Tuning driver state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Serialize;

// Internal
use super::Params;
use crate::pid::{self, PidController, TwiddleError, TwiddleRecord};
use util::{module::State, params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Runs twiddle over a PID controller, one run segment at a time.
pub struct TuningDriver {
    params: Params,

    /// Executing mode
    mode: TuningMode,

    /// The controller being tuned
    controller: PidController,

    /// Number of twiddle updates performed so far
    num_updates: u64,
}

/// Data required to initialise the driver.
#[derive(Debug, Clone)]
pub struct InitData {
    pub pid_params: pid::Params,
    pub tuning_params: Params,
}

/// The status report of one driver cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusReport {
    /// Mode of the driver at the end of the cycle
    pub mode: TuningMode,

    /// True if this cycle completed a run segment. The controlled system
    /// should be restarted before the next cycle.
    pub segment_complete: bool,

    /// The twiddle update performed this cycle, if any
    pub twiddle_record: Option<TwiddleRecord>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur in the tuning driver.
#[derive(Debug, thiserror::Error)]
pub enum TuningError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(params::LoadError),

    /// A run segment must contain at least one cycle to have a fitness.
    #[error("The number of cycles per segment must be greater than zero")]
    ZeroSegmentCycles,

    #[error("Twiddle update failed: {0}")]
    TwiddleError(TwiddleError),
}

/// The possible modes of the tuning driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum TuningMode {
    /// Tuning disabled, plain PID control
    Off,

    /// Twiddle is running
    Tuning,

    /// Tuning has stopped, plain PID control with the tuned gains
    Finished(FinishCause),
}

/// Why tuning stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum FinishCause {
    /// The step sizes dropped below the tolerance
    Converged,

    /// The maximum number of twiddle updates was reached
    BudgetExhausted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for TuningDriver {
    type InitData = InitData;
    type InitError = TuningError;

    type InputData = f64;
    type OutputData = f64;
    type StatusReport = StatusReport;
    type ProcError = TuningError;

    /// Initialise the driver.
    ///
    /// The controller is built from the PID parameters. If tuning is enabled
    /// the driver starts in `Tuning` mode, unless the initial steps are
    /// already below the tolerance.
    fn init(init_data: InitData) -> Result<Self, TuningError> {
        if init_data.tuning_params.segment_cycles == 0 {
            return Err(TuningError::ZeroSegmentCycles);
        }

        let controller = init_data.pid_params.build();

        let mut driver = Self {
            params: init_data.tuning_params,
            mode: TuningMode::Off,
            controller,
            num_updates: 0,
        };

        if driver.params.enabled {
            driver.start_tuning();
        }

        Ok(driver)
    }

    /// Process one control cycle.
    ///
    /// The input is the latest CTE, the output the controller output for it.
    fn proc(&mut self, cte: &f64) -> Result<(f64, StatusReport), TuningError> {
        self.controller.update_error(*cte);
        let output = self.controller.total_error();

        let twiddle_record = match self.mode {
            TuningMode::Tuning => self.mode_tuning()?,
            TuningMode::Off | TuningMode::Finished(_) => None,
        };

        Ok((
            output,
            StatusReport {
                mode: self.mode,
                segment_complete: twiddle_record.is_some(),
                twiddle_record,
            },
        ))
    }
}

impl TuningDriver {
    /// Initialise the driver from the given parameter files, relative to the
    /// parameters directory.
    pub fn from_param_files(pid_path: &str, tuning_path: &str) -> Result<Self, TuningError> {
        let pid_params = params::load(pid_path).map_err(TuningError::ParamLoadError)?;
        let tuning_params = params::load(tuning_path).map_err(TuningError::ParamLoadError)?;

        Self::init(InitData {
            pid_params,
            tuning_params,
        })
    }

    /// Begin (or resume) tuning from a fresh run segment.
    ///
    /// Tuning finishes straight away if the steps are already below the
    /// tolerance.
    pub fn start_tuning(&mut self) {
        self.controller.reset_run();
        self.mode = TuningMode::Tuning;
        self.check_finished();
    }

    /// Stop tuning, keeping the current gains.
    pub fn stop_tuning(&mut self) {
        if self.mode == TuningMode::Tuning {
            info!("Tuning stopped after {} twiddle updates", self.num_updates);
            self.mode = TuningMode::Off;
        }
    }

    /// Clear the controller error terms ready for a restarted trial.
    pub fn reset_segment(&mut self) {
        self.controller.reset_errors();
    }

    pub fn mode(&self) -> TuningMode {
        self.mode
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    pub fn controller(&self) -> &PidController {
        &self.controller
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Mode tuning.
    ///
    /// Counts the cycle into the run segment and, once the segment is
    /// complete, runs the twiddle update for it.
    fn mode_tuning(&mut self) -> Result<Option<TwiddleRecord>, TuningError> {
        self.controller.count_cycle();

        if self.controller.run().num_cycles < self.params.segment_cycles {
            return Ok(None);
        }

        let record = self
            .controller
            .twiddle_update()
            .map_err(TuningError::TwiddleError)?;
        self.controller.reset_run();
        self.num_updates += 1;

        info!(
            "Twiddle update {}: {:?} stage {:?}, err = {:.6} (best {:.6})",
            self.num_updates, record.coefficient, record.stage, record.mean_sq_err, record.best_err
        );
        info!(
            "    gains = [{:.6}, {:.6}, {:.6}], steps = [{:.6}, {:.6}, {:.6}]",
            record.k_p, record.k_i, record.k_d, record.dp, record.di, record.dd
        );

        self.check_finished();

        Ok(Some(record))
    }

    /// Move to `Finished` if a stopping condition has been met.
    ///
    /// Steps only change when a coefficient is finished, so convergence is
    /// always detected between trials. The budget can run out mid-trial, in
    /// which case the pending trial step is removed from the gain.
    fn check_finished(&mut self) {
        let step_mag = self.controller.step_magnitude();

        if step_mag < self.params.step_tolerance {
            info!(
                "Twiddle converged: step magnitude {:.6} below tolerance {:.6}",
                step_mag, self.params.step_tolerance
            );
            self.mode = TuningMode::Finished(FinishCause::Converged);
        } else if let Some(max) = self.params.max_twiddle_updates {
            if self.num_updates >= max {
                warn!(
                    "Twiddle budget of {} updates exhausted with step magnitude {:.6}",
                    max, step_mag
                );
                // Keep only gains which have been evaluated
                self.controller.abandon_trial();
                self.mode = TuningMode::Finished(FinishCause::BudgetExhausted);
            }
        }
    }
}
