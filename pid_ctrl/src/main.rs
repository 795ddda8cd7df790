//! PID twiddle tuning executable entry point.
//!
//! # Architecture
//!
//! The executable closes the loop between the tuning driver and the lateral
//! plant:
//!
//!     - Initialise session, logging and parameters
//!     - Main loop:
//!         - Measure the plant's cross-track error
//!         - Tuning driver processing (PID output, twiddle on segment end)
//!         - Restart the plant if a segment completed, otherwise steer it
//!     - Archive every twiddle update and save the final gains

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use serde::Serialize;
use structopt::StructOpt;

// Internal
use pid_lib::{
    sim::{evaluate, LateralPlant, PlantParams},
    tuning::{TuningDriver, TuningMode},
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Log target of the controller's per-cycle error terms.
const CYCLE_LOG_TARGET: &str = "pid_lib::pid::controllers";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options
#[derive(Debug, StructOpt)]
#[structopt(name = "pid_exec", about = "Tune a PID controller on a lateral plant with twiddle")]
struct Opt {
    /// PID parameter file, relative to the parameters directory
    #[structopt(long, default_value = "pid_ctrl.toml")]
    pid_params: String,

    /// Tuning parameter file, relative to the parameters directory
    #[structopt(long, default_value = "tuning.toml")]
    tuning_params: String,

    /// Plant parameter file, relative to the parameters directory
    #[structopt(long, default_value = "plant.toml")]
    plant_params: String,

    /// Maximum number of control cycles to run
    #[structopt(long, default_value = "20000")]
    cycles: u64,

    /// Run the controller without tuning it
    #[structopt(long)]
    no_tune: bool,

    /// Minimum log level
    #[structopt(long, default_value = "debug")]
    log_level: LevelFilter,

    /// Log level of the controller's per-cycle error output
    #[structopt(long, default_value = "debug")]
    cycle_log_level: LevelFilter,
}

/// Summary saved at the end of the session.
#[derive(Debug, Serialize)]
struct FinalGains {
    k_p: f64,
    k_i: f64,
    k_d: f64,
    steps: [f64; 3],
    num_updates: u64,
    mode: TuningMode,

    /// Fitness of the final gains over one segment, if it could be computed
    mean_sq_err: Option<f64>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("pid_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(
        opt.log_level,
        &[(CYCLE_LOG_TARGET, opt.cycle_log_level)],
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    info!("PID Twiddle Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS AND INITIALISE MODULES ----

    let mut driver = TuningDriver::from_param_files(&opt.pid_params, &opt.tuning_params)
        .wrap_err("Failed to initialise the tuning driver")?;
    let plant_params: PlantParams =
        params::load(&opt.plant_params).wrap_err("Could not load plant params")?;

    info!("Parameters loaded");

    if opt.no_tune {
        driver.stop_tuning();
    }

    let segment_cycles = driver.params().segment_cycles;

    let mut plant = LateralPlant::new(plant_params.clone());

    let mut archiver =
        Archiver::from_path(&session, "twiddle.csv").wrap_err("Failed to create twiddle archive")?;

    info!(
        "Initial gains: k_p = {}, k_i = {}, k_d = {}",
        driver.controller().k_p(),
        driver.controller().k_i(),
        driver.controller().k_d()
    );
    info!("Starting in {:?} mode\n", driver.mode());

    // ---- MAIN LOOP ----

    let mut mode = driver.mode();

    for cycle in 0..opt.cycles {
        let (output, report) = driver
            .proc(&plant.cte())
            .wrap_err_with(|| format!("Tuning driver failed on cycle {}", cycle))?;

        if let Some(record) = report.twiddle_record {
            archiver
                .serialise(record)
                .wrap_err("Failed to archive twiddle update")?;
        }

        // Each twiddle trial starts from the same initial conditions
        if report.segment_complete {
            plant.reset();
            driver.reset_segment();
        } else {
            plant.step(-output);
        }

        if report.mode != mode {
            info!("Mode changed to {:?} on cycle {}", report.mode, cycle);
            mode = report.mode;

            if let TuningMode::Finished(_) = mode {
                break;
            }
        }
    }

    if mode == TuningMode::Tuning {
        warn!("Cycle budget of {} exhausted while still tuning", opt.cycles);
    }

    // ---- SHUTDOWN ----

    let ctrl = driver.controller();
    let summary = FinalGains {
        k_p: ctrl.k_p(),
        k_i: ctrl.k_i(),
        k_d: ctrl.k_d(),
        steps: ctrl.steps(),
        num_updates: driver.num_updates(),
        mode,
        mean_sq_err: evaluate(ctrl.gains(), &plant_params, segment_cycles),
    };

    info!(
        "Final gains: k_p = {}, k_i = {}, k_d = {}",
        summary.k_p, summary.k_i, summary.k_d
    );
    info!("Final steps: {:?}", summary.steps);
    info!("Final segment error: {:?}", summary.mean_sq_err);

    session
        .save("final_gains.json", &summary)
        .wrap_err("Failed to save final gains")?;

    info!("End of execution");

    Ok(())
}
