//! Tuning driver parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the tuning driver
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// If false the driver acts as a plain PID controller and never twiddles.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of control cycles in one run segment, i.e. one twiddle trial.
    pub segment_cycles: u64,

    /// Maximum number of twiddle updates before tuning stops. Unlimited if
    /// not given.
    #[serde(default)]
    pub max_twiddle_updates: Option<u64>,

    /// Tuning stops once the sum of the step magnitudes drops below this
    /// value.
    pub step_tolerance: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}
