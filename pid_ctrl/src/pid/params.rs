//! PID controller parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::{PidController, DEFAULT_STEPS};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the PID controller
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// Initial proportional gain
    pub k_p: f64,

    /// Initial integral gain
    pub k_i: f64,

    /// Initial derivative gain
    pub k_d: f64,

    /// Initial twiddle step sizes in `[dp, di, dd]` order.
    ///
    /// If not given the defaults from a previous tuning run are used.
    #[serde(default = "default_steps")]
    pub steps: [f64; 3],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Build a controller from these parameters.
    pub fn build(&self) -> PidController {
        PidController::with_steps([self.k_p, self.k_i, self.k_d], self.steps)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn default_steps() -> [f64; 3] {
    DEFAULT_STEPS
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_steps() {
        let params: Params = util::params::from_str("k_p = 0.2\nk_i = 0.004\nk_d = 3.0\n").unwrap();

        assert_eq!(params.steps, DEFAULT_STEPS);

        let pid = params.build();
        assert_eq!(pid.gains(), [0.2, 0.004, 3.0]);
        assert_eq!(pid.steps(), DEFAULT_STEPS);
    }

    #[test]
    fn test_explicit_steps() {
        let params: Params = util::params::from_str(
            "k_p = 0.2\nk_i = 0.0\nk_d = 3.0\nsteps = [0.1, -0.001, 1.0]\n",
        )
        .unwrap();

        assert_eq!(params.build().steps(), [0.1, -0.001, 1.0]);
    }
}
