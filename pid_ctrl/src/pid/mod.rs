//! # PID control module
//!
//! The PID controller turns the cross-track error (CTE) measured each cycle
//! into a corrective output:
//!
//! ```text
//! output = k_p * p + k_i * i + k_d * d
//! ```
//!
//! where `p` is the latest CTE, `i` the sum of all CTEs since initialisation
//! and `d` the difference between the latest and previous CTE. No time step
//! is involved, the controller assumes a fixed cycle period.
//!
//! The gains are tuned online by twiddle (see the `twiddle` module) which uses
//! the mean squared CTE over a run segment as its fitness signal.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod controllers;
pub mod params;
pub mod twiddle;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use controllers::*;
pub use params::Params;
pub use twiddle::*;
