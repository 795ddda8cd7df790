//! # Tuning driver module
//!
//! The tuning driver owns a PID controller and runs twiddle on it. Each cycle
//! it feeds the CTE into the controller and returns the controller output.
//! Every `segment_cycles` cycles the run segment is complete: twiddle consumes
//! its mean squared CTE, the run accumulator is reset and the status report
//! flags the completed segment so the caller can restart the controlled system
//! for the next trial.
//!
//! Tuning stops when the step sizes have shrunk below the tolerance or the
//! update budget is spent. The driver then keeps controlling with the final
//! gains.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::Params;
pub use state::*;
