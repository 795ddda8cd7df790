//! # PID library.
//!
//! A PID controller with online twiddle tuning of its gains, the driver which
//! runs tuning over fixed-length run segments, and a lateral plant model to
//! tune against.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// PID controller - turns cross-track error into a corrective output and tunes its own gains
pub mod pid;

/// Simulation - a kinematic vehicle following a straight line
pub mod sim;

/// Tuning driver - runs twiddle segment by segment and decides when to stop
pub mod tuning;
