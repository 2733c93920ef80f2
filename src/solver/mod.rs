//! Nonlinear equilibrium solver.
//!
//! This module provides the numerical engine of the calculator: a two-level
//! iteration over a set of unknown/equation rows.
//!
//! ## Iteration structure
//!
//! ```text
//! iterate
//!     iterate_level_minerals      outer loop over mineral activation state
//!         iterate_level_0         damped Newton-Raphson on the active set
//! ```
//!
//! The inner loop assembles a dense Jacobian by forward differences (one
//! column per active unknown, reusing equation evaluations through the
//! expression memos), solves `J · Δ = r` in place by LU decomposition with
//! partial pivoting and implicit scaling, and applies a damped update. The
//! outer loop switches supersaturated mineral rows into the active set one at
//! a time until the composition is stable.

mod group;
mod uneq;

pub use group::UnEqGroup;
pub use uneq::UnEq;

/// Maximum inner Newton-Raphson iterations per activation state.
pub const MAX_ITERATIONS: usize = 100;

/// Lower bound on outer (mineral) iterations; the actual bound is
/// `max(OUTER_ITERATION_FLOOR, number of mineral rows)`.
pub const OUTER_ITERATION_FLOOR: usize = 50;

/// Residual tolerance used when the input declares no `tolerance` cell.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Absolute floor under the effective tolerance.
pub const TOLERANCE_FLOOR: f64 = 1e-15;

/// Smallest damping factor a single row may impose on the whole step.
pub const MIN_COMMON_FACTOR: f64 = 1e-5;

/// Replacement for an exactly zero pivot during LU decomposition.
pub const SINGULAR_NUDGE: f64 = 1e-30;

/// Start value given to a mineral unknown when it is switched on.
pub const MINERAL_SEED: f64 = 1e-3;

/// Value written to `minTol` the first time a mineral is activated.
pub const MINERAL_MIN_TOL: f64 = 1e-3;

/// Default forward-difference offset for Jacobian columns.
pub const DEFAULT_UN_DELTA: f64 = 1e-6;

/// Largest absolute change of an unknown in one Newton step.
pub const MAX_ABS_STEP: f64 = 10.0;

/// Largest relative change of a nonzero unknown in one Newton step.
pub const MAX_STEP_RATIO: f64 = 10.0;
