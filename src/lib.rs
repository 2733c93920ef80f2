//! # Aquasolve Core
//!
//! A chemical-equilibrium speciation solver for batches of independent cells
//! ("nodes"), such as those produced by reactive-transport simulations.
//!
//! This library provides:
//! - A text-based language for defining value cells, computed expressions and
//!   unknown/equation pairs
//! - A memoizing expression graph that makes repeated evaluation of thousands
//!   of interdependent quantities cheap
//! - A damped Newton-Raphson solver with mineral activation based on
//!   saturation indices
//! - A persistent worker pool distributing nodes over cloned solvers
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`dsl`] - Parser for the system definition language
//! - [`expr`] - Expression graph, value cells and memoization
//! - [`solver`] - Unknown/equation rows, Jacobian assembly and iteration
//! - [`calculator`] - One configured solver instance with node IO
//! - [`node`] - Node storage and the parallel node processor
//! - [`stop`] - Cooperative cancellation
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use aquasolve_core::{Calculator, MemoryOption, Node, NodeProcessor, NodeType, StopFlag};
//!
//! # fn main() -> aquasolve_core::Result<()> {
//! let calculator = Calculator::from_file("chemistry.inp".as_ref())?;
//!
//! let mut node_type = NodeType::new();
//! node_type.add_variable("tot_ca", 0.0, false, "input");
//! node_type.use_global_variables_from_calculator(&calculator);
//! let node_type = Arc::new(node_type);
//!
//! let mut nodes: Vec<Node> = (0..10_000).map(|_| Node::new(node_type.clone())).collect();
//!
//! let stop_flag = Arc::new(StopFlag::new());
//! let processor = NodeProcessor::new(&calculator, 0, stop_flag, &nodes)?;
//! processor.process_nodes(&mut nodes, MemoryOption::NodeValues);
//! # Ok(())
//! # }
//! ```
//!
//! ## Solution Method
//!
//! Each node calculation runs a two-level iteration:
//!
//! 1. The outer loop manages the discrete mineral state: rows representing
//!    mineral phases are switched on one at a time when supersaturated.
//! 2. The inner loop is damped Newton-Raphson on the active rows: residuals
//!    are evaluated through the memoized expression graph, the Jacobian is
//!    assembled by forward differences and solved in place by LU
//!    decomposition with partial pivoting and implicit scaling.

pub mod calculator;
pub mod dsl;
pub mod error;
pub mod expr;
pub mod node;
pub mod solver;
pub mod stop;

// Re-export main types for convenience
pub use calculator::Calculator;
pub use error::{AquasolveError, Result};
pub use node::processor::{MemoryOption, NodeProcessor};
pub use node::{Node, NodeType};
pub use stop::StopFlag;
