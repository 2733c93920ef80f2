//! Expression graph with memoized re-evaluation.
//!
//! Parsed expressions form a DAG of arithmetic/logical nodes stored in a flat
//! arena owned by the [`VarGroup`]. Cells that are computed by an expression
//! are wrapped in a memoization node; other expressions referencing such a
//! cell share the memo, so a subexpression used by many equations is evaluated
//! once per change of its inputs.
//!
//! The lifecycle is: parse builds the graph, a single optimization pass folds
//! constants, fuses `+` chains and elides useless memos, and a registration
//! pass wires every value cell to the set of memos that must be re-armed when
//! it is written. After that, [`VarGroup::set_value`] and [`VarGroup::eval`]
//! are the only operations used during iteration.

pub mod node;
pub mod vars;

pub use node::{Expr, ExprId, FuncKind, MemoId};
pub use vars::{Var, VarGroup, VarId};
