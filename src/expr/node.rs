//! Expression node representation.
//!
//! Nodes live in a flat arena ([`ExprArena`]) and reference each other by
//! index, so the whole graph is a pair of `Vec`s with no pointer chasing
//! beyond an index lookup. Variadic nodes (`Plus`, function calls) keep their
//! children in a shared argument buffer addressed by an [`ArgRange`].
//!
//! All variants are `Copy`; evaluation fetches a node by value and recurses
//! on child indices, which keeps the evaluator free of borrow juggling.

use super::vars::VarId;

/// Index of an expression node in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a memoization cell in the variable group's memo table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoId(pub(crate) u32);

impl MemoId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A contiguous run of child indices in the arena's argument buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRange {
    first: u32,
    len: u32,
}

impl ArgRange {
    /// Number of arguments in the range.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True if the range holds no arguments.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Positions of this range in the argument buffer.
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.first as usize..(self.first + self.len) as usize
    }
}

/// An arithmetic or logical expression node.
///
/// Non-memo nodes are owned by exactly one parent; a `Memo` may be shared by
/// any number of parents and is the only point where the tree becomes a DAG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr {
    /// A literal value
    Constant(f64),
    /// Reference to a value cell
    Var(VarId),
    /// Multi-operand sum (binary after parse, widened by optimization)
    Plus(ArgRange),
    /// Subtraction
    Minus(ExprId, ExprId),
    /// Multiplication
    Times(ExprId, ExprId),
    /// Division
    Divide(ExprId, ExprId),
    /// Exponentiation
    Power(ExprId, ExprId),
    /// Unary negation
    Negate(ExprId),
    /// Built-in function or comparison/logical operator
    Function(FuncKind, ArgRange),
    /// Cached subexpression
    Memo(MemoId),
}

/// Built-in function and operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    Exp,
    Log,
    Log10,
    Abs,
    Sqrt,
    Min,
    Max,
    If,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
}

impl FuncKind {
    /// Look up a function by its name in the input language.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Self::Exp),
            "log" | "ln" => Some(Self::Log),
            "log10" => Some(Self::Log10),
            "abs" => Some(Self::Abs),
            "sqrt" => Some(Self::Sqrt),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "if" => Some(Self::If),
            _ => None,
        }
    }

    /// Number of arguments the function takes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Exp | Self::Log | Self::Log10 | Self::Abs | Self::Sqrt | Self::Not => 1,
            Self::Min
            | Self::Max
            | Self::Lt
            | Self::Gt
            | Self::Le
            | Self::Ge
            | Self::Eq
            | Self::Ne
            | Self::And
            | Self::Or => 2,
            Self::If => 3,
        }
    }
}

/// One memoization cell.
///
/// The cached value is valid exactly when `needs_evaluation` is false; writing
/// any upstream value cell re-arms the flag through the cell's dependent list.
#[derive(Debug, Clone)]
pub struct MemoCell {
    pub(crate) child: ExprId,
    /// Structural links created during parse (the owning cell plus each
    /// expression that references the cell). A memo with at most one
    /// reference is elided by optimization.
    pub(crate) refs: u32,
    pub(crate) needs_evaluation: bool,
    pub(crate) last_value: f64,
    pub(crate) optimized: bool,
}

impl MemoCell {
    pub(crate) fn new(child: ExprId) -> Self {
        Self {
            child,
            refs: 1,
            needs_evaluation: true,
            last_value: 0.0,
            optimized: false,
        }
    }
}

/// Flat storage for expression nodes and their argument lists.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
    args: Vec<ExprId>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, returning its index.
    pub fn push(&mut self, node: Expr) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Append an argument list, returning the covering range.
    pub fn push_args(&mut self, children: &[ExprId]) -> ArgRange {
        let first = self.args.len() as u32;
        self.args.extend_from_slice(children);
        ArgRange {
            first,
            len: children.len() as u32,
        }
    }

    /// Fetch a node by value.
    pub fn node(&self, id: ExprId) -> Expr {
        self.nodes[id.index()]
    }

    /// Overwrite a node in place (used by the optimizer).
    pub fn set(&mut self, id: ExprId, node: Expr) {
        self.nodes[id.index()] = node;
    }

    /// Fetch the argument at absolute position `pos` in the argument buffer.
    pub fn arg_at(&self, pos: usize) -> ExprId {
        self.args[pos]
    }

    /// Fetch the `k`-th argument of a range.
    pub fn arg(&self, range: ArgRange, k: usize) -> ExprId {
        debug_assert!(k < range.len());
        self.args[range.first as usize + k]
    }

    /// Overwrite the argument at absolute position `pos`.
    pub fn set_arg(&mut self, pos: usize, child: ExprId) {
        self.args[pos] = child;
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_func_lookup() {
        assert_eq!(FuncKind::from_name("exp"), Some(FuncKind::Exp));
        assert_eq!(FuncKind::from_name("ln"), Some(FuncKind::Log));
        assert_eq!(FuncKind::from_name("if"), Some(FuncKind::If));
        assert_eq!(FuncKind::from_name("nope"), None);
    }

    #[test]
    fn test_arity() {
        assert_eq!(FuncKind::Exp.arity(), 1);
        assert_eq!(FuncKind::Min.arity(), 2);
        assert_eq!(FuncKind::If.arity(), 3);
    }

    #[test]
    fn test_arena_args() {
        let mut arena = ExprArena::new();
        let a = arena.push(Expr::Constant(1.0));
        let b = arena.push(Expr::Constant(2.0));
        let r = arena.push_args(&[a, b]);
        assert_eq!(r.len(), 2);
        assert_eq!(arena.arg(r, 0), a);
        assert_eq!(arena.arg(r, 1), b);
    }
}
