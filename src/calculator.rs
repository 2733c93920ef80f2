//! One configured solver instance.
//!
//! A [`Calculator`] owns a variable group (with the optimized expression
//! graph) and an unknown/equation group, and connects them to [`Node`]
//! storage: node values are copied into the cells, the solver iterates, and
//! computed values are copied back. The node-to-cell mapping is built lazily
//! on the first calculation for a node type, which is why a calculator's
//! first call is noticeably slower than the rest.

use std::path::Path;
use std::sync::Arc;

use crate::dsl::{self, Decl, UnEqDef};
use crate::error::{AquasolveError, Result};
use crate::expr::{VarGroup, VarId};
use crate::node::{Node, NodeType};
use crate::solver::{UnEq, UnEqGroup};
use crate::stop::StopFlag;

/// Mapping between a node type's slots and the calculator's cells.
#[derive(Debug)]
struct NodeIo {
    node_type: Arc<NodeType>,
    /// Pairs copied node → cell on input (constants are skipped)
    to_local: Vec<(VarId, usize)>,
    /// Pairs copied cell → node on output (equation cells are skipped)
    to_global: Vec<(VarId, usize)>,
    /// Node indices of the solver unknowns, for warm starts
    unknown_indices: Vec<usize>,
}

/// A chemical-equilibrium solver built from a system definition.
#[derive(Debug)]
pub struct Calculator {
    /// The expanded input text the calculator was built from; clones re-parse
    /// this so every clone owns a structurally independent expression graph.
    source: String,
    vars: VarGroup,
    uneqs: UnEqGroup,
    io: Option<NodeIo>,
    /// Cell receiving the iteration count after each calculation, if declared
    tot_iter_var: Option<VarId>,
    /// Snapshot of the last successfully computed node, for warm starts
    last_successful: Option<Node>,
}

impl Calculator {
    /// Build a calculator from a system definition string.
    pub fn from_text(text: &str) -> Result<Self> {
        let ast = dsl::parse(text)?;
        let mut vars = VarGroup::new();
        let mut uneqs = UnEqGroup::new();
        let mut pending: Vec<UnEqDef> = Vec::new();

        for decl in &ast.decls {
            match decl {
                Decl::Var {
                    name,
                    value,
                    constant,
                    ..
                } => {
                    vars.declare(name, *value, *constant);
                }
                Decl::Global { name, value, .. } => {
                    let id = match value {
                        Some(v) => vars.declare(name, *v, false),
                        None => vars.get_or_declare(name, 0.0),
                    };
                    vars.mark_global(id);
                }
                Decl::Alias {
                    synonym, target, ..
                } => {
                    vars.create_synonym(synonym, target)?;
                }
                Decl::Calc { name, expr, line } => {
                    let id = vars.get_or_declare(name, 0.0);
                    let compiled = vars.compile(expr, *line)?;
                    vars.set_expression(id, compiled);
                }
                Decl::UnEq(def) => pending.push(def.clone()),
            }
        }

        // rows are resolved after all declarations so an equation may be
        // declared below the row that uses it
        for def in &pending {
            let unknown = vars
                .get(&def.unknown)
                .ok_or_else(|| AquasolveError::UnknownIdentifier {
                    name: def.unknown.clone(),
                    line: def.line,
                })?;
            let equation = vars
                .get(&def.equation)
                .ok_or_else(|| AquasolveError::UnknownIdentifier {
                    name: def.equation.clone(),
                    line: def.line,
                })?;
            if vars.var(unknown).has_expression() {
                return Err(AquasolveError::read(format!(
                    "unknown '{}' is computed by an expression and cannot be iterated",
                    def.unknown
                )));
            }
            let si = match &def.si_variable {
                Some(name) => Some(vars.get(name).ok_or_else(|| {
                    AquasolveError::UnknownIdentifier {
                        name: name.clone(),
                        line: def.line,
                    }
                })?),
                None => None,
            };
            vars.mark_unknown(unknown);
            vars.mark_equation(equation);
            uneqs.add(
                &vars,
                UnEq::new(unknown, equation, si, def.delta, def.initially_inactive),
            )?;
        }

        vars.optimize_expressions();
        let tot_iter_var = vars.get("tot_nr_iter");

        Ok(Self {
            source: text.to_string(),
            vars,
            uneqs,
            io: None,
            tot_iter_var,
            last_successful: None,
        })
    }

    /// Build a calculator from a system definition file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AquasolveError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_text(&content)
    }

    /// Build a calculator from a file with extra definition text prepended,
    /// e.g. host-code variables the input file does not know about.
    pub fn from_file_with_extra(path: &Path, extra_text: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AquasolveError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut text = String::with_capacity(extra_text.len() + content.len() + 1);
        text.push_str(extra_text);
        text.push('\n');
        text.push_str(&content);
        Self::from_text(&text)
    }

    /// Create an independent copy suitable for parallel use.
    ///
    /// The stored input text is re-parsed, so the clone owns its own
    /// expression graph and memo state; given identical input nodes the clone
    /// produces bitwise identical results.
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_text(&self.source)
    }

    /// The variable group of this calculator.
    pub fn var_group(&self) -> &VarGroup {
        &self.vars
    }

    /// The unknown/equation group of this calculator.
    pub fn uneq_group(&self) -> &UnEqGroup {
        &self.uneqs
    }

    /// Names and current values of the cells a node should store for this
    /// calculator: all global cells plus all solver unknowns.
    pub fn storage_requirements(&self) -> Vec<(String, f64)> {
        let mut out = Vec::new();
        for id in self.vars.ids() {
            let var = self.vars.var(id);
            if var.global || var.is_unknown {
                out.push((var.name.clone(), var.value()));
            }
        }
        out
    }

    /// Names of the global cells, in declaration order.
    pub fn global_variable_names(&self) -> Vec<String> {
        self.vars
            .ids()
            .filter(|&id| self.vars.var(id).global)
            .map(|id| self.vars.name(id).to_string())
            .collect()
    }

    /// True if any initially-inactive row is currently switched off.
    pub fn iia_present(&self) -> bool {
        self.uneqs.iia_present()
    }

    /// Switch every initially-inactive row into the active set. The change
    /// persists across calculations until switched off again.
    pub fn switch_on_iia(&mut self) {
        self.uneqs.switch_on_iia(&self.vars);
    }

    /// Switch every initially-inactive row out of the active set.
    pub fn switch_off_iia(&mut self) {
        self.uneqs.switch_off_iia(&self.vars);
    }

    /// Replace the warm-start template.
    pub fn set_last_successful(&mut self, node: Node) {
        self.last_successful = Some(node);
    }

    /// The warm-start template, if a calculation has succeeded.
    pub fn last_successful(&self) -> Option<&Node> {
        self.last_successful.as_ref()
    }

    /// Copy the solver-unknown slots from one node to another.
    pub fn copy_unknowns(&self, src: &Node, dst: &mut Node) {
        if let Some(io) = &self.io {
            for &idx in &io.unknown_indices {
                dst.set_value(idx, src.get_value(idx));
            }
        }
    }

    fn ensure_io(&mut self, node_type: &Arc<NodeType>) {
        let up_to_date = matches!(&self.io, Some(io) if Arc::ptr_eq(&io.node_type, node_type));
        if !up_to_date {
            self.io = Some(self.build_io(node_type.clone()));
        }
    }

    fn build_io(&self, node_type: Arc<NodeType>) -> NodeIo {
        let mut used: Vec<VarId> = Vec::new();
        let mut to_local = Vec::new();
        let mut to_global = Vec::new();
        let mut unknown_indices = Vec::new();

        for (i, name) in node_type.names().iter().enumerate() {
            let Some(id) = self.vars.get(name) else {
                continue;
            };
            // synonyms can map several slots onto one cell; the first wins
            if used.contains(&id) {
                continue;
            }
            used.push(id);
            let var = self.vars.var(id);
            if !var.constant {
                to_local.push((id, i));
            }
            if !var.is_equation {
                to_global.push((id, i));
            }
            if var.is_unknown {
                unknown_indices.push(i);
            }
        }

        NodeIo {
            node_type,
            to_local,
            to_global,
            unknown_indices,
        }
    }

    /// Solve one node: copy its values in, iterate, copy results back.
    ///
    /// Returns true on convergence. On failure the node holds the last
    /// iterate; peer nodes of a batch are unaffected.
    pub fn calculate(&mut self, node: &mut Node, flag: Option<&StopFlag>) -> bool {
        self.ensure_io(node.node_type());
        let io = match &self.io {
            Some(io) => io,
            None => return false,
        };

        for &(id, idx) in &io.to_local {
            let v = node.get_value(idx);
            self.vars.set_value(id, v);
            self.vars.set_ini_value(id, v);
        }

        let success = self.uneqs.iterate(&mut self.vars, flag);

        if let Some(id) = self.tot_iter_var {
            let total = self.uneqs.total_nr_iter() as f64;
            self.vars.set_value(id, total);
        }

        for &(id, idx) in &io.to_global {
            let v = self.vars.value(id);
            node.set_value(idx, v);
        }

        if success {
            self.last_successful = Some(node.clone());
        }
        success
    }

    /// Solve one node, seeding the unknowns from the last successful
    /// calculation instead of the node's own values.
    pub fn calculate_with_warm(&mut self, node: &mut Node, flag: Option<&StopFlag>) -> bool {
        self.ensure_io(node.node_type());
        if let (Some(io), Some(template)) = (&self.io, &self.last_successful) {
            if Arc::ptr_eq(template.node_type(), node.node_type()) {
                for &idx in &io.unknown_indices {
                    node.set_value(idx, template.get_value(idx));
                }
            }
        }
        self.calculate(node, flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE_SYSTEM: &str = "\
.var tolerance 1e-12
.var x 1
.calc f = x * x - 9
.uneq x f
";

    fn node_for(calc: &Calculator) -> Node {
        let mut node_type = NodeType::new();
        node_type.use_global_variables_from_calculator(calc);
        Node::new(Arc::new(node_type))
    }

    #[test]
    fn test_mineral_activation() {
        // the mineral row starts switched off (initial amount below zero) and
        // is activated once the rest of the system makes it supersaturated
        let system = "\
.var tolerance 1e-10
.var x -1
.var y 0
.calc eq_y = y - 2
.calc si = y - 1
.calc eq_min = x + y - 3
.uneq y eq_y
.uneq3 x eq_min si
";
        let mut calc = Calculator::from_text(system).unwrap();
        let mut node = node_for(&calc);
        let x_idx = node.node_type().index("x").unwrap();
        assert!((node.get_value(x_idx) + 1.0).abs() < 1e-12);

        assert!(calc.calculate(&mut node, None));

        let mineral = calc
            .uneq_group()
            .uneqs()
            .iter()
            .find(|u| u.is_type3)
            .expect("mineral row");
        assert!(mineral.active);
        assert!(
            (node.get_value(x_idx) - 1.0).abs() < 1e-6,
            "x = {}",
            node.get_value(x_idx)
        );
    }

    #[test]
    fn test_calculate_is_idempotent() {
        let mut calc = Calculator::from_text(SQUARE_SYSTEM).unwrap();
        let mut node = node_for(&calc);
        assert!(calc.calculate(&mut node, None));
        let first: Vec<f64> = node.values().to_vec();

        assert!(calc.calculate(&mut node, None));
        for (a, b) in first.iter().zip(node.values()) {
            assert!((a - b).abs() < 1e-12, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_warm_start_seeds_unknowns() {
        let mut calc = Calculator::from_text(SQUARE_SYSTEM).unwrap();
        let mut node_type = NodeType::new();
        node_type.use_global_variables_from_calculator(&calc);
        let node_type = Arc::new(node_type);
        let x_idx = node_type.index("x").unwrap();

        // converge from a positive start estimate: root +3
        let mut warm_node = Node::new(node_type.clone());
        assert!(calc.calculate(&mut warm_node, None));
        assert!((warm_node.get_value(x_idx) - 3.0).abs() < 1e-8);

        // a cold start from -1 finds the negative root
        let mut cold = Node::new(node_type.clone());
        cold.set_value(x_idx, -1.0);
        let mut cold_copy = cold.clone();
        let mut cold_calc = calc.try_clone().unwrap();
        assert!(cold_calc.calculate(&mut cold_copy, None));
        assert!((cold_copy.get_value(x_idx) + 3.0).abs() < 1e-8);

        // the warm start overrides the node's estimate with the template
        assert!(calc.calculate_with_warm(&mut cold, None));
        assert!((cold.get_value(x_idx) - 3.0).abs() < 1e-8);
    }

    #[test]
    fn test_clone_produces_bitwise_identical_results() {
        let mut calc = Calculator::from_text(SQUARE_SYSTEM).unwrap();
        let mut clone = calc.try_clone().unwrap();

        let mut node_a = node_for(&calc);
        let mut node_b = node_a.clone();
        assert!(calc.calculate(&mut node_a, None));
        assert!(clone.calculate(&mut node_b, None));

        for (a, b) in node_a.values().iter().zip(node_b.values()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_copy_unknowns() {
        let mut calc = Calculator::from_text(SQUARE_SYSTEM).unwrap();
        let mut node = node_for(&calc);
        assert!(calc.calculate(&mut node, None));
        let x_idx = node.node_type().index("x").unwrap();

        let mut other = Node::new(node.node_type().clone());
        calc.copy_unknowns(&node, &mut other);
        assert_eq!(
            node.get_value(x_idx).to_bits(),
            other.get_value(x_idx).to_bits()
        );
    }

    #[test]
    fn test_initially_inactive_switching() {
        let system = "\
.var tolerance 1e-10
.var x 0
.var y 0
.calc f1 = x - 2
.calc f2 = y - 7
.uneq x f1
.uneq y f2 inactive
";
        let mut calc = Calculator::from_text(system).unwrap();
        let mut node_type = NodeType::new();
        node_type.use_global_variables_from_calculator(&calc);
        let node_type = Arc::new(node_type);
        let x_idx = node_type.index("x").unwrap();
        let y_idx = node_type.index("y").unwrap();

        // the inactive row is skipped: y keeps its input value
        let mut node = Node::new(node_type.clone());
        assert!(calc.iia_present());
        assert!(calc.calculate(&mut node, None));
        assert!((node.get_value(x_idx) - 2.0).abs() < 1e-9);
        assert!(node.get_value(y_idx).abs() < 1e-12);

        // switched on, the row participates and y is solved
        calc.switch_on_iia();
        assert!(!calc.iia_present());
        let mut node = Node::new(node_type.clone());
        assert!(calc.calculate(&mut node, None));
        assert!((node.get_value(x_idx) - 2.0).abs() < 1e-9);
        assert!((node.get_value(y_idx) - 7.0).abs() < 1e-9);

        // and off again: the row sits out of later calculations
        calc.switch_off_iia();
        assert!(calc.iia_present());
        let mut node = Node::new(node_type);
        assert!(calc.calculate(&mut node, None));
        assert!(node.get_value(y_idx).abs() < 1e-12);
    }

    #[test]
    fn test_expression_backed_unknown_rejected() {
        let system = "\
.calc x = 1 + 1
.calc f = x - 1
.uneq x f
";
        assert!(Calculator::from_text(system).is_err());
    }

    #[test]
    fn test_missing_equation_rejected() {
        let system = "\
.var x 0
.uneq x missing_eq
";
        assert!(Calculator::from_text(system).is_err());
    }
}
