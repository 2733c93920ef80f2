//! The solver core: active-set management, Jacobian assembly, LU solve and
//! the outer mineral-activation loop.

use log::{debug, warn};

use crate::error::{AquasolveError, Result};
use crate::expr::{VarGroup, VarId};
use crate::stop::StopFlag;

use super::uneq::UnEq;
use super::{
    DEFAULT_TOLERANCE, MAX_ITERATIONS, MINERAL_MIN_TOL, MINERAL_SEED, MIN_COMMON_FACTOR,
    OUTER_ITERATION_FLOOR, SINGULAR_NUDGE, TOLERANCE_FLOOR,
};

/// The full set of unknown/equation rows plus the dense Jacobian workspace.
///
/// The Jacobian array is row-major with indexing `J[row * n + col]` over the
/// active rows; its capacity only ever grows, tracking the historical maximum
/// of the active count.
#[derive(Debug, Clone, Default)]
pub struct UnEqGroup {
    uneqs: Vec<UnEq>,
    /// Indices of active rows, rebuilt by `initialise`
    active: Vec<usize>,
    nr_active: usize,
    jacobian: Vec<f64>,
    /// Current Jacobian capacity (rows)
    jac_dim: usize,
    row_scale: Vec<f64>,
    pivots: Vec<usize>,
    min_tol: Option<VarId>,
    tolerance: Option<VarId>,
    max_iter: usize,
    nr_iter: usize,
    total_nr_iter: usize,
    common_factor: f64,
}

impl UnEqGroup {
    pub fn new() -> Self {
        Self {
            max_iter: MAX_ITERATIONS,
            common_factor: 1.0,
            ..Self::default()
        }
    }

    /// Add a row, rejecting duplicates.
    ///
    /// A row is a duplicate when its unknown or equation name collides with
    /// the unknown or equation of any existing row (case-insensitive).
    pub fn add(&mut self, vars: &VarGroup, uneq: UnEq) -> Result<()> {
        let new_unknown = vars.name(uneq.unknown);
        let new_equation = vars.name(uneq.equation);
        for existing in &self.uneqs {
            let unknown = vars.name(existing.unknown);
            let equation = vars.name(existing.equation);
            if unknown.eq_ignore_ascii_case(new_unknown)
                || equation.eq_ignore_ascii_case(new_unknown)
                || unknown.eq_ignore_ascii_case(new_equation)
                || equation.eq_ignore_ascii_case(new_equation)
            {
                return Err(AquasolveError::read(format!(
                    "uneq '{}' already exists",
                    new_unknown
                )));
            }
        }
        self.uneqs.push(uneq);
        Ok(())
    }

    /// All rows, in declaration order.
    pub fn uneqs(&self) -> &[UnEq] {
        &self.uneqs
    }

    /// Number of rows in the current active set.
    pub fn nr_active(&self) -> usize {
        self.nr_active
    }

    /// Historical maximum of the active count (Jacobian capacity).
    pub fn jacobian_capacity(&self) -> usize {
        self.jac_dim
    }

    /// Inner iterations used by the last activation state.
    pub fn nr_iter(&self) -> usize {
        self.nr_iter
    }

    /// Total iterations over the whole last calculation.
    pub fn total_nr_iter(&self) -> usize {
        self.total_nr_iter
    }

    /// Damping factor applied by the most recent Newton step.
    pub fn last_common_factor(&self) -> f64 {
        self.common_factor
    }

    /// True if any initially-inactive row is currently switched off.
    pub fn iia_present(&self) -> bool {
        self.uneqs
            .iter()
            .any(|u| u.initially_inactive && !u.active)
    }

    /// Switch every initially-inactive row on.
    pub fn switch_on_iia(&mut self, vars: &VarGroup) {
        for u in &mut self.uneqs {
            if u.initially_inactive && !u.active {
                debug!("switching on: {}", vars.name(u.unknown));
                u.active = true;
            }
        }
    }

    /// Switch every initially-inactive row off.
    pub fn switch_off_iia(&mut self, vars: &VarGroup) {
        for u in &mut self.uneqs {
            if u.initially_inactive && u.active {
                debug!("switching off: {}", vars.name(u.unknown));
                u.active = false;
            }
        }
    }

    /// Rebuild the active list and size the Jacobian workspace.
    ///
    /// Called before every inner iteration level; the Jacobian is only
    /// reallocated when the active count exceeds its capacity.
    fn initialise(&mut self, vars: &mut VarGroup) {
        self.active.clear();
        for (i, u) in self.uneqs.iter().enumerate() {
            if u.active {
                self.active.push(i);
            }
        }
        self.nr_active = self.active.len();

        if self.nr_active > self.jac_dim {
            debug!("create jacobian, size {}", self.nr_active);
            self.jacobian = vec![0.0; self.nr_active * self.nr_active];
            self.row_scale = vec![0.0; self.nr_active];
            self.pivots = vec![0; self.nr_active];
            self.jac_dim = self.nr_active;
        }

        if self.min_tol.is_none() {
            let id = vars.get_or_declare("minTol", 0.0);
            vars.set_constant(id, false);
            self.min_tol = Some(id);
        }
        if self.tolerance.is_none() {
            let id = vars.get_or_declare("tolerance", DEFAULT_TOLERANCE);
            vars.set_constant(id, false);
            self.tolerance = Some(id);
        }
    }

    fn effective_tolerance(&self, vars: &mut VarGroup) -> f64 {
        let tol = match self.tolerance {
            Some(id) => vars.value(id),
            None => DEFAULT_TOLERANCE,
        };
        let min_tol = match self.min_tol {
            Some(id) => vars.value(id),
            None => 0.0,
        };
        tol.max(min_tol).max(TOLERANCE_FLOOR)
    }

    /// Top-level iteration entry point, called once per node calculation.
    ///
    /// Returns true when the system converged.
    pub fn iterate(&mut self, vars: &mut VarGroup, flag: Option<&StopFlag>) -> bool {
        self.total_nr_iter = 1;
        self.iterate_level_minerals(vars, flag);
        self.nr_iter < self.max_iter
    }

    /// Outer loop over the discrete mineral activation state.
    ///
    /// Mineral rows start active iff their unknown's initial value is
    /// positive. Each round runs the inner Newton loop, then activates the
    /// most supersaturated inactive mineral, if any. Once the composition is
    /// stable, `minTol` is dropped to zero for one final tightened pass.
    fn iterate_level_minerals(&mut self, vars: &mut VarGroup, flag: Option<&StopFlag>) {
        let mut nr_minerals = 0;
        for u in &mut self.uneqs {
            if u.is_type3 {
                nr_minerals += 1;
                u.active = vars.ini_value(u.unknown) > 0.0;
            }
        }

        let max_mineral_iterations = OUTER_ITERATION_FLOOR.max(nr_minerals);
        let mut nr_mineral_iteration = 0;
        let mut min_tol_flipped = false;

        while nr_mineral_iteration < max_mineral_iterations {
            nr_mineral_iteration += 1;
            let mut composition_changed = false;

            self.nr_iter = self.iterate_level_0(vars, flag);

            // find the most supersaturated inactive mineral
            let mut most_sat = 0.0;
            let mut candidate = None;
            for (i, u) in self.uneqs.iter().enumerate() {
                if u.is_type3 && !u.active {
                    if let Some(si) = u.si_variable {
                        let sat_index = vars.value(si);
                        if sat_index > most_sat {
                            most_sat = sat_index;
                            candidate = Some(i);
                        }
                    }
                }
            }

            if let Some(i) = candidate {
                composition_changed = true;
                if !min_tol_flipped {
                    // the tolerance is relaxed once while the active set is
                    // still in flux, and restored for the final pass
                    min_tol_flipped = true;
                    if let Some(id) = self.min_tol {
                        vars.set_value(id, MINERAL_MIN_TOL);
                    }
                }
                let row = &mut self.uneqs[i];
                row.active = true;
                vars.set_value(row.unknown, MINERAL_SEED);
                debug!(
                    "activating mineral {} (saturation index {:.3e})",
                    vars.name(self.uneqs[i].unknown),
                    most_sat
                );
            }

            if let Some(f) = flag {
                if f.cancelled() {
                    self.nr_iter = self.max_iter;
                    break;
                }
            }

            if !composition_changed {
                let min_tol_value = match self.min_tol {
                    Some(id) => vars.value(id),
                    None => 0.0,
                };
                if min_tol_value > 0.0 {
                    if let Some(id) = self.min_tol {
                        vars.set_value(id, 0.0);
                    }
                } else {
                    // composition stable and minTol zero: converged
                    break;
                }
            }

            if nr_mineral_iteration >= max_mineral_iterations {
                warn!("max nr mineral iterations, no solution found");
                self.nr_iter = self.max_iter;
                break;
            }
        }
    }

    /// Inner damped Newton-Raphson loop on the current active set.
    ///
    /// Returns the number of iterations used; a return equal to `max_iter`
    /// signals failure (non-convergence, numeric fault or cancellation).
    fn iterate_level_0(&mut self, vars: &mut VarGroup, flag: Option<&StopFlag>) -> usize {
        let mut nr_iter0 = 1;
        self.initialise(vars);

        if self.nr_active == 0 {
            return nr_iter0;
        }

        loop {
            match self.how_convergent(vars) {
                Ok(c) if c <= 1.0 => break,
                Ok(_) => {}
                Err(_) => {
                    // numeric fault: stop and report failure
                    nr_iter0 = self.max_iter;
                    break;
                }
            }

            let step = self
                .calculate_jacobian(vars)
                .and_then(|_| self.adapt_estimations(vars));
            if step.is_err() {
                nr_iter0 = self.max_iter;
                break;
            }

            nr_iter0 += 1;
            self.total_nr_iter += 1;

            if let Some(f) = flag {
                if f.cancelled() {
                    nr_iter0 = self.max_iter;
                    break;
                }
            }

            if nr_iter0 >= self.max_iter {
                nr_iter0 = self.max_iter;
                break;
            }
        }

        nr_iter0
    }

    /// Maximum of the per-row convergence metrics over the active set.
    fn how_convergent(&mut self, vars: &mut VarGroup) -> Result<f64> {
        let tolerance = self.effective_tolerance(vars);
        let mut convergence = 0.0f64;
        for m in 0..self.nr_active {
            let um = self.active[m];
            self.uneqs[um].calculate_central_residual(vars)?;
            convergence = convergence.max(self.uneqs[um].how_convergent(tolerance));
        }
        Ok(convergence)
    }

    /// Assemble the Jacobian column by column with forward differences.
    ///
    /// Offsetting one unknown re-arms only the memos downstream of it, so the
    /// residual re-evaluations stay cheap.
    fn calculate_jacobian(&mut self, vars: &mut VarGroup) -> Result<()> {
        for i in 0..self.nr_active {
            let ui = self.active[i];
            let original = self.uneqs[ui].offset_unknown(vars);

            for m in 0..self.nr_active {
                let um = self.active[m];
                self.uneqs[um].calculate_j_residual(vars)?;
            }

            self.uneqs[ui].reset_unknown(vars, original);

            let delta = self.uneqs[ui].jacobian_delta();
            for f in 0..self.nr_active {
                let uf = self.active[f];
                self.jacobian[self.nr_active * f + i] =
                    (self.uneqs[uf].jacobian_residual - self.uneqs[uf].central_residual) / delta;
            }
        }
        Ok(())
    }

    /// Solve for the Newton direction and apply the damped update.
    fn adapt_estimations(&mut self, vars: &mut VarGroup) -> Result<()> {
        self.lu_solve()?;

        // the smallest per-row factor damps the whole step so the direction
        // is preserved, unless a row demands an extreme reduction
        let mut common_factor = 1.0f64;
        for m in 0..self.nr_active {
            let um = self.active[m];
            let factor = self.uneqs[um].check_unknown_step(vars);
            if factor > MIN_COMMON_FACTOR && factor < common_factor {
                common_factor = factor;
            }
        }

        for m in 0..self.nr_active {
            let um = self.active[m];
            let own = self.uneqs[um].factor;
            let applied = if own < common_factor {
                own
            } else {
                common_factor
            };
            self.uneqs[um].update_unknown(vars, applied);
        }

        self.common_factor = common_factor;
        Ok(())
    }

    /// LU decomposition (Crout, implicit scaling, partial pivoting) of the
    /// active Jacobian, followed by back substitution through the rows'
    /// central residuals: on return each active row's `central_residual`
    /// holds its component of the Newton direction.
    fn lu_solve(&mut self) -> Result<()> {
        let dim = self.nr_active;
        let jac = &mut self.jacobian;
        let scale = &mut self.row_scale;
        let pivots = &mut self.pivots;

        for i in 0..dim {
            let mut big = 0.0f64;
            for j in 0..dim {
                let temp = jac[dim * i + j].abs();
                if temp > big {
                    big = temp;
                }
            }
            if big == 0.0 {
                return Err(AquasolveError::numeric("jacobian has a row of zeros"));
            }
            scale[i] = 1.0 / big;
        }

        for j in 0..dim {
            for i in 0..j {
                for k in 0..i {
                    jac[dim * i + j] -= jac[dim * i + k] * jac[dim * k + j];
                }
            }

            let mut big = 0.0f64;
            let mut imax = j;
            for i in j..dim {
                for k in 0..j {
                    jac[dim * i + j] -= jac[dim * i + k] * jac[dim * k + j];
                }
                let dum = scale[i] * jac[dim * i + j].abs();
                if dum >= big {
                    big = dum;
                    imax = i;
                }
            }

            if j != imax {
                for c in 0..dim {
                    jac.swap(imax * dim + c, j * dim + c);
                }
                scale[imax] = scale[j];
            }
            pivots[j] = imax;

            if jac[dim * j + j] == 0.0 {
                // nudge a singular diagonal rather than failing outright
                jac[dim * j + j] = SINGULAR_NUDGE;
            }

            if j != dim - 1 {
                let dum = 1.0 / jac[dim * j + j];
                for i in (j + 1)..dim {
                    jac[dim * i + j] *= dum;
                }
            }
        }

        // forward substitution with permutation, through the row residuals
        let mut ii = 0usize;
        for i in 0..dim {
            let ip = pivots[i];
            let mut sum = self.uneqs[self.active[ip]].central_residual;
            self.uneqs[self.active[ip]].central_residual =
                self.uneqs[self.active[i]].central_residual;
            if ii != 0 {
                for j in (ii - 1)..i {
                    sum -= jac[dim * i + j] * self.uneqs[self.active[j]].central_residual;
                }
            } else if sum != 0.0 {
                ii = i + 1;
            }
            self.uneqs[self.active[i]].central_residual = sum;
        }

        // back substitution
        for i in (0..dim).rev() {
            let mut sum = self.uneqs[self.active[i]].central_residual;
            for j in (i + 1)..dim {
                sum -= jac[dim * i + j] * self.uneqs[self.active[j]].central_residual;
            }
            self.uneqs[self.active[i]].central_residual = sum / jac[dim * i + i];
        }

        for i in 0..dim {
            if !self.uneqs[self.active[i]].central_residual.is_finite() {
                return Err(AquasolveError::numeric("newton direction is not finite"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::calculator::Calculator;
    use crate::node::{Node, NodeType};
    use std::sync::Arc;

    fn solve(system: &str, inputs: &[(&str, f64)], outputs: &[&str]) -> (bool, Vec<f64>, Node) {
        let mut calc = Calculator::from_text(system).unwrap();
        let mut node_type = NodeType::new();
        for (name, _) in inputs {
            node_type.add_variable(name, 0.0, false, "test");
        }
        for name in outputs {
            node_type.add_variable(name, 0.0, false, "test");
        }
        node_type.use_global_variables_from_calculator(&calc);
        let node_type = Arc::new(node_type);

        let mut node = Node::new(node_type.clone());
        for (name, value) in inputs {
            node.set_value(node_type.index(name).unwrap(), *value);
        }
        let ok = calc.calculate(&mut node, None);
        let values = outputs
            .iter()
            .map(|name| node.get_value(node_type.index(name).unwrap()))
            .collect();
        (ok, values, node)
    }

    #[test]
    fn test_single_linear_row() {
        // unknown - 5 = 0, expect exact convergence in a handful of iterations
        let system = "\
.var tolerance 1e-10
.global tot_nr_iter 0
.var x 0
.calc eq_x = x - 5
.uneq x eq_x
";
        let (ok, values, node) = solve(system, &[("x", 0.0)], &["x", "tot_nr_iter"]);
        assert!(ok);
        assert!((values[0] - 5.0).abs() < 1e-9, "x = {}", values[0]);
        let iterations = node.get_value(node.node_type().index("tot_nr_iter").unwrap());
        assert!(iterations <= 5.0, "took {} iterations", iterations);
    }

    #[test]
    fn test_two_variable_linear() {
        // x + y = 3, x - y = 1 -> x = 2, y = 1
        let system = "\
.var tolerance 1e-12
.global tot_nr_iter 0
.var x 0
.var y 0
.calc f1 = x + y - 3
.calc f2 = x - y - 1
.uneq x f1
.uneq y f2
";
        let (ok, values, node) = solve(system, &[("x", 0.0), ("y", 0.0)], &["x", "y"]);
        assert!(ok);
        assert!((values[0] - 2.0).abs() < 1e-10, "x = {}", values[0]);
        assert!((values[1] - 1.0).abs() < 1e-10, "y = {}", values[1]);
        let iterations = node.get_value(node.node_type().index("tot_nr_iter").unwrap());
        assert!(iterations <= 6.0, "took {} iterations", iterations);
    }

    #[test]
    fn test_nonlinear_row() {
        // x^2 = 9 from a start estimate of 1
        let system = "\
.var tolerance 1e-12
.var x 1
.calc f = x * x - 9
.uneq x f
";
        let (ok, values, _) = solve(system, &[("x", 1.0)], &["x"]);
        assert!(ok);
        assert!((values[0] - 3.0).abs() < 1e-8, "x = {}", values[0]);
    }

    #[test]
    fn test_singular_jacobian_reports_failure() {
        // contradictory rows sharing one unknown direction: the y column is
        // exactly zero, the nudged diagonal keeps the solve alive and the
        // calculation reports non-convergence instead of crashing
        let system = "\
.var tolerance 1e-10
.var x 0
.var y 0
.calc f1 = x - 5
.calc f2 = x + 5
.uneq x f1
.uneq y f2
";
        let (ok, _, _) = solve(system, &[("x", 0.0), ("y", 0.0)], &["x"]);
        assert!(!ok);
    }

    #[test]
    fn test_duplicate_uneq_rejected() {
        let system = "\
.var x 0
.calc f1 = x - 1
.uneq x f1
.uneq x f1
";
        assert!(Calculator::from_text(system).is_err());
    }

    #[test]
    fn test_jacobian_capacity_grows_only() {
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
        let mut node_type = NodeType::new();
        node_type.add_variable("y", 0.0, false, "test");
        node_type.use_global_variables_from_calculator(&calc);
        let node_type = Arc::new(node_type);
        let mut node = Node::new(node_type.clone());

        assert!(calc.calculate(&mut node, None));
        // the mineral activated, so the capacity reached 2 and must stay there
        assert_eq!(calc.uneq_group().jacobian_capacity(), 2);

        // a second run starts with one active row again; capacity is retained
        let mut node2 = Node::new(node_type);
        assert!(calc.calculate(&mut node2, None));
        assert_eq!(calc.uneq_group().jacobian_capacity(), 2);
    }
}
