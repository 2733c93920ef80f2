//! One row of the nonlinear system: an unknown/equation pair.

use crate::error::{AquasolveError, Result};
use crate::expr::{VarGroup, VarId};

use super::{DEFAULT_UN_DELTA, MAX_ABS_STEP, MAX_STEP_RATIO};

/// An unknown/equation pair.
///
/// The equation cell holds an expression whose value is the residual for the
/// current value of the unknown cell. Mineral rows (`is_type3`) additionally
/// carry a saturation-index cell used by the outer activation loop.
#[derive(Debug, Clone)]
pub struct UnEq {
    /// The unknown cell iterated by the solver
    pub unknown: VarId,
    /// The equation (residual) cell
    pub equation: VarId,
    /// Saturation-index cell, present on mineral rows
    pub si_variable: Option<VarId>,
    /// Mineral row, switched on and off by the outer loop
    pub is_type3: bool,
    /// Row starts deactivated and only participates after explicit switch-on
    pub initially_inactive: bool,
    /// Row is part of the current active set
    pub active: bool,
    /// Base forward-difference offset
    un_delta: f64,
    /// Offset actually applied for the current Jacobian column
    last_delta: f64,
    /// Residual at the current unknown value. After the linear solve this
    /// slot holds the Newton direction for this row.
    pub(crate) central_residual: f64,
    /// Residual with one unknown offset (Jacobian assembly)
    pub(crate) jacobian_residual: f64,
    /// Damping factor computed by the last step check
    pub(crate) factor: f64,
    max_abs_step: f64,
    max_step_ratio: f64,
}

impl UnEq {
    /// Create a row for the given cells.
    pub fn new(
        unknown: VarId,
        equation: VarId,
        si_variable: Option<VarId>,
        delta: Option<f64>,
        initially_inactive: bool,
    ) -> Self {
        let is_type3 = si_variable.is_some();
        Self {
            unknown,
            equation,
            si_variable,
            is_type3,
            initially_inactive,
            active: !initially_inactive,
            un_delta: delta.unwrap_or(DEFAULT_UN_DELTA),
            last_delta: delta.unwrap_or(DEFAULT_UN_DELTA),
            central_residual: 0.0,
            jacobian_residual: 0.0,
            factor: 1.0,
            max_abs_step: MAX_ABS_STEP,
            max_step_ratio: MAX_STEP_RATIO,
        }
    }

    /// Evaluate the equation at the current unknown value.
    pub fn calculate_central_residual(&mut self, vars: &mut VarGroup) -> Result<()> {
        let r = vars.value(self.equation);
        if !r.is_finite() {
            return Err(AquasolveError::numeric(format!(
                "residual of '{}' is not finite",
                vars.name(self.equation)
            )));
        }
        self.central_residual = r;
        Ok(())
    }

    /// Perturb the unknown for a forward-difference column and return the
    /// original value. The offset is scaled with the magnitude of the unknown
    /// so it stays meaningful for both trace and bulk quantities.
    pub fn offset_unknown(&mut self, vars: &mut VarGroup) -> f64 {
        let original = vars.value(self.unknown);
        self.last_delta = self.un_delta * original.abs().max(1.0);
        vars.set_value(self.unknown, original + self.last_delta);
        original
    }

    /// Restore the unknown after a forward-difference column.
    pub fn reset_unknown(&self, vars: &mut VarGroup, original: f64) {
        vars.set_value(self.unknown, original);
    }

    /// Evaluate the equation with some unknown offset.
    pub fn calculate_j_residual(&mut self, vars: &mut VarGroup) -> Result<()> {
        let r = vars.value(self.equation);
        if !r.is_finite() {
            return Err(AquasolveError::numeric(format!(
                "offset residual of '{}' is not finite",
                vars.name(self.equation)
            )));
        }
        self.jacobian_residual = r;
        Ok(())
    }

    /// The offset used for the most recent Jacobian column.
    pub fn jacobian_delta(&self) -> f64 {
        self.last_delta
    }

    /// Bound the pending update of this unknown, returning a multiplicative
    /// factor in (0, 1] that keeps the step within the absolute and relative
    /// limits of the row.
    pub fn check_unknown_step(&mut self, vars: &mut VarGroup) -> f64 {
        let step = self.central_residual.abs();
        let value = vars.value(self.unknown);
        let mut factor = 1.0;
        if step > self.max_abs_step {
            factor = self.max_abs_step / step;
        }
        if value != 0.0 {
            let limit = self.max_step_ratio * value.abs();
            if step > limit {
                factor = factor.min(limit / step);
            }
        }
        self.factor = factor;
        factor
    }

    /// Apply `factor` times the Newton direction to the unknown.
    pub fn update_unknown(&self, vars: &mut VarGroup, factor: f64) {
        let value = vars.value(self.unknown);
        vars.set_value(self.unknown, value - factor * self.central_residual);
    }

    /// Ratio of the central residual to the effective tolerance; values of at
    /// most 1 mean this row satisfies its tolerance.
    pub fn how_convergent(&self, tolerance: f64) -> f64 {
        self.central_residual.abs() / tolerance
    }

    /// True if the row satisfies its tolerance.
    pub fn is_convergent(&self, tolerance: f64) -> bool {
        self.how_convergent(tolerance) <= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl;

    fn setup() -> (VarGroup, UnEq) {
        let mut vars = VarGroup::new();
        let x = vars.declare("x", 2.0, false);
        let eq = vars.declare("eq", 0.0, false);
        let ast = dsl::parse_expression("x * x - 9").unwrap();
        let compiled = vars.compile(&ast, 1).unwrap();
        vars.set_expression(eq, compiled);
        vars.optimize_expressions();
        (vars, UnEq::new(x, eq, None, None, false))
    }

    #[test]
    fn test_central_residual() {
        let (mut vars, mut row) = setup();
        row.calculate_central_residual(&mut vars).unwrap();
        assert!((row.central_residual + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_offset_and_reset() {
        let (mut vars, mut row) = setup();
        row.calculate_central_residual(&mut vars).unwrap();
        let original = row.offset_unknown(&mut vars);
        assert!((original - 2.0).abs() < 1e-12);
        assert!(vars.value(row.unknown) > 2.0);
        row.calculate_j_residual(&mut vars).unwrap();
        assert!(row.jacobian_residual > row.central_residual);
        row.reset_unknown(&mut vars, original);
        assert!((vars.value(row.unknown) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_step_clamping() {
        let (mut vars, mut row) = setup();
        row.central_residual = 100.0; // pretend solve produced a huge step
        let factor = row.check_unknown_step(&mut vars);
        assert!(factor < 1.0);
        // absolute limit: 100 * factor <= MAX_ABS_STEP, relative limit may
        // tighten further for the current unknown value of 2
        assert!(100.0 * factor <= MAX_ABS_STEP + 1e-12);
    }

    #[test]
    fn test_non_finite_residual_is_fault() {
        let mut vars = VarGroup::new();
        let x = vars.declare("x", -1.0, false);
        let eq = vars.declare("eq", 0.0, false);
        let ast = dsl::parse_expression("log(x)").unwrap();
        let compiled = vars.compile(&ast, 1).unwrap();
        vars.set_expression(eq, compiled);
        vars.optimize_expressions();
        let mut row = UnEq::new(x, eq, None, None, false);
        assert!(row.calculate_central_residual(&mut vars).is_err());
    }
}
