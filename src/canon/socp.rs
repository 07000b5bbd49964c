//! Lowering to the second-order cone canonical form.
//!
//! The target shape is
//!
//! ```text
//! minimize    c'x
//! subject to  A x == b   (as b + A x == 0 rows)
//!             G x <=_K h
//! ```
//!
//! where `K` is a positive orthant followed by second-order cones. All
//! matrix and vector entries are parameters, so the numeric data can be
//! refreshed without touching the structure.

use std::fmt;

use crate::canon::VariablePool;
use crate::error::{ModelError, Result};
use crate::expr::scalar::Affine;
use crate::expr::variable::SolutionStorage;
use crate::expr::Parameter;
use crate::problem::OptimizationProblem;
use crate::sparse::{eval_parameters, ParamCsc};

/// The parameterized matrices of a problem in SOCP form.
///
/// Rows of `G` are ordered as all positive-orthant rows first, then the
/// cone blocks in constraint order. Each cone block starts with its bound
/// row followed by the norm rows.
pub struct SocpForm {
    pool: VariablePool,
    pub(crate) a: ParamCsc,
    pub(crate) b: Vec<Parameter>,
    pub(crate) g: ParamCsc,
    pub(crate) h: Vec<Parameter>,
    pub(crate) c: Vec<Parameter>,
    pub(crate) soc_dims: Vec<usize>,
}

impl SocpForm {
    /// Canonicalizes `problem`, linking its variables to fresh indices.
    ///
    /// The cost has to be linear. Constraint rows with no first-order
    /// content after cleanup are dropped; norm rows that reduce to zero
    /// shrink their cone accordingly.
    pub fn new(problem: &OptimizationProblem) -> Result<Self> {
        let mut pool = VariablePool::new();
        let mut a_triplets: Vec<(usize, usize, Parameter)> = Vec::new();
        let mut g_triplets: Vec<(usize, usize, Parameter)> = Vec::new();
        let mut b: Vec<Parameter> = Vec::new();
        let mut h: Vec<Parameter> = Vec::new();
        let mut soc_dims: Vec<usize> = Vec::new();

        for constraint in &problem.equalities {
            let mut affine = constraint.affine.clone();
            affine.clean_up();
            if !affine.is_first_order() {
                // Constant equalities carry no variables and are skipped.
                continue;
            }
            push_row(&mut pool, &mut a_triplets, &mut b, &affine)?;
        }

        for constraint in &problem.positives {
            let mut affine = constraint.affine.clone();
            affine.clean_up();
            if !affine.is_first_order() {
                continue;
            }
            push_row(&mut pool, &mut g_triplets, &mut h, &affine)?;
        }

        for constraint in &problem.boxes {
            // lower <= middle <= upper splits into two orthant rows.
            for affine in [
                constraint.middle.sub(&constraint.lower),
                constraint.upper.sub(&constraint.middle),
            ] {
                let mut affine = affine;
                affine.clean_up();
                if affine.is_first_order() {
                    push_row(&mut pool, &mut g_triplets, &mut h, &affine)?;
                }
            }
        }

        for constraint in &problem.cones {
            let mut bound = constraint.affine.clone();
            bound.clean_up();
            push_row(&mut pool, &mut g_triplets, &mut h, &bound)?;

            let mut dim = 1;
            for norm_affine in &constraint.norm {
                let mut affine = norm_affine.clone();
                affine.clean_up();
                if affine.is_zero() {
                    continue;
                }
                push_row(&mut pool, &mut g_triplets, &mut h, &affine)?;
                dim += 1;
            }
            soc_dims.push(dim);
        }

        if problem.cost.order() != 1 {
            return Err(ModelError::InvalidCost(
                "cone programs require a linear cost function".into(),
            ));
        }
        let mut cost = problem.cost.affine.clone();
        cost.clean_up();
        let mut cost_entries: Vec<(usize, Parameter)> = Vec::new();
        for term in &cost.terms {
            // Cost-only variables still get a dense index.
            let index = pool.add(&term.variable)?;
            cost_entries.push((index, term.parameter.clone()));
        }
        let mut c = vec![Parameter::default(); pool.len()];
        for (index, parameter) in cost_entries {
            c[index] += &parameter;
        }

        let n = pool.len();
        let a = ParamCsc::from_triplets(b.len(), n, a_triplets);
        let g = ParamCsc::from_triplets(h.len(), n, g_triplets);
        pool.finalize();

        Ok(SocpForm {
            pool,
            a,
            b,
            g,
            h,
            c,
            soc_dims,
        })
    }

    /// The number of linked variables.
    pub fn num_variables(&self) -> usize {
        self.pool.len()
    }

    /// The number of equality rows.
    pub fn num_equalities(&self) -> usize {
        self.b.len()
    }

    /// The total number of inequality rows.
    pub fn num_inequalities(&self) -> usize {
        self.h.len()
    }

    /// The number of rows in the positive-orthant prefix.
    pub fn num_positive_rows(&self) -> usize {
        self.h.len() - self.soc_dims.iter().sum::<usize>()
    }

    /// The number of second-order cones.
    pub fn num_cones(&self) -> usize {
        self.soc_dims.len()
    }

    pub(crate) fn storage(&self) -> SolutionStorage {
        self.pool.storage()
    }

    /// Maximum violation of the canonical constraints at the current
    /// solution.
    pub(crate) fn max_violation(&self) -> f64 {
        let x = nalgebra::DVector::from_vec(self.storage().borrow().clone());
        let mut violation: f64 = 0.0;

        if self.num_equalities() > 0 {
            let residual = self.a.to_dense() * &x;
            let mut b = Vec::new();
            eval_parameters(&self.b, &mut b);
            for (i, r) in residual.iter().enumerate() {
                violation = violation.max((r + b[i]).abs());
            }
        }

        if self.num_inequalities() > 0 {
            let gx = self.g.to_dense() * &x;
            let mut h = Vec::new();
            eval_parameters(&self.h, &mut h);
            let slack: Vec<f64> = gx.iter().zip(&h).map(|(g, h)| g + h).collect();

            for value in slack.iter().take(self.num_positive_rows()) {
                violation = violation.max(-value);
            }
            let mut offset = self.num_positive_rows();
            for &dim in &self.soc_dims {
                let bound = slack[offset];
                let norm: f64 = slack[offset + 1..offset + dim]
                    .iter()
                    .map(|v| v * v)
                    .sum::<f64>()
                    .sqrt();
                violation = violation.max(norm - bound);
                offset += dim;
            }
        }

        violation
    }
}

fn push_row(
    pool: &mut VariablePool,
    triplets: &mut Vec<(usize, usize, Parameter)>,
    constants: &mut Vec<Parameter>,
    affine: &Affine,
) -> Result<()> {
    let row = constants.len();
    for term in &affine.terms {
        let index = pool.add(&term.variable)?;
        triplets.push((row, index, term.parameter.clone()));
    }
    constants.push(affine.constant.clone());
    Ok(())
}

impl fmt::Display for SocpForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut c = Vec::new();
        let mut b = Vec::new();
        let mut h = Vec::new();
        eval_parameters(&self.c, &mut c);
        eval_parameters(&self.b, &mut b);
        eval_parameters(&self.h, &mut h);
        writeln!(f, "Second order cone problem")?;
        writeln!(f, "Minimize c'x")?;
        writeln!(f, "Subject to Gx <=_K h")?;
        writeln!(f, "           Ax == b")?;
        writeln!(f, "With:")?;
        writeln!(f, "c: {c:?}")?;
        writeln!(f, "G:\n{}", -self.g.to_dense())?;
        writeln!(f, "h: {h:?}")?;
        writeln!(f, "A:\n{}", -self.a.to_dense())?;
        write!(f, "b: {b:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{box_bound, equal_to, greater_than, less_than};
    use crate::expr::{norm2, par, sum, sum_squares};

    #[test]
    fn counts_and_cone_layout() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 3).unwrap();
        op.add_constraint(equal_to(sum(&x), 1.0).unwrap());
        op.add_constraint(greater_than(&x, 0.0).unwrap());
        op.add_constraint(less_than(norm2(&x), 2.0).unwrap());
        op.add_cost_term(sum(&x)).unwrap();

        let form = SocpForm::new(&op).unwrap();
        assert_eq!(form.num_variables(), 3);
        assert_eq!(form.num_equalities(), 1);
        assert_eq!(form.num_cones(), 1);
        assert_eq!(form.soc_dims, vec![4]);
        assert_eq!(form.num_positive_rows(), 3);
        assert_eq!(
            form.num_inequalities(),
            form.num_positive_rows() + form.soc_dims.iter().sum::<usize>()
        );
    }

    #[test]
    fn distinct_variables_get_distinct_indices() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 4).unwrap();
        op.add_constraint(greater_than(&x, 1.0).unwrap());
        op.add_constraint(greater_than(&x, 0.5).unwrap());
        op.add_cost_term(sum(&x)).unwrap();

        let form = SocpForm::new(&op).unwrap();
        // Reuse across constraints must not create new indices.
        assert_eq!(form.num_variables(), 4);
    }

    #[test]
    fn constant_equalities_are_skipped() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        op.add_constraint(equal_to(par(1.0), 1.0).unwrap());
        op.add_constraint(equal_to(&x, 1.0).unwrap());
        op.add_cost_term(x).unwrap();

        let form = SocpForm::new(&op).unwrap();
        assert_eq!(form.num_equalities(), 1);
    }

    #[test]
    fn box_constraints_become_two_rows() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        op.add_constraint(box_bound(-1.0, &x, 1.0).unwrap());
        op.add_cost_term(x).unwrap();

        let form = SocpForm::new(&op).unwrap();
        assert_eq!(form.num_positive_rows(), 2);
    }

    #[test]
    fn constant_under_norm_keeps_its_cone_row() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        let extended = sum_squares(&x) + par(2.0);
        op.add_constraint(less_than(crate::expr::sqrt(&extended), 5.0).unwrap());
        op.add_cost_term(sum(&x)).unwrap();

        let form = SocpForm::new(&op).unwrap();
        // Bound row, two variable rows, one constant row.
        assert_eq!(form.soc_dims, vec![4]);
    }

    #[test]
    fn cost_only_variables_are_indexed() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        let y = op.add_variable("y").unwrap();
        op.add_constraint(greater_than(&x, 1.0).unwrap());
        op.add_cost_term(&x + &y).unwrap();

        let form = SocpForm::new(&op).unwrap();
        assert_eq!(form.num_variables(), 2);
    }

    #[test]
    fn quadratic_cost_is_rejected() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        op.add_constraint(greater_than(&x, 0.0).unwrap());
        op.add_cost_term(sum_squares(&x)).unwrap();

        assert!(matches!(
            SocpForm::new(&op),
            Err(ModelError::InvalidCost(_))
        ));
    }
}
