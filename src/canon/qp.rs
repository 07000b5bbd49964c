//! Lowering to the quadratic program canonical form.
//!
//! The target shape is
//!
//! ```text
//! minimize    0.5 x'P x + q'x
//! subject to  l <= A x <= u
//! ```
//!
//! `P` is stored upper-triangular with doubled diagonal entries so the
//! `0.5 x'P x` convention reproduces the modeled quadratic exactly.
//! Missing bounds are literal infinities. Second-order cone constraints do
//! not fit this form and are rejected.

use std::fmt;

use crate::canon::VariablePool;
use crate::error::{ModelError, Result};
use crate::expr::variable::SolutionStorage;
use crate::expr::Parameter;
use crate::problem::OptimizationProblem;
use crate::sparse::{eval_parameters, ParamCsc};

/// The parameterized matrices of a problem in QP form.
pub struct QpForm {
    pool: VariablePool,
    pub(crate) p: ParamCsc,
    pub(crate) q: Vec<Parameter>,
    pub(crate) a: ParamCsc,
    pub(crate) l: Vec<Parameter>,
    pub(crate) u: Vec<Parameter>,
}

impl QpForm {
    /// Canonicalizes `problem`, linking its variables to fresh indices.
    ///
    /// The cost has to be linear or quadratic and must not be a norm. Rows
    /// with no first-order content after cleanup are dropped.
    pub fn new(problem: &OptimizationProblem) -> Result<Self> {
        if !problem.cones.is_empty() {
            return Err(ModelError::InvalidConstraint(
                "second-order cone constraints cannot be lowered to a quadratic program".into(),
            ));
        }

        let mut pool = VariablePool::new();
        let mut a_triplets: Vec<(usize, usize, Parameter)> = Vec::new();
        let mut l: Vec<Parameter> = Vec::new();
        let mut u: Vec<Parameter> = Vec::new();

        let infinity = || Parameter::constant(f64::INFINITY);

        for constraint in &problem.equalities {
            let mut affine = constraint.affine.clone();
            affine.clean_up();
            if !affine.is_first_order() {
                continue;
            }
            let row = l.len();
            for term in &affine.terms {
                let index = pool.add(&term.variable)?;
                a_triplets.push((row, index, term.parameter.clone()));
            }
            // Equal bounds mark the row as an equality for the back end.
            let bound = -&affine.constant;
            l.push(bound.clone());
            u.push(bound);
        }

        for constraint in &problem.positives {
            let mut affine = constraint.affine.clone();
            affine.clean_up();
            if !affine.is_first_order() {
                continue;
            }
            let row = l.len();
            for term in &affine.terms {
                let index = pool.add(&term.variable)?;
                a_triplets.push((row, index, term.parameter.clone()));
            }
            l.push(-&affine.constant);
            u.push(infinity());
        }

        for constraint in &problem.boxes {
            if constraint.lower.is_constant() && constraint.upper.is_constant() {
                // Both bounds constant: a single two-sided row on middle.
                let mut middle = constraint.middle.clone();
                middle.clean_up();
                if !middle.is_first_order() {
                    continue;
                }
                let row = l.len();
                for term in &middle.terms {
                    let index = pool.add(&term.variable)?;
                    a_triplets.push((row, index, term.parameter.clone()));
                }
                l.push(&constraint.lower.constant - &middle.constant);
                u.push(&constraint.upper.constant - &middle.constant);
            } else {
                // Variable bounds: two one-sided rows.
                for difference in [
                    constraint.middle.sub(&constraint.lower),
                    constraint.upper.sub(&constraint.middle),
                ] {
                    let mut difference = difference;
                    difference.clean_up();
                    if !difference.is_first_order() {
                        continue;
                    }
                    let row = l.len();
                    for term in &difference.terms {
                        let index = pool.add(&term.variable)?;
                        a_triplets.push((row, index, term.parameter.clone()));
                    }
                    l.push(-&difference.constant);
                    u.push(infinity());
                }
            }
        }

        // Cost: linear part plus upper-triangular quadratic part.
        if problem.cost.is_norm() || problem.cost.order() == 0 {
            return Err(ModelError::InvalidCost(
                "quadratic programs require a linear or quadratic cost function".into(),
            ));
        }

        let mut q_entries: Vec<(usize, Parameter)> = Vec::new();
        let mut cost_affine = problem.cost.affine.clone();
        cost_affine.clean_up();
        for term in &cost_affine.terms {
            let index = pool.add(&term.variable)?;
            q_entries.push((index, term.parameter.clone()));
        }

        let mut p_triplets: Vec<(usize, usize, Parameter)> = Vec::new();
        for product in &problem.cost.products {
            let first = product.first_factor();
            let second = product.second_factor();

            for term1 in &first.terms {
                let index1 = pool.add(&term1.variable)?;
                for term2 in &second.terms {
                    let index2 = pool.add(&term2.variable)?;
                    let (row, col) = if index1 <= index2 {
                        (index1, index2)
                    } else {
                        (index2, index1)
                    };
                    let mut weight = &term1.parameter * &term2.parameter;
                    if row == col {
                        // The 0.5 x'Px convention halves diagonal terms.
                        weight *= &Parameter::constant(2.0);
                    }
                    p_triplets.push((row, col, weight));
                }
            }

            // Constant factors turn the other side's terms into linear cost.
            if !first.constant.is_zero() {
                for term in &second.terms {
                    let index = pool.add(&term.variable)?;
                    q_entries.push((index, &first.constant * &term.parameter));
                }
            }
            if !second.constant.is_zero() {
                for term in &first.terms {
                    let index = pool.add(&term.variable)?;
                    q_entries.push((index, &second.constant * &term.parameter));
                }
            }
        }

        let n = pool.len();
        let mut q = vec![Parameter::default(); n];
        for (index, parameter) in q_entries {
            q[index] += &parameter;
        }

        let p = ParamCsc::from_triplets(n, n, p_triplets);
        let a = ParamCsc::from_triplets(l.len(), n, a_triplets);
        pool.finalize();

        Ok(QpForm { pool, p, q, a, l, u })
    }

    /// The number of linked variables.
    pub fn num_variables(&self) -> usize {
        self.pool.len()
    }

    /// The number of constraint rows.
    pub fn num_rows(&self) -> usize {
        self.l.len()
    }

    /// Whether the quadratic cost is positive semidefinite.
    ///
    /// A cost without quadratic entries is trivially convex. Otherwise the
    /// evaluated `P` is symmetrized and probed with a dense Cholesky
    /// factorization.
    pub fn is_convex(&self) -> bool {
        if self.p.nnz() == 0 {
            return true;
        }
        let upper = self.p.to_dense();
        let mut symmetric = upper.clone();
        for row in 0..upper.nrows() {
            for col in (row + 1)..upper.ncols() {
                symmetric[(col, row)] = upper[(row, col)];
            }
        }
        symmetric.cholesky().is_some()
    }

    pub(crate) fn storage(&self) -> SolutionStorage {
        self.pool.storage()
    }

    /// Maximum violation of `l <= Ax <= u` at the current solution.
    pub(crate) fn max_violation(&self) -> f64 {
        let x = nalgebra::DVector::from_vec(self.storage().borrow().clone());
        let ax = self.a.to_dense() * &x;
        let mut l = Vec::new();
        let mut u = Vec::new();
        eval_parameters(&self.l, &mut l);
        eval_parameters(&self.u, &mut u);

        let mut violation: f64 = 0.0;
        for i in 0..self.num_rows() {
            if l[i].is_finite() {
                violation = violation.max(l[i] - ax[i]);
            }
            if u[i].is_finite() {
                violation = violation.max(ax[i] - u[i]);
            }
        }
        violation
    }
}

impl fmt::Display for QpForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let upper = self.p.to_dense();
        let mut p = upper.clone();
        for row in 0..upper.nrows() {
            for col in (row + 1)..upper.ncols() {
                p[(col, row)] = upper[(row, col)];
            }
        }
        let mut q = Vec::new();
        let mut l = Vec::new();
        let mut u = Vec::new();
        eval_parameters(&self.q, &mut q);
        eval_parameters(&self.l, &mut l);
        eval_parameters(&self.u, &mut u);
        writeln!(f, "Quadratic problem")?;
        writeln!(f, "Minimize 0.5x'Px + q'x")?;
        writeln!(f, "Subject to l <= Ax <= u")?;
        writeln!(f, "With:")?;
        writeln!(f, "P:\n{p}")?;
        writeln!(f, "q: {q:?}")?;
        writeln!(f, "A:\n{}", self.a.to_dense())?;
        writeln!(f, "l: {l:?}")?;
        write!(f, "u: {u:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{box_bound, equal_to, greater_than, less_than};
    use crate::expr::{norm2, par_matrix, quad_form, sum, sum_squares};
    use nalgebra::DMatrix;

    #[test]
    fn second_order_cones_are_rejected() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        op.add_constraint(less_than(norm2(&x), 1.0).unwrap());
        op.add_cost_term(sum(&x)).unwrap();

        assert!(matches!(
            QpForm::new(&op),
            Err(ModelError::InvalidConstraint(_))
        ));
    }

    #[test]
    fn constant_cost_is_rejected() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        op.add_constraint(greater_than(&x, 1.0).unwrap());
        op.add_cost_term(crate::expr::par(3.0)).unwrap();

        assert!(matches!(QpForm::new(&op), Err(ModelError::InvalidCost(_))));
    }

    #[test]
    fn norm_cost_is_rejected() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        op.add_constraint(greater_than(&x, 1.0).unwrap());
        op.add_cost_term(norm2(&x)).unwrap();

        assert!(matches!(QpForm::new(&op), Err(ModelError::InvalidCost(_))));
    }

    #[test]
    fn equality_rows_share_their_bound() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        op.add_constraint(equal_to(sum(&x), 1.0).unwrap());
        op.add_cost_term(sum_squares(&x)).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert_eq!(form.num_rows(), 1);
        assert_eq!(form.l[0], form.u[0]);
        assert_eq!(form.l[0].value(), 1.0);
    }

    #[test]
    fn positive_rows_are_one_sided() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        op.add_constraint(greater_than(&x, 2.0).unwrap());
        op.add_cost_term(sum_squares(&nalgebra::DVector::from_vec(vec![x]))).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert_eq!(form.l[0].value(), 2.0);
        assert_eq!(form.u[0].value(), f64::INFINITY);
    }

    #[test]
    fn constant_boxes_become_single_rows() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        op.add_constraint(box_bound(-1.0, &x, 1.0).unwrap());
        op.add_cost_term(sum_squares(&x)).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert_eq!(form.num_rows(), 2);
        assert_eq!(form.l[0].value(), -1.0);
        assert_eq!(form.u[0].value(), 1.0);
    }

    #[test]
    fn variable_boxes_split_into_half_rows() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        let y = op.add_variable("y").unwrap();
        op.add_constraint(box_bound(&y, &x, 5.0).unwrap());
        op.add_cost_term(&x * &x).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert_eq!(form.num_rows(), 2);
        assert_eq!(form.u[0].value(), f64::INFINITY);
        assert_eq!(form.u[1].value(), f64::INFINITY);
    }

    #[test]
    fn cost_only_variables_are_indexed() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        let y = op.add_variable("y").unwrap();
        op.add_constraint(greater_than(&x, 1.0).unwrap());
        op.add_cost_term(&x + &y).unwrap();

        let form = QpForm::new(&op).unwrap();
        // y appears in no constraint row but still gets a dense index
        // and keeps its linear cost entry.
        assert_eq!(form.num_variables(), 2);
        assert_eq!(form.num_rows(), 1);
        let mut q = Vec::new();
        eval_parameters(&form.q, &mut q);
        assert_eq!(q, vec![1.0, 1.0]);
    }

    #[test]
    fn cost_only_variables_reach_the_quadratic_part() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        let y = op.add_variable("y").unwrap();
        op.add_constraint(greater_than(&x, 0.0).unwrap());
        op.add_cost_term(&x * &x + &y * &y).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert_eq!(form.num_variables(), 2);
        let p = form.p.to_dense();
        assert_eq!(p[(0, 0)], 2.0);
        assert_eq!(p[(1, 1)], 2.0);
    }

    #[test]
    fn quadratic_diagonal_is_doubled() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        op.add_constraint(greater_than(&x, 0.0).unwrap());
        // x0^2 + x0 x1
        op.add_cost_term(&x[0] * &x[0] + &x[0] * &x[1]).unwrap();

        let form = QpForm::new(&op).unwrap();
        let p = form.p.to_dense();
        assert_eq!(p[(0, 0)], 2.0);
        assert_eq!(p[(0, 1)], 1.0);
        // Only the upper triangle is stored.
        assert_eq!(p[(1, 0)], 0.0);
    }

    #[test]
    fn constant_factors_contribute_linear_terms() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        op.add_constraint(greater_than(&x, 0.0).unwrap());
        // (x + 2) * x = x^2 + 2x
        op.add_cost_term((&x + 2.0) * &x).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert_eq!(form.p.to_dense()[(0, 0)], 2.0);
        let mut q = Vec::new();
        eval_parameters(&form.q, &mut q);
        assert_eq!(q, vec![2.0]);
    }

    #[test]
    fn squared_offsets_double_their_linear_part() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        op.add_constraint(greater_than(&x, 0.0).unwrap());
        // (x + 1)^2 = x^2 + 2x + 1
        op.add_cost_term(crate::expr::square(&(&x + 1.0))).unwrap();

        let form = QpForm::new(&op).unwrap();
        let mut q = Vec::new();
        eval_parameters(&form.q, &mut q);
        assert_eq!(q, vec![2.0]);
    }

    #[test]
    fn indefinite_quadratics_fail_the_convexity_probe() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 3).unwrap();
        op.add_constraint(box_bound(-1.0, &x, 1.0).unwrap());
        let mut m = DMatrix::zeros(3, 3);
        m[(0, 0)] = -3.0;
        m[(1, 1)] = -2.0;
        m[(2, 2)] = -1.0;
        op.add_cost_term(quad_form(&x, &par_matrix(&m))).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert!(!form.is_convex());
    }

    #[test]
    fn definite_quadratics_pass_the_convexity_probe() {
        let mut op = OptimizationProblem::new();
        let x = op.add_vector_variable("x", 2).unwrap();
        op.add_constraint(box_bound(-1.0, &x, 1.0).unwrap());
        op.add_cost_term(sum_squares(&x)).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert!(form.is_convex());
    }

    #[test]
    fn linear_costs_are_convex() {
        let mut op = OptimizationProblem::new();
        let x = op.add_variable("x").unwrap();
        op.add_constraint(greater_than(&x, 0.0).unwrap());
        op.add_cost_term(x).unwrap();

        let form = QpForm::new(&op).unwrap();
        assert!(form.is_convex());
    }
}
