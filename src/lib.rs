//! # coneform
//!
//! A disciplined convex optimization modeling layer. Problems are written
//! symbolically in terms of decision variables and parameters, checked
//! against the operator rules that keep them convex, and compiled into the
//! standard matrix canonical forms that numerical solvers consume: second
//! order cone programs (`min c'x s.t. Ax == b, Gx <=_K h`) and quadratic
//! programs (`min 0.5 x'Px + q'x s.t. l <= Ax <= u`).
//!
//! ## Quick Start
//!
//! ```no_run
//! use coneform::prelude::*;
//!
//! let mut problem = OptimizationProblem::new();
//! let x = problem.add_vector_variable("x", 2)?;
//!
//! problem.add_constraint(greater_than(&x, 1.0)?);
//! problem.add_constraint(less_than(norm2(&x), 5.0)?);
//! problem.add_cost_term(-sum(&x))?;
//!
//! let mut solver = SocpSolver::new(&problem)?;
//! solver.solve(false);
//!
//! let solution = problem.get_vector_variable_value("x")?;
//! println!("x = {solution}, objective = {}", problem.optimal_value());
//! # Ok::<(), coneform::ModelError>(())
//! ```
//!
//! ## Dynamic parameters
//!
//! Parameters created with [`expr::dynpar`] read from a [`expr::ParamCell`]
//! owned by the caller. Changing the cell and calling `solve()` again
//! re-evaluates the compiled matrices in place; the problem is never
//! reformulated between solves.
//!
//! ```no_run
//! use coneform::prelude::*;
//!
//! let mut problem = OptimizationProblem::new();
//! let x = problem.add_variable("x")?;
//! let bound = ParamCell::new(1.0);
//! problem.add_constraint(greater_than(&x, dynpar(&bound))?);
//! problem.add_cost_term(x)?;
//!
//! let mut solver = SocpSolver::new(&problem)?;
//! solver.solve(false);
//! bound.set(2.0);
//! solver.solve(false);
//! # Ok::<(), coneform::ModelError>(())
//! ```
//!
//! ## Architecture
//!
//! - **Expression algebra** over four layers: deferred-evaluation
//!   [`expr::Parameter`] scalars, affine forms of variables, products of
//!   affine forms, and [`expr::Expr`] sums with an optional 2-norm marker.
//! - **Operator-level convexity rules** reject anything outside the
//!   recognized classes at the call that builds it.
//! - **Canonicalizers** assign dense variable indices and emit sparse
//!   parameter matrices once per problem.
//! - **Adapters** refresh numeric data and drive the Clarabel back end.

pub mod canon;
pub mod constraints;
pub mod error;
pub mod expr;
pub mod problem;
pub mod solver;

mod sparse;

/// Convenient imports for building and solving problems.
pub mod prelude {
    pub use crate::constraints::{
        box_bound, equal_to, greater_than, less_than, Constraint, ConstraintOperand,
    };
    pub use crate::error::{ModelError, Result};
    pub use crate::expr::{
        dot, dynpar, dynpar_vector, eval, eval_matrix, eval_vector, norm2, par, par_matrix,
        par_sparse, par_vector, quad_form, sqrt, square, sum, sum_squares, Expr, MatrixX,
        ParamCell, Parameter, VectorX,
    };
    pub use crate::problem::OptimizationProblem;
    pub use crate::solver::{QpSolver, Settings, SocpSolver, SolveStatus};
}

pub use error::{ModelError, Result};
pub use problem::OptimizationProblem;
pub use solver::{QpSolver, SocpSolver, SolveStatus};
