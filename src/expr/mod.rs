//! Expression types and the factories users build problems from.
//!
//! Dense containers of expressions are plain nalgebra matrices with
//! [`Expr`] as the scalar type, so matrix products, sums and views work
//! the usual way. The factories below lift numeric data into expressions:
//! [`par`] for constants, [`dynpar`] for values read from a [`ParamCell`]
//! at every solve, and the `par_*` variants for dense and sparse
//! containers.

pub mod param;
pub mod scalar;
pub mod variable;

pub use param::{ParamCell, Parameter};
pub use scalar::Expr;
pub use variable::Variable;

use nalgebra::{DMatrix, DVector, Dim, Matrix};
use nalgebra::storage::Storage;
use num_traits::Zero;

use crate::error::ModelError;

/// A column vector of expressions.
pub type VectorX = DVector<Expr>;
/// A dense matrix of expressions.
pub type MatrixX = DMatrix<Expr>;

/// Creates a constant parameter expression.
pub fn par(value: f64) -> Expr {
    Expr::from(value)
}

/// Creates a dynamic parameter expression reading from `cell`.
///
/// The cell stays owned by the caller. Changing it with
/// [`ParamCell::set`] is picked up by the next `solve()` without
/// reformulating the problem.
pub fn dynpar(cell: &ParamCell) -> Expr {
    Expr::from(Parameter::dynamic(cell))
}

/// Lifts a dense vector of numbers into constant expressions.
pub fn par_vector(values: &DVector<f64>) -> VectorX {
    values.map(par)
}

/// Lifts a dense matrix of numbers into constant expressions.
pub fn par_matrix(values: &DMatrix<f64>) -> MatrixX {
    values.map(par)
}

/// Lifts a sparse matrix into constant expressions. Entries not stored in
/// the sparsity pattern become structural zeros and are dropped during
/// canonicalization.
pub fn par_sparse(values: &nalgebra_sparse::CscMatrix<f64>) -> MatrixX {
    let mut out = MatrixX::zeros(values.nrows(), values.ncols());
    for (row, col, value) in values.triplet_iter() {
        out[(row, col)] = par(*value);
    }
    out
}

/// Creates a vector of dynamic parameter expressions, one per cell.
pub fn dynpar_vector(cells: &[ParamCell]) -> VectorX {
    VectorX::from_iterator(cells.len(), cells.iter().map(dynpar))
}

/// Evaluates an expression. Shorthand for [`Expr::evaluate`].
pub fn eval(expr: &Expr) -> f64 {
    expr.evaluate()
}

/// Evaluates every element of an expression matrix.
pub fn eval_matrix<R, C, S>(m: &Matrix<Expr, R, C, S>) -> DMatrix<f64>
where
    R: Dim,
    C: Dim,
    S: Storage<Expr, R, C>,
{
    DMatrix::from_fn(m.nrows(), m.ncols(), |row, col| m[(row, col)].evaluate())
}

/// Evaluates every element of an expression vector.
pub fn eval_vector<R, S>(v: &Matrix<Expr, R, nalgebra::U1, S>) -> DVector<f64>
where
    R: Dim,
    S: Storage<Expr, R, nalgebra::U1>,
{
    DVector::from_iterator(v.len(), v.iter().map(Expr::evaluate))
}

/// Sums the elements of an expression matrix.
pub fn sum<R, C, S>(m: &Matrix<Expr, R, C, S>) -> Expr
where
    R: Dim,
    C: Dim,
    S: Storage<Expr, R, C>,
{
    let mut acc = Expr::zero();
    for e in m.iter() {
        acc += e.clone();
    }
    acc
}

/// The inner product of two expression vectors.
///
/// # Panics
///
/// Panics when the operand lengths differ or an element product violates
/// the order rules.
pub fn dot<R1, S1, R2, S2>(
    a: &Matrix<Expr, R1, nalgebra::U1, S1>,
    b: &Matrix<Expr, R2, nalgebra::U1, S2>,
) -> Expr
where
    R1: Dim,
    S1: Storage<Expr, R1, nalgebra::U1>,
    R2: Dim,
    S2: Storage<Expr, R2, nalgebra::U1>,
{
    if a.len() != b.len() {
        panic!(
            "{}",
            ModelError::InvalidArity(format!(
                "dot product of vectors with {} and {} elements",
                a.len(),
                b.len()
            ))
        );
    }
    let mut acc = Expr::zero();
    for (x, y) in a.iter().zip(b.iter()) {
        acc += x * y;
    }
    acc
}

/// The sum of squared elements.
pub fn sum_squares<R, C, S>(m: &Matrix<Expr, R, C, S>) -> Expr
where
    R: Dim,
    C: Dim,
    S: Storage<Expr, R, C>,
{
    let mut acc = Expr::zero();
    for e in m.iter() {
        acc += square(e);
    }
    acc
}

/// The 2-norm of the elements, marked as a norm expression.
///
/// The result can be bounded from above by an affine expression to form a
/// second-order cone constraint.
pub fn norm2<R, C, S>(m: &Matrix<Expr, R, C, S>) -> Expr
where
    R: Dim,
    C: Dim,
    S: Storage<Expr, R, C>,
{
    sqrt(&sum_squares(m))
}

/// The quadratic form `x' M x`.
pub fn quad_form<R, S>(x: &Matrix<Expr, R, nalgebra::U1, S>, m: &MatrixX) -> Expr
where
    R: Dim,
    S: Storage<Expr, R, nalgebra::U1>,
{
    let n = x.len();
    if m.nrows() != n || m.ncols() != n {
        panic!(
            "{}",
            ModelError::InvalidArity(format!(
                "quadratic form of a {} vector with a {}x{} matrix",
                n,
                m.nrows(),
                m.ncols()
            ))
        );
    }
    let mut acc = Expr::zero();
    for i in 0..n {
        let mut inner = Expr::zero();
        for j in 0..n {
            inner += &m[(i, j)] * &x[j];
        }
        acc += &x[i] * &inner;
    }
    acc
}

/// The square root of a purely quadratic expression, marked as a 2-norm.
///
/// # Panics
///
/// Panics when linear terms are present or a bilinear product cannot be
/// rewritten as a square. See [`Expr::checked_sqrt`].
pub fn sqrt(expr: &Expr) -> Expr {
    match expr.checked_sqrt() {
        Ok(e) => e,
        Err(e) => panic!("{e}"),
    }
}

/// The square of a constant or linear expression.
///
/// # Panics
///
/// Panics when the argument is already of second order. See
/// [`Expr::checked_square`].
pub fn square(expr: &Expr) -> Expr {
    match expr.checked_square() {
        Ok(e) => e,
        Err(e) => panic!("{e}"),
    }
}
