//! Constraint shapes and the comparison helpers that produce them.
//!
//! Every constraint a problem can hold is one of four shapes: an equality
//! `a == 0`, a nonnegativity `0 <= a`, a box `l <= m <= u`, or a second
//! order cone `||n||_2 <= a`, each over affine forms. The helpers reduce
//! user expressions to these shapes and reject anything the canonical
//! forms cannot represent.

use std::fmt;

use nalgebra::storage::Storage;
use nalgebra::{Dim, Matrix};

use crate::error::{ModelError, Result};
use crate::expr::scalar::{Affine, Expr};
use crate::expr::Parameter;

/// An equality constraint `affine == 0`.
#[derive(Debug, Clone)]
pub struct EqualityConstraint {
    pub(crate) affine: Affine,
}

/// A nonnegativity constraint `0 <= affine`.
#[derive(Debug, Clone)]
pub struct PositiveConstraint {
    pub(crate) affine: Affine,
}

/// A box constraint `lower <= middle <= upper`.
#[derive(Debug, Clone)]
pub struct BoxConstraint {
    pub(crate) lower: Affine,
    pub(crate) middle: Affine,
    pub(crate) upper: Affine,
}

/// A second-order cone constraint `||norm||_2 <= affine`.
#[derive(Debug, Clone)]
pub struct SecondOrderConeConstraint {
    pub(crate) norm: Vec<Affine>,
    pub(crate) affine: Affine,
}

/// One constraint of an optimization problem. Immutable once built.
#[derive(Debug, Clone)]
pub enum Constraint {
    Equality(EqualityConstraint),
    Positive(PositiveConstraint),
    Box(BoxConstraint),
    SecondOrderCone(SecondOrderConeConstraint),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Equality(c) => write!(f, "{} == 0", c.affine),
            Constraint::Positive(c) => write!(f, "0 <= {}", c.affine),
            Constraint::Box(c) => write!(f, "{} <= {} <= {}", c.lower, c.middle, c.upper),
            Constraint::SecondOrderCone(c) => {
                write!(f, "(")?;
                for (i, affine) in c.norm.iter().enumerate() {
                    write!(f, "({affine})^2")?;
                    if i + 1 != c.norm.len() {
                        write!(f, " + ")?;
                    }
                }
                write!(f, ")^(1/2) <= {}", c.affine)
            }
        }
    }
}

fn equal_to_scalar(lhs: &Expr, rhs: &Expr) -> Result<Option<Constraint>> {
    if lhs.order() > 1 || rhs.order() > 1 {
        return Err(ModelError::InvalidOrder(
            "the terms in an equality have to be constant or linear".into(),
        ));
    }
    Ok(Some(Constraint::Equality(EqualityConstraint {
        affine: lhs.affine.sub(&rhs.affine),
    })))
}

fn less_than_scalar(lhs: &Expr, rhs: &Expr) -> Result<Option<Constraint>> {
    if rhs.order() > 1 {
        return Err(ModelError::InvalidOrder(
            "the larger side of an inequality has to be constant or linear".into(),
        ));
    }
    if lhs.is_norm() {
        let norm = lhs
            .products
            .iter()
            .map(|product| product.first_factor().clone())
            .collect();
        Ok(Some(Constraint::SecondOrderCone(
            SecondOrderConeConstraint {
                norm,
                affine: rhs.affine.sub(&lhs.affine),
            },
        )))
    } else if lhs.order() < 2 {
        if lhs.order() > 0 || rhs.order() > 0 {
            Ok(Some(Constraint::Positive(PositiveConstraint {
                affine: rhs.affine.sub(&lhs.affine),
            })))
        } else {
            // Comparing two constants constrains nothing.
            Ok(None)
        }
    } else {
        Err(ModelError::InvalidOrder(
            "the smaller side of an inequality has to be constant, linear or a 2-norm".into(),
        ))
    }
}

fn box_scalar(lower: &Expr, middle: &Expr, upper: &Expr) -> Result<Option<Constraint>> {
    if lower.order() > 1 || middle.order() > 1 || upper.order() > 1 {
        return Err(ModelError::InvalidOrder(
            "the terms in a box constraint have to be constant or linear".into(),
        ));
    }
    Ok(Some(Constraint::Box(BoxConstraint {
        lower: lower.affine.clone(),
        middle: middle.affine.clone(),
        upper: upper.affine.clone(),
    })))
}

/// The operand shapes accepted by the comparison helpers.
///
/// Scalars broadcast over matrix operands; matrix operands have to agree
/// in shape. Elements pair up in column-major order.
pub struct Operand {
    shape: Option<(usize, usize)>,
    items: Vec<Expr>,
}

impl Operand {
    fn scalar(expr: Expr) -> Self {
        Operand {
            shape: None,
            items: vec![expr],
        }
    }
}

/// Conversion into a comparison operand. Implemented for numbers, scalar
/// expressions and any nalgebra matrix or view of expressions.
pub trait ConstraintOperand {
    fn into_operand(self) -> Operand;
}

impl ConstraintOperand for f64 {
    fn into_operand(self) -> Operand {
        Operand::scalar(Expr::from(self))
    }
}

impl ConstraintOperand for Parameter {
    fn into_operand(self) -> Operand {
        Operand::scalar(Expr::from(self))
    }
}

impl ConstraintOperand for Expr {
    fn into_operand(self) -> Operand {
        Operand::scalar(self)
    }
}

impl ConstraintOperand for &Expr {
    fn into_operand(self) -> Operand {
        Operand::scalar(self.clone())
    }
}

impl<R, C, S> ConstraintOperand for &Matrix<Expr, R, C, S>
where
    R: Dim,
    C: Dim,
    S: Storage<Expr, R, C>,
{
    fn into_operand(self) -> Operand {
        Operand {
            shape: Some((self.nrows(), self.ncols())),
            items: self.iter().cloned().collect(),
        }
    }
}

impl<R, C, S> ConstraintOperand for Matrix<Expr, R, C, S>
where
    R: Dim,
    C: Dim,
    S: Storage<Expr, R, C>,
{
    fn into_operand(self) -> Operand {
        (&self).into_operand()
    }
}

fn broadcast_shape(shapes: &[Option<(usize, usize)>]) -> Result<Option<(usize, usize)>> {
    let mut result = None;
    for shape in shapes.iter().flatten() {
        match result {
            None => result = Some(*shape),
            Some(existing) if existing == *shape => {}
            Some(existing) => {
                return Err(ModelError::InvalidArity(format!(
                    "operands of shape {}x{} and {}x{} in constraint",
                    existing.0, existing.1, shape.0, shape.1
                )));
            }
        }
    }
    Ok(result)
}

fn element(operand: &Operand, index: usize) -> &Expr {
    if operand.shape.is_some() {
        &operand.items[index]
    } else {
        &operand.items[0]
    }
}

fn apply2(
    lhs: Operand,
    rhs: Operand,
    f: impl Fn(&Expr, &Expr) -> Result<Option<Constraint>>,
) -> Result<Vec<Constraint>> {
    let shape = broadcast_shape(&[lhs.shape, rhs.shape])?;
    let count = shape.map_or(1, |(rows, cols)| rows * cols);
    let mut constraints = Vec::with_capacity(count);
    for i in 0..count {
        if let Some(constraint) = f(element(&lhs, i), element(&rhs, i))? {
            constraints.push(constraint);
        }
    }
    Ok(constraints)
}

/// Creates equality constraints `lhs == rhs`, element-wise.
pub fn equal_to(
    lhs: impl ConstraintOperand,
    rhs: impl ConstraintOperand,
) -> Result<Vec<Constraint>> {
    apply2(lhs.into_operand(), rhs.into_operand(), equal_to_scalar)
}

/// Creates constraints `lhs <= rhs`, element-wise.
///
/// A norm-marked left side produces a second-order cone constraint; a
/// constant or linear left side produces a nonnegativity constraint.
/// Comparisons between two constants are dropped.
pub fn less_than(
    lhs: impl ConstraintOperand,
    rhs: impl ConstraintOperand,
) -> Result<Vec<Constraint>> {
    apply2(lhs.into_operand(), rhs.into_operand(), less_than_scalar)
}

/// Creates constraints `lhs >= rhs`, element-wise.
pub fn greater_than(
    lhs: impl ConstraintOperand,
    rhs: impl ConstraintOperand,
) -> Result<Vec<Constraint>> {
    apply2(rhs.into_operand(), lhs.into_operand(), less_than_scalar)
}

/// Creates box constraints `lower <= middle <= upper`, element-wise.
pub fn box_bound(
    lower: impl ConstraintOperand,
    middle: impl ConstraintOperand,
    upper: impl ConstraintOperand,
) -> Result<Vec<Constraint>> {
    let lower = lower.into_operand();
    let middle = middle.into_operand();
    let upper = upper.into_operand();
    let shape = broadcast_shape(&[lower.shape, middle.shape, upper.shape])?;
    let count = shape.map_or(1, |(rows, cols)| rows * cols);
    let mut constraints = Vec::with_capacity(count);
    for i in 0..count {
        if let Some(constraint) = box_scalar(
            element(&lower, i),
            element(&middle, i),
            element(&upper, i),
        )? {
            constraints.push(constraint);
        }
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{dynpar, norm2, par, par_vector, sum_squares, ParamCell, Variable};
    use nalgebra::DVector;

    fn vector_var(name: &str, n: usize) -> crate::expr::VectorX {
        DVector::from_fn(n, |row, _| Expr::from(Variable::vector_element(name, row)))
    }

    #[test]
    fn equality_subtracts_sides() {
        let x = vector_var("x", 2);
        let constraints = equal_to(&x[0], 1.0).unwrap();
        assert_eq!(constraints.len(), 1);
        match &constraints[0] {
            Constraint::Equality(c) => {
                assert_eq!(c.affine.terms.len(), 1);
                assert_eq!(c.affine.constant.value(), -1.0);
            }
            other => panic!("expected equality, got {other}"),
        }
    }

    #[test]
    fn equality_rejects_quadratics() {
        let x = vector_var("x", 2);
        let quadratic = &x[0] * &x[0];
        assert!(matches!(
            equal_to(&quadratic, 0.0),
            Err(ModelError::InvalidOrder(_))
        ));
    }

    #[test]
    fn norm_bound_becomes_second_order_cone() {
        let x = vector_var("x", 2);
        let constraints = less_than(norm2(&x), 5.0).unwrap();
        match &constraints[0] {
            Constraint::SecondOrderCone(c) => {
                assert_eq!(c.norm.len(), 2);
                assert_eq!(c.affine.constant.value(), 5.0);
            }
            other => panic!("expected cone, got {other}"),
        }
    }

    #[test]
    fn squared_norm_bound_is_rejected() {
        let x = vector_var("x", 2);
        assert!(matches!(
            less_than(sum_squares(&x), 1.0),
            Err(ModelError::InvalidOrder(_))
        ));
    }

    #[test]
    fn constant_comparison_is_dropped() {
        let constraints = less_than(par(1.0), 2.0).unwrap();
        assert!(constraints.is_empty());

        // A dynamic parameter is still order zero.
        let cell = ParamCell::new(1.0);
        let constraints = less_than(dynpar(&cell), 2.0).unwrap();
        assert!(constraints.is_empty());
    }

    #[test]
    fn greater_than_flips_sides() {
        let x = vector_var("x", 2);
        let constraints = greater_than(&x, 1.0).unwrap();
        assert_eq!(constraints.len(), 2);
        for constraint in &constraints {
            match constraint {
                Constraint::Positive(c) => assert_eq!(c.affine.constant.value(), -1.0),
                other => panic!("expected positive, got {other}"),
            }
        }
    }

    #[test]
    fn scalar_broadcasts_over_matrix() {
        let x = vector_var("x", 3);
        let bounds = par_vector(&DVector::from_vec(vec![1.0, 2.0, 3.0]));
        assert_eq!(less_than(&x, &bounds).unwrap().len(), 3);
        assert_eq!(box_bound(-5.0, &x, 5.0).unwrap().len(), 3);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let x = vector_var("x", 3);
        let y = vector_var("y", 4);
        assert!(matches!(
            equal_to(&x, &y),
            Err(ModelError::InvalidArity(_))
        ));
    }

    #[test]
    fn box_requires_low_order() {
        let x = vector_var("x", 2);
        let quadratic = &x[0] * &x[0];
        assert!(matches!(
            box_bound(0.0, &quadratic, 1.0),
            Err(ModelError::InvalidOrder(_))
        ));
    }
}
