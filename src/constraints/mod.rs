//! Constraint types and comparison helpers.

mod constraint;

pub use constraint::{
    box_bound, equal_to, greater_than, less_than, BoxConstraint, Constraint, ConstraintOperand,
    EqualityConstraint, Operand, PositiveConstraint, SecondOrderConeConstraint,
};
