//! Error types for coneform.

use thiserror::Error;

/// Error type for all modeling and solving operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Element-wise helper received operands of mismatched shape.
    #[error("shape mismatch: {0}")]
    InvalidArity(String),

    /// An operator was applied to expressions of disallowed order.
    #[error("invalid expression order: {0}")]
    InvalidOrder(String),

    /// The cost function does not fit the target canonical form.
    #[error("invalid cost function: {0}")]
    InvalidCost(String),

    /// A constraint is not representable in the target canonical form.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// A named variable was created twice with the same shape.
    #[error("duplicate variable name: {0}")]
    DuplicateName(String),

    /// A named variable was looked up but never created.
    #[error("unknown variable name: {0}")]
    MissingName(String),

    /// A problem index was requested from a variable that has no link.
    #[error("variable '{0}' is not linked to a problem")]
    UnlinkedVariable(String),

    /// A variable was linked to a second solver while still linked.
    #[error("variable '{0}' is already linked to a different problem")]
    LinkConflict(String),

    /// Square root of a negative literal or division by a literal zero.
    #[error("numeric domain violation: {0}")]
    NumericDomain(String),

    /// The back end refused to set up the problem.
    #[error("solver setup failed: {0}")]
    SetupFailure(String),

    /// The back end returned a fatal status.
    #[error("solver failed: {0}")]
    SolveFailure(String),
}

/// Result type for coneform operations.
pub type Result<T> = std::result::Result<T, ModelError>;
