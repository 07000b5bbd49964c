//! Problem definition.
//!
//! An [`OptimizationProblem`] accumulates a cost expression, the four
//! constraint lists, and a registry of named variables. It stays fully
//! symbolic; a canonicalizer reads it once to produce the matrix form a
//! back end consumes.
//!
//! ```no_run
//! use coneform::prelude::*;
//!
//! let mut problem = OptimizationProblem::new();
//! let x = problem.add_vector_variable("x", 2)?;
//! problem.add_constraint(greater_than(&x, 1.0)?);
//! problem.add_cost_term(sum(&x))?;
//! # Ok::<(), coneform::ModelError>(())
//! ```

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::constraints::Constraint;
use crate::error::{ModelError, Result};
use crate::expr::scalar::Expr;
use crate::expr::variable::Variable;
use crate::expr::{MatrixX, VectorX};

use crate::constraints::{
    BoxConstraint, EqualityConstraint, PositiveConstraint, SecondOrderConeConstraint,
};

/// A symbolic convex optimization problem.
#[derive(Debug, Default)]
pub struct OptimizationProblem {
    pub(crate) cost: Expr,
    pub(crate) equalities: Vec<EqualityConstraint>,
    pub(crate) positives: Vec<PositiveConstraint>,
    pub(crate) boxes: Vec<BoxConstraint>,
    pub(crate) cones: Vec<SecondOrderConeConstraint>,
    scalars: HashMap<String, Expr>,
    vectors: HashMap<String, VectorX>,
    matrices: HashMap<String, MatrixX>,
}

impl OptimizationProblem {
    /// Creates an empty problem with a zero cost.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a scalar variable.
    ///
    /// Variables must not be shared between different problems.
    pub fn add_variable(&mut self, name: &str) -> Result<Expr> {
        if self.scalars.contains_key(name) {
            return Err(ModelError::DuplicateName(format!(
                "scalar variable '{name}' already exists"
            )));
        }
        let variable = Expr::from(Variable::scalar(name));
        self.scalars.insert(name.to_owned(), variable.clone());
        Ok(variable)
    }

    /// Creates and registers a vector of variables.
    pub fn add_vector_variable(&mut self, name: &str, rows: usize) -> Result<VectorX> {
        if self.vectors.contains_key(name) {
            return Err(ModelError::DuplicateName(format!(
                "vector variable '{name}' already exists"
            )));
        }
        let vector =
            VectorX::from_fn(rows, |row, _| Expr::from(Variable::vector_element(name, row)));
        self.vectors.insert(name.to_owned(), vector.clone());
        Ok(vector)
    }

    /// Creates and registers a matrix of variables.
    pub fn add_matrix_variable(
        &mut self,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<MatrixX> {
        if self.matrices.contains_key(name) {
            return Err(ModelError::DuplicateName(format!(
                "matrix variable '{name}' already exists"
            )));
        }
        let matrix = MatrixX::from_fn(rows, cols, |row, col| {
            Expr::from(Variable::matrix_element(name, row, col))
        });
        self.matrices.insert(name.to_owned(), matrix.clone());
        Ok(matrix)
    }

    /// Appends constraints in insertion order, one list per shape.
    pub fn add_constraint(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        for constraint in constraints {
            match constraint {
                Constraint::Equality(c) => self.equalities.push(c),
                Constraint::Positive(c) => self.positives.push(c),
                Constraint::Box(c) => self.boxes.push(c),
                Constraint::SecondOrderCone(c) => self.cones.push(c),
            }
        }
    }

    /// Adds a term to the cost function.
    ///
    /// The accumulated cost has to stay a legal sum, so mixing norms with
    /// second-order terms is rejected here.
    pub fn add_cost_term(&mut self, term: impl Into<Expr>) -> Result<()> {
        self.cost.checked_add_assign(&term.into()).map_err(|_| {
            ModelError::InvalidCost(
                "cost term cannot be added: norms and quadratic forms do not mix".into(),
            )
        })
    }

    /// Returns a previously created scalar variable.
    pub fn get_variable(&self, name: &str) -> Result<Expr> {
        self.scalars
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing(name, "scalar"))
    }

    /// Returns a previously created vector variable.
    pub fn get_vector_variable(&self, name: &str) -> Result<VectorX> {
        self.vectors
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing(name, "vector"))
    }

    /// Returns a previously created matrix variable.
    pub fn get_matrix_variable(&self, name: &str) -> Result<MatrixX> {
        self.matrices
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing(name, "matrix"))
    }

    /// Evaluates a scalar variable at the current solution.
    pub fn get_variable_value(&self, name: &str) -> Result<f64> {
        Ok(self.get_variable(name)?.evaluate())
    }

    /// Evaluates a vector variable at the current solution.
    pub fn get_vector_variable_value(&self, name: &str) -> Result<DVector<f64>> {
        let vector = self.get_vector_variable(name)?;
        Ok(DVector::from_iterator(
            vector.len(),
            vector.iter().map(Expr::evaluate),
        ))
    }

    /// Evaluates a matrix variable at the current solution.
    pub fn get_matrix_variable_value(&self, name: &str) -> Result<DMatrix<f64>> {
        let matrix = self.get_matrix_variable(name)?;
        Ok(DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |r, c| {
            matrix[(r, c)].evaluate()
        }))
    }

    /// Evaluates the cost with the current solutions.
    ///
    /// May differ from the back end's reported objective when constant
    /// offsets were eliminated during canonicalization.
    pub fn optimal_value(&self) -> f64 {
        self.cost.evaluate()
    }

    /// The number of registered variable elements.
    pub fn num_variables(&self) -> usize {
        self.scalars.len()
            + self.vectors.values().map(|v| v.len()).sum::<usize>()
            + self.matrices.values().map(|m| m.len()).sum::<usize>()
    }

    fn missing(&self, name: &str, wanted: &str) -> ModelError {
        let other_shape = match wanted {
            "scalar" => self.vectors.contains_key(name) || self.matrices.contains_key(name),
            "vector" => self.scalars.contains_key(name) || self.matrices.contains_key(name),
            _ => self.scalars.contains_key(name) || self.vectors.contains_key(name),
        };
        if other_shape {
            ModelError::MissingName(format!(
                "'{name}' exists but was created with a different shape than {wanted}"
            ))
        } else {
            ModelError::MissingName(format!(
                "could not find {wanted} variable '{name}', make sure it has been created first"
            ))
        }
    }
}
