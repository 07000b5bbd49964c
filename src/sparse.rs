//! Sparse matrices of parameters.
//!
//! Canonicalizers collect matrix entries as triplets of parameters and
//! compress them once into column-major storage. The sparsity pattern is
//! fixed from then on; only the numeric values are re-evaluated between
//! solves, which keeps the back end's symbolic structure valid.

use nalgebra::DMatrix;

use crate::expr::Parameter;

/// A compressed sparse column matrix with [`Parameter`] values.
#[derive(Debug, Clone)]
pub(crate) struct ParamCsc {
    nrows: usize,
    ncols: usize,
    col_ptr: Vec<usize>,
    row_ind: Vec<usize>,
    values: Vec<Parameter>,
}

impl ParamCsc {
    /// Builds a CSC matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate positions are summed symbolically, mirroring how numeric
    /// triplet assembly behaves.
    pub(crate) fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: Vec<(usize, usize, Parameter)>,
    ) -> Self {
        debug_assert!(triplets
            .iter()
            .all(|(r, c, _)| *r < nrows && *c < ncols));

        let mut sorted = triplets;
        sorted.sort_by_key(|(row, col, _)| (*col, *row));

        let mut row_ind: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<Parameter> = Vec::with_capacity(sorted.len());
        let mut cols: Vec<usize> = Vec::with_capacity(sorted.len());
        for (row, col, value) in sorted {
            if let (Some(&last_row), Some(&last_col)) = (row_ind.last(), cols.last()) {
                if last_row == row && last_col == col {
                    let merged = values.last().unwrap() + &value;
                    *values.last_mut().unwrap() = merged;
                    continue;
                }
            }
            row_ind.push(row);
            cols.push(col);
            values.push(value);
        }

        let mut col_ptr = vec![0usize; ncols + 1];
        for &col in &cols {
            col_ptr[col + 1] += 1;
        }
        for i in 0..ncols {
            col_ptr[i + 1] += col_ptr[i];
        }

        ParamCsc {
            nrows,
            ncols,
            col_ptr,
            row_ind,
            values,
        }
    }

    pub(crate) fn nrows(&self) -> usize {
        self.nrows
    }

    pub(crate) fn ncols(&self) -> usize {
        self.ncols
    }

    pub(crate) fn nnz(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    pub(crate) fn row_ind(&self) -> &[usize] {
        &self.row_ind
    }

    /// Re-evaluates every stored parameter into `out`, in storage order.
    pub(crate) fn eval_values(&self, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.values.iter().map(Parameter::value));
    }

    /// Iterates stored entries in column-major order.
    pub(crate) fn triplet_iter(&self) -> impl Iterator<Item = (usize, usize, &Parameter)> {
        (0..self.ncols).flat_map(move |col| {
            (self.col_ptr[col]..self.col_ptr[col + 1])
                .map(move |i| (self.row_ind[i], col, &self.values[i]))
        })
    }

    /// Evaluates into a dense matrix. Intended for small inspection and
    /// residual checks, not for the solve path.
    pub(crate) fn to_dense(&self) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.nrows, self.ncols);
        for (row, col, value) in self.triplet_iter() {
            out[(row, col)] += value.value();
        }
        out
    }

    /// Stacks `top` above `bottom`.
    pub(crate) fn vstack(top: &ParamCsc, bottom: &ParamCsc) -> ParamCsc {
        debug_assert_eq!(top.ncols, bottom.ncols);
        let mut triplets =
            Vec::with_capacity(top.nnz() + bottom.nnz());
        for (row, col, value) in top.triplet_iter() {
            triplets.push((row, col, value.clone()));
        }
        for (row, col, value) in bottom.triplet_iter() {
            triplets.push((row + top.nrows, col, value.clone()));
        }
        ParamCsc::from_triplets(top.nrows + bottom.nrows, top.ncols, triplets)
    }
}

/// Evaluates a slice of parameters into `out`.
pub(crate) fn eval_parameters(params: &[Parameter], out: &mut Vec<f64>) {
    out.clear();
    out.extend(params.iter().map(Parameter::value));
}
