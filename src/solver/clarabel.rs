//! Adapters driving the Clarabel interior-point back end.
//!
//! Clarabel consumes `min 0.5 x'Px + q'x  s.t.  Ax + s = b, s in K`. Both
//! adapters translate their canonical form into that convention at
//! construction and keep the translation fixed: the cone layout, sparsity
//! patterns and row plans never change afterwards, only the numeric values
//! flow through on each solve.

use std::fmt;

use clarabel::algebra::CscMatrix as BackendCsc;
use clarabel::solver::{DefaultSolver, IPSolver, SupportedConeT};

use crate::canon::{QpForm, SocpForm};
use crate::error::{ModelError, Result};
use crate::expr::Parameter;
use crate::problem::OptimizationProblem;
use crate::solver::{Settings, SolveStatus};
use crate::sparse::{eval_parameters, ParamCsc};

/// Solves problems in SOCP form.
///
/// The back end's convention flips the sign of the constraint matrices:
/// rows enter as `-[A; G]` with right-hand side `[b; h]`, so the slack of
/// each row equals the constraint's affine value.
pub struct SocpSolver {
    form: SocpForm,
    settings: Settings,
    status: SolveStatus,
    cones: Vec<SupportedConeT<f64>>,
    stacked: ParamCsc,
    rhs_params: Vec<Parameter>,
    matrix_values: Vec<f64>,
    rhs: Vec<f64>,
    cost: Vec<f64>,
}

impl SocpSolver {
    /// Canonicalizes `problem` and prepares the back-end data layout.
    ///
    /// Runs the canonicalizer exactly once; later solves only refresh
    /// numeric values.
    pub fn new(problem: &OptimizationProblem) -> Result<Self> {
        let form = SocpForm::new(problem)?;

        let stacked = ParamCsc::vstack(&form.a, &form.g);
        let rhs_params: Vec<Parameter> =
            form.b.iter().chain(form.h.iter()).cloned().collect();

        let mut cones = Vec::new();
        if form.num_equalities() > 0 {
            cones.push(SupportedConeT::ZeroConeT(form.num_equalities()));
        }
        if form.num_positive_rows() > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(form.num_positive_rows()));
        }
        for &dim in &form.soc_dims {
            cones.push(SupportedConeT::SecondOrderConeT(dim));
        }

        let mut solver = SocpSolver {
            form,
            settings: Settings::default(),
            status: SolveStatus::Unknown,
            cones,
            stacked,
            rhs_params,
            matrix_values: Vec::new(),
            rhs: Vec::new(),
            cost: Vec::new(),
        };
        solver.refresh();
        Ok(solver)
    }

    /// Re-evaluates all parameter data into the numeric buffers.
    fn refresh(&mut self) {
        self.stacked.eval_values(&mut self.matrix_values);
        for value in &mut self.matrix_values {
            *value = -*value;
        }
        eval_parameters(&self.rhs_params, &mut self.rhs);
        eval_parameters(&self.form.c, &mut self.cost);
    }

    /// Refreshes the problem data, runs the back end, and installs the
    /// primal solution. Returns `false` only on fatal failure.
    pub fn solve(&mut self, verbose: bool) -> bool {
        self.refresh();

        let n = self.form.num_variables();
        let p = BackendCsc::new(n, n, vec![0; n + 1], Vec::new(), Vec::new());
        let a = BackendCsc::new(
            self.stacked.nrows(),
            n,
            self.stacked.col_ptr().to_vec(),
            self.stacked.row_ind().to_vec(),
            self.matrix_values.clone(),
        );

        let mut backend = DefaultSolver::new(
            &p,
            &self.cost,
            &a,
            &self.rhs,
            &self.cones,
            self.settings.to_backend(verbose),
        );
        backend.solve();

        self.status = backend.solution.status.into();
        self.form
            .storage()
            .borrow_mut()
            .copy_from_slice(&backend.solution.x);

        !self.status.is_fatal()
    }

    /// The status of the most recent solve.
    pub fn exit_code(&self) -> SolveStatus {
        self.status
    }

    /// A human-readable description of the most recent solve.
    pub fn result_string(&self) -> &'static str {
        self.status.message()
    }

    /// Whether the current solution satisfies all constraints within
    /// `tolerance`.
    pub fn is_feasible(&self, tolerance: f64) -> bool {
        self.form.max_violation() <= tolerance
    }

    /// The canonical form this adapter was built from.
    pub fn form(&self) -> &SocpForm {
        &self.form
    }

    /// The number of optimization variables.
    pub fn num_variables(&self) -> usize {
        self.form.num_variables()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

impl fmt::Display for SocpSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.form)
    }
}

/// Solves problems in QP form.
///
/// The two-sided rows `l <= Ax <= u` are lowered structurally at setup:
/// rows with equal bound parameters become equalities `Ax = u`, finite
/// upper bounds become `Ax <= u`, and finite lower bounds become
/// `-Ax <= -l`. Infinite bounds contribute nothing.
pub struct QpSolver {
    form: QpForm,
    settings: Settings,
    status: SolveStatus,
    cones: Vec<SupportedConeT<f64>>,
    rows: ParamCsc,
    rhs_params: Vec<Parameter>,
    matrix_values: Vec<f64>,
    rhs: Vec<f64>,
    p_values: Vec<f64>,
    q_values: Vec<f64>,
}

impl QpSolver {
    /// Canonicalizes `problem` and prepares the back-end data layout.
    ///
    /// Non-convex quadratic costs are refused here, before any solve.
    pub fn new(problem: &OptimizationProblem) -> Result<Self> {
        let form = QpForm::new(problem)?;
        if !form.is_convex() {
            return Err(ModelError::SetupFailure(
                "the quadratic cost is not positive semidefinite".into(),
            ));
        }

        let mut row_entries: Vec<Vec<(usize, Parameter)>> = vec![Vec::new(); form.num_rows()];
        for (row, col, parameter) in form.a.triplet_iter() {
            row_entries[row].push((col, parameter.clone()));
        }

        let mut equalities = Vec::new();
        let mut uppers = Vec::new();
        let mut lowers = Vec::new();
        for row in 0..form.num_rows() {
            if form.l[row] == form.u[row] {
                equalities.push(row);
                continue;
            }
            if form.u[row].as_literal() != Some(f64::INFINITY) {
                uppers.push(row);
            }
            if form.l[row].as_literal() != Some(f64::NEG_INFINITY) {
                lowers.push(row);
            }
        }

        let mut triplets = Vec::new();
        let mut rhs_params = Vec::new();
        let mut out_row = 0;
        for &row in &equalities {
            for (col, parameter) in &row_entries[row] {
                triplets.push((out_row, *col, parameter.clone()));
            }
            rhs_params.push(form.u[row].clone());
            out_row += 1;
        }
        for &row in &uppers {
            for (col, parameter) in &row_entries[row] {
                triplets.push((out_row, *col, parameter.clone()));
            }
            rhs_params.push(form.u[row].clone());
            out_row += 1;
        }
        for &row in &lowers {
            for (col, parameter) in &row_entries[row] {
                triplets.push((out_row, *col, -parameter));
            }
            rhs_params.push(-&form.l[row]);
            out_row += 1;
        }

        let mut cones = Vec::new();
        if !equalities.is_empty() {
            cones.push(SupportedConeT::ZeroConeT(equalities.len()));
        }
        let inequality_rows = uppers.len() + lowers.len();
        if inequality_rows > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(inequality_rows));
        }

        let rows = ParamCsc::from_triplets(out_row, form.num_variables(), triplets);

        let mut solver = QpSolver {
            form,
            settings: Settings::default(),
            status: SolveStatus::Unknown,
            cones,
            rows,
            rhs_params,
            matrix_values: Vec::new(),
            rhs: Vec::new(),
            p_values: Vec::new(),
            q_values: Vec::new(),
        };
        solver.refresh();
        Ok(solver)
    }

    fn refresh(&mut self) {
        self.rows.eval_values(&mut self.matrix_values);
        eval_parameters(&self.rhs_params, &mut self.rhs);
        self.form.p.eval_values(&mut self.p_values);
        eval_parameters(&self.form.q, &mut self.q_values);
    }

    /// Refreshes the problem data, runs the back end, and installs the
    /// primal solution. Returns `false` only on fatal failure.
    pub fn solve(&mut self, verbose: bool) -> bool {
        self.refresh();

        let n = self.form.num_variables();
        let p = BackendCsc::new(
            n,
            n,
            self.form.p.col_ptr().to_vec(),
            self.form.p.row_ind().to_vec(),
            self.p_values.clone(),
        );
        let a = BackendCsc::new(
            self.rows.nrows(),
            n,
            self.rows.col_ptr().to_vec(),
            self.rows.row_ind().to_vec(),
            self.matrix_values.clone(),
        );

        let mut backend = DefaultSolver::new(
            &p,
            &self.q_values,
            &a,
            &self.rhs,
            &self.cones,
            self.settings.to_backend(verbose),
        );
        backend.solve();

        self.status = backend.solution.status.into();
        self.form
            .storage()
            .borrow_mut()
            .copy_from_slice(&backend.solution.x);

        !self.status.is_fatal()
    }

    /// The status of the most recent solve.
    pub fn exit_code(&self) -> SolveStatus {
        self.status
    }

    /// A human-readable description of the most recent solve.
    pub fn result_string(&self) -> &'static str {
        self.status.message()
    }

    /// Whether the current solution satisfies `l <= Ax <= u` within
    /// `tolerance`.
    pub fn is_feasible(&self, tolerance: f64) -> bool {
        self.form.max_violation() <= tolerance
    }

    /// The canonical form this adapter was built from.
    pub fn form(&self) -> &QpForm {
        &self.form
    }

    /// The number of optimization variables.
    pub fn num_variables(&self) -> usize {
        self.form.num_variables()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

impl fmt::Display for QpSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.form)
    }
}
