//! Solver adapters.
//!
//! An adapter canonicalizes a problem exactly once at construction and
//! afterwards only moves numbers: every `solve()` re-evaluates the
//! parameter matrices into fixed-sparsity buffers, hands them to the back
//! end, and copies the primal solution into the shared storage that linked
//! variables read from.

mod clarabel;

pub use self::clarabel::{QpSolver, SocpSolver};

use ::clarabel::solver::{DefaultSettings, DefaultSettingsBuilder, SolverStatus};

/// Outcome of a solve, mapped from the back end's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Optimal solution found.
    Optimal,
    /// Optimal solution found subject to reduced tolerances.
    AlmostOptimal,
    /// Certificate of primal infeasibility found.
    Infeasible,
    /// Certificate of dual infeasibility found.
    Unbounded,
    /// Maximum number of iterations reached.
    MaxIterations,
    /// Time limit reached.
    TimeLimit,
    /// Numerical difficulties, no usable result.
    NumericalError,
    /// The problem has not been solved or the status is unrecognized.
    Unknown,
}

impl SolveStatus {
    /// Whether the back end failed fatally. Non-convergence is reported,
    /// not fatal.
    pub fn is_fatal(self) -> bool {
        matches!(self, SolveStatus::NumericalError | SolveStatus::Unknown)
    }

    /// A human-readable description of the status.
    pub fn message(self) -> &'static str {
        match self {
            SolveStatus::Optimal => "Optimal solution found.",
            SolveStatus::AlmostOptimal => {
                "Optimal solution found subject to reduced tolerances."
            }
            SolveStatus::Infeasible => "Certificate of primal infeasibility found.",
            SolveStatus::Unbounded => "Certificate of dual infeasibility found.",
            SolveStatus::MaxIterations => "Maximum number of iterations reached.",
            SolveStatus::TimeLimit => "Time limit reached.",
            SolveStatus::NumericalError => "Numerical problems in solver.",
            SolveStatus::Unknown => "Problem has not been solved.",
        }
    }
}

impl From<SolverStatus> for SolveStatus {
    fn from(status: SolverStatus) -> Self {
        match status {
            SolverStatus::Solved => SolveStatus::Optimal,
            SolverStatus::AlmostSolved => SolveStatus::AlmostOptimal,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                SolveStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                SolveStatus::Unbounded
            }
            SolverStatus::MaxIterations => SolveStatus::MaxIterations,
            SolverStatus::MaxTime => SolveStatus::TimeLimit,
            SolverStatus::NumericalError => SolveStatus::NumericalError,
            _ => SolveStatus::Unknown,
        }
    }
}

/// Back-end settings shared by both adapters.
///
/// Verbosity is not part of the settings; it is the argument of each
/// `solve(verbose)` call.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum interior-point iterations.
    pub max_iter: u32,
    /// Time limit in seconds.
    pub time_limit: f64,
    /// Absolute duality gap tolerance.
    pub tol_gap_abs: f64,
    /// Relative duality gap tolerance.
    pub tol_gap_rel: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_iter: 200,
            time_limit: f64::INFINITY,
            tol_gap_abs: 1e-8,
            tol_gap_rel: 1e-8,
        }
    }
}

impl Settings {
    pub(crate) fn to_backend(&self, verbose: bool) -> DefaultSettings<f64> {
        DefaultSettingsBuilder::default()
            .verbose(verbose)
            .max_iter(self.max_iter)
            .time_limit(self.time_limit)
            .tol_gap_abs(self.tol_gap_abs)
            .tol_gap_rel(self.tol_gap_rel)
            .build()
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.max_iter, 200);
        assert!(settings.time_limit.is_infinite());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            SolveStatus::from(SolverStatus::Solved),
            SolveStatus::Optimal
        );
        assert_eq!(
            SolveStatus::from(SolverStatus::PrimalInfeasible),
            SolveStatus::Infeasible
        );
        assert_eq!(
            SolveStatus::from(SolverStatus::DualInfeasible),
            SolveStatus::Unbounded
        );
        assert!(SolveStatus::NumericalError.is_fatal());
        assert!(!SolveStatus::MaxIterations.is_fatal());
    }
}
