//! Canonicalization of symbolic problems into solver matrix forms.

mod qp;
mod socp;

pub use qp::QpForm;
pub use socp::SocpForm;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::expr::variable::{SolutionStorage, Variable};

/// Assigns dense indices to variables in order of first use and owns the
/// solution storage all linked variables read from.
#[derive(Debug, Default)]
pub(crate) struct VariablePool {
    variables: Vec<Variable>,
    storage: SolutionStorage,
}

impl VariablePool {
    pub(crate) fn new() -> Self {
        VariablePool {
            variables: Vec::new(),
            storage: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Links `variable` on first use and returns its dense index.
    pub(crate) fn add(&mut self, variable: &Variable) -> Result<usize> {
        let fresh = variable.link_to(&self.storage, self.variables.len())?;
        if fresh {
            self.variables.push(variable.clone());
        }
        variable.problem_index()
    }

    pub(crate) fn len(&self) -> usize {
        self.variables.len()
    }

    /// Sizes the storage to the number of linked variables.
    pub(crate) fn finalize(&self) {
        self.storage.borrow_mut().resize(self.variables.len(), 0.0);
    }

    pub(crate) fn storage(&self) -> SolutionStorage {
        Rc::clone(&self.storage)
    }
}

impl Drop for VariablePool {
    /// Releases every link so the handles can be reused elsewhere or keep
    /// reading zero.
    fn drop(&mut self) {
        for variable in &self.variables {
            variable.unlink();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_insertion_order() {
        let mut pool = VariablePool::new();
        let x = Variable::scalar("x");
        let y = Variable::scalar("y");
        assert_eq!(pool.add(&x).unwrap(), 0);
        assert_eq!(pool.add(&y).unwrap(), 1);
        // Repeated use keeps the first index.
        assert_eq!(pool.add(&x).unwrap(), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn drop_unlinks_variables() {
        let x = Variable::scalar("x");
        {
            let mut pool = VariablePool::new();
            pool.add(&x).unwrap();
            pool.finalize();
            assert!(x.is_linked());
        }
        assert!(!x.is_linked());
        assert_eq!(x.solution(), 0.0);
    }

    #[test]
    fn storage_is_shared_with_variables() {
        let x = Variable::scalar("x");
        let mut pool = VariablePool::new();
        pool.add(&x).unwrap();
        pool.finalize();
        pool.storage().borrow_mut()[0] = 4.25;
        assert_eq!(x.solution(), 4.25);
    }
}
