//! Decision-variable handles.
//!
//! A [`Variable`] is a shared handle to a named decision variable. Identity
//! is the shared source, so the same variable can appear in many terms.
//! Canonicalizers link each variable to a slot of their solution storage;
//! once a solver has run, the handle reads the primal value through that
//! link. Unlinked variables read zero, since a created variable may simply
//! be unused by the problem.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ModelError, Result};

/// Shared solution storage written by a solver and read by linked variables.
pub(crate) type SolutionStorage = Rc<RefCell<Vec<f64>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariableShape {
    Scalar,
    Vector,
    Matrix,
}

#[derive(Debug)]
struct Link {
    storage: SolutionStorage,
    index: usize,
}

#[derive(Debug)]
struct VariableSource {
    name: String,
    shape: VariableShape,
    index: (usize, usize),
    link: RefCell<Option<Link>>,
}

/// A handle to a single decision variable.
///
/// Two handles are equal when they share the same underlying source.
#[derive(Debug, Clone)]
pub struct Variable {
    source: Rc<VariableSource>,
}

impl Variable {
    fn new(name: &str, shape: VariableShape, index: (usize, usize)) -> Self {
        Variable {
            source: Rc::new(VariableSource {
                name: name.to_owned(),
                shape,
                index,
                link: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn scalar(name: &str) -> Self {
        Variable::new(name, VariableShape::Scalar, (0, 0))
    }

    pub(crate) fn vector_element(name: &str, row: usize) -> Self {
        Variable::new(name, VariableShape::Vector, (row, 0))
    }

    pub(crate) fn matrix_element(name: &str, row: usize, col: usize) -> Self {
        Variable::new(name, VariableShape::Matrix, (row, col))
    }

    /// The display name this variable was created under.
    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Whether the variable is currently linked to a solver.
    pub fn is_linked(&self) -> bool {
        self.source.link.borrow().is_some()
    }

    /// Links the variable to a slot of `storage`.
    ///
    /// Returns `true` when the link is fresh so callers can count new
    /// variables exactly once. Linking again to the same storage is a
    /// no-op; linking to a different storage is a conflict.
    pub(crate) fn link_to(&self, storage: &SolutionStorage, index: usize) -> Result<bool> {
        let mut link = self.source.link.borrow_mut();
        match link.as_ref() {
            Some(existing) => {
                if Rc::ptr_eq(&existing.storage, storage) {
                    Ok(false)
                } else {
                    Err(ModelError::LinkConflict(self.source.name.clone()))
                }
            }
            None => {
                *link = Some(Link {
                    storage: Rc::clone(storage),
                    index,
                });
                Ok(true)
            }
        }
    }

    /// Clears the solver link. The handle then reads zero again.
    pub(crate) fn unlink(&self) {
        *self.source.link.borrow_mut() = None;
    }

    /// The current solution value, or zero when unlinked.
    pub fn solution(&self) -> f64 {
        match self.source.link.borrow().as_ref() {
            Some(link) => link.storage.borrow()[link.index],
            // Unused variables are fine, they just read as zero.
            None => 0.0,
        }
    }

    /// The dense index assigned by the canonicalizer.
    pub fn problem_index(&self) -> Result<usize> {
        match self.source.link.borrow().as_ref() {
            Some(link) => Ok(link.index),
            None => Err(ModelError::UnlinkedVariable(self.source.name.clone())),
        }
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.source, &other.source)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.name)?;
        match self.source.shape {
            VariableShape::Scalar => {}
            VariableShape::Vector => write!(f, "[{}]", self.source.index.0)?,
            VariableShape::Matrix => {
                write!(f, "[{}, {}]", self.source.index.0, self.source.index.1)?
            }
        }
        if let Some(link) = self.source.link.borrow().as_ref() {
            write!(f, "@({})", link.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(len: usize) -> SolutionStorage {
        Rc::new(RefCell::new(vec![0.0; len]))
    }

    #[test]
    fn identity_is_by_source() {
        let x = Variable::scalar("x");
        let also_x = x.clone();
        let other = Variable::scalar("x");
        assert_eq!(x, also_x);
        assert_ne!(x, other);
    }

    #[test]
    fn unlinked_solution_reads_zero() {
        let x = Variable::scalar("x");
        assert_eq!(x.solution(), 0.0);
        assert!(matches!(
            x.problem_index(),
            Err(ModelError::UnlinkedVariable(_))
        ));
    }

    #[test]
    fn link_reads_through_storage() {
        let x = Variable::vector_element("x", 1);
        let s = storage(3);
        assert!(x.link_to(&s, 1).unwrap());
        s.borrow_mut()[1] = 7.5;
        assert_eq!(x.solution(), 7.5);
        assert_eq!(x.problem_index().unwrap(), 1);

        x.unlink();
        assert_eq!(x.solution(), 0.0);
    }

    #[test]
    fn relinking_same_storage_is_a_noop() {
        let x = Variable::scalar("x");
        let s = storage(1);
        assert!(x.link_to(&s, 0).unwrap());
        assert!(!x.link_to(&s, 0).unwrap());
    }

    #[test]
    fn relinking_different_storage_conflicts() {
        let x = Variable::scalar("x");
        let s1 = storage(1);
        let s2 = storage(1);
        x.link_to(&s1, 0).unwrap();
        assert!(matches!(
            x.link_to(&s2, 0),
            Err(ModelError::LinkConflict(_))
        ));
    }

    #[test]
    fn display_shows_shape_and_link() {
        let s = Variable::scalar("s");
        let v = Variable::vector_element("v", 2);
        let m = Variable::matrix_element("m", 1, 3);
        assert_eq!(format!("{s}"), "s");
        assert_eq!(format!("{v}"), "v[2]");
        assert_eq!(format!("{m}"), "m[1, 3]");

        let st = storage(5);
        v.link_to(&st, 4).unwrap();
        assert_eq!(format!("{v}"), "v[2]@(4)");
    }
}
