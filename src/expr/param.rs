//! Deferred-evaluation numeric parameters.
//!
//! A [`Parameter`] is a handle to a small expression DAG over literal
//! constants and user-owned value cells. The DAG is immutable after
//! construction and shared with `Rc`, so the same sub-expression can appear
//! in many matrix entries. Evaluation reads the current cell contents,
//! which is how problem data changes between solves without reformulation.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ModelError, Result};

/// A mutable numeric cell owned by the user.
///
/// Parameters created from a cell read whatever the cell holds at
/// evaluation time. Cloning is cheap and refers to the same cell.
///
/// ```
/// use coneform::expr::{ParamCell, Parameter};
///
/// let cell = ParamCell::new(1.0);
/// let p = Parameter::dynamic(&cell);
/// cell.set(3.14);
/// assert_eq!(p.value(), 3.14);
/// ```
#[derive(Debug, Clone)]
pub struct ParamCell(Rc<Cell<f64>>);

impl ParamCell {
    /// Creates a cell holding `value`.
    pub fn new(value: f64) -> Self {
        ParamCell(Rc::new(Cell::new(value)))
    }

    /// Stores a new value. Parameters see it on their next evaluation.
    pub fn set(&self, value: f64) {
        self.0.set(value);
    }

    /// Returns the current value.
    pub fn get(&self) -> f64 {
        self.0.get()
    }
}

#[derive(Debug)]
enum ParameterSource {
    Constant(f64),
    Pointer(Rc<Cell<f64>>),
    Add(Rc<ParameterSource>, Rc<ParameterSource>),
    Mul(Rc<ParameterSource>, Rc<ParameterSource>),
    Div(Rc<ParameterSource>, Rc<ParameterSource>),
    Sqrt(Rc<ParameterSource>),
}

impl ParameterSource {
    fn value(&self) -> f64 {
        match self {
            ParameterSource::Constant(v) => *v,
            ParameterSource::Pointer(cell) => cell.get(),
            ParameterSource::Add(a, b) => a.value() + b.value(),
            ParameterSource::Mul(a, b) => a.value() * b.value(),
            ParameterSource::Div(a, b) => {
                let divisor = b.value();
                debug_assert!(divisor != 0.0, "parameter division by zero");
                a.value() / divisor
            }
            ParameterSource::Sqrt(a) => {
                let radicand = a.value();
                debug_assert!(radicand >= 0.0, "parameter square root of a negative value");
                radicand.sqrt()
            }
        }
    }
}

fn source_eq(a: &Rc<ParameterSource>, b: &Rc<ParameterSource>) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    match (a.as_ref(), b.as_ref()) {
        (ParameterSource::Constant(x), ParameterSource::Constant(y)) => x == y,
        (ParameterSource::Pointer(x), ParameterSource::Pointer(y)) => Rc::ptr_eq(x, y),
        // Addition and multiplication compare commutatively.
        (ParameterSource::Add(a1, a2), ParameterSource::Add(b1, b2))
        | (ParameterSource::Mul(a1, a2), ParameterSource::Mul(b1, b2)) => {
            (source_eq(a1, b1) && source_eq(a2, b2)) || (source_eq(a1, b2) && source_eq(a2, b1))
        }
        (ParameterSource::Div(a1, a2), ParameterSource::Div(b1, b2)) => {
            source_eq(a1, b1) && source_eq(a2, b2)
        }
        (ParameterSource::Sqrt(x), ParameterSource::Sqrt(y)) => source_eq(x, y),
        _ => false,
    }
}

/// A deferred-evaluation scalar expression.
///
/// Arithmetic on parameters builds new DAG nodes. A few reductions happen
/// at construction time: addition and multiplication with a literal zero,
/// folding of constant operands, and division by a literal one. There is
/// no rewrite pass beyond that.
#[derive(Clone, Debug)]
pub struct Parameter {
    source: Rc<ParameterSource>,
}

impl Parameter {
    /// Creates a literal constant.
    pub fn constant(value: f64) -> Self {
        Parameter {
            source: Rc::new(ParameterSource::Constant(value)),
        }
    }

    /// Creates a dynamic parameter reading from `cell`.
    pub fn dynamic(cell: &ParamCell) -> Self {
        Parameter {
            source: Rc::new(ParameterSource::Pointer(Rc::clone(&cell.0))),
        }
    }

    /// Evaluates the DAG with the current cell contents.
    pub fn value(&self) -> f64 {
        self.source.value()
    }

    /// True only for a literal constant zero. A dynamic parameter that
    /// currently holds zero is not considered zero.
    pub fn is_zero(&self) -> bool {
        matches!(self.source.as_ref(), ParameterSource::Constant(v) if *v == 0.0)
    }

    /// True only for a literal constant one.
    pub fn is_one(&self) -> bool {
        matches!(self.source.as_ref(), ParameterSource::Constant(v) if *v == 1.0)
    }

    /// The literal value if this is a constant leaf.
    pub(crate) fn as_literal(&self) -> Option<f64> {
        match self.source.as_ref() {
            ParameterSource::Constant(v) => Some(*v),
            _ => None,
        }
    }

    /// Division that reports a literal-zero divisor instead of panicking.
    pub fn checked_div(&self, other: &Parameter) -> Result<Parameter> {
        if other.is_zero() {
            return Err(ModelError::NumericDomain(
                "found a division by zero".into(),
            ));
        }
        if self.is_zero() || other.is_one() {
            return Ok(self.clone());
        }
        if let (Some(a), Some(b)) = (self.as_literal(), other.as_literal()) {
            return Ok(Parameter::constant(a / b));
        }
        Ok(Parameter {
            source: Rc::new(ParameterSource::Div(
                Rc::clone(&self.source),
                Rc::clone(&other.source),
            )),
        })
    }

    /// Square root node. A literal negative constant is a domain error;
    /// non-literal sources are checked at evaluation time instead.
    pub fn sqrt(&self) -> Result<Parameter> {
        if self.is_zero() || self.is_one() {
            return Ok(self.clone());
        }
        if let Some(v) = self.as_literal() {
            if v < 0.0 {
                return Err(ModelError::NumericDomain(format!(
                    "square root of negative constant {v}"
                )));
            }
            return Ok(Parameter::constant(v.sqrt()));
        }
        Ok(Parameter {
            source: Rc::new(ParameterSource::Sqrt(Rc::clone(&self.source))),
        })
    }
}

impl Default for Parameter {
    fn default() -> Self {
        Parameter::constant(0.0)
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Parameter::constant(value)
    }
}

impl PartialEq for Parameter {
    /// Structural DAG equality. Constants compare by value, dynamic
    /// parameters by cell identity.
    fn eq(&self, other: &Self) -> bool {
        source_eq(&self.source, &other.source)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl std::ops::Add for &Parameter {
    type Output = Parameter;

    fn add(self, other: &Parameter) -> Parameter {
        if other.is_zero() {
            return self.clone();
        }
        if self.is_zero() {
            return other.clone();
        }
        if let (Some(a), Some(b)) = (self.as_literal(), other.as_literal()) {
            return Parameter::constant(a + b);
        }
        Parameter {
            source: Rc::new(ParameterSource::Add(
                Rc::clone(&self.source),
                Rc::clone(&other.source),
            )),
        }
    }
}

impl std::ops::Mul for &Parameter {
    type Output = Parameter;

    fn mul(self, other: &Parameter) -> Parameter {
        if self.is_zero() {
            return self.clone();
        }
        if other.is_zero() {
            return other.clone();
        }
        if let (Some(a), Some(b)) = (self.as_literal(), other.as_literal()) {
            return Parameter::constant(a * b);
        }
        Parameter {
            source: Rc::new(ParameterSource::Mul(
                Rc::clone(&self.source),
                Rc::clone(&other.source),
            )),
        }
    }
}

impl std::ops::Neg for &Parameter {
    type Output = Parameter;

    fn neg(self) -> Parameter {
        &Parameter::constant(-1.0) * self
    }
}

impl std::ops::Sub for &Parameter {
    type Output = Parameter;

    fn sub(self, other: &Parameter) -> Parameter {
        self + &(-other)
    }
}

impl std::ops::Div for &Parameter {
    type Output = Parameter;

    /// # Panics
    ///
    /// Panics when the divisor is a literal zero. Use
    /// [`Parameter::checked_div`] to handle that case as an error.
    fn div(self, other: &Parameter) -> Parameter {
        match self.checked_div(other) {
            Ok(p) => p,
            Err(e) => panic!("{e}"),
        }
    }
}

macro_rules! forward_param_binop {
    ($trait:ident, $method:ident) => {
        impl std::ops::$trait<Parameter> for Parameter {
            type Output = Parameter;
            fn $method(self, other: Parameter) -> Parameter {
                std::ops::$trait::$method(&self, &other)
            }
        }
        impl std::ops::$trait<&Parameter> for Parameter {
            type Output = Parameter;
            fn $method(self, other: &Parameter) -> Parameter {
                std::ops::$trait::$method(&self, other)
            }
        }
        impl std::ops::$trait<Parameter> for &Parameter {
            type Output = Parameter;
            fn $method(self, other: Parameter) -> Parameter {
                std::ops::$trait::$method(self, &other)
            }
        }
    };
}

forward_param_binop!(Add, add);
forward_param_binop!(Sub, sub);
forward_param_binop!(Mul, mul);
forward_param_binop!(Div, div);

impl std::ops::Neg for Parameter {
    type Output = Parameter;

    fn neg(self) -> Parameter {
        -&self
    }
}

impl std::ops::AddAssign<&Parameter> for Parameter {
    fn add_assign(&mut self, other: &Parameter) {
        *self = &*self + other;
    }
}

impl std::ops::MulAssign<&Parameter> for Parameter {
    fn mul_assign(&mut self, other: &Parameter) {
        *self = &*self * other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_arithmetic_folds() {
        let p0 = Parameter::constant(0.0);
        let p1 = Parameter::constant(1.0);
        let p2 = Parameter::constant(2.0);
        let p3 = Parameter::constant(3.0);

        assert_eq!((&p0 + &p1).value(), 1.0);
        assert_eq!((&p1 + &p2).value(), 3.0);
        assert_eq!((&p0 * &p2).value(), 0.0);
        assert_eq!((&p2 * &p0).value(), 0.0);
        assert_eq!((&p2 * &p3).value(), 6.0);
        assert_eq!((&p3 - &p1).value(), 2.0);
        assert_eq!((&p3 / &p2).value(), 1.5);

        // Folding keeps constants as constant leaves.
        assert!((&p1 + &p2).as_literal().is_some());
        assert!((&p2 * &p3).as_literal().is_some());
    }

    #[test]
    fn zero_and_one_are_literal_only() {
        let cell = ParamCell::new(0.0);
        let dynamic = Parameter::dynamic(&cell);
        assert!(!dynamic.is_zero());
        assert!(Parameter::constant(0.0).is_zero());
        assert!(Parameter::constant(1.0).is_one());
    }

    #[test]
    fn pointer_arithmetic_reads_cells() {
        let a = ParamCell::new(2.0);
        let b = ParamCell::new(3.0);
        let pa = Parameter::dynamic(&a);
        let pb = Parameter::dynamic(&b);

        let sum = &pa + &pb;
        let product = &pa * &pb;
        assert_eq!(sum.value(), 5.0);
        assert_eq!(product.value(), 6.0);

        a.set(10.0);
        assert_eq!(sum.value(), 13.0);
        assert_eq!(product.value(), 30.0);
    }

    #[test]
    fn equality_is_structural_and_commutative() {
        let a = ParamCell::new(1.0);
        let b = ParamCell::new(2.0);
        let pa = Parameter::dynamic(&a);
        let pb = Parameter::dynamic(&b);

        assert_eq!(pa, pa.clone());
        assert_ne!(pa, pb);
        assert_eq!(&pa + &pb, &pb + &pa);
        assert_eq!(&pa * &pb, &pb * &pa);
        assert_ne!(&pa * &pb, &pa + &pb);

        // Division does not commute.
        let d1 = pa.checked_div(&pb).unwrap();
        let d2 = pb.checked_div(&pa).unwrap();
        assert_ne!(d1, d2);

        // Constant folding makes structurally different sums equal.
        assert_eq!(
            Parameter::constant(1.0) + Parameter::constant(2.0),
            Parameter::constant(3.0)
        );
    }

    #[test]
    fn sqrt_of_constants() {
        assert_eq!(Parameter::constant(0.0).sqrt().unwrap().value(), 0.0);
        assert_eq!(Parameter::constant(1.0).sqrt().unwrap().value(), 1.0);
        assert_eq!(Parameter::constant(4.0).sqrt().unwrap().value(), 2.0);
        assert!(matches!(
            Parameter::constant(-1.0).sqrt(),
            Err(ModelError::NumericDomain(_))
        ));
    }

    #[test]
    fn sqrt_of_dynamic_defers() {
        let cell = ParamCell::new(9.0);
        let p = Parameter::dynamic(&cell).sqrt().unwrap();
        assert_eq!(p.value(), 3.0);
        cell.set(16.0);
        assert_eq!(p.value(), 4.0);
    }

    #[test]
    fn division_by_literal_zero_is_an_error() {
        let p = Parameter::constant(1.0);
        assert!(matches!(
            p.checked_div(&Parameter::constant(0.0)),
            Err(ModelError::NumericDomain(_))
        ));
    }

    #[test]
    fn division_shortcuts() {
        let cell = ParamCell::new(5.0);
        let p = Parameter::dynamic(&cell);
        // Dividing by a literal one returns the dividend unchanged.
        assert_eq!(p.checked_div(&Parameter::constant(1.0)).unwrap(), p);
        // A zero dividend stays zero.
        let zero = Parameter::constant(0.0);
        assert!(zero.checked_div(&p).unwrap().is_zero());
    }

    #[test]
    fn negation_multiplies_by_minus_one() {
        let p = Parameter::constant(2.5);
        assert_eq!((-&p).value(), -2.5);

        let cell = ParamCell::new(4.0);
        let q = Parameter::dynamic(&cell);
        let neg = -&q;
        cell.set(-1.0);
        assert_eq!(neg.value(), 1.0);
    }

    #[test]
    fn display_prints_the_current_value() {
        assert_eq!(format!("{}", Parameter::constant(2.0)), "2");
        let cell = ParamCell::new(1.5);
        assert_eq!(format!("{}", Parameter::dynamic(&cell)), "1.5");
    }
}
