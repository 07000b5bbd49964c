//! The scalar expression algebra.
//!
//! Expressions are built from four layers: a [`Term`] is a parameter
//! coefficient times a variable, an [`Affine`] is a list of terms plus a
//! parameter constant, a [`Product`] multiplies one or two affine forms,
//! and an [`Expr`] sums an affine form with a list of products, optionally
//! marked as a 2-norm. The operator set is restricted so that every
//! expression that can be built is convex when used as a cost term and can
//! be lowered to one of the canonical constraint shapes.
//!
//! Arithmetic operators panic on order violations, which keeps them usable
//! as the scalar type of nalgebra matrices. The `checked_*` methods return
//! the violation as an error instead.

use std::fmt;

use crate::error::{ModelError, Result};
use crate::expr::param::Parameter;
use crate::expr::variable::Variable;

/// A parameter coefficient attached to a variable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Term {
    pub(crate) parameter: Parameter,
    pub(crate) variable: Variable,
}

impl Term {
    pub(crate) fn evaluate(&self) -> f64 {
        self.parameter.value() * self.variable.solution()
    }
}

impl From<&Variable> for Term {
    fn from(variable: &Variable) -> Self {
        Term {
            parameter: Parameter::constant(1.0),
            variable: variable.clone(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.parameter.is_one() {
            write!(f, "{} * ", self.parameter)?;
        }
        write!(f, "{}", self.variable)
    }
}

/// A linear combination of variables plus a constant.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Affine {
    pub(crate) constant: Parameter,
    pub(crate) terms: Vec<Term>,
}

impl Affine {
    pub(crate) fn from_constant(constant: Parameter) -> Self {
        Affine {
            constant,
            terms: Vec::new(),
        }
    }

    pub(crate) fn from_term(term: Term) -> Self {
        Affine {
            constant: Parameter::default(),
            terms: vec![term],
        }
    }

    pub(crate) fn evaluate(&self) -> f64 {
        self.terms
            .iter()
            .fold(self.constant.value(), |acc, term| acc + term.evaluate())
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.terms.is_empty() && self.constant.is_zero()
    }

    pub(crate) fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub(crate) fn is_first_order(&self) -> bool {
        !self.terms.is_empty()
    }

    pub(crate) fn add_assign(&mut self, other: &Affine) {
        self.terms.extend(other.terms.iter().cloned());
        self.constant += &other.constant;
    }

    pub(crate) fn scale(&mut self, param: &Parameter) {
        self.constant *= param;
        for term in &mut self.terms {
            term.parameter *= param;
        }
    }

    pub(crate) fn checked_div_assign(&mut self, param: &Parameter) -> Result<()> {
        self.constant = self.constant.checked_div(param)?;
        for term in &mut self.terms {
            term.parameter = term.parameter.checked_div(param)?;
        }
        Ok(())
    }

    pub(crate) fn neg(&self) -> Affine {
        let mut out = self.clone();
        out.scale(&Parameter::constant(-1.0));
        out
    }

    pub(crate) fn sub(&self, other: &Affine) -> Affine {
        let mut out = self.clone();
        out.add_assign(&other.neg());
        out
    }

    /// Combines terms on the same variable and drops terms whose
    /// coefficient reduced to a literal zero. Idempotent, preserves the
    /// first occurrence order. Called only at canonicalization boundaries
    /// so user-visible term order stays as built.
    pub(crate) fn clean_up(&mut self) {
        let mut combined: Vec<Term> = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            match combined
                .iter_mut()
                .find(|t| t.variable == term.variable)
            {
                Some(existing) => existing.parameter += &term.parameter,
                None => combined.push(term.clone()),
            }
        }
        combined.retain(|t| !t.parameter.is_zero());
        self.terms = combined;
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            write!(f, "{term}")?;
            if i + 1 != self.terms.len() {
                write!(f, " + ")?;
            }
        }
        if !self.terms.is_empty() && !self.constant.is_zero() {
            write!(f, " + ")?;
        }
        if self.terms.is_empty() || !self.constant.is_zero() {
            write!(f, "{}", self.constant)?;
        }
        Ok(())
    }
}

/// A product of one or two affine forms. One factor means a square.
#[derive(Debug, Clone)]
pub(crate) struct Product {
    factors: Vec<Affine>,
}

impl Product {
    pub(crate) fn square(factor: Affine) -> Self {
        Product {
            factors: vec![factor],
        }
    }

    pub(crate) fn bilinear(lhs: Affine, rhs: Affine) -> Self {
        if lhs == rhs {
            Product::square(lhs)
        } else {
            Product {
                factors: vec![lhs, rhs],
            }
        }
    }

    pub(crate) fn is_square(&self) -> bool {
        self.factors.len() == 1
    }

    pub(crate) fn first_factor(&self) -> &Affine {
        &self.factors[0]
    }

    pub(crate) fn second_factor(&self) -> &Affine {
        if self.is_square() {
            &self.factors[0]
        } else {
            &self.factors[1]
        }
    }

    /// Rewrites a bilinear product as a square where possible.
    ///
    /// Needed for forms like `(p1 * x) * (p2 * x)`: two single-term
    /// factors on the same variable with zero constants collapse to
    /// `(sqrt(p1 * p2) * x)^2`. Anything else cannot appear under a norm.
    pub(crate) fn to_squared(&mut self) -> Result<()> {
        if self.is_square() {
            return Ok(());
        }
        let collapsible = self.factors[0].terms.len() == 1
            && self.factors[1].terms.len() == 1
            && self.factors[0].constant.is_zero()
            && self.factors[1].constant.is_zero()
            && self.factors[0].terms[0].variable == self.factors[1].terms[0].variable;
        if !collapsible {
            return Err(ModelError::InvalidOrder(
                "could not convert a product expression into a squared expression".into(),
            ));
        }
        let parameter =
            (&self.factors[0].terms[0].parameter * &self.factors[1].terms[0].parameter).sqrt()?;
        let variable = self.factors[0].terms[0].variable.clone();
        self.factors = vec![Affine::from_term(Term {
            parameter,
            variable,
        })];
        Ok(())
    }

    pub(crate) fn evaluate(&self) -> f64 {
        if self.is_square() {
            let v = self.factors[0].evaluate();
            v * v
        } else {
            self.factors[0].evaluate() * self.factors[1].evaluate()
        }
    }
}

impl PartialEq for Product {
    /// Factor order is irrelevant.
    fn eq(&self, other: &Self) -> bool {
        (self.first_factor() == other.first_factor()
            && self.second_factor() == other.second_factor())
            || (self.first_factor() == other.second_factor()
                && self.second_factor() == other.first_factor())
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_square() {
            write!(f, "({})^2", self.factors[0])
        } else {
            write!(f, "({}) * ({})", self.factors[0], self.factors[1])
        }
    }
}

/// A scalar expression: an affine part plus a list of products, with an
/// optional 2-norm marker.
///
/// The order of an expression is 0 when it is a bare constant, 1 when the
/// affine part carries terms and no products are present, and 2 as soon as
/// any product is present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expr {
    pub(crate) affine: Affine,
    pub(crate) products: Vec<Product>,
    pub(crate) norm: bool,
}

impl Expr {
    /// Evaluates the expression with the current parameter values and
    /// variable solutions.
    pub fn evaluate(&self) -> f64 {
        let mut sum: f64 = self.products.iter().map(Product::evaluate).sum();
        if self.norm {
            sum = sum.sqrt();
        }
        sum + self.affine.evaluate()
    }

    /// The polynomial order: 0 constant, 1 linear, 2 quadratic or norm.
    pub fn order(&self) -> usize {
        if !self.products.is_empty() {
            2
        } else if self.affine.is_first_order() {
            1
        } else {
            0
        }
    }

    /// Whether this expression represents a 2-norm.
    pub fn is_norm(&self) -> bool {
        self.norm
    }

    /// Addition under the norm mixing rules.
    ///
    /// A norm may not be added to any second-order expression and two
    /// norms may not be added, since the result would no longer describe a
    /// single cone. Everything else concatenates products and adds the
    /// affine parts.
    pub fn checked_add(&self, other: &Expr) -> Result<Expr> {
        let mut out = self.clone();
        out.checked_add_assign(other)?;
        Ok(out)
    }

    pub(crate) fn checked_add_assign(&mut self, other: &Expr) -> Result<()> {
        if (self.norm && other.order() == 2)
            || (self.order() == 2 && other.norm)
            || (self.norm && other.norm)
        {
            return Err(ModelError::InvalidOrder(
                "a 2-norm cannot be added to a second-order expression".into(),
            ));
        }
        self.affine.add_assign(&other.affine);
        self.products.extend(other.products.iter().cloned());
        self.norm |= other.norm;
        Ok(())
    }

    /// Subtraction. Only constant or linear expressions may be subtracted.
    pub fn checked_sub(&self, other: &Expr) -> Result<Expr> {
        let mut out = self.clone();
        out.checked_sub_assign(other)?;
        Ok(out)
    }

    pub(crate) fn checked_sub_assign(&mut self, other: &Expr) -> Result<()> {
        if other.order() > 1 {
            return Err(ModelError::InvalidOrder(
                "subtraction is not supported for higher-order expressions".into(),
            ));
        }
        self.affine.add_assign(&other.affine.neg());
        Ok(())
    }

    /// Multiplication. Both factors have to be constant or linear. Two
    /// first-order factors form a product; otherwise the constant side
    /// scales the other.
    pub fn checked_mul(&self, other: &Expr) -> Result<Expr> {
        let mut out = self.clone();
        out.checked_mul_assign(other)?;
        Ok(out)
    }

    pub(crate) fn checked_mul_assign(&mut self, other: &Expr) -> Result<()> {
        if self.order() == 2 || other.order() == 2 {
            return Err(ModelError::InvalidOrder(
                "factors in a multiplication have to be constant or linear".into(),
            ));
        }
        if self.affine.is_first_order() && other.affine.is_first_order() {
            self.products
                .push(Product::bilinear(self.affine.clone(), other.affine.clone()));
            self.affine = Affine::default();
        } else if self.affine.is_constant() {
            let factor = self.affine.constant.clone();
            self.affine = other.affine.clone();
            self.affine.scale(&factor);
        } else {
            self.affine.scale(&other.affine.constant);
        }
        Ok(())
    }

    /// Division. The dividend has to be constant or linear, the divisor a
    /// constant.
    pub fn checked_div(&self, other: &Expr) -> Result<Expr> {
        let mut out = self.clone();
        out.checked_div_assign(other)?;
        Ok(out)
    }

    pub(crate) fn checked_div_assign(&mut self, other: &Expr) -> Result<()> {
        if self.order() == 2 {
            return Err(ModelError::InvalidOrder(
                "the dividend has to be constant or linear".into(),
            ));
        }
        if other.order() > 0 {
            return Err(ModelError::InvalidOrder(
                "the divisor has to be constant".into(),
            ));
        }
        self.affine.checked_div_assign(&other.affine.constant)
    }

    /// Square root, legal only for purely quadratic expressions.
    ///
    /// Every product is coerced to a square and a constant part is
    /// promoted to a squared constant factor, so the result is a 2-norm of
    /// affine forms. Linear terms cannot appear under the root.
    pub fn checked_sqrt(&self) -> Result<Expr> {
        let mut out = self.clone();
        for product in &mut out.products {
            product.to_squared()?;
        }
        if !out.affine.is_constant() {
            return Err(ModelError::InvalidOrder(
                "can only take the square root when no linear terms are present".into(),
            ));
        }
        if !out.affine.constant.is_zero() {
            let root = out.affine.constant.sqrt()?;
            out.products.push(Product::square(Affine::from_constant(root)));
            out.affine = Affine::default();
        }
        out.norm = true;
        Ok(out)
    }

    /// The square of a constant or linear expression.
    pub fn checked_square(&self) -> Result<Expr> {
        if self.order() > 1 {
            return Err(ModelError::InvalidOrder(
                "only constant or linear expressions can be squared".into(),
            ));
        }
        Ok(Expr {
            affine: Affine::default(),
            products: vec![Product::square(self.affine.clone())],
            norm: false,
        })
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr {
            affine: Affine::from_constant(Parameter::constant(value)),
            products: Vec::new(),
            norm: false,
        }
    }
}

impl From<Parameter> for Expr {
    fn from(parameter: Parameter) -> Self {
        Expr {
            affine: Affine::from_constant(parameter),
            products: Vec::new(),
            norm: false,
        }
    }
}

impl From<&Variable> for Expr {
    fn from(variable: &Variable) -> Self {
        Expr {
            affine: Affine::from_term(Term::from(variable)),
            products: Vec::new(),
            norm: false,
        }
    }
}

impl From<Variable> for Expr {
    fn from(variable: Variable) -> Self {
        Expr::from(&variable)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.products.is_empty() {
            if self.norm {
                write!(f, "(")?;
            }
            for (i, product) in self.products.iter().enumerate() {
                write!(f, "{product}")?;
                if i + 1 < self.products.len() {
                    write!(f, " + ")?;
                }
            }
            if self.norm {
                write!(f, ")^(1/2)")?;
            }
        }
        if !self.affine.is_zero() && !self.products.is_empty() {
            write!(f, " + ")?;
        }
        if !self.affine.is_zero() || self.products.is_empty() {
            write!(f, "{}", self.affine)?;
        }
        Ok(())
    }
}

fn or_panic<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{e}"),
    }
}

impl std::ops::Add for &Expr {
    type Output = Expr;

    /// # Panics
    ///
    /// Panics when a 2-norm is mixed with a second-order expression. Use
    /// [`Expr::checked_add`] to handle the violation as an error.
    fn add(self, other: &Expr) -> Expr {
        or_panic(self.checked_add(other))
    }
}

impl std::ops::Sub for &Expr {
    type Output = Expr;

    /// # Panics
    ///
    /// Panics when the subtrahend is of second order.
    fn sub(self, other: &Expr) -> Expr {
        or_panic(self.checked_sub(other))
    }
}

impl std::ops::Mul for &Expr {
    type Output = Expr;

    /// # Panics
    ///
    /// Panics when either factor is of second order.
    fn mul(self, other: &Expr) -> Expr {
        or_panic(self.checked_mul(other))
    }
}

impl std::ops::Div for &Expr {
    type Output = Expr;

    /// # Panics
    ///
    /// Panics when the dividend is quadratic or the divisor is not a
    /// constant.
    fn div(self, other: &Expr) -> Expr {
        or_panic(self.checked_div(other))
    }
}

impl std::ops::Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        &Expr::from(-1.0) * self
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        -&self
    }
}

macro_rules! forward_expr_binop {
    ($trait:ident, $method:ident) => {
        impl std::ops::$trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, other: Expr) -> Expr {
                std::ops::$trait::$method(&self, &other)
            }
        }
        impl std::ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, other: &Expr) -> Expr {
                std::ops::$trait::$method(&self, other)
            }
        }
        impl std::ops::$trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, other: Expr) -> Expr {
                std::ops::$trait::$method(self, &other)
            }
        }
        impl std::ops::$trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, other: f64) -> Expr {
                std::ops::$trait::$method(&self, &Expr::from(other))
            }
        }
        impl std::ops::$trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, other: f64) -> Expr {
                std::ops::$trait::$method(self, &Expr::from(other))
            }
        }
        impl std::ops::$trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, other: Expr) -> Expr {
                std::ops::$trait::$method(&Expr::from(self), &other)
            }
        }
        impl std::ops::$trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, other: &Expr) -> Expr {
                std::ops::$trait::$method(&Expr::from(self), other)
            }
        }
    };
}

forward_expr_binop!(Add, add);
forward_expr_binop!(Sub, sub);
forward_expr_binop!(Mul, mul);
forward_expr_binop!(Div, div);

impl std::ops::AddAssign for Expr {
    fn add_assign(&mut self, other: Expr) {
        or_panic(self.checked_add_assign(&other));
    }
}

impl std::ops::SubAssign for Expr {
    fn sub_assign(&mut self, other: Expr) {
        or_panic(self.checked_sub_assign(&other));
    }
}

impl std::ops::MulAssign for Expr {
    fn mul_assign(&mut self, other: Expr) {
        or_panic(self.checked_mul_assign(&other));
    }
}

impl std::ops::DivAssign for Expr {
    fn div_assign(&mut self, other: Expr) {
        or_panic(self.checked_div_assign(&other));
    }
}

impl num_traits::Zero for Expr {
    fn zero() -> Self {
        Expr::default()
    }

    fn is_zero(&self) -> bool {
        self.products.is_empty() && self.affine.is_zero()
    }
}

impl num_traits::One for Expr {
    fn one() -> Self {
        Expr::from(1.0)
    }
}
