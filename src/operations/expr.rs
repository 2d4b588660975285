// src/operations/expr.rs

//! Derived expressions over register values.
//!
//! Comparing or combining registers never touches the amplitude store. It
//! builds an [`Expr`] tree that the engine evaluates separately against every
//! branch, which is how control predicates, phase angles, QRAM coefficients
//! and arithmetic operands are expressed.

use super::qram::LookupTable;
use crate::core::{BranchView, QregError, Register, RegisterId, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation (`0` becomes `1`, anything else becomes `0`).
    Not,
    /// Absolute value.
    Abs,
    /// Square root.
    Sqrt,
}

/// Binary operators. Comparisons and logical connectives yield `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Euclidean remainder, non-negative for positive divisors.
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A numeric expression evaluated per branch.
///
/// Booleans are represented as `0.0` (false) and `1.0` (true); any non-zero
/// value counts as true when an expression is used as a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A real constant.
    Const(f64),
    /// An integer constant, kept exact.
    Int(i64),
    /// The value a register holds in the branch.
    Reg(RegisterId),
    /// Bit `bit` (two's complement) of the register's value.
    Bit { reg: RegisterId, bit: u32 },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// A QRAM read: `table[index]`.
    Lookup { table: LookupTable, index: Box<Expr> },
}

/// Magnitude up to which every integer has an exact `f64` value (2^53).
/// Larger register values are still handled exactly by integer arithmetic,
/// but cannot be reported as `f64`.
pub const MAX_EXACT_INTEGER: i64 = 1 << 53;

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Bit `bit` (two's complement) of `v`; bits past 63 repeat the sign.
fn bit_of(v: i64, bit: u32) -> i64 {
    if bit >= 64 { i64::from(v < 0) } else { (v >> bit) & 1 }
}

impl Expr {
    pub(crate) fn unary(op: UnaryOp, arg: impl Into<Expr>) -> Expr {
        Expr::Unary(op, Box::new(arg.into()))
    }

    pub(crate) fn binary(op: BinaryOp, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary(op, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Always-true predicate.
    pub fn truth() -> Expr {
        Expr::Const(1.0)
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Eq, self, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ne, self, rhs)
    }

    pub fn less_than(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Lt, self, rhs)
    }

    pub fn at_most(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Le, self, rhs)
    }

    pub fn greater_than(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Gt, self, rhs)
    }

    pub fn at_least(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ge, self, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::And, self, rhs)
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Or, self, rhs)
    }

    pub fn abs(self) -> Expr {
        Expr::unary(UnaryOp::Abs, self)
    }

    pub fn sqrt(self) -> Expr {
        Expr::unary(UnaryOp::Sqrt, self)
    }

    /// The set of registers this expression reads.
    pub fn registers(&self) -> BTreeSet<RegisterId> {
        let mut out = BTreeSet::new();
        self.collect_registers(&mut out);
        out
    }

    fn collect_registers(&self, out: &mut BTreeSet<RegisterId>) {
        match self {
            Expr::Const(_) | Expr::Int(_) => {}
            Expr::Reg(id) | Expr::Bit { reg: id, .. } => {
                out.insert(*id);
            }
            Expr::Unary(_, arg) => arg.collect_registers(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_registers(out);
                rhs.collect_registers(out);
            }
            Expr::Lookup { index, .. } => index.collect_registers(out),
        }
    }

    /// Returns `true` if the expression reads `id`.
    pub fn depends_on(&self, id: RegisterId) -> bool {
        match self {
            Expr::Const(_) | Expr::Int(_) => false,
            Expr::Reg(r) | Expr::Bit { reg: r, .. } => *r == id,
            Expr::Unary(_, arg) => arg.depends_on(id),
            Expr::Binary(_, lhs, rhs) => lhs.depends_on(id) || rhs.depends_on(id),
            Expr::Lookup { index, .. } => index.depends_on(id),
        }
    }

    /// Evaluates the expression against one branch.
    ///
    /// Integer subexpressions are computed exactly first; the result is
    /// converted to `f64` only at the end.
    ///
    /// # Errors
    /// * `QregError::Evaluation` on division by zero, an out-of-range lookup,
    ///   integer overflow or a non-finite result.
    /// * `QregError::Dimension` if an integer value does not fit in `f64`
    ///   exactly (magnitude above [`MAX_EXACT_INTEGER`]).
    /// * `QregError::InvalidOperation` if a referenced register is not live.
    pub fn eval(&self, branch: &BranchView<'_>) -> Result<f64> {
        if let Some(v) = self.eval_exact(branch)? {
            return self.exact_to_f64(v);
        }
        let value = match self {
            Expr::Const(c) => *c,
            Expr::Int(v) => self.exact_to_f64(i128::from(*v))?,
            Expr::Reg(id) => self.exact_to_f64(i128::from(branch.value(*id)?))?,
            Expr::Bit { reg, bit } => bit_of(branch.value(*reg)?, *bit) as f64,
            Expr::Unary(op, arg) => {
                let a = arg.eval(branch)?;
                match op {
                    UnaryOp::Neg => -a,
                    UnaryOp::Not => truth(a == 0.0),
                    UnaryOp::Abs => a.abs(),
                    UnaryOp::Sqrt => {
                        if a < 0.0 {
                            return Err(QregError::evaluation(format!("square root of negative value {}", a)));
                        }
                        a.sqrt()
                    }
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(branch)?;
                let b = rhs.eval(branch)?;
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => {
                        if b == 0.0 {
                            return Err(QregError::evaluation(format!("division of {} by zero in '{}'", a, self)));
                        }
                        a / b
                    }
                    BinaryOp::Rem => {
                        if b == 0.0 {
                            return Err(QregError::evaluation(format!("remainder of {} by zero in '{}'", a, self)));
                        }
                        a.rem_euclid(b)
                    }
                    BinaryOp::Eq => truth(a == b),
                    BinaryOp::Ne => truth(a != b),
                    BinaryOp::Lt => truth(a < b),
                    BinaryOp::Le => truth(a <= b),
                    BinaryOp::Gt => truth(a > b),
                    BinaryOp::Ge => truth(a >= b),
                    BinaryOp::And => truth(a != 0.0 && b != 0.0),
                    BinaryOp::Or => truth(a != 0.0 || b != 0.0),
                }
            }
            Expr::Lookup { table, index } => {
                let i = index.eval_int(branch)?;
                table.get(i)?
            }
        };
        if !value.is_finite() {
            return Err(QregError::evaluation(format!("'{}' evaluated to a non-finite value", self)));
        }
        Ok(value)
    }

    /// Exact integer evaluation. `Ok(None)` when some subexpression is not
    /// integral (a fractional constant, a square root, a lookup or an
    /// inexact division), in which case the caller falls back to `f64`.
    fn eval_exact(&self, branch: &BranchView<'_>) -> Result<Option<i128>> {
        let overflow = || QregError::evaluation(format!("integer overflow in '{}'", self));
        let value = match self {
            Expr::Const(c) => {
                if c.fract() != 0.0 || c.abs() > MAX_EXACT_INTEGER as f64 {
                    return Ok(None);
                }
                *c as i128
            }
            Expr::Int(v) => i128::from(*v),
            Expr::Reg(id) => i128::from(branch.value(*id)?),
            Expr::Bit { reg, bit } => i128::from(bit_of(branch.value(*reg)?, *bit)),
            Expr::Unary(op, arg) => {
                let Some(a) = arg.eval_exact(branch)? else {
                    return Ok(None);
                };
                match op {
                    UnaryOp::Neg => a.checked_neg().ok_or_else(overflow)?,
                    UnaryOp::Not => i128::from(a == 0),
                    UnaryOp::Abs => a.checked_abs().ok_or_else(overflow)?,
                    UnaryOp::Sqrt => return Ok(None),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let (Some(a), Some(b)) = (lhs.eval_exact(branch)?, rhs.eval_exact(branch)?) else {
                    return Ok(None);
                };
                match op {
                    BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
                    BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
                    BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
                    BinaryOp::Div => {
                        if b == 0 {
                            return Err(QregError::evaluation(format!("division of {} by zero in '{}'", a, self)));
                        }
                        if a % b != 0 {
                            return Ok(None);
                        }
                        a / b
                    }
                    BinaryOp::Rem => {
                        if b == 0 {
                            return Err(QregError::evaluation(format!("remainder of {} by zero in '{}'", a, self)));
                        }
                        a.rem_euclid(b)
                    }
                    BinaryOp::Eq => i128::from(a == b),
                    BinaryOp::Ne => i128::from(a != b),
                    BinaryOp::Lt => i128::from(a < b),
                    BinaryOp::Le => i128::from(a <= b),
                    BinaryOp::Gt => i128::from(a > b),
                    BinaryOp::Ge => i128::from(a >= b),
                    BinaryOp::And => i128::from(a != 0 && b != 0),
                    BinaryOp::Or => i128::from(a != 0 || b != 0),
                }
            }
            Expr::Lookup { .. } => return Ok(None),
        };
        Ok(Some(value))
    }

    fn exact_to_f64(&self, v: i128) -> Result<f64> {
        if v.unsigned_abs() > MAX_EXACT_INTEGER as u128 {
            return Err(QregError::dimension(format!(
                "'{}' evaluated to {}, which has no exact floating-point value",
                self, v
            )));
        }
        Ok(v as f64)
    }

    /// Evaluates the expression as a predicate.
    pub fn holds(&self, branch: &BranchView<'_>) -> Result<bool> {
        if let Some(v) = self.eval_exact(branch)? {
            return Ok(v != 0);
        }
        Ok(self.eval(branch)? != 0.0)
    }

    /// Evaluates the expression and requires an integral result.
    ///
    /// # Errors
    /// `QregError::Dimension` if the value has a fractional part or does not
    /// fit an `i64`.
    pub fn eval_int(&self, branch: &BranchView<'_>) -> Result<i64> {
        if let Some(v) = self.eval_exact(branch)? {
            return i64::try_from(v).map_err(|_| {
                QregError::dimension(format!("'{}' evaluated to {}, which does not fit a register", self, v))
            });
        }
        let v = self.eval(branch)?;
        if v.fract() != 0.0 || v.abs() > MAX_EXACT_INTEGER as f64 {
            return Err(QregError::dimension(format!(
                "'{}' evaluated to {}, but registers only hold integers",
                self, v
            )));
        }
        Ok(v as i64)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Reg(id) => write!(f, "{}", id),
            Expr::Bit { reg, bit } => write!(f, "{}[{}]", reg, bit),
            Expr::Unary(UnaryOp::Neg, arg) => write!(f, "-({})", arg),
            Expr::Unary(UnaryOp::Not, arg) => write!(f, "!({})", arg),
            Expr::Unary(UnaryOp::Abs, arg) => write!(f, "|{}|", arg),
            Expr::Unary(UnaryOp::Sqrt, arg) => write!(f, "sqrt({})", arg),
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Lookup { table, index } => write!(f, "{}[{}]", table.name(), index),
        }
    }
}

impl From<f64> for Expr {
    fn from(c: f64) -> Self {
        Expr::Const(c)
    }
}

impl From<i64> for Expr {
    fn from(c: i64) -> Self {
        Expr::Int(c)
    }
}

impl From<i32> for Expr {
    fn from(c: i32) -> Self {
        Expr::Int(i64::from(c))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Const(truth(b))
    }
}

impl From<Register> for Expr {
    fn from(reg: Register) -> Self {
        Expr::Reg(reg.id())
    }
}

impl From<&Register> for Expr {
    fn from(reg: &Register) -> Self {
        Expr::Reg(reg.id())
    }
}

impl From<&Expr> for Expr {
    fn from(expr: &Expr) -> Self {
        expr.clone()
    }
}

impl Register {
    /// Expression for this register's value.
    pub fn expr(&self) -> Expr {
        Expr::Reg(self.id())
    }

    /// Expression for bit `bit` of this register's value.
    pub fn bit(&self, bit: u32) -> Expr {
        Expr::Bit { reg: self.id(), bit }
    }

    pub fn equals(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().equals(rhs)
    }

    pub fn not_equals(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().not_equals(rhs)
    }

    pub fn less_than(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().less_than(rhs)
    }

    pub fn at_most(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().at_most(rhs)
    }

    pub fn greater_than(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().greater_than(rhs)
    }

    pub fn at_least(&self, rhs: impl Into<Expr>) -> Expr {
        self.expr().at_least(rhs)
    }
}

macro_rules! impl_expr_ops {
    ($($lhs:ty),*) => {$(
        impl<R: Into<Expr>> Add<R> for $lhs {
            type Output = Expr;
            fn add(self, rhs: R) -> Expr { Expr::binary(BinaryOp::Add, self, rhs) }
        }
        impl<R: Into<Expr>> Sub<R> for $lhs {
            type Output = Expr;
            fn sub(self, rhs: R) -> Expr { Expr::binary(BinaryOp::Sub, self, rhs) }
        }
        impl<R: Into<Expr>> Mul<R> for $lhs {
            type Output = Expr;
            fn mul(self, rhs: R) -> Expr { Expr::binary(BinaryOp::Mul, self, rhs) }
        }
        impl<R: Into<Expr>> Div<R> for $lhs {
            type Output = Expr;
            fn div(self, rhs: R) -> Expr { Expr::binary(BinaryOp::Div, self, rhs) }
        }
        impl<R: Into<Expr>> Rem<R> for $lhs {
            type Output = Expr;
            fn rem(self, rhs: R) -> Expr { Expr::binary(BinaryOp::Rem, self, rhs) }
        }
        impl Neg for $lhs {
            type Output = Expr;
            fn neg(self) -> Expr { Expr::unary(UnaryOp::Neg, self) }
        }
        impl Not for $lhs {
            type Output = Expr;
            fn not(self) -> Expr { Expr::unary(UnaryOp::Not, self) }
        }
    )*};
}

impl_expr_ops!(Expr, Register);

// Scalars on the left: `t * norm` and `1 - bit`.
macro_rules! impl_scalar_lhs_ops {
    ($($scalar:ty),*) => {$(
        impl Add<Expr> for $scalar {
            type Output = Expr;
            fn add(self, rhs: Expr) -> Expr { Expr::binary(BinaryOp::Add, self, rhs) }
        }
        impl Sub<Expr> for $scalar {
            type Output = Expr;
            fn sub(self, rhs: Expr) -> Expr { Expr::binary(BinaryOp::Sub, self, rhs) }
        }
        impl Mul<Expr> for $scalar {
            type Output = Expr;
            fn mul(self, rhs: Expr) -> Expr { Expr::binary(BinaryOp::Mul, self, rhs) }
        }
        impl Add<Register> for $scalar {
            type Output = Expr;
            fn add(self, rhs: Register) -> Expr { Expr::binary(BinaryOp::Add, self, rhs) }
        }
        impl Sub<Register> for $scalar {
            type Output = Expr;
            fn sub(self, rhs: Register) -> Expr { Expr::binary(BinaryOp::Sub, self, rhs) }
        }
        impl Mul<Register> for $scalar {
            type Output = Expr;
            fn mul(self, rhs: Register) -> Expr { Expr::binary(BinaryOp::Mul, self, rhs) }
        }
    )*};
}

impl_scalar_lhs_ops!(f64, i64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::ColumnIndex;

    fn view<'a>(columns: &'a ColumnIndex, values: &'a [i64]) -> BranchView<'a> {
        BranchView::new(columns, values)
    }

    #[test]
    fn arithmetic_and_comparison_follow_branch_values() -> Result<()> {
        let a = Register::new(RegisterId(0));
        let b = Register::new(RegisterId(1));
        let columns = ColumnIndex::from_ids(&[a.id(), b.id()]);
        let values = [3, -2];
        let branch = view(&columns, &values);

        assert_eq!((a + b).eval(&branch)?, 1.0);
        assert_eq!((2.0 * a - b).eval(&branch)?, 8.0);
        assert_eq!(a.greater_than(b).eval(&branch)?, 1.0);
        assert_eq!(a.equals(3).and(b.less_than(0)).eval(&branch)?, 1.0);
        assert_eq!((!a.equals(3)).eval(&branch)?, 0.0);
        assert_eq!((b % 3).eval(&branch)?, 1.0);
        assert_eq!(b.bit(0).eval(&branch)?, 0.0);
        assert_eq!(b.bit(1).eval(&branch)?, 1.0);
        Ok(())
    }

    #[test]
    fn lookup_reads_table_by_register_value() -> Result<()> {
        let key = Register::new(RegisterId(7));
        let columns = ColumnIndex::from_ids(&[key.id()]);
        let norms = LookupTable::new("norms", vec![5.0, 0.5]);
        let angle = 0.02 * norms.at(key);

        assert!((angle.eval(&view(&columns, &[0]))? - 0.1).abs() < 1e-15);
        assert!((angle.eval(&view(&columns, &[1]))? - 0.01).abs() < 1e-15);
        assert!(matches!(angle.eval(&view(&columns, &[2])), Err(QregError::Evaluation { .. })));
        Ok(())
    }

    #[test]
    fn division_by_zero_and_fractional_integers_are_rejected() {
        let a = Register::new(RegisterId(0));
        let columns = ColumnIndex::from_ids(&[a.id()]);
        let values = [0];
        let branch = view(&columns, &values);

        assert!(matches!((Expr::from(1) / a).eval(&branch), Err(QregError::Evaluation { .. })));
        assert!(matches!((a + 0.5).eval_int(&branch), Err(QregError::Dimension { .. })));
    }

    #[test]
    fn integers_beyond_f64_precision_stay_exact() -> Result<()> {
        let a = Register::new(RegisterId(0));
        let b = Register::new(RegisterId(1));
        let big = MAX_EXACT_INTEGER + 1;
        let columns = ColumnIndex::from_ids(&[a.id(), b.id()]);
        let values = [big, MAX_EXACT_INTEGER];
        let branch = view(&columns, &values);

        assert_eq!((a + 1).eval_int(&branch)?, big + 1);
        assert_eq!((a - b).eval_int(&branch)?, 1);
        assert!(!a.equals(b).holds(&branch)?);
        assert!(a.equals(big).holds(&branch)?);
        assert_eq!(b.expr().eval(&branch)?, MAX_EXACT_INTEGER as f64);
        // No f64 can represent 2^53 + 1.
        assert!(matches!(a.expr().eval(&branch), Err(QregError::Dimension { .. })));
        Ok(())
    }

    #[test]
    fn integer_overflow_is_an_evaluation_error() {
        let a = Register::new(RegisterId(0));
        let columns = ColumnIndex::from_ids(&[a.id()]);
        let values = [i64::MAX];
        let branch = view(&columns, &values);

        assert!(matches!((a * a * a).eval_int(&branch), Err(QregError::Evaluation { .. })));
        assert!(matches!((a + 1).eval_int(&branch), Err(QregError::Dimension { .. })));
        assert_eq!((a / 2).eval(&branch).ok(), None);
        assert_eq!((Expr::from(7) / 2).eval(&branch).ok(), Some(3.5));
    }

    #[test]
    fn registers_lists_every_dependency() {
        let a = Register::new(RegisterId(0));
        let b = Register::new(RegisterId(4));
        let table = LookupTable::new("t", vec![1.0]);
        let e = a.equals(1).or(table.at(b).greater_than(0.5));

        let deps: Vec<RegisterId> = e.registers().into_iter().collect();
        assert_eq!(deps, vec![RegisterId(0), RegisterId(4)]);
        assert!(e.depends_on(RegisterId(4)));
        assert!(!e.depends_on(RegisterId(1)));
    }
}
