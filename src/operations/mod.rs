// src/operations/mod.rs

//! Defines the primitive operations the register engine can apply.
//!
//! Every state change made by the simulator goes through one of these
//! values, which is what allows a block of operations to be recorded into a
//! [`Circuit`](crate::circuits::Circuit) and replayed backwards.

pub mod expr;
pub mod qram;

pub use expr::{BinaryOp, Expr, UnaryOp, MAX_EXACT_INTEGER};
pub use qram::LookupTable;

use crate::core::{Register, RegisterId};
use num_complex::Complex;
use std::fmt;
use std::ops::Range;

/// How a freshly allocated register is filled in (and, inverted, how it is
/// expected to look when it is uncomputed).
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// A single value computed per branch from other registers.
    Value(Expr),
    /// Uniform real superposition over distinct values.
    Uniform(Vec<i64>),
    /// Constant complex coefficients, normalized before use.
    Amplitudes(Vec<(i64, Complex<f64>)>),
    /// Real coefficient expressions evaluated and normalized per branch.
    /// Used to load vector components under a controlled scope.
    Qram(Vec<(i64, Expr)>),
}

impl Init {
    /// Registers the initializer reads.
    pub fn registers(&self) -> Vec<RegisterId> {
        match self {
            Init::Value(e) => e.registers().into_iter().collect(),
            Init::Uniform(_) | Init::Amplitudes(_) => Vec::new(),
            Init::Qram(pairs) => {
                let mut out: Vec<RegisterId> = pairs.iter().flat_map(|(_, e)| e.registers()).collect();
                out.sort();
                out.dedup();
                out
            }
        }
    }

    pub(crate) fn depends_on(&self, id: RegisterId) -> bool {
        match self {
            Init::Value(e) => e.depends_on(id),
            Init::Uniform(_) | Init::Amplitudes(_) => false,
            Init::Qram(pairs) => pairs.iter().any(|(_, e)| e.depends_on(id)),
        }
    }
}

impl From<i64> for Init {
    fn from(v: i64) -> Self {
        Init::Value(Expr::from(v))
    }
}

impl From<i32> for Init {
    fn from(v: i32) -> Self {
        Init::Value(Expr::from(v))
    }
}

impl From<Expr> for Init {
    fn from(e: Expr) -> Self {
        Init::Value(e)
    }
}

impl From<Register> for Init {
    fn from(r: Register) -> Self {
        Init::Value(r.expr())
    }
}

impl From<Range<i64>> for Init {
    fn from(r: Range<i64>) -> Self {
        Init::Uniform(r.collect())
    }
}

impl From<Range<i32>> for Init {
    fn from(r: Range<i32>) -> Self {
        Init::Uniform(r.map(i64::from).collect())
    }
}

impl From<Vec<i64>> for Init {
    fn from(values: Vec<i64>) -> Self {
        Init::Uniform(values)
    }
}

impl From<&[i64]> for Init {
    fn from(values: &[i64]) -> Self {
        Init::Uniform(values.to_vec())
    }
}

impl fmt::Display for Init {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Init::Value(e) => write!(f, "{}", e),
            Init::Uniform(values) => write!(f, "uniform{:?}", values),
            Init::Amplitudes(pairs) => {
                write!(f, "{{")?;
                for (i, (v, c)) in pairs.iter().enumerate() {
                    write!(f, "{}{}: {:.4}", if i > 0 { ", " } else { "" }, v, c)?;
                }
                write!(f, "}}")
            }
            Init::Qram(pairs) => {
                write!(f, "qram{{")?;
                for (i, (v, e)) in pairs.iter().enumerate() {
                    write!(f, "{}{}: {}", if i > 0 { ", " } else { "" }, v, e)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// In-place reversible arithmetic on a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `target += operand`
    Add,
    /// `target -= operand`
    Sub,
    /// `target ^= operand`
    Xor,
}

impl ArithOp {
    fn inverse(self) -> Self {
        match self {
            ArithOp::Add => ArithOp::Sub,
            ArithOp::Sub => ArithOp::Add,
            ArithOp::Xor => ArithOp::Xor,
        }
    }

    /// Applies the operation to a concrete value.
    pub fn apply(self, value: i64, operand: i64) -> i64 {
        match self {
            ArithOp::Add => value.wrapping_add(operand),
            ArithOp::Sub => value.wrapping_sub(operand),
            ArithOp::Xor => value ^ operand,
        }
    }
}

/// `-angle`, unwrapping an existing negation so inverting twice gives back
/// the same expression.
fn negated(angle: &Expr) -> Expr {
    match angle {
        Expr::Unary(UnaryOp::Neg, inner) => inner.as_ref().clone(),
        other => -other.clone(),
    }
}

/// A primitive state transformation.
///
/// Operations issued inside a controlled scope act only on branches where
/// every active condition holds; `BeginControl`/`EndControl` carry the scope
/// itself so that recorded circuits can be replayed and inverted.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Adds a register column holding 0 in every branch.
    Alloc { target: RegisterId },
    /// Fills a zero register according to `init`, inside the active scope.
    Init { target: RegisterId, init: Init },
    /// Inverse of `Init`: checks the register is exactly what `init` would
    /// produce and resets it to 0.
    Uncompute { target: RegisterId, init: Init },
    /// Removes a register column that holds 0 in every branch.
    Free { target: RegisterId },
    /// Hadamard on bit `bit` of the target register:
    /// `a|0⟩ + b|1⟩ → ((a+b)/√2)|0⟩ + ((a−b)/√2)|1⟩`.
    Hadamard { target: RegisterId, bit: u32 },
    /// Multiplies each branch by `e^(i·angle)`, with the angle evaluated per branch.
    Phase { angle: Expr },
    /// Exchanges the values of two registers.
    Swap { a: RegisterId, b: RegisterId },
    /// Flips `target_bit` of the register where `control_bit` is 1.
    Cnot { target: RegisterId, control_bit: u32, target_bit: u32 },
    /// Quantum Fourier transform within blocks of `modulus` consecutive values.
    Qft { target: RegisterId, modulus: u64, inverse: bool },
    /// Reversible arithmetic with an operand that does not read the target.
    Arith { target: RegisterId, op: ArithOp, operand: Expr },
    /// Pushes a control condition.
    BeginControl { condition: Expr },
    /// Pops the innermost control condition.
    EndControl { condition: Expr },
}

impl Operation {
    /// The operation that undoes this one.
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::Alloc { target } => Operation::Free { target: *target },
            Operation::Free { target } => Operation::Alloc { target: *target },
            Operation::Init { target, init } => Operation::Uncompute { target: *target, init: init.clone() },
            Operation::Uncompute { target, init } => Operation::Init { target: *target, init: init.clone() },
            Operation::Hadamard { .. } | Operation::Swap { .. } | Operation::Cnot { .. } => self.clone(),
            Operation::Phase { angle } => Operation::Phase { angle: negated(angle) },
            Operation::Qft { target, modulus, inverse } => Operation::Qft {
                target: *target,
                modulus: *modulus,
                inverse: !inverse,
            },
            Operation::Arith { target, op, operand } => Operation::Arith {
                target: *target,
                op: op.inverse(),
                operand: operand.clone(),
            },
            Operation::BeginControl { condition } => Operation::EndControl { condition: condition.clone() },
            Operation::EndControl { condition } => Operation::BeginControl { condition: condition.clone() },
        }
    }

    /// Registers whose values this operation may change.
    pub fn modified_registers(&self) -> Vec<RegisterId> {
        match self {
            Operation::Alloc { target }
            | Operation::Init { target, .. }
            | Operation::Uncompute { target, .. }
            | Operation::Free { target }
            | Operation::Hadamard { target, .. }
            | Operation::Cnot { target, .. }
            | Operation::Qft { target, .. }
            | Operation::Arith { target, .. } => vec![*target],
            Operation::Swap { a, b } => vec![*a, *b],
            Operation::Phase { .. } | Operation::BeginControl { .. } | Operation::EndControl { .. } => Vec::new(),
        }
    }

    /// Every register mentioned by the operation, modified or read.
    pub fn involved_registers(&self) -> Vec<RegisterId> {
        let mut out = self.modified_registers();
        match self {
            Operation::Init { init, .. } | Operation::Uncompute { init, .. } => out.extend(init.registers()),
            Operation::Phase { angle } => out.extend(angle.registers()),
            Operation::Arith { operand, .. } => out.extend(operand.registers()),
            Operation::BeginControl { condition } | Operation::EndControl { condition } => {
                out.extend(condition.registers())
            }
            _ => {}
        }
        out.sort();
        out.dedup();
        out
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Alloc { target } => write!(f, "alloc {}", target),
            Operation::Init { target, init } => write!(f, "init {} <- {}", target, init),
            Operation::Uncompute { target, init } => write!(f, "uncompute {} <- {}", target, init),
            Operation::Free { target } => write!(f, "free {}", target),
            Operation::Hadamard { target, bit } => write!(f, "H {}[{}]", target, bit),
            Operation::Phase { angle } => write!(f, "phase {}", angle),
            Operation::Swap { a, b } => write!(f, "swap {} {}", a, b),
            Operation::Cnot { target, control_bit, target_bit } => {
                write!(f, "cnot {}[{}] -> {}[{}]", target, control_bit, target, target_bit)
            }
            Operation::Qft { target, modulus, inverse } => {
                write!(f, "{} {} mod {}", if *inverse { "qft†" } else { "qft" }, target, modulus)
            }
            Operation::Arith { target, op, operand } => {
                let sym = match op {
                    ArithOp::Add => "+=",
                    ArithOp::Sub => "-=",
                    ArithOp::Xor => "^=",
                };
                write!(f, "{} {} {}", target, sym, operand)
            }
            Operation::BeginControl { condition } => write!(f, "if {} {{", condition),
            Operation::EndControl { .. } => write!(f, "}}"),
        }
    }
}
