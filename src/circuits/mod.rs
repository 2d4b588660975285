// src/circuits/mod.rs

//! Defines structures for representing and building ordered sequences of
//! operations (`qreg::operations::Operation`).
//!
//! A `Circuit` is what the simulator records while an inversion block runs:
//! the operations are captured instead of applied, and the block is then
//! executed backwards through [`Circuit::inverse`].

use crate::core::RegisterId;
use crate::operations::Operation;
use std::collections::BTreeSet;
use std::fmt;

/// An ordered sequence of operations together with the registers they touch.
///
/// Control scopes appear inline as `BeginControl`/`EndControl` pairs, so a
/// circuit replays with exactly the scoping it was recorded under (relative
/// to whatever scope is active when it is replayed).
#[derive(Clone, PartialEq)]
pub struct Circuit {
    /// Every register mentioned by any operation.
    registers: BTreeSet<RegisterId>,
    /// Operations in application order.
    operations: Vec<Operation>,
}

impl Circuit {
    /// Creates a new, empty circuit.
    pub fn new() -> Self {
        Self {
            registers: BTreeSet::new(),
            operations: Vec::new(),
        }
    }

    /// Appends one operation and records the registers it involves.
    pub fn add_operation(&mut self, op: Operation) {
        self.registers.extend(op.involved_registers());
        self.operations.push(op);
    }

    /// Appends every operation from `ops` in order.
    pub fn add_operations<I>(&mut self, ops: I)
    where
        I: IntoIterator<Item = Operation>,
    {
        for op in ops {
            self.add_operation(op);
        }
    }

    /// Removes the most recently added operation.
    ///
    /// The register set is left as is; it only ever over-approximates.
    pub(crate) fn pop_operation(&mut self) -> Option<Operation> {
        self.operations.pop()
    }

    /// Registers involved anywhere in the circuit, in id order.
    pub fn registers(&self) -> &BTreeSet<RegisterId> {
        &self.registers
    }

    /// The operations in application order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The circuit that undoes this one: operations in reverse order, each
    /// replaced by its inverse. Scope markers swap roles, so nesting stays
    /// balanced.
    pub fn inverse(&self) -> Circuit {
        Circuit {
            registers: self.registers.clone(),
            operations: self.operations.iter().rev().map(Operation::inverse).collect(),
        }
    }
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

//-------------------------------------------------------------------------
// Circuit Builder
//-------------------------------------------------------------------------

/// Builds a `Circuit` by method chaining, for replay with
/// [`Simulator::run_circuit`](crate::simulation::Simulator::run_circuit).
pub struct CircuitBuilder {
    circuit: Circuit,
}

impl CircuitBuilder {
    pub fn new() -> Self {
        Self { circuit: Circuit::new() }
    }

    /// Adds a single operation. Returns `self` for chaining.
    pub fn add_op(mut self, op: Operation) -> Self {
        self.circuit.add_operation(op);
        self
    }

    /// Adds multiple operations in order. Returns `self` for chaining.
    pub fn add_ops<I>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        self.circuit.add_operations(ops);
        self
    }

    /// Wraps the operations added by `body` in a control scope on `condition`.
    pub fn controlled<F>(self, condition: crate::operations::Expr, body: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let opened = self.add_op(Operation::BeginControl { condition: condition.clone() });
        body(opened).add_op(Operation::EndControl { condition })
    }

    pub fn build(self) -> Circuit {
        self.circuit
    }
}

impl Default for CircuitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "qreg::Circuit[{} operations on {} registers]",
            self.operations.len(),
            self.registers.len()
        )?;
        let mut depth = 1usize;
        for op in &self.operations {
            if matches!(op, Operation::EndControl { .. }) {
                depth = depth.saturating_sub(1).max(1);
            }
            writeln!(f, "{}{}", "  ".repeat(depth), op)?;
            if matches!(op, Operation::BeginControl { .. }) {
                depth += 1;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
