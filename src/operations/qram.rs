// src/operations/qram.rs

//! Read-only classical lookup tables queried by register value.

use super::expr::Expr;
use crate::core::{QregError, Result};
use std::fmt;
use std::sync::Arc;

/// An immutable table of reals indexed by a register value.
///
/// This is the idealized QRAM of the distance algorithm: the table is fixed
/// when it is built and shared cheaply between every expression that reads
/// it, so a lookup is a pure function of the index for the whole run.
#[derive(Clone, PartialEq)]
pub struct LookupTable {
    name: Arc<str>,
    values: Arc<[f64]>,
}

impl LookupTable {
    /// Builds a table from the given values. Index `i` reads `values[i]`.
    pub fn new(name: &str, values: impl Into<Vec<f64>>) -> Self {
        Self {
            name: Arc::from(name),
            values: Arc::from(values.into()),
        }
    }

    /// Name used when the table is printed inside an expression.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads the entry at `index`.
    ///
    /// # Errors
    /// `QregError::Evaluation` if `index` is negative or past the end.
    pub fn get(&self, index: i64) -> Result<f64> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.values.get(i).copied())
            .ok_or_else(|| {
                QregError::evaluation(format!(
                    "lookup '{}' has no entry at index {} (size {})",
                    self.name,
                    index,
                    self.values.len()
                ))
            })
    }

    /// Expression reading this table at the (integer) value of `index`.
    pub fn at(&self, index: impl Into<Expr>) -> Expr {
        Expr::Lookup {
            table: self.clone(),
            index: Box::new(index.into()),
        }
    }
}

impl fmt::Debug for LookupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LookupTable({}, {:?})", self.name, &self.values[..])
    }
}
