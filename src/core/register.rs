// src/core/register.rs

use super::error::RegisterId;
use std::fmt;

/// Handle to a quantum register: a named, integer-valued variable whose
/// values live as one column of the joint amplitude store.
///
/// The handle owns no data. It is only meaningful for the simulator that
/// allocated it, and stops being valid once the register is cleaned,
/// uncomputed or measured away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    id: RegisterId,
}

impl Register {
    pub(crate) fn new(id: RegisterId) -> Self {
        Self { id }
    }

    /// Gets the identifier of this register.
    pub fn id(&self) -> RegisterId {
        self.id
    }
}

impl From<Register> for RegisterId {
    fn from(reg: Register) -> Self {
        reg.id
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
