//! Error handling logic

use std::fmt;
use thiserror::Error;

/// Unique identifier for a register within one simulator.
/// Identifiers are handed out in allocation order and never reused while
/// the simulator lives, so a stale handle can always be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub u64);

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R({})", self.0)
    }
}

/// Failures raised by the register engine.
///
/// Every error is reported synchronously by the call that caused it. The
/// engine computes a whole new state before committing it, so a failed call
/// leaves the amplitudes untouched; `Entanglement` is the one variant that
/// additionally invalidates the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QregError {
    /// Malformed initialization data: empty, duplicated or zero-norm
    /// distributions, or a non-integral value for an integer register.
    #[error("Dimension Error: {message}")]
    Dimension {
        /// Dimension failure message
        message: String,
    },

    /// A register was disposed while it still carried information, i.e. its
    /// value is not determined by the remaining registers.
    #[error("Entanglement Error ({register}): {message}")]
    Entanglement {
        /// Register that failed to disentangle
        register: RegisterId,
        /// Entanglement failure message
        message: String,
    },

    /// The postselected predicate has (numerically) zero probability.
    #[error("Postselection Failure: acceptance probability {probability:e} is indistinguishable from zero")]
    PostselectionFailure {
        /// The computed acceptance probability
        probability: f64,
    },

    /// An operation is inconsistent with the current simulator state.
    #[error("Invalid Operation: {message}")]
    InvalidOperation {
        /// InvalidOperation failure message
        message: String,
    },

    /// An expression could not be evaluated against a branch.
    #[error("Evaluation Error: {message}")]
    Evaluation {
        /// Evaluation failure message
        message: String,
    },
}

impl QregError {
    pub(crate) fn dimension(message: impl Into<String>) -> Self {
        QregError::Dimension { message: message.into() }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        QregError::InvalidOperation { message: message.into() }
    }

    pub(crate) fn evaluation(message: impl Into<String>) -> Self {
        QregError::Evaluation { message: message.into() }
    }

    pub(crate) fn entanglement(register: RegisterId, message: impl Into<String>) -> Self {
        QregError::Entanglement { register, message: message.into() }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, QregError>;
