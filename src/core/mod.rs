// src/core/mod.rs

//! Core data structures and types

pub mod error;
pub mod register;
pub mod state;

// Re-export public types for convenient access via `qreg::core::TypeName`
pub use error::{QregError, RegisterId, Result};
pub use register::Register;
pub use state::{AmplitudeStore, BranchView, ColumnIndex};

pub mod constants;
pub use constants::qreg_constants::PI; // Re-export
