// src/validation/mod.rs

//! Provides functions to validate an `AmplitudeStore` against the invariants
//! the engine maintains.

use crate::core::{AmplitudeStore, BranchView, QregError, Result};
use crate::core::constants::qreg_constants::NORM_TOLERANCE;

/// Checks that the squared amplitudes sum to 1.
///
/// # Arguments
/// * `state` - The store to check.
/// * `tolerance` - Allowed deviation from 1.0; defaults to `NORM_TOLERANCE`.
///
/// # Returns
/// * `Ok(())` if normalized within tolerance.
/// * `Err(QregError::InvalidOperation)` otherwise.
pub fn check_normalization(state: &AmplitudeStore, tolerance: Option<f64>) -> Result<()> {
    let effective_tolerance = tolerance.unwrap_or(NORM_TOLERANCE);
    let norm_sq = state.norm_sqr();
    if (norm_sq - 1.0).abs() > effective_tolerance {
        Err(QregError::invalid(format!(
            "State normalization failed. Sum(|a|^2) = {} (Deviation > {})",
            norm_sq, effective_tolerance
        )))
    } else {
        Ok(())
    }
}

/// Checks that every branch where `predicate` is false has exactly the same
/// amplitude in `before` and `after`, and that no such branch appeared or
/// vanished. Both stores must have the same live registers.
///
/// This is the locality guarantee of a controlled scope: a block executed
/// under `predicate` is the identity on the complement.
pub fn check_scope_locality<P>(before: &AmplitudeStore, after: &AmplitudeStore, predicate: P) -> Result<()>
where
    P: Fn(&BranchView<'_>) -> Result<bool>,
{
    if before.columns() != after.columns() {
        return Err(QregError::invalid("stores have different live registers"));
    }
    for (store, other) in [(before, after), (after, before)] {
        for (branch, amp) in store.iter() {
            if predicate(&branch)? {
                continue;
            }
            let counterpart = other.amplitude(branch.values());
            if counterpart != amp {
                return Err(QregError::invalid(format!(
                    "branch {:?} outside the scope changed from {} to {}",
                    branch.values(),
                    amp,
                    counterpart
                )));
            }
        }
    }
    Ok(())
}

/// Performs the basic validation checks on a store: normalization and a
/// non-empty branch set.
pub fn validate_state(state: &AmplitudeStore, norm_tolerance: Option<f64>) -> Result<()> {
    if state.is_empty() {
        return Err(QregError::invalid("state has no branches"));
    }
    check_normalization(state, norm_tolerance)
}
