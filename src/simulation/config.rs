// src/simulation/config.rs

use crate::core::constants::qreg_constants::{
    CLEAN_TOLERANCE, MAX_QFT_MODULUS, NORM_TOLERANCE, POSTSELECT_EPSILON, PRUNE_THRESHOLD,
};

/// Tunable thresholds and execution parameters for a [`Simulator`](super::Simulator).
///
/// Fields are public so a config can be written as a struct literal with
/// `..Default::default()`; the `with_*` methods are for chaining.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// `postselect` fails when the acceptance probability is below this.
    pub postselect_epsilon: f64,
    /// Merged amplitudes with modulus at or below this are dropped. No
    /// renormalization follows.
    pub prune_threshold: f64,
    /// Branches with modulus at or below this are ignored by the clean and
    /// uncompute checks, which also use it as their residual tolerance.
    pub clean_tolerance: f64,
    /// Allowed deviation of the total probability from 1.
    pub norm_tolerance: f64,
    /// Check normalization after every primitive.
    pub validate_each_step: bool,
    /// Seed of the generator used by `measure`.
    pub seed: u64,
    /// Branch count from which per-branch work is sharded over threads
    /// (only with the `parallel` feature).
    pub parallel_threshold: usize,
    /// `qft` refuses larger moduli with a `Dimension` error.
    pub max_qft_modulus: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            postselect_epsilon: POSTSELECT_EPSILON,
            prune_threshold: PRUNE_THRESHOLD,
            clean_tolerance: CLEAN_TOLERANCE,
            norm_tolerance: NORM_TOLERANCE,
            validate_each_step: false,
            seed: 0x5eed,
            parallel_threshold: 1024,
            max_qft_modulus: MAX_QFT_MODULUS,
        }
    }
}

impl SimulatorConfig {
    pub fn with_postselect_epsilon(mut self, epsilon: f64) -> Self {
        self.postselect_epsilon = epsilon;
        self
    }

    pub fn with_prune_threshold(mut self, threshold: f64) -> Self {
        self.prune_threshold = threshold;
        self
    }

    pub fn with_clean_tolerance(mut self, tolerance: f64) -> Self {
        self.clean_tolerance = tolerance;
        self
    }

    pub fn with_norm_tolerance(mut self, tolerance: f64) -> Self {
        self.norm_tolerance = tolerance;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_each_step = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_max_qft_modulus(mut self, modulus: u64) -> Self {
        self.max_qft_modulus = modulus;
        self
    }
}
