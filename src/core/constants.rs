//! Numerical tolerances shared by the engine.

/// Default tolerances used when a `SimulatorConfig` does not override them.
pub mod qreg_constants {
    /// Acceptance probabilities below this make `postselect` fail.
    pub const POSTSELECT_EPSILON: f64 = 1e-12;
    /// Amplitudes with a modulus at or below this are dropped after merging.
    pub const PRUNE_THRESHOLD: f64 = 1e-10;
    /// Amplitude modulus treated as zero by the clean and uncompute checks.
    pub const CLEAN_TOLERANCE: f64 = 1e-10;
    /// Allowed deviation of the total probability from 1.
    pub const NORM_TOLERANCE: f64 = 1e-9;
    /// Largest QFT block size; each branch fans out into this many.
    pub const MAX_QFT_MODULUS: u64 = 1 << 16;
    /// Used for phase angles (`e^(iθ)`)
    pub const PI: f64 = std::f64::consts::PI;
}
