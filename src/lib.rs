// src/lib.rs

//! `qreg` - A library for simulating quantum registers
//!
//! The joint state of every live register is kept as a sparse map from
//! value assignments to complex amplitudes. On top of it the simulator
//! offers controlled scopes (`q_if`), Hadamard, phase, swap and arithmetic
//! primitives, postselection, measurement, and inversion of recorded
//! blocks. The `algorithms` module builds the swap test and a
//! distance-to-centroid estimate from these pieces.

pub mod core;
pub mod operations;
pub mod circuits;
pub mod simulation;
pub mod validation;
pub mod algorithms;

// Re-export the most common types for easier top-level use
pub use core::{AmplitudeStore, QregError, Register, RegisterId, Result};
pub use operations::{ArithOp, Expr, Init, LookupTable, Operation, MAX_EXACT_INTEGER};
pub use circuits::{Circuit, CircuitBuilder};
pub use simulation::{AmplitudeListing, ControlScope, Distribution, Simulator, SimulatorConfig, StateOutcome};
pub use validation::{check_normalization, check_scope_locality, validate_state};
pub use algorithms::{evolve_sigma_x, swap_test, CentroidQuery, DistanceEstimate};

// Example 1: Conditional superposition and postselection
// A key register selects which value gets loaded; postselecting on the
// value renormalizes the key distribution.
/// ```
/// use qreg::{Init, QregError, Simulator};
/// use num_complex::Complex;
///
/// let mut sim = Simulator::new();
/// let key = sim.named_reg("key", 0..2)?;
/// let value = sim.named_reg("value", 0)?;
/// {
///     let mut scope = sim.q_if(key.equals(1))?;
///     // |value> = (|0> + |1>)/√2, only where key == 1
///     scope.init(value, Init::Amplitudes(vec![(0, Complex::new(1.0, 0.0)), (1, Complex::new(1.0, 0.0))]))?;
/// }
/// println!("{}", sim.distribution(&[key.expr(), value.expr()])?);
///
/// let p = sim.postselect(value.equals(0))?;
/// assert!((p - 0.75).abs() < 1e-12);
/// let dist = sim.distribution(&[key.expr()])?;
/// assert!((dist.probability(&[0.0]) - 2.0 / 3.0).abs() < 1e-12);
/// # Ok::<(), QregError>(())
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item

// Example 2: Swap test
// Identical states pass with certainty, orthogonal ones half the time.
/// ```
/// use qreg::{swap_test, QregError, Simulator};
///
/// let mut sim = Simulator::new();
/// let a = sim.reg(0)?;
/// let b = sim.reg(1)?;
/// let p = swap_test(&mut sim, a, b)?;
/// assert!((p - 0.5).abs() < 1e-12);
///
/// sim.clear()?;
/// let a = sim.reg(3)?;
/// let b = sim.reg(3)?;
/// assert!((swap_test(&mut sim, a, b)? - 1.0).abs() < 1e-12);
/// # Ok::<(), QregError>(())
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item

// Example 3: Undoing a block
// `inverted` records the block and runs its inverse; the register can then
// be uncomputed from the state it was prepared in.
/// ```
/// use qreg::{Init, QregError, Simulator};
///
/// let mut sim = Simulator::new();
/// let x = sim.reg(Init::Uniform(vec![0, 1, 2, 3]))?;
/// sim.qft(x, 4)?;
/// sim.inverted(|s| s.qft(x, 4))?;
/// sim.uncompute(x, Init::Uniform(vec![0, 1, 2, 3]))?;
/// assert!(sim.state().columns().is_empty());
/// # Ok::<(), QregError>(())
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item
