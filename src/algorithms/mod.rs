// src/algorithms/mod.rs

//! Routines built from the simulator primitives: single-bit `σx` evolution,
//! the swap test, and the distance-to-centroid estimate that combines them.

pub mod centroid;

pub use centroid::{CentroidQuery, DistanceEstimate};

use crate::core::{Register, Result};
use crate::operations::Expr;
use crate::simulation::Simulator;

/// Applies `exp(-i·angle·σx)` to the one-bit register `bit`, as Hadamard,
/// the diagonal phase `angle·(2·bit − 1)`, Hadamard.
///
/// `angle` is evaluated per branch, so it may read other registers (for
/// example a norm looked up by a key register). Starting from `|0⟩`, the
/// branch ends up as `cos(angle)|0⟩ − i·sin(angle)|1⟩`; no small-angle
/// approximation is made.
pub fn evolve_sigma_x(sim: &mut Simulator, bit: Register, angle: impl Into<Expr>) -> Result<()> {
    let angle = angle.into();
    sim.hadamard(bit, 0)?;
    sim.phase(angle * (bit.bit(0) * 2 - 1))?;
    sim.hadamard(bit, 0)
}

/// Swap test between registers `a` and `b`.
///
/// Allocates an ancilla, puts it in `|+⟩`, swaps `a` and `b` where it is 1,
/// applies a second Hadamard and postselects it on 0. The ancilla is then
/// cleaned. Returns the acceptance probability `(1 + Tr(ρ_a·ρ_b))/2`, which
/// is `(1 + |⟨a|b⟩|²)/2` for unentangled pure states.
///
/// Must be called outside any controlled scope.
pub fn swap_test(sim: &mut Simulator, a: Register, b: Register) -> Result<f64> {
    let out = sim.named_reg("out", 0)?;
    sim.hadamard(out, 0)?;
    {
        let mut scope = sim.q_if(out.equals(1))?;
        scope.swap(a, b)?;
    }
    sim.hadamard(out, 0)?;
    let p = sim.postselect(out.equals(0))?;
    sim.clean(out)?;
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigma_x_evolution_matches_closed_form() -> Result<()> {
        let mut sim = Simulator::new();
        let bit = sim.reg(0)?;
        let theta: f64 = 0.3;
        evolve_sigma_x(&mut sim, bit, theta)?;

        let amp1 = sim.state().amplitude(&[1]);
        assert!((amp1.re).abs() < 1e-12);
        assert!((amp1.im + theta.sin()).abs() < 1e-12);
        assert!((sim.state().amplitude(&[0]).re - theta.cos()).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn swap_test_leaves_no_ancilla_behind() -> Result<()> {
        let mut sim = Simulator::new();
        let a = sim.reg(0..2)?;
        let b = sim.reg(0..2)?;
        let p = swap_test(&mut sim, a, b)?;
        assert!((p - 1.0).abs() < 1e-12);
        assert_eq!(sim.state().columns().ids(), &[a.id(), b.id()]);
        Ok(())
    }
}
