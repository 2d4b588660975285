// src/algorithms/centroid.rs
use super::{evolve_sigma_x, swap_test};
use crate::core::{QregError, Register, Result};
use crate::operations::{Init, LookupTable};
use crate::simulation::Simulator;
use log::debug;
use num_complex::Complex;
use std::fmt;

/// Distance from a vector `u` to the centroid of `v_1..v_M`, estimated from
/// two postselection probabilities.
///
/// The estimate prepares
///
/// * `φ ∝ |u|·|0⟩ − Σ_j |w_j|·|j⟩` on a key register, by evolving an
///   ancilla under `σx` for time `t` with the signed norms as a per-key
///   angle and postselecting the ancilla on 1;
/// * `ψ = (|0⟩|û⟩ + Σ_j |j⟩|ŵ_j⟩)/√(M+1)` on a key and a value register;
///
/// where `w_j = v_j/M`, then swap tests the two key registers.
///
/// With `Z = |u|² + Σ_j |w_j|²` and `K = M+1` keys, the probabilities are
/// `p_φ = Σ_k sin²(t·n_k)/K ≈ Z·t²/K` and
/// `p_swap = (1 + D²/(K·Z))/2`, giving the estimates
/// `Z ≈ K·p_φ/t²` and `D ≈ √(K·Z·|2·p_swap − 1|)`. For `M = 1` this is the
/// familiar `√(2·Z·|2p − 1|)`. The error comes only from `sin(x) ≈ x`, so
/// `t·max(|u|, |w_j|)` should be small.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidQuery {
    u: Vec<f64>,
    vs: Vec<Vec<f64>>,
    t: f64,
}

/// Probabilities read out of one run and the estimates derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimate {
    /// Acceptance probability of the `φ` preparation.
    pub p_phi: f64,
    /// Acceptance probability of the swap test.
    pub p_swap: f64,
    /// Estimate of `Z = |u|² + Σ_j |v_j/M|²`.
    pub z_estimate: f64,
    /// Estimate of `|u − (1/M)·Σ_j v_j|`.
    pub d_estimate: f64,
}

impl fmt::Display for DistanceEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p_phi = {:.6e}, p_swap = {:.6}, Z ≈ {:.6}, D ≈ {:.6}",
            self.p_phi, self.p_swap, self.z_estimate, self.d_estimate
        )
    }
}

impl CentroidQuery {
    /// # Errors
    /// * `Dimension` if `u` is empty, no `v_j` is given, or the dimensions
    ///   disagree.
    /// * `InvalidOperation` if `t` is not a positive finite number.
    pub fn new(u: Vec<f64>, vs: Vec<Vec<f64>>, t: f64) -> Result<Self> {
        if u.is_empty() {
            return Err(QregError::dimension("u must have at least one component"));
        }
        if vs.is_empty() {
            return Err(QregError::dimension("at least one vector v_j is required"));
        }
        if let Some((j, v)) = vs.iter().enumerate().find(|(_, v)| v.len() != u.len()) {
            return Err(QregError::dimension(format!(
                "v_{} has dimension {}, expected {}",
                j + 1,
                v.len(),
                u.len()
            )));
        }
        if !(t.is_finite() && t > 0.0) {
            return Err(QregError::invalid(format!("time step must be positive, got {}", t)));
        }
        Ok(Self { u, vs, t })
    }

    pub fn dimension(&self) -> usize {
        self.u.len()
    }

    /// Number of vectors `M` the centroid is taken over.
    pub fn count(&self) -> usize {
        self.vs.len()
    }

    pub fn time_step(&self) -> f64 {
        self.t
    }

    /// `(1/M)·Σ_j v_j`.
    pub fn centroid(&self) -> Vec<f64> {
        let m = self.vs.len() as f64;
        (0..self.u.len())
            .map(|i| self.vs.iter().map(|v| v[i]).sum::<f64>() / m)
            .collect()
    }

    /// The exact distance `|u − centroid|`, for comparison.
    pub fn classical_distance(&self) -> f64 {
        norm(&self.u.iter().zip(self.centroid()).map(|(a, b)| a - b).collect::<Vec<_>>())
    }

    /// The exact `Z = |u|² + Σ_j |v_j/M|²`.
    pub fn classical_z(&self) -> f64 {
        self.signed_norms().iter().map(|n| n * n).sum()
    }

    /// Vectors loaded per key: `u` for key 0 and `w_j = v_j/M` for key `j`.
    fn keyed_vectors(&self) -> Vec<Vec<f64>> {
        let m = self.vs.len() as f64;
        std::iter::once(self.u.clone())
            .chain(self.vs.iter().map(|v| v.iter().map(|x| x / m).collect()))
            .collect()
    }

    /// `[|u|, −|w_1|, …, −|w_M|]`.
    fn signed_norms(&self) -> Vec<f64> {
        self.keyed_vectors()
            .iter()
            .enumerate()
            .map(|(k, v)| if k == 0 { norm(v) } else { -norm(v) })
            .collect()
    }

    /// The norm lookup table queried by key during the `φ` preparation.
    pub fn norm_table(&self) -> LookupTable {
        LookupTable::new("norm", self.signed_norms())
    }

    fn keys(&self) -> Init {
        Init::Uniform((0..=self.vs.len() as i64).collect())
    }

    /// Prepares `φ` on a new key register. Returns the register and the
    /// acceptance probability `p_φ`.
    pub fn prepare_phi(&self, sim: &mut Simulator) -> Result<(Register, f64)> {
        let norms = self.norm_table();
        let key = sim.named_reg("phi.key", self.keys())?;
        let tmp = sim.named_reg("tmp", 0)?;
        evolve_sigma_x(sim, tmp, norms.at(key) * self.t)?;
        let p_phi = sim.postselect(tmp.equals(1))?;
        sim.clean(tmp)?;
        debug!("phi prepared over {} keys, p_phi = {:.6e}", self.vs.len() + 1, p_phi);
        Ok((key, p_phi))
    }

    /// Prepares `ψ` on a new key register and a value register holding the
    /// component index. Returns `(key, value)`.
    ///
    /// A zero vector has no direction; its key keeps the value register at
    /// 0, which does not affect the estimate because `φ` has no weight on
    /// that key.
    pub fn prepare_psi(&self, sim: &mut Simulator) -> Result<(Register, Register)> {
        let key = sim.named_reg("psi.key", self.keys())?;
        let value = sim.named_reg("psi.value", 0)?;
        for (k, vector) in self.keyed_vectors().into_iter().enumerate() {
            if norm(&vector) == 0.0 {
                continue;
            }
            let amplitudes = vector
                .iter()
                .enumerate()
                .map(|(i, x)| (i as i64, Complex::new(*x, 0.0)))
                .collect();
            let mut scope = sim.q_if(key.equals(k as i64))?;
            scope.init(value, Init::Amplitudes(amplitudes))?;
        }
        Ok((key, value))
    }

    /// Runs the whole estimate on `sim`, which must not be inside a scope
    /// or recording. The prepared registers are left allocated.
    pub fn estimate(&self, sim: &mut Simulator) -> Result<DistanceEstimate> {
        let (phi_key, p_phi) = self.prepare_phi(sim)?;
        let (psi_key, _) = self.prepare_psi(sim)?;
        let p_swap = swap_test(sim, phi_key, psi_key)?;

        let keys = (self.vs.len() + 1) as f64;
        let z_estimate = keys * p_phi / (self.t * self.t);
        let d_estimate = (keys * z_estimate * (2.0 * p_swap - 1.0).abs()).sqrt();
        let estimate = DistanceEstimate {
            p_phi,
            p_swap,
            z_estimate,
            d_estimate,
        };
        debug!("centroid estimate: {}", estimate);
        Ok(estimate)
    }

    /// Runs the estimate on a fresh default simulator.
    pub fn run(&self) -> Result<DistanceEstimate> {
        let mut sim = Simulator::new();
        self.estimate(&mut sim)
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
