// src/simulation/engine.rs
use super::config::SimulatorConfig;
use super::results::OutcomeKey;
use crate::core::state::normalized_distribution;
use crate::core::{AmplitudeStore, BranchView, QregError, RegisterId, Result};
use crate::operations::{Expr, Init, Operation};
use log::trace;
use num_complex::Complex;
use num_traits::Zero;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashSet};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Applies operations to the amplitude store.
///
/// The engine knows nothing about recording or register protection; the
/// [`Simulator`](super::Simulator) decides what reaches it and passes the
/// active control conditions along with every operation.
pub(crate) struct SimulationEngine {
    store: AmplitudeStore,
    config: SimulatorConfig,
}

impl SimulationEngine {
    pub(crate) fn new(config: SimulatorConfig) -> Self {
        Self {
            store: AmplitudeStore::new(),
            config,
        }
    }

    pub(crate) fn store(&self) -> &AmplitudeStore {
        &self.store
    }

    pub(crate) fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Drops every register and returns to the single empty branch.
    pub(crate) fn reset(&mut self) {
        self.store = AmplitudeStore::new();
    }

    /// Applies one state-changing operation inside the scope described by
    /// `controls` (all must hold for a branch to be affected).
    pub(crate) fn apply_operation(&mut self, op: &Operation, controls: &[Expr]) -> Result<()> {
        let prune = Some(self.config.prune_threshold);
        let parallel = self.config.parallel_threshold;
        let scope = |b: &BranchView<'_>| in_scope(controls, b);

        match op {
            Operation::Alloc { target } => self.store.allocate(*target, &[(0, Complex::new(1.0, 0.0))])?,
            Operation::Free { target } => self.store.release_zero(*target, self.config.clean_tolerance)?,
            Operation::Init { target, init } => self.initialize(*target, init, controls)?,
            Operation::Uncompute { target, init } => self.uncompute(*target, init, controls)?,
            Operation::Hadamard { target, bit } => {
                let pos = self.position(*target)?;
                let mask = bit_mask(*bit)?;
                self.store.apply_local(
                    scope,
                    |b, amp| {
                        let mut values = b.values().to_vec();
                        let x = values[pos];
                        let half = amp * FRAC_1_SQRT_2;
                        let sign = if x & mask == 0 { 1.0 } else { -1.0 };
                        values[pos] = x & !mask;
                        let low = values.clone();
                        values[pos] = x | mask;
                        Ok(vec![(low, half), (values, half * sign)])
                    },
                    prune,
                    parallel,
                )?
            }
            Operation::Phase { angle } => self.store.apply_local(
                scope,
                |b, amp| {
                    let theta = angle.eval(b)?;
                    Ok(vec![(b.values().to_vec(), amp * Complex::from_polar(1.0, theta))])
                },
                None,
                parallel,
            )?,
            Operation::Swap { a, b: other } => {
                if a == other {
                    return Err(QregError::invalid(format!("cannot swap {} with itself", a)));
                }
                let (pa, pb) = (self.position(*a)?, self.position(*other)?);
                self.store.apply_local(
                    scope,
                    |b, amp| {
                        let mut values = b.values().to_vec();
                        values.swap(pa, pb);
                        Ok(vec![(values, amp)])
                    },
                    None,
                    parallel,
                )?
            }
            Operation::Cnot { target, control_bit, target_bit } => {
                if control_bit == target_bit {
                    return Err(QregError::invalid(format!(
                        "cnot on {} uses bit {} as both control and target",
                        target, control_bit
                    )));
                }
                let pos = self.position(*target)?;
                let (cmask, tmask) = (bit_mask(*control_bit)?, bit_mask(*target_bit)?);
                self.store.apply_local(
                    scope,
                    |b, amp| {
                        let mut values = b.values().to_vec();
                        if values[pos] & cmask != 0 {
                            values[pos] ^= tmask;
                        }
                        Ok(vec![(values, amp)])
                    },
                    None,
                    parallel,
                )?
            }
            Operation::Qft { target, modulus, inverse } => {
                let pos = self.position(*target)?;
                if *modulus > self.config.max_qft_modulus {
                    return Err(QregError::dimension(format!(
                        "QFT modulus {} exceeds the configured maximum {}",
                        modulus, self.config.max_qft_modulus
                    )));
                }
                let d = i64::try_from(*modulus)
                    .ok()
                    .filter(|d| *d >= 2)
                    .ok_or_else(|| QregError::dimension(format!("QFT modulus must be at least 2, got {}", modulus)))?;
                let norm = 1.0 / (d as f64).sqrt();
                let sign = if *inverse { -1.0 } else { 1.0 };
                self.store.apply_local(
                    scope,
                    |b, amp| {
                        let mut values = b.values().to_vec();
                        let x = values[pos];
                        let base = x.div_euclid(d) * d;
                        let k = x.rem_euclid(d) as i128;
                        let mut images = Vec::with_capacity(d as usize);
                        for j in 0..d {
                            values[pos] = base + j;
                            let turns = ((k * j as i128) % d as i128) as f64 / d as f64;
                            images.push((values.clone(), amp * Complex::from_polar(norm, sign * 2.0 * PI * turns)));
                        }
                        Ok(images)
                    },
                    prune,
                    parallel,
                )?
            }
            Operation::Arith { target, op: arith, operand } => {
                let pos = self.position(*target)?;
                self.store.apply_local(
                    scope,
                    |b, amp| {
                        let rhs = operand.eval_int(b)?;
                        let mut values = b.values().to_vec();
                        values[pos] = arith.apply(values[pos], rhs);
                        Ok(vec![(values, amp)])
                    },
                    None,
                    parallel,
                )?
            }
            Operation::BeginControl { .. } | Operation::EndControl { .. } => {
                return Err(QregError::invalid("control markers are not state transformations"));
            }
        }

        trace!("{} under {} controls -> {} branches", op, controls.len(), self.store.len());
        if self.config.validate_each_step {
            crate::validation::check_normalization(&self.store, Some(self.config.norm_tolerance))?;
        }
        Ok(())
    }

    fn initialize(&mut self, target: RegisterId, init: &Init, controls: &[Expr]) -> Result<()> {
        let pos = self.position(target)?;
        let coefficients = Coefficients::prepare(init)?;
        self.store.apply_local(
            |b| in_scope(controls, b),
            |b, amp| {
                let mut values = b.values().to_vec();
                if values[pos] != 0 {
                    return Err(QregError::invalid(format!(
                        "{} must hold 0 before it is initialized, found {}",
                        target, values[pos]
                    )));
                }
                let mut images = Vec::new();
                for (value, c) in coefficients.for_branch(b)? {
                    let weighted = amp * c;
                    if weighted.is_zero() {
                        continue;
                    }
                    values[pos] = value;
                    images.push((values.clone(), weighted));
                }
                Ok(images)
            },
            None,
            self.config.parallel_threshold,
        )
    }

    /// Projects each controlled group onto the state `init` would have
    /// prepared and resets the register to 0. A residual above
    /// `clean_tolerance` means the register carries other information.
    fn uncompute(&mut self, target: RegisterId, init: &Init, controls: &[Expr]) -> Result<()> {
        let coefficients = Coefficients::prepare(init)?;
        let tolerance = self.config.clean_tolerance;
        self.store.collapse_column(
            target,
            |b| in_scope(controls, b),
            |b, members| {
                let expected = coefficients.for_branch(b)?;
                let overlap = overlap(&expected, members);

                let mut residual: f64 = members
                    .iter()
                    .map(|(v, a)| (*a - overlap * coefficient(&expected, *v)).norm_sqr())
                    .sum();
                for (v, c) in &expected {
                    if !members.iter().any(|(m, _)| m == v) {
                        residual += (overlap * *c).norm_sqr();
                    }
                }

                let residual = residual.sqrt();
                if residual > tolerance {
                    return Err(QregError::entanglement(
                        target,
                        format!("register is not in the state it was prepared in (residual {:.3e})", residual),
                    ));
                }
                Ok((!overlap.is_zero()).then_some(overlap))
            },
        )
    }

    /// Removes a register whose value is determined by the others.
    pub(crate) fn clean(&mut self, target: RegisterId) -> Result<()> {
        self.store.dispose(target, self.config.clean_tolerance)
    }

    /// Projects onto the branches where `condition` holds and rescales them
    /// by `1/√p`. Returns `p`.
    pub(crate) fn postselect(&mut self, condition: &Expr) -> Result<f64> {
        let p = self.store.total_probability(|b| condition.holds(b))?;
        if p < self.config.postselect_epsilon {
            return Err(QregError::PostselectionFailure { probability: p });
        }
        self.store.retain_scaled(|b| condition.holds(b), 1.0 / p.sqrt())?;
        Ok(p)
    }

    /// Measures whether `target` is in the state `init` would prepare,
    /// given the other registers of each branch. With `postselect` the
    /// outcome is forced; otherwise it is sampled from `rng`. The state is
    /// projected onto the outcome (or its complement) and rescaled.
    /// Returns the outcome and its probability.
    pub(crate) fn measure_state(
        &mut self,
        target: RegisterId,
        init: &Init,
        postselect: Option<bool>,
        rng: &mut StdRng,
    ) -> Result<(bool, f64)> {
        let coefficients = Coefficients::prepare(init)?;
        let mut p_match = 0.0;
        for (key, members) in self.store.column_groups(target)? {
            let expected = coefficients.for_branch(&BranchView::new(self.store.columns(), &key))?;
            p_match += overlap(&expected, &members).norm_sqr();
        }
        let p_match = p_match.clamp(0.0, 1.0);

        let outcome = postselect.unwrap_or_else(|| rng.random::<f64>() < p_match);
        let p = if outcome { p_match } else { 1.0 - p_match };
        if p < self.config.postselect_epsilon {
            return Err(QregError::PostselectionFailure { probability: p });
        }

        let scale = 1.0 / p.sqrt();
        self.store.regroup_column(
            target,
            |_| Ok(true),
            |b, members| {
                let expected = coefficients.for_branch(b)?;
                let c = overlap(&expected, members);
                if outcome {
                    return Ok(expected.iter().map(|(v, e)| (*v, c * e * scale)).collect());
                }
                let mut rest: Vec<(i64, Complex<f64>)> = members
                    .iter()
                    .map(|(v, a)| (*v, (a - c * coefficient(&expected, *v)) * scale))
                    .collect();
                for (v, e) in &expected {
                    if !members.iter().any(|(m, _)| m == v) {
                        rest.push((*v, -c * e * scale));
                    }
                }
                Ok(rest)
            },
        )?;
        self.store.prune(self.config.prune_threshold);
        Ok((outcome, p))
    }

    /// Samples a joint outcome of `exprs`, collapses onto it and returns it.
    pub(crate) fn measure(&mut self, exprs: &[Expr], rng: &mut StdRng) -> Result<Vec<f64>> {
        let outcomes = self.distribution(exprs)?;
        let total: f64 = outcomes.values().sum();
        let mut remaining = rng.random::<f64>() * total;

        let mut chosen = None;
        for (key, p) in &outcomes {
            if remaining < *p {
                chosen = Some((key.clone(), *p));
                break;
            }
            remaining -= p;
        }
        // Rounding can leave a sliver past the last bucket.
        let (key, p) = chosen
            .or_else(|| outcomes.iter().next_back().map(|(k, p)| (k.clone(), *p)))
            .ok_or_else(|| QregError::invalid("cannot measure a state without branches"))?;
        if p <= 0.0 {
            return Err(QregError::invalid("measured outcome has zero probability"));
        }

        self.store.retain_scaled(|b| Ok(outcome_of(exprs, b)? == key), 1.0 / p.sqrt())?;
        Ok(key.0)
    }

    /// Probability of every joint outcome of `exprs`.
    pub(crate) fn distribution(&self, exprs: &[Expr]) -> Result<BTreeMap<OutcomeKey, f64>> {
        let mut out = BTreeMap::new();
        for (branch, amp) in self.store.iter() {
            *out.entry(outcome_of(exprs, &branch)?).or_insert(0.0) += amp.norm_sqr();
        }
        Ok(out)
    }

    /// Branch amplitudes grouped by the joint outcome of `exprs`.
    pub(crate) fn amplitudes(&self, exprs: &[Expr]) -> Result<BTreeMap<OutcomeKey, Vec<Complex<f64>>>> {
        let mut out: BTreeMap<OutcomeKey, Vec<Complex<f64>>> = BTreeMap::new();
        for (branch, amp) in self.store.iter() {
            out.entry(outcome_of(exprs, &branch)?).or_default().push(amp);
        }
        Ok(out)
    }

    pub(crate) fn prune(&mut self) {
        self.store.prune(self.config.prune_threshold);
    }

    fn position(&self, id: RegisterId) -> Result<usize> {
        self.store
            .columns()
            .position(id)
            .ok_or_else(|| QregError::invalid(format!("register {} is not live", id)))
    }
}

/// Per-branch coefficients of an initializer, validated once up front.
enum Coefficients<'a> {
    Fixed(Vec<(i64, Complex<f64>)>),
    Value(&'a Expr),
    Qram(&'a [(i64, Expr)]),
}

impl<'a> Coefficients<'a> {
    fn prepare(init: &'a Init) -> Result<Self> {
        match init {
            Init::Value(expr) => Ok(Coefficients::Value(expr)),
            Init::Uniform(values) => {
                let pairs: Vec<(i64, Complex<f64>)> = values.iter().map(|v| (*v, Complex::new(1.0, 0.0))).collect();
                Ok(Coefficients::Fixed(normalized_distribution(&pairs)?))
            }
            Init::Amplitudes(pairs) => Ok(Coefficients::Fixed(normalized_distribution(pairs)?)),
            Init::Qram(pairs) => {
                if pairs.is_empty() {
                    return Err(QregError::dimension("register distribution is empty"));
                }
                let mut seen = HashSet::with_capacity(pairs.len());
                for (value, _) in pairs.iter() {
                    if !seen.insert(*value) {
                        return Err(QregError::dimension(format!(
                            "value {} appears more than once in the distribution",
                            value
                        )));
                    }
                }
                Ok(Coefficients::Qram(pairs))
            }
        }
    }

    fn for_branch(&self, branch: &BranchView<'_>) -> Result<Vec<(i64, Complex<f64>)>> {
        match self {
            Coefficients::Fixed(pairs) => Ok(pairs.clone()),
            Coefficients::Value(expr) => Ok(vec![(expr.eval_int(branch)?, Complex::new(1.0, 0.0))]),
            Coefficients::Qram(pairs) => {
                let raw = pairs
                    .iter()
                    .map(|(v, e)| Ok((*v, Complex::new(e.eval(branch)?, 0.0))))
                    .collect::<Result<Vec<_>>>()?;
                normalized_distribution(&raw)
            }
        }
    }
}

fn coefficient(expected: &[(i64, Complex<f64>)], value: i64) -> Complex<f64> {
    expected
        .iter()
        .find(|(v, _)| *v == value)
        .map_or_else(Complex::zero, |(_, c)| *c)
}

/// `<expected|members>` over the values of one column.
fn overlap(expected: &[(i64, Complex<f64>)], members: &[(i64, Complex<f64>)]) -> Complex<f64> {
    members.iter().map(|(v, a)| coefficient(expected, *v).conj() * *a).sum()
}

fn in_scope(controls: &[Expr], branch: &BranchView<'_>) -> Result<bool> {
    for condition in controls {
        if !condition.holds(branch)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn outcome_of(exprs: &[Expr], branch: &BranchView<'_>) -> Result<OutcomeKey> {
    let values = exprs.iter().map(|e| e.eval(branch)).collect::<Result<Vec<f64>>>()?;
    Ok(OutcomeKey::new(values))
}

fn bit_mask(bit: u32) -> Result<i64> {
    if bit >= 63 {
        return Err(QregError::invalid(format!("bit index {} is out of range for a 64-bit register", bit)));
    }
    Ok(1i64 << bit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::ArithOp;
    use rand::SeedableRng;

    const TOL: f64 = 1e-12;

    fn engine_with(values: &[(RegisterId, Init)]) -> Result<SimulationEngine> {
        let mut engine = SimulationEngine::new(SimulatorConfig::default());
        for (id, init) in values {
            engine.apply_operation(&Operation::Alloc { target: *id }, &[])?;
            engine.apply_operation(&Operation::Init { target: *id, init: init.clone() }, &[])?;
        }
        Ok(engine)
    }

    #[test]
    fn hadamard_twice_is_identity() -> Result<()> {
        let r = RegisterId(0);
        let mut engine = engine_with(&[(r, Init::from(2))])?;
        let h = Operation::Hadamard { target: r, bit: 0 };
        engine.apply_operation(&h, &[])?;
        assert_eq!(engine.store().len(), 2);
        assert!((engine.store().amplitude(&[3]).re - FRAC_1_SQRT_2).abs() < TOL);

        engine.apply_operation(&h, &[])?;
        assert_eq!(engine.store().len(), 1);
        assert!((engine.store().amplitude(&[2]).re - 1.0).abs() < TOL);
        Ok(())
    }

    #[test]
    fn hadamard_on_one_gives_minus_state() -> Result<()> {
        let r = RegisterId(0);
        let mut engine = engine_with(&[(r, Init::from(1))])?;
        engine.apply_operation(&Operation::Hadamard { target: r, bit: 0 }, &[])?;
        assert!((engine.store().amplitude(&[0]).re - FRAC_1_SQRT_2).abs() < TOL);
        assert!((engine.store().amplitude(&[1]).re + FRAC_1_SQRT_2).abs() < TOL);
        Ok(())
    }

    #[test]
    fn qft_then_inverse_restores_state() -> Result<()> {
        let r = RegisterId(0);
        let mut engine = engine_with(&[(r, Init::Amplitudes(vec![(1, Complex::new(0.6, 0.0)), (6, Complex::new(0.0, 0.8))]))])?;
        let before = engine.store().clone();

        engine.apply_operation(&Operation::Qft { target: r, modulus: 4, inverse: false }, &[])?;
        assert_eq!(engine.store().len(), 8);
        engine.apply_operation(&Operation::Qft { target: r, modulus: 4, inverse: true }, &[])?;

        assert_eq!(engine.store().len(), 2);
        for values in [[1i64], [6]] {
            assert!((engine.store().amplitude(&values) - before.amplitude(&values)).norm() < TOL);
        }
        Ok(())
    }

    #[test]
    fn oversized_qft_modulus_is_rejected_before_touching_the_state() -> Result<()> {
        let r = RegisterId(0);
        let mut engine = engine_with(&[(r, Init::Uniform(vec![0, 1]))])?;
        let before = engine.store().clone();

        let err = engine
            .apply_operation(&Operation::Qft { target: r, modulus: 1 << 62, inverse: false }, &[])
            .unwrap_err();
        assert!(matches!(err, QregError::Dimension { .. }));
        assert_eq!(engine.store(), &before);
        Ok(())
    }

    #[test]
    fn arith_reads_operand_per_branch() -> Result<()> {
        let (a, b) = (RegisterId(0), RegisterId(1));
        let mut engine = engine_with(&[(a, Init::Uniform(vec![1, 2])), (b, Init::from(10))])?;
        engine.apply_operation(
            &Operation::Arith { target: b, op: ArithOp::Add, operand: Expr::Reg(a) * 3 },
            &[],
        )?;
        let marginal = engine.store().marginal(&[b])?;
        assert_eq!(marginal.keys().cloned().collect::<Vec<_>>(), vec![vec![13], vec![16]]);
        Ok(())
    }

    #[test]
    fn uncompute_rejects_wrong_state() -> Result<()> {
        let r = RegisterId(0);
        let mut engine = engine_with(&[(r, Init::Uniform(vec![0, 1]))])?;
        let wrong = Operation::Uncompute { target: r, init: Init::Uniform(vec![0, 2]) };
        let err = engine.apply_operation(&wrong, &[]).unwrap_err();
        assert!(matches!(err, QregError::Entanglement { .. }));
        assert_eq!(engine.store().len(), 2);

        engine.apply_operation(&Operation::Uncompute { target: r, init: Init::Uniform(vec![0, 1]) }, &[])?;
        assert_eq!(engine.store().len(), 1);
        assert!((engine.store().amplitude(&[0]).re - 1.0).abs() < TOL);
        Ok(())
    }

    #[test]
    fn postselect_rescales_survivors() -> Result<()> {
        let r = RegisterId(0);
        let mut engine = engine_with(&[(r, Init::Uniform(vec![0, 1, 2, 3]))])?;
        let p = engine.postselect(&Expr::Reg(r).less_than(1))?;
        assert!((p - 0.25).abs() < TOL);
        assert!((engine.store().norm_sqr() - 1.0).abs() < TOL);

        let err = engine.postselect(&Expr::Reg(r).equals(3)).unwrap_err();
        assert!(matches!(err, QregError::PostselectionFailure { probability } if probability == 0.0));
        Ok(())
    }

    #[test]
    fn measure_collapses_to_sampled_outcome() -> Result<()> {
        let r = RegisterId(0);
        let mut engine = engine_with(&[(r, Init::Uniform(vec![4, 5]))])?;
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = engine.measure(&[Expr::Reg(r)], &mut rng)?;
        assert!(outcome == vec![4.0] || outcome == vec![5.0]);
        assert_eq!(engine.store().len(), 1);
        assert!((engine.store().norm_sqr() - 1.0).abs() < TOL);
        Ok(())
    }
}
