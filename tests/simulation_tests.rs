// tests/simulation_tests.rs

// Import necessary types from the qreg crate
use qreg::{
    check_normalization, check_scope_locality, swap_test, Circuit, CircuitBuilder, Expr, Init, Operation,
    QregError, Simulator, SimulatorConfig, MAX_EXACT_INTEGER,
};

use num_complex::Complex;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

const TOL: f64 = 1e-9;

fn assert_close(actual: f64, expected: f64, context: &str) {
    assert!(
        (actual - expected).abs() < TOL,
        "{}: expected {}, got {} (diff {:.3e})",
        context,
        expected,
        actual,
        (actual - expected).abs()
    );
}

fn c(re: f64) -> Complex<f64> {
    Complex::new(re, 0.0)
}

#[test]
fn test_primitives_preserve_normalization() -> Result<(), QregError> {
    let mut sim = Simulator::with_config(SimulatorConfig::default().with_validation(true));
    let a = sim.reg(Init::Amplitudes(vec![(0, c(1.0)), (3, c(2.0)), (5, Complex::new(0.0, 1.0))]))?;
    let b = sim.reg(0..3)?;

    sim.hadamard(a, 0)?;
    sim.hadamard(b, 1)?;
    sim.phase(a.expr() * 0.37 + b.expr())?;
    {
        let mut scope = sim.q_if(a.greater_than(2))?;
        scope.hadamard(b, 0)?;
        scope.phase_pi(0.25)?;
    }
    sim.swap(a, b)?;
    sim.qft(a, 3)?;
    sim.cnot(b, 0, 2)?;
    sim.add_assign(a, b.expr() * 2)?;

    check_normalization(sim.state(), Some(TOL))?;
    assert_close(sim.read_total_probability(Expr::truth())?, 1.0, "total probability");
    Ok(())
}

#[test]
fn test_scope_leaves_complement_bit_identical() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let key = sim.reg(0..4)?;
    let value = sim.reg(Init::Amplitudes(vec![(0, c(0.6)), (1, c(0.8))]))?;
    sim.phase(key.expr() * 0.1)?;
    let before = sim.state().clone();

    {
        let mut scope = sim.q_if(key.equals(2))?;
        scope.hadamard(value, 0)?;
        scope.phase(1.3)?;
        scope.add_assign(value, 4)?;
    }

    check_scope_locality(&before, sim.state(), |b| Ok(b.value(key.id())? == 2))?;
    Ok(())
}

#[test]
fn test_nested_scopes_conjoin_conditions() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..2)?;
    let y = sim.reg(0..2)?;
    let z = sim.reg(0)?;
    {
        let mut outer = sim.q_if(x.equals(1))?;
        let mut inner = outer.q_if(y.equals(1))?;
        inner.add_assign(z, 1)?;
        assert_eq!(inner.control_depth(), 2);
    }
    assert_eq!(sim.control_depth(), 0);

    let dist = sim.distribution(&[x.expr(), y.expr(), z.expr()])?;
    assert_close(dist.probability(&[1.0, 1.0, 1.0]), 0.25, "z set where both hold");
    assert_close(dist.probability(&[1.0, 0.0, 0.0]), 0.25, "z untouched elsewhere");
    assert_close(dist.probability(&[1.0, 1.0, 0.0]), 0.0, "no stale branch");
    Ok(())
}

#[test]
fn test_postselect_probability_bound() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(Init::Amplitudes(vec![(0, c(1.0)), (1, c(2.0)), (2, c(2.0))]))?;
    let condition = x.at_least(1);

    let p = sim.read_total_probability(condition.clone())?;
    assert!((0.0..=1.0).contains(&p));
    assert_close(p, 8.0 / 9.0, "probability before postselection");

    let accepted = sim.postselect(condition.clone())?;
    assert_close(accepted, p, "postselect returns the acceptance probability");
    assert_close(sim.read_total_probability(condition)?, 1.0, "probability after postselection");
    assert_close(sim.state().norm_sqr(), 1.0, "renormalized");
    Ok(())
}

#[test]
fn test_postselection_failure_keeps_state() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..2)?;
    let before = sim.state().clone();

    let err = sim.postselect(x.equals(7)).unwrap_err();
    assert!(matches!(err, QregError::PostselectionFailure { probability } if probability == 0.0));
    assert_eq!(sim.state(), &before);
    // Not fatal: the caller may continue.
    assert!(sim.is_valid());
    assert_close(sim.postselect(x.equals(1))?, 0.5, "retry with a reachable outcome");
    Ok(())
}

#[test]
fn test_clean_matches_marginal() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(Init::Amplitudes(vec![(0, c(1.0)), (1, c(3.0_f64.sqrt()))]))?;
    // y is a function of x, so it carries no extra information.
    let y = sim.reg(x.expr() * 3 + 1)?;
    let marginal = sim.state().marginal(&[x.id()])?;

    sim.clean(y)?;

    assert_eq!(sim.state().columns().ids(), &[x.id()]);
    let after = sim.state().marginal(&[x.id()])?;
    for (key, p) in &marginal {
        assert_close(after[key], *p, "marginal over x");
    }
    Ok(())
}

#[test]
fn test_clean_of_informative_register_invalidates() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..2)?;
    let y = sim.reg(0..2)?;

    let err = sim.clean(y).unwrap_err();
    assert!(matches!(err, QregError::Entanglement { register, .. } if register == y.id()));
    assert!(!sim.is_valid());
    assert!(matches!(sim.hadamard(x, 0), Err(QregError::InvalidOperation { .. })));

    sim.clear()?;
    assert!(sim.is_valid());
    assert_eq!(sim.state().len(), 1);
    let z = sim.reg(5)?;
    assert_eq!(sim.distribution(&[z.expr()])?.entries(), &[(vec![5.0], 1.0)]);
    Ok(())
}

#[test]
fn test_uncompute_inside_scope() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let key = sim.reg(0..2)?;
    let value = sim.reg(0)?;
    let load = Init::Amplitudes(vec![(1, c(1.0)), (2, c(-1.0))]);
    {
        let mut scope = sim.q_if(key.equals(1))?;
        scope.init(value, load.clone())?;
    }
    sim.phase(key.expr() * 0.5)?;
    {
        let mut scope = sim.q_if(key.equals(1))?;
        scope.uncompute(value, load)?;
    }

    assert_eq!(sim.state().columns().ids(), &[key.id()]);
    assert_close(sim.state().amplitude(&[0]).re, FRAC_1_SQRT_2, "key 0");
    let expected = Complex::from_polar(FRAC_1_SQRT_2, 0.5);
    assert!((sim.state().amplitude(&[1]) - expected).norm() < TOL);
    Ok(())
}

#[test]
fn test_qram_init_loads_rows_by_key() -> Result<(), QregError> {
    // Component i of the vector stored under each key.
    let x0 = qreg::LookupTable::new("x0", vec![3.0, 0.0]);
    let x1 = qreg::LookupTable::new("x1", vec![4.0, 1.0]);
    let mut sim = Simulator::new();
    let key = sim.reg(0..2)?;
    let value = sim.reg(Init::Qram(vec![(0, x0.at(key)), (1, x1.at(key))]))?;

    let dist = sim.distribution(&[key.expr(), value.expr()])?;
    assert_close(dist.probability(&[0.0, 0.0]), 0.5 * 9.0 / 25.0, "key 0, component 0");
    assert_close(dist.probability(&[0.0, 1.0]), 0.5 * 16.0 / 25.0, "key 0, component 1");
    assert_close(dist.probability(&[1.0, 1.0]), 0.5, "key 1 only has component 1");
    Ok(())
}

#[test]
fn test_dimension_errors() {
    let mut sim = Simulator::new();
    assert!(matches!(sim.reg(Init::Uniform(vec![])), Err(QregError::Dimension { .. })));
    assert!(matches!(sim.reg(Init::Uniform(vec![1, 1])), Err(QregError::Dimension { .. })));
    assert!(matches!(
        sim.reg(Init::Amplitudes(vec![(0, c(0.0))])),
        Err(QregError::Dimension { .. })
    ));
    assert!(matches!(sim.reg(Expr::from(0.5)), Err(QregError::Dimension { .. })));
    assert!(sim.state().columns().is_empty());
    assert!(sim.is_valid());
}

#[test]
fn test_swap_test_identities() -> Result<(), QregError> {
    let mut sim = Simulator::new();

    // |+> and |->
    let a = sim.reg(0)?;
    let b = sim.reg(1)?;
    sim.hadamard(a, 0)?;
    sim.hadamard(b, 0)?;
    assert_close(swap_test(&mut sim, a, b)?, 0.5, "orthogonal states");

    sim.clear()?;
    let a = sim.reg(Init::Amplitudes(vec![(0, c(0.6)), (2, Complex::new(0.0, 0.8))]))?;
    let b = sim.reg(Init::Amplitudes(vec![(0, c(0.6)), (2, Complex::new(0.0, 0.8))]))?;
    assert_close(swap_test(&mut sim, a, b)?, 1.0, "identical states");

    sim.clear()?;
    let a = sim.reg(0)?;
    let b = sim.reg(0..2)?;
    assert_close(swap_test(&mut sim, a, b)?, 0.75, "overlap 1/2");
    Ok(())
}

#[test]
fn test_inverted_block_restores_state() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..3)?;
    let y = sim.reg(0)?;
    let before = sim.state().clone();

    let block = |s: &mut Simulator| -> Result<(), QregError> {
        s.add_assign(y, x.expr() + 2)?;
        s.hadamard(y, 1)?;
        let mut scope = s.q_if(x.equals(1))?;
        scope.phase(PI / 3.0)?;
        scope.xor_assign(y, 5)?;
        Ok(())
    };
    let circuit = sim.record(block)?;
    sim.run_circuit(&circuit)?;
    sim.run_circuit(&circuit.inverse())?;

    for (branch, amp) in before.iter() {
        assert!((sim.state().amplitude(branch.values()) - amp).norm() < TOL);
    }
    assert_eq!(sim.state().len(), before.len());

    sim.run_circuit(&circuit)?;
    sim.inverted(block)?;
    assert_eq!(sim.state().len(), before.len());
    Ok(())
}

#[test]
fn test_inverted_allocation_becomes_uncompute() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..4)?;
    let mut doubled = None;
    let circuit = sim.record(|s| {
        doubled = Some(s.reg(x.expr() * 2)?);
        Ok(())
    })?;
    assert!(matches!(circuit.operations(), [Operation::Alloc { .. }, Operation::Init { .. }]));

    sim.run_circuit(&circuit)?;
    assert_eq!(sim.state().columns().len(), 2);
    assert!(doubled.is_some());
    sim.run_circuit(&circuit.inverse())?;
    assert_eq!(sim.state().columns().ids(), &[x.id()]);
    Ok(())
}

#[test]
fn test_recorded_measurement_is_refused() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..2)?;
    let err = sim.record(|s| s.postselect(x.equals(0)).map(|_| ())).unwrap_err();
    assert!(matches!(err, QregError::InvalidOperation { .. }));
    assert!(!sim.is_recording());
    assert!(matches!(sim.record(|s| s.clear()), Err(QregError::InvalidOperation { .. })));
    Ok(())
}

#[test]
fn test_builder_circuit_replays_controlled_ops() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..2)?;
    let y = sim.reg(0)?;
    let circuit: Circuit = CircuitBuilder::new()
        .controlled(x.equals(1), |b| {
            b.add_op(Operation::Arith {
                target: y.id(),
                op: qreg::ArithOp::Add,
                operand: Expr::from(7),
            })
        })
        .build();

    sim.run_circuit(&circuit)?;
    let dist = sim.distribution(&[x.expr(), y.expr()])?;
    assert_close(dist.probability(&[1.0, 7.0]), 0.5, "controlled add");
    assert_close(dist.probability(&[0.0, 0.0]), 0.5, "complement untouched");

    let unbalanced = CircuitBuilder::new()
        .add_op(Operation::EndControl { condition: x.equals(1) })
        .build();
    assert!(matches!(sim.run_circuit(&unbalanced), Err(QregError::InvalidOperation { .. })));
    Ok(())
}

#[test]
fn test_measure_collapses_joint_outcome() -> Result<(), QregError> {
    let mut sim = Simulator::with_config(SimulatorConfig::default().with_seed(3));
    let x = sim.reg(0..4)?;
    let y = sim.reg(x.expr() + 10)?;

    let outcome = sim.measure(&[x.expr()])?;
    let dist = sim.distribution(&[x.expr(), y.expr()])?;
    assert_eq!(dist.len(), 1);
    assert_eq!(dist.entries()[0].0, vec![outcome[0], outcome[0] + 10.0]);
    assert_close(dist.entries()[0].1, 1.0, "collapsed");
    Ok(())
}

#[test]
fn test_distribution_and_amplitude_display() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.named_reg("x", 0)?;
    sim.hadamard(x, 0)?;
    sim.phase_pi(x.expr())?;

    let dist = sim.distribution(&[x.expr()])?;
    assert_eq!(dist.to_string(), "Distribution of [x]:\n  0 w.p. 0.50000\n  1 w.p. 0.50000\n");
    let amps = sim.amplitudes(&[x.expr()])?;
    assert_eq!(amps.to_string(), "Amplitudes of [x]:\n  0 w.a. 0.70711\n  1 w.a. -0.70711\n");
    assert_eq!(sim.register_name(x), Some("x"));
    Ok(())
}

#[test]
fn test_oversized_qft_is_a_dimension_error() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..2)?;
    let before = sim.state().clone();

    assert!(matches!(sim.qft(x, 1u64 << 62), Err(QregError::Dimension { .. })));
    assert_eq!(sim.state(), &before);
    assert!(sim.is_valid());

    let mut small = Simulator::with_config(SimulatorConfig::default().with_max_qft_modulus(4));
    let y = small.reg(0)?;
    assert!(matches!(small.qft(y, 8), Err(QregError::Dimension { .. })));
    small.qft(y, 4)?;
    assert_eq!(small.state().len(), 4);
    Ok(())
}

#[test]
fn test_large_integers_stay_exact() -> Result<(), QregError> {
    let big = MAX_EXACT_INTEGER + 1;
    let mut sim = Simulator::new();
    let x = sim.reg(Init::Uniform(vec![big]))?;
    let y = sim.reg(0)?;
    sim.add_assign(y, x)?;

    assert_close(sim.state().amplitude(&[big, big]).norm(), 1.0, "y holds x exactly");
    assert_close(sim.read_total_probability(x.equals(y))?, 1.0, "x == y");
    assert_close(sim.read_total_probability((y.expr() - x.expr()).equals(0))?, 1.0, "y - x == 0");
    // Such values have no exact f64 label.
    assert!(matches!(sim.distribution(&[x.expr()]), Err(QregError::Dimension { .. })));
    Ok(())
}

#[test]
fn test_sharded_and_serial_runs_agree() -> Result<(), QregError> {
    fn run(threshold: usize) -> Result<Vec<(Vec<f64>, Vec<Complex<f64>>)>, QregError> {
        let mut sim = Simulator::with_config(SimulatorConfig::default().with_parallel_threshold(threshold));
        let x = sim.reg(0..4)?;
        let y = sim.reg(Init::Amplitudes(vec![(0, c(0.6)), (3, Complex::new(0.0, 0.8))]))?;
        sim.hadamard(x, 1)?;
        sim.hadamard(y, 0)?;
        sim.phase(x.expr() * 0.3 + y.expr())?;
        {
            let mut scope = sim.q_if(x.greater_than(1))?;
            scope.qft(y, 4)?;
            scope.phase_pi(0.5)?;
        }
        sim.add_assign(y, x.expr() * 3)?;
        Ok(sim.amplitudes(&[x.expr(), y.expr()])?.entries().to_vec())
    }

    let sharded = run(1)?;
    let serial = run(usize::MAX)?;
    assert_eq!(sharded.len(), serial.len());
    for ((key_a, amps_a), (key_b, amps_b)) in sharded.iter().zip(&serial) {
        assert_eq!(key_a, key_b);
        assert_eq!(amps_a.len(), amps_b.len());
        for (a, b) in amps_a.iter().zip(amps_b) {
            assert_close((a - b).norm(), 0.0, "amplitude of the same branch");
        }
    }
    Ok(())
}

#[test]
fn test_measure_state_projects_onto_target_state() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0)?;
    let found = sim.measure_state(x, 0..2, Some(true))?;
    assert!(found.outcome);
    assert_close(found.probability, 0.5, "|<+|0>|^2");
    assert_close(sim.state().amplitude(&[0]).re, FRAC_1_SQRT_2, "|+> on 0");
    assert_close(sim.state().amplitude(&[1]).re, FRAC_1_SQRT_2, "|+> on 1");

    sim.clear()?;
    let x = sim.reg(0)?;
    let missed = sim.measure_state(x, 0..2, Some(false))?;
    assert!(!missed.outcome);
    assert_close(missed.probability, 0.5, "complement of |+>");
    assert_close(sim.state().amplitude(&[0]).re, FRAC_1_SQRT_2, "|-> on 0");
    assert_close(sim.state().amplitude(&[1]).re, -FRAC_1_SQRT_2, "|-> on 1");
    check_normalization(sim.state(), Some(TOL))?;
    Ok(())
}

#[test]
fn test_measure_state_reads_other_registers() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..2)?;
    let copy = sim.reg(x.expr())?;
    let p = sim.measure_state(copy, x.expr(), Some(true))?;
    assert_close(p.probability, 1.0, "copy matches x");

    let y = sim.reg(0..2)?;
    let p = sim.measure_state(y, x.expr(), Some(true))?;
    assert_close(p.probability, 0.5, "independent y matches x");
    assert_close(sim.read_total_probability(y.equals(x))?, 1.0, "y == x after projection");
    Ok(())
}

#[test]
fn test_measure_state_failures_keep_state() -> Result<(), QregError> {
    let mut sim = Simulator::with_config(SimulatorConfig::default().with_seed(11));
    let x = sim.reg(0..2)?;
    let before = sim.state().clone();

    let err = sim.measure_state(x, 0..2, Some(false)).unwrap_err();
    assert!(matches!(err, QregError::PostselectionFailure { .. }));
    assert!(matches!(
        sim.measure_state(x, x.expr() + 1, None),
        Err(QregError::InvalidOperation { .. })
    ));
    {
        let mut scope = sim.q_if(x.equals(1))?;
        assert!(matches!(scope.measure_state(x, 0, None), Err(QregError::InvalidOperation { .. })));
    }
    assert_eq!(sim.state(), &before);

    // A sampled outcome still leaves a normalized state consistent with it.
    let y = sim.reg(0)?;
    let sampled = sim.measure_state(y, 0..2, None)?;
    assert_close(sampled.probability, 0.5, "either outcome of |0> against |+>");
    let sign = if sampled.outcome { 1.0 } else { -1.0 };
    assert_close(sim.state().amplitude(&[1, 1]).re, sign * 0.5, "projected y");
    check_normalization(sim.state(), Some(TOL))?;
    Ok(())
}

#[test]
fn test_garbage_block_requires_its_registers_released() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..4)?;
    let y = sim.reg(0)?;

    sim.garbage(|s| {
        let doubled = s.reg(x.expr() * 2)?;
        s.add_assign(y, doubled.expr() + 1)?;
        s.uncompute(doubled, x.expr() * 2)
    })?;
    assert_close(sim.read_total_probability(y.equals(x.expr() * 2 + 1))?, 1.0, "y = 2x + 1");

    let err = sim
        .garbage(|s| {
            let kept = s.reg(x.expr() + 1)?;
            s.add_assign(y, kept)
        })
        .unwrap_err();
    assert!(matches!(err, QregError::InvalidOperation { .. }));
    assert!(sim.is_valid());
    Ok(())
}

#[test]
fn test_named_pile_outlives_its_block() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..4)?;

    let squared = sim.garbage_pile("scratch", |s| s.reg(x.expr() * x.expr()))?;
    assert_eq!(sim.pile_registers("scratch"), vec![squared]);
    assert!(matches!(sim.assert_pile_clean("scratch"), Err(QregError::InvalidOperation { .. })));
    sim.assert_pile_clean("never opened")?;

    // Registers outside any pile are not tracked.
    let free = sim.reg(0)?;
    sim.clean(free)?;

    sim.garbage_pile("scratch", |s| {
        s.garbage(|s| {
            let t = s.reg(1)?;
            s.clean(t)
        })?;
        s.clean(squared)
    })?;
    sim.assert_pile_clean("scratch")?;
    Ok(())
}

#[test]
fn test_inverted_block_empties_pile() -> Result<(), QregError> {
    let mut sim = Simulator::new();
    let x = sim.reg(0..4)?;
    let y = sim.reg(0)?;

    let compute = sim.record(|s| {
        let t = s.reg(x.expr() + 5)?;
        s.add_assign(y, t)?;
        Ok(())
    })?;
    sim.garbage_pile("ancilla", |s| s.run_circuit(&compute))?;
    assert_eq!(sim.pile_registers("ancilla").len(), 1);

    // Undoing the block releases the register it allocated.
    sim.garbage_pile("ancilla", |s| s.run_circuit(&compute.inverse()))?;
    sim.assert_pile_clean("ancilla")?;
    assert_eq!(sim.state().columns().len(), 2);
    Ok(())
}
