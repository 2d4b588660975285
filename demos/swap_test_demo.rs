//! Example comparing pairs of register states with the swap test.
//! The acceptance probability is (1 + |<a|b>|^2) / 2.

use num_complex::Complex;
use qreg::{swap_test, Init, QregError, Register, Simulator};

type Prepare = fn(&mut Simulator) -> Result<(Register, Register), QregError>;

fn zeros(sim: &mut Simulator) -> Result<(Register, Register), QregError> {
    Ok((sim.named_reg("a", 0)?, sim.named_reg("b", 0)?))
}

fn zero_one(sim: &mut Simulator) -> Result<(Register, Register), QregError> {
    Ok((sim.named_reg("a", 0)?, sim.named_reg("b", 1)?))
}

fn plus_minus(sim: &mut Simulator) -> Result<(Register, Register), QregError> {
    let a = sim.named_reg("a", 0)?;
    let b = sim.named_reg("b", 1)?;
    sim.hadamard(a, 0)?;
    sim.hadamard(b, 0)?;
    Ok((a, b))
}

fn zero_plus(sim: &mut Simulator) -> Result<(Register, Register), QregError> {
    Ok((sim.named_reg("a", 0)?, sim.named_reg("b", 0..2)?))
}

fn complex_pair(sim: &mut Simulator) -> Result<(Register, Register), QregError> {
    let state = || Init::Amplitudes(vec![(0, Complex::new(0.6, 0.0)), (2, Complex::new(0.0, 0.8))]);
    Ok((sim.named_reg("a", state())?, sim.named_reg("b", state())?))
}

fn main() -> Result<(), QregError> {
    env_logger::init();
    println!("--- qreg Example: Swap Test ---");

    let cases: [(&str, f64, Prepare); 5] = [
        ("|0> vs |0>", 1.0, zeros),
        ("|0> vs |1>", 0.5, zero_one),
        ("|+> vs |->", 0.5, plus_minus),
        ("|0> vs |+>", 0.75, zero_plus),
        ("0.6|0> + 0.8i|2> vs itself", 1.0, complex_pair),
    ];

    let mut sim = Simulator::new();
    for (label, expected, prepare) in cases {
        sim.clear()?;
        let (a, b) = prepare(&mut sim)?;
        println!("\n{}", label);
        println!("{}", sim.amplitudes(&[a.expr(), b.expr()])?);

        let p = swap_test(&mut sim, a, b)?;
        println!("  swap test accepted w.p. {:.6} (expected {:.6})", p, expected);

        // After acceptance the pair is projected onto the symmetric subspace.
        println!("{}", sim.distribution(&[a.expr(), b.expr()])?);
    }
    Ok(())
}
