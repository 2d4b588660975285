//! Example recording a block of operations, printing the circuit, and
//! undoing it with its inverse.

use qreg::{QregError, Simulator};

fn main() -> Result<(), QregError> {
    env_logger::init();
    println!("--- qreg Example: Recording and Inversion ---");

    let mut sim = Simulator::new();
    let x = sim.named_reg("x", 0..4)?;
    let y = sim.named_reg("y", 0)?;
    println!("\nInitial state:\n{}", sim.state());

    // y = 3x, then a Fourier transform on y where x is odd.
    let circuit = sim.record(|s| {
        s.add_assign(y, x.expr() * 3)?;
        let mut scope = s.q_if((x.expr() % 2).equals(1))?;
        scope.qft(y, 8)?;
        scope.phase_pi(y.expr() * 0.25)?;
        Ok(())
    })?;
    println!("\nRecorded block:\n{}", circuit);

    sim.run_circuit(&circuit)?;
    println!("\nAfter the block ({} branches):", sim.state().len());
    println!("{}", sim.distribution(&[x.expr(), y.expr()])?);

    let inverse = circuit.inverse();
    println!("\nInverse block:\n{}", inverse);
    sim.run_circuit(&inverse)?;
    println!("\nAfter the inverse ({} branches):", sim.state().len());
    println!("{}", sim.distribution(&[x.expr(), y.expr()])?);

    // y holds 0 again, so it can be released without touching x.
    sim.clean(y)?;
    println!("\nAfter cleaning y:\n{}", sim.state());
    Ok(())
}
