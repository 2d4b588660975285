// src/simulation/scope.rs
use super::Simulator;
use std::ops::{Deref, DerefMut};

/// Guard for an open controlled scope, returned by [`Simulator::q_if`].
///
/// While the guard lives, every primitive issued through it acts only on
/// branches where the scope's condition (and every enclosing one) holds.
/// The condition is popped when the guard is dropped, on every exit path
/// including `?` returns and panics.
///
/// ```
/// # use qreg::{Simulator, QregError};
/// # fn main() -> Result<(), QregError> {
/// let mut sim = Simulator::new();
/// let key = sim.reg(0..2)?;
/// let value = sim.reg(0)?;
/// {
///     let mut scope = sim.q_if(key.equals(1))?;
///     scope.add_assign(value, 5)?;
/// }
/// assert_eq!(sim.control_depth(), 0);
/// # Ok(())
/// # }
/// ```
pub struct ControlScope<'a> {
    sim: &'a mut Simulator,
}

impl<'a> ControlScope<'a> {
    pub(crate) fn new(sim: &'a mut Simulator) -> Self {
        Self { sim }
    }
}

impl Deref for ControlScope<'_> {
    type Target = Simulator;

    fn deref(&self) -> &Simulator {
        self.sim
    }
}

impl DerefMut for ControlScope<'_> {
    fn deref_mut(&mut self) -> &mut Simulator {
        self.sim
    }
}

impl Drop for ControlScope<'_> {
    fn drop(&mut self) {
        self.sim.end_control();
    }
}
