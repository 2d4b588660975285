// src/simulation/mod.rs

//! The register simulator.
//!
//! `Simulator` is the entry point: it hands out registers, keeps the stack of
//! active control conditions, records inversion blocks and forwards every
//! state change to the internal `SimulationEngine`, which owns the
//! amplitude store.

mod config;
pub(crate) mod engine;
mod garbage;
mod results;
mod scope;

pub use config::SimulatorConfig;
pub use results::{AmplitudeListing, Distribution, StateOutcome};
pub use scope::ControlScope;

use crate::circuits::Circuit;
use crate::core::constants::qreg_constants::PI;
use crate::core::{AmplitudeStore, QregError, Register, RegisterId, Result};
use crate::operations::{ArithOp, Expr, Init, Operation};
use engine::SimulationEngine;
use garbage::GarbagePiles;
use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;

/// Simulates integer-valued quantum registers over a sparse amplitude store.
///
/// All primitives act inside the currently open control scopes (see
/// [`q_if`](Self::q_if)). A failing call leaves the amplitudes untouched;
/// an `Entanglement` failure additionally invalidates the simulator, after
/// which every state-touching call fails until [`clear`](Self::clear).
pub struct Simulator {
    engine: SimulationEngine,
    /// Active control conditions, outermost first.
    controls: Vec<Expr>,
    /// Open recordings, innermost last. While any is open, operations are
    /// captured instead of applied.
    recordings: Vec<Circuit>,
    next_id: u64,
    names: HashMap<RegisterId, String>,
    rng: StdRng,
    poisoned: bool,
    piles: GarbagePiles,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Creates a simulator with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    pub fn with_config(config: SimulatorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            engine: SimulationEngine::new(config),
            controls: Vec::new(),
            recordings: Vec::new(),
            next_id: 0,
            names: HashMap::new(),
            poisoned: false,
            piles: GarbagePiles::default(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        self.engine.config()
    }

    /// The current joint state.
    pub fn state(&self) -> &AmplitudeStore {
        self.engine.store()
    }

    /// `false` once an entanglement failure has invalidated the run.
    pub fn is_valid(&self) -> bool {
        !self.poisoned
    }

    /// Number of open control scopes.
    pub fn control_depth(&self) -> usize {
        self.controls.len()
    }

    pub fn is_recording(&self) -> bool {
        !self.recordings.is_empty()
    }

    /// Display name given to `reg` by [`named_reg`](Self::named_reg).
    pub fn register_name(&self, reg: Register) -> Option<&str> {
        self.names.get(&reg.id()).map(String::as_str)
    }

    //---------------------------------------------------------------------
    // Registers
    //---------------------------------------------------------------------

    /// Allocates a register and initializes it from `init` inside the
    /// active scope. Outside the scope the register holds 0.
    ///
    /// # Errors
    /// * `Dimension` for empty, duplicated or zero-norm distributions, or a
    ///   non-integral value.
    /// * `Evaluation` if an initializer expression fails on some branch.
    pub fn reg(&mut self, init: impl Into<Init>) -> Result<Register> {
        self.ensure_valid()?;
        let id = RegisterId(self.next_id);
        self.next_id += 1;

        self.execute(Operation::Alloc { target: id })?;
        if let Err(err) = self.execute(Operation::Init { target: id, init: init.into() }) {
            self.discard_allocation(id);
            return Err(err);
        }
        debug!("allocated {} ({} branches)", id, self.state().len());
        Ok(Register::new(id))
    }

    /// Like [`reg`](Self::reg), with a name used when printing.
    pub fn named_reg(&mut self, name: &str, init: impl Into<Init>) -> Result<Register> {
        let reg = self.reg(init)?;
        self.names.insert(reg.id(), name.to_string());
        Ok(reg)
    }

    /// Initializes an existing register inside the active scope. The
    /// register must hold 0 in every controlled branch.
    pub fn init(&mut self, reg: Register, init: impl Into<Init>) -> Result<()> {
        self.execute(Operation::Init { target: reg.id(), init: init.into() })
    }

    /// Disposes of `reg` after checking that its value is a function of the
    /// remaining registers in every branch.
    ///
    /// # Errors
    /// * `Entanglement` if two branches agree on every other register but
    ///   hold different values here. This invalidates the simulator.
    /// * `InvalidOperation` inside a controlled scope or a recording.
    pub fn clean(&mut self, reg: Register) -> Result<()> {
        self.ensure_valid()?;
        self.ensure_top_level("clean")?;
        self.engine.clean(reg.id()).map_err(|err| self.fail(err))?;
        self.names.remove(&reg.id());
        self.piles.release(reg.id());
        debug!("cleaned {} ({} branches)", reg, self.state().len());
        Ok(())
    }

    /// Disposes of `reg` by undoing `init`: inside the active scope the
    /// register must be exactly in the state `init` prepares, and outside
    /// it must hold 0.
    ///
    /// # Errors
    /// `Entanglement` if the register carries other information. This
    /// invalidates the simulator.
    pub fn uncompute(&mut self, reg: Register, init: impl Into<Init>) -> Result<()> {
        self.execute(Operation::Uncompute { target: reg.id(), init: init.into() })?;
        self.execute(Operation::Free { target: reg.id() })?;
        self.names.remove(&reg.id());
        debug!("uncomputed {}", reg);
        Ok(())
    }

    //---------------------------------------------------------------------
    // Primitives
    //---------------------------------------------------------------------

    /// Hadamard on bit `bit` of `reg`.
    pub fn hadamard(&mut self, reg: Register, bit: u32) -> Result<()> {
        self.execute(Operation::Hadamard { target: reg.id(), bit })
    }

    /// Multiplies every controlled branch by `e^(i·angle)`, with `angle`
    /// evaluated against the branch.
    pub fn phase(&mut self, angle: impl Into<Expr>) -> Result<()> {
        self.execute(Operation::Phase { angle: angle.into() })
    }

    /// `phase(angle·π)`.
    pub fn phase_pi(&mut self, angle: impl Into<Expr>) -> Result<()> {
        self.phase(angle.into() * PI)
    }

    /// `phase(angle·2π)`.
    pub fn phase_2pi(&mut self, angle: impl Into<Expr>) -> Result<()> {
        self.phase(angle.into() * (2.0 * PI))
    }

    /// Exchanges the values of `a` and `b` in every controlled branch.
    pub fn swap(&mut self, a: Register, b: Register) -> Result<()> {
        self.execute(Operation::Swap { a: a.id(), b: b.id() })
    }

    /// Flips `target_bit` of `reg` where `control_bit` is set.
    pub fn cnot(&mut self, reg: Register, control_bit: u32, target_bit: u32) -> Result<()> {
        self.execute(Operation::Cnot { target: reg.id(), control_bit, target_bit })
    }

    /// Fourier transform over each block of `modulus` consecutive values.
    pub fn qft(&mut self, reg: Register, modulus: u64) -> Result<()> {
        self.execute(Operation::Qft { target: reg.id(), modulus, inverse: false })
    }

    pub fn inverse_qft(&mut self, reg: Register, modulus: u64) -> Result<()> {
        self.execute(Operation::Qft { target: reg.id(), modulus, inverse: true })
    }

    /// `reg += operand`. The operand must not read `reg`.
    pub fn add_assign(&mut self, reg: Register, operand: impl Into<Expr>) -> Result<()> {
        self.arith(reg, ArithOp::Add, operand.into())
    }

    /// `reg -= operand`. The operand must not read `reg`.
    pub fn sub_assign(&mut self, reg: Register, operand: impl Into<Expr>) -> Result<()> {
        self.arith(reg, ArithOp::Sub, operand.into())
    }

    /// `reg ^= operand`. The operand must not read `reg`.
    pub fn xor_assign(&mut self, reg: Register, operand: impl Into<Expr>) -> Result<()> {
        self.arith(reg, ArithOp::Xor, operand.into())
    }

    fn arith(&mut self, reg: Register, op: ArithOp, operand: Expr) -> Result<()> {
        self.execute(Operation::Arith { target: reg.id(), op, operand })
    }

    //---------------------------------------------------------------------
    // Scopes
    //---------------------------------------------------------------------

    /// Opens a controlled scope on `condition`, nested inside any scope
    /// already open. The returned guard dereferences to the simulator and
    /// closes the scope when dropped.
    ///
    /// Registers read by `condition` cannot be modified while the scope is
    /// open.
    pub fn q_if(&mut self, condition: impl Into<Expr>) -> Result<ControlScope<'_>> {
        self.execute(Operation::BeginControl { condition: condition.into() })?;
        Ok(ControlScope::new(self))
    }

    pub(crate) fn end_control(&mut self) {
        if let Some(condition) = self.controls.pop() {
            if let Some(circuit) = self.recordings.last_mut() {
                circuit.add_operation(Operation::EndControl { condition });
            }
        }
    }

    //---------------------------------------------------------------------
    // Measurement
    //---------------------------------------------------------------------

    /// Conditions the state on `condition`: branches where it fails are
    /// dropped and the rest rescaled by `1/√p`. Returns `p`.
    ///
    /// # Errors
    /// * `PostselectionFailure` if `p` is below `postselect_epsilon`; the
    ///   state is left unchanged.
    /// * `InvalidOperation` inside a controlled scope or a recording.
    pub fn postselect(&mut self, condition: impl Into<Expr>) -> Result<f64> {
        self.ensure_valid()?;
        self.ensure_top_level("postselect")?;
        let condition = condition.into();
        match self.engine.postselect(&condition) {
            Ok(p) => {
                debug!("postselected {} with probability {:.6e}", condition, p);
                Ok(p)
            }
            Err(err) => {
                debug!("postselection on {} failed: {}", condition, err);
                Err(err)
            }
        }
    }

    /// Total probability of the branches where `condition` holds.
    pub fn read_total_probability(&self, condition: impl Into<Expr>) -> Result<f64> {
        self.ensure_valid()?;
        let condition = condition.into();
        self.state().total_probability(|b| condition.holds(b))
    }

    /// Samples a joint outcome of `exprs` with the seeded generator,
    /// collapses the state onto it and returns it.
    pub fn measure(&mut self, exprs: &[Expr]) -> Result<Vec<f64>> {
        self.ensure_valid()?;
        self.ensure_top_level("measure")?;
        let outcome = self.engine.measure(exprs, &mut self.rng)?;
        debug!("measured {:?} ({} branches left)", outcome, self.state().len());
        Ok(outcome)
    }

    /// Measures whether `reg` is in the state `init` prepares. `init` may
    /// read other registers, in which case the target state is taken per
    /// branch.
    ///
    /// With `postselect` set the outcome is forced to that value, otherwise
    /// it is sampled with the seeded generator. The state is projected onto
    /// the outcome, or onto its orthogonal complement for `false`, and
    /// rescaled.
    ///
    /// # Errors
    /// * `PostselectionFailure` if the forced outcome has probability below
    ///   `postselect_epsilon`; the state is left unchanged.
    /// * `InvalidOperation` inside a controlled scope or a recording, or if
    ///   `init` reads `reg`.
    /// * `Dimension` for an invalid `init`.
    pub fn measure_state(
        &mut self,
        reg: Register,
        init: impl Into<Init>,
        postselect: Option<bool>,
    ) -> Result<StateOutcome> {
        self.ensure_valid()?;
        self.ensure_top_level("measure_state")?;
        let init = init.into();
        if init.depends_on(reg.id()) {
            return Err(QregError::invalid(format!("cannot measure {} against a state that reads it", reg)));
        }
        let (outcome, probability) = self.engine.measure_state(reg.id(), &init, postselect, &mut self.rng)?;
        debug!("state measurement on {} gave {} with probability {:.6e}", reg, outcome, probability);
        Ok(StateOutcome { outcome, probability })
    }

    /// Probability of every distinct joint outcome of `exprs`.
    pub fn distribution(&self, exprs: &[Expr]) -> Result<Distribution> {
        self.ensure_valid()?;
        Ok(Distribution::from_map(self.labels(exprs), self.engine.distribution(exprs)?))
    }

    /// Branch amplitudes grouped by the joint outcome of `exprs`.
    pub fn amplitudes(&self, exprs: &[Expr]) -> Result<AmplitudeListing> {
        self.ensure_valid()?;
        Ok(AmplitudeListing::from_map(self.labels(exprs), self.engine.amplitudes(exprs)?))
    }

    fn labels(&self, exprs: &[Expr]) -> Vec<String> {
        exprs
            .iter()
            .map(|e| match e {
                Expr::Reg(id) => self.names.get(id).cloned().unwrap_or_else(|| id.to_string()),
                other => other.to_string(),
            })
            .collect()
    }

    //---------------------------------------------------------------------
    // Lifecycle
    //---------------------------------------------------------------------

    /// Drops every register and resets the state to a single branch with
    /// amplitude 1. Also lifts an invalidation.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_top_level("clear")?;
        self.engine.reset();
        self.names.clear();
        self.piles.forget_all();
        self.poisoned = false;
        debug!("cleared simulator state");
        Ok(())
    }

    /// Drops branches with modulus at or below `prune_threshold`.
    pub fn prune(&mut self) -> Result<()> {
        self.ensure_valid()?;
        self.engine.prune();
        Ok(())
    }

    //---------------------------------------------------------------------
    // Garbage piles
    //---------------------------------------------------------------------

    /// Runs `block` with an anonymous garbage pile open. Registers allocated
    /// while it runs (and not claimed by an inner pile) must be released
    /// again, through `clean`, `uncompute` or an inverted block, before it
    /// returns.
    ///
    /// # Errors
    /// `InvalidOperation` if the block leaves any of its registers live.
    /// Errors from the block itself are returned as they are.
    pub fn garbage<T, F>(&mut self, block: F) -> Result<T>
    where
        F: FnOnce(&mut Simulator) -> Result<T>,
    {
        let depth = self.piles.depth();
        self.piles.open_anonymous();
        let outcome = block(self);
        let leftover = self.piles.close_to(depth);
        let value = outcome?;
        if !leftover.is_empty() {
            let ids: Vec<String> = leftover.iter().map(RegisterId::to_string).collect();
            return Err(QregError::invalid(format!(
                "garbage block ended with live registers: {}",
                ids.join(", ")
            )));
        }
        Ok(value)
    }

    /// Runs `block` with the garbage pile `name` open. Registers allocated
    /// while it runs join the pile and stay there until released; the pile
    /// persists across blocks, so one block can fill it and a later one
    /// empty it.
    pub fn garbage_pile<T, F>(&mut self, name: &str, block: F) -> Result<T>
    where
        F: FnOnce(&mut Simulator) -> Result<T>,
    {
        let depth = self.piles.depth();
        self.piles.open_named(name);
        let outcome = block(self);
        self.piles.close_to(depth);
        outcome
    }

    /// Registers still held by the garbage pile `name`, oldest first.
    pub fn pile_registers(&self, name: &str) -> Vec<Register> {
        self.piles.named(name).iter().copied().map(Register::new).collect()
    }

    /// Fails unless every register of the garbage pile `name` has been
    /// released. An unknown pile is clean.
    pub fn assert_pile_clean(&self, name: &str) -> Result<()> {
        let live = self.piles.named(name);
        if live.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = live.iter().map(RegisterId::to_string).collect();
        Err(QregError::invalid(format!(
            "garbage pile '{}' is not clean: {}",
            name,
            ids.join(", ")
        )))
    }

    //---------------------------------------------------------------------
    // Recording and inversion
    //---------------------------------------------------------------------

    /// Runs `block` with every operation captured into a `Circuit` instead
    /// of applied. Register handles created inside the block are valid for
    /// replays of the circuit.
    pub fn record<F>(&mut self, block: F) -> Result<Circuit>
    where
        F: FnOnce(&mut Simulator) -> Result<()>,
    {
        self.ensure_valid()?;
        let depth = self.controls.len();
        self.recordings.push(Circuit::new());
        let outcome = block(self);
        self.controls.truncate(depth);
        let circuit = self.recordings.pop().unwrap_or_default();
        outcome.map(|()| circuit)
    }

    /// Applies the inverse of `block`: the block is recorded, then its
    /// operations are undone in reverse order.
    pub fn inverted<F>(&mut self, block: F) -> Result<()>
    where
        F: FnOnce(&mut Simulator) -> Result<()>,
    {
        let circuit = self.record(block)?;
        debug!("inverting a block of {} operations", circuit.len());
        self.run_circuit(&circuit.inverse())
    }

    /// Replays a circuit inside the active scope.
    ///
    /// Operations are applied one at a time, so a failure part way leaves
    /// the operations before it applied.
    pub fn run_circuit(&mut self, circuit: &Circuit) -> Result<()> {
        self.ensure_valid()?;
        let depth = self.controls.len();
        for op in circuit.operations() {
            if matches!(op, Operation::EndControl { .. }) && self.controls.len() <= depth {
                self.controls.truncate(depth);
                return Err(QregError::invalid("circuit closes a control scope it did not open"));
            }
            if let Err(err) = self.execute(op.clone()) {
                self.controls.truncate(depth);
                return Err(err);
            }
        }
        if self.controls.len() != depth {
            self.controls.truncate(depth);
            return Err(QregError::invalid("circuit leaves a control scope open"));
        }
        Ok(())
    }

    //---------------------------------------------------------------------
    // Internals
    //---------------------------------------------------------------------

    /// Single path for every operation: checks, then records or applies.
    fn execute(&mut self, op: Operation) -> Result<()> {
        self.ensure_valid()?;
        self.check_protection(&op)?;

        match &op {
            Operation::BeginControl { condition } => {
                if !self.is_recording() {
                    self.ensure_live(condition)?;
                }
                self.controls.push(condition.clone());
            }
            Operation::EndControl { .. } => {
                self.controls
                    .pop()
                    .ok_or_else(|| QregError::invalid("no control scope is open"))?;
            }
            _ => {
                if let Operation::Alloc { target } = &op {
                    self.next_id = self.next_id.max(target.0 + 1);
                }
                if !self.is_recording() {
                    let result = self.engine.apply_operation(&op, &self.controls);
                    result.map_err(|err| self.fail(err))?;
                    match &op {
                        Operation::Alloc { target } => self.piles.track(*target),
                        Operation::Free { target } => self.piles.release(*target),
                        _ => {}
                    }
                }
            }
        }

        if let Some(circuit) = self.recordings.last_mut() {
            circuit.add_operation(op);
        }
        Ok(())
    }

    /// A register read by an active condition cannot change, and no
    /// operand may read the register it modifies.
    fn check_protection(&self, op: &Operation) -> Result<()> {
        for id in op.modified_registers() {
            if let Some(condition) = self.controls.iter().find(|c| c.depends_on(id)) {
                return Err(QregError::invalid(format!(
                    "{} is read by the active condition '{}' and cannot be modified inside it",
                    id, condition
                )));
            }
        }
        match op {
            Operation::Init { target, init } | Operation::Uncompute { target, init } if init.depends_on(*target) => {
                Err(QregError::invalid(format!("{} cannot be initialized from itself", target)))
            }
            Operation::Arith { target, operand, .. } if operand.depends_on(*target) => Err(QregError::invalid(
                format!("operand '{}' reads {}, which it modifies", operand, target),
            )),
            _ => Ok(()),
        }
    }

    fn ensure_live(&self, expr: &Expr) -> Result<()> {
        match expr.registers().into_iter().find(|id| !self.state().columns().contains(*id)) {
            Some(id) => Err(QregError::invalid(format!("condition reads {}, which is not live", id))),
            None => Ok(()),
        }
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.poisoned {
            return Err(QregError::invalid(
                "simulator state was invalidated by an entanglement failure; call clear() to start over",
            ));
        }
        Ok(())
    }

    fn ensure_top_level(&self, what: &str) -> Result<()> {
        if !self.controls.is_empty() {
            return Err(QregError::invalid(format!("{} is not allowed inside a controlled scope", what)));
        }
        if self.is_recording() {
            return Err(QregError::invalid(format!("{} cannot be recorded or inverted", what)));
        }
        Ok(())
    }

    fn fail(&mut self, err: QregError) -> QregError {
        if let QregError::Entanglement { register, .. } = &err {
            warn!("simulator invalidated: {} still carries information", register);
            self.poisoned = true;
        }
        err
    }

    fn discard_allocation(&mut self, id: RegisterId) {
        if let Some(circuit) = self.recordings.last_mut() {
            circuit.pop_operation();
        } else if self.state().columns().contains(id) {
            if let Err(err) = self.engine.apply_operation(&Operation::Free { target: id }, &[]) {
                warn!("could not release {} after a failed initialization: {}", id, err);
            }
        }
        self.piles.release(id);
    }
}
