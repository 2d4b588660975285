// src/simulation/garbage.rs
use crate::core::RegisterId;
use std::collections::HashMap;

/// A garbage pile open on the simulator.
#[derive(Debug)]
enum OpenPile {
    /// Lives for one block and must be empty when the block ends.
    Anonymous(Vec<RegisterId>),
    /// Adds to a named pile that outlives the block.
    Named(String),
}

/// Bookkeeping for garbage piles: the registers allocated while a pile was
/// open and not yet released.
///
/// New registers go to the innermost open pile. A register leaves its pile
/// when it is freed, whichever pile is open at that point.
#[derive(Debug, Default)]
pub(crate) struct GarbagePiles {
    open: Vec<OpenPile>,
    named: HashMap<String, Vec<RegisterId>>,
}

impl GarbagePiles {
    pub(crate) fn depth(&self) -> usize {
        self.open.len()
    }

    pub(crate) fn open_anonymous(&mut self) {
        self.open.push(OpenPile::Anonymous(Vec::new()));
    }

    pub(crate) fn open_named(&mut self, name: &str) {
        self.named.entry(name.to_string()).or_default();
        self.open.push(OpenPile::Named(name.to_string()));
    }

    /// Closes piles down to `depth`. Returns the registers left in the
    /// anonymous pile at `depth`, if that is what was closed.
    pub(crate) fn close_to(&mut self, depth: usize) -> Vec<RegisterId> {
        let mut leftover = Vec::new();
        while self.open.len() > depth {
            if let Some(OpenPile::Anonymous(ids)) = self.open.pop() {
                leftover = ids;
            }
        }
        leftover
    }

    pub(crate) fn track(&mut self, id: RegisterId) {
        match self.open.last_mut() {
            Some(OpenPile::Anonymous(ids)) => ids.push(id),
            Some(OpenPile::Named(name)) => self.named.entry(name.clone()).or_default().push(id),
            None => {}
        }
    }

    pub(crate) fn release(&mut self, id: RegisterId) {
        for pile in &mut self.open {
            if let OpenPile::Anonymous(ids) = pile {
                ids.retain(|x| *x != id);
            }
        }
        for ids in self.named.values_mut() {
            ids.retain(|x| *x != id);
        }
    }

    /// Registers still held by the named pile, oldest first.
    pub(crate) fn named(&self, name: &str) -> &[RegisterId] {
        self.named.get(name).map_or(&[][..], Vec::as_slice)
    }

    /// Forgets every tracked register, keeping the open piles.
    pub(crate) fn forget_all(&mut self) {
        for pile in &mut self.open {
            if let OpenPile::Anonymous(ids) = pile {
                ids.clear();
            }
        }
        self.named.clear();
    }
}
