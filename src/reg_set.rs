use crate::error::*;
use crate::reg::{Reg, RegArray};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "something in this group changed" flag. Set by member registers,
/// cleared only by an explicit apply of the whole group.
#[derive(Debug)]
pub struct DirtyBit {
    name: String,
    set: AtomicBool,
}

impl DirtyBit {
    pub fn new(name: &str) -> Self {
        DirtyBit {
            name: name.to_string(),
            set: AtomicBool::new(false),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst)
    }
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }
    pub fn clear(&self) {
        self.set.store(false, Ordering::SeqCst)
    }
}

/// Ordered subset of registers written out together.
#[derive(Debug)]
pub struct RegSet {
    name: String,
    regs: RegArray,
    dirty: Arc<DirtyBit>,
}

impl RegSet {
    pub fn new(name: &str, regs: RegArray) -> Self {
        let dirty = Arc::new(DirtyBit::new(name));
        for r in regs.iter().flatten() {
            r.attach_dirty_bit(dirty.clone());
        }
        RegSet {
            name: name.to_string(),
            regs,
            dirty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn regs(&self) -> &RegArray {
        &self.regs
    }
    pub fn dirty(&self) -> &Arc<DirtyBit> {
        &self.dirty
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_set()
    }

    /// Present members in set order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Reg>> {
        self.regs.iter().flatten()
    }

    pub fn contains(&self, reg: &Arc<Reg>) -> bool {
        self.iter().any(|r| Arc::ptr_eq(r, reg))
    }

    /// Writes every member, in order, when the set is dirty or `force`d.
    /// NO_FORCE does not hold members back; read-only, no-value and
    /// apply-disabled members are still skipped. Returns whether the set was
    /// written.
    pub fn apply(&self, force: bool) -> Result<bool> {
        if !force && !self.is_dirty() {
            return Ok(false);
        }
        for r in self.iter() {
            r.force_apply()?;
        }
        self.dirty.clear();
        Ok(true)
    }
}

impl Drop for RegSet {
    fn drop(&mut self) {
        for r in self.regs.iter().flatten() {
            r.detach_dirty_bit(&self.dirty);
        }
    }
}
