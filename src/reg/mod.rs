mod addr_data;
mod buffer;
mod dup;
mod field;
mod flash;
mod mem;
mod resource;
pub use addr_data::*;
pub use buffer::*;
pub use dup::*;
pub use field::*;
pub use flash::*;
pub use resource::*;

use crate::driver::RegDriver;
use crate::error::*;
use crate::logger::{LogContext, REG_TAR};
use crate::reg_set::DirtyBit;
use reg_model_generator::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub type RegArray = Arc<Vec<Option<Arc<Reg>>>>;

/// Mask covering `count` bits from `start`; the whole register when both are 0.
pub fn create_lock_mask(start: u32, count: u32, size: RegSize) -> u64 {
    if start == 0 && count == 0 {
        size.full_mask()
    } else {
        field_mask(start, count) & size.full_mask()
    }
}

/// Keeps the `mask` bits of `current` and takes the rest from `new`.
pub fn apply_lock_mask(current: u64, new: u64, mask: u64) -> u64 {
    if mask == 0 {
        new
    } else {
        (current & mask) | (new & !mask)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RegState {
    value: u64,
    dirty: bool,
    lock_mask: u64,
    hw_value: u64,
    saved: Option<(u64, bool)>,
}

pub struct RegSpec {
    pub name: String,
    pub offset: u64,
    pub size: RegSize,
    pub ty: RegType,
    pub driver: Arc<dyn RegDriver>,
    pub log: Arc<LogContext>,
}

pub struct RegCore {
    name: String,
    offset: u64,
    size: RegSize,
    ty: RegType,
    driver: Arc<dyn RegDriver>,
    log: Arc<LogContext>,
    state: Mutex<RegState>,
    resource: RwLock<Arc<Resource>>,
    sealed: AtomicBool,
    apply_enabled: AtomicBool,
    dirty_bits: RwLock<Vec<Arc<DirtyBit>>>,
    fields: RwLock<Vec<Option<Arc<BitField>>>>,
}

impl RegCore {
    fn new(spec: RegSpec) -> Self {
        RegCore {
            name: spec.name,
            offset: spec.offset,
            size: spec.size,
            ty: spec.ty,
            driver: spec.driver,
            log: spec.log,
            state: Mutex::new(RegState::default()),
            resource: RwLock::new(Resource::new()),
            sealed: AtomicBool::new(false),
            apply_enabled: AtomicBool::new(true),
            dirty_bits: RwLock::new(vec![]),
            fields: RwLock::new(vec![]),
        }
    }
}

pub enum RegKind {
    Mem,
    AddrData(AddrData),
    Dup(Duplicate),
    Buffer(BufferRegion),
    Flash(FlashBuffer),
}

impl RegKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RegKind::Mem => "Mem",
            RegKind::AddrData(_) => "AddrData",
            RegKind::Dup(_) => "Duplicate",
            RegKind::Buffer(_) => "Buffer",
            RegKind::Flash(_) => "FlashBuffer",
        }
    }
}

pub struct Reg {
    core: RegCore,
    kind: RegKind,
}

impl std::fmt::Debug for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reg")
            .field("name", &self.core.name)
            .field("kind", &self.kind.type_name())
            .field("offset", &format_args!("{:#x}", self.core.offset))
            .field("ty", &self.core.ty)
            .finish()
    }
}

impl Reg {
    pub fn new(spec: RegSpec, kind: RegKind) -> Arc<Self> {
        Arc::new(Reg {
            core: RegCore::new(spec),
            kind,
        })
    }

    pub fn mem(spec: RegSpec) -> Arc<Self> {
        Reg::new(spec, RegKind::Mem)
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }
    pub fn offset(&self) -> u64 {
        self.core.offset
    }
    pub fn size(&self) -> RegSize {
        self.core.size
    }
    pub fn ty(&self) -> RegType {
        self.core.ty
    }
    pub fn kind(&self) -> &RegKind {
        &self.kind
    }
    pub fn driver(&self) -> &Arc<dyn RegDriver> {
        &self.core.driver
    }
    pub fn log(&self) -> &Arc<LogContext> {
        &self.core.log
    }

    /// Cached value, never touching hardware.
    pub fn cached(&self) -> u64 {
        self.core.state.lock().unwrap().value
    }
    /// Last value read from or written to hardware.
    pub fn hw_value(&self) -> u64 {
        self.core.state.lock().unwrap().hw_value
    }
    pub fn is_dirty(&self) -> bool {
        self.core.state.lock().unwrap().dirty
    }
    pub fn lock_mask(&self) -> u64 {
        self.core.state.lock().unwrap().lock_mask
    }

    pub fn resource(&self) -> Arc<Resource> {
        self.core.resource.read().unwrap().clone()
    }

    /// Replaces the exclusive-access resource. Only legal before the owning
    /// catalog is sealed.
    pub fn set_resource(&self, res: Arc<Resource>) -> Result<()> {
        if self.core.sealed.load(Ordering::SeqCst) {
            return Err(Error::Sealed(self.core.name.clone()));
        }
        *self.core.resource.write().unwrap() = res;
        Ok(())
    }

    pub fn seal(&self) {
        self.core.sealed.store(true, Ordering::SeqCst)
    }

    pub fn is_sealed(&self) -> bool {
        self.core.sealed.load(Ordering::SeqCst)
    }

    pub fn lock(&self) -> ResourceGuard {
        self.resource().lock()
    }

    /// Group and set dirty bits this register sets when it goes dirty.
    pub fn dirty_bits(&self) -> Vec<Arc<DirtyBit>> {
        self.core.dirty_bits.read().unwrap().clone()
    }

    /// Attaching the same bit twice is a no-op.
    pub fn attach_dirty_bit(&self, bit: Arc<DirtyBit>) {
        let mut bits = self.core.dirty_bits.write().unwrap();
        if !bits.iter().any(|b| Arc::ptr_eq(b, &bit)) {
            bits.push(bit);
        }
    }

    pub fn detach_dirty_bit(&self, bit: &Arc<DirtyBit>) {
        self.core
            .dirty_bits
            .write()
            .unwrap()
            .retain(|b| !Arc::ptr_eq(b, bit));
    }

    pub fn apply_enabled(&self) -> bool {
        self.core.apply_enabled.load(Ordering::SeqCst)
    }

    pub fn set_apply_enabled(&self, en: bool) {
        self.core.apply_enabled.store(en, Ordering::SeqCst)
    }

    pub fn fields(&self) -> Vec<Arc<BitField>> {
        self.core
            .fields
            .read()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn field_at(&self, id: usize) -> Option<Arc<BitField>> {
        self.core.fields.read().unwrap().get(id).cloned().flatten()
    }

    /// Looks a field up by its short name or its qualified `register:field` name.
    pub fn field(&self, name: &str) -> Option<Arc<BitField>> {
        self.fields()
            .into_iter()
            .find(|f| f.name() == name || f.short_name() == name)
    }

    /// Creates a field owned by this register, at slot `id` or appended.
    /// Without an explicit kind, command/event registers get command fields.
    pub fn add_field(
        self: &Arc<Self>,
        id: Option<usize>,
        name: &str,
        start: u32,
        width: u32,
        kind: Option<FieldKind>,
    ) -> Result<Arc<BitField>> {
        let kind = kind.unwrap_or(if self.ty().is_cmd_or_event() {
            FieldKind::Command
        } else {
            FieldKind::Normal
        });
        let field = Arc::new(BitField::new(self, name, start, width, kind)?);
        let mut fields = self.core.fields.write().unwrap();
        let id = id.unwrap_or(fields.len());
        if fields.len() <= id {
            fields.resize(id + 1, None);
        }
        fields[id] = Some(field.clone());
        Ok(field)
    }

    fn writable(&self) -> bool {
        !(self.core.ty.is_read_only() || self.core.ty.has_no_value())
    }

    fn mark_dirty(&self) {
        for bit in self.core.dirty_bits.read().unwrap().iter() {
            bit.set();
        }
    }

    /// Cached value; volatile registers are re-read first unless a local edit
    /// is pending.
    pub fn value(&self) -> Result<u64> {
        if self.core.ty.contains(RegType::VOLATILE_RW) && !self.is_dirty() {
            self.read()?;
        }
        Ok(self.cached())
    }

    pub fn set_value(&self, value: u64) -> Result<()> {
        if !self.writable() {
            tracing::warn!(target: REG_TAR, "{}: register has no writable value, set {:#x} dropped", self.core.name, value);
            return Ok(());
        }
        let _g = self.lock();
        let value = value & self.core.size.full_mask();
        let dirtied = {
            let mut state = self.core.state.lock().unwrap();
            let changed = state.value != value;
            state.value = value;
            if changed
                || self
                    .core
                    .ty
                    .intersects(RegType::NO_VALUE_FILTER | RegType::CMD | RegType::EVENT)
            {
                state.dirty = true;
                true
            } else {
                false
            }
        };
        if dirtied {
            self.mark_dirty();
        }
        Ok(())
    }

    /// Refreshes the cache from hardware. Write-only registers and those that
    /// can not be read directly return the cache.
    pub fn read(&self) -> Result<u64> {
        if self.core.ty.is_write_only() || self.core.ty.contains(RegType::CANNOT_READ_DIRECTLY) {
            return Ok(self.cached());
        }
        let _g = self.lock();
        let value = self.hw_read(self.core.driver.as_ref())?;
        let mut state = self.core.state.lock().unwrap();
        state.value = value;
        state.hw_value = value;
        state.dirty = false;
        Ok(value)
    }

    /// Writes cache and hardware at once, bypassing dirty tracking.
    pub fn write(&self, value: u64) -> Result<()> {
        if !self.writable() {
            tracing::warn!(target: REG_TAR, "{}: register has no writable value, write {:#x} dropped", self.core.name, value);
            return Ok(());
        }
        let _g = self.lock();
        self.write_locked(self.core.driver.as_ref(), value)
    }

    /// Writes the cached value if dirty, or if forced and forcing is allowed.
    /// `driver` selects another address space for this write only. Returns
    /// whether hardware was written.
    pub fn apply(&self, driver: Option<&dyn RegDriver>, force: bool) -> Result<bool> {
        self.apply_with(driver, force && !self.core.ty.contains(RegType::NO_FORCE))
    }

    /// Writes the cached value even on NO_FORCE registers. Used by register
    /// sets, whose members always go out together.
    pub(crate) fn force_apply(&self) -> Result<bool> {
        self.apply_with(None, true)
    }

    fn apply_with(&self, driver: Option<&dyn RegDriver>, force: bool) -> Result<bool> {
        if !self.writable() || !self.apply_enabled() {
            return Ok(false);
        }
        let _g = self.lock();
        let (dirty, value) = {
            let state = self.core.state.lock().unwrap();
            (state.dirty, state.value)
        };
        if !(dirty || force) {
            return Ok(false);
        }
        let driver = match driver {
            Some(d) => d,
            None => self.core.driver.as_ref(),
        };
        self.write_locked(driver, value)?;
        Ok(true)
    }

    fn write_locked(&self, driver: &dyn RegDriver, value: u64) -> Result<()> {
        let (hw, mask) = {
            let state = self.core.state.lock().unwrap();
            (state.hw_value, state.lock_mask)
        };
        let merged = apply_lock_mask(hw, value & self.core.size.full_mask(), mask);
        self.hw_write(driver, merged)?;
        let mut state = self.core.state.lock().unwrap();
        state.value = merged;
        state.hw_value = merged;
        state.dirty = false;
        Ok(())
    }

    pub fn force_dirty(&self) {
        if !self.writable() {
            return;
        }
        self.core.state.lock().unwrap().dirty = true;
        self.mark_dirty();
    }

    /// Saves value and dirty flag; a second push overwrites the first.
    pub fn push(&self) {
        let _g = self.lock();
        let mut state = self.core.state.lock().unwrap();
        state.saved = Some((state.value, state.dirty));
    }

    /// Restores what `push` saved. Returns false when nothing was saved.
    pub fn pop(&self) -> bool {
        let _g = self.lock();
        let mut state = self.core.state.lock().unwrap();
        match state.saved.take() {
            Some((value, dirty)) => {
                state.value = value;
                state.dirty = dirty;
                true
            }
            None => false,
        }
    }

    pub fn update_lock_mask(&self, mask: u64, lock: bool) {
        let _g = self.lock();
        let mut state = self.core.state.lock().unwrap();
        state.lock_mask = if lock {
            state.lock_mask | mask
        } else {
            state.lock_mask & !mask
        };
    }

    pub fn lock_bits(&self, start: u32, count: u32) {
        self.update_lock_mask(create_lock_mask(start, count, self.core.size), true)
    }

    pub fn unlock_bits(&self, start: u32, count: u32) {
        self.update_lock_mask(create_lock_mask(start, count, self.core.size), false)
    }

    fn hw_read(&self, driver: &dyn RegDriver) -> Result<u64> {
        match &self.kind {
            RegKind::Mem => mem::read(&self.core, driver),
            RegKind::AddrData(a) => a.hw_read(self),
            RegKind::Dup(d) => d.hw_read(),
            RegKind::Buffer(_) | RegKind::Flash(_) => Err(Error::NotScalar(self.core.name.clone())),
        }
    }

    fn hw_write(&self, driver: &dyn RegDriver, value: u64) -> Result<()> {
        match &self.kind {
            RegKind::Mem => mem::write(&self.core, driver, value),
            RegKind::AddrData(a) => a.hw_write(self, value),
            RegKind::Dup(d) => d.hw_write(self, value),
            RegKind::Buffer(_) | RegKind::Flash(_) => Err(Error::NotScalar(self.core.name.clone())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_helper::*;
    use super::*;
    use crate::driver::{DriverOp, SimDriver};

    #[test]
    fn dirty_apply_once_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        r.set_value(0x1234).unwrap();
        assert!(r.is_dirty());
        assert!(r.apply(None, false).unwrap());
        assert!(!r.is_dirty());
        assert_eq!(d.writes(), vec![DriverOp::Write32(0x10, 0x1234)]);
        assert!(!r.apply(None, false).unwrap());
        assert_eq!(d.writes().len(), 1);
    }

    #[test]
    fn same_value_stays_clean_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        r.set_value(0).unwrap();
        assert!(!r.is_dirty());
        let f = mem_reg("fire", 0x14, RegType::RW | RegType::NO_VALUE_FILTER, &d);
        f.set_value(0).unwrap();
        assert!(f.is_dirty());
        let c = mem_reg("cmd", 0x18, RegType::CMD, &d);
        c.set_value(0).unwrap();
        assert!(c.is_dirty());
    }

    #[test]
    fn read_only_drops_writes_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("status", 0x20, RegType::RO, &d);
        r.set_value(5).unwrap();
        r.write(5).unwrap();
        assert_eq!(r.cached(), 0);
        assert!(!r.is_dirty());
        assert!(!r.apply(None, true).unwrap());
        assert!(d.writes().is_empty());
    }

    #[test]
    fn force_apply_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        assert!(r.apply(None, true).unwrap());
        let nf = mem_reg("noforce", 0x14, RegType::RW | RegType::NO_FORCE, &d);
        assert!(!nf.apply(None, true).unwrap());
        r.set_apply_enabled(false);
        r.set_value(3).unwrap();
        assert!(!r.apply(None, true).unwrap());
        assert_eq!(d.writes().len(), 1);
    }

    #[test]
    fn alternate_driver_apply_test() {
        let d = Arc::new(SimDriver::new());
        let alt = SimDriver::new();
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        r.set_value(9).unwrap();
        r.apply(Some(&alt), false).unwrap();
        assert!(d.writes().is_empty());
        assert_eq!(alt.writes(), vec![DriverOp::Write32(0x10, 9)]);
    }

    #[test]
    fn volatile_read_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("status", 0x20, RegType::RW | RegType::VOLATILE_RW, &d);
        d.poke(0x20, 0x77);
        assert_eq!(r.value().unwrap(), 0x77);
        r.set_value(0x11).unwrap();
        d.poke(0x20, 0x99);
        assert_eq!(r.value().unwrap(), 0x11);
        let wo = mem_reg("wo", 0x24, RegType::WO, &d);
        d.poke(0x24, 0x5);
        assert_eq!(wo.read().unwrap(), 0);
        assert!(d.ops().iter().all(|op| *op != DriverOp::Read32(0x24)));
    }

    #[test]
    fn lock_mask_test() {
        assert_eq!(create_lock_mask(0, 0, RegSize::U32), 0xffff_ffff);
        assert_eq!(create_lock_mask(24, 8, RegSize::U32), 0xff00_0000);
        assert_eq!(apply_lock_mask(0x1234, 0x5678, 0), 0x5678);
        assert_eq!(apply_lock_mask(0xaabb_ccdd, 0x1122_3344, 0xff00_0000), 0xaa22_3344);

        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        r.write(0x1200_0000).unwrap();
        r.lock_bits(24, 8);
        r.set_value(0xffff_ffff).unwrap();
        r.apply(None, false).unwrap();
        assert_eq!(d.peek(0x10), 0x12ff_ffff);
        r.unlock_bits(24, 8);
        assert_eq!(r.lock_mask(), 0);
        r.set_value(0xffff_ffff).unwrap();
        r.apply(None, false).unwrap();
        assert_eq!(d.peek(0x10), 0xffff_ffff);
    }

    #[test]
    fn push_pop_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        r.set_value(1).unwrap();
        r.push();
        r.write(2).unwrap();
        assert!(!r.is_dirty());
        assert!(r.pop());
        assert_eq!(r.cached(), 1);
        assert!(r.is_dirty());
        assert!(!r.pop());
    }

    #[test]
    fn group_dirty_test() {
        let d = Arc::new(SimDriver::new());
        let bit = Arc::new(DirtyBit::new("g"));
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        let other = Arc::new(DirtyBit::new("s"));
        r.attach_dirty_bit(bit.clone());
        r.attach_dirty_bit(bit.clone());
        r.attach_dirty_bit(other.clone());
        assert_eq!(r.dirty_bits().len(), 2);
        r.set_value(0).unwrap();
        assert!(!bit.is_set());
        r.set_value(1).unwrap();
        assert!(bit.is_set());
        assert!(other.is_set());
        r.apply(None, false).unwrap();
        assert!(bit.is_set());
        r.detach_dirty_bit(&other);
        other.clear();
        r.set_value(2).unwrap();
        assert!(!other.is_set());
    }

    #[test]
    fn sealed_resource_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        r.set_resource(Resource::new()).unwrap();
        r.seal();
        assert!(matches!(r.set_resource(Resource::new()), Err(Error::Sealed(_))));
    }

    #[test]
    fn concurrent_set_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x10, RegType::RW, &d);
        let threads = (0..4u64)
            .map(|i| {
                let r = r.clone();
                std::thread::spawn(move || {
                    for j in 0..50u64 {
                        r.set_value(i * 100 + j).unwrap();
                        r.apply(None, false).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for t in threads {
            t.join().unwrap();
        }
        r.apply(None, false).unwrap();
        assert_eq!(d.peek(0x10), r.cached());
        assert!(!r.is_dirty());
    }
}
