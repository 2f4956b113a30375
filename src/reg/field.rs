use super::Reg;
use crate::error::*;
use crate::logger::RegOp;
use reg_model_generator::*;
use std::sync::{Arc, Weak};

/// Named bit range of a register. The value lives in the owning register's
/// cache; the field only keeps a weak reference to it.
#[derive(Debug)]
pub struct BitField {
    name: String,
    start: u32,
    width: u32,
    mask: u64,
    kind: FieldKind,
    reg: Weak<Reg>,
}

impl BitField {
    pub(super) fn new(
        reg: &Arc<Reg>,
        name: &str,
        start: u32,
        width: u32,
        kind: FieldKind,
    ) -> Result<Self> {
        let name = format!("{}:{}", reg.name(), name);
        let bits = reg.size().bits();
        if width == 0 || start.checked_add(width).map_or(true, |end| end > bits) {
            return Err(Error::FieldRange {
                field: name,
                start,
                width,
                bits,
            });
        }
        Ok(BitField {
            name,
            start,
            width,
            mask: field_mask(start, width),
            kind,
            reg: Arc::downgrade(reg),
        })
    }

    /// Qualified `register:field` name.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn short_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, f)| f)
            .unwrap_or(&self.name)
    }
    pub fn start(&self) -> u32 {
        self.start
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn mask(&self) -> u64 {
        self.mask
    }
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn reg(&self) -> Result<Arc<Reg>> {
        self.reg
            .upgrade()
            .ok_or_else(|| Error::Detached(self.name.clone()))
    }

    pub fn extract(&self, raw: u64) -> u64 {
        (raw & self.mask) >> self.start
    }

    /// Register value after writing `value` into this field. Command fields
    /// clear every bit outside the field.
    pub fn compose(&self, current: u64, value: u64) -> u64 {
        let bits = (value << self.start) & self.mask;
        match self.kind {
            FieldKind::Command => bits,
            FieldKind::Normal | FieldKind::Control => (current & !self.mask) | bits,
        }
    }

    pub fn value(&self) -> Result<u64> {
        let value = self.extract(self.reg()?.value()?);
        self.log(RegOp::FieldGet, value)?;
        Ok(value)
    }

    pub fn set_value(&self, value: u64) -> Result<()> {
        let reg = self.reg()?;
        let _g = reg.lock();
        self.sync(&reg)?;
        reg.set_value(self.compose(reg.cached(), value))?;
        self.log(RegOp::FieldSet, value)
    }

    /// Writes the field straight to hardware.
    pub fn write(&self, value: u64) -> Result<()> {
        let reg = self.reg()?;
        let _g = reg.lock();
        self.sync(&reg)?;
        reg.write(self.compose(reg.cached(), value))?;
        self.log(RegOp::FieldSet, value)
    }

    pub fn read(&self) -> Result<u64> {
        Ok(self.extract(self.reg()?.read()?))
    }

    pub fn apply(&self, force: bool) -> Result<bool> {
        self.reg()?.apply(None, force)
    }

    // Control fields resynchronize with hardware before every write; other
    // writers may have touched the register out of band.
    fn sync(&self, reg: &Reg) -> Result<()> {
        if self.kind == FieldKind::Control {
            reg.read()?;
        }
        Ok(())
    }

    fn log(&self, op: RegOp, value: u64) -> Result<()> {
        self.reg()?.log().field_event(op, &self.name, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helper::*;
    use super::*;
    use crate::driver::SimDriver;

    #[test]
    fn field_mask_and_value_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x0, RegType::RW, &d);
        r.set_value(0x1234_5607).unwrap();
        let f = r.add_field(None, "mode", 4, 4, None).unwrap();
        assert_eq!(f.mask(), 0xf0);
        assert_eq!(f.name(), "ctrl:mode");
        f.set_value(0xf).unwrap();
        assert_eq!(r.cached(), 0x1234_56f7);
        assert_eq!(f.value().unwrap(), 0xf);

        let r2 = mem_reg("ctrl2", 0x4, RegType::RW, &d);
        let f2 = r2.add_field(None, "mode", 4, 4, None).unwrap();
        f2.set_value(0xf).unwrap();
        assert_eq!(r2.cached(), 0x0000_00f0);
    }

    #[test]
    fn field_range_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x0, RegType::RW, &d);
        assert!(r.add_field(None, "ok", 28, 4, None).is_ok());
        assert!(matches!(
            r.add_field(None, "bad", 30, 4, None),
            Err(Error::FieldRange { bits: 32, .. })
        ));
        assert!(r.add_field(None, "empty", 0, 0, None).is_err());
        assert!(matches!(
            r.add_field(None, "huge", u32::MAX, 1, None),
            Err(Error::FieldRange { .. })
        ));
    }

    #[test]
    fn command_vs_normal_field_test() {
        let d = Arc::new(SimDriver::new());
        let cmd = mem_reg("cmd", 0x0, RegType::RW, &d);
        let a = cmd
            .add_field(None, "a", 0, 4, Some(FieldKind::Command))
            .unwrap();
        let b = cmd.add_field(None, "b", 4, 4, None).unwrap();
        b.set_value(0xa).unwrap();
        a.set_value(3).unwrap();
        assert_eq!(cmd.cached(), 0x03);

        let normal = mem_reg("normal", 0x4, RegType::RW, &d);
        let a = normal.add_field(None, "a", 0, 4, None).unwrap();
        let b = normal.add_field(None, "b", 4, 4, None).unwrap();
        b.set_value(0xa).unwrap();
        a.set_value(3).unwrap();
        assert_eq!(normal.cached(), 0xa3);
    }

    #[test]
    fn auto_kind_test() {
        let d = Arc::new(SimDriver::new());
        let ev = mem_reg("event", 0x0, RegType::EVENT, &d);
        let f = ev.add_field(None, "go", 2, 1, None).unwrap();
        assert_eq!(f.kind(), FieldKind::Command);
        let rw = mem_reg("rw", 0x4, RegType::RW, &d);
        assert_eq!(
            rw.add_field(None, "go", 2, 1, None).unwrap().kind(),
            FieldKind::Normal
        );
    }

    #[test]
    fn control_field_resync_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x0, RegType::RW, &d);
        let f = r
            .add_field(None, "en", 0, 1, Some(FieldKind::Control))
            .unwrap();
        d.poke(0x0, 0xab00);
        f.write(1).unwrap();
        assert_eq!(d.peek(0x0), 0xab01);
    }

    #[test]
    fn sparse_field_slots_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x0, RegType::RW, &d);
        r.add_field(Some(3), "hi", 8, 8, None).unwrap();
        assert!(r.field_at(0).is_none());
        assert_eq!(r.field_at(3).unwrap().short_name(), "hi");
        assert_eq!(r.fields().len(), 1);
        assert!(r.field("ctrl:hi").is_some());
        assert!(r.field("hi").is_some());
    }

    #[test]
    fn detached_field_test() {
        let d = Arc::new(SimDriver::new());
        let r = mem_reg("ctrl", 0x0, RegType::RW, &d);
        let f = r.add_field(None, "en", 0, 1, None).unwrap();
        drop(r);
        assert!(matches!(f.value(), Err(Error::Detached(_))));
    }
}
