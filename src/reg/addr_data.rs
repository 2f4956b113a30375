use super::{BitField, Reg};
use crate::error::*;
use std::sync::Arc;

pub const ADDR_DATA_READ: u64 = 0;
pub const ADDR_DATA_WRITE: u64 = 1;

/// Device-internal register reached through an address field, a data field
/// and an optional read/write indicator field. The register offset is the
/// internal index written to the address field. The cooperating fields may
/// live in one physical register.
#[derive(Debug)]
pub struct AddrData {
    addr: Arc<BitField>,
    data: Arc<BitField>,
    rw: Option<Arc<BitField>>,
    read_val: u64,
    write_val: u64,
}

impl AddrData {
    pub fn new(addr: Arc<BitField>, data: Arc<BitField>, rw: Option<Arc<BitField>>) -> Self {
        AddrData {
            addr,
            data,
            rw,
            read_val: ADDR_DATA_READ,
            write_val: ADDR_DATA_WRITE,
        }
    }

    pub fn with_indicator_values(mut self, read_val: u64, write_val: u64) -> Self {
        self.read_val = read_val;
        self.write_val = write_val;
        self
    }

    pub fn addr_field(&self) -> &Arc<BitField> {
        &self.addr
    }
    pub fn data_field(&self) -> &Arc<BitField> {
        &self.data
    }
    pub fn rw_field(&self) -> Option<&Arc<BitField>> {
        self.rw.as_ref()
    }
    pub fn indicator_values(&self) -> (u64, u64) {
        (self.read_val, self.write_val)
    }

    pub(super) fn hw_read(&self, reg: &Reg) -> Result<u64> {
        if let Some(rw) = &self.rw {
            rw.set_value(self.read_val)?;
        }
        self.addr.set_value(reg.offset())?;
        let mut setup = vec![self.addr.reg()?];
        if let Some(rw) = &self.rw {
            setup.insert(0, rw.reg()?);
        }
        force_apply_distinct(&setup, None)?;
        self.data.read()
    }

    pub(super) fn hw_write(&self, reg: &Reg, value: u64) -> Result<()> {
        if let Some(rw) = &self.rw {
            rw.set_value(self.write_val)?;
        }
        self.addr.set_value(reg.offset())?;
        self.data.set_value(value)?;
        let data_reg = self.data.reg()?;
        let mut setup = vec![self.addr.reg()?];
        if let Some(rw) = &self.rw {
            setup.insert(0, rw.reg()?);
        }
        force_apply_distinct(&setup, Some(&data_reg))?;
        data_reg.apply(None, true)?;
        Ok(())
    }
}

// Force-applies each physical register once, in order, skipping `last`,
// which the caller applies itself.
fn force_apply_distinct(regs: &[Arc<Reg>], last: Option<&Arc<Reg>>) -> Result<()> {
    let mut done: Vec<&Arc<Reg>> = vec![];
    for r in regs {
        if done.iter().any(|d| Arc::ptr_eq(d, r)) || last.map_or(false, |l| Arc::ptr_eq(l, r)) {
            continue;
        }
        r.apply(None, true)?;
        done.push(r);
    }
    Ok(())
}
