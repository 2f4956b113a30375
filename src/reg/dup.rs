use super::Reg;
use crate::error::*;
use std::sync::{Arc, OnceLock};

/// One logical register mirrored over several physical registers with the
/// same field layout.
#[derive(Debug)]
pub struct Duplicate {
    regs: Vec<Arc<Reg>>,
    common_mask: OnceLock<u64>,
}

impl Duplicate {
    pub fn new(regs: Vec<Arc<Reg>>) -> Result<Self> {
        if regs.is_empty() {
            return Err(Error::BadCtorArgs {
                ty: "RegDuplicate".to_string(),
                reason: "needs at least one backing register".to_string(),
            });
        }
        Ok(Duplicate {
            regs,
            common_mask: OnceLock::new(),
        })
    }

    pub fn regs(&self) -> &[Arc<Reg>] {
        &self.regs
    }

    /// Union of every field mask defined on the duplicate and its backing
    /// registers, fixed at the first write. Without fields, the whole register.
    pub fn common_mask(&self, reg: &Reg) -> u64 {
        *self.common_mask.get_or_init(|| {
            let mut fields = reg.fields();
            fields.extend(self.regs.iter().flat_map(|r| r.fields()));
            let mask = fields.iter().fold(0, |acc, f| acc | f.mask());
            if mask == 0 {
                reg.size().full_mask()
            } else {
                mask
            }
        })
    }

    pub(super) fn hw_read(&self) -> Result<u64> {
        let mut value = 0;
        for r in self.regs.iter() {
            value = r.read()?;
        }
        Ok(value)
    }

    pub(super) fn hw_write(&self, reg: &Reg, value: u64) -> Result<()> {
        let mask = self.common_mask(reg);
        for r in self.regs.iter() {
            let merged = (r.cached() & !mask) | (value & mask);
            r.write(merged)?;
        }
        Ok(())
    }
}
