use super::RegCore;
use crate::driver::RegDriver;
use crate::error::*;
use crate::logger::RegOp;
use reg_model_generator::RegSize;

pub(super) fn read(core: &RegCore, driver: &dyn RegDriver) -> Result<u64> {
    let value = match core.size {
        RegSize::U32 => driver.read32(core.offset)? as u64,
        RegSize::U64 => driver.read64(core.offset)?,
    };
    core.log.reg_event(
        RegOp::read(driver.is_recording()),
        &core.name,
        core.offset,
        value,
    );
    Ok(value)
}

pub(super) fn write(core: &RegCore, driver: &dyn RegDriver, value: u64) -> Result<()> {
    match core.size {
        RegSize::U32 => driver.write32(core.offset, value as u32)?,
        RegSize::U64 => driver.write64(core.offset, value)?,
    }
    core.log.reg_event(
        RegOp::write(driver.is_recording()),
        &core.name,
        core.offset,
        value,
    );
    Ok(())
}
