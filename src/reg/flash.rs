use super::{BitField, Reg};
use crate::error::*;
use crate::logger::{RegOp, BUFFER_TAR};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const FLASH_BUSY_TIMEOUT: Duration = Duration::from_millis(10);

/// Word-serial flash programming protocol: a pointer reset through a command
/// field, then one word at a time through a data register, waiting on a busy
/// field between words.
#[derive(Debug)]
pub struct FlashBuffer {
    capacity: usize,
    cmd: Arc<BitField>,
    reset_cmd: u64,
    data: Arc<Reg>,
    busy: Arc<BitField>,
    timeout: Duration,
}

impl FlashBuffer {
    pub fn new(
        capacity: usize,
        cmd: Arc<BitField>,
        reset_cmd: u64,
        data: Arc<Reg>,
        busy: Arc<BitField>,
    ) -> Self {
        FlashBuffer {
            capacity,
            cmd,
            reset_cmd,
            data,
            busy,
            timeout: FLASH_BUSY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn reset_pointer(&self) -> Result<()> {
        self.cmd.write(self.reset_cmd)
    }

    fn wait_idle(&self) -> Result<bool> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.busy.read()? == 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::yield_now();
        }
    }
}

pub struct Flash<'a> {
    reg: &'a Reg,
    flash: &'a FlashBuffer,
}

impl Reg {
    pub fn as_flash(&self) -> Option<Flash<'_>> {
        match self.kind() {
            super::RegKind::Flash(flash) => Some(Flash { reg: self, flash }),
            _ => None,
        }
    }
}

impl<'a> Flash<'a> {
    fn check(&self, words: usize) -> Result<()> {
        let requested = words.checked_mul(4).unwrap_or(usize::MAX);
        if requested > self.flash.capacity {
            return Err(Error::BufferOverflow {
                name: self.reg.name().to_string(),
                requested,
                capacity: self.flash.capacity,
            });
        }
        Ok(())
    }

    /// Returns false when the busy field did not clear in time; words after
    /// the stuck one are not written.
    pub fn write_words(&self, data: &[u32]) -> Result<bool> {
        self.check(data.len())?;
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event(RegOp::BufferWriteBegin, self.reg.name(), 0, data);
        self.flash.reset_pointer()?;
        for (i, w) in data.iter().enumerate() {
            self.flash.data.write(*w as u64)?;
            if !self.flash.wait_idle()? {
                tracing::warn!(
                    target: BUFFER_TAR,
                    "{}: busy after word {} of {}, timeout {:?}",
                    self.reg.name(),
                    i,
                    data.len(),
                    self.flash.timeout
                );
                log.buffer_event(RegOp::BufferWriteEnd, self.reg.name(), 0, &data[..i + 1]);
                return Ok(false);
            }
        }
        log.buffer_event::<u32>(RegOp::BufferWriteEnd, self.reg.name(), 0, &[]);
        Ok(true)
    }

    pub fn read_words(&self, buf: &mut [u32]) -> Result<()> {
        self.check(buf.len())?;
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event::<u32>(RegOp::BufferReadBegin, self.reg.name(), 0, &[]);
        self.flash.reset_pointer()?;
        for w in buf.iter_mut() {
            *w = self.flash.data.read()? as u32;
        }
        log.buffer_event(RegOp::BufferReadEnd, self.reg.name(), 0, buf);
        Ok(())
    }
}
