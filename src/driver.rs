use crate::error::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Transport seam. One driver instance serves one address space (BAR).
pub trait RegDriver: Send + Sync {
    fn read32(&self, offset: u64) -> Result<u32>;
    fn write32(&self, offset: u64, data: u32) -> Result<()>;
    fn read64(&self, offset: u64) -> Result<u64>;
    fn write64(&self, offset: u64, data: u64) -> Result<()>;
    /// `offset` counts elements from `base`, the transfer length is `buf.len()`.
    fn read_array8(&self, base: u64, offset: usize, buf: &mut [u8]) -> Result<()>;
    fn write_array8(&self, base: u64, offset: usize, data: &[u8]) -> Result<()>;
    fn read_array32(&self, base: u64, offset: usize, buf: &mut [u32]) -> Result<()>;
    fn write_array32(&self, base: u64, offset: usize, data: &[u32]) -> Result<()>;
    fn read_fifo(&self, offset: u64, buf: &mut [u32]) -> Result<()>;
    fn write_fifo(&self, offset: u64, data: &[u32]) -> Result<()>;
    /// Control-stream sessions record operations instead of touching hardware.
    fn is_recording(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOp {
    Read32(u64),
    Write32(u64, u32),
    Read64(u64),
    Write64(u64, u64),
    ReadArray8 { base: u64, offset: usize, len: usize },
    WriteArray8 { base: u64, offset: usize, len: usize },
    ReadArray32 { base: u64, offset: usize, len: usize },
    WriteArray32 { base: u64, offset: usize, len: usize },
    ReadFifo { offset: u64, len: usize },
    WriteFifo { offset: u64, len: usize },
}

impl DriverOp {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            DriverOp::Write32(..)
                | DriverOp::Write64(..)
                | DriverOp::WriteArray8 { .. }
                | DriverOp::WriteArray32 { .. }
                | DriverOp::WriteFifo { .. }
        )
    }
}

#[derive(Default)]
struct SimSpace {
    words: HashMap<u64, u64>,
    bytes: HashMap<u64, u8>,
    fifos: HashMap<u64, VecDeque<u32>>,
    ops: Vec<DriverOp>,
}

/// In-memory address space. Every access is logged as a `DriverOp`.
pub struct SimDriver {
    space: Mutex<SimSpace>,
    recording: bool,
}

impl SimDriver {
    pub fn new() -> Self {
        SimDriver {
            space: Mutex::new(SimSpace::default()),
            recording: false,
        }
    }

    pub fn recording() -> Self {
        SimDriver {
            space: Mutex::new(SimSpace::default()),
            recording: true,
        }
    }

    /// Sets a location without logging an operation.
    pub fn poke(&self, offset: u64, value: u64) {
        self.space.lock().unwrap().words.insert(offset, value);
    }

    pub fn peek(&self, offset: u64) -> u64 {
        *self
            .space
            .lock()
            .unwrap()
            .words
            .get(&offset)
            .unwrap_or(&0)
    }

    pub fn peek_bytes(&self, addr: u64, len: usize) -> Vec<u8> {
        let space = self.space.lock().unwrap();
        (0..len as u64)
            .map(|i| *space.bytes.get(&(addr + i)).unwrap_or(&0))
            .collect()
    }

    pub fn push_fifo(&self, offset: u64, data: &[u32]) {
        self.space
            .lock()
            .unwrap()
            .fifos
            .entry(offset)
            .or_default()
            .extend(data.iter().copied());
    }

    pub fn ops(&self) -> Vec<DriverOp> {
        self.space.lock().unwrap().ops.clone()
    }

    pub fn writes(&self) -> Vec<DriverOp> {
        self.ops().into_iter().filter(|op| op.is_write()).collect()
    }

    pub fn clear_ops(&self) {
        self.space.lock().unwrap().ops.clear()
    }

    fn log(&self, op: DriverOp) {
        self.space.lock().unwrap().ops.push(op)
    }
}

impl RegDriver for SimDriver {
    fn read32(&self, offset: u64) -> Result<u32> {
        self.log(DriverOp::Read32(offset));
        Ok(self.peek(offset) as u32)
    }
    fn write32(&self, offset: u64, data: u32) -> Result<()> {
        self.log(DriverOp::Write32(offset, data));
        self.poke(offset, data as u64);
        Ok(())
    }
    fn read64(&self, offset: u64) -> Result<u64> {
        self.log(DriverOp::Read64(offset));
        Ok(self.peek(offset))
    }
    fn write64(&self, offset: u64, data: u64) -> Result<()> {
        self.log(DriverOp::Write64(offset, data));
        self.poke(offset, data);
        Ok(())
    }
    fn read_array8(&self, base: u64, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.log(DriverOp::ReadArray8 {
            base,
            offset,
            len: buf.len(),
        });
        let addr = base + offset as u64;
        buf.copy_from_slice(&self.peek_bytes(addr, buf.len()));
        Ok(())
    }
    fn write_array8(&self, base: u64, offset: usize, data: &[u8]) -> Result<()> {
        self.log(DriverOp::WriteArray8 {
            base,
            offset,
            len: data.len(),
        });
        let addr = base + offset as u64;
        let mut space = self.space.lock().unwrap();
        for (i, b) in data.iter().enumerate() {
            space.bytes.insert(addr + i as u64, *b);
        }
        Ok(())
    }
    fn read_array32(&self, base: u64, offset: usize, buf: &mut [u32]) -> Result<()> {
        self.log(DriverOp::ReadArray32 {
            base,
            offset,
            len: buf.len(),
        });
        let space = self.space.lock().unwrap();
        for (i, w) in buf.iter_mut().enumerate() {
            let addr = base + ((offset + i) * 4) as u64;
            *w = *space.words.get(&addr).unwrap_or(&0) as u32;
        }
        Ok(())
    }
    fn write_array32(&self, base: u64, offset: usize, data: &[u32]) -> Result<()> {
        self.log(DriverOp::WriteArray32 {
            base,
            offset,
            len: data.len(),
        });
        let mut space = self.space.lock().unwrap();
        for (i, w) in data.iter().enumerate() {
            let addr = base + ((offset + i) * 4) as u64;
            space.words.insert(addr, *w as u64);
        }
        Ok(())
    }
    fn read_fifo(&self, offset: u64, buf: &mut [u32]) -> Result<()> {
        self.log(DriverOp::ReadFifo {
            offset,
            len: buf.len(),
        });
        let mut space = self.space.lock().unwrap();
        let fifo = space.fifos.entry(offset).or_default();
        for w in buf.iter_mut() {
            *w = fifo.pop_front().unwrap_or(0);
        }
        Ok(())
    }
    fn write_fifo(&self, offset: u64, data: &[u32]) -> Result<()> {
        self.log(DriverOp::WriteFifo {
            offset,
            len: data.len(),
        });
        self.push_fifo(offset, data);
        Ok(())
    }
    fn is_recording(&self) -> bool {
        self.recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_driver_access_test() {
        let d = SimDriver::new();
        d.write32(0x10, 0xdead_beef).unwrap();
        assert_eq!(d.read32(0x10).unwrap(), 0xdead_beef);
        d.write_array32(0x100, 1, &[1, 2]).unwrap();
        assert_eq!(d.peek(0x104), 1);
        assert_eq!(d.peek(0x108), 2);
        d.write_fifo(0x20, &[7, 8]).unwrap();
        let mut buf = [0; 3];
        d.read_fifo(0x20, &mut buf).unwrap();
        assert_eq!(buf, [7, 8, 0]);
        assert_eq!(d.writes().len(), 3);
        assert_eq!(d.ops()[0], DriverOp::Write32(0x10, 0xdead_beef));
    }
}
