use super::Reg;
use crate::error::*;
use crate::logger::RegOp;

const WORD_BYTES: usize = 4;

#[derive(Debug)]
pub struct BufferRegion {
    capacity: usize,
}

impl BufferRegion {
    /// `capacity` is in bytes.
    pub fn new(capacity: usize) -> Self {
        BufferRegion { capacity }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Bulk-transfer view of a buffer register. Offsets and lengths are in
/// elements of the transfer; every request is checked against the capacity
/// before the driver is touched.
pub struct Buffer<'a> {
    reg: &'a Reg,
    capacity: usize,
}

impl Reg {
    pub fn as_buffer(&self) -> Option<Buffer<'_>> {
        match self.kind() {
            super::RegKind::Buffer(b) => Some(Buffer {
                reg: self,
                capacity: b.capacity(),
            }),
            _ => None,
        }
    }
}

impl<'a> Buffer<'a> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn check(&self, offset: usize, length: usize, elem: usize, avail: usize) -> Result<()> {
        let requested = offset
            .checked_add(length)
            .and_then(|n| n.checked_mul(elem))
            .unwrap_or(usize::MAX);
        if requested > self.capacity {
            return Err(Error::BufferOverflow {
                name: self.reg.name().to_string(),
                requested,
                capacity: self.capacity,
            });
        }
        if length > avail {
            return Err(Error::BufferOverflow {
                name: self.reg.name().to_string(),
                requested: length.saturating_mul(elem),
                capacity: avail.saturating_mul(elem),
            });
        }
        Ok(())
    }

    pub fn write_bytes(&self, data: &[u8], offset: usize, length: usize) -> Result<()> {
        self.check(offset, length, 1, data.len())?;
        let data = &data[..length];
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event(RegOp::BufferWriteBegin, self.reg.name(), offset, data);
        self.reg
            .driver()
            .write_array8(self.reg.offset(), offset, data)?;
        log.buffer_event::<u8>(RegOp::BufferWriteEnd, self.reg.name(), offset, &[]);
        Ok(())
    }

    pub fn read_bytes(&self, buf: &mut [u8], offset: usize, length: usize) -> Result<()> {
        self.check(offset, length, 1, buf.len())?;
        let buf = &mut buf[..length];
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event::<u8>(RegOp::BufferReadBegin, self.reg.name(), offset, &[]);
        self.reg
            .driver()
            .read_array8(self.reg.offset(), offset, buf)?;
        log.buffer_event(RegOp::BufferReadEnd, self.reg.name(), offset, buf);
        Ok(())
    }

    pub fn write_words(&self, data: &[u32], offset: usize, length: usize) -> Result<()> {
        self.check(offset, length, WORD_BYTES, data.len())?;
        let data = &data[..length];
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event(RegOp::BufferWriteBegin, self.reg.name(), offset, data);
        self.reg
            .driver()
            .write_array32(self.reg.offset(), offset, data)?;
        log.buffer_event::<u32>(RegOp::BufferWriteEnd, self.reg.name(), offset, &[]);
        Ok(())
    }

    pub fn read_words(&self, buf: &mut [u32], offset: usize, length: usize) -> Result<()> {
        self.check(offset, length, WORD_BYTES, buf.len())?;
        let buf = &mut buf[..length];
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event::<u32>(RegOp::BufferReadBegin, self.reg.name(), offset, &[]);
        self.reg
            .driver()
            .read_array32(self.reg.offset(), offset, buf)?;
        log.buffer_event(RegOp::BufferReadEnd, self.reg.name(), offset, buf);
        Ok(())
    }

    pub fn write_fifo(&self, data: &[u32]) -> Result<()> {
        self.check(0, data.len(), WORD_BYTES, data.len())?;
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event(RegOp::BufferWriteBegin, self.reg.name(), 0, data);
        self.reg.driver().write_fifo(self.reg.offset(), data)?;
        log.buffer_event::<u32>(RegOp::BufferWriteEnd, self.reg.name(), 0, &[]);
        Ok(())
    }

    pub fn read_fifo(&self, buf: &mut [u32]) -> Result<()> {
        self.check(0, buf.len(), WORD_BYTES, buf.len())?;
        let _g = self.reg.lock();
        let log = self.reg.log();
        log.buffer_event::<u32>(RegOp::BufferReadBegin, self.reg.name(), 0, &[]);
        self.reg.driver().read_fifo(self.reg.offset(), buf)?;
        log.buffer_event(RegOp::BufferReadEnd, self.reg.name(), 0, buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helper::*;
    use super::super::*;
    use crate::driver::{DriverOp, SimDriver};

    fn buffer_reg(d: &Arc<SimDriver>, capacity: usize) -> Arc<Reg> {
        Reg::new(
            spec(
                "wave",
                0x1000,
                RegType::BUFFER | RegType::NO_VALUE,
                d,
            ),
            RegKind::Buffer(BufferRegion::new(capacity)),
        )
    }

    #[test_log::test]
    fn buffer_overflow_test() {
        let d = Arc::new(SimDriver::new());
        let r = buffer_reg(&d, 16);
        let buf = r.as_buffer().unwrap();
        let data = [0u8; 32];
        assert!(matches!(
            buf.write_bytes(&data, 0, 17),
            Err(Error::BufferOverflow {
                requested: 17,
                capacity: 16,
                ..
            })
        ));
        assert!(buf.write_words(&[0; 5], 0, 5).is_err());
        assert!(buf.write_bytes(&data, 10, 8).is_err());
        assert!(matches!(
            buf.write_bytes(&data, usize::MAX, 1),
            Err(Error::BufferOverflow { .. })
        ));
        let mut words = [0u32; 2];
        assert!(matches!(
            buf.read_words(&mut words, usize::MAX / 2, 2),
            Err(Error::BufferOverflow { .. })
        ));
        assert!(d.ops().is_empty());
    }

    #[test_log::test]
    fn buffer_write_once_test() {
        let d = Arc::new(SimDriver::new());
        let r = buffer_reg(&d, 64);
        let _g = r.log().scoped(tracing::Level::TRACE);
        let buf = r.as_buffer().unwrap();
        let data = (0..40u8).collect::<Vec<_>>();
        buf.write_bytes(&data, 4, 20).unwrap();
        assert_eq!(
            d.ops(),
            vec![DriverOp::WriteArray8 {
                base: 0x1000,
                offset: 4,
                len: 20
            }]
        );
        assert_eq!(d.peek_bytes(0x1004, 3), vec![0, 1, 2]);
        let mut back = [0u8; 20];
        buf.read_bytes(&mut back, 4, 20).unwrap();
        assert_eq!(&back[..], &data[..20]);
    }

    #[test]
    fn buffer_words_and_fifo_test() {
        let d = Arc::new(SimDriver::new());
        let r = buffer_reg(&d, 64);
        let buf = r.as_buffer().unwrap();
        buf.write_words(&[0xa, 0xb], 2, 2).unwrap();
        let mut back = [0u32; 2];
        buf.read_words(&mut back, 2, 2).unwrap();
        assert_eq!(back, [0xa, 0xb]);
        buf.write_fifo(&[1, 2, 3]).unwrap();
        let mut fifo = [0u32; 3];
        buf.read_fifo(&mut fifo).unwrap();
        assert_eq!(fifo, [1, 2, 3]);
        assert!(buf.write_fifo(&[0; 17]).is_err());
    }

    #[test]
    fn buffer_is_not_scalar_test() {
        let d = Arc::new(SimDriver::new());
        let r = buffer_reg(&d, 64);
        r.set_value(1).unwrap();
        assert!(!r.apply(None, true).unwrap());
        assert!(matches!(r.read(), Err(Error::NotScalar(_))));
        let plain = mem_reg("ctrl", 0x0, RegType::RW, &d);
        assert!(plain.as_buffer().is_none());
    }
}
