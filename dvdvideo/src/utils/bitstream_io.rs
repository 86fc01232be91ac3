//! Bit-level reader used for MPEG video headers and attribute bitfields.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    /// Reads a marker bit and fails unless it is set.
    #[inline(always)]
    pub fn marker(&mut self) -> io::Result<()> {
        if self.get()? {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "marker bit not set at {}",
                    self.bs.position_in_bits().unwrap_or(0).saturating_sub(1)
                ),
            ))
        }
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs
            .position_in_bits()
            .map(|pos| self.len.saturating_sub(pos))
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        let avail = self.available()?;
        if n as u64 > avail {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "skip_n: out of bounds bits",
            ))
        } else {
            self.bs.skip(n)
        }
    }

    #[inline(always)]
    pub fn byte_align(&mut self) {
        self.bs.byte_align();
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_across_byte_boundaries() -> anyhow::Result<()> {
        // 720 (12 bits), 576 (12 bits), aspect 2, frame rate code 3
        let data = [0x2D, 0x02, 0x40, 0x23];
        let mut reader = BsIoSliceReader::from_slice(&data);

        assert_eq!(reader.get_n::<u16>(12)?, 720);
        assert_eq!(reader.get_n::<u16>(12)?, 576);
        assert_eq!(reader.get_n::<u8>(4)?, 2);
        assert_eq!(reader.get_n::<u8>(4)?, 3);
        assert_eq!(reader.available()?, 0);
        assert!(reader.get().is_err());
        Ok(())
    }

    #[test]
    fn marker_bit_must_be_set() {
        let mut reader = BsIoSliceReader::from_slice(&[0x80]);
        assert!(reader.marker().is_ok());
        assert!(reader.marker().is_err());
    }
}
