//! Big-endian cursor over one logical block.

use crate::utils::errors::DemuxError;

/// Size of a DVD-Video logical block.
pub const DVD_VIDEO_LB_LEN: usize = 2048;

/// Cursor over a sector buffer.
///
/// Every read is bounds checked; running off the end yields
/// [`DemuxError::TruncatedPacket`] carrying the absolute byte offset of the
/// failed read (`base + index`).
#[derive(Debug)]
pub struct BinaryCursor<'a> {
    buf: &'a [u8],
    index: usize,
    base: u64,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    /// `base` is the absolute offset of `buf[0]` in the source, used for
    /// error reporting.
    pub fn with_base(buf: &'a [u8], base: u64) -> Self {
        Self {
            buf,
            index: 0,
            base,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.index)
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.base + self.index as u64
    }

    /// Absolute offset of an earlier position in this buffer.
    #[inline]
    pub fn offset_of(&self, position: usize) -> u64 {
        self.base + position as u64
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    #[inline]
    fn truncated(&self) -> DemuxError {
        DemuxError::TruncatedPacket {
            offset: self.offset(),
        }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DemuxError> {
        if n > self.remaining() {
            return Err(self.truncated());
        }
        let out = &self.buf[self.index..self.index + n];
        self.index += n;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DemuxError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DemuxError> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, DemuxError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, DemuxError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DemuxError> {
        self.take(n).map(|_| ())
    }

    /// Moves to an absolute position inside the buffer.
    pub fn seek_to(&mut self, position: usize) -> Result<(), DemuxError> {
        if position > self.buf.len() {
            return Err(DemuxError::TruncatedPacket {
                offset: self.offset_of(position),
            });
        }
        self.index = position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() -> anyhow::Result<()> {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        let mut cursor = BinaryCursor::new(&data);

        assert_eq!(cursor.read_u8()?, 0x12);
        assert_eq!(cursor.read_u16()?, 0x3456);
        assert_eq!(cursor.read_u32()?, 0x789A_BCDE);
        assert_eq!(cursor.remaining(), 0);
        Ok(())
    }

    #[test]
    fn overrun_reports_absolute_offset() {
        let data = [0u8; DVD_VIDEO_LB_LEN];
        let mut cursor = BinaryCursor::with_base(&data, 3 * DVD_VIDEO_LB_LEN as u64);

        assert!(cursor.skip(DVD_VIDEO_LB_LEN - 1).is_ok());
        match cursor.read_u16() {
            Err(DemuxError::TruncatedPacket { offset }) => {
                assert_eq!(offset, 4 * DVD_VIDEO_LB_LEN as u64 - 1)
            }
            other => panic!("expected TruncatedPacket, got {other:?}"),
        }
        // A failed read does not move the cursor
        assert_eq!(cursor.remaining(), 1);
    }
}
