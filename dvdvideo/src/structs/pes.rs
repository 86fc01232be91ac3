//! Program stream pack headers and PES timing fields.

use crate::utils::errors::DemuxError;
use crate::utils::sector::BinaryCursor;

pub const PACK_START_CODE: u32 = 0x0000_01BA;
pub const SYSTEM_HEADER: u8 = 0xBB;
pub const PRIVATE_STREAM_1: u8 = 0xBD;
pub const PADDING_STREAM: u8 = 0xBE;
pub const PRIVATE_STREAM_2: u8 = 0xBF;
pub const AUDIO_STREAM: u8 = 0xC0;
pub const VIDEO_STREAM: u8 = 0xE0;

/// First substream id of each private stream 1 payload family; each family
/// spans eight ids, subpictures span 32.
pub const SUBSTREAM_SUB: u8 = 0x20;
pub const SUBSTREAM_AC3: u8 = 0x80;
pub const SUBSTREAM_DTS: u8 = 0x88;
pub const SUBSTREAM_LPCM: u8 = 0xA0;

/// True when the four bytes can start a pack.
///
/// The test only looks at the start-code prefix bit and the bits set in
/// `0xBA`, the same masking the DVD players apply.
#[inline]
pub fn is_pack_start(identifier: u32) -> bool {
    (identifier & 0x100) == 0x100 && (identifier & 0xBA) == 0xBA
}

/// True when `code` carries the `0x000001` start-code prefix bit.
#[inline]
pub fn is_start_code(code: u32) -> bool {
    (code & 0x100) == 0x100
}

/// Fields of an MPEG-2 pack header following the start code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackHeader {
    /// System clock reference base, 90 kHz.
    pub scr: u64,
    pub scr_ext: u16,
    pub program_mux_rate: u32,
}

impl PackHeader {
    /// Parses the SCR, mux rate and stuffing; leaves the cursor on the next
    /// start code.
    pub fn parse(cursor: &mut BinaryCursor) -> Result<Self, DemuxError> {
        let start = cursor.position();
        let s: [u8; 6] = cursor.read_array()?;

        let marker = |ok: bool, at: usize, field| {
            if ok {
                Ok(())
            } else {
                Err(DemuxError::MarkerBit {
                    offset: cursor.offset_of(start + at),
                    field,
                })
            }
        };
        marker((s[0] & 0xC4) == 0x44, 0, "SCR")?;
        marker(s[2] & 0x04 != 0, 2, "SCR")?;
        marker(s[4] & 0x04 != 0, 4, "SCR")?;
        marker(s[5] & 0x01 != 0, 5, "SCR extension")?;

        let scr = ((((s[0] & 0x38) >> 1) | (s[0] & 0x03)) as u64) << 28
            | (s[1] as u64) << 20
            | ((((s[2] & 0xF8) >> 1) | (s[2] & 0x03)) as u64) << 13
            | (s[3] as u64) << 5
            | ((s[4] & 0xF8) >> 3) as u64;
        let scr_ext = ((s[4] & 0x03) as u16) << 7 | ((s[5] & 0xFE) >> 1) as u16;

        let m: [u8; 3] = cursor.read_array()?;
        let program_mux_rate = (m[0] as u32) << 14 | (m[1] as u32) << 6 | (m[2] >> 2) as u32;

        let stuffing = cursor.read_u8()? & 0x07;
        cursor.skip(stuffing as usize)?;

        Ok(Self {
            scr,
            scr_ext,
            program_mux_rate,
        })
    }
}

/// Optional part of a PES header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PesHeader {
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// `PES_header_data_length`
    pub header_len: u8,
}

impl PesHeader {
    /// Parses from the byte after the PES packet length and skips to the
    /// payload.
    pub fn parse(cursor: &mut BinaryCursor) -> Result<Self, DemuxError> {
        let first = cursor.read_u8()?;
        if (first & 0xC0) != 0x80 {
            return Err(DemuxError::InvalidPacket {
                offset: cursor.offset() - 1,
            });
        }
        let flags = cursor.read_u8()?;
        let header_len = cursor.read_u8()?;
        let data_start = cursor.position();

        let pts = if flags & 0x80 != 0 {
            Some(read_timestamp(cursor)?)
        } else {
            None
        };
        let dts = if flags & 0x40 != 0 {
            Some(read_timestamp(cursor)?)
        } else {
            None
        };

        let consumed = cursor.position() - data_start;
        cursor.skip((header_len as usize).saturating_sub(consumed))?;

        Ok(Self {
            pts,
            dts,
            header_len,
        })
    }
}

/// 33-bit PTS/DTS in the 5-byte layout.
fn read_timestamp(cursor: &mut BinaryCursor) -> Result<u64, DemuxError> {
    let start = cursor.offset();
    let b0 = cursor.read_u8()?;
    let w0 = cursor.read_u16()?;
    let w1 = cursor.read_u16()?;

    if w0 & 1 == 0 || w1 & 1 == 0 {
        return Err(DemuxError::MarkerBit {
            offset: start,
            field: "PES timestamp",
        });
    }

    Ok((((b0 & 0x0E) >> 1) as u64) << 30 | ((w0 >> 1) as u64) << 15 | (w1 >> 1) as u64)
}

/// Encodes a 33-bit timestamp with the given 4-bit prefix; used by tests
/// that build synthetic packets.
#[cfg(test)]
pub(crate) fn encode_timestamp(prefix: u8, value: u64) -> [u8; 5] {
    let b0 = (prefix << 4) | (((value >> 30) & 0x07) as u8) << 1 | 1;
    let w0 = ((((value >> 15) & 0x7FFF) as u16) << 1) | 1;
    let w1 = (((value & 0x7FFF) as u16) << 1) | 1;
    let [w0h, w0l] = w0.to_be_bytes();
    let [w1h, w1l] = w1.to_be_bytes();
    [b0, w0h, w0l, w1h, w1l]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_start_masking() {
        assert!(is_pack_start(0x0000_01BA));
        assert!(is_pack_start(0x0000_01BB));
        assert!(!is_pack_start(0x0000_00BA));
        assert!(!is_pack_start(0x0000_01E0));
    }

    #[test]
    fn parses_pack_header() -> anyhow::Result<()> {
        let scr: u64 = 0x1_0840_2011;
        let ext: u16 = 0x101;
        let s = [
            0x44 | (((scr >> 30) & 7) as u8) << 3 | ((scr >> 28) & 3) as u8,
            (scr >> 20) as u8,
            0x04 | (((scr >> 15) & 0x1F) as u8) << 3 | ((scr >> 13) & 3) as u8,
            (scr >> 5) as u8,
            0x04 | ((scr & 0x1F) as u8) << 3 | ((ext >> 7) & 3) as u8,
            (((ext & 0x7F) as u8) << 1) | 1,
        ];
        let mut data = s.to_vec();
        data.extend_from_slice(&[0x01, 0x89, 0xC3, 0xF8 | 2, 0xFF, 0xFF, 0x00]);

        let mut cursor = BinaryCursor::new(&data);
        let header = PackHeader::parse(&mut cursor)?;
        assert_eq!(header.scr, scr);
        assert_eq!(header.scr_ext, ext);
        assert_eq!(header.program_mux_rate, 0x01 << 14 | 0x89 << 6 | 0xC3 >> 2);
        assert_eq!(cursor.position(), data.len() - 1);
        Ok(())
    }

    #[test]
    fn rejects_bad_scr_marker() {
        let data = [0x40, 0, 0x04, 0, 0x04, 0x01, 0, 0, 0, 0];
        let mut cursor = BinaryCursor::with_base(&data, 2048);
        match PackHeader::parse(&mut cursor) {
            Err(DemuxError::MarkerBit { offset, .. }) => assert_eq!(offset, 2048),
            other => panic!("expected marker failure, got {other:?}"),
        }
    }

    #[test]
    fn parses_pts_and_dts() -> anyhow::Result<()> {
        let pts: u64 = 0x1_2345_6789;
        let dts: u64 = 90_000;
        let mut data = vec![0x81, 0xC0, 13];
        data.extend_from_slice(&encode_timestamp(3, pts));
        data.extend_from_slice(&encode_timestamp(1, dts));
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xAA]);

        let mut cursor = BinaryCursor::new(&data);
        let header = PesHeader::parse(&mut cursor)?;
        assert_eq!(header.pts, Some(pts));
        assert_eq!(header.dts, Some(dts));
        assert_eq!(cursor.read_u8()?, 0xAA);
        Ok(())
    }
}
