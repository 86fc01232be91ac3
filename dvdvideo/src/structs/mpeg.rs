//! MPEG-1/2 video sequence and picture headers.

use std::fmt::{Display, Formatter};

use crate::structs::time::FrameRate;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::M2vError;

pub const PICTURE_START_CODE: u8 = 0x00;
pub const USER_DATA_START_CODE: u8 = 0xB2;
pub const SEQUENCE_HEADER_CODE: u8 = 0xB3;
pub const EXTENSION_START_CODE: u8 = 0xB5;
pub const SEQUENCE_END_CODE: u8 = 0xB7;
pub const GOP_START_CODE: u8 = 0xB8;

const SEQUENCE_EXTENSION_ID: u8 = 0x1;
const PICTURE_CODING_EXTENSION_ID: u8 = 0x8;

/// `picture_structure` value of a frame picture.
pub const FRAME_PICTURE: u8 = 3;

/// Position of the next `00 00 01` prefix at or after `from`.
pub fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|p| p + from)
}

/// Payload of the first extension with `id` inside `data`.
fn find_extension(data: &[u8], id: u8) -> Option<&[u8]> {
    let mut at = 0;
    while let Some(pos) = find_start_code(data, at) {
        let payload = data.get(pos + 4..)?;
        if data.get(pos + 3) == Some(&EXTENSION_START_CODE) && payload.first()? >> 4 == id {
            return Some(payload);
        }
        at = pos + 3;
    }
    None
}

fn header_err(header: &'static str) -> impl FnOnce(std::io::Error) -> M2vError {
    move |source| M2vError::Header { header, source }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub width: u16,
    pub height: u16,
    pub aspect_ratio: u8,
    pub frame_rate: FrameRate,
    pub bit_rate: u32,
    pub progressive_sequence: bool,
    /// 1 or 2
    pub mpeg_version: u8,
    pub profile_level: u8,
}

impl SequenceHeader {
    /// Parses a chunk starting with the sequence header start code.
    pub fn parse(chunk: &[u8]) -> Result<Self, M2vError> {
        let err = header_err("sequence");
        let body = chunk.get(4..).unwrap_or_default();
        let mut bs = BsIoSliceReader::from_slice(body);

        let fields = (|| -> std::io::Result<_> {
            let width = bs.get_n::<u16>(12)?;
            let height = bs.get_n::<u16>(12)?;
            let aspect = bs.get_n::<u8>(4)?;
            let rate = bs.get_n::<u8>(4)?;
            let bit_rate = bs.get_n::<u32>(18)?;
            bs.marker()?;
            Ok((width, height, aspect, rate, bit_rate))
        })();
        let (mut width, mut height, aspect_ratio, frame_rate_code, mut bit_rate) =
            fields.map_err(err)?;

        let mut header = Self {
            width,
            height,
            aspect_ratio,
            frame_rate: FrameRate::from(frame_rate_code),
            bit_rate,
            progressive_sequence: true,
            mpeg_version: 1,
            profile_level: 0,
        };

        if let Some(ext) = find_extension(body, SEQUENCE_EXTENSION_ID) {
            let mut bs = BsIoSliceReader::from_slice(ext);
            (|| -> std::io::Result<()> {
                bs.skip_n(4)?;
                header.profile_level = bs.get_n(8)?;
                header.progressive_sequence = bs.get()?;
                bs.skip_n(2)?;
                width |= bs.get_n::<u16>(2)? << 12;
                height |= bs.get_n::<u16>(2)? << 12;
                bit_rate |= bs.get_n::<u32>(12)? << 18;
                Ok(())
            })()
            .map_err(header_err("sequence extension"))?;
            header.width = width;
            header.height = height;
            header.bit_rate = bit_rate;
            header.mpeg_version = 2;
        }

        Ok(header)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    I,
    P,
    B,
    /// D pictures and reserved codes.
    Other(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            1 => FrameType::I,
            2 => FrameType::P,
            3 => FrameType::B,
            v => FrameType::Other(v),
        }
    }
}

impl Display for FrameType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameType::I => f.write_str("I"),
            FrameType::P => f.write_str("P"),
            FrameType::B => f.write_str("B"),
            FrameType::Other(v) => write!(f, "?({v})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureHeader {
    pub temporal_reference: u16,
    pub frame_type: FrameType,
    pub picture_structure: u8,
    pub top_field_first: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
}

impl PictureHeader {
    /// Parses a chunk starting with the picture start code.
    pub fn parse(chunk: &[u8]) -> Result<Self, M2vError> {
        let body = chunk.get(4..).unwrap_or_default();
        let mut bs = BsIoSliceReader::from_slice(body);
        let (temporal_reference, coding_type) = (|| -> std::io::Result<_> {
            let temporal = bs.get_n::<u16>(10)?;
            let coding = bs.get_n::<u8>(3)?;
            Ok((temporal, coding))
        })()
        .map_err(header_err("picture"))?;

        let mut header = Self {
            temporal_reference,
            frame_type: FrameType::from(coding_type),
            picture_structure: FRAME_PICTURE,
            top_field_first: false,
            repeat_first_field: false,
            progressive_frame: true,
        };

        if let Some(ext) = find_extension(body, PICTURE_CODING_EXTENSION_ID) {
            let mut bs = BsIoSliceReader::from_slice(ext);
            (|| -> std::io::Result<()> {
                // extension id, f_codes, intra_dc_precision
                bs.skip_n(4 + 16 + 2)?;
                header.picture_structure = bs.get_n(2)?;
                header.top_field_first = bs.get()?;
                // frame_pred_frame_dct .. alternate_scan
                bs.skip_n(5)?;
                header.repeat_first_field = bs.get()?;
                bs.skip_n(1)?;
                header.progressive_frame = bs.get()?;
                Ok(())
            })()
            .map_err(header_err("picture coding extension"))?;
        }

        Ok(header)
    }
}
