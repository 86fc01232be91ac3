//! RIFF/WAVE output for DVD linear PCM.

use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use dvdmx_macros::{ToBytes, riff_chunk};

use crate::utils::byteorder::{RiffChunk, WriteBytesLe};

const PCM_FORMAT_TAG: u16 = 1;

#[riff_chunk(b"fmt ")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
pub struct FmtChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FmtChunk {
    pub fn pcm(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        let block_align = channels * bits_per_sample / 8;
        Self {
            format_tag: PCM_FORMAT_TAG,
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample,
        }
    }
}

/// WAV writer with size fields patched by [`finish`](Self::finish).
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    riff_size_position: u64,
    data_size_position: u64,
    data_written: u64,
    format: FmtChunk,
}

impl<W: Write + Seek> WavWriter<W> {
    /// Writes the header with zero sizes.
    pub fn new(writer: W, format: FmtChunk) -> io::Result<Self> {
        let mut writer = BufWriter::new(writer);

        writer.write_all(b"RIFF")?;
        let riff_size_position = writer.stream_position()?;
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(b"WAVE")?;

        writer.write_all(&format.to_chunk())?;

        writer.write_all(b"data")?;
        let data_size_position = writer.stream_position()?;
        writer.write_all(&0u32.to_le_bytes())?;

        Ok(Self {
            writer,
            riff_size_position,
            data_size_position,
            data_written: 0,
            format,
        })
    }

    pub fn format(&self) -> &FmtChunk {
        &self.format
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    /// Writes 16-bit big-endian samples as little-endian. A trailing odd
    /// byte is dropped.
    pub fn write_be16_samples(&mut self, data: &[u8]) -> io::Result<()> {
        let mut swapped = Vec::with_capacity(data.len());
        for pair in data.chunks_exact(2) {
            u16::from_be_bytes([pair[0], pair[1]]).write_le(&mut swapped);
        }
        self.writer.write_all(&swapped)?;
        self.data_written += swapped.len() as u64;
        Ok(())
    }

    /// Patches the RIFF and data sizes.
    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let end = self.writer.stream_position()?;

        let data_size = self.data_written as u32;
        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer.write_all(&data_size.to_le_bytes())?;

        let riff_size = (end - self.riff_size_position - 4) as u32;
        self.writer.seek(SeekFrom::Start(self.riff_size_position))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}
