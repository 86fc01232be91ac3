use std::collections::VecDeque;

use crate::structs::mpeg::{
    EXTENSION_START_CODE, GOP_START_CODE, PICTURE_START_CODE, SEQUENCE_END_CODE,
    SEQUENCE_HEADER_CODE, USER_DATA_START_CODE,
};
use crate::utils::errors::M2vError;

/// Default scanner capacity, 2 MiB.
pub const DEFAULT_CAPACITY: usize = 2 * 1024 * 1024;

/// Kind of a chunk, taken from the start code it begins with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    SequenceHeader,
    GopHeader,
    Picture,
    Slice,
    Extension,
    UserData,
    SequenceEnd,
    Other(u8),
}

impl From<u8> for ChunkType {
    fn from(code: u8) -> Self {
        match code {
            PICTURE_START_CODE => ChunkType::Picture,
            0x01..=0xAF => ChunkType::Slice,
            USER_DATA_START_CODE => ChunkType::UserData,
            SEQUENCE_HEADER_CODE => ChunkType::SequenceHeader,
            EXTENSION_START_CODE => ChunkType::Extension,
            SEQUENCE_END_CODE => ChunkType::SequenceEnd,
            GOP_START_CODE => ChunkType::GopHeader,
            other => ChunkType::Other(other),
        }
    }
}

/// Start codes that open a new chunk. Extensions, user data and slices stay
/// attached to the header or picture they follow.
fn opens_chunk(code: u8) -> bool {
    matches!(
        code,
        PICTURE_START_CODE | SEQUENCE_HEADER_CODE | SEQUENCE_END_CODE | GOP_START_CODE
    )
}

/// A start-code delimited run of an MPEG video elementary stream.
#[derive(Debug, PartialEq, Eq)]
pub struct Chunk {
    kind: ChunkType,
    data: Vec<u8>,
}

impl Chunk {
    pub fn kind(&self) -> ChunkType {
        self.kind
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Splits an MPEG video elementary stream into chunks.
///
/// Bytes are appended with [`push_bytes`](Self::push_bytes); a chunk is
/// emitted once the start code of the following chunk is buffered. After
/// [`force_final`](Self::force_final) the trailing partial chunk is emitted
/// too.
///
/// # Example
///
/// ```rust
/// use dvdvideo::process::chunk::{ChunkScanner, ChunkType};
///
/// let mut scanner = ChunkScanner::default();
/// scanner.push_bytes(&[0, 0, 1, 0xB3, 0x2D, 0, 0, 1, 0x00, 0x00, 0x0F])?;
///
/// let first = scanner.next().map(|c| c.kind());
/// assert_eq!(first, Some(ChunkType::SequenceHeader));
/// assert!(scanner.next().is_none());
///
/// scanner.force_final();
/// assert_eq!(scanner.next().map(|c| c.kind()), Some(ChunkType::Picture));
/// # Ok::<(), dvdvideo::utils::errors::M2vError>(())
/// ```
#[derive(Debug)]
pub struct ChunkScanner {
    buffer: VecDeque<u8>,
    capacity: usize,
    synced: bool,
    scan_pos: usize,
    final_flush: bool,
}

impl Default for ChunkScanner {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ChunkScanner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            synced: false,
            scan_pos: 4,
            final_flush: false,
        }
    }

    /// Appends stream bytes. Fails without consuming anything when the
    /// pending bytes would exceed the capacity.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), M2vError> {
        let pending = self.buffer.len() + data.len();
        if pending > self.capacity {
            return Err(M2vError::BufferFull {
                pending,
                capacity: self.capacity,
            });
        }
        self.buffer.extend(data);
        Ok(())
    }

    /// No more data will arrive; the buffered tail becomes the last chunk.
    pub fn force_final(&mut self) {
        self.final_flush = true;
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops leading bytes until a start code sits at the front.
    fn sync(&mut self) -> bool {
        let data = self.buffer.make_contiguous();
        match data.windows(3).position(|w| w == [0, 0, 1]) {
            Some(pos) => {
                if pos > 0 {
                    log::debug!("Skipping {pos} bytes before the first start code");
                }
                self.buffer.drain(..pos);
                self.synced = true;
                true
            }
            None => {
                let keep = self.buffer.len().min(2);
                self.buffer.drain(..self.buffer.len() - keep);
                false
            }
        }
    }

    fn take_chunk(&mut self, len: usize) -> Chunk {
        let data: Vec<u8> = self.buffer.drain(..len).collect();
        let kind = ChunkType::from(data.get(3).copied().unwrap_or(0xFF));
        self.scan_pos = 4;
        Chunk { kind, data }
    }
}

impl Iterator for ChunkScanner {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.synced && !self.sync() {
            return None;
        }

        let data = self.buffer.make_contiguous();
        let mut pos = self.scan_pos;
        while pos + 4 <= data.len() {
            if data[pos] == 0 && data[pos + 1] == 0 && data[pos + 2] == 1 {
                if opens_chunk(data[pos + 3]) {
                    return Some(self.take_chunk(pos));
                }
                pos += 3;
            } else {
                pos += 1;
            }
        }
        self.scan_pos = pos;

        if self.final_flush && !self.buffer.is_empty() {
            let len = self.buffer.len();
            return Some(self.take_chunk(len));
        }
        None
    }
}
