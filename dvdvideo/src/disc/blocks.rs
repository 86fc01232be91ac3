//! Sector-level access to the VOB files of one domain.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::disc::find_file;
use crate::utils::errors::DemuxError;
use crate::utils::sector::DVD_VIDEO_LB_LEN;

/// Random access to 2048-byte logical blocks.
pub trait BlockSource {
    /// Number of blocks, counting a trailing partial block.
    fn block_count(&self) -> u32;

    /// Reads up to `count` whole blocks starting at `start` into `buf`.
    ///
    /// Returns the number of complete blocks read; fewer than `count` means
    /// the source ended, possibly in the middle of a block.
    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> io::Result<u32>;
}

/// Which VOB files of a title set are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VobDomain {
    /// `VIDEO_TS.VOB` for the Video Manager, `VTS_nn_0.VOB` otherwise.
    Menu,
    /// `VTS_nn_1.VOB` to `VTS_nn_9.VOB`.
    Title,
}

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

struct Part {
    reader: Box<dyn ReadSeek>,
    first_block: u32,
    blocks: u32,
}

/// Concatenation of the VOB files of one domain, addressed by block.
pub struct VobSet {
    parts: Vec<Part>,
    files: Vec<PathBuf>,
    total: u32,
}

impl std::fmt::Debug for VobSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VobSet")
            .field("files", &self.files)
            .field("total", &self.total)
            .finish()
    }
}

impl VobSet {
    /// Opens the VOB files of `title` (0 for the Video Manager) in the
    /// `VIDEO_TS` directory. File names are matched case-insensitively.
    pub fn open(video_ts: &Path, title: u16, domain: VobDomain) -> Result<Self, DemuxError> {
        let names: Vec<String> = match (title, domain) {
            (0, _) => vec!["VIDEO_TS.VOB".to_string()],
            (t, VobDomain::Menu) => vec![format!("VTS_{t:02}_0.VOB")],
            (t, VobDomain::Title) => (1..=9).map(|n| format!("VTS_{t:02}_{n}.VOB")).collect(),
        };

        let mut set = Self::empty();
        for name in &names {
            let Some(path) = find_file(video_ts, name) else {
                // title VOBs are numbered contiguously
                if domain == VobDomain::Title && !set.parts.is_empty() {
                    break;
                }
                continue;
            };

            let file = File::open(&path).map_err(|source| DemuxError::FileOpen {
                path: path.clone(),
                source,
            })?;
            let len = file.metadata()?.len();
            log::debug!("{}: {} blocks", path.display(), len.div_ceil(DVD_VIDEO_LB_LEN as u64));
            set.push(Box::new(file), len);
            set.files.push(path);
        }

        if set.parts.is_empty() {
            return Err(DemuxError::FileNotFound(video_ts.join(&names[0])));
        }
        Ok(set)
    }

    /// Wraps an in-memory or already opened stream.
    pub fn from_reader<R: Read + Seek + Send + 'static>(mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        let mut set = Self::empty();
        set.push(Box::new(reader), len);
        Ok(set)
    }

    fn empty() -> Self {
        Self {
            parts: Vec::new(),
            files: Vec::new(),
            total: 0,
        }
    }

    fn push(&mut self, reader: Box<dyn ReadSeek>, len: u64) {
        let blocks = len.div_ceil(DVD_VIDEO_LB_LEN as u64) as u32;
        self.parts.push(Part {
            reader,
            first_block: self.total,
            blocks,
        });
        self.total += blocks;
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn read_block(&mut self, block: u32, out: &mut [u8]) -> io::Result<bool> {
        let Some(part) = self
            .parts
            .iter_mut()
            .find(|p| (p.first_block..p.first_block + p.blocks).contains(&block))
        else {
            return Ok(false);
        };

        let offset = (block - part.first_block) as u64 * DVD_VIDEO_LB_LEN as u64;
        part.reader.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < out.len() {
            match part.reader.read(&mut out[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled == out.len())
    }
}

impl BlockSource for VobSet {
    fn block_count(&self) -> u32 {
        self.total
    }

    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> io::Result<u32> {
        let mut read = 0;
        for (i, out) in buf
            .chunks_exact_mut(DVD_VIDEO_LB_LEN)
            .take(count as usize)
            .enumerate()
        {
            if !self.read_block(start + i as u32, out)? {
                break;
            }
            read += 1;
        }
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn partial_last_block_ends_the_source() -> anyhow::Result<()> {
        let mut data = vec![0x11u8; DVD_VIDEO_LB_LEN];
        data.extend(vec![0x22u8; DVD_VIDEO_LB_LEN]);
        data.extend(vec![0x33u8; 100]);

        let mut set = VobSet::from_reader(Cursor::new(data))?;
        assert_eq!(set.block_count(), 3);

        let mut buf = vec![0u8; 3 * DVD_VIDEO_LB_LEN];
        assert_eq!(set.read_blocks(0, 3, &mut buf)?, 2);
        assert_eq!(buf[DVD_VIDEO_LB_LEN], 0x22);

        assert_eq!(set.read_blocks(2, 1, &mut buf)?, 0);
        assert_eq!(set.read_blocks(7, 1, &mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn title_vobs_are_concatenated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("VTS_01_1.VOB"), vec![1u8; DVD_VIDEO_LB_LEN])?;
        std::fs::write(dir.path().join("vts_01_2.vob"), vec![2u8; 2 * DVD_VIDEO_LB_LEN])?;
        std::fs::write(dir.path().join("VTS_01_0.VOB"), vec![9u8; DVD_VIDEO_LB_LEN])?;

        let mut set = VobSet::open(dir.path(), 1, VobDomain::Title)?;
        assert_eq!(set.block_count(), 3);
        assert_eq!(set.files().len(), 2);

        let mut buf = vec![0u8; DVD_VIDEO_LB_LEN];
        set.read_blocks(2, 1, &mut buf)?;
        assert_eq!(buf[0], 2);

        let menu = VobSet::open(dir.path(), 1, VobDomain::Menu)?;
        assert_eq!(menu.block_count(), 1);

        assert!(matches!(
            VobSet::open(dir.path(), 2, VobDomain::Title),
            Err(DemuxError::FileNotFound(_))
        ));
        Ok(())
    }
}
