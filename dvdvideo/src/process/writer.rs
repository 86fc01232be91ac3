//! Per-format output writers.
//!
//! Every writer owns a payload file `{prefix}.{ext}` and most also keep a
//! v3 timecode file `{prefix}_{ext}.tmc` describing cell boundaries and
//! gaps. Files are created on first use, so a stream that never carries
//! data leaves nothing behind.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use dvdmx_macros::ToBytes;
use log::Level;

use crate::log_or_err;
use crate::process::m2v::{M2vParser, MpegFrame};
use crate::structs::cell::CellListElem;
use crate::structs::ifo::lang_code_str;
use crate::structs::language::language_name;
use crate::utils::byteorder::WriteBytesBe;
use crate::utils::errors::{DemuxError, TimelineError};
use crate::utils::wav::{FmtChunk, WavWriter};

pub const TIMECODE_HEADER: &str = "# timecode format v3";
pub const BUTTON_MAGIC: &[u8; 8] = b"butonDVD";

/// `prefix` with `suffix` appended to its last component.
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

fn create(path: &Path) -> Result<File, DemuxError> {
    File::create(path).map_err(|source| DemuxError::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

/// Seconds between two millisecond stamps.
fn span(to: u32, from: u32) -> f64 {
    (to as f64 - from as f64) / 1000.0
}

/// File created with an optional header on first access.
#[derive(Debug)]
struct LazyFile {
    path: PathBuf,
    header: Vec<u8>,
    file: Option<BufWriter<File>>,
    written: u64,
}

impl LazyFile {
    fn new(path: PathBuf) -> Self {
        Self::with_header(path, Vec::new())
    }

    fn with_header(path: PathBuf, header: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            header: header.into(),
            file: None,
            written: 0,
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn get(&mut self) -> Result<&mut BufWriter<File>, DemuxError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let mut file = BufWriter::new(create(&self.path)?);
                file.write_all(&self.header)?;
                self.written = self.header.len() as u64;
                file
            }
        };
        Ok(self.file.insert(file))
    }

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> Result<u64, DemuxError> {
        self.get()?.write_all(data)?;
        let position = self.written;
        self.written += data.len() as u64;
        Ok(position)
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> Result<(), DemuxError> {
        let text = fmt::format(args);
        self.append(text.as_bytes()).map(|_| ())
    }

    fn flush(&mut self) -> Result<(), DemuxError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

fn timecode_file(prefix: &Path, extension: &str, fps: f64) -> LazyFile {
    LazyFile::with_header(
        with_suffix(prefix, &format!("_{extension}.tmc")),
        format!("{TIMECODE_HEADER}\nassume {fps:.6}\n"),
    )
}

/// Start and end of the current cell and of the last packet, in
/// milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CellTiming {
    start: u32,
    end: u32,
    last_start: u32,
    last_end: u32,
}

impl CellTiming {
    /// Extends the cell to the end of a frame stamped relative to its start.
    fn record(&mut self, frame: &MpegFrame) {
        let end = self.start + (frame.end() / 1_000_000) as u32;
        if end > self.last_end {
            self.last_start = self.start + (frame.timecode / 1_000_000) as u32;
            self.last_end = end;
        }
    }
}

/// Timecodes of streams whose packets carry VOBU boundaries: a packet
/// starting after the previous one ended opens a gap, and a cell boundary
/// closes the missing tail of the cell as a gap.
#[derive(Debug)]
struct GapTimecodes {
    tmc: LazyFile,
    timing: CellTiming,
    kind: &'static str,
    fail_level: Level,
}

impl GapTimecodes {
    fn new(prefix: &Path, extension: &str, kind: &'static str) -> Self {
        Self {
            tmc: timecode_file(prefix, extension, 0.0),
            timing: CellTiming::default(),
            kind,
            fail_level: Level::Error,
        }
    }

    fn on_packet(&mut self, start: u32, end: u32) -> Result<(), DemuxError> {
        let t = &mut self.timing;
        if start > t.last_end {
            if t.last_end > t.start {
                writeln!(self.tmc, "{:.6}", span(t.last_end, t.start))?;
            }
            writeln!(self.tmc, "{:.6}", span(t.last_end, t.last_start))?;
            writeln!(self.tmc, "gap,{:.6}", span(start, t.last_end))?;
            t.start = start;
        } else {
            self.tmc.get()?;
        }
        t.last_start = start;
        t.last_end = end;
        Ok(())
    }

    /// Closes the running cell. At the end of the stream the nominal cell
    /// end is written instead of the last packet end.
    fn close_cell(&mut self, at_end: bool) -> Result<(), DemuxError> {
        let t = self.timing;
        if t.last_end < t.end {
            if t.last_end > t.start {
                writeln!(self.tmc, "{:.6}", span(t.last_end, t.start))?;
            }
            writeln!(self.tmc, "gap,{:.6}", span(t.end, t.last_end))?;
        } else if t.end != 0 {
            if at_end {
                writeln!(self.tmc, "{:.6}", span(t.end, t.start))?;
            } else {
                if t.last_end > t.end {
                    log_or_err!(self, Level::Warn, TimelineError::CellOverrun { kind: self.kind });
                }
                writeln!(self.tmc, "{:.6}", span(t.last_end, t.start))?;
            }
        }
        Ok(())
    }

    fn on_boundary(&mut self, start: u32, duration: u32, cell: &CellListElem) -> Result<(), DemuxError> {
        self.close_cell(false)?;
        self.timing = CellTiming {
            start,
            end: start + duration,
            last_start: start,
            last_end: start,
        };
        writeln!(self.tmc, "\n# VOB {} Cell {}", cell.vob_id, cell.cell_id)
    }

    fn finish(&mut self) -> Result<(), DemuxError> {
        if self.tmc.is_open() {
            self.close_cell(true)?;
        }
        self.tmc.flush()
    }
}

/// AC-3, DTS and button streams: raw payload plus gap timecodes.
#[derive(Debug)]
pub struct GapWriter {
    payload: LazyFile,
    timecodes: GapTimecodes,
}

impl GapWriter {
    fn new(prefix: &Path, extension: &str, kind: &'static str, header: Vec<u8>) -> Self {
        Self {
            payload: LazyFile::with_header(with_suffix(prefix, &format!(".{extension}")), header),
            timecodes: GapTimecodes::new(prefix, extension, kind),
        }
    }

    fn process_stream(&mut self, data: &[u8], start: u32, end: u32) -> Result<(), DemuxError> {
        self.payload.get()?;
        self.timecodes.on_packet(start, end)?;
        self.payload.append(data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), DemuxError> {
        self.timecodes.finish()?;
        self.payload.flush()
    }
}

#[derive(Debug, ToBytes)]
struct ButtonHeader {
    magic: [u8; 8],
    width: u16,
    height: u16,
    padding: u32,
}

/// Linear PCM converted to a WAV file. Only 16-bit samples are written.
pub struct LpcmWriter {
    path: PathBuf,
    format: FmtChunk,
    wav: Option<WavWriter<File>>,
    timecodes: GapTimecodes,
}

impl fmt::Debug for LpcmWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LpcmWriter")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("open", &self.wav.is_some())
            .finish()
    }
}

impl LpcmWriter {
    fn process_stream(&mut self, data: &[u8], start: u32, end: u32) -> Result<(), DemuxError> {
        if self.format.bits_per_sample != 16 {
            return Ok(());
        }

        let wav = match self.wav.take() {
            Some(wav) => wav,
            None => WavWriter::new(create(&self.path)?, self.format)?,
        };
        let wav = self.wav.insert(wav);
        self.timecodes.on_packet(start, end)?;
        wav.write_be16_samples(data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), DemuxError> {
        self.timecodes.finish()?;
        if let Some(wav) = self.wav.as_mut() {
            wav.finish()?;
        }
        Ok(())
    }
}

/// MPEG audio: payload plus a header-only timecode file.
#[derive(Debug)]
pub struct MpaWriter {
    payload: LazyFile,
    tmc: LazyFile,
}

/// Subpicture attributes needed for the VobSub index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleParams {
    pub width: u16,
    pub height: u16,
    pub palette: [u32; 16],
    /// Packed two-letter code, 0 when unknown.
    pub language: u16,
    pub forced: bool,
}

/// VobSub `.sub` payload of whole sectors and its `.idx` index.
#[derive(Debug)]
pub struct SubtitleWriter {
    payload: LazyFile,
    idx: LazyFile,
    start: u32,
    end: u32,
}

impl SubtitleWriter {
    fn preamble(params: &SubtitleParams) -> String {
        let palette = params
            .palette
            .iter()
            .map(|color| format!("{color:06x}"))
            .collect::<Vec<_>>()
            .join(", ");
        let id = lang_code_str(params.language).unwrap_or_else(|| "un".to_string());

        format!(
            "# VobSub index file, v7 (do not modify this line!)\n\
             #\n\
             # Settings\n\
             \n\
             # Original frame size\n\
             size: {width}x{height}\n\
             \n\
             # Origin, relative to the upper-left corner, can be overloaded by aligment\n\
             org: 0, 0\n\
             \n\
             # Image scaling (hor,ver), origin is at the upper-left corner or at the alignment coord (x, y)\n\
             scale: 100%, 100%\n\
             \n\
             # Alpha blending\n\
             alpha: 100%\n\
             \n\
             # Smoothing for very blocky images (use OLD for no filtering)\n\
             smooth: OFF\n\
             \n\
             # In millisecs\n\
             fadein/out: 50, 50\n\
             \n\
             # Force subtitle placement relative to (org.x, org.y)\n\
             align: OFF at LEFT TOP\n\
             \n\
             # For correcting non-progressive desync. (in millisecs or hh:mm:ss:ms)\n\
             # Note: Not effective in DirectVobSub, use \"delay: ... \" instead.\n\
             time offset: 0\n\
             \n\
             # ON: displays only forced subtitles, OFF: shows everything\n\
             forced subs: OFF\n\
             \n\
             # The original palette of the DVD\n\
             palette: {palette}\n\
             \n\
             # Custom colors (transp idxs and the four colors)\n\
             custom colors: OFF, tridx: 0000, colors: 000000, 000000, 000000, 000000\n\
             \n\
             # Language index in use\n\
             langidx: 0\n\
             \n\
             id: {id}, index: 0\n\
             # Decomment next line to activate alternative name in DirectVobSub / Windows Media Player 6.x\n\
             # alt: {name}\n\
             \n",
            width = params.width,
            height = params.height,
            name = language_name(params.language),
        )
    }

    fn process_stream(&mut self, data: &[u8], start: u32) -> Result<(), DemuxError> {
        self.payload.get()?;
        let filepos = self.payload.written;

        let delay = start + self.start;
        let (ms, seconds) = (delay % 1000, delay / 1000);
        writeln!(
            self.idx,
            "timestamp: {:02}:{:02}:{:02}:{:03}, filepos: {:09x}",
            seconds / 3600,
            seconds / 60 % 60,
            seconds % 60,
            ms,
            filepos
        )?;

        self.payload.append(data)?;
        Ok(())
    }

    /// Subtitle times accumulate over cells; a boundary at zero starts a
    /// new VOB whose packets are offset by everything seen so far.
    fn set_boundary(&mut self, start: u32, duration: u32) {
        if start == 0 {
            self.start = self.end;
        }
        self.end += duration;
    }
}

/// MPEG-2 video. The payload is written verbatim; a reorderer per cell
/// finds the end time of the last presented frame.
pub struct VideoWriter {
    payload: LazyFile,
    tmc: LazyFile,
    parser: Option<M2vParser>,
    timing: CellTiming,
    is_still: bool,
    fail_level: Level,
}

impl fmt::Debug for VideoWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoWriter")
            .field("payload", &self.payload.path)
            .field("timing", &self.timing)
            .field("is_still", &self.is_still)
            .finish()
    }
}

impl VideoWriter {
    fn process_stream(&mut self, data: &[u8]) -> Result<(), DemuxError> {
        let parser = self.parser.get_or_insert_with(M2vParser::default);
        match parser.write_data(data) {
            Ok(()) => {
                while let Some(frame) = parser.read_frame() {
                    self.timing.record(&frame);
                }
            }
            Err(e) => {
                log::warn!("{e}, restarting the video parser");
                self.parser = Some(M2vParser::default());
            }
        }

        self.payload.append(data)?;
        Ok(())
    }

    /// Drains the cell's reorderer and records the end of its last frame.
    fn flush_parser(&mut self) {
        let Some(mut parser) = self.parser.take() else {
            return;
        };
        parser.set_eos();
        while let Some(frame) = parser.read_frame() {
            self.timing.record(&frame);
        }
    }

    fn close_cell(&mut self, at_end: bool) -> Result<(), DemuxError> {
        let t = self.timing;
        if t.end == 0 {
            return Ok(());
        }

        if self.is_still {
            writeln!(self.tmc, " (Still)")?;
            let length = t.end.saturating_sub(t.start);
            let rate = if length > 0 { 1000.0 / length as f64 } else { 0.0 };
            writeln!(self.tmc, "{:.6},{:.6}", span(t.end, t.start), rate)?;
        } else if t.last_end < t.end {
            writeln!(self.tmc, "\n{:.6}", span(t.last_end, t.start))?;
            writeln!(self.tmc, "gap,{:.6}", span(t.end, t.last_end))?;
        } else if at_end {
            writeln!(self.tmc, "\n{:.6}", span(t.end, t.start))?;
        } else {
            if t.last_end > t.end {
                log_or_err!(self, Level::Warn, TimelineError::CellOverrun { kind: "video" });
            }
            writeln!(self.tmc, "\n{:.6}", span(t.last_end, t.start))?;
        }
        Ok(())
    }

    fn set_boundary(&mut self, start: u32, duration: u32, cell: &CellListElem) -> Result<(), DemuxError> {
        self.flush_parser();
        self.parser = Some(M2vParser::default());

        self.tmc.get()?;
        self.close_cell(false)?;

        self.timing = CellTiming {
            start,
            end: start + duration,
            last_start: start,
            last_end: start,
        };
        self.is_still = cell.is_still;
        write!(self.tmc, "\n# VOB {} Cell {}", cell.vob_id, cell.cell_id)
    }

    fn finish(&mut self) -> Result<(), DemuxError> {
        self.flush_parser();
        if self.tmc.is_open() {
            self.close_cell(true)?;
        }
        self.tmc.flush()?;
        self.payload.flush()
    }
}

#[derive(Debug)]
pub enum Format {
    Video(VideoWriter),
    Ac3(GapWriter),
    Dts(GapWriter),
    Lpcm(LpcmWriter),
    Mpa(MpaWriter),
    Subtitle(SubtitleWriter),
    Button(GapWriter),
}

/// One output stream. Files are finalized on [`finalize`](Self::finalize)
/// or when the writer is dropped.
#[derive(Debug)]
pub struct Writer {
    format: Format,
    finalized: bool,
}

impl Writer {
    fn from_format(format: Format) -> Self {
        Self {
            format,
            finalized: false,
        }
    }

    /// `fps` goes into the timecode file header.
    pub fn video(prefix: &Path, fps: f64) -> Self {
        Self::from_format(Format::Video(VideoWriter {
            payload: LazyFile::new(with_suffix(prefix, ".m2v")),
            tmc: timecode_file(prefix, "m2v", fps),
            parser: None,
            timing: CellTiming::default(),
            is_still: false,
            fail_level: Level::Error,
        }))
    }

    pub fn ac3(prefix: &Path) -> Self {
        Self::from_format(Format::Ac3(GapWriter::new(prefix, "ac3", "AC3 audio", Vec::new())))
    }

    pub fn dts(prefix: &Path) -> Self {
        Self::from_format(Format::Dts(GapWriter::new(prefix, "dts", "DTS audio", Vec::new())))
    }

    pub fn lpcm(prefix: &Path, format: FmtChunk) -> Self {
        if format.bits_per_sample != 16 {
            log::warn!(
                "{}-bit LPCM is not supported, {} stays empty",
                format.bits_per_sample,
                with_suffix(prefix, ".wav").display()
            );
        }
        Self::from_format(Format::Lpcm(LpcmWriter {
            path: with_suffix(prefix, ".wav"),
            format,
            wav: None,
            timecodes: GapTimecodes::new(prefix, "wav", "PCM audio"),
        }))
    }

    pub fn mpa(prefix: &Path) -> Self {
        Self::from_format(Format::Mpa(MpaWriter {
            payload: LazyFile::new(with_suffix(prefix, ".mpa")),
            tmc: timecode_file(prefix, "mpa", 0.0),
        }))
    }

    pub fn subtitle(prefix: &Path, params: &SubtitleParams) -> Self {
        Self::from_format(Format::Subtitle(SubtitleWriter {
            payload: LazyFile::new(with_suffix(prefix, ".sub")),
            idx: LazyFile::with_header(
                with_suffix(prefix, ".idx"),
                SubtitleWriter::preamble(params),
            ),
            start: 0,
            end: 0,
        }))
    }

    /// Raw PCI packets behind a `butonDVD` header.
    pub fn button(prefix: &Path, width: u16, height: u16) -> Self {
        let mut header = Vec::new();
        ButtonHeader {
            magic: *BUTTON_MAGIC,
            width,
            height,
            padding: 0,
        }
        .write_be(&mut header);
        Self::from_format(Format::Button(GapWriter::new(
            prefix,
            "btn",
            "Button data",
            header,
        )))
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn extension(&self) -> &'static str {
        match self.format {
            Format::Video(_) => "m2v",
            Format::Ac3(_) => "ac3",
            Format::Dts(_) => "dts",
            Format::Lpcm(_) => "wav",
            Format::Mpa(_) => "mpa",
            Format::Subtitle(_) => "sub",
            Format::Button(_) => "btn",
        }
    }

    /// Escalates cell overruns to errors at or above `fail_level`.
    pub fn set_fail_level(&mut self, fail_level: Level) {
        match &mut self.format {
            Format::Video(w) => w.fail_level = fail_level,
            Format::Ac3(w) | Format::Dts(w) | Format::Button(w) => {
                w.timecodes.fail_level = fail_level
            }
            Format::Lpcm(w) => w.timecodes.fail_level = fail_level,
            Format::Mpa(_) | Format::Subtitle(_) => {}
        }
    }

    /// True once the payload file has been created.
    pub fn file_exists(&self) -> bool {
        match &self.format {
            Format::Video(w) => w.payload.is_open(),
            Format::Ac3(w) | Format::Dts(w) | Format::Button(w) => w.payload.is_open(),
            Format::Lpcm(w) => w.wav.is_some(),
            Format::Mpa(w) => w.payload.is_open(),
            Format::Subtitle(w) => w.payload.is_open(),
        }
    }

    /// Payload of one packet; times are in milliseconds.
    pub fn process_stream(&mut self, data: &[u8], start: u32, end: u32) -> Result<(), DemuxError> {
        match &mut self.format {
            Format::Video(w) => w.process_stream(data),
            Format::Ac3(w) | Format::Dts(w) | Format::Button(w) => w.process_stream(data, start, end),
            Format::Lpcm(w) => w.process_stream(data, start, end),
            Format::Mpa(w) => {
                w.tmc.get()?;
                w.payload.append(data).map(|_| ())
            }
            Format::Subtitle(w) => w.process_stream(data, start),
        }
    }

    /// A new cell starts at `start` and lasts `duration` milliseconds.
    pub fn set_boundary(
        &mut self,
        start: u32,
        duration: u32,
        cell: &CellListElem,
    ) -> Result<(), DemuxError> {
        match &mut self.format {
            Format::Video(w) => w.set_boundary(start, duration, cell),
            Format::Ac3(w) | Format::Dts(w) | Format::Button(w) => {
                w.timecodes.on_boundary(start, duration, cell)
            }
            Format::Lpcm(w) => w.timecodes.on_boundary(start, duration, cell),
            Format::Mpa(_) => Ok(()),
            Format::Subtitle(w) => {
                w.set_boundary(start, duration);
                Ok(())
            }
        }
    }

    /// Closes the last cell, patches headers and flushes. Later calls are
    /// no-ops.
    pub fn finalize(&mut self) -> Result<(), DemuxError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        match &mut self.format {
            Format::Video(w) => w.finish(),
            Format::Ac3(w) | Format::Dts(w) | Format::Button(w) => w.finish(),
            Format::Lpcm(w) => w.finish(),
            Format::Mpa(w) => {
                w.tmc.flush()?;
                w.payload.flush()
            }
            Format::Subtitle(w) => {
                w.idx.flush()?;
                w.payload.flush()
            }
        }
    }
}

/// Writer for an IFO audio format on physical stream `id`, with the demux
/// id its packets arrive on.
pub fn audio_writer(prefix: &Path, audio_format: u8, id: u8) -> Result<(u8, Writer), DemuxError> {
    match audio_format {
        0 => Ok((0x80u8.wrapping_add(id), Writer::ac3(prefix))),
        2 | 3 => Ok((0xC0u8.wrapping_add(id), Writer::mpa(prefix))),
        4 => Ok((
            0xA0u8.wrapping_add(id),
            Writer::lpcm(prefix, FmtChunk::pcm(48000, 2, 16)),
        )),
        6 => Ok((0x88u8.wrapping_add(id), Writer::dts(prefix))),
        other => Err(DemuxError::UnsupportedFormat(other)),
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::error!("Finalizing {} output: {e}", self.extension());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::m2v::tests::stream;
    use std::fs;

    fn cell(vob_id: u16, cell_id: u8, is_still: bool) -> CellListElem {
        CellListElem {
            vob_id,
            cell_id,
            start_sector: 0,
            last_sector: 0,
            nb_frames: 0,
            frame_dur: 40.0,
            is_still,
            found: true,
            start_time: 0,
            duration: 0,
        }
    }

    #[test]
    fn ac3_gaps_and_cells() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("VTS01_128_en");
        let mut writer = Writer::ac3(&prefix);
        assert!(!writer.file_exists());

        writer.set_boundary(0, 1000, &cell(1, 1, false))?;
        writer.process_stream(&[1, 2], 0, 400)?;
        writer.process_stream(&[3], 400, 800)?;
        writer.set_boundary(1000, 500, &cell(1, 2, false))?;
        assert!(writer.file_exists());
        drop(writer);

        assert_eq!(fs::read(with_suffix(&prefix, ".ac3"))?, vec![1, 2, 3]);
        assert_eq!(
            fs::read_to_string(with_suffix(&prefix, "_ac3.tmc"))?,
            "# timecode format v3\nassume 0.000000\n\
             \n# VOB 1 Cell 1\n\
             0.800000\ngap,0.200000\n\
             \n# VOB 1 Cell 2\n\
             gap,0.500000\n"
        );
        Ok(())
    }

    #[test]
    fn packet_gap_inside_a_cell() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("dts");
        let mut writer = Writer::dts(&prefix);

        writer.set_boundary(0, 1000, &cell(1, 1, false))?;
        writer.process_stream(&[0], 0, 300)?;
        writer.process_stream(&[0], 500, 1000)?;
        writer.finalize()?;

        assert_eq!(
            fs::read_to_string(with_suffix(&prefix, "_dts.tmc"))?,
            "# timecode format v3\nassume 0.000000\n\
             \n# VOB 1 Cell 1\n\
             0.300000\n0.300000\ngap,0.200000\n\
             0.500000\n"
        );
        Ok(())
    }

    #[test]
    fn cell_overrun_is_escalated_in_strict_mode() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let mut lenient = Writer::ac3(&dir.path().join("lenient"));
        lenient.set_boundary(0, 500, &cell(1, 1, false))?;
        lenient.process_stream(&[0], 0, 800)?;
        lenient.set_boundary(500, 500, &cell(1, 2, false))?;

        let mut strict = Writer::ac3(&dir.path().join("strict"));
        strict.set_fail_level(Level::Warn);
        strict.set_boundary(0, 500, &cell(1, 1, false))?;
        strict.process_stream(&[0], 0, 800)?;
        let result = strict.set_boundary(500, 500, &cell(1, 2, false));
        assert!(matches!(
            result,
            Err(DemuxError::Timeline(TimelineError::CellOverrun { kind: "AC3 audio" }))
        ));
        Ok(())
    }

    #[test]
    fn lpcm_wav_is_patched_on_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("pcm");
        let mut writer = Writer::lpcm(&prefix, FmtChunk::pcm(48_000, 2, 16));
        writer.set_boundary(0, 100, &cell(1, 1, false))?;
        writer.process_stream(&[0x00, 0x01, 0x02, 0x03], 0, 50)?;
        writer.process_stream(&[0x04, 0x05], 50, 100)?;
        drop(writer);

        let wav = fs::read(with_suffix(&prefix, ".wav"))?;
        assert_eq!(wav.len(), 50);
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into()?), 42);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into()?), 6);
        assert_eq!(&wav[44..], &[0x01, 0x00, 0x03, 0x02, 0x05, 0x04]);
        Ok(())
    }

    #[test]
    fn unsupported_lpcm_depth_writes_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("pcm24");
        let mut writer = Writer::lpcm(&prefix, FmtChunk::pcm(48_000, 2, 24));
        writer.process_stream(&[0; 12], 0, 10)?;
        assert!(!writer.file_exists());
        drop(writer);
        assert!(!with_suffix(&prefix, ".wav").exists());
        Ok(())
    }

    #[test]
    fn subtitle_index() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("VTS01_1_fr");
        let params = SubtitleParams {
            width: 720,
            height: 576,
            palette: [0x108080; 16],
            language: u16::from_be_bytes(*b"fr"),
            forced: false,
        };
        let mut writer = Writer::subtitle(&prefix, &params);

        writer.set_boundary(0, 1000, &cell(1, 1, false))?;
        writer.process_stream(&[0xAA; 2048], 1500, 2000)?;
        writer.set_boundary(0, 2000, &cell(2, 1, false))?;
        writer.process_stream(&[0xBB; 2048], 3_725_200, 3_726_000)?;
        drop(writer);

        let idx = fs::read_to_string(with_suffix(&prefix, ".idx"))?;
        assert!(idx.starts_with("# VobSub index file, v7 (do not modify this line!)\n"));
        assert!(idx.contains("size: 720x576\n"));
        assert!(idx.contains(&format!("palette: {}108080\n", "108080, ".repeat(15))));
        assert!(idx.contains("id: fr, index: 0\n"));
        assert!(idx.contains("# alt: French\n"));

        let stamps: Vec<_> = idx.lines().filter(|l| l.starts_with("timestamp")).collect();
        assert_eq!(
            stamps,
            vec![
                "timestamp: 00:00:01:500, filepos: 000000000",
                "timestamp: 01:02:06:200, filepos: 000000800",
            ]
        );
        assert_eq!(fs::metadata(with_suffix(&prefix, ".sub"))?.len(), 4096);
        Ok(())
    }

    #[test]
    fn button_header() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("VTSM01");
        let mut writer = Writer::button(&prefix, 720, 480);
        writer.process_stream(&[0x00, 0x00, 0x01, 0xBF], 0, 500)?;
        drop(writer);

        let btn = fs::read(with_suffix(&prefix, ".btn"))?;
        assert_eq!(&btn[..8], b"butonDVD");
        assert_eq!(&btn[8..12], &[0x02, 0xD0, 0x01, 0xE0]);
        assert_eq!(&btn[12..16], &[0, 0, 0, 0]);
        assert_eq!(&btn[16..], &[0x00, 0x00, 0x01, 0xBF]);
        Ok(())
    }

    #[test]
    fn video_cell_end_from_reordered_frames() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("VTS01");
        let mut writer = Writer::video(&prefix, 25.0);

        let es = stream("IPBB");

        writer.set_boundary(0, 200, &cell(1, 1, false))?;
        writer.process_stream(&es, 0, 0)?;
        drop(writer);

        assert_eq!(fs::read(with_suffix(&prefix, ".m2v"))?, es);
        assert_eq!(
            fs::read_to_string(with_suffix(&prefix, "_m2v.tmc"))?,
            "# timecode format v3\nassume 25.000000\n\
             \n# VOB 1 Cell 1\n0.160000\ngap,0.040000\n"
        );
        Ok(())
    }

    #[test]
    fn still_video_cell() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("VTSM01");
        let mut writer = Writer::video(&prefix, 25.0);

        writer.set_boundary(0, 5000, &cell(1, 1, true))?;
        writer.finalize()?;

        assert_eq!(
            fs::read_to_string(with_suffix(&prefix, "_m2v.tmc"))?,
            "# timecode format v3\nassume 25.000000\n\
             \n# VOB 1 Cell 1 (Still)\n5.000000,0.200000\n"
        );
        Ok(())
    }

    #[test]
    fn audio_formats_pick_their_stream_ids() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("VTS01");

        let expected = [
            (0, 0x81, "ac3"),
            (2, 0xC1, "mpa"),
            (3, 0xC1, "mpa"),
            (4, 0xA1, "wav"),
            (6, 0x89, "dts"),
        ];
        for (format, id, extension) in expected {
            let (slot, writer) = audio_writer(&prefix, format, 1)?;
            assert_eq!(slot, id);
            assert_eq!(writer.extension(), extension);
        }

        assert!(matches!(
            audio_writer(&prefix, 5, 0),
            Err(DemuxError::UnsupportedFormat(5))
        ));
        Ok(())
    }
}
