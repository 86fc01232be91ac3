use std::collections::VecDeque;

use crate::process::chunk::{Chunk, ChunkScanner, ChunkType};
use crate::structs::mpeg::{FRAME_PICTURE, FrameType, PictureHeader, SequenceHeader};
use crate::structs::time::FrameRate;
use crate::utils::errors::M2vError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No complete frame is buffered.
    NeedData,
    /// At least one frame can be read.
    Frame,
    /// End of stream reached and nothing is buffered.
    Eos,
    Error,
}

/// One video frame in presentation order.
#[derive(Debug)]
pub struct MpegFrame {
    /// Picture bytes, prefixed by the sequence and GOP headers that
    /// preceded it when those are kept in the bitstream.
    pub data: Vec<u8>,
    pub frame_type: FrameType,
    /// Presentation time in nanoseconds.
    pub timecode: u64,
    /// Nanoseconds.
    pub duration: u64,
    pub first_ref: Option<u64>,
    pub second_ref: Option<u64>,
    pub repeat_first_field: bool,
    pub top_field_first: bool,
    pub progressive: bool,
    pub picture_structure: u8,
    /// Detached sequence header when headers are not kept in the bitstream.
    pub seq_hdr_data: Option<Vec<u8>>,
}

impl MpegFrame {
    pub fn end(&self) -> u64 {
        self.timecode + self.duration
    }
}

/// Reorders an MPEG-1/2 video elementary stream from decode order into
/// presentation order.
///
/// Timestamps are counted in half-frame units starting at zero. A reference
/// frame (I or P) followed in decode order by a run of B frames is stamped
/// after that run and released only once the next reference frame arrives,
/// so [`read_frame`](Self::read_frame) yields frames in presentation order.
///
/// # Example
///
/// ```rust,no_run
/// use dvdvideo::process::m2v::{M2vParser, ParserState};
///
/// let mut parser = M2vParser::default();
/// let es = std::fs::read("title.m2v")?;
/// parser.write_data(&es)?;
/// parser.set_eos();
///
/// while let Some(frame) = parser.read_frame() {
///     println!("{} @ {} ns", frame.frame_type, frame.timecode);
/// }
/// assert_eq!(parser.get_state(), ParserState::Eos);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct M2vParser {
    scanner: ChunkScanner,
    chunks: VecDeque<Chunk>,
    ready: VecDeque<MpegFrame>,
    held_ref: Option<MpegFrame>,
    seq_hdr: Option<SequenceHeader>,
    seq_hdr_chunk: Option<Vec<u8>>,
    gop_chunk: Option<Vec<u8>>,
    codec_private: Option<Vec<u8>>,
    current_stamping_time: u64,
    first_ref: Option<u64>,
    second_ref: Option<u64>,
    next_skip: Option<u64>,
    next_skip_duration: u64,
    need_init: bool,
    eos: bool,
    failed: bool,
    not_reached_first_gop: bool,
    keep_seq_hdrs_in_bitstream: bool,
}

impl Default for M2vParser {
    fn default() -> Self {
        Self {
            scanner: ChunkScanner::default(),
            chunks: VecDeque::new(),
            ready: VecDeque::new(),
            held_ref: None,
            seq_hdr: None,
            seq_hdr_chunk: None,
            gop_chunk: None,
            codec_private: None,
            current_stamping_time: 0,
            first_ref: None,
            second_ref: None,
            next_skip: None,
            next_skip_duration: 0,
            need_init: true,
            eos: false,
            failed: false,
            not_reached_first_gop: true,
            keep_seq_hdrs_in_bitstream: true,
        }
    }
}

impl M2vParser {
    /// When disabled, sequence headers are detached into
    /// [`MpegFrame::seq_hdr_data`] instead of prefixed to I frames.
    pub fn set_keep_seq_hdrs_in_bitstream(&mut self, keep: bool) {
        self.keep_seq_hdrs_in_bitstream = keep;
    }

    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.seq_hdr.as_ref()
    }

    /// Raw bytes of the first sequence header, for codec identification.
    pub fn codec_private(&self) -> Option<&[u8]> {
        self.codec_private.as_deref()
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.seq_hdr
            .map(|hdr| hdr.frame_rate)
            .unwrap_or(FrameRate::R25)
    }

    /// Feeds elementary stream bytes.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), M2vError> {
        if self.eos {
            log::trace!("Ignoring {} bytes written after end of stream", data.len());
            return Ok(());
        }

        if let Err(e) = self.scanner.push_bytes(data) {
            self.failed = true;
            return Err(e);
        }
        self.drain_scanner();
        self.fill_queues();
        Ok(())
    }

    pub fn get_state(&mut self) -> ParserState {
        if self.failed {
            return ParserState::Error;
        }
        self.fill_queues();

        if !self.ready.is_empty() {
            ParserState::Frame
        } else if self.eos {
            ParserState::Eos
        } else {
            ParserState::NeedData
        }
    }

    pub fn read_frame(&mut self) -> Option<MpegFrame> {
        match self.get_state() {
            ParserState::Frame => self.ready.pop_front(),
            _ => None,
        }
    }

    /// Flushes every buffered chunk; afterwards all frames are readable.
    pub fn set_eos(&mut self) {
        if self.eos {
            return;
        }
        self.scanner.force_final();
        self.drain_scanner();
        self.fill_queues();
        self.eos = true;
        self.fill_queues();
        if let Some(frame) = self.held_ref.take() {
            self.ready.push_back(frame);
        }
    }

    fn drain_scanner(&mut self) {
        self.chunks.extend(self.scanner.by_ref());
        if self.need_init {
            self.init_parser();
        }
    }

    /// Locates the first sequence header. Chunks before it cannot be
    /// stamped and are dropped.
    fn init_parser(&mut self) {
        let Some(pos) = self
            .chunks
            .iter()
            .position(|c| c.kind() == ChunkType::SequenceHeader)
        else {
            if !self.chunks.is_empty() {
                log::debug!(
                    "Dropping {} chunks received before a sequence header",
                    self.chunks.len()
                );
                self.chunks.clear();
            }
            return;
        };

        self.chunks.drain(..pos);
        if let Some(chunk) = self.chunks.front() {
            match SequenceHeader::parse(chunk.as_ref()) {
                Ok(hdr) => {
                    log::debug!(
                        "MPEG-{} video {}x{} @ {} fps",
                        hdr.mpeg_version,
                        hdr.width,
                        hdr.height,
                        hdr.frame_rate
                    );
                    self.seq_hdr = Some(hdr);
                    self.codec_private = Some(chunk.as_ref().to_vec());
                    self.need_init = false;
                }
                Err(e) => {
                    log::warn!("{e}");
                    self.chunks.pop_front();
                }
            }
        }
    }

    /// Duration of a picture in half-frame units.
    fn frame_duration(&self, pic: &PictureHeader) -> u64 {
        let progressive_sequence = self.seq_hdr.is_none_or(|hdr| hdr.progressive_sequence);

        if progressive_sequence {
            match (pic.top_field_first, pic.repeat_first_field) {
                (false, true) => 4,
                (true, true) => 6,
                _ => 2,
            }
        } else if pic.picture_structure != FRAME_PICTURE {
            1
        } else if pic.progressive_frame && pic.repeat_first_field {
            3
        } else {
            2
        }
    }

    /// Total duration of the B frames that follow the front picture in
    /// decode order; `None` when the next reference frame is not buffered.
    fn count_b_frames(&self) -> Option<u64> {
        if self.eos || self.not_reached_first_gop {
            return Some(0);
        }

        let mut count = 0;
        for chunk in self.chunks.iter().skip(1) {
            if chunk.kind() != ChunkType::Picture {
                continue;
            }
            let Ok(pic) = PictureHeader::parse(chunk.as_ref()) else {
                continue;
            };
            if pic.frame_type == FrameType::B {
                count += self.frame_duration(&pic);
            } else {
                return Some(count);
            }
        }
        None
    }

    fn shove_ref(&mut self, time: u64) {
        if self.first_ref.is_none() {
            self.first_ref = Some(time);
        } else if self.second_ref.is_none() {
            self.second_ref = Some(time);
        } else {
            self.first_ref = self.second_ref;
            self.second_ref = Some(time);
        }
    }

    fn fill_queues(&mut self) {
        if self.need_init {
            return;
        }

        loop {
            while let Some(front) = self.chunks.front() {
                match front.kind() {
                    ChunkType::Picture => break,
                    ChunkType::GopHeader => {
                        self.gop_chunk = self.chunks.pop_front().map(Chunk::into_data);
                    }
                    ChunkType::SequenceHeader => {
                        match SequenceHeader::parse(front.as_ref()) {
                            Ok(hdr) => self.seq_hdr = Some(hdr),
                            Err(e) => log::warn!("{e}"),
                        }
                        self.seq_hdr_chunk = self.chunks.pop_front().map(Chunk::into_data);
                    }
                    _ => {
                        self.chunks.pop_front();
                    }
                }
            }

            let Some(front) = self.chunks.front() else {
                return;
            };

            let pic = match PictureHeader::parse(front.as_ref()) {
                Ok(pic) => pic,
                Err(e) => {
                    log::warn!("{e}");
                    self.chunks.pop_front();
                    continue;
                }
            };

            let mut my_time = self.current_stamping_time;
            if self.next_skip == Some(my_time) {
                my_time += self.next_skip_duration;
                self.current_stamping_time = my_time;
            }
            let duration = self.frame_duration(&pic);

            match pic.frame_type {
                FrameType::I | FrameType::P => {
                    let b_count = self.count_b_frames();
                    // P frames without a reference are dropped
                    if pic.frame_type == FrameType::I || self.first_ref.is_some() {
                        match b_count {
                            Some(count) if count > 0 => {
                                my_time += count;
                                self.next_skip = Some(my_time);
                                self.next_skip_duration = duration;
                            }
                            None if !self.eos => return,
                            _ => self.current_stamping_time += duration,
                        }
                        self.shove_ref(my_time);
                        self.queue_frame(my_time, &pic, duration);
                        self.not_reached_first_gop = false;
                    }
                }
                FrameType::B => {
                    if self.first_ref.is_some() && self.second_ref.is_some() {
                        self.queue_frame(my_time, &pic, duration);
                        self.current_stamping_time += duration;
                    }
                }
                FrameType::Other(code) => {
                    log::debug!("Skipping picture with coding type {code}");
                }
            }

            self.chunks.pop_front();
            if self.chunks.is_empty() {
                return;
            }
        }
    }

    /// Turns the front chunk into a frame stamped at `time`.
    fn queue_frame(&mut self, time: u64, pic: &PictureHeader, duration: u64) {
        let Some(chunk) = self.chunks.front() else {
            return;
        };
        let mut data = Vec::new();
        let mut seq_hdr_data = None;
        if pic.frame_type == FrameType::I {
            if self.keep_seq_hdrs_in_bitstream {
                data.extend(self.seq_hdr_chunk.take().unwrap_or_default());
            } else {
                seq_hdr_data = self.seq_hdr_chunk.take();
            }
        }
        data.extend(self.gop_chunk.take().unwrap_or_default());
        data.extend_from_slice(chunk.as_ref());

        let rate = self.frame_rate();
        let to_ns = |units: u64| rate.units_to_ns(units);

        let frame = MpegFrame {
            data,
            frame_type: pic.frame_type,
            timecode: to_ns(time),
            duration: to_ns(duration),
            first_ref: match pic.frame_type {
                FrameType::P | FrameType::B => self.first_ref.map(to_ns),
                _ => None,
            },
            second_ref: match pic.frame_type {
                FrameType::B => self.second_ref.map(to_ns),
                _ => None,
            },
            repeat_first_field: pic.repeat_first_field,
            top_field_first: pic.top_field_first,
            progressive: pic.progressive_frame,
            picture_structure: pic.picture_structure,
            seq_hdr_data,
        };

        if frame.frame_type == FrameType::B {
            self.ready.push_back(frame);
        } else if let Some(previous) = self.held_ref.replace(frame) {
            self.ready.push_back(previous);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::structs::mpeg::tests::{pal_sequence_header, picture};

    const FRAME: (bool, bool, bool) = (true, false, false);

    fn gop_header() -> Vec<u8> {
        vec![0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x00]
    }

    pub(crate) fn stream(types: &str) -> Vec<u8> {
        let mut out = pal_sequence_header();
        out.extend(gop_header());
        for t in types.chars() {
            let code = match t {
                'I' => 1,
                'P' => 2,
                _ => 3,
            };
            out.extend(picture(code, FRAME, 16));
        }
        out
    }

    fn drain(parser: &mut M2vParser) -> Vec<(FrameType, u64)> {
        std::iter::from_fn(|| parser.read_frame())
            .map(|f| (f.frame_type, f.timecode))
            .collect()
    }

    #[test]
    fn reorders_into_presentation_order() -> anyhow::Result<()> {
        let mut parser = M2vParser::default();
        parser.write_data(&stream("IPBBPBBI"))?;
        parser.set_eos();

        let frames = drain(&mut parser);
        let ms = |n: u64| n * 40_000_000;
        assert_eq!(
            frames,
            vec![
                (FrameType::I, ms(0)),
                (FrameType::B, ms(1)),
                (FrameType::B, ms(2)),
                (FrameType::P, ms(3)),
                (FrameType::B, ms(4)),
                (FrameType::B, ms(5)),
                (FrameType::P, ms(6)),
                (FrameType::I, ms(7)),
            ]
        );
        assert_eq!(parser.get_state(), ParserState::Eos);
        Ok(())
    }

    #[test]
    fn frames_wait_for_lookahead() -> anyhow::Result<()> {
        let mut parser = M2vParser::default();
        parser.write_data(&stream("IPBB"))?;

        // I is held until the next reference frame is stamped
        assert!(drain(&mut parser).is_empty());
        assert_eq!(parser.get_state(), ParserState::NeedData);

        parser.write_data(&picture(2, FRAME, 16))?;
        parser.set_eos();
        let frames: Vec<_> = drain(&mut parser).into_iter().map(|f| f.0).collect();
        assert_eq!(
            frames,
            vec![
                FrameType::I,
                FrameType::B,
                FrameType::B,
                FrameType::P,
                FrameType::P
            ]
        );
        Ok(())
    }

    #[test]
    fn first_i_frame_carries_headers() -> anyhow::Result<()> {
        let mut parser = M2vParser::default();
        parser.write_data(&stream("IP"))?;
        parser.set_eos();

        let first = parser.read_frame().ok_or(anyhow::anyhow!("no frame"))?;
        let seq = pal_sequence_header();
        assert!(first.data.starts_with(&seq));
        assert_eq!(&first.data[seq.len()..seq.len() + 4], &[0, 0, 1, 0xB8]);
        assert_eq!(parser.codec_private(), Some(&seq[..]));

        let second = parser.read_frame().ok_or(anyhow::anyhow!("no frame"))?;
        assert_eq!(&second.data[..4], &[0, 0, 1, 0x00]);
        assert_eq!(second.first_ref, Some(0));
        Ok(())
    }

    #[test]
    fn detached_sequence_headers() -> anyhow::Result<()> {
        let mut parser = M2vParser::default();
        parser.set_keep_seq_hdrs_in_bitstream(false);
        parser.write_data(&stream("I"))?;
        parser.set_eos();

        let frame = parser.read_frame().ok_or(anyhow::anyhow!("no frame"))?;
        // GOP header still prefixes the picture
        assert_eq!(&frame.data[..4], &[0, 0, 1, 0xB8]);
        assert_eq!(frame.seq_hdr_data, Some(pal_sequence_header()));
        Ok(())
    }

    #[test]
    fn orphan_p_frames_are_dropped() -> anyhow::Result<()> {
        let mut parser = M2vParser::default();
        let mut data = pal_sequence_header();
        data.extend(picture(2, FRAME, 8));
        data.extend(picture(1, FRAME, 8));
        parser.write_data(&data)?;
        parser.set_eos();

        let frames = drain(&mut parser);
        assert_eq!(frames, vec![(FrameType::I, 0)]);
        Ok(())
    }

    #[test]
    fn repeat_first_field_extends_duration() -> anyhow::Result<()> {
        let mut parser = M2vParser::default();
        let mut data = pal_sequence_header();
        // progressive frame with repeat_first_field in an interlaced sequence
        data.extend(picture(1, (true, true, true), 8));
        data.extend(picture(2, FRAME, 8));
        parser.write_data(&data)?;
        parser.set_eos();

        let first = parser.read_frame().ok_or(anyhow::anyhow!("no frame"))?;
        assert_eq!(first.duration, 60_000_000);
        let second = parser.read_frame().ok_or(anyhow::anyhow!("no frame"))?;
        assert_eq!(second.timecode, 60_000_000);
        assert_eq!(FrameRate::R25.ns_to_units(first.duration), 3);
        Ok(())
    }

    #[test]
    fn needs_a_sequence_header() -> anyhow::Result<()> {
        let mut parser = M2vParser::default();
        parser.write_data(&picture(1, FRAME, 8))?;
        parser.write_data(&picture(2, FRAME, 8))?;
        assert_eq!(parser.get_state(), ParserState::NeedData);
        assert!(parser.sequence_header().is_none());

        parser.write_data(&stream("I"))?;
        parser.set_eos();
        assert!(parser.sequence_header().is_some());
        assert_eq!(drain(&mut parser).len(), 1);
        Ok(())
    }
}
