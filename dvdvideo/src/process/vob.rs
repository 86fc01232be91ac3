use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::disc::blocks::BlockSource;
use crate::process::demux::DemuxSink;
use crate::structs::cell::CellList;
use crate::structs::nav::{DSI_SUBSTREAM, Dsi, PCI_SUBSTREAM, Pci};
use crate::structs::pes::{
    AUDIO_STREAM, PRIVATE_STREAM_1, PRIVATE_STREAM_2, PackHeader, PesHeader, SYSTEM_HEADER,
    VIDEO_STREAM, is_pack_start, is_start_code,
};
use crate::utils::errors::DemuxError;
use crate::utils::sector::{BinaryCursor, DVD_VIDEO_LB_LEN};

/// Sectors between two progress callbacks in [`VobParser::run`].
pub const PROGRESS_INTERVAL: u32 = 256;

/// Timing of the last parsed sector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketInfo {
    pub scr: u64,
    pub scr_ext: u16,
    pub program_mux_rate: u32,
    /// PTS relative to the current zero point, 90 kHz.
    pub pts: u64,
    /// DTS relative to the current zero point, 90 kHz. Falls back to the
    /// PTS when the packet carries none.
    pub dts: u64,
}

/// How a [`VobParser::run`] pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEnd {
    /// Every block was parsed.
    Completed,
    /// A packet ran past its sector at this byte offset; parsing stopped
    /// there as at the end of the stream.
    Truncated(u64),
    /// The abort flag was raised.
    Aborted,
}

#[derive(Debug, Default)]
struct NavState {
    info: PacketInfo,
    pci: Pci,
    dsi: Dsi,
    pci_range: Range<usize>,
    raw_pts: u64,
    raw_dts: u64,
    start_pts: u64,
    start_dts: u64,
    first_packet: bool,
    previous_cell: Option<(u16, u8)>,
    /// Milliseconds subtracted from VOBU presentation times.
    vob_timecode_offset: u32,
}

/// Sector-by-sector program stream demultiplexer.
///
/// Each call to [`parse_next_packet`](Self::parse_next_packet) reads one
/// 2048-byte block, decodes its pack header and the first packet behind
/// it, and routes the payload to a [`DemuxSink`]. Navigation packs update
/// the PCI/DSI snapshot; a change of VOB or cell id marks the cell as found
/// in the supplied [`CellList`] and signals a boundary to the sink.
///
/// Payload timestamps are relative to the first timestamped packet of the
/// current cell, so every cell starts at zero.
#[derive(Debug)]
pub struct VobParser<B: BlockSource> {
    source: B,
    buffer: Vec<u8>,
    packet_index: u32,
    packet_count: u32,
    state: NavState,
    abort: Arc<AtomicBool>,
}

impl<B: BlockSource> VobParser<B> {
    pub fn new(source: B) -> Self {
        let packet_count = source.block_count();
        Self {
            source,
            buffer: vec![0; DVD_VIDEO_LB_LEN],
            packet_index: 0,
            packet_count,
            state: NavState {
                first_packet: true,
                ..Default::default()
            },
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an externally owned abort flag.
    pub fn with_abort_handle(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Flag checked once per sector by [`run`](Self::run).
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn packet_index(&self) -> u32 {
        self.packet_index
    }

    pub fn packet_info(&self) -> &PacketInfo {
        &self.state.info
    }

    pub fn pci(&self) -> &Pci {
        &self.state.pci
    }

    pub fn dsi(&self) -> &Dsi {
        &self.state.dsi
    }

    /// VOB and cell id of the last navigation pack.
    pub fn current_cell(&self) -> (u16, u8) {
        (self.state.dsi.vobu_vob_idn, self.state.dsi.vobu_c_idn)
    }

    /// Rewinds to the first block and forgets all navigation state.
    pub fn reset(&mut self) {
        self.packet_index = 0;
        self.state = NavState {
            first_packet: true,
            ..Default::default()
        };
    }

    /// Parses the next block. Returns `Ok(false)` once no complete block is
    /// left.
    pub fn parse_next_packet<S: DemuxSink>(
        &mut self,
        cells: &mut CellList,
        sink: &mut S,
    ) -> Result<bool, DemuxError> {
        if self.packet_index >= self.packet_count
            || self
                .source
                .read_blocks(self.packet_index, 1, &mut self.buffer)?
                != 1
        {
            return Ok(false);
        }

        let base = self.packet_index as u64 * DVD_VIDEO_LB_LEN as u64;
        self.state.parse_sector(&self.buffer, base, cells, sink)?;
        self.packet_index += 1;
        Ok(true)
    }

    /// Parses blocks until the source ends or the abort flag is raised.
    ///
    /// `on_progress` receives the current block index every
    /// [`PROGRESS_INTERVAL`] blocks and once at the end.
    pub fn run<S: DemuxSink>(
        &mut self,
        cells: &mut CellList,
        sink: &mut S,
        mut on_progress: impl FnMut(u32),
    ) -> Result<PassEnd, DemuxError> {
        let end = loop {
            if self.abort.load(Ordering::Relaxed) {
                log::info!("Aborted at block {}", self.packet_index);
                break PassEnd::Aborted;
            }

            match self.parse_next_packet(cells, sink) {
                Ok(true) => {}
                Ok(false) => break PassEnd::Completed,
                Err(DemuxError::TruncatedPacket { offset }) => {
                    log::warn!("Packet truncated at byte offset {offset:#x}, ending the pass");
                    break PassEnd::Truncated(offset);
                }
                Err(e) => return Err(e),
            }

            if self.packet_index % PROGRESS_INTERVAL == 0 {
                on_progress(self.packet_index);
            }
        };

        on_progress(self.packet_index);
        Ok(end)
    }
}

impl NavState {
    fn parse_sector<S: DemuxSink>(
        &mut self,
        sector: &[u8],
        base: u64,
        cells: &mut CellList,
        sink: &mut S,
    ) -> Result<(), DemuxError> {
        let mut cursor = BinaryCursor::with_base(sector, base);

        let identifier = cursor.read_u32()?;
        if !is_pack_start(identifier) {
            return Err(DemuxError::InvalidPacket { offset: base });
        }

        let pack = PackHeader::parse(&mut cursor)?;
        self.info.scr = pack.scr;
        self.info.scr_ext = pack.scr_ext;
        self.info.program_mux_rate = pack.program_mux_rate;

        let header = cursor.read_u32()?;
        if !is_start_code(header) {
            log::trace!("Unknown start code {header:#010x} at {:#x}", cursor.offset() - 4);
            return Ok(());
        }

        let stream_id = header as u8;
        match stream_id {
            SYSTEM_HEADER => self.parse_nav_pack(&mut cursor, cells, sink)?,
            id if id & VIDEO_STREAM == VIDEO_STREAM => self.parse_video(&mut cursor, sink)?,
            id if id & AUDIO_STREAM == AUDIO_STREAM => self.parse_audio(id, &mut cursor, sink)?,
            PRIVATE_STREAM_1 => self.parse_private_stream_1(&mut cursor, sink)?,
            id => {
                let size = cursor.read_u16()?;
                cursor.skip(size as usize)?;
                log::trace!("Skipped stream {id:#04x} of {size} bytes");
            }
        }

        if self.first_packet && stream_id != SYSTEM_HEADER {
            self.first_packet = false;
            self.start_pts = self.raw_pts;
            self.start_dts = self.raw_dts;
        }
        Ok(())
    }

    fn parse_nav_pack<S: DemuxSink>(
        &mut self,
        cursor: &mut BinaryCursor,
        cells: &mut CellList,
        sink: &mut S,
    ) -> Result<(), DemuxError> {
        let size = cursor.read_u16()?;
        cursor.skip(size as usize)?;

        while cursor.remaining() >= 6 {
            let header = cursor.read_u32()?;
            if !is_start_code(header) {
                break;
            }
            if header as u8 == PRIVATE_STREAM_2 {
                self.parse_nav_packet(cursor)?;
            } else {
                let size = cursor.read_u16()?;
                cursor.skip(size as usize)?;
            }
        }

        if self.is_new_cell() {
            let (vob_id, cell_id) = (self.dsi.vobu_vob_idn, self.dsi.vobu_c_idn);
            match cells.mark_found(vob_id, cell_id) {
                Some(cell) => {
                    if self.dsi.nv_pck_scr == 0 {
                        self.vob_timecode_offset = self.pci.vobu_s_ptm / 90;
                    }
                    let start = (self.pci.vobu_s_ptm / 90).saturating_sub(self.vob_timecode_offset);
                    log::debug!("VOB {vob_id} / Cell {cell_id} starts at {start} ms");
                    sink.set_boundary(start, cell.duration_ms(), cell)?;
                }
                None => log::debug!("VOB {vob_id} / Cell {cell_id} is not in the cell list"),
            }
        }

        if self.pci.hli.btn_ns != 0 {
            let (start, end) = self.vobu_times();
            if let Some(packet) = cursor.buffer().get(self.pci_range.clone()) {
                sink.process_stream(PCI_SUBSTREAM, packet, start, end)?;
            }
        }
        Ok(())
    }

    fn parse_nav_packet(&mut self, cursor: &mut BinaryCursor) -> Result<(), DemuxError> {
        let position = cursor.position();
        let length = cursor.read_u16()? as usize;
        let end = position + 2 + length;

        match cursor.read_u8()? {
            PCI_SUBSTREAM => {
                self.pci = Pci::parse(cursor)?;
                // keep the private stream 2 start code
                self.pci_range = position - 4..end;
            }
            DSI_SUBSTREAM => self.dsi = Dsi::parse(cursor)?,
            other => log::debug!(
                "Unknown navigation substream {other:#04x} at {:#x}",
                cursor.offset() - 1
            ),
        }

        cursor.seek_to(end)
    }

    /// True when the VOB or cell id differs from the previous navigation
    /// pack. Resets the timestamp zero point.
    fn is_new_cell(&mut self) -> bool {
        let current = (self.dsi.vobu_vob_idn, self.dsi.vobu_c_idn);
        let changed = self.previous_cell != Some(current);
        self.previous_cell = Some(current);
        if changed {
            self.first_packet = true;
        }
        changed
    }

    /// VOBU start and end in milliseconds relative to the captured offset.
    fn vobu_times(&self) -> (u32, u32) {
        (
            (self.pci.vobu_s_ptm / 90).saturating_sub(self.vob_timecode_offset),
            (self.pci.vobu_e_ptm / 90).saturating_sub(self.vob_timecode_offset),
        )
    }

    fn parse_pes_header(&mut self, cursor: &mut BinaryCursor) -> Result<PesHeader, DemuxError> {
        let header = PesHeader::parse(cursor)?;

        if let Some(pts) = header.pts {
            self.raw_pts = pts;
            if self.first_packet {
                self.start_pts = pts;
            }
            self.info.pts = pts.saturating_sub(self.start_pts);
        }
        if let Some(dts) = header.dts.or(header.pts) {
            self.raw_dts = dts;
            if self.first_packet {
                self.start_dts = dts;
            }
            self.info.dts = dts.saturating_sub(self.start_dts);
        }
        self.first_packet = false;

        Ok(header)
    }

    fn parse_video<S: DemuxSink>(
        &mut self,
        cursor: &mut BinaryCursor,
        sink: &mut S,
    ) -> Result<(), DemuxError> {
        let length = cursor.read_u16()? as usize;
        let header = self.parse_pes_header(cursor)?;
        let payload = cursor.take(length.saturating_sub(3 + header.header_len as usize))?;

        sink.process_stream(
            VIDEO_STREAM,
            payload,
            (self.info.dts / 90) as u32,
            (self.info.pts / 90) as u32,
        )?;
        Ok(())
    }

    fn parse_audio<S: DemuxSink>(
        &mut self,
        stream_id: u8,
        cursor: &mut BinaryCursor,
        sink: &mut S,
    ) -> Result<(), DemuxError> {
        let length = cursor.read_u16()? as usize;
        let header = self.parse_pes_header(cursor)?;
        let payload = cursor.take(length.saturating_sub(3 + header.header_len as usize))?;

        sink.process_stream(
            stream_id,
            payload,
            (self.info.pts / 90) as u32,
            (self.info.dts / 90) as u32,
        )?;
        Ok(())
    }

    fn parse_private_stream_1<S: DemuxSink>(
        &mut self,
        cursor: &mut BinaryCursor,
        sink: &mut S,
    ) -> Result<(), DemuxError> {
        let length = cursor.read_u16()? as usize;
        let data_start = cursor.position();
        self.parse_pes_header(cursor)?;
        let substream = cursor.read_u8()?;
        let (start, end) = self.vobu_times();

        let header_skip = match substream {
            // VobSub keeps whole sectors
            0x20..=0x3F => {
                sink.process_stream(substream, cursor.buffer(), start, end)?;
                return Ok(());
            }
            // frame count and first access unit pointer
            0x80..=0x8F => 3,
            0xA0..=0xA7 => 6,
            other => {
                log::trace!("Unknown private stream 1 substream {other:#04x}");
                return Ok(());
            }
        };

        cursor.skip(header_skip)?;
        let consumed = cursor.position() - data_start;
        let payload = cursor.take(length.saturating_sub(consumed))?;
        sink.process_stream(substream, payload, start, end)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::blocks::VobSet;
    use crate::structs::cell::{CellList, CellListElem};
    use crate::structs::pes::{PADDING_STREAM, encode_timestamp};
    use std::io::Cursor;

    #[derive(Debug, Default)]
    struct Recorder {
        streams: Vec<(u8, Vec<u8>, u32, u32)>,
        boundaries: Vec<(u32, u32, u16, u8)>,
    }

    impl DemuxSink for Recorder {
        fn process_stream(
            &mut self,
            id: u8,
            data: &[u8],
            start: u32,
            end: u32,
        ) -> Result<(), DemuxError> {
            self.streams.push((id, data.to_vec(), start, end));
            Ok(())
        }

        fn set_boundary(
            &mut self,
            start: u32,
            duration: u32,
            cell: &CellListElem,
        ) -> Result<(), DemuxError> {
            self.boundaries
                .push((start, duration, cell.vob_id, cell.cell_id));
            Ok(())
        }
    }

    fn pack_header() -> Vec<u8> {
        vec![
            0x00, 0x00, 0x01, 0xBA, 0x44, 0x00, 0x04, 0x00, 0x04, 0x01, 0x01, 0x89, 0xC3, 0xF8,
        ]
    }

    fn into_sector(mut data: Vec<u8>) -> Vec<u8> {
        data.resize(DVD_VIDEO_LB_LEN, 0);
        data
    }

    struct Nav {
        vob: u16,
        cell: u8,
        scr: u32,
        s_ptm: u32,
        e_ptm: u32,
        buttons: u8,
    }

    fn nav_sector(nav: Nav) -> Vec<u8> {
        let mut out = pack_header();
        out.extend_from_slice(&[0x00, 0x00, 0x01, SYSTEM_HEADER, 0x00, 0x12]);
        out.extend_from_slice(&[0u8; 0x12]);

        let mut pci = vec![0u8; 979];
        pci[12..16].copy_from_slice(&nav.s_ptm.to_be_bytes());
        pci[16..20].copy_from_slice(&nav.e_ptm.to_be_bytes());
        pci[113] = nav.buttons;
        out.extend_from_slice(&[0x00, 0x00, 0x01, PRIVATE_STREAM_2, 0x03, 0xD4, PCI_SUBSTREAM]);
        out.extend(pci);

        let mut dsi = vec![0u8; 1017];
        dsi[0..4].copy_from_slice(&nav.scr.to_be_bytes());
        dsi[24..26].copy_from_slice(&nav.vob.to_be_bytes());
        dsi[27] = nav.cell;
        out.extend_from_slice(&[0x00, 0x00, 0x01, PRIVATE_STREAM_2, 0x03, 0xFA, DSI_SUBSTREAM]);
        out.extend(dsi);

        assert_eq!(out.len(), DVD_VIDEO_LB_LEN);
        out
    }

    fn pes_sector(stream_id: u8, pts: u64, prefix: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = pack_header();
        let length = 3 + 5 + prefix.len() + payload.len();
        out.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);
        out.extend_from_slice(&(length as u16).to_be_bytes());
        out.extend_from_slice(&[0x81, 0x80, 5]);
        out.extend_from_slice(&encode_timestamp(2, pts));
        out.extend_from_slice(prefix);
        out.extend_from_slice(payload);

        let used = out.len() + 6;
        out.extend_from_slice(&[0x00, 0x00, 0x01, PADDING_STREAM]);
        out.extend_from_slice(&((DVD_VIDEO_LB_LEN - used) as u16).to_be_bytes());
        into_sector(out)
    }

    fn cells(entries: &[(u16, u8, u32)]) -> CellList {
        let mut list = CellList::default();
        for &(vob_id, cell_id, nb_frames) in entries {
            list.insert(CellListElem {
                vob_id,
                cell_id,
                start_sector: 0,
                last_sector: 0,
                nb_frames,
                frame_dur: 40.0,
                is_still: false,
                found: false,
                start_time: 0,
                duration: 0,
            });
        }
        list
    }

    fn parser(sectors: Vec<Vec<u8>>) -> anyhow::Result<VobParser<VobSet>> {
        let data: Vec<u8> = sectors.into_iter().flatten().collect();
        Ok(VobParser::new(VobSet::from_reader(Cursor::new(data))?))
    }

    #[test]
    fn demuxes_a_cell() -> anyhow::Result<()> {
        let mut parser = parser(vec![
            nav_sector(Nav {
                vob: 1,
                cell: 1,
                scr: 0,
                s_ptm: 90_000,
                e_ptm: 126_000,
                buttons: 0,
            }),
            pes_sector(VIDEO_STREAM, 100_000, &[], &[0x11; 100]),
            pes_sector(VIDEO_STREAM, 103_600, &[], &[0x22; 100]),
        ])?;
        let mut cells = cells(&[(1, 1, 2)]);
        let mut sink = Recorder::default();

        assert!(parser.parse_next_packet(&mut cells, &mut sink)?);
        assert_eq!(parser.current_cell(), (1, 1));
        assert_eq!(sink.boundaries, vec![(0, 80, 1, 1)]);
        assert!(cells.at(1, 1u8).is_some_and(|c| c.found));

        assert!(parser.parse_next_packet(&mut cells, &mut sink)?);
        assert!(parser.parse_next_packet(&mut cells, &mut sink)?);
        assert!(!parser.parse_next_packet(&mut cells, &mut sink)?);

        let video: Vec<_> = sink
            .streams
            .iter()
            .map(|(id, data, start, end)| (*id, data.len(), *start, *end))
            .collect();
        assert_eq!(video, vec![(VIDEO_STREAM, 100, 0, 0), (VIDEO_STREAM, 100, 40, 40)]);
        assert_eq!(sink.boundaries.len(), 1);
        Ok(())
    }

    #[test]
    fn malformed_first_sector() -> anyhow::Result<()> {
        let mut parser = parser(vec![vec![0u8; DVD_VIDEO_LB_LEN]])?;
        let mut cells = cells(&[(1, 1, 2)]);
        let mut sink = Recorder::default();

        match parser.parse_next_packet(&mut cells, &mut sink) {
            Err(DemuxError::InvalidPacket { offset }) => assert_eq!(offset, 0),
            other => panic!("expected an invalid packet, got {other:?}"),
        }
        assert!(sink.streams.is_empty());
        assert!(sink.boundaries.is_empty());
        assert!(!cells.at(1, 1u8).is_some_and(|c| c.found));
        Ok(())
    }

    #[test]
    fn invalid_packet_reports_sector_offset() -> anyhow::Result<()> {
        let mut bad = pes_sector(VIDEO_STREAM, 0, &[], &[0; 10]);
        bad[3] = 0x00;
        let mut parser = parser(vec![pes_sector(VIDEO_STREAM, 0, &[], &[0; 10]), bad])?;
        let mut sink = Recorder::default();

        let result = parser.run(&mut CellList::default(), &mut sink, |_| {});
        assert!(matches!(
            result,
            Err(DemuxError::InvalidPacket { offset }) if offset == DVD_VIDEO_LB_LEN as u64
        ));
        assert_eq!(sink.streams.len(), 1);
        Ok(())
    }

    #[test]
    fn routes_private_stream_1() -> anyhow::Result<()> {
        let mut parser = parser(vec![
            pes_sector(PRIVATE_STREAM_1, 0, &[0x81, 0x02, 0x00, 0x01], &[0xAC; 50]),
            pes_sector(PRIVATE_STREAM_1, 0, &[0x89, 0x01, 0x00, 0x01], &[0xD7; 40]),
            pes_sector(
                PRIVATE_STREAM_1,
                0,
                &[0xA0, 0x05, 0x00, 0x04, 0x01, 0x81, 0x80],
                &[0x12; 32],
            ),
            pes_sector(PRIVATE_STREAM_1, 0, &[0x21], &[0x5B; 20]),
            pes_sector(PRIVATE_STREAM_1, 0, &[0x70], &[0; 20]),
        ])?;
        let mut sink = Recorder::default();
        let end = parser.run(&mut CellList::default(), &mut sink, |_| {})?;
        assert_eq!(end, PassEnd::Completed);

        let routed: Vec<_> = sink
            .streams
            .iter()
            .map(|(id, data, _, _)| (*id, data.len(), data[data.len() - 1]))
            .collect();
        assert_eq!(
            routed,
            vec![
                (0x81, 50, 0xAC),
                (0x89, 40, 0xD7),
                (0xA0, 32, 0x12),
                (0x21, DVD_VIDEO_LB_LEN, 0),
            ]
        );
        Ok(())
    }

    #[test]
    fn forwards_button_packets() -> anyhow::Result<()> {
        let mut parser = parser(vec![
            nav_sector(Nav {
                vob: 1,
                cell: 1,
                scr: 0,
                s_ptm: 9_000,
                e_ptm: 54_000,
                buttons: 2,
            }),
            nav_sector(Nav {
                vob: 1,
                cell: 1,
                scr: 1000,
                s_ptm: 54_000,
                e_ptm: 99_000,
                buttons: 2,
            }),
        ])?;
        let mut cells = cells(&[(1, 1, 25)]);
        let mut sink = Recorder::default();
        parser.run(&mut cells, &mut sink, |_| {})?;

        assert_eq!(sink.boundaries, vec![(0, 1000, 1, 1)]);
        let buttons: Vec<_> = sink
            .streams
            .iter()
            .map(|(id, data, start, end)| (*id, data.len(), *start, *end))
            .collect();
        assert_eq!(buttons, vec![(0, 986, 0, 500), (0, 986, 500, 1000)]);
        assert_eq!(&sink.streams[0].1[..4], &[0x00, 0x00, 0x01, PRIVATE_STREAM_2]);
        Ok(())
    }

    #[test]
    fn new_cell_resets_zero_point() -> anyhow::Result<()> {
        let nav = |cell, scr| {
            nav_sector(Nav {
                vob: 1,
                cell,
                scr,
                s_ptm: 0,
                e_ptm: 0,
                buttons: 0,
            })
        };
        let mut parser = parser(vec![
            nav(1, 0),
            pes_sector(0xC0, 9_000, &[], &[0; 16]),
            pes_sector(0xC0, 18_000, &[], &[0; 16]),
            nav(2, 500),
            pes_sector(0xC0, 45_000, &[], &[0; 16]),
        ])?;
        let mut cells = cells(&[(1, 1, 10), (1, 2, 10)]);
        let mut sink = Recorder::default();
        parser.run(&mut cells, &mut sink, |_| {})?;

        let starts: Vec<_> = sink.streams.iter().map(|s| s.2).collect();
        assert_eq!(starts, vec![0, 100, 0]);
        assert_eq!(sink.boundaries.len(), 2);
        Ok(())
    }

    #[test]
    fn abort_flag_stops_the_pass() -> anyhow::Result<()> {
        let sectors = (0..4)
            .map(|i| pes_sector(VIDEO_STREAM, i * 3_600, &[], &[0; 8]))
            .collect();
        let mut parser = parser(sectors)?;
        let abort = parser.abort_handle();
        let mut sink = Recorder::default();

        let mut cells = CellList::default();
        parser.parse_next_packet(&mut cells, &mut sink)?;
        abort.store(true, Ordering::Relaxed);
        let end = parser.run(&mut cells, &mut sink, |_| {})?;

        assert_eq!(end, PassEnd::Aborted);
        assert_eq!(parser.packet_index(), 1);
        assert_eq!(sink.streams.len(), 1);
        Ok(())
    }

    #[test]
    fn overlong_packet_ends_the_pass() -> anyhow::Result<()> {
        let mut sector = pes_sector(VIDEO_STREAM, 0, &[], &[0; 8]);
        // declared length runs past the sector
        sector[18..20].copy_from_slice(&0x0900u16.to_be_bytes());
        let mut parser = parser(vec![sector])?;

        let end = parser.run(&mut CellList::default(), &mut Recorder::default(), |_| {})?;
        assert!(matches!(end, PassEnd::Truncated(_)));
        Ok(())
    }
}
