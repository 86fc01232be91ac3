//! IFO navigation tables.
//!
//! Layouts follow the DVD-Video information files: a management table
//! (VMGI_MAT or VTSI_MAT) whose sector pointers locate the title search
//! pointers, part-of-title table, program chain tables, menu language units
//! and cell address tables. All fields are big-endian.

use crate::structs::time::DvdTime;
use crate::utils::errors::IfoError;
use crate::utils::sector::DVD_VIDEO_LB_LEN;

const VMG_IDENTIFIER: &str = "DVDVIDEO-VMG";
const VTS_IDENTIFIER: &str = "DVDVIDEO-VTS";

/// Bounds-checked random access into one IFO table.
#[derive(Clone, Copy)]
struct Table<'a> {
    name: &'static str,
    data: &'a [u8],
    base: usize,
}

impl<'a> Table<'a> {
    fn new(name: &'static str, data: &'a [u8], base: usize) -> Self {
        Self { name, data, base }
    }

    fn at(&self, name: &'static str, offset: usize) -> Self {
        Self::new(name, self.data, self.base + offset)
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], IfoError> {
        let start = self.base + offset;
        self.data
            .get(start..start + len)
            .ok_or(IfoError::Truncated {
                table: self.name,
                offset: start,
            })
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], IfoError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(offset, N)?);
        Ok(out)
    }

    fn u8(&self, offset: usize) -> Result<u8, IfoError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    fn u16(&self, offset: usize) -> Result<u16, IfoError> {
        Ok(u16::from_be_bytes(self.array(offset)?))
    }

    fn u32(&self, offset: usize) -> Result<u32, IfoError> {
        Ok(u32::from_be_bytes(self.array(offset)?))
    }
}

/// Video attributes of one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoAttr {
    pub mpeg_version: u8,
    /// 0 = NTSC, 1 = PAL
    pub video_format: u8,
    pub display_aspect_ratio: u8,
    /// 0 = 720, 1 = 704, 2 = 352, 3 = 352 half height
    pub picture_size: u8,
}

impl VideoAttr {
    fn parse(t: &Table, offset: usize) -> Result<Self, IfoError> {
        let b: [u8; 2] = t.array(offset)?;
        Ok(Self {
            mpeg_version: b[0] >> 6,
            video_format: (b[0] >> 4) & 0x03,
            display_aspect_ratio: (b[0] >> 2) & 0x03,
            picture_size: (b[1] >> 2) & 0x03,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioAttr {
    /// 0 = AC3, 2/3 = MPEG-1/2, 4 = LPCM, 6 = DTS
    pub audio_format: u8,
    pub lang_type: u8,
    pub quantization: u8,
    pub channels: u8,
    pub lang_code: u16,
    pub code_extension: u8,
}

impl AudioAttr {
    fn parse(t: &Table, offset: usize) -> Result<Self, IfoError> {
        let b: [u8; 8] = t.array(offset)?;
        Ok(Self {
            audio_format: b[0] >> 5,
            lang_type: (b[0] >> 2) & 0x03,
            quantization: b[1] >> 6,
            channels: (b[1] & 0x07) + 1,
            lang_code: u16::from_be_bytes([b[2], b[3]]),
            code_extension: b[5],
        })
    }

    pub fn format_name(&self) -> &'static str {
        match self.audio_format {
            0 => "AC3",
            2 | 3 => "MPEG",
            4 => "LPCM",
            6 => "DTS",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubpAttr {
    pub code_mode: u8,
    pub lang_code: u16,
    /// 9 marks forced subtitles
    pub lang_extension: u8,
    pub code_extension: u8,
}

impl SubpAttr {
    fn parse(t: &Table, offset: usize) -> Result<Self, IfoError> {
        let b: [u8; 6] = t.array(offset)?;
        Ok(Self {
            code_mode: b[0] >> 5,
            lang_code: u16::from_be_bytes([b[2], b[3]]),
            lang_extension: b[4],
            code_extension: b[5],
        })
    }
}

/// Two-letter ISO 639 code stored as a big-endian u16.
pub fn lang_code_str(code: u16) -> Option<String> {
    if code == 0 {
        return None;
    }
    let [hi, lo] = code.to_be_bytes();
    Some(format!("{}{}", hi as char, lo as char))
}

/// Attributes of one domain (menu or title).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAttributes {
    pub video: VideoAttr,
    pub audio: Vec<AudioAttr>,
    pub subp: Vec<SubpAttr>,
}

impl DomainAttributes {
    fn parse(
        t: &Table,
        video_at: usize,
        audio_count_at: usize,
        max_audio: usize,
        subp_count_at: usize,
        max_subp: usize,
    ) -> Result<Self, IfoError> {
        let video = VideoAttr::parse(t, video_at)?;
        let nr_audio = (t.u8(audio_count_at)? as usize).min(max_audio);
        let audio = (0..nr_audio)
            .map(|i| AudioAttr::parse(t, audio_count_at + 1 + i * 8))
            .collect::<Result<_, _>>()?;
        let nr_subp = (t.u8(subp_count_at)? as usize).min(max_subp);
        let subp = (0..nr_subp)
            .map(|i| SubpAttr::parse(t, subp_count_at + 1 + i * 6))
            .collect::<Result<_, _>>()?;
        Ok(Self { video, audio, subp })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable {
    pub pre: Vec<[u8; 8]>,
    pub post: Vec<[u8; 8]>,
    pub cell: Vec<[u8; 8]>,
}

impl CommandTable {
    fn parse(t: &Table) -> Result<Self, IfoError> {
        let nr_pre = t.u16(0)? as usize;
        let nr_post = t.u16(2)? as usize;
        let nr_cell = t.u16(4)? as usize;

        let read = |first: usize, count: usize| -> Result<Vec<[u8; 8]>, IfoError> {
            (0..count).map(|i| t.array(8 + (first + i) * 8)).collect()
        };

        Ok(Self {
            pre: read(0, nr_pre)?,
            post: read(nr_pre, nr_post)?,
            cell: read(nr_pre + nr_post, nr_cell)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellPlayback {
    /// 0 = not in block, 1 = first, 2 = in block, 3 = last
    pub block_mode: u8,
    /// 1 = angle block
    pub block_type: u8,
    pub seamless_play: bool,
    pub interleaved: bool,
    pub stc_discontinuity: bool,
    pub seamless_angle: bool,
    pub still_time: u8,
    pub cell_cmd_nr: u8,
    pub playback_time: DvdTime,
    pub first_sector: u32,
    pub first_ilvu_end_sector: u32,
    pub last_vobu_start_sector: u32,
    pub last_sector: u32,
}

impl CellPlayback {
    const SIZE: usize = 24;

    fn parse(t: &Table, offset: usize) -> Result<Self, IfoError> {
        let b0 = t.u8(offset)?;
        Ok(Self {
            block_mode: b0 >> 6,
            block_type: (b0 >> 4) & 0x03,
            seamless_play: b0 & 0x08 != 0,
            interleaved: b0 & 0x04 != 0,
            stc_discontinuity: b0 & 0x02 != 0,
            seamless_angle: b0 & 0x01 != 0,
            still_time: t.u8(offset + 2)?,
            cell_cmd_nr: t.u8(offset + 3)?,
            playback_time: DvdTime::from_bytes(t.array(offset + 4)?),
            first_sector: t.u32(offset + 8)?,
            first_ilvu_end_sector: t.u32(offset + 12)?,
            last_vobu_start_sector: t.u32(offset + 16)?,
            last_sector: t.u32(offset + 20)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellPosition {
    pub vob_id_nr: u16,
    pub cell_nr: u8,
}

/// Program chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pgc {
    pub nr_of_programs: u8,
    pub nr_of_cells: u8,
    pub playback_time: DvdTime,
    pub prohibited_ops: u32,
    pub audio_control: [u16; 8],
    pub subp_control: [u32; 32],
    pub next_pgc_nr: u16,
    pub prev_pgc_nr: u16,
    pub goup_pgc_nr: u16,
    pub pg_playback_mode: u8,
    pub still_time: u8,
    pub palette: [u32; 16],
    pub commands: Option<CommandTable>,
    /// Entry cell number (1-based) of each program.
    pub program_map: Vec<u8>,
    pub cell_playback: Vec<CellPlayback>,
    pub cell_position: Vec<CellPosition>,
}

impl Default for Pgc {
    fn default() -> Self {
        Self {
            nr_of_programs: 0,
            nr_of_cells: 0,
            playback_time: DvdTime::default(),
            prohibited_ops: 0,
            audio_control: [0; 8],
            subp_control: [0; 32],
            next_pgc_nr: 0,
            prev_pgc_nr: 0,
            goup_pgc_nr: 0,
            pg_playback_mode: 0,
            still_time: 0,
            palette: [0; 16],
            commands: None,
            program_map: Vec::new(),
            cell_playback: Vec::new(),
            cell_position: Vec::new(),
        }
    }
}

impl Pgc {
    fn parse(t: &Table) -> Result<Self, IfoError> {
        let nr_of_programs = t.u8(0x02)?;
        let nr_of_cells = t.u8(0x03)?;

        let mut audio_control = [0u16; 8];
        for (i, ac) in audio_control.iter_mut().enumerate() {
            *ac = t.u16(0x0C + i * 2)?;
        }
        let mut subp_control = [0u32; 32];
        for (i, sc) in subp_control.iter_mut().enumerate() {
            *sc = t.u32(0x1C + i * 4)?;
        }
        let mut palette = [0u32; 16];
        for (i, entry) in palette.iter_mut().enumerate() {
            *entry = t.u32(0xA4 + i * 4)?;
        }

        let command_tbl_offset = t.u16(0xE4)? as usize;
        let program_map_offset = t.u16(0xE6)? as usize;
        let cell_playback_offset = t.u16(0xE8)? as usize;
        let cell_position_offset = t.u16(0xEA)? as usize;

        let commands = if command_tbl_offset != 0 {
            Some(CommandTable::parse(&t.at("PGC command table", command_tbl_offset))?)
        } else {
            None
        };

        let program_map = if program_map_offset != 0 && nr_of_programs != 0 {
            t.bytes(program_map_offset, nr_of_programs as usize)?
                .to_vec()
        } else {
            Vec::new()
        };

        let cell_playback = if cell_playback_offset != 0 {
            (0..nr_of_cells as usize)
                .map(|i| CellPlayback::parse(t, cell_playback_offset + i * CellPlayback::SIZE))
                .collect::<Result<_, _>>()?
        } else {
            Vec::new()
        };

        let cell_position = if cell_position_offset != 0 {
            (0..nr_of_cells as usize)
                .map(|i| {
                    let at = cell_position_offset + i * 4;
                    Ok(CellPosition {
                        vob_id_nr: t.u16(at)?,
                        cell_nr: t.u8(at + 3)?,
                    })
                })
                .collect::<Result<_, IfoError>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            nr_of_programs,
            nr_of_cells,
            playback_time: DvdTime::from_bytes(t.array(0x04)?),
            prohibited_ops: t.u32(0x08)?,
            audio_control,
            subp_control,
            next_pgc_nr: t.u16(0x9C)?,
            prev_pgc_nr: t.u16(0x9E)?,
            goup_pgc_nr: t.u16(0xA0)?,
            pg_playback_mode: t.u8(0xA2)?,
            still_time: t.u8(0xA3)?,
            palette,
            commands,
            program_map,
            cell_playback,
            cell_position,
        })
    }
}

/// PGCIT search pointer together with the chain it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgciSrp {
    /// Bit 7 marks an entry PGC; the low bits carry the title number or
    /// menu type.
    pub entry_id: u8,
    pub block_mode: u8,
    pub block_type: u8,
    pub ptl_id_mask: u16,
    pub pgc: Pgc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pgcit {
    pub srps: Vec<PgciSrp>,
}

impl Pgcit {
    fn parse(t: &Table) -> Result<Self, IfoError> {
        let nr = t.u16(0)? as usize;
        let srps = (0..nr)
            .map(|i| {
                let at = 8 + i * 8;
                let b1 = t.u8(at + 1)?;
                let start = t.u32(at + 4)? as usize;
                Ok(PgciSrp {
                    entry_id: t.u8(at)?,
                    block_mode: b1 >> 6,
                    block_type: (b1 >> 4) & 0x03,
                    ptl_id_mask: t.u16(at + 2)?,
                    pgc: Pgc::parse(&t.at("PGC", start))?,
                })
            })
            .collect::<Result<_, IfoError>>()?;
        Ok(Self { srps })
    }
}

/// Menu language unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageUnit {
    pub lang_code: u16,
    pub lang_extension: u8,
    pub exists: u8,
    pub pgcit: Pgcit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgciUt {
    pub lus: Vec<LanguageUnit>,
}

impl PgciUt {
    fn parse(t: &Table) -> Result<Self, IfoError> {
        let nr = t.u16(0)? as usize;
        let lus = (0..nr)
            .map(|i| {
                let at = 8 + i * 8;
                let start = t.u32(at + 4)? as usize;
                Ok(LanguageUnit {
                    lang_code: t.u16(at)?,
                    lang_extension: t.u8(at + 2)?,
                    exists: t.u8(at + 3)?,
                    pgcit: Pgcit::parse(&t.at("menu PGCIT", start))?,
                })
            })
            .collect::<Result<_, IfoError>>()?;
        Ok(Self { lus })
    }
}

/// Cell address table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellAddress {
    pub vob_id: u16,
    pub cell_id: u8,
    pub start_sector: u32,
    pub last_sector: u32,
}

fn parse_c_adt(t: &Table) -> Result<Vec<CellAddress>, IfoError> {
    let last_byte = t.u32(4)? as usize;
    let count = last_byte.saturating_sub(7) / 12;
    (0..count)
        .map(|i| {
            let at = 8 + i * 12;
            Ok(CellAddress {
                vob_id: t.u16(at)?,
                cell_id: t.u8(at + 2)?,
                start_sector: t.u32(at + 4)?,
                last_sector: t.u32(at + 8)?,
            })
        })
        .collect()
}

/// Title search pointer (TT_SRPT entry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TitleInfo {
    pub pb_ty: u8,
    pub nr_of_angles: u8,
    pub nr_of_ptts: u16,
    pub parental_id: u16,
    pub title_set_nr: u8,
    pub vts_ttn: u8,
    pub title_set_sector: u32,
}

fn parse_tt_srpt(t: &Table) -> Result<Vec<TitleInfo>, IfoError> {
    let nr = t.u16(0)? as usize;
    (0..nr)
        .map(|i| {
            let at = 8 + i * 12;
            Ok(TitleInfo {
                pb_ty: t.u8(at)?,
                nr_of_angles: t.u8(at + 1)?,
                nr_of_ptts: t.u16(at + 2)?,
                parental_id: t.u16(at + 4)?,
                title_set_nr: t.u8(at + 6)?,
                vts_ttn: t.u8(at + 7)?,
                title_set_sector: t.u32(at + 8)?,
            })
        })
        .collect()
}

/// Part of title: a chapter entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartOfTitle {
    pub pgcn: u16,
    pub pgn: u16,
}

/// Title unit of the VTS part-of-title table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleUnit {
    pub ptts: Vec<PartOfTitle>,
}

fn parse_ptt_srpt(t: &Table) -> Result<Vec<TitleUnit>, IfoError> {
    let nr = t.u16(0)? as usize;
    let end = t.u32(4)? as usize + 1;
    let offsets = (0..nr)
        .map(|i| t.u32(8 + i * 4).map(|o| o as usize))
        .collect::<Result<Vec<_>, _>>()?;

    offsets
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let stop = offsets.get(i + 1).copied().unwrap_or(end).max(start);
            let ptts = (0..(stop - start) / 4)
                .map(|j| {
                    let at = start + j * 4;
                    Ok(PartOfTitle {
                        pgcn: t.u16(at)?,
                        pgn: t.u16(at + 2)?,
                    })
                })
                .collect::<Result<_, IfoError>>()?;
            Ok(TitleUnit { ptts })
        })
        .collect()
}

fn check_identifier(data: &[u8], expected: &'static str, file: &str) -> Result<(), IfoError> {
    if data.get(..expected.len()) != Some(expected.as_bytes()) {
        return Err(IfoError::BadIdentifier {
            file: file.to_string(),
            expected,
        });
    }
    Ok(())
}

/// Follows a sector pointer; zero means the table is absent.
fn sector_table<'a>(
    mat: &Table<'a>,
    name: &'static str,
    at: usize,
) -> Result<Option<Table<'a>>, IfoError> {
    let sector = mat.u32(at)? as usize;
    Ok((sector != 0).then(|| Table::new(name, mat.data, sector * DVD_VIDEO_LB_LEN)))
}

/// Video Manager information (VIDEO_TS.IFO).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vmgi {
    pub nr_of_title_sets: u16,
    pub first_play_pgc: Option<Pgc>,
    pub titles: Vec<TitleInfo>,
    pub menu_attributes: DomainAttributes,
    pub menu_pgci_ut: Option<PgciUt>,
    pub menu_c_adt: Vec<CellAddress>,
}

impl Vmgi {
    pub fn parse(data: &[u8]) -> Result<Self, IfoError> {
        check_identifier(data, VMG_IDENTIFIER, "VIDEO_TS.IFO")?;
        let mat = Table::new("VMGI_MAT", data, 0);

        let first_play_at = mat.u32(0x84)? as usize;
        let first_play_pgc = if first_play_at != 0 {
            Some(Pgc::parse(&mat.at("first play PGC", first_play_at))?)
        } else {
            None
        };

        let titles = match sector_table(&mat, "TT_SRPT", 0xC4)? {
            Some(t) => parse_tt_srpt(&t)?,
            None => Vec::new(),
        };
        let menu_pgci_ut = sector_table(&mat, "VMGM_PGCI_UT", 0xC8)?
            .map(|t| PgciUt::parse(&t))
            .transpose()?;
        let menu_c_adt = match sector_table(&mat, "VMGM_C_ADT", 0xD8)? {
            Some(t) => parse_c_adt(&t)?,
            None => Vec::new(),
        };

        Ok(Self {
            nr_of_title_sets: mat.u16(0x3E)?,
            first_play_pgc,
            titles,
            menu_attributes: DomainAttributes::parse(&mat, 0x100, 0x103, 1, 0x155, 1)?,
            menu_pgci_ut,
            menu_c_adt,
        })
    }
}

/// Video Title Set information (VTS_nn_0.IFO).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vtsi {
    pub ptt_srpt: Vec<TitleUnit>,
    pub pgcit: Pgcit,
    pub menu_attributes: DomainAttributes,
    pub title_attributes: DomainAttributes,
    pub menu_pgci_ut: Option<PgciUt>,
    pub menu_c_adt: Vec<CellAddress>,
    pub title_c_adt: Vec<CellAddress>,
}

impl Vtsi {
    pub fn parse(data: &[u8], file: &str) -> Result<Self, IfoError> {
        check_identifier(data, VTS_IDENTIFIER, file)?;
        let mat = Table::new("VTSI_MAT", data, 0);

        let ptt_srpt = match sector_table(&mat, "VTS_PTT_SRPT", 0xC8)? {
            Some(t) => parse_ptt_srpt(&t)?,
            None => Vec::new(),
        };
        let pgcit = match sector_table(&mat, "VTS_PGCIT", 0xCC)? {
            Some(t) => Pgcit::parse(&t)?,
            None => Pgcit::default(),
        };
        let menu_pgci_ut = sector_table(&mat, "VTSM_PGCI_UT", 0xD0)?
            .map(|t| PgciUt::parse(&t))
            .transpose()?;
        let menu_c_adt = match sector_table(&mat, "VTSM_C_ADT", 0xD8)? {
            Some(t) => parse_c_adt(&t)?,
            None => Vec::new(),
        };
        let title_c_adt = match sector_table(&mat, "VTS_C_ADT", 0xE0)? {
            Some(t) => parse_c_adt(&t)?,
            None => Vec::new(),
        };

        Ok(Self {
            ptt_srpt,
            pgcit,
            menu_attributes: DomainAttributes::parse(&mat, 0x100, 0x103, 1, 0x155, 1)?,
            title_attributes: DomainAttributes::parse(&mat, 0x200, 0x203, 8, 0x255, 32)?,
            menu_pgci_ut,
            menu_c_adt,
            title_c_adt,
        })
    }
}
