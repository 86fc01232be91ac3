//! Chapter hierarchy of a title or menu pass.
//!
//! The tree mirrors the DVD navigation structure: title units, program
//! chains, programs, chapters and cells. Every atom carries a chapter
//! process whose private data identifies the DVD object it stands for, so
//! a player can rebuild navigation from the chapter file alone.

use crate::disc::DiscContent;
use crate::structs::cell::CellList;
use crate::structs::ifo::{LanguageUnit, Pgc, TitleUnit, lang_code_str};

/// Codec id of DVD menu chapter processes.
pub const DVD_CODEC: u8 = 1;
/// Codec id of Matroska script chapter processes.
pub const SCRIPT_CODEC: u8 = 0;

/// When a chapter process command runs: 1 before, 0 during, 2 after the
/// chapter.
pub const PRE_COMMANDS: u8 = 1;
pub const CELL_COMMANDS: u8 = 0;
pub const POST_COMMANDS: u8 = 2;

/// Source of chapter and edition UIDs.
pub trait UidSource {
    fn next_uid(&mut self) -> u64;
}

/// Sequential UIDs starting at 1.
#[derive(Debug, Clone, Default)]
pub struct CounterUids(u64);

impl UidSource for CounterUids {
    fn next_uid(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// Random non-zero UIDs from a seeded generator.
#[derive(Debug, Clone)]
pub struct SeededUids(fastrand::Rng);

impl SeededUids {
    pub fn new(seed: u64) -> Self {
        Self(fastrand::Rng::with_seed(seed))
    }

    /// Random bytes for the segment family of the info file.
    pub fn family_uid(&mut self) -> [u8; 16] {
        let mut uid = [0u8; 16];
        self.0.fill(&mut uid);
        uid
    }
}

impl UidSource for SeededUids {
    fn next_uid(&mut self) -> u64 {
        self.0.u64(1..)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandData {
    /// DVD virtual machine commands, count byte first.
    Binary(Vec<u8>),
    Script(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub time: u8,
    pub data: CommandData,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterProcess {
    pub codec_id: u8,
    pub private: Option<Vec<u8>>,
    pub commands: Vec<ProcessCommand>,
}

impl ChapterProcess {
    fn dvd(private: Vec<u8>) -> Self {
        Self {
            codec_id: DVD_CODEC,
            private: Some(private),
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterAtom {
    pub uid: u64,
    pub hidden: bool,
    pub display: Option<String>,
    /// Nanoseconds.
    pub time_start: u64,
    pub time_end: Option<u64>,
    pub processes: Vec<ChapterProcess>,
    pub children: Vec<ChapterAtom>,
    /// Written ahead of the atom.
    pub comment: Option<String>,
}

impl ChapterAtom {
    fn new(uid: u64, hidden: bool, comment: impl Into<String>) -> Self {
        Self {
            uid,
            hidden,
            display: None,
            time_start: 0,
            time_end: None,
            processes: Vec::new(),
            children: Vec::new(),
            comment: Some(comment.into()),
        }
    }

    /// Sets the start time to the earliest child start.
    fn start_at_children(mut self) -> Self {
        self.time_start = self.children.iter().map(|c| c.time_start).min().unwrap_or(0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edition {
    pub uid: u64,
    pub ordered: bool,
    pub comment: Option<String>,
    pub atoms: Vec<ChapterAtom>,
}

/// `0x82 = Entry + Title-Menu` style description of a PGC entry id.
pub fn pgc_type_name(entry_id: u8) -> String {
    let kind = match entry_id & 0x7F {
        2 => "Title-Menu",
        3 => "Root Menu",
        4 => "Subpicture Menu",
        5 => "Audio Menu",
        6 => "Angle Menu",
        7 => "Chapter Menu",
        _ => "Basic PGC",
    };
    let entry = if entry_id & 0x80 != 0 { "Entry + " } else { "" };
    format!("0x{entry_id:02x} = {entry}{kind}")
}

fn command_list(time: u8, label: &str, commands: &[[u8; 8]]) -> Option<ProcessCommand> {
    if commands.is_empty() {
        return None;
    }
    let mut data = Vec::with_capacity(1 + commands.len() * 8);
    data.push(commands.len() as u8);
    commands.iter().for_each(|c| data.extend_from_slice(c));
    Some(ProcessCommand {
        time,
        data: CommandData::Binary(data),
        comment: Some(format!("{label} commands")),
    })
}

/// Pre, cell and post command lists of `pgc`, in that order.
fn pgc_commands(pgc: &Pgc) -> Vec<ProcessCommand> {
    let Some(table) = pgc.commands.as_ref() else {
        return Vec::new();
    };
    [
        command_list(PRE_COMMANDS, "Pre", &table.pre),
        command_list(CELL_COMMANDS, "Cell", &table.cell),
        command_list(POST_COMMANDS, "Post", &table.post),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn language(code: u16) -> String {
    lang_code_str(code).unwrap_or_default()
}

struct Walker<'a, U: UidSource> {
    uids: &'a mut U,
    cells: &'a CellList,
}

impl<U: UidSource> Walker<'_, U> {
    /// `pgc_num` is zero-based; `ptts` is the title unit for title passes
    /// and `None` for menus.
    fn pgc(
        &mut self,
        pgc: &Pgc,
        pgc_num: u16,
        pgc_type: u8,
        ptts: Option<&TitleUnit>,
        title: u16,
    ) -> ChapterAtom {
        let type_name = pgc_type_name(pgc_type);
        let mut atom = ChapterAtom::new(
            self.uids.next_uid(),
            ptts.is_some(),
            format!("PGC PGC_{} type {type_name}", pgc_num + 1),
        );
        if ptts.is_none() {
            atom.display = Some(format!("PGC type {type_name}"));
        }

        let number = (pgc_num + 1).to_be_bytes();
        let mut private = vec![0x20, number[0], number[1], pgc_type];
        private.extend_from_slice(&pgc.prohibited_ops.to_be_bytes());
        let mut process = ChapterProcess::dvd(private);
        process.commands = pgc_commands(pgc);
        atom.processes.push(process);

        for program in 0..pgc.nr_of_programs as usize {
            let child = self.program(pgc, atom.uid, program, pgc_num, ptts, title);
            atom.children.push(child);
        }
        atom.start_at_children()
    }

    fn program(
        &mut self,
        pgc: &Pgc,
        pgc_uid: u64,
        program: usize,
        pgc_num: u16,
        ptts: Option<&TitleUnit>,
        title: u16,
    ) -> ChapterAtom {
        let entry_cell = pgc.program_map.get(program).copied().unwrap_or(1).max(1) as usize;
        let next_entry_cell = if program + 1 >= pgc.nr_of_programs as usize {
            pgc.nr_of_cells as usize + 1
        } else {
            pgc.program_map.get(program + 1).copied().unwrap_or(0) as usize
        };

        let pg = (program as u16 + 1).to_be_bytes();
        let mut atom = ChapterAtom::new(
            self.uids.next_uid(),
            true,
            format!("Program PGN# {} in this PGC", program + 1),
        );
        atom.processes.push(ChapterProcess::dvd(vec![0x18, pg[0], pg[1]]));

        let entry = pgc
            .cell_position
            .get(entry_cell - 1)
            .and_then(|p| self.cells.at(p.vob_id_nr, p.cell_nr))
            .filter(|c| c.found);

        if let (Some(ptts), Some(entry)) = (ptts, entry) {
            for (n, ptt) in ptts.ptts.iter().enumerate() {
                if ptt.pgcn != pgc_num + 1 || ptt.pgn as usize != program + 1 {
                    continue;
                }
                let mut chapter = ChapterAtom::new(
                    self.uids.next_uid(),
                    false,
                    format!("Chapter PTT#{} [{:02}.{:02}]", n + 1, pgc_num + 1, program + 1),
                );
                chapter.display = Some(format!("Chapter #{title}.{}", n + 1));
                chapter
                    .processes
                    .push(ChapterProcess::dvd(vec![0x10, (n + 1) as u8]));
                chapter.time_start = entry.start_time;
                atom.children.push(chapter);
            }
        }

        for cell_num in entry_cell..next_entry_cell {
            let (Some(position), Some(playback)) = (
                pgc.cell_position.get(cell_num - 1),
                pgc.cell_playback.get(cell_num - 1),
            ) else {
                break;
            };
            if playback.block_mode != 0 && playback.block_mode != 3 {
                continue;
            }
            let Some(cell) = self
                .cells
                .at(position.vob_id_nr, position.cell_nr)
                .filter(|c| c.found)
            else {
                continue;
            };

            let angles = (cell_num - entry_cell + 1) as u8;
            let mut comment = format!(
                "Program {}Cell CN#{cell_num} [{:02}.{}]",
                if cell_num == entry_cell { "Entry " } else { "" },
                cell.vob_id,
                cell.cell_id
            );
            if playback.block_mode != 0 {
                comment.push_str(&format!(" ({angles} angles)"));
            }
            if playback.still_time != 0 && playback.still_time != 0xFF {
                comment.push_str(&format!(", still cell ({}s)", playback.still_time));
            }

            let vob = position.vob_id_nr.to_be_bytes();
            let mut atom_cell = ChapterAtom::new(self.uids.next_uid(), true, comment);
            atom_cell.processes.push(ChapterProcess::dvd(vec![
                0x08,
                vob[0],
                vob[1],
                position.cell_nr,
                angles,
            ]));
            if playback.still_time == 0xFF {
                atom_cell.processes.push(ChapterProcess {
                    codec_id: SCRIPT_CODEC,
                    private: None,
                    commands: vec![ProcessCommand {
                        time: POST_COMMANDS,
                        data: CommandData::Script(format!("GotoAndPlay({pgc_uid});")),
                        comment: Some("Infinite still cell: replay it".to_string()),
                    }],
                });
            }
            atom_cell.time_start = cell.start_time;
            atom_cell.time_end = Some(cell.start_time + cell.duration);
            atom.children.push(atom_cell);
        }

        atom.start_at_children()
    }

    fn language_unit(&mut self, lu: &LanguageUnit) -> ChapterAtom {
        let code = language(lu.lang_code);
        let [hi, lo] = lu.lang_code.to_be_bytes();
        let mut atom = ChapterAtom::new(
            self.uids.next_uid(),
            false,
            format!("Language Unit {code}"),
        );
        atom.display = Some(format!("Language Unit for {code}"));
        atom.processes
            .push(ChapterProcess::dvd(vec![0x2A, hi, lo, lu.lang_extension]));

        for (j, srp) in lu.pgcit.srps.iter().enumerate() {
            let child = self.pgc(&srp.pgc, j as u16, srp.entry_id, None, 0);
            atom.children.push(child);
        }
        atom.start_at_children()
    }
}

/// Chapters of the content pass of title set `title`.
pub fn title_edition(disc: &DiscContent, title: u16, uids: &mut impl UidSource) -> Edition {
    let edition_uid = uids.next_uid();
    let [hi, lo] = title.to_be_bytes();
    let mut outer = ChapterAtom {
        comment: None,
        ..ChapterAtom::new(uids.next_uid(), true, "")
    };
    outer.processes.push(ChapterProcess::dvd(vec![0x30, 0x80, hi, lo]));

    if let Some(content) = disc.title(title) {
        let mut walker = Walker {
            uids,
            cells: &content.title_cells,
        };

        for (i, ttu) in content.ptt_srpt.iter().enumerate() {
            let vts_ttn = i + 1;
            let mut atom = ChapterAtom::new(
                walker.uids.next_uid(),
                true,
                format!("Title TTU_{vts_ttn}"),
            );

            if let Some(j) = disc
                .title_map()
                .iter()
                .position(|t| t.title_set_nr as u16 == title && t.vts_ttn as usize == vts_ttn)
            {
                let number = (j as u16 + 1).to_be_bytes();
                atom.processes.push(ChapterProcess::dvd(vec![
                    0x28,
                    number[0],
                    number[1],
                    vts_ttn as u8,
                ]));
            }

            for (k, srp) in content.pgcit.srps.iter().enumerate() {
                if (srp.entry_id & 0x7F) as usize == vts_ttn {
                    let child = walker.pgc(&srp.pgc, k as u16, 0, Some(ttu), vts_ttn as u16);
                    atom.children.push(child);
                }
            }
            outer.children.push(atom.start_at_children());
        }
    }

    Edition {
        uid: edition_uid,
        ordered: true,
        comment: Some("Video Title Set".to_string()),
        atoms: vec![outer.start_at_children()],
    }
}

/// Chapters of the menu pass of `title`, 0 being the Video Manager.
pub fn menu_edition(disc: &DiscContent, title: u16, uids: &mut impl UidSource) -> Edition {
    let mut edition = Edition {
        uid: uids.next_uid(),
        ordered: true,
        comment: None,
        atoms: Vec::new(),
    };

    if title == 0 {
        if let Some(pgc) = disc.first_play_pgc() {
            let mut atom = ChapterAtom::new(uids.next_uid(), false, "First Play PGC");
            atom.time_end = Some(0);
            atom.display = Some(format!("First Play PGC {}", atom.uid));
            let mut process = ChapterProcess::dvd(vec![0x30, 0x00, 0x00, 0x00]);
            process.commands = pgc_commands(pgc);
            atom.processes.push(process);
            edition.atoms.push(atom);
        }
    }

    let Some(content) = disc.title(title) else {
        return edition;
    };
    if content.language_units.is_empty() {
        return edition;
    }

    let (comment, private) = if title == 0 {
        ("Video Manager", vec![0x30, 0xC0, 0x00, 0x00])
    } else {
        let [hi, lo] = title.to_be_bytes();
        ("Video Title Set", vec![0x30, 0x40, hi, lo])
    };
    let mut domain = ChapterAtom::new(uids.next_uid(), true, comment);
    domain.processes.push(ChapterProcess::dvd(private));

    let mut walker = Walker {
        uids,
        cells: &content.menu_cells,
    };
    for lu in &content.language_units {
        let child = walker.language_unit(lu);
        domain.children.push(child);
    }
    edition.atoms.push(domain.start_at_children());
    edition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::tests::disc;
    use log::Level;

    fn opened() -> anyhow::Result<(tempfile::TempDir, DiscContent)> {
        let root = disc()?;
        let mut content = DiscContent::open(root.path(), Level::Error)?;
        if let Some(vts) = content.title_mut(1) {
            vts.title_cells.mark_found(1, 1u8);
            vts.title_cells.mark_found(1, 2u8);
            vts.title_cells.arrange();
        }
        Ok((root, content))
    }

    fn private(atom: &ChapterAtom) -> Option<&[u8]> {
        atom.processes.first()?.private.as_deref()
    }

    #[test]
    fn title_hierarchy() -> anyhow::Result<()> {
        let (_root, content) = opened()?;
        let edition = title_edition(&content, 1, &mut CounterUids::default());
        assert_eq!(edition.uid, 1);
        assert!(edition.ordered);

        let outer = &edition.atoms[0];
        assert!(outer.hidden);
        assert_eq!(private(outer), Some(&[0x30, 0x80, 0x00, 0x01][..]));

        let ttu = &outer.children[0];
        assert_eq!(private(ttu), Some(&[0x28, 0x00, 0x01, 0x01][..]));

        let pgc = &ttu.children[0];
        assert_eq!(pgc.uid, 4);
        assert!(pgc.hidden);
        assert_eq!(private(pgc), Some(&[0x20, 0x00, 0x01, 0x00, 0, 0, 0, 0][..]));
        assert_eq!(
            pgc.processes[0].commands,
            vec![ProcessCommand {
                time: PRE_COMMANDS,
                data: CommandData::Binary(vec![1, 0x30, 0x02, 0, 0, 0, 1, 0, 0]),
                comment: Some("Pre commands".to_string()),
            }]
        );

        assert_eq!(pgc.children.len(), 2);
        let second = &pgc.children[1];
        assert_eq!(private(second), Some(&[0x18, 0x00, 0x02][..]));
        assert_eq!(second.time_start, 2_000_000_000);

        let chapter = &second.children[0];
        assert!(!chapter.hidden);
        assert_eq!(chapter.display.as_deref(), Some("Chapter #1.2"));
        assert_eq!(private(chapter), Some(&[0x10, 0x02][..]));

        let cell = &second.children[1];
        assert_eq!(private(cell), Some(&[0x08, 0x00, 0x01, 0x02, 0x01][..]));
        assert_eq!(cell.time_start, 2_000_000_000);
        assert_eq!(cell.time_end, Some(3_400_000_000));

        assert_eq!(outer.time_start, 0);
        Ok(())
    }

    #[test]
    fn unfound_cells_are_left_out() -> anyhow::Result<()> {
        let root = disc()?;
        let content = DiscContent::open(root.path(), Level::Error)?;
        let edition = title_edition(&content, 1, &mut CounterUids::default());

        let pgc = &edition.atoms[0].children[0].children[0];
        assert!(pgc.children.iter().all(|program| program.children.is_empty()));
        Ok(())
    }

    #[test]
    fn video_manager_menu() -> anyhow::Result<()> {
        let (_root, content) = opened()?;
        let edition = menu_edition(&content, 0, &mut CounterUids::default());
        assert_eq!(edition.atoms.len(), 2);

        let first_play = &edition.atoms[0];
        assert_eq!(first_play.display.as_deref(), Some("First Play PGC 2"));
        assert_eq!(first_play.time_end, Some(0));
        assert_eq!(private(first_play), Some(&[0x30, 0x00, 0x00, 0x00][..]));

        let domain = &edition.atoms[1];
        assert_eq!(private(domain), Some(&[0x30, 0xC0, 0x00, 0x00][..]));
        let lu = &domain.children[0];
        assert_eq!(lu.display.as_deref(), Some("Language Unit for en"));
        assert_eq!(private(lu), Some(&[0x2A, b'e', b'n', 0x00][..]));

        let pgc = &lu.children[0];
        assert!(!pgc.hidden);
        assert_eq!(
            pgc.display.as_deref(),
            Some("PGC type 0x82 = Entry + Title-Menu")
        );
        Ok(())
    }

    #[test]
    fn title_set_without_menus() -> anyhow::Result<()> {
        let (_root, content) = opened()?;
        let edition = menu_edition(&content, 1, &mut CounterUids::default());
        assert!(edition.atoms.is_empty());
        Ok(())
    }

    #[test]
    fn infinite_still_cell_loops() -> anyhow::Result<()> {
        let (_root, mut content) = opened()?;
        if let Some(vts) = content.title_mut(1) {
            vts.pgcit.srps[0].pgc.cell_playback[0].still_time = 0xFF;
        }
        let edition = title_edition(&content, 1, &mut CounterUids::default());
        let pgc = &edition.atoms[0].children[0].children[0];
        let cell = &pgc.children[0].children[1];

        let script = &cell.processes[1];
        assert_eq!(script.codec_id, SCRIPT_CODEC);
        assert_eq!(
            script.commands[0].data,
            CommandData::Script(format!("GotoAndPlay({});", pgc.uid))
        );
        Ok(())
    }

    #[test]
    fn seeded_uids_are_reproducible() {
        let mut a = SeededUids::new(7);
        let mut b = SeededUids::new(7);
        let first: Vec<_> = (0..4).map(|_| a.next_uid()).collect();
        assert_eq!(first, (0..4).map(|_| b.next_uid()).collect::<Vec<_>>());
        assert!(first.iter().all(|&uid| uid != 0));
    }

    #[test]
    fn pgc_type_names() {
        assert_eq!(pgc_type_name(0x83), "0x83 = Entry + Root Menu");
        assert_eq!(pgc_type_name(0x01), "0x01 = Basic PGC");
    }
}
