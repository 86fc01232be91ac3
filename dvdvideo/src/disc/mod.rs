//! Disc access: locating `VIDEO_TS`, loading its information files and
//! exposing per-title cells and stream attributes.

pub mod blocks;

use std::fs;
use std::path::{Path, PathBuf};

use log::Level;

use crate::structs::cell::CellList;
use crate::structs::ifo::{
    DomainAttributes, LanguageUnit, Pgc, Pgcit, TitleInfo, TitleUnit, Vmgi, Vtsi,
};
use crate::utils::errors::IfoError;

/// Case-insensitive lookup of `name` inside `dir`.
pub fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }

    fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(name))
        .map(|entry| entry.path())
}

/// `path` itself when it holds `VIDEO_TS.IFO`, otherwise its `VIDEO_TS`
/// subdirectory.
pub fn locate_video_ts(path: &Path) -> Result<PathBuf, IfoError> {
    if find_file(path, "VIDEO_TS.IFO").is_some() || find_file(path, "VIDEO_TS.BUP").is_some() {
        return Ok(path.to_path_buf());
    }

    fs::read_dir(path)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|p| {
            p.is_dir()
                && p.file_name()
                    .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case("VIDEO_TS"))
        })
        .ok_or_else(|| IfoError::NotFound(path.to_path_buf()))
}

/// Reads `{stem}.IFO`, falling back to the `{stem}.BUP` backup.
fn read_ifo(video_ts: &Path, stem: &str) -> Result<(Vec<u8>, String), IfoError> {
    let mut last_error = None;
    for extension in ["IFO", "BUP"] {
        let name = format!("{stem}.{extension}");
        let Some(path) = find_file(video_ts, &name) else {
            continue;
        };
        match fs::read(&path) {
            Ok(data) => return Ok((data, name)),
            Err(e) => {
                log::warn!("Cannot read {}: {e}", path.display());
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e.into()),
        None => Err(IfoError::NotFound(video_ts.join(format!("{stem}.IFO")))),
    }
}

/// Output geometry and frame rate of a domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSize {
    pub width: u16,
    pub height: u16,
    pub fps: f64,
}

/// Menu and title domains of title 0 (the Video Manager) or a title set.
#[derive(Debug, Clone)]
pub struct TitleContent {
    pub title: u16,
    pub menu_cells: CellList,
    pub title_cells: CellList,
    pub menu_attributes: DomainAttributes,
    pub title_attributes: DomainAttributes,
    pub language_units: Vec<LanguageUnit>,
    pub pgcit: Pgcit,
    pub ptt_srpt: Vec<TitleUnit>,
}

impl TitleContent {
    fn empty(title: u16, fail_level: Level) -> Self {
        let mut menu_cells = CellList::default();
        menu_cells.set_fail_level(fail_level);
        let mut title_cells = CellList::default();
        title_cells.set_fail_level(fail_level);

        Self {
            title,
            menu_cells,
            title_cells,
            menu_attributes: DomainAttributes::default(),
            title_attributes: DomainAttributes::default(),
            language_units: Vec::new(),
            pgcit: Pgcit::default(),
            ptt_srpt: Vec::new(),
        }
    }

    fn from_vmgi(vmgi: &Vmgi, fail_level: Level) -> Result<Self, IfoError> {
        let mut content = Self::empty(0, fail_level);
        content.menu_attributes = vmgi.menu_attributes.clone();
        content.language_units = vmgi
            .menu_pgci_ut
            .as_ref()
            .map(|ut| ut.lus.clone())
            .unwrap_or_default();
        for lu in &content.language_units {
            content.menu_cells.add_pgcit(&lu.pgcit, &vmgi.menu_c_adt)?;
        }
        content.menu_cells.arrange();
        Ok(content)
    }

    fn from_vtsi(title: u16, vtsi: Vtsi, fail_level: Level) -> Result<Self, IfoError> {
        let mut content = Self::empty(title, fail_level);
        content.language_units = vtsi.menu_pgci_ut.map(|ut| ut.lus).unwrap_or_default();
        for lu in &content.language_units {
            content.menu_cells.add_pgcit(&lu.pgcit, &vtsi.menu_c_adt)?;
        }
        content.menu_cells.arrange();

        content.title_cells.add_pgcit(&vtsi.pgcit, &vtsi.title_c_adt)?;
        content.title_cells.arrange();

        content.menu_attributes = vtsi.menu_attributes;
        content.title_attributes = vtsi.title_attributes;
        content.pgcit = vtsi.pgcit;
        content.ptt_srpt = vtsi.ptt_srpt;
        Ok(content)
    }

    pub fn cells(&self, menu: bool) -> &CellList {
        if menu { &self.menu_cells } else { &self.title_cells }
    }

    pub fn cells_mut(&mut self, menu: bool) -> &mut CellList {
        if menu { &mut self.menu_cells } else { &mut self.title_cells }
    }

    pub fn attributes(&self, menu: bool) -> &DomainAttributes {
        if menu { &self.menu_attributes } else { &self.title_attributes }
    }

    /// PGCs of a domain: every language unit for menus, the PGCIT for
    /// titles.
    pub fn pgcs(&self, menu: bool) -> Box<dyn Iterator<Item = &Pgc> + '_> {
        if menu {
            Box::new(
                self.language_units
                    .iter()
                    .flat_map(|lu| lu.pgcit.srps.iter().map(|srp| &srp.pgc)),
            )
        } else {
            Box::new(self.pgcit.srps.iter().map(|srp| &srp.pgc))
        }
    }

    /// Physical stream id of audio stream `index`, taken from the first PGC
    /// that enables it. Falls back to `index`.
    pub fn find_audio_stream(&self, index: u8, menu: bool) -> u8 {
        self.pgcs(menu)
            .filter_map(|pgc| pgc.audio_control.get(index as usize).copied())
            .find(|ac| ac & 0x8000 != 0)
            .map(|ac| ((ac >> 8) & 0x7F) as u8)
            .unwrap_or(index)
    }

    /// Physical subpicture ids of subtitle stream `index` (4:3, wide,
    /// letterbox and pan-scan variants) from every PGC that enables it.
    pub fn find_sub_streams(&self, index: u8, menu: bool) -> Vec<u8> {
        let mut ids = Vec::new();
        for sc in self
            .pgcs(menu)
            .filter_map(|pgc| pgc.subp_control.get(index as usize).copied())
            .filter(|sc| sc & 0x8000_0000 != 0)
        {
            ids.push(((sc >> 24) & 0x7F) as u8);
            for shift in [16, 8, 0] {
                let id = ((sc >> shift) & 0x7F) as u8;
                if id != 0 {
                    ids.push(id);
                }
            }
        }
        ids
    }

    pub fn video_size(&self, menu: bool) -> VideoSize {
        let video = self.attributes(menu).video;
        let (fps, mut height) = if video.video_format != 0 {
            (25.0, 576)
        } else {
            (30000.0 / 1001.0, 480)
        };
        let width = match video.picture_size {
            0 => 720,
            1 => 704,
            _ => 352,
        };
        if video.picture_size == 3 {
            height >>= 1;
        }
        VideoSize { width, height, fps }
    }

    /// Palette of the first PGC of the domain.
    pub fn palette(&self, menu: bool) -> Option<[u32; 16]> {
        self.pgcs(menu).next().map(|pgc| pgc.palette)
    }
}

/// All information files of one disc.
#[derive(Debug, Clone)]
pub struct DiscContent {
    video_ts: PathBuf,
    vmgi: Vmgi,
    titles: Vec<TitleContent>,
}

impl DiscContent {
    /// Loads `VIDEO_TS.IFO` and every title set it announces. Unreadable
    /// title sets are logged and left out.
    pub fn open(path: &Path, fail_level: Level) -> Result<Self, IfoError> {
        let video_ts = locate_video_ts(path)?;
        let (data, _) = read_ifo(&video_ts, "VIDEO_TS")?;
        let vmgi = Vmgi::parse(&data)?;

        let mut titles = vec![TitleContent::from_vmgi(&vmgi, fail_level)?];
        for title in 1..=vmgi.nr_of_title_sets {
            let stem = format!("VTS_{title:02}_0");
            let loaded = read_ifo(&video_ts, &stem).and_then(|(data, name)| {
                let vtsi = Vtsi::parse(&data, &name)?;
                TitleContent::from_vtsi(title, vtsi, fail_level)
            });
            match loaded {
                Ok(content) => titles.push(content),
                Err(e @ IfoError::Timeline(_)) => return Err(e),
                Err(e) => log::error!("Cannot open {stem}.IFO: {e}"),
            }
        }

        log::debug!(
            "{}: {} title sets, {} loaded",
            video_ts.display(),
            vmgi.nr_of_title_sets,
            titles.len() - 1
        );
        Ok(Self {
            video_ts,
            vmgi,
            titles,
        })
    }

    pub fn video_ts(&self) -> &Path {
        &self.video_ts
    }

    pub fn number_of_titles(&self) -> u16 {
        self.vmgi.nr_of_title_sets
    }

    pub fn first_play_pgc(&self) -> Option<&Pgc> {
        self.vmgi.first_play_pgc.as_ref()
    }

    pub fn title_map(&self) -> &[TitleInfo] {
        &self.vmgi.titles
    }

    pub fn titles(&self) -> impl Iterator<Item = &TitleContent> {
        self.titles.iter()
    }

    pub fn title(&self, title: u16) -> Option<&TitleContent> {
        self.titles.iter().find(|t| t.title == title)
    }

    pub fn title_mut(&mut self, title: u16) -> Option<&mut TitleContent> {
        self.titles.iter_mut().find(|t| t.title == title)
    }
}
