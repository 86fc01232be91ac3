use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, InfoArgs, InfoFormat};
use dvdvideo::disc::{DiscContent, TitleContent};
use dvdvideo::structs::cell::CellList;
use dvdvideo::structs::ifo::{DomainAttributes, lang_code_str};
use dvdvideo::structs::language::language_name;
use dvdvideo::structs::time::format_time;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing DVD: {}", args.input.display());

    let pb = if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Reading information files...");
        Some(pb)
    } else {
        None
    };

    let disc = DiscContent::open(&args.input, cli.fail_level())
        .with_context(|| format!("Couldn't use '{}' as DVD source", args.input.display()));
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let info = DiscInfo::from_disc(&disc?);

    match args.format {
        InfoFormat::Plain => print!("{}", info.to_plain()),
        InfoFormat::Yaml => print!("{}", serde_yaml_ng::to_string(&info)?),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct DiscInfo {
    video_ts: String,
    title_sets: u16,
    titles: Vec<TitleEntry>,
    domains: Vec<DomainInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct TitleEntry {
    number: usize,
    title_set: u8,
    vts_ttn: u8,
    chapters: u16,
    angles: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct DomainInfo {
    name: String,
    title: u16,
    menu: bool,
    video: VideoInfo,
    audio: Vec<AudioInfo>,
    subtitles: Vec<SubtitleInfo>,
    cells: Vec<CellInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct VideoInfo {
    width: u16,
    height: u16,
    fps: f64,
    standard: &'static str,
    aspect_ratio: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct AudioInfo {
    index: u8,
    stream_id: u8,
    format: &'static str,
    channels: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct SubtitleInfo {
    index: u8,
    stream_ids: Vec<u8>,
    forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct CellInfo {
    vob_id: u16,
    cell_id: u8,
    first_sector: u32,
    last_sector: u32,
    frames: u32,
    still: bool,
    duration: String,
}

fn language(code: u16) -> Option<String> {
    lang_code_str(code).map(|lang| format!("{lang} ({})", language_name(code)))
}

impl DomainInfo {
    fn new(content: &TitleContent, menu: bool) -> Self {
        let attributes: &DomainAttributes = content.attributes(menu);
        let size = content.video_size(menu);
        let video = attributes.video;

        let audio = attributes
            .audio
            .iter()
            .zip(0u8..)
            .map(|(attr, index)| AudioInfo {
                index,
                stream_id: content.find_audio_stream(index, menu),
                format: attr.format_name(),
                channels: attr.channels,
                language: language(attr.lang_code),
            })
            .collect();

        let subtitles = attributes
            .subp
            .iter()
            .zip(0u8..)
            .map(|(attr, index)| SubtitleInfo {
                index,
                stream_ids: content.find_sub_streams(index, menu),
                forced: attr.lang_extension == 9,
                language: language(attr.lang_code),
            })
            .collect();

        Self {
            name: domain_name(content.title, menu),
            title: content.title,
            menu,
            video: VideoInfo {
                width: size.width,
                height: size.height,
                fps: size.fps,
                standard: if video.video_format != 0 { "PAL" } else { "NTSC" },
                aspect_ratio: if video.display_aspect_ratio == 3 { "16:9" } else { "4:3" },
            },
            audio,
            subtitles,
            cells: cells(content.cells(menu)),
        }
    }
}

fn domain_name(title: u16, menu: bool) -> String {
    match (title, menu) {
        (0, _) => "Video Manager menu".to_string(),
        (t, true) => format!("Title set {t} menu"),
        (t, false) => format!("Title set {t}"),
    }
}

fn cells(list: &CellList) -> Vec<CellInfo> {
    list.iter()
        .map(|cell| CellInfo {
            vob_id: cell.vob_id,
            cell_id: cell.cell_id,
            first_sector: cell.start_sector,
            last_sector: cell.last_sector,
            frames: cell.nb_frames,
            still: cell.is_still,
            duration: format_time(cell.duration),
        })
        .collect()
}

impl DiscInfo {
    fn from_disc(disc: &DiscContent) -> Self {
        let titles = disc
            .title_map()
            .iter()
            .enumerate()
            .map(|(i, t)| TitleEntry {
                number: i + 1,
                title_set: t.title_set_nr,
                vts_ttn: t.vts_ttn,
                chapters: t.nr_of_ptts,
                angles: t.nr_of_angles,
            })
            .collect();

        let domains = disc
            .titles()
            .flat_map(|content| {
                let menu = DomainInfo::new(content, true);
                let title = (content.title != 0).then(|| DomainInfo::new(content, false));
                std::iter::once(menu).chain(title)
            })
            .collect();

        Self {
            video_ts: disc.video_ts().display().to_string(),
            title_sets: disc.number_of_titles(),
            titles,
            domains,
        }
    }

    fn to_plain(&self) -> String {
        let mut out = String::new();
        out.push_str("\nDVD-Video Information\n=====================\n\n");
        out.push_str(&format!("  VIDEO_TS                  {}\n", self.video_ts));
        out.push_str(&format!("  Title sets                {}\n", self.title_sets));
        out.push('\n');

        if !self.titles.is_empty() {
            out.push_str("Titles\n");
            for t in &self.titles {
                out.push_str(&format!(
                    "  Title {:<3}                 VTS {:02} TTN {} ({} chapters, {} angles)\n",
                    t.number, t.title_set, t.vts_ttn, t.chapters, t.angles
                ));
            }
            out.push('\n');
        }

        for domain in &self.domains {
            out.push_str(&format!("{}\n", domain.name));
            let v = &domain.video;
            out.push_str(&format!(
                "  Video                     {}x{} {} {:.3} fps {}\n",
                v.width, v.height, v.standard, v.fps, v.aspect_ratio
            ));
            for a in &domain.audio {
                out.push_str(&format!(
                    "  Audio {:<2}                  {} {}ch, stream {:#04x}, {}\n",
                    a.index,
                    a.format,
                    a.channels,
                    a.stream_id,
                    a.language.as_deref().unwrap_or("undetermined")
                ));
            }
            for s in &domain.subtitles {
                let ids = s
                    .stream_ids
                    .iter()
                    .map(|id| format!("{id:#04x}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!(
                    "  Subtitle {:<2}               streams [{ids}]{}, {}\n",
                    s.index,
                    if s.forced { " forced" } else { "" },
                    s.language.as_deref().unwrap_or("undetermined")
                ));
            }
            if !domain.cells.is_empty() {
                out.push_str("  Cells\n");
                for c in &domain.cells {
                    out.push_str(&format!(
                        "    VOB {:<3} Cell {:<3}        sectors {}-{}, {} frames{}, {}\n",
                        c.vob_id,
                        c.cell_id,
                        c.first_sector,
                        c.last_sector,
                        c.frames,
                        if c.still { " (still)" } else { "" },
                        c.duration
                    ));
                }
            }
            out.push('\n');
        }
        out
    }
}
