use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use indicatif::MultiProgress;
use log::Level;

use dvdvideo::disc::blocks::{VobDomain, VobSet};
use dvdvideo::disc::{DiscContent, TitleContent};
use dvdvideo::process::chapters::{SeededUids, menu_edition, title_edition};
use dvdvideo::process::demux::CompositeDemuxWriter;
use dvdvideo::process::vob::VobParser;
use dvdvideo::process::writer::{SubtitleParams, Writer, audio_writer, with_suffix};
use dvdvideo::structs::ifo::lang_code_str;
use dvdvideo::structs::time::format_tmc_time;

use super::progress::{create_progress_bar, finalize_progress_bar};
use super::selection::{Selection, parse_selection};
use crate::cli::command::{Cli, ExtractArgs};
use crate::xml::write_chapter_files;

const VIDEO_SLOT: u8 = 0xE0;
const BUTTON_SLOT: u8 = 0x00;
const SUBTITLE_BASE: u8 = 0x20;

pub fn cmd_extract(args: &ExtractArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    if !args.input.exists() {
        bail!("Input folder '{}' doesn't exist", args.input.display());
    }
    if !args.tools.exists() {
        bail!("Tools folder '{}' doesn't exist", args.tools.display());
    }
    if !args.output.exists() {
        fs::create_dir_all(&args.output).with_context(|| {
            format!("Cannot create output folder '{}'", args.output.display())
        })?;
        log::info!("Created output folder '{}'", args.output.display());
    }

    let selection = args
        .selection
        .as_deref()
        .map(parse_selection)
        .transpose()?;
    let seed = args.seed.unwrap_or_else(clock_seed);

    log::info!(
        "Extracting {} (strict mode: {}, UID seed: {seed})",
        args.input.display(),
        cli.strict
    );

    let fail_level = cli.fail_level();
    let disc = DiscContent::open(&args.input, fail_level).with_context(|| {
        format!("Couldn't use '{}' as DVD source", args.input.display())
    })?;

    let mut demuxer = Demuxer::new(disc, &args.output, &args.tools, fail_level, seed);
    let summary = demuxer.run(selection.as_deref(), multi);

    log::info!(
        "{} passes done, {} failed, {} skipped",
        summary.completed,
        summary.failed,
        summary.skipped
    );
    if summary.failed > 0 && cli.strict {
        bail!("{} title passes failed", summary.failed);
    }
    Ok(())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Milliseconds since midnight UTC.
fn time_of_day_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64 % 86_400_000)
        .unwrap_or_default()
}

/// One demux pass over the menu or content VOBs of a title.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Pass<'a> {
    title: u16,
    menu: bool,
    selection: Option<&'a Selection>,
}

/// Passes in processing order: one per selection item, otherwise the
/// Video Manager menu followed by the menu and content of every title set.
fn plan(number_of_titles: u16, selection: Option<&[Selection]>) -> Vec<Pass<'_>> {
    match selection {
        Some(items) => items
            .iter()
            .map(|s| Pass {
                title: s.title,
                menu: s.menu,
                selection: Some(s),
            })
            .collect(),
        None => (0..=number_of_titles)
            .flat_map(|title| {
                let menu = Pass {
                    title,
                    menu: true,
                    selection: None,
                };
                let content = (title != 0).then_some(Pass {
                    title,
                    menu: false,
                    selection: None,
                });
                std::iter::once(menu).chain(content)
            })
            .collect(),
    }
}

fn base_name(title: u16, menu: bool) -> String {
    if title == 0 {
        "VMG".to_string()
    } else {
        format!("VTS{}{title:02}", if menu { "M" } else { "" })
    }
}

/// mkvmerge language and file name suffix of a packed language code.
fn language(code: u16) -> (String, String) {
    match lang_code_str(code) {
        Some(lang) => (lang.clone(), lang),
        None => ("und".to_string(), "un".to_string()),
    }
}

fn video_command(prefix: &Path) -> String {
    let p = prefix.display();
    format!(" --track-name 0:\"video\" --timecodes 0:\"{p}_m2v.tmc\" \"{p}.m2v\"")
}

fn audio_command(track: &str, language: &str, prefix: &Path, extension: &str) -> String {
    let p = prefix.display();
    format!(
        " --track-name 0:\"aud-{track}\" --language 0:{language} --timecodes 0:\"{p}_{extension}.tmc\" \"{p}.{extension}\""
    )
}

fn subtitle_command(track: &str, language: &str, prefix: &Path) -> String {
    let p = prefix.display();
    format!(" --track-name 0:\"sub-{track}\" --language 0:{language} \"{p}.idx\"")
}

fn button_command(track: &str, prefix: &Path) -> String {
    let p = prefix.display();
    format!(" --track-name 0:\"btn-{track}\" --timecodes 0:\"{p}_btn.tmc\" \"{p}.btn\"")
}

/// Binds `writer` unless the slot is taken.
fn bind(demux: &mut CompositeDemuxWriter, id: u8, writer: Writer, command: String) -> bool {
    match demux.add(id, writer, command) {
        Ok(()) => true,
        Err(_) => {
            log::debug!("Stream {id:#04x} already has a writer");
            false
        }
    }
}

/// Registers the video, audio, subtitle and button writers of a pass.
fn register_writers(
    content: &TitleContent,
    pass: &Pass,
    output: &Path,
    name: &str,
    demux: &mut CompositeDemuxWriter,
) {
    let menu = pass.menu;
    let attributes = content.attributes(menu);
    let size = content.video_size(menu);
    let prefix = output.join(name);

    if pass.selection.is_none_or(|s| s.video) {
        bind(
            demux,
            VIDEO_SLOT,
            Writer::video(&prefix, size.fps),
            video_command(&prefix),
        );
    }

    let audio: Vec<u8> = match pass.selection {
        Some(s) => s.audio.clone(),
        None => (0..attributes.audio.len() as u8).collect(),
    };
    for index in audio {
        let Some(attr) = attributes.audio.get(index as usize) else {
            log::warn!("{name}: there is no audio stream {index}");
            continue;
        };
        let id = content.find_audio_stream(index, menu);
        let (lang, suffix) = language(attr.lang_code);
        let track = format!("{name}_{id}_{suffix}");
        let track_prefix = output.join(&track);

        match audio_writer(&track_prefix, attr.audio_format, id) {
            Ok((slot, writer)) => {
                let command = audio_command(&track, &lang, &track_prefix, writer.extension());
                bind(demux, slot, writer, command);
            }
            Err(e) => log::error!("{name}: audio stream {index}: {e}, skipping it"),
        }
    }

    let subtitles: Vec<u8> = match pass.selection {
        Some(s) => s.subtitles.clone(),
        None => (0..attributes.subp.len() as u8).collect(),
    };
    let palette = content.palette(menu).unwrap_or([0; 16]);
    let mut has_subtitles = false;
    for index in subtitles {
        let Some(attr) = attributes.subp.get(index as usize) else {
            log::warn!("{name}: there is no subtitle stream {index}");
            continue;
        };
        let (lang, suffix) = language(attr.lang_code);
        let params = SubtitleParams {
            width: size.width,
            height: size.height,
            palette,
            language: attr.lang_code,
            forced: attr.lang_extension == 9,
        };

        for id in content.find_sub_streams(index, menu) {
            let track = format!("{name}_{id}_{suffix}");
            let track_prefix = output.join(&track);
            let command = subtitle_command(&track, &lang, &track_prefix);
            let writer = Writer::subtitle(&track_prefix, &params);
            has_subtitles |= bind(demux, SUBTITLE_BASE.wrapping_add(id), writer, command);
        }
    }

    if has_subtitles {
        bind(
            demux,
            BUTTON_SLOT,
            Writer::button(&prefix, size.width, size.height),
            button_command(name, &prefix),
        );
    }
}

/// mkvmerge invocation: video first, then every other stream that produced
/// a file, then chapters and segment info.
fn mux_command(
    tools: &Path,
    prefix: &Path,
    demux: &CompositeDemuxWriter,
    chapters: &Path,
    info: &Path,
) -> String {
    let mut command = format!(
        "{}/mkvmerge -o \"{}.mkv\"",
        tools.display(),
        prefix.display()
    );
    if demux.file_exists(VIDEO_SLOT) {
        command.push_str(demux.command(VIDEO_SLOT).unwrap_or_default());
    }
    for id in demux
        .ids()
        .filter(|&id| id != VIDEO_SLOT && demux.file_exists(id))
    {
        command.push_str(demux.command(id).unwrap_or_default());
    }
    command.push_str(&format!(
        " --chapters \"{}\" --segmentinfo \"{}\"",
        chapters.display(),
        info.display()
    ));
    command
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Runs the demux passes of one disc.
pub struct Demuxer {
    disc: DiscContent,
    output: PathBuf,
    tools: PathBuf,
    fail_level: Level,
    uids: SeededUids,
    family: [u8; 16],
    abort: Arc<AtomicBool>,
}

impl Demuxer {
    pub fn new(disc: DiscContent, output: &Path, tools: &Path, fail_level: Level, seed: u64) -> Self {
        let mut uids = SeededUids::new(seed);
        let family = uids.family_uid();
        Self {
            disc,
            output: output.to_path_buf(),
            tools: tools.to_path_buf(),
            fail_level,
            uids,
            family,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked once per sector; raising it ends the running pass and
    /// skips the remaining ones.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Runs every planned pass. Failed passes are logged and counted; in
    /// strict mode the first failure aborts the remaining passes.
    pub fn run(&mut self, selection: Option<&[Selection]>, multi: Option<&MultiProgress>) -> Summary {
        let mut summary = Summary::default();
        for pass in plan(self.disc.number_of_titles(), selection) {
            let name = base_name(pass.title, pass.menu);
            if self.abort.load(Ordering::Relaxed) {
                log::info!("Skipping {name}");
                summary.skipped += 1;
                continue;
            }

            match self.demux(&pass, multi) {
                Ok(script) => {
                    log::info!("Done demuxing {name}, mux script {}", script.display());
                    summary.completed += 1;
                }
                Err(e) => {
                    log::error!("{name}: {e:#}");
                    summary.failed += 1;
                    if self.fail_level >= Level::Warn {
                        self.abort.store(true, Ordering::Relaxed);
                    }
                }
            }
        }
        summary
    }

    /// Demuxes one pass and writes its chapters and mux script. Returns the
    /// script path.
    fn demux(&mut self, pass: &Pass, multi: Option<&MultiProgress>) -> Result<PathBuf> {
        let (title, menu) = (pass.title, pass.menu);
        let name = base_name(title, menu);
        let prefix = self.output.join(&name);
        log::info!(
            "Treating Title {title} {}VOB file(s)",
            if menu { "Menu " } else { "" }
        );

        let content = self
            .disc
            .title(title)
            .ok_or_else(|| anyhow!("Title {title} is not on the disc"))?;

        let mut demux = CompositeDemuxWriter::with_fail_level(self.fail_level);
        register_writers(content, pass, &self.output, &name, &mut demux);
        log::debug!("{name} writers: {demux:?}");

        let domain = if menu { VobDomain::Menu } else { VobDomain::Title };
        let vobs = match VobSet::open(self.disc.video_ts(), title, domain) {
            Ok(vobs) => Some(vobs),
            Err(e) if !e.is_fatal_to_title() => {
                log::error!(
                    "No VOB file(s) found in {} for Title {title}: {e}",
                    self.disc.video_ts().display()
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(vobs) = vobs {
            log::info!("Processing {name}");
            let mut parser = VobParser::new(vobs).with_abort_handle(self.abort_handle());
            let pb = multi
                .map(|m| create_progress_bar(m, parser.packet_count(), &name))
                .transpose()?;
            let start_time = Instant::now();

            let content = self
                .disc
                .title_mut(title)
                .ok_or_else(|| anyhow!("Title {title} is not on the disc"))?;
            let result = parser.run(content.cells_mut(menu), &mut demux, |sector| {
                if let Some(pb) = &pb {
                    pb.set_position(sector as u64);
                }
            });

            match result {
                Ok(end) => finalize_progress_bar(&pb, &name, end, demux.ids().count(), start_time),
                Err(e) => {
                    if let Some(pb) = &pb {
                        pb.finish_with_message(format!("{name}: demux failed"));
                    }
                    return Err(anyhow::Error::from(e).context(format!("Demuxing {name}")));
                }
            }
            if let Err(e) = demux.finalize() {
                log::warn!("{name}: some outputs are incomplete: {e}");
            }
        }

        if let Some(content) = self.disc.title_mut(title) {
            content.cells_mut(menu).arrange();
        }

        let edition = if menu {
            menu_edition(&self.disc, title, &mut self.uids)
        } else {
            title_edition(&self.disc, title, &mut self.uids)
        };
        let (chapters, info) = write_chapter_files(&prefix, &edition, &self.family, title)?;

        let script = with_suffix(&prefix, &format!("_{}.sh", format_tmc_time(time_of_day_ms())));
        let command = mux_command(&self.tools, &prefix, &demux, &chapters, &info);
        fs::write(&script, format!("#!/bin/sh\n\n{command}\n"))
            .with_context(|| format!("Could not create {}", script.display()))?;
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(title: u16, menu: bool) -> Selection {
        Selection {
            title,
            menu,
            video: true,
            audio: Vec::new(),
            subtitles: Vec::new(),
        }
    }

    #[test]
    fn passes_without_selection() {
        let passes: Vec<_> = plan(2, None)
            .iter()
            .map(|p| (p.title, p.menu))
            .collect();
        assert_eq!(
            passes,
            vec![(0, true), (1, true), (1, false), (2, true), (2, false)]
        );
    }

    #[test]
    fn one_pass_per_selected_item() {
        let items = [selection(3, false), selection(0, true), selection(1, true)];
        let passes: Vec<_> = plan(5, Some(&items))
            .iter()
            .map(|p| (p.title, p.menu, p.selection.is_some()))
            .collect();
        assert_eq!(passes, vec![(3, false, true), (0, true, true), (1, true, true)]);
    }

    #[test]
    fn output_names() {
        assert_eq!(base_name(0, true), "VMG");
        assert_eq!(base_name(1, true), "VTSM01");
        assert_eq!(base_name(12, false), "VTS12");
        assert_eq!(language(0), ("und".to_string(), "un".to_string()));
        assert_eq!(language(u16::from_be_bytes(*b"fr")), ("fr".to_string(), "fr".to_string()));
    }

    #[test]
    fn track_commands() {
        let prefix = Path::new("/out/VTS01_1_en");
        assert_eq!(
            audio_command("VTS01_1_en", "en", prefix, "ac3"),
            " --track-name 0:\"aud-VTS01_1_en\" --language 0:en \
             --timecodes 0:\"/out/VTS01_1_en_ac3.tmc\" \"/out/VTS01_1_en.ac3\""
        );
        assert_eq!(
            subtitle_command("VTS01_0_un", "und", Path::new("/out/VTS01_0_un")),
            " --track-name 0:\"sub-VTS01_0_un\" --language 0:und \"/out/VTS01_0_un.idx\""
        );
        assert_eq!(
            video_command(Path::new("/out/VTS01")),
            " --track-name 0:\"video\" --timecodes 0:\"/out/VTS01_m2v.tmc\" \"/out/VTS01.m2v\""
        );
        assert_eq!(
            button_command("VTS01", Path::new("/out/VTS01")),
            " --track-name 0:\"btn-VTS01\" --timecodes 0:\"/out/VTS01_btn.tmc\" \"/out/VTS01.btn\""
        );
    }

    #[test]
    fn mux_command_lists_produced_files() -> Result<()> {
        use dvdvideo::process::demux::DemuxSink;

        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("VTS01");
        let mut demux = CompositeDemuxWriter::default();
        assert!(bind(&mut demux, 0xC0, Writer::mpa(&prefix), " mpa".to_string()));
        assert!(bind(&mut demux, 0x80, Writer::ac3(&prefix), " ac3".to_string()));
        assert!(bind(&mut demux, 0x81, Writer::dts(&prefix), " silent".to_string()));
        assert!(bind(&mut demux, VIDEO_SLOT, Writer::video(&prefix, 25.0), " video".to_string()));
        assert!(!bind(&mut demux, 0x80, Writer::ac3(&prefix), " again".to_string()));

        demux.process_stream(0xC0, &[0xFF, 0xFB], 0, 24)?;
        demux.process_stream(0x80, &[0x0B, 0x77], 0, 32)?;

        let command = mux_command(
            Path::new("/tools"),
            Path::new("/out/VTS01"),
            &demux,
            Path::new("/out/VTS01_menu.xml"),
            Path::new("/out/VTS01_info.xml"),
        );
        assert_eq!(
            command,
            "/tools/mkvmerge -o \"/out/VTS01.mkv\" ac3 mpa \
             --chapters \"/out/VTS01_menu.xml\" --segmentinfo \"/out/VTS01_info.xml\""
        );
        Ok(())
    }

    /// A Video Manager without title sets, menus or VOBs.
    fn bare_disc(root: &Path) -> Result<DiscContent> {
        let video_ts = root.join("VIDEO_TS");
        fs::create_dir(&video_ts)?;
        let mut ifo = vec![0u8; 2048];
        ifo[..12].copy_from_slice(b"DVDVIDEO-VMG");
        fs::write(video_ts.join("VIDEO_TS.IFO"), ifo)?;
        Ok(DiscContent::open(root, Level::Error)?)
    }

    #[test]
    fn raised_abort_flag_skips_every_pass() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("out");
        fs::create_dir(&output)?;
        let mut demuxer = Demuxer::new(bare_disc(dir.path())?, &output, Path::new("."), Level::Error, 1);
        demuxer.abort_handle().store(true, Ordering::Relaxed);

        let summary = demuxer.run(None, None);
        assert_eq!(
            summary,
            Summary {
                completed: 0,
                failed: 0,
                skipped: 1,
            }
        );
        assert_eq!(fs::read_dir(&output)?.count(), 0);
        Ok(())
    }

    #[test]
    fn pass_without_vobs_still_writes_chapters_and_script() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("out");
        fs::create_dir(&output)?;
        let mut demuxer = Demuxer::new(bare_disc(dir.path())?, &output, Path::new("/opt/mkv"), Level::Error, 7);

        let summary = demuxer.run(None, None);
        assert_eq!(summary.completed, 1);
        assert!(output.join("VMG_menu.xml").is_file());
        assert!(output.join("VMG_info.xml").is_file());

        let script = fs::read_dir(&output)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .find(|p| p.extension().is_some_and(|e| e == "sh"))
            .context("mux script missing")?;
        let text = fs::read_to_string(&script)?;
        assert!(text.starts_with("#!/bin/sh\n\n/opt/mkv/mkvmerge -o \""), "{text}");
        assert!(text.contains("VMG.mkv\" --chapters \""), "{text}");
        assert!(!text.contains("--track-name"), "{text}");
        Ok(())
    }

    #[test]
    fn selecting_a_missing_title_fails_the_pass() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut demuxer = Demuxer::new(bare_disc(dir.path())?, dir.path(), Path::new("."), Level::Warn, 1);
        let items = [selection(4, false), selection(0, true)];

        let summary = demuxer.run(Some(&items), None);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        Ok(())
    }

    #[test]
    fn missing_input_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("missing").to_string_lossy().into_owned();
        let output = dir.path().join("out").to_string_lossy().into_owned();
        let cli = <Cli as clap::Parser>::try_parse_from([
            "dvdmx",
            "extract",
            "-i",
            input.as_str(),
            "-o",
            output.as_str(),
        ])?;
        let crate::cli::command::Commands::Extract(args) = &cli.command else {
            bail!("expected the extract command");
        };

        let err = cmd_extract(args, &cli, None).err().context("extract should fail")?;
        assert!(err.to_string().contains("doesn't exist"), "{err}");
        assert!(!dir.path().join("out").exists());
        Ok(())
    }

    #[test]
    fn directory_without_ifo_is_not_a_disc() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().to_string_lossy().into_owned();
        let output = dir.path().join("out").to_string_lossy().into_owned();
        let cli = <Cli as clap::Parser>::try_parse_from([
            "dvdmx",
            "extract",
            "-i",
            input.as_str(),
            "-o",
            output.as_str(),
        ])?;
        let crate::cli::command::Commands::Extract(args) = &cli.command else {
            bail!("expected the extract command");
        };

        let err = cmd_extract(args, &cli, None).err().context("extract should fail")?;
        assert!(format!("{err:#}").contains("as DVD source"), "{err:#}");
        assert!(dir.path().join("out").is_dir());
        Ok(())
    }
}
