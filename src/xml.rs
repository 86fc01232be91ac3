//! Matroska chapter and segment info XML for mkvmerge.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use dvdvideo::process::chapters::{ChapterAtom, ChapterProcess, CommandData, Edition};
use dvdvideo::process::writer::with_suffix;
use dvdvideo::structs::time::format_time;

pub const CHAPTER_SUFFIX: &str = "_menu.xml";
pub const INFO_SUFFIX: &str = "_info.xml";

const CREATOR: &str = concat!("dvdmx ", env!("CARGO_PKG_VERSION"));
const INDENT: usize = 2;

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Space separated lowercase hex bytes.
fn encode_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

struct XmlWriter {
    xml: String,
    depth: usize,
}

impl XmlWriter {
    fn new(doctype: &str, dtd: &str) -> Self {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
        xml.push_str(&format!("<!DOCTYPE {doctype} SYSTEM \"{dtd}\">\n"));
        Self { xml, depth: 0 }
    }

    fn indent(&mut self) {
        self.xml.push_str(&" ".repeat(self.depth * INDENT));
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        self.xml.push_str(&format!("<{tag}>\n"));
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.xml.push_str(&format!("</{tag}>\n"));
    }

    fn element(&mut self, tag: &str, text: impl AsRef<str>) {
        self.indent();
        let text = escape_xml(text.as_ref());
        self.xml.push_str(&format!("<{tag}>{text}</{tag}>\n"));
    }

    fn formatted(&mut self, tag: &str, format: &str, text: impl AsRef<str>) {
        self.indent();
        let text = escape_xml(text.as_ref());
        self.xml
            .push_str(&format!("<{tag} format=\"{format}\">{text}</{tag}>\n"));
    }

    fn comment(&mut self, text: &str) {
        self.indent();
        self.xml
            .push_str(&format!("<!-- {} -->\n", text.replace("--", "- -")));
    }

    fn finish(self) -> String {
        self.xml
    }
}

fn write_process(w: &mut XmlWriter, process: &ChapterProcess) {
    w.open("ChapterProcess");
    w.element("ChapterProcessCodecID", process.codec_id.to_string());
    if let Some(private) = &process.private {
        w.formatted("ChapterProcessPrivate", "hex", encode_hex(private));
    }
    for command in &process.commands {
        if let Some(comment) = &command.comment {
            w.comment(comment);
        }
        w.open("ChapterProcessCommand");
        w.element("ChapterProcessTime", command.time.to_string());
        match &command.data {
            CommandData::Binary(data) => w.formatted("ChapterProcessData", "hex", encode_hex(data)),
            CommandData::Script(script) => w.formatted("ChapterProcessData", "ascii", script),
        }
        w.close("ChapterProcessCommand");
    }
    w.close("ChapterProcess");
}

fn write_atom(w: &mut XmlWriter, atom: &ChapterAtom) {
    if let Some(comment) = &atom.comment {
        w.comment(comment);
    }
    w.open("ChapterAtom");
    w.element("ChapterUID", atom.uid.to_string());
    if atom.hidden {
        w.element("ChapterFlagHidden", "1");
    }
    if let Some(display) = &atom.display {
        w.open("ChapterDisplay");
        w.element("ChapterString", display);
        w.close("ChapterDisplay");
    }
    w.element("ChapterTimeStart", format_time(atom.time_start));
    if let Some(end) = atom.time_end {
        w.element("ChapterTimeEnd", format_time(end));
    }
    for process in &atom.processes {
        write_process(w, process);
    }
    for child in &atom.children {
        write_atom(w, child);
    }
    w.close("ChapterAtom");
}

/// Chapter file of one edition.
pub fn chapters_xml(edition: &Edition) -> String {
    let mut w = XmlWriter::new("Chapters", "matroskachapters.dtd");
    w.comment(&format!("Created with {CREATOR}"));
    w.open("Chapters");
    w.open("EditionEntry");
    w.element("EditionUID", edition.uid.to_string());
    if edition.ordered {
        w.element("EditionFlagOrdered", "1");
    }
    if let Some(comment) = &edition.comment {
        w.comment(comment);
    }
    for atom in &edition.atoms {
        write_atom(&mut w, atom);
    }
    w.close("EditionEntry");
    w.close("Chapters");
    w.finish()
}

/// Segment info linking the segment family and the DVD chapter codec
/// translation of `title`.
pub fn info_xml(family: &[u8; 16], edition_uid: u64, title: u16) -> String {
    let mut w = XmlWriter::new("Info", "matroskainfos.dtd");
    w.open("Info");
    w.formatted("SegmentFamily", "hex", encode_hex(family));
    w.open("ChapterTranslate");
    w.element("ChapterTranslateEditionUID", edition_uid.to_string());
    w.element("ChapterTranslateCodec", "1");
    w.formatted("ChapterTranslateID", "hex", format!("{title:02x} 00"));
    w.close("ChapterTranslate");
    w.close("Info");
    w.finish()
}

/// Writes `{prefix}_menu.xml` and `{prefix}_info.xml`, returning their
/// paths.
pub fn write_chapter_files(
    prefix: &Path,
    edition: &Edition,
    family: &[u8; 16],
    title: u16,
) -> Result<(PathBuf, PathBuf)> {
    let chapters = with_suffix(prefix, CHAPTER_SUFFIX);
    fs::write(&chapters, chapters_xml(edition))?;

    let info = with_suffix(prefix, INFO_SUFFIX);
    fs::write(&info, info_xml(family, edition.uid, title))?;

    log::debug!("Wrote {} and {}", chapters.display(), info.display());
    Ok((chapters, info))
}
