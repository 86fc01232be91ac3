use anyhow::{Result, bail};

/// One `title,menu,video,{audio},{subtitles}` item of `--selection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub title: u16,
    /// Always set for title 0, which only has a menu domain.
    pub menu: bool,
    pub video: bool,
    /// Audio stream indices in the IFO attribute table.
    pub audio: Vec<u8>,
    /// Subpicture stream indices in the IFO attribute table.
    pub subtitles: Vec<u8>,
}

/// Splits on commas outside braces.
fn fields(item: &str) -> Result<Vec<&str>> {
    let mut fields = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    for (i, c) in item.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => bail!("Unbalanced '}}' in selection item \"{item}\""),
            '}' => depth -= 1,
            ',' if depth == 0 => {
                fields.push(item[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        bail!("Unbalanced '{{' in selection item \"{item}\"");
    }
    fields.push(item[start..].trim());
    Ok(fields)
}

fn flag(field: &str, name: &str) -> Result<bool> {
    match field {
        "0" => Ok(false),
        "1" => Ok(true),
        other => bail!("{name} flag must be 0 or 1, got \"{other}\""),
    }
}

/// `{0,2}` style list; duplicates keep their first position.
fn tracks(field: &str, name: &str) -> Result<Vec<u8>> {
    let Some(inner) = field.strip_prefix('{').and_then(|f| f.strip_suffix('}')) else {
        bail!("{name} tracks must be enclosed in braces, got \"{field}\"");
    };

    let mut tracks = Vec::new();
    for number in inner.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let Ok(track) = number.parse::<u8>() else {
            bail!("Invalid {name} track index \"{number}\"");
        };
        if !tracks.contains(&track) {
            tracks.push(track);
        }
    }
    Ok(tracks)
}

/// Parses `title,menu,video,{a,b},{s,t};...`. Empty items are ignored.
pub fn parse_selection(list: &str) -> Result<Vec<Selection>> {
    let mut selection = Vec::new();
    for item in list.split(';').map(str::trim).filter(|i| !i.is_empty()) {
        let fields = fields(item)?;
        let [title, menu, video, audio, subtitles] = fields[..] else {
            bail!(
                "Selection item \"{item}\" has {} fields, expected title,menu,video,{{audio}},{{subtitles}}",
                fields.len()
            );
        };

        let Ok(title) = title.parse::<u16>() else {
            bail!("Invalid title number \"{title}\"");
        };
        selection.push(Selection {
            title,
            menu: title == 0 || flag(menu, "Menu")?,
            video: flag(video, "Video")?,
            audio: tracks(audio, "audio")?,
            subtitles: tracks(subtitles, "subtitle")?,
        });
    }
    Ok(selection)
}
