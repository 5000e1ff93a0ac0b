use crate::error::{Error, Result};
use crate::locate::Tool;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static IM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,5}) (\d{1,5}) (\b.+\b)$").expect("valid identify pattern"));
// GraphicsMagick may print extra numeric fields between width and height.
static GM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,5})(?: \d+)* (\d{1,5}) (\b.+\b)$").expect("valid identify pattern")
});

/// Width, height and magic of an image as reported by identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "width={}, height={}, format={}",
            self.width, self.height, self.format
        )
    }
}

pub fn parse_identify(tool: Tool, raw: &str, command: &str) -> Result<Identity> {
    let pattern = match tool {
        Tool::GraphicsMagick => &GM_PATTERN,
        Tool::ImageMagick => &IM_PATTERN,
    };
    let parse_error = || Error::OutputParse {
        raw: raw.to_string(),
        command: command.to_string(),
    };
    let caps = pattern.captures(raw.trim_end()).ok_or_else(parse_error)?;
    let width = caps[1].parse().map_err(|_| parse_error())?;
    let height = caps[2].parse().map_err(|_| parse_error())?;

    Ok(Identity {
        width,
        height,
        format: caps[3].to_string(),
    })
}
