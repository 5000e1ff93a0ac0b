//! Detection of the GraphicsMagick / ImageMagick command line tools.

use crate::error::{Error, Result};
use log::debug;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

static FOUND_GM: OnceCell<bool> = OnceCell::new();
static FOUND_IM: OnceCell<bool> = OnceCell::new();

/// Which toolkit a handle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tool {
    GraphicsMagick,
    ImageMagick,
}

/// An operation supported by both toolkits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Convert,
    Composite,
    Identify,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Convert => "convert",
            Operation::Composite => "composite",
            Operation::Identify => "identify",
        }
    }
}

impl Tool {
    /// The binary used to probe for the tool's presence.
    pub fn probe_binary(self) -> &'static str {
        match self {
            Tool::GraphicsMagick => "gm",
            Tool::ImageMagick => "identify",
        }
    }

    /// GraphicsMagick ships one binary with subcommands, ImageMagick one binary per operation.
    pub fn program(self, op: Operation) -> &'static str {
        match self {
            Tool::GraphicsMagick => "gm",
            Tool::ImageMagick => op.name(),
        }
    }

    pub fn subcommand(self, op: Operation) -> Option<&'static str> {
        match self {
            Tool::GraphicsMagick => Some(op.name()),
            Tool::ImageMagick => None,
        }
    }

    /// Source token for reading the image from stdin.
    ///
    /// GraphicsMagick can't parse a frame index on the stdin marker, so only
    /// ImageMagick gets `-[0]`.
    pub fn stdin_marker(self) -> &'static str {
        match self {
            Tool::GraphicsMagick => "-",
            Tool::ImageMagick => "-[0]",
        }
    }

    fn other(self) -> Tool {
        match self {
            Tool::GraphicsMagick => Tool::ImageMagick,
            Tool::ImageMagick => Tool::GraphicsMagick,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::GraphicsMagick => f.write_str("GraphicsMagick"),
            Tool::ImageMagick => f.write_str("ImageMagick"),
        }
    }
}

/// Which tool to try first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preference {
    #[default]
    GraphicsMagickFirst,
    ImageMagickFirst,
}

impl Preference {
    fn first(self) -> Tool {
        match self {
            Preference::GraphicsMagickFirst => Tool::GraphicsMagick,
            Preference::ImageMagickFirst => Tool::ImageMagick,
        }
    }
}

impl FromStr for Preference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gm" | "graphicsmagick" => Ok(Preference::GraphicsMagickFirst),
            "im" | "imagemagick" => Ok(Preference::ImageMagickFirst),
            _ => Err(Error::InvalidArgument(format!(
                "invalid preference '{}' (must be one of \"gm\" or \"im\")",
                s
            ))),
        }
    }
}

/// Whether `tool` is on `PATH`. Probed once per process.
pub fn is_available(tool: Tool) -> bool {
    let cell = match tool {
        Tool::GraphicsMagick => &FOUND_GM,
        Tool::ImageMagick => &FOUND_IM,
    };
    *cell.get_or_init(|| {
        let found = which::which(tool.probe_binary()).is_ok();
        debug!("Probed '{}': found = {}", tool.probe_binary(), found);
        found
    })
}

/// Picks a tool given an availability check, falling back to the other tool.
pub fn choose<F>(preference: Preference, available: F) -> Result<Tool>
where
    F: Fn(Tool) -> bool,
{
    let first = preference.first();
    if available(first) {
        return Ok(first);
    }
    let second = first.other();
    if available(second) {
        return Ok(second);
    }

    Err(Error::ToolNotFound)
}

pub fn resolve(preference: Preference) -> Result<Tool> {
    let tool = choose(preference, is_available)?;
    debug!("Use {}", tool);

    Ok(tool)
}
