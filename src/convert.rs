//! Argument vectors for the convert, composite and identify commands.
//!
//! Caller-supplied option tokens are passed through verbatim; it is up to the
//! caller to use syntax the selected tool understands.

use crate::exec::Invocation;
use crate::locate::{Operation, Tool};
use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Output template for identify: width, height and magic.
pub const IDENTIFY_FORMAT: &str = "%w %h %m";

/// True when `output` means "write to stdout".
pub fn is_stdout(output: Option<&Path>) -> bool {
    output.map_or(true, |p| p.as_os_str().is_empty() || p == Path::new("-"))
}

fn command(tool: Tool, op: Operation) -> Invocation {
    let invocation = Invocation::new(tool.program(op));
    match tool.subcommand(op) {
        Some(sub) => invocation.arg(sub),
        None => invocation,
    }
}

/// The bound file, or the stdin marker when the image lives in memory.
fn source_token(tool: Tool, source: Option<&Path>) -> OsString {
    match source {
        Some(path) => path.as_os_str().to_owned(),
        None => OsString::from(tool.stdin_marker()),
    }
}

/// `out.jpg`, `GIF:out.bin`, `-` or `GIF:-`.
fn destination_token(output: Option<&Path>, format: Option<&str>) -> OsString {
    let target = if is_stdout(output) {
        OsStr::new("-")
    } else {
        output.map_or(OsStr::new("-"), Path::as_os_str)
    };
    match format.filter(|f| !f.is_empty()) {
        Some(format) => {
            let mut token = OsString::from(format);
            token.push(":");
            token.push(target);
            token
        }
        None => target.to_owned(),
    }
}

pub fn convert_args<S: AsRef<OsStr>>(
    tool: Tool,
    source: Option<&Path>,
    options: &[S],
    output: Option<&Path>,
    format: Option<&str>,
) -> Invocation {
    command(tool, Operation::Convert)
        .arg(source_token(tool, source))
        .args(options)
        .arg(destination_token(output, format))
}

pub fn composite_args<S: AsRef<OsStr>>(
    tool: Tool,
    source: Option<&Path>,
    options: &[S],
    overlay: &Path,
    output: Option<&Path>,
    format: Option<&str>,
) -> Invocation {
    command(tool, Operation::Composite)
        .args(options)
        .arg(overlay)
        .arg(source_token(tool, source))
        .arg(destination_token(output, format))
}

pub fn identify_args(tool: Tool, source: Option<&Path>) -> Invocation {
    command(tool, Operation::Identify)
        .args(["-format", IDENTIFY_FORMAT])
        .arg(source_token(tool, source))
}
