use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unable to locate 'gm' or 'identify' CLI commands")]
    ToolNotFound,
    #[error("failed to start command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{}", describe_failure(.command, .code, .stderr))]
    Process {
        command: String,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
        stderr: String,
    },
    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("failed to parse output (\"{raw}\") of command '{command}'")]
    OutputParse { raw: String, command: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn describe_failure(command: &str, code: &Option<i32>, stderr: &str) -> String {
    let mut message = match code {
        Some(code) => format!("bad exit code {} from command '{}'", code, command),
        None => format!("command '{}' was terminated by a signal", command),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        message.push('.');
    } else {
        message.push_str(" and this error output: ");
        message.push_str(stderr);
    }

    message
}
