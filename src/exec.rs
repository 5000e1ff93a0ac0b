//! Running one external command with piped stdio.
//!
//! The program and its arguments are handed to the OS as an argument vector,
//! never through a shell. Stdin is fed on its own thread while stdout and
//! stderr are drained concurrently, so a child that fills one pipe while we
//! are still writing the other cannot deadlock us.

use crate::error::{Error, Result};
use log::{debug, trace, warn};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }
}

/// Renders the command line for logs and error messages only.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(['\'', '"']) {
                write!(f, " {:?}", arg)?;
            } else if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }

        Ok(())
    }
}

/// Everything a successful command wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Seam between the image handle and process execution.
pub trait Runner {
    fn run(
        &self,
        invocation: &Invocation,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<Captured>;
}

/// Runs commands on the host via [`execute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(
        &self,
        invocation: &Invocation,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<Captured> {
        execute(invocation, stdin, timeout)
    }
}

enum Waited {
    Exited(ExitStatus),
    TimedOut(Duration),
}

/// Runs `invocation` to completion.
///
/// Any non-zero exit is an [`Error::Process`] carrying the stderr text. With a
/// `timeout`, a child still running at the deadline is killed and reaped.
pub fn execute(
    invocation: &Invocation,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<Captured> {
    let command = invocation.to_string();
    debug!("Executing: {}", command);

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;

    let input = child.stdin.take();
    let output = child.stdout.take();
    let errors = child.stderr.take();

    let (waited, fed, stdout, stderr) = thread::scope(|s| {
        let writer = s.spawn(move || feed(input, stdin));
        let out_reader = s.spawn(move || drain(output));
        let err_reader = s.spawn(move || drain(errors));

        let waited = wait(&mut child, timeout);
        if waited.is_err() {
            // Unblock the pipe threads before the scope joins them.
            let _ = child.kill();
            let _ = child.wait();
        }

        (waited, join(writer), join(out_reader), join(err_reader))
    });

    let status = match waited? {
        Waited::Exited(status) => status,
        Waited::TimedOut(timeout) => return Err(Error::Timeout { command, timeout }),
    };
    let stdout = stdout?;
    let stderr = stderr?;
    trace!(
        "'{}' exited with {}: {} bytes on stdout, {} bytes on stderr",
        command,
        status,
        stdout.len(),
        stderr.len()
    );

    if !status.success() {
        log_signal(&command, status);
        return Err(Error::Process {
            command,
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        });
    }
    fed?;

    Ok(Captured { stdout, stderr })
}

fn feed(pipe: Option<ChildStdin>, data: Option<&[u8]>) -> io::Result<()> {
    let (mut pipe, data) = match (pipe, data) {
        (Some(pipe), Some(data)) => (pipe, data),
        _ => return Ok(()),
    };
    // The pipe is closed when `pipe` drops at the end of this function.
    match pipe.write_all(data) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            warn!("Child closed stdin before reading all {} bytes", data.len());
            Ok(())
        }
        other => other,
    }
}

fn drain<R: Read>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }

    Ok(buf)
}

fn join<T>(handle: ScopedJoinHandle<'_, io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe thread panicked")))
}

fn wait(child: &mut Child, timeout: Option<Duration>) -> io::Result<Waited> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return child.wait().map(Waited::Exited),
    };
    // A deadline past the end of representable time is no deadline at all.
    let deadline = match Instant::now().checked_add(timeout) {
        Some(deadline) => deadline,
        None => return child.wait().map(Waited::Exited),
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Waited::Exited(status));
        }
        if Instant::now() >= deadline {
            // The child may exit between try_wait and kill; wait reaps it either way.
            let _ = child.kill();
            child.wait()?;
            return Ok(Waited::TimedOut(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn log_signal(command: &str, status: ExitStatus) {
    use std::os::unix::process::ExitStatusExt;

    if let Some(signal) = status.signal() {
        debug!("'{}' was terminated by signal {}", command, signal);
    }
}

#[cfg(not(unix))]
fn log_signal(_command: &str, _status: ExitStatus) {}
