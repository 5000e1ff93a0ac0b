//! The image handle and its fluent operations.

use crate::convert;
use crate::error::{Error, Result};
use crate::exec::{Captured, Invocation, Runner, SystemRunner};
use crate::locate::{self, Preference, Tool};
use crate::parser::{self, Identity};
use log::debug;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the image currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Data(Vec<u8>),
}

/// Per-handle settings.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Which tool to try first when both are installed.
    pub prefer: Preference,
    /// Kill an external command that runs longer than this.
    pub timeout: Option<Duration>,
}

/// An image bound to a file or an in-memory buffer.
///
/// ```no_run
/// use magick_lite::{MagickImage, Options};
///
/// let mut image = MagickImage::from_file("photo.jpg", Options::default())?;
/// let identity = image
///     .convert(&["-resize", "100x100>"], None, Some("GIF"))?
///     .identify()?;
/// println!("{}", identity);
/// std::fs::write("thumbnail.gif", image.data()?)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct MagickImage<R = SystemRunner> {
    source: Source,
    tool: Tool,
    options: Options,
    identify_cache: Option<Identity>,
    runner: R,
}

impl MagickImage<SystemRunner> {
    pub fn from_file<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        Self::open(Source::File(path.as_ref().to_owned()), options)
    }

    pub fn from_data<D: Into<Vec<u8>>>(data: D, options: Options) -> Result<Self> {
        Self::open(Source::Data(data.into()), options)
    }

    fn open(source: Source, options: Options) -> Result<Self> {
        validate(&source)?;
        let tool = locate::resolve(options.prefer)?;
        Self::with_tool(source, tool, options, SystemRunner)
    }
}

impl<R: Runner> MagickImage<R> {
    /// Builds a handle for an already chosen tool, without probing `PATH`.
    pub fn with_tool(source: Source, tool: Tool, options: Options, runner: R) -> Result<Self> {
        validate(&source)?;
        Ok(Self {
            source,
            tool,
            options,
            identify_cache: None,
            runner,
        })
    }

    /// Swaps the runner that executes commands for this handle.
    pub fn with_runner<T: Runner>(self, runner: T) -> MagickImage<T> {
        MagickImage {
            source: self.source,
            tool: self.tool,
            options: self.options,
            identify_cache: self.identify_cache,
            runner,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn is_file(&self) -> bool {
        matches!(self.source, Source::File(_))
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Converts the image.
    ///
    /// Without an `output` file (or with `-`) the result replaces the handle's
    /// image and can be saved later through [`data`](Self::data) or another
    /// convert. `format` forces the output magic, e.g. `GIF`.
    pub fn convert<S: AsRef<OsStr>>(
        &mut self,
        options: &[S],
        output: Option<&Path>,
        format: Option<&str>,
    ) -> Result<&mut Self> {
        let invocation = convert::convert_args(self.tool, self.file(), options, output, format);
        let captured = self.run(&invocation)?;
        self.absorb(output, captured);

        Ok(self)
    }

    /// Composites `overlay` (typically a watermark) over the image.
    pub fn composite<S: AsRef<OsStr>>(
        &mut self,
        options: &[S],
        overlay: &Path,
        output: Option<&Path>,
        format: Option<&str>,
    ) -> Result<&mut Self> {
        if overlay.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("missing overlay image".to_string()));
        }
        if !overlay.exists() {
            return Err(Error::InvalidArgument(format!(
                "overlay image file not found: '{}'",
                overlay.display()
            )));
        }

        let invocation =
            convert::composite_args(self.tool, self.file(), options, overlay, output, format);
        let captured = self.run(&invocation)?;
        self.absorb(output, captured);

        Ok(self)
    }

    /// Width, height and magic of the image. Cached until the image changes.
    pub fn identify(&mut self) -> Result<Identity> {
        if let Some(cached) = &self.identify_cache {
            return Ok(cached.clone());
        }

        let invocation = convert::identify_args(self.tool, self.file());
        let captured = self.run(&invocation)?;
        let raw = String::from_utf8_lossy(&captured.stdout);
        let identity = parser::parse_identify(self.tool, &raw, &invocation.to_string())?;
        debug!("Identified {}", identity);
        self.identify_cache = Some(identity.clone());

        Ok(identity)
    }

    /// The image bytes: the in-memory buffer, or the bound file's contents.
    pub fn data(&self) -> Result<Cow<'_, [u8]>> {
        match &self.source {
            Source::Data(data) => Ok(Cow::Borrowed(data.as_slice())),
            Source::File(path) => Ok(Cow::Owned(fs::read(path)?)),
        }
    }

    fn file(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path.as_path()),
            Source::Data(_) => None,
        }
    }

    fn stdin(&self) -> Option<&[u8]> {
        match &self.source {
            Source::File(_) => None,
            Source::Data(data) => Some(data.as_slice()),
        }
    }

    fn run(&self, invocation: &Invocation) -> Result<Captured> {
        self.runner
            .run(invocation, self.stdin(), self.options.timeout)
    }

    fn absorb(&mut self, output: Option<&Path>, captured: Captured) {
        if convert::is_stdout(output) {
            self.source = Source::Data(captured.stdout);
            self.identify_cache = None;
        }
    }
}

fn validate(source: &Source) -> Result<()> {
    match source {
        Source::File(path) if path.as_os_str().is_empty() => {
            Err(Error::InvalidArgument("missing file name".to_string()))
        }
        Source::File(path) if !path.exists() => {
            Err(Error::InvalidArgument(format!("file not found: {}", path.display())))
        }
        Source::Data(data) if data.is_empty() => {
            Err(Error::InvalidArgument("missing image data".to_string()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::tests::MockRunner;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    type Mocked = MagickImage<MockRunner>;

    fn photo() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not really a jpeg").unwrap();
        file
    }

    fn handle(source: Source, tool: Tool, runner: MockRunner) -> Mocked {
        MagickImage::with_tool(source, tool, Options::default(), runner).unwrap()
    }

    fn file_handle(file: &NamedTempFile, tool: Tool, runner: MockRunner) -> Mocked {
        handle(Source::File(file.path().to_owned()), tool, runner)
    }

    fn data_handle(data: &[u8], tool: Tool, runner: MockRunner) -> Mocked {
        handle(Source::Data(data.to_vec()), tool, runner)
    }

    #[test]
    fn rejects_missing_file() {
        let missing = Source::File(PathBuf::from("/definitely/not/here.jpg"));
        let result = MagickImage::with_tool(
            missing,
            Tool::GraphicsMagick,
            Options::default(),
            MockRunner::new(),
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rejects_empty_inputs() {
        for source in [Source::File(PathBuf::new()), Source::Data(Vec::new())] {
            let options = Options::default();
            let runner = MockRunner::new();
            let result = MagickImage::with_tool(source, Tool::ImageMagick, options, runner);
            assert!(matches!(result, Err(Error::InvalidArgument(_))));
        }
    }

    #[test]
    fn identify_is_cached() {
        let file = photo();
        let runner = MockRunner::with_stdout(&["800 600 JPEG\n"]);
        let mut image = file_handle(&file, Tool::ImageMagick, runner);

        let first = image.identify().unwrap();
        let second = image.identify().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "width=800, height=600, format=JPEG");

        let calls = image.runner().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "identify");
        assert_eq!(calls[0].stdin, None);
    }

    #[test]
    fn identify_parse_failure() {
        let file = photo();
        let runner = MockRunner::with_stdout(&["garbage"]);
        let mut image = file_handle(&file, Tool::GraphicsMagick, runner);

        let err = image.identify().unwrap_err();
        match err {
            Error::OutputParse { raw, command } => {
                assert_eq!(raw, "garbage");
                assert!(command.starts_with("gm identify -format"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn convert_into_memory_then_identify() {
        let file = photo();
        let runner = MockRunner::with_stdout(&["GIF89a...", "100 75 GIF"]);
        let mut image = file_handle(&file, Tool::GraphicsMagick, runner);

        let identity = image
            .convert(&["-resize", "100x100>"], None, Some("GIF"))
            .unwrap()
            .identify()
            .unwrap();
        assert_eq!(identity.to_string(), "width=100, height=75, format=GIF");
        assert!(!image.is_file());
        assert_eq!(&*image.data().unwrap(), b"GIF89a...");

        let calls = image.runner().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args.last().map(String::as_str), Some("GIF:-"));
        // The identify reads the converted bytes from stdin.
        let expected = ["identify", "-format", "%w %h %m", "-"];
        assert_eq!(calls[1].args, expected);
        assert_eq!(calls[1].stdin.as_deref(), Some(&b"GIF89a..."[..]));
    }

    #[test]
    fn convert_clears_identify_cache() {
        let outputs = ["800 600 JPEG", "PNGDATA", "100 75 PNG"];
        let runner = MockRunner::with_stdout(&outputs);
        let mut image = data_handle(b"JPEGDATA", Tool::ImageMagick, runner);

        assert_eq!(image.identify().unwrap().format, "JPEG");
        image.convert::<&str>(&[], None, Some("PNG")).unwrap();
        assert_eq!(image.identify().unwrap().format, "PNG");

        let calls = image.runner().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].args, ["-[0]", "PNG:-"]);
        assert_eq!(calls[1].stdin.as_deref(), Some(&b"JPEGDATA"[..]));
    }

    #[test]
    fn convert_to_file_keeps_source() {
        let file = photo();
        let runner = MockRunner::with_stdout(&[""]);
        let mut image = file_handle(&file, Tool::ImageMagick, runner);

        image
            .convert(&["-quality", "80"], Some(Path::new("thumbnail.jpg")), None)
            .unwrap();
        assert!(image.is_file());
        assert_eq!(&*image.data().unwrap(), b"not really a jpeg");
    }

    #[test]
    fn failed_convert_leaves_handle_untouched() {
        let runner = MockRunner::new();
        runner.push(Err(Error::Process {
            command: "gm convert - -".to_string(),
            code: Some(1),
            stderr: "gm convert: Improper image header.".to_string(),
        }));
        let mut image = data_handle(b"bytes", Tool::GraphicsMagick, runner);

        let err = image.convert::<&str>(&[], None, None).unwrap_err();
        assert!(err.to_string().contains("Improper image header"));
        assert_eq!(image.source(), &Source::Data(b"bytes".to_vec()));
    }

    #[test]
    fn composite_missing_overlay_spawns_nothing() {
        let runner = MockRunner::with_stdout(&["unused"]);
        let mut image = data_handle(b"bytes", Tool::ImageMagick, runner);

        let missing = Path::new("/no/such/watermark.png");
        let err = image
            .composite(&["-dissolve", "50"], missing, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = image
            .composite::<&str>(&[], Path::new(""), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(image.runner().calls().is_empty());
    }

    #[test]
    fn composite_into_memory() {
        let dir = TempDir::new().unwrap();
        let overlay = dir.path().join("watermark.png");
        fs::write(&overlay, b"png").unwrap();
        let runner = MockRunner::with_stdout(&["COMPOSED"]);
        let mut image = data_handle(b"bytes", Tool::GraphicsMagick, runner);

        let stdout = Some(Path::new("-"));
        image
            .composite(&["-gravity", "southeast"], &overlay, stdout, Some("JPEG"))
            .unwrap();
        assert_eq!(&*image.data().unwrap(), b"COMPOSED");

        let calls = image.runner().calls();
        assert_eq!(calls[0].program, "gm");
        assert_eq!(
            calls[0].args,
            vec![
                "composite".to_string(),
                "-gravity".to_string(),
                "southeast".to_string(),
                overlay.to_string_lossy().into_owned(),
                "-".to_string(),
                "JPEG:-".to_string(),
            ]
        );
    }

    #[test]
    fn with_runner_keeps_state() {
        let runner = MockRunner::with_stdout(&["10 20 PNG"]);
        let mut image = data_handle(b"bytes", Tool::ImageMagick, runner);
        image.identify().unwrap();

        let mut image = image.with_runner(MockRunner::new());
        assert_eq!(image.identify().unwrap().height, 20);
        assert!(image.runner().calls().is_empty());
    }
}
