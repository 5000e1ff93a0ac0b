use anyhow::{Context, Result};
use argh::FromArgs;
use log::*;
use magick_lite::convert::is_stdout;
use magick_lite::{Identity, MagickImage, Options, Preference};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resize, convert, watermark and identify images with GraphicsMagick or ImageMagick
#[derive(FromArgs)]
struct MagickLite {
    /// preferred toolkit, possible values are: "gm" (default) or "im"
    #[argh(option)]
    prefer: Option<Preference>,
    /// kill the external command after this many seconds
    #[argh(option)]
    timeout: Option<u64>,
    /// print debug logs (RUST_LOG takes precedence)
    #[argh(switch, short = 'v')]
    verbose: bool,
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Identify(IdentifyArgs),
    Convert(ConvertArgs),
    Composite(CompositeArgs),
    Chain(ChainArgs),
}

/// print width, height and format of an image
#[derive(FromArgs)]
#[argh(subcommand, name = "identify")]
struct IdentifyArgs {
    /// image file
    #[argh(positional)]
    file: PathBuf,
    /// print the result as JSON
    #[argh(switch)]
    json: bool,
}

/// convert an image; tool options follow `--`
#[derive(FromArgs)]
#[argh(subcommand, name = "convert")]
struct ConvertArgs {
    /// image file
    #[argh(positional)]
    file: PathBuf,
    /// options passed verbatim to the convert command
    #[argh(positional)]
    options: Vec<String>,
    /// output file, image data goes to stdout when omitted
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
    /// force the output format (magic), e.g. GIF
    #[argh(option)]
    format: Option<String>,
}

/// composite an overlay (watermark) over an image; tool options follow `--`
#[derive(FromArgs)]
#[argh(subcommand, name = "composite")]
struct CompositeArgs {
    /// image file
    #[argh(positional)]
    file: PathBuf,
    /// overlay image file
    #[argh(positional)]
    overlay: PathBuf,
    /// options passed verbatim to the composite command
    #[argh(positional)]
    options: Vec<String>,
    /// output file, image data goes to stdout when omitted
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
    /// force the output format (magic), e.g. JPEG
    #[argh(option)]
    format: Option<String>,
}

/// convert in memory, identify the result and save it
#[derive(FromArgs)]
#[argh(subcommand, name = "chain")]
struct ChainArgs {
    /// image file
    #[argh(positional)]
    file: PathBuf,
    /// options passed verbatim to the convert command
    #[argh(positional)]
    options: Vec<String>,
    /// where to write the converted image
    #[argh(option, short = 'o')]
    output: PathBuf,
    /// output format (magic), e.g. GIF
    #[argh(option)]
    format: String,
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    lock.write_all(data)?;
    lock.flush()?;

    Ok(())
}

fn print_identity(identity: &Identity, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(identity)?);
    } else {
        println!("{}", identity);
    }

    Ok(())
}

fn open(file: &Path, options: &Options) -> Result<MagickImage> {
    let image = MagickImage::from_file(file, options.clone())
        .with_context(|| format!("Unable to open {:?}", file))?;
    info!("Using {} for {:?}", image.tool(), file);

    Ok(image)
}

fn identify(args: IdentifyArgs, options: &Options) -> Result<()> {
    let mut image = open(&args.file, options)?;
    let identity = image.identify()?;

    print_identity(&identity, args.json)
}

fn convert(args: ConvertArgs, options: &Options) -> Result<()> {
    let mut image = open(&args.file, options)?;
    image.convert(
        &args.options,
        args.output.as_deref(),
        args.format.as_deref(),
    )?;
    if is_stdout(args.output.as_deref()) {
        write_stdout(&image.data()?)?;
    } else {
        info!(
            "Converted {:?} -> {:?}",
            args.file,
            args.output.unwrap_or_default()
        );
    }

    Ok(())
}

fn composite(args: CompositeArgs, options: &Options) -> Result<()> {
    let mut image = open(&args.file, options)?;
    image.composite(
        &args.options,
        &args.overlay,
        args.output.as_deref(),
        args.format.as_deref(),
    )?;
    if is_stdout(args.output.as_deref()) {
        write_stdout(&image.data()?)?;
    } else {
        info!(
            "Composited {:?} over {:?} -> {:?}",
            args.overlay,
            args.file,
            args.output.unwrap_or_default()
        );
    }

    Ok(())
}

fn chain(args: ChainArgs, options: &Options) -> Result<()> {
    let mut image = open(&args.file, options)?;
    let identity = image
        .convert(&args.options, None, Some(args.format.as_str()))?
        .identify()?;
    std::fs::write(&args.output, image.data()?)
        .with_context(|| format!("Unable to write {:?}", args.output))?;
    println!("New {}", identity);

    Ok(())
}

fn main() -> Result<()> {
    let args: MagickLite = argh::from_env();
    let level = if args.verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(level);
    env_logger::Builder::from_env(env).init();

    let options = Options {
        prefer: args.prefer.unwrap_or_default(),
        timeout: args.timeout.map(Duration::from_secs),
    };
    debug!("Preference: {:?}, timeout: {:?}", options.prefer, options.timeout);

    match args.command {
        Command::Identify(args) => identify(args, &options),
        Command::Convert(args) => convert(args, &options),
        Command::Composite(args) => composite(args, &options),
        Command::Chain(args) => chain(args, &options),
    }
}
