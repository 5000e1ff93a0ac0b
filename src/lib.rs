//! Lightweight wrapper around the GraphicsMagick (`gm`) and ImageMagick
//! (`identify` / `convert` / `composite`) command line tools.
//!
//! All image work is delegated to the external binaries: this crate only
//! builds argument vectors, pipes bytes through the child process and parses
//! the identify line. Whichever toolkit is installed is picked automatically,
//! GraphicsMagick first unless [`Options::prefer`] says otherwise.

pub mod convert;
pub mod error;
pub mod exec;
mod image;
pub mod locate;
mod parser;

pub use error::{Error, Result};
pub use exec::{Captured, Invocation, Runner, SystemRunner};
pub use image::{MagickImage, Options, Source};
pub use locate::{Preference, Tool};
pub use parser::{parse_identify, Identity};
