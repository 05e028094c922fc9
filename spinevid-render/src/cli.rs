//! Command-line parsing for the `spinevid` binary.

use crate::{Codec, JobConfig};
use std::path::PathBuf;
use thiserror::Error;

pub const USAGE: &str = "\
Usage: spinevid [OPTIONS] <INDEX>...

Renders every animation shared by the rigs of each index file to video. Videos are
written to a `render` directory next to the index file, one file per animation, and
`_default.<ext>` links to the default animation. Index files are rendered in parallel
according to --encode-threads.

Options:
  --fps <FPS>                     Frames per second of the output [default: 30]
  -c, --codec <CODEC>             vp9, h264, h264nv or mov [default: vp9]
  --et, --encode-threads <N>      Index files rendered at once [default: 1]
  --rt, --render-threads <N>      Rasterizer contexts [default: 1]
  -f, --force                     Render even if the index file is unchanged
  --ffmpeg <PATH>                 ffmpeg executable [default: ffmpeg]
  -h, --help                      Print this help";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct UsageError(String);

#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub job: JobConfig,
    pub render_threads: usize,
    pub ffmpeg: PathBuf,
    pub indexes: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Help,
    Run(Options),
}

/// Parses arguments, excluding the program name.
pub fn parse_args<I>(args: I) -> Result<Command, UsageError>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options {
        job: JobConfig::default(),
        render_threads: 1,
        ffmpeg: PathBuf::from("ffmpeg"),
        indexes: Vec::new(),
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--fps" => {
                let fps: f32 = parse_value(&arg, args.next())?;
                if !(fps.is_finite() && fps > 0.0) {
                    return Err(UsageError(format!("--fps must be positive, got {fps}")));
                }
                options.job.fps = fps;
            }
            "-c" | "--codec" => {
                let value = args.next().ok_or_else(|| missing(&arg))?;
                options.job.codec = value.parse::<Codec>().map_err(UsageError)?;
            }
            "--et" | "--encode-threads" => {
                options.job.encode_threads = thread_count(&arg, args.next())?;
            }
            "--rt" | "--render-threads" => {
                options.render_threads = thread_count(&arg, args.next())?;
            }
            "-f" | "--force" => options.job.force = true,
            "--ffmpeg" => {
                options.ffmpeg = PathBuf::from(args.next().ok_or_else(|| missing(&arg))?);
            }
            "--" => options.indexes.extend(args.by_ref().map(PathBuf::from)),
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(UsageError(format!("unknown option '{flag}'")));
            }
            _ => options.indexes.push(PathBuf::from(arg)),
        }
    }

    if options.indexes.is_empty() {
        return Err(UsageError(
            "you must specify at least one index file to render".to_string(),
        ));
    }
    Ok(Command::Run(options))
}

fn missing(flag: &str) -> UsageError {
    UsageError(format!("{flag} requires a value"))
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, UsageError> {
    let value = value.ok_or_else(|| missing(flag))?;
    value
        .parse()
        .map_err(|_| UsageError(format!("invalid value '{value}' for {flag}")))
}

fn thread_count(flag: &str, value: Option<String>) -> Result<usize, UsageError> {
    match parse_value(flag, value)? {
        0 => Err(UsageError(format!("{flag} must be at least 1"))),
        n => Ok(n),
    }
}
