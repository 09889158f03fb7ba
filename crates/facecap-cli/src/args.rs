//! Command-line parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use facecap_models::ProfilePreference;

pub const USAGE: &str = "\
Usage:
  facecap classify <detections.json> <frame_width> <frame_height>
  facecap crop <image> <detections.json> [--mode selfie|id] [--factor F] [--clamp] [--out PATH]
  facecap capture <image> <detections.json> [--mode selfie|id] [--out PATH]
  facecap profiles [--lowest-first]
  facecap schema";

/// Crop framing selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeArg {
    #[default]
    Selfie,
    Id,
}

impl std::str::FromStr for ModeArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "selfie" => Ok(ModeArg::Selfie),
            "id" | "id-photo" => Ok(ModeArg::Id),
            other => Err(anyhow!("unknown crop mode '{}', expected selfie or id", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Classify {
        detections: PathBuf,
        frame_width: u32,
        frame_height: u32,
    },
    Crop {
        image: PathBuf,
        detections: PathBuf,
        mode: ModeArg,
        factor: Option<f64>,
        clamp: bool,
        out: Option<PathBuf>,
    },
    Capture {
        image: PathBuf,
        detections: PathBuf,
        mode: ModeArg,
        out: Option<PathBuf>,
    },
    Profiles {
        preference: Option<ProfilePreference>,
    },
    Schema,
    Help,
}

/// Parse arguments, excluding the program name.
pub fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(Command::Help);
    };

    let mut positional = Vec::new();
    let mut mode = ModeArg::default();
    let mut factor = None;
    let mut clamp = false;
    let mut out = None;
    let mut lowest_first = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => mode = value(&mut args, "--mode")?.parse()?,
            "--factor" => {
                let raw = value(&mut args, "--factor")?;
                factor = Some(
                    raw.parse::<f64>()
                        .with_context(|| format!("invalid --factor '{}'", raw))?,
                );
            }
            "--clamp" => clamp = true,
            "--out" => out = Some(PathBuf::from(value(&mut args, "--out")?)),
            "--lowest-first" => lowest_first = true,
            flag if flag.starts_with("--") => bail!("unknown option '{}'", flag),
            _ => positional.push(arg),
        }
    }

    let command = match command.as_str() {
        "classify" => {
            let [detections, width, height] = take::<3>(positional, "classify")?;
            Command::Classify {
                detections: detections.into(),
                frame_width: width
                    .parse()
                    .with_context(|| format!("invalid frame width '{}'", width))?,
                frame_height: height
                    .parse()
                    .with_context(|| format!("invalid frame height '{}'", height))?,
            }
        }
        "crop" => {
            let [image, detections] = take::<2>(positional, "crop")?;
            Command::Crop {
                image: image.into(),
                detections: detections.into(),
                mode,
                factor,
                clamp,
                out,
            }
        }
        "capture" => {
            let [image, detections] = take::<2>(positional, "capture")?;
            Command::Capture {
                image: image.into(),
                detections: detections.into(),
                mode,
                out,
            }
        }
        "profiles" => Command::Profiles {
            preference: lowest_first.then_some(ProfilePreference::LowestFirst),
        },
        "schema" => Command::Schema,
        "help" | "-h" | "--help" => Command::Help,
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    };

    Ok(command)
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn take<const N: usize>(positional: Vec<String>, command: &str) -> Result<[String; N]> {
    let count = positional.len();
    positional
        .try_into()
        .map_err(|_| anyhow!("{} expects {} arguments, got {}\n\n{}", command, N, count, USAGE))
}
