// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime settings from environment variables and command-line arguments.

use anyhow::{bail, Result};
use std::path::PathBuf;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads for parallel processing.
    pub worker_threads: usize,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            worker_threads: std::env::var("TERRALIFT_WORKER_THREADS")
                .unwrap_or_else(|_| num_cpus::get().to_string())
                .parse()
                .unwrap_or_else(|_| num_cpus::get())
                .max(1),
            log_filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

pub const USAGE: &str = "\
Usage: terralift <scene.json> --config <config.json> [OPTIONS]

Lift vector footprints with point-cloud samples into 3D features.

Options:
  -c, --config <FILE>   Reconstruction configuration (JSON)
  -o, --output <FILE>   Write the result document here instead of stdout
      --no-stitching    Keep independent elevations at shared vertices
      --vertical-walls  Add vertical walls at elevation jumps
  -h, --help            Print this help

Environment:
  TERRALIFT_WORKER_THREADS  Worker threads (default: number of CPUs)
  RUST_LOG                  Log filter (default: info)";

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Run(RunArgs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub scene: PathBuf,
    pub config: PathBuf,
    pub output: Option<PathBuf>,
    pub no_stitching: bool,
    pub vertical_walls: bool,
}

/// Parse arguments (without the program name).
pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut scene = None;
    let mut config = None;
    let mut output = None;
    let mut no_stitching = false;
    let mut vertical_walls = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-c" | "--config" => match args.next() {
                Some(v) => config = Some(PathBuf::from(v)),
                None => bail!("{} needs a file argument", arg),
            },
            "-o" | "--output" => match args.next() {
                Some(v) => output = Some(PathBuf::from(v)),
                None => bail!("{} needs a file argument", arg),
            },
            "--no-stitching" => no_stitching = true,
            "--vertical-walls" => vertical_walls = true,
            s if s.starts_with('-') => bail!("unknown option '{}'", s),
            _ => {
                if scene.is_some() {
                    bail!("unexpected argument '{}'", arg);
                }
                scene = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(scene) = scene else {
        bail!("missing scene file");
    };
    let Some(config) = config else {
        bail!("missing --config");
    };
    Ok(Command::Run(RunArgs {
        scene,
        config,
        output,
        no_stitching,
        vertical_walls,
    }))
}
