// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Terralift - lift footprints into 3D features from point-cloud samples.
//!
//! Reads a scene document (footprints and point sources) and a
//! reconstruction configuration, runs the pipeline and writes the result
//! document with per-feature geometry and the run report.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use terralift_core::ReconstructionConfig;
use terralift_processing::{reconstruct, Scene};

mod config;

use config::{parse_args, Command, Config, RunArgs, USAGE};

fn main() -> Result<()> {
    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    let args = match command {
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Command::Run(args) => args,
    };

    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter.as_str())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        scene = %args.scene.display(),
        config = %args.config.display(),
        worker_threads = config.worker_threads,
        "Starting terralift"
    );

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build_global()
        .context("Failed to initialize rayon thread pool")?;

    run(&args)
}

fn run(args: &RunArgs) -> Result<()> {
    let mut reconstruction: ReconstructionConfig = read_json(&args.config)?;
    if args.no_stitching {
        reconstruction.options.stitching = false;
    }
    if args.vertical_walls {
        reconstruction.options.use_vertical_walls = true;
    }
    let policies = reconstruction.resolve().context("Invalid reconstruction configuration")?;

    let scene: Scene = read_json(&args.scene)?;
    let output = reconstruct(scene, policies).context("Reconstruction failed")?;

    match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &output)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            serde_json::to_writer(&mut writer, &output)?;
            writeln!(writer)?;
        }
    }

    tracing::info!(
        features = output.features.len(),
        failed = output.report.failed_count(),
        triangles = output.total_triangles(),
        total_time_ms = output.report.timings.total_ms,
        "Done"
    );
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("Cannot parse {}", path.display()))
}
