// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Terralift Processing
//!
//! The lifting and reconstruction pipeline shared by the command-line tool
//! and library users:
//!
//! 1. footprints are stored and indexed once,
//! 2. point sources are streamed in parallel into per-footprint sample
//!    accumulators,
//! 3. every footprint vertex gets a robust elevation under its class policy,
//! 4. coincident vertices of neighbouring footprints are stitched,
//! 5. footprints are triangulated (with vertical walls at jump edges) and
//!    assembled into an output document.
//!
//! ```no_run
//! use terralift_core::ReconstructionConfig;
//! use terralift_processing::{reconstruct, Scene};
//!
//! let scene: Scene = serde_json::from_str(&std::fs::read_to_string("scene.json")?)?;
//! let policies = ReconstructionConfig::default().resolve()?;
//! let output = reconstruct(scene, policies)?;
//! println!("{} features", output.features.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assembler;
pub mod collector;
pub mod error;
pub mod estimator;
pub mod lifter;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod stitcher;
pub mod store;

pub use assembler::{FeatureGeometry, GeometryAssembler, ReconstructionOutput};
pub use collector::{SampleCollector, SourceStats};
pub use error::{Error, Result};
pub use estimator::{Estimate, HeightEstimator, OutlierReport};
pub use lifter::{LiftedFeature, ProvenanceCounts, VertexLifter};
pub use pipeline::{reconstruct, Reconstruction};
pub use report::{FailureKind, FootprintFailure, PhaseTimings, RunReport, Stage};
pub use source::{PointRecord, PointSource, Scene};
pub use stitcher::{StitchStats, TileStitcher};
pub use store::{FootprintStore, SampleSet};
