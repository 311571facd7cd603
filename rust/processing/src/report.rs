// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run statistics and per-footprint failures.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use terralift_core::FeatureClass;

/// Pipeline stage a footprint failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lift,
    Triangulate,
}

/// Why a footprint failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No usable elevation samples
    NoData,
    /// Degenerate or self-intersecting rings
    DegenerateGeometry,
    /// Triangulation failed on valid rings
    Triangulation,
}

impl From<&Error> for FailureKind {
    fn from(e: &Error) -> Self {
        use terralift_geometry::Error as G;
        match e {
            Error::NoData => FailureKind::NoData,
            Error::Geometry(G::DegenerateRing { .. } | G::SelfIntersection { .. }) => {
                FailureKind::DegenerateGeometry
            }
            Error::Core(terralift_core::Error::DegenerateRing { .. }) => FailureKind::DegenerateGeometry,
            _ => FailureKind::Triangulation,
        }
    }
}

/// One excluded footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintFailure {
    pub id: String,
    pub class: FeatureClass,
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl FootprintFailure {
    pub fn new(id: impl Into<String>, class: FeatureClass, stage: Stage, error: &Error) -> Self {
        Self {
            id: id.into(),
            class,
            stage,
            kind: FailureKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Wall-clock time per phase, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub ingest_ms: u64,
    pub lift_ms: u64,
    pub stitch_ms: u64,
    pub triangulate_ms: u64,
    pub walls_ms: u64,
    pub total_ms: u64,
}

/// Summary of a reconstruction run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Footprints handed to the run
    pub footprints_total: usize,
    /// Footprints outside the requested extent
    pub footprints_outside_extent: usize,
    /// Footprints that produced geometry
    pub footprints_reconstructed: usize,
    /// True when a requested extent was invalid and ignored
    pub extent_ignored: bool,
    /// Points delivered after thinning and class omission
    pub points_delivered: usize,
    /// Samples recorded across all footprints
    pub samples_recorded: usize,
    /// Samples discarded by the outlier filter
    pub outliers_discarded: usize,
    /// Vertex groups shared between footprints
    pub stitch_groups: usize,
    /// Vertices whose elevation changed while stitching
    pub vertices_stitched: usize,
    /// Vertical-wall triangles between footprints
    pub wall_triangles: usize,
    pub timings: PhaseTimings,
    pub failures: Vec<FootprintFailure>,
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Failures in a stable order
    pub fn sort_failures(&mut self) {
        self.failures.sort_by(|a, b| a.id.cmp(&b.id).then((a.stage as u8).cmp(&(b.stage as u8))));
    }
}
