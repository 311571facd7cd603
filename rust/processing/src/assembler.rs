// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-feature output packaging

use crate::lifter::{LiftedFeature, ProvenanceCounts};
use crate::report::RunReport;
use serde::{Deserialize, Serialize};
use terralift_core::{AttributeMap, FeatureClass, Footprint, Point3};
use terralift_geometry::Mesh;

/// Final geometry of one footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGeometry {
    pub id: String,
    pub class: FeatureClass,
    #[serde(default, skip_serializing_if = "AttributeMap::is_empty")]
    pub attributes: AttributeMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// Lifted boundary, outer ring first
    pub rings: Vec<Vec<Point3<f64>>>,
    pub mesh: Mesh,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roof_z: Option<f64>,
    pub provenance: ProvenanceCounts,
}

/// Result document of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionOutput {
    /// Ordered by id
    pub features: Vec<FeatureGeometry>,
    pub report: RunReport,
}

impl ReconstructionOutput {
    pub fn feature(&self, id: &str) -> Option<&FeatureGeometry> {
        self.features
            .binary_search_by(|f| f.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.features[i])
    }

    pub fn total_triangles(&self) -> usize {
        self.features.iter().map(|f| f.mesh.triangle_count()).sum()
    }
}

/// Collects assembled features
#[derive(Debug, Default)]
pub struct GeometryAssembler {
    features: Vec<FeatureGeometry>,
}

impl GeometryAssembler {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            features: Vec::with_capacity(n),
        }
    }

    pub fn add(&mut self, footprint: &Footprint, lifted: &LiftedFeature, mesh: Mesh) {
        self.features.push(FeatureGeometry {
            id: footprint.id.clone(),
            class: footprint.class,
            attributes: footprint.attributes.clone(),
            layer: footprint.layer.clone(),
            rings: lifted.ring_points(),
            mesh,
            roof_z: lifted.roof_z,
            provenance: lifted.provenance_counts(),
        });
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn finish(mut self, mut report: RunReport) -> ReconstructionOutput {
        self.features.sort_by(|a, b| a.id.cmp(&b.id));
        report.footprints_reconstructed = self.features.len();
        report.sort_failures();
        ReconstructionOutput {
            features: self.features,
            report,
        }
    }
}
