// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Footprints, elevation samples and lifted vertices.

use crate::bounds::BBox2;
use crate::class::FeatureClass;
use crate::error::{Error, Result};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute values carried through from the vector input, untouched.
pub type AttributeMap = BTreeMap<String, String>;

/// An open ring of 2D points; the closing edge runs from the last vertex back
/// to the first.
pub type Ring = Vec<Point2<f64>>;

/// One real-world feature's outline with its class tag and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Unique identifier
    pub id: String,
    /// Feature class, selects the class policy
    pub class: FeatureClass,
    /// Outer boundary
    pub outer: Ring,
    /// Holes
    #[serde(default)]
    pub holes: Vec<Ring>,
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Source layer name, if the vector input had several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

impl Footprint {
    /// Create a footprint without holes.
    pub fn new(id: impl Into<String>, class: FeatureClass, outer: Ring) -> Self {
        Self {
            id: id.into(),
            class,
            outer: open_ring(outer),
            holes: Vec::new(),
            attributes: AttributeMap::new(),
            layer: None,
        }
    }

    /// Builder-style hole insertion.
    pub fn with_hole(mut self, hole: Ring) -> Self {
        self.holes.push(open_ring(hole));
        self
    }

    /// Builder-style attribute insertion.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Normalize rings read from a document: drop repeated closing vertices.
    pub fn normalized(mut self) -> Self {
        self.outer = open_ring(std::mem::take(&mut self.outer));
        self.holes = std::mem::take(&mut self.holes)
            .into_iter()
            .map(open_ring)
            .collect();
        self
    }

    /// All rings, outer first.
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.outer).chain(self.holes.iter())
    }

    pub fn ring_count(&self) -> usize {
        1 + self.holes.len()
    }

    /// Total number of boundary vertices across all rings.
    pub fn vertex_count(&self) -> usize {
        self.rings().map(|r| r.len()).sum()
    }

    /// Planar bounding box of the outer ring.
    pub fn bbox(&self) -> BBox2 {
        BBox2::from_points(&self.outer)
    }

    /// Check every ring has at least three distinct vertices.
    pub fn check_rings(&self) -> Result<()> {
        for (ring, points) in self.rings().enumerate() {
            let mut distinct = 0usize;
            for (i, p) in points.iter().enumerate() {
                let prev = &points[(i + points.len() - 1) % points.len()];
                if p != prev {
                    distinct += 1;
                }
            }
            if distinct < 3 {
                return Err(Error::DegenerateRing {
                    id: self.id.clone(),
                    ring,
                    count: distinct,
                });
            }
        }
        Ok(())
    }
}

/// Drop a repeated closing vertex, if present.
fn open_ring(mut ring: Ring) -> Ring {
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Where a sample was accepted: near a boundary vertex or inside the polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleTarget {
    /// Within the sampling radius of a boundary vertex (ring, vertex).
    Vertex { ring: u32, vertex: u32 },
    /// Inside the polygon.
    Interior,
}

/// One point-cloud sample accepted for a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationSample {
    pub position: Point2<f64>,
    pub z: f64,
    /// Source classification code
    pub classification: u8,
    /// True when the sample fell inside the polygon
    pub within: bool,
    /// Sampling radius used to accept it
    pub radius: f64,
}

/// How a vertex got its elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Percentile of the vertex's own samples
    Estimated,
    /// Copied from the nearest vertex with data, or the footprint aggregate
    Fallback,
    /// Footprint-wide flatten aggregate
    Flattened,
    /// Reconciled with coincident vertices of neighbouring footprints
    Stitched,
}

/// A boundary vertex with its assigned elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiftedVertex {
    pub position: Point2<f64>,
    pub z: f64,
    pub provenance: Provenance,
}

impl LiftedVertex {
    pub fn new(position: Point2<f64>, z: f64, provenance: Provenance) -> Self {
        Self {
            position,
            z,
            provenance,
        }
    }

    #[inline]
    pub fn to_point3(&self) -> Point3<f64> {
        Point3::new(self.position.x, self.position.y, self.z)
    }
}
