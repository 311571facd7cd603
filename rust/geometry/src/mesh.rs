// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Triangle mesh of a lifted footprint
///
/// Positions stay in f64: georeferenced coordinates lose decimetres in f32.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex positions
    pub vertices: Vec<Point3<f64>>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
    /// Per-triangle flag, true for vertical-wall triangles
    pub vertical: Vec<bool>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with capacity
    pub fn with_capacity(vertex_count: usize, triangle_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            indices: Vec::with_capacity(triangle_count * 3),
            vertical: Vec::with_capacity(triangle_count),
        }
    }

    /// Add a vertex, returning its index
    #[inline]
    pub fn add_vertex(&mut self, position: Point3<f64>) -> u32 {
        self.vertices.push(position);
        (self.vertices.len() - 1) as u32
    }

    /// Add a surface triangle
    #[inline]
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.push(i0);
        self.indices.push(i1);
        self.indices.push(i2);
        self.vertical.push(false);
    }

    /// Add a vertical-wall triangle
    #[inline]
    pub fn add_wall_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.add_triangle(i0, i1, i2);
        if let Some(last) = self.vertical.last_mut() {
            *last = true;
        }
    }

    /// Merge another mesh into this one
    #[inline]
    pub fn merge(&mut self, other: &Mesh) {
        if other.is_empty() {
            return;
        }

        let vertex_offset = self.vertices.len() as u32;

        self.vertices.extend_from_slice(&other.vertices);
        self.indices
            .extend(other.indices.iter().map(|&i| i + vertex_offset));
        self.vertical.extend_from_slice(&other.vertical);
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get triangle count
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of triangles flagged as vertical walls
    pub fn wall_triangle_count(&self) -> usize {
        self.vertical.iter().filter(|&&v| v).count()
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Corner positions of triangle `t`
    #[inline]
    pub fn triangle(&self, t: usize) -> [Point3<f64>; 3] {
        let i = &self.indices[t * 3..t * 3 + 3];
        [
            self.vertices[i[0] as usize],
            self.vertices[i[1] as usize],
            self.vertices[i[2] as usize],
        ]
    }

    /// Iterate triangles with their vertical flag
    pub fn triangles(&self) -> impl Iterator<Item = ([Point3<f64>; 3], bool)> + '_ {
        (0..self.triangle_count()).map(move |t| (self.triangle(t), self.vertical[t]))
    }

    /// Sum of triangle areas projected onto the XY plane, walls excluded
    pub fn projected_area(&self) -> f64 {
        self.triangles()
            .filter(|(_, vertical)| !vertical)
            .map(|([a, b, c], _)| {
                ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs() * 0.5
            })
            .sum()
    }

    /// Calculate bounds (min, max)
    #[inline]
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        if self.is_empty() {
            return None;
        }

        let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);

        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }

        Some((min, max))
    }

    /// Unit normal of triangle `t`, `None` when degenerate
    pub fn triangle_normal(&self, t: usize) -> Option<Vector3<f64>> {
        let [a, b, c] = self.triangle(t);
        (b - a).cross(&(c - a)).try_normalize(1e-12)
    }

    /// Clear the mesh
    #[inline]
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.vertical.clear();
    }
}

/// Whether three points span a non-zero area in 3D
#[inline]
pub fn is_degenerate(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    (b - a).cross(&(c - a)).norm_squared() < 1e-18
}
