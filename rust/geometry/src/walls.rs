// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vertical walls at jump edges
//!
//! Edges are keyed by their snapped 2D endpoints so that the same planar
//! edge seen from two triangles (of one mesh or of two footprints) meets in
//! one bucket. When the sides disagree in elevation by more than the jump
//! threshold, a vertical quad closes the gap from the higher side down to
//! the lower one and belongs to the higher side's owner.

use crate::mesh::{is_degenerate, Mesh};
use nalgebra::Point3;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BTreeMap;

type GridKey = (i64, i64);

/// One side of a planar edge: its owner and its lifted endpoints, ordered
/// to match the edge key.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EdgeSide {
    owner: usize,
    a: Point3<f64>,
    b: Point3<f64>,
}

impl EdgeSide {
    #[inline]
    fn mean_z(&self) -> f64 {
        (self.a.z + self.b.z) * 0.5
    }
}

/// Collects lifted edges from all contributors and synthesizes walls
#[derive(Debug)]
pub struct JumpEdgeIndex {
    snap: f64,
    edges: FxHashMap<(GridKey, GridKey), SmallVec<[EdgeSide; 2]>>,
}

impl JumpEdgeIndex {
    /// Create an index snapping endpoints to a grid of `snap_tolerance`
    pub fn new(snap_tolerance: f64) -> Self {
        Self {
            snap: if snap_tolerance > 0.0 { snap_tolerance } else { 1e-6 },
            edges: FxHashMap::default(),
        }
    }

    #[inline]
    fn grid_key(&self, p: &Point3<f64>) -> GridKey {
        ((p.x / self.snap).round() as i64, (p.y / self.snap).round() as i64)
    }

    /// Register one lifted edge of `owner`. Zero-length edges are ignored.
    pub fn add_edge(&mut self, owner: usize, a: Point3<f64>, b: Point3<f64>) {
        let (ka, kb) = (self.grid_key(&a), self.grid_key(&b));
        if ka == kb {
            return;
        }
        let (key, side) = if ka < kb {
            ((ka, kb), EdgeSide { owner, a, b })
        } else {
            ((kb, ka), EdgeSide { owner, a: b, b: a })
        };
        let sides = self.edges.entry(key).or_default();
        if !sides.contains(&side) {
            sides.push(side);
        }
    }

    /// Register the closed rings of `owner`
    pub fn add_rings(&mut self, owner: usize, rings: &[Vec<Point3<f64>>]) {
        for ring in rings {
            let n = ring.len();
            for i in 0..n {
                self.add_edge(owner, ring[i], ring[(i + 1) % n]);
            }
        }
    }

    /// Register every non-vertical triangle edge of a mesh
    pub fn add_mesh(&mut self, owner: usize, mesh: &Mesh) {
        for (corners, vertical) in mesh.triangles() {
            if vertical {
                continue;
            }
            for k in 0..3 {
                self.add_edge(owner, corners[k], corners[(k + 1) % 3]);
            }
        }
    }

    /// Number of distinct planar edges seen
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Build wall meshes for every jump edge, keyed by owner.
    ///
    /// Sides of an edge are ordered by mean elevation; each consecutive pair
    /// whose endpoint elevations differ by more than `threshold` gets a wall
    /// owned by the higher side.
    pub fn walls(&self, threshold: f64) -> BTreeMap<usize, Mesh> {
        let mut keys: Vec<_> = self.edges.keys().copied().collect();
        keys.sort_unstable();

        let mut out: BTreeMap<usize, Mesh> = BTreeMap::new();
        for key in keys {
            let Some(sides) = self.edges.get(&key) else {
                continue;
            };
            if sides.len() < 2 {
                continue;
            }
            let mut sides = sides.clone();
            sides.sort_by(|p, q| {
                q.mean_z()
                    .total_cmp(&p.mean_z())
                    .then(p.owner.cmp(&q.owner))
            });
            for pair in sides.windows(2) {
                let (hi, lo) = (&pair[0], &pair[1]);
                let jump = (hi.a.z - lo.a.z).abs().max((hi.b.z - lo.b.z).abs());
                if jump <= threshold {
                    continue;
                }
                add_wall_quad(out.entry(hi.owner).or_default(), hi, lo);
            }
        }
        out
    }
}

/// Append the quad between the higher and lower side of an edge, skipping
/// degenerate halves where the sides meet.
fn add_wall_quad(mesh: &mut Mesh, hi: &EdgeSide, lo: &EdgeSide) {
    let tris = [[hi.a, lo.a, lo.b], [hi.a, lo.b, hi.b]];
    for [p, q, r] in tris {
        if is_degenerate(&p, &q, &r) {
            continue;
        }
        let i0 = mesh.add_vertex(p);
        let i1 = mesh.add_vertex(q);
        let i2 = mesh.add_vertex(r);
        mesh.add_wall_triangle(i0, i1, i2);
    }
}

/// Walls inside a single mesh, for surfaces whose triangles do not share
/// vertices along a jump.
pub fn mesh_walls(mesh: &Mesh, threshold: f64, snap_tolerance: f64) -> Mesh {
    let mut index = JumpEdgeIndex::new(snap_tolerance);
    index.add_mesh(0, mesh);
    index.walls(threshold).remove(&0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_triangles(z_left: f64, z_right: f64) -> Mesh {
        // Triangles share the planar edge (0,0)-(0,10) but not its vertices
        let mut m = Mesh::new();
        let a = m.add_vertex(Point3::new(0.0, 0.0, z_left));
        let b = m.add_vertex(Point3::new(0.0, 10.0, z_left));
        let c = m.add_vertex(Point3::new(-5.0, 5.0, z_left));
        m.add_triangle(a, c, b);
        let d = m.add_vertex(Point3::new(0.0, 0.0, z_right));
        let e = m.add_vertex(Point3::new(0.0, 10.0, z_right));
        let f = m.add_vertex(Point3::new(5.0, 5.0, z_right));
        m.add_triangle(d, e, f);
        m
    }

    #[test]
    fn jump_above_threshold_makes_wall() {
        let walls = mesh_walls(&two_triangles(0.0, 10.0), 5.0, 0.001);
        assert_eq!(walls.triangle_count(), 2);
        assert_eq!(walls.wall_triangle_count(), 2);
        // a 10 x 10 vertical quad
        let area: f64 = (0..walls.triangle_count())
            .map(|t| {
                let [a, b, c] = walls.triangle(t);
                (b - a).cross(&(c - a)).norm() * 0.5
            })
            .sum();
        assert_relative_eq!(area, 100.0, epsilon = 1e-9);
        for v in &walls.vertices {
            assert_eq!(v.x, 0.0);
        }
    }

    #[test]
    fn jump_below_threshold_makes_nothing() {
        assert!(mesh_walls(&two_triangles(0.0, 10.0), 20.0, 0.001).is_empty());
        assert!(mesh_walls(&two_triangles(3.0, 3.0), 0.0, 0.001).is_empty());
    }

    #[test]
    fn wall_belongs_to_higher_owner() {
        let mut index = JumpEdgeIndex::new(0.001);
        let low = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(10.0, 0.0, 1.0),
            Point3::new(10.0, 10.0, 1.0),
            Point3::new(0.0, 10.0, 1.0),
        ];
        let high = vec![
            Point3::new(10.0, 0.0, 4.0),
            Point3::new(20.0, 0.0, 4.0),
            Point3::new(20.0, 10.0, 4.0),
            Point3::new(10.0, 10.0, 4.0),
        ];
        index.add_rings(7, &[low]);
        index.add_rings(3, &[high]);
        let walls = index.walls(0.5);
        assert_eq!(walls.len(), 1);
        assert_eq!(walls[&3].wall_triangle_count(), 2);
    }

    #[test]
    fn triangle_half_skipped_when_sides_meet() {
        let mut index = JumpEdgeIndex::new(0.001);
        index.add_edge(0, Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0));
        index.add_edge(1, Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 0.0, 3.0));
        let walls = index.walls(1.0);
        assert_eq!(walls[&1].triangle_count(), 1);
    }

    #[test]
    fn snapping_joins_nearly_equal_endpoints() {
        let mut index = JumpEdgeIndex::new(0.001);
        index.add_edge(0, Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0));
        index.add_edge(1, Point3::new(5.0, 0.0002, 2.0), Point3::new(0.0001, 0.0, 2.0));
        assert_eq!(index.edge_count(), 1);
        assert_eq!(index.walls(1.0)[&1].triangle_count(), 2);
    }
}
