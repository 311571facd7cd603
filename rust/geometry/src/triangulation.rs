// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Constrained surface triangulation
//!
//! Lifted rings are ear-clipped with earcutr, interior points are inserted
//! as Steiner points where they change the surface by more than a vertical
//! tolerance, and a bounded Lawson pass flips non-ring edges towards a
//! Delaunay configuration. Vertex elevations are never re-interpolated.

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::polygon::{distance_to_boundary, orient2d, validate_rings};
use nalgebra::{Point2, Point3};
use rstar::{RTree, RTreeObject, AABB};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use terralift_core::TinPolicy;

/// Check if a polygon is convex (all cross products have same sign)
#[inline]
fn is_convex(points: &[Point2<f64>]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let n = points.len();
    let mut sign = 0i8;

    for i in 0..n {
        let p0 = &points[i];
        let p1 = &points[(i + 1) % n];
        let p2 = &points[(i + 2) % n];

        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);

        if cross.abs() > 1e-10 {
            let current_sign = if cross > 0.0 { 1i8 } else { -1i8 };
            if sign == 0 {
                sign = current_sign;
            } else if sign != current_sign {
                return false;
            }
        }
    }

    true
}

/// Simple fan triangulation for convex polygons
#[inline]
fn fan_triangulate(n: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity((n - 2) * 3);
    for i in 1..n - 1 {
        indices.push(0);
        indices.push(i);
        indices.push(i + 1);
    }
    indices
}

/// Triangulate a simple polygon (no holes)
/// Returns triangle indices into the input points
#[inline]
pub fn triangulate_polygon(points: &[Point2<f64>]) -> Result<Vec<usize>> {
    let n = points.len();

    if n < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points to triangulate".to_string(),
        ));
    }

    if n == 3 {
        return Ok(vec![0, 1, 2]);
    }

    if n <= 8 && is_convex(points) {
        return Ok(fan_triangulate(n));
    }

    let mut vertices = Vec::with_capacity(n * 2);
    for p in points {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    earcutr::earcut(&vertices, &[], 2).map_err(|e| Error::TriangulationError(format!("{:?}", e)))
}

/// Triangulate a polygon with holes
/// Returns triangle indices into the combined vertex array (outer + all holes)
pub fn triangulate_polygon_with_holes(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
) -> Result<Vec<usize>> {
    if outer.len() < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points in outer boundary".to_string(),
        ));
    }
    if holes.iter().any(|h| h.len() < 3) {
        return Err(Error::TriangulationError(
            "Need at least 3 points in every hole".to_string(),
        ));
    }

    if holes.is_empty() {
        return triangulate_polygon(outer);
    }

    let total_points: usize = outer.len() + holes.iter().map(|h| h.len()).sum::<usize>();
    let mut vertices = Vec::with_capacity(total_points * 2);

    for p in outer {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let mut hole_indices = Vec::with_capacity(holes.len());
    for hole in holes {
        hole_indices.push(vertices.len() / 2);
        for p in hole {
            vertices.push(p.x);
            vertices.push(p.y);
        }
    }

    earcutr::earcut(&vertices, &hole_indices, 2)
        .map_err(|e| Error::TriangulationError(format!("{:?}", e)))
}

/// Drop repeated consecutive positions (and a repeated closing vertex)
pub fn dedup_ring(ring: &[Point3<f64>]) -> Vec<Point3<f64>> {
    let same = |a: &Point3<f64>, b: &Point3<f64>| a.x == b.x && a.y == b.y;
    let mut out: Vec<Point3<f64>> = Vec::with_capacity(ring.len());
    for p in ring {
        if out.last().map_or(true, |q| !same(q, p)) {
            out.push(*p);
        }
    }
    while out.len() > 1 && same(&out[0], &out[out.len() - 1]) {
        out.pop();
    }
    out
}

#[inline]
fn xy(p: &Point3<f64>) -> Point2<f64> {
    Point2::new(p.x, p.y)
}

#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Positive when `d` lies inside the circumcircle of counter-clockwise (a, b, c)
#[inline]
fn in_circle(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, d: &Point2<f64>) -> f64 {
    let (adx, ady) = (a.x - d.x, a.y - d.y);
    let (bdx, bdy) = (b.x - d.x, b.y - d.y);
    let (cdx, cdy) = (c.x - d.x, c.y - d.y);
    (adx * adx + ady * ady) * (bdx * cdy - cdx * bdy)
        + (bdx * bdx + bdy * bdy) * (cdx * ady - adx * cdy)
        + (cdx * cdx + cdy * cdy) * (adx * bdy - bdx * ady)
}

/// Steiner point and edge-flip settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteinerOptions {
    /// Keep one of every N candidate points (0 and 1 keep all)
    pub simplification: u32,
    /// Minimum vertical deviation from the current surface for insertion
    pub tolerance: f64,
    /// Candidates closer than this to a ring are dropped
    pub inner_buffer: f64,
    /// Upper bound on Lawson flip passes
    pub max_flip_passes: usize,
}

impl Default for SteinerOptions {
    fn default() -> Self {
        Self {
            simplification: 0,
            tolerance: 0.0,
            inner_buffer: 0.0,
            max_flip_passes: 16,
        }
    }
}

impl From<&TinPolicy> for SteinerOptions {
    fn from(p: &TinPolicy) -> Self {
        Self {
            simplification: p.simplification,
            tolerance: p.simplification_tolerance,
            inner_buffer: p.inner_buffer,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct RootTriangle {
    root: u32,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for RootTriangle {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// Triangulated irregular network over lifted rings
///
/// Triangles are stored counter-clockwise. Ring edges are constraints and
/// are never flipped.
#[derive(Debug, Clone)]
pub struct Tin {
    points: Vec<Point3<f64>>,
    triangles: Vec<[u32; 3]>,
    constraints: FxHashSet<(u32, u32)>,
}

impl Tin {
    /// Triangulate lifted rings, outer ring first.
    ///
    /// Rings are validated: fewer than three distinct vertices, zero area,
    /// crossing edges or misplaced holes are rejected.
    pub fn from_rings(rings: &[Vec<Point3<f64>>]) -> Result<Self> {
        if rings.is_empty() {
            return Err(Error::degenerate(0, "no rings"));
        }
        let rings: Vec<Vec<Point3<f64>>> = rings.iter().map(|r| dedup_ring(r)).collect();
        let flat: Vec<Vec<Point2<f64>>> = rings.iter().map(|r| r.iter().map(xy).collect()).collect();
        let refs: Vec<&[Point2<f64>]> = flat.iter().map(|r| r.as_slice()).collect();
        validate_rings(&refs)?;

        let indices = triangulate_polygon_with_holes(&flat[0], &flat[1..])?;
        if indices.is_empty() {
            return Err(Error::TriangulationError("ear clipping produced no triangles".to_string()));
        }

        let mut points = Vec::with_capacity(rings.iter().map(|r| r.len()).sum());
        let mut constraints = FxHashSet::default();
        for ring in &rings {
            let start = points.len() as u32;
            let n = ring.len() as u32;
            points.extend_from_slice(ring);
            for i in 0..n {
                constraints.insert(edge_key(start + i, start + (i + 1) % n));
            }
        }

        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for t in indices.chunks_exact(3) {
            let (a, b, c) = (t[0] as u32, t[1] as u32, t[2] as u32);
            let o = orient2d(&xy(&points[a as usize]), &xy(&points[b as usize]), &xy(&points[c as usize]));
            if o > 0.0 {
                triangles.push([a, b, c]);
            } else if o < 0.0 {
                triangles.push([a, c, b]);
            }
            // collinear ears carry no area
        }

        Ok(Self {
            points,
            triangles,
            constraints,
        })
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    #[inline]
    fn corner(&self, i: u32) -> Point2<f64> {
        xy(&self.points[i as usize])
    }

    /// Insert candidate points in the given order.
    ///
    /// A candidate is inserted into its containing triangle when its
    /// elevation deviates from the interpolated surface by more than
    /// `tolerance`; points outside the polygon, inside holes or on an
    /// existing edge are skipped. Returns the number inserted.
    pub fn insert_points(&mut self, candidates: &[Point3<f64>], tolerance: f64) -> usize {
        if candidates.is_empty() || self.triangles.is_empty() {
            return 0;
        }

        // Inserted points only ever split triangles, so every current
        // triangle stays inside the triangle it descends from.
        let roots: Vec<RootTriangle> = self
            .triangles
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let (a, b, c) = (self.corner(t[0]), self.corner(t[1]), self.corner(t[2]));
                RootTriangle {
                    root: i as u32,
                    env: AABB::from_corners(
                        [a.x.min(b.x).min(c.x), a.y.min(b.y).min(c.y)],
                        [a.x.max(b.x).max(c.x), a.y.max(b.y).max(c.y)],
                    ),
                }
            })
            .collect();
        let tree = RTree::bulk_load(roots);
        let mut descendants: Vec<SmallVec<[u32; 4]>> =
            (0..self.triangles.len() as u32).map(|i| SmallVec::from_elem(i, 1)).collect();

        let mut inserted = 0;
        for p in candidates {
            let q = Point2::new(p.x, p.y);
            let located = tree
                .locate_in_envelope_intersecting(&AABB::from_point([q.x, q.y]))
                .find_map(|r| {
                    descendants[r.root as usize]
                        .iter()
                        .find_map(|&t| self.barycentric(t, &q).map(|l| (r.root, t, l)))
                });

            let Some((root, t, l)) = located else {
                continue;
            };
            if l.iter().any(|&w| w <= 1e-9) {
                continue;
            }
            let [a, b, c] = self.triangles[t as usize];
            let surface = l[0] * self.points[a as usize].z
                + l[1] * self.points[b as usize].z
                + l[2] * self.points[c as usize].z;
            if (p.z - surface).abs() <= tolerance {
                continue;
            }

            let v = self.points.len() as u32;
            self.points.push(*p);
            self.triangles[t as usize] = [a, b, v];
            let t1 = self.triangles.len() as u32;
            self.triangles.push([b, c, v]);
            self.triangles.push([c, a, v]);
            descendants[root as usize].push(t1);
            descendants[root as usize].push(t1 + 1);
            inserted += 1;
        }
        inserted
    }

    /// Barycentric weights of `q` in triangle `t`, `None` when outside
    fn barycentric(&self, t: u32, q: &Point2<f64>) -> Option<[f64; 3]> {
        let [a, b, c] = self.triangles[t as usize];
        let (a, b, c) = (self.corner(a), self.corner(b), self.corner(c));
        let area = orient2d(&a, &b, &c);
        if area <= 0.0 {
            return None;
        }
        let l = [
            orient2d(&b, &c, q) / area,
            orient2d(&c, &a, q) / area,
            orient2d(&a, &b, q) / area,
        ];
        if l.iter().all(|&w| w >= -1e-12) {
            Some(l)
        } else {
            None
        }
    }

    /// Lawson edge flipping, at most `max_passes` sweeps.
    ///
    /// Returns the number of flips performed.
    pub fn flip_edges(&mut self, max_passes: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_passes {
            let mut edges: FxHashMap<(u32, u32), SmallVec<[u32; 2]>> = FxHashMap::default();
            for (i, t) in self.triangles.iter().enumerate() {
                for k in 0..3 {
                    edges
                        .entry(edge_key(t[k], t[(k + 1) % 3]))
                        .or_default()
                        .push(i as u32);
                }
            }

            let mut touched = vec![false; self.triangles.len()];
            let mut flips = 0;
            for t in 0..self.triangles.len() {
                for k in 0..3 {
                    if touched[t] {
                        break;
                    }
                    let tri = self.triangles[t];
                    let (a, b, c) = (tri[k], tri[(k + 1) % 3], tri[(k + 2) % 3]);
                    let key = edge_key(a, b);
                    if self.constraints.contains(&key) {
                        continue;
                    }
                    let Some(owners) = edges.get(&key) else {
                        continue;
                    };
                    if owners.len() != 2 {
                        continue;
                    }
                    let other = (if owners[0] as usize == t { owners[1] } else { owners[0] }) as usize;
                    if other == t || touched[other] {
                        continue;
                    }
                    let Some(&d) = self.triangles[other].iter().find(|&&v| v != a && v != b) else {
                        continue;
                    };

                    let (pa, pb, pc, pd) = (self.corner(a), self.corner(b), self.corner(c), self.corner(d));
                    if in_circle(&pa, &pb, &pc, &pd) <= 1e-12 {
                        continue;
                    }
                    if orient2d(&pa, &pd, &pc) <= 0.0 || orient2d(&pd, &pb, &pc) <= 0.0 {
                        continue;
                    }

                    self.triangles[t] = [a, d, c];
                    self.triangles[other] = [d, b, c];
                    touched[t] = true;
                    touched[other] = true;
                    flips += 1;
                }
            }

            total += flips;
            if flips == 0 {
                break;
            }
        }
        total
    }

    /// Convert into a mesh carrying the vertices' own elevations
    pub fn into_mesh(self) -> Mesh {
        let mut mesh = Mesh::with_capacity(self.points.len(), self.triangles.len());
        for p in self.points {
            mesh.add_vertex(p);
        }
        for [a, b, c] in self.triangles {
            mesh.add_triangle(a, b, c);
        }
        mesh
    }
}

/// Prepare interior candidates: deterministic order, thinning, inner buffer
pub fn select_steiner_candidates(
    rings: &[Vec<Point3<f64>>],
    interior: &[Point3<f64>],
    options: &SteinerOptions,
) -> Vec<Point3<f64>> {
    let mut candidates = interior.to_vec();
    candidates.sort_by(|p, q| {
        p.x.total_cmp(&q.x)
            .then(p.y.total_cmp(&q.y))
            .then(p.z.total_cmp(&q.z))
    });

    let keep = options.simplification.max(1) as usize;
    let flat: Vec<Vec<Point2<f64>>> = rings.iter().map(|r| r.iter().map(xy).collect()).collect();
    candidates
        .into_iter()
        .step_by(keep)
        .filter(|p| {
            options.inner_buffer <= 0.0
                || distance_to_boundary(&xy(p), flat.iter().map(|r| r.as_slice())) >= options.inner_buffer
        })
        .collect()
}

/// Triangulate a lifted surface with optional interior points
pub fn triangulate_surface(
    rings: &[Vec<Point3<f64>>],
    interior: &[Point3<f64>],
    options: &SteinerOptions,
) -> Result<Mesh> {
    let mut tin = Tin::from_rings(rings)?;
    if !interior.is_empty() {
        let candidates = select_steiner_candidates(rings, interior, options);
        tin.insert_points(&candidates, options.tolerance);
    }
    tin.flip_edges(options.max_flip_passes);
    Ok(tin.into_mesh())
}
