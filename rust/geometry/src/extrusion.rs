// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building blocks - lifting footprints into LoD1 prisms

use crate::error::Result;
use crate::mesh::Mesh;
use crate::polygon::{signed_area, validate_rings};
use crate::triangulation::{dedup_ring, triangulate_polygon_with_holes};
use nalgebra::{Point2, Point3};

/// Extrude a building footprint into a flat-roofed block.
///
/// `rings` carry the lifted ground elevation of every vertex, outer ring
/// first. The roof cap sits at `roof_z`; walls run from each vertex's
/// ground elevation up to the roof and are flagged vertical. With
/// `include_floor` the block is closed at ground level.
pub fn extrude_block(rings: &[Vec<Point3<f64>>], roof_z: f64, include_floor: bool) -> Result<Mesh> {
    let rings = oriented_rings(rings)?;
    let flat: Vec<Vec<Point2<f64>>> = rings
        .iter()
        .map(|r| r.iter().map(|p| Point2::new(p.x, p.y)).collect())
        .collect();
    let indices = triangulate_polygon_with_holes(&flat[0], &flat[1..])?;

    let total: usize = rings.iter().map(|r| r.len()).sum();
    let cap_count = if include_floor { 2 } else { 1 };
    let mut mesh = Mesh::with_capacity(total * (cap_count + 4), indices.len() / 3 * cap_count + total * 2);

    create_cap_mesh(&rings, &indices, Some(roof_z), false, &mut mesh);
    if include_floor {
        create_cap_mesh(&rings, &indices, None, true, &mut mesh);
    }
    for ring in &rings {
        create_side_walls(ring, roof_z, &mut mesh);
    }

    Ok(mesh)
}

/// Outer ring counter-clockwise, holes clockwise, so wall and cap windings
/// face outwards.
fn oriented_rings(rings: &[Vec<Point3<f64>>]) -> Result<Vec<Vec<Point3<f64>>>> {
    let mut out: Vec<Vec<Point3<f64>>> = rings.iter().map(|r| dedup_ring(r)).collect();
    let flat: Vec<Vec<Point2<f64>>> = out
        .iter()
        .map(|r| r.iter().map(|p| Point2::new(p.x, p.y)).collect())
        .collect();
    let refs: Vec<&[Point2<f64>]> = flat.iter().map(|r| r.as_slice()).collect();
    if refs.is_empty() {
        return Err(crate::Error::degenerate(0, "no rings"));
    }
    validate_rings(&refs)?;

    for (i, ring) in out.iter_mut().enumerate() {
        let ccw = signed_area(&flat[i]) > 0.0;
        if (i == 0) != ccw {
            ring.reverse();
        }
    }
    Ok(out)
}

/// Create a cap from the ring triangulation, at `z` or at each vertex's own
/// elevation when `z` is `None`.
fn create_cap_mesh(
    rings: &[Vec<Point3<f64>>],
    indices: &[usize],
    z: Option<f64>,
    facing_down: bool,
    mesh: &mut Mesh,
) {
    let base_index = mesh.vertex_count() as u32;

    for p in rings.iter().flatten() {
        mesh.add_vertex(Point3::new(p.x, p.y, z.unwrap_or(p.z)));
    }

    for t in indices.chunks_exact(3) {
        let i0 = base_index + t[0] as u32;
        let i1 = base_index + t[1] as u32;
        let i2 = base_index + t[2] as u32;
        let [a, b, c] = [&mesh.vertices[i0 as usize], &mesh.vertices[i1 as usize], &mesh.vertices[i2 as usize]];
        let up = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x) > 0.0;
        if up != facing_down {
            mesh.add_triangle(i0, i1, i2);
        } else {
            mesh.add_triangle(i0, i2, i1);
        }
    }
}

/// Create walls for one ring from ground elevations up to `top`
fn create_side_walls(boundary: &[Point3<f64>], top: f64, mesh: &mut Mesh) {
    for i in 0..boundary.len() {
        let j = (i + 1) % boundary.len();

        let p0 = &boundary[i];
        let p1 = &boundary[j];

        let v0_bottom = Point3::new(p0.x, p0.y, p0.z.min(top));
        let v1_bottom = Point3::new(p1.x, p1.y, p1.z.min(top));
        let v0_top = Point3::new(p0.x, p0.y, top);
        let v1_top = Point3::new(p1.x, p1.y, top);

        // Roof resting on the ground at both ends
        if v0_bottom.z == top && v1_bottom.z == top {
            continue;
        }

        let idx = mesh.vertex_count() as u32;
        mesh.add_vertex(v0_bottom);
        mesh.add_vertex(v1_bottom);
        mesh.add_vertex(v1_top);
        mesh.add_vertex(v0_top);

        if v1_bottom.z < top {
            mesh.add_wall_triangle(idx, idx + 1, idx + 2);
        }
        if v0_bottom.z < top {
            mesh.add_wall_triangle(idx, idx + 2, idx + 3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn footprint(ground: [f64; 4]) -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, ground[0]),
            Point3::new(10.0, 0.0, ground[1]),
            Point3::new(10.0, 6.0, ground[2]),
            Point3::new(0.0, 6.0, ground[3]),
        ]
    }

    #[test]
    fn block_is_closed_at_roof() {
        let mesh = extrude_block(&[footprint([1.0; 4])], 12.0, true).unwrap();
        // roof 2 + floor 2 + 4 walls x 2
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.wall_triangle_count(), 8);

        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min.z, 1.0);
        assert_eq!(max.z, 12.0);

        // roof triangles face up, floor triangles face down
        for t in 0..mesh.triangle_count() {
            if mesh.vertical[t] {
                continue;
            }
            let n = mesh.triangle_normal(t).unwrap();
            let [a, _, _] = mesh.triangle(t);
            if a.z == 12.0 {
                assert!(n.z > 0.99);
            } else {
                assert!(n.z < -0.99);
            }
        }
    }

    #[test]
    fn walls_follow_ground_and_face_outwards() {
        // clockwise input is reoriented
        let mut ring = footprint([0.0, 1.0, 2.0, 3.0]);
        ring.reverse();
        let mesh = extrude_block(&[ring], 10.0, false).unwrap();
        assert_eq!(mesh.wall_triangle_count(), 8);

        let mut wall_area = 0.0;
        for t in 0..mesh.triangle_count() {
            if !mesh.vertical[t] {
                continue;
            }
            let [a, b, c] = mesh.triangle(t);
            wall_area += (b - a).cross(&(c - a)).norm() * 0.5;
            let centroid = (a.coords + b.coords + c.coords) / 3.0;
            let n = mesh.triangle_normal(t).unwrap();
            let outward = nalgebra::Vector3::new(centroid.x - 5.0, centroid.y - 3.0, 0.0);
            assert!(n.dot(&outward) > 0.0);
        }
        // trapezoids: bottom edge (0,0)->(10,0) from z 0/1 etc.
        let expected = 10.0 * (10.0 + 9.0) / 2.0
            + 6.0 * (9.0 + 8.0) / 2.0
            + 10.0 * (8.0 + 7.0) / 2.0
            + 6.0 * (7.0 + 10.0) / 2.0;
        assert_relative_eq!(wall_area, expected, epsilon = 1e-9);
    }

    #[test]
    fn roof_below_ground_collapses_walls() {
        let mesh = extrude_block(&[footprint([5.0; 4])], 5.0, false).unwrap();
        assert_eq!(mesh.wall_triangle_count(), 0);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn courtyard_hole_gets_walls() {
        let outer = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(20.0, 0.0, 0.0),
            Point3::new(20.0, 20.0, 0.0),
            Point3::new(0.0, 20.0, 0.0),
        ];
        let hole = vec![
            Point3::new(5.0, 5.0, 0.0),
            Point3::new(15.0, 5.0, 0.0),
            Point3::new(15.0, 15.0, 0.0),
            Point3::new(5.0, 15.0, 0.0),
        ];
        let mesh = extrude_block(&[outer, hole], 8.0, false).unwrap();
        assert_eq!(mesh.wall_triangle_count(), 16);
        assert_relative_eq!(mesh.projected_area(), 300.0, epsilon = 1e-9);
    }
}
