// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar polygon predicates
//!
//! Rings are open point lists; the closing edge runs from the last vertex
//! back to the first.

use crate::error::{Error, Result};
use nalgebra::Point2;

const EPSILON: f64 = 1e-12;

/// Signed area of a ring (positive when counter-clockwise)
#[inline]
pub fn signed_area(ring: &[Point2<f64>]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let p = &ring[i];
        let q = &ring[(i + 1) % n];
        sum += p.x * q.y - q.x * p.y;
    }
    sum * 0.5
}

/// Area of a polygon with holes
pub fn polygon_area(outer: &[Point2<f64>], holes: &[Vec<Point2<f64>>]) -> f64 {
    signed_area(outer).abs() - holes.iter().map(|h| signed_area(h).abs()).sum::<f64>()
}

/// Twice the signed area of triangle (a, b, c)
#[inline]
pub fn orient2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Even-odd point in ring test. Points on the boundary may go either way.
pub fn point_in_ring(p: &Point2<f64>, ring: &[Point2<f64>]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Inside the outer ring and outside every hole
pub fn point_in_polygon(p: &Point2<f64>, outer: &[Point2<f64>], holes: &[Vec<Point2<f64>>]) -> bool {
    point_in_ring(p, outer) && !holes.iter().any(|h| point_in_ring(p, h))
}

/// Squared distance from `p` to segment `a`-`b`
#[inline]
pub fn distance_sq_to_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < EPSILON {
        return (p - a).norm_squared();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm_squared()
}

/// Distance from `p` to the nearest edge of any ring
pub fn distance_to_boundary<'a>(
    p: &Point2<f64>,
    rings: impl IntoIterator<Item = &'a [Point2<f64>]>,
) -> f64 {
    let mut best = f64::INFINITY;
    for ring in rings {
        let n = ring.len();
        for i in 0..n {
            best = best.min(distance_sq_to_segment(p, &ring[i], &ring[(i + 1) % n]));
        }
    }
    best.sqrt()
}

/// Proper or touching intersection of segments p1-p2 and q1-q2
fn segments_intersect(p1: &Point2<f64>, p2: &Point2<f64>, q1: &Point2<f64>, q2: &Point2<f64>) -> bool {
    let d1 = orient2d(q1, q2, p1);
    let d2 = orient2d(q1, q2, p2);
    let d3 = orient2d(p1, p2, q1);
    let d4 = orient2d(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    let on_segment = |a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>| {
        c.x >= a.x.min(b.x) && c.x <= a.x.max(b.x) && c.y >= a.y.min(b.y) && c.y <= a.y.max(b.y)
    };
    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

/// Find a pair of crossing edges across all rings.
///
/// Adjacent edges of the same ring share an endpoint and are not compared.
/// Returns the ring indices of the first crossing found.
pub fn find_self_intersection(rings: &[&[Point2<f64>]]) -> Option<(usize, usize)> {
    let mut edges: Vec<(usize, usize, Point2<f64>, Point2<f64>)> = Vec::new();
    for (r, ring) in rings.iter().enumerate() {
        let n = ring.len();
        for i in 0..n {
            edges.push((r, i, ring[i], ring[(i + 1) % n]));
        }
    }

    // Sweep on min x to skip most pairs
    edges.sort_by(|a, b| a.2.x.min(a.3.x).total_cmp(&b.2.x.min(b.3.x)));

    for i in 0..edges.len() {
        let (ri, ei, a1, a2) = edges[i];
        let max_x = a1.x.max(a2.x);
        for &(rj, ej, b1, b2) in &edges[i + 1..] {
            if b1.x.min(b2.x) > max_x {
                break;
            }
            if ri == rj {
                let n = rings[ri].len();
                if ei == ej || (ei + 1) % n == ej || (ej + 1) % n == ei {
                    continue;
                }
            }
            if segments_intersect(&a1, &a2, &b1, &b2) {
                return Some((ri.min(rj), ri.max(rj)));
            }
        }
    }
    None
}

/// Validate a polygon before triangulation.
///
/// Every ring needs three distinct vertices and a non-zero area, and no two
/// edges may cross or touch except at shared ring vertices. Holes must lie
/// inside the outer ring and outside each other.
pub fn validate_rings(rings: &[&[Point2<f64>]]) -> Result<()> {
    for (r, ring) in rings.iter().enumerate() {
        let n = ring.len();
        let distinct = (0..n).filter(|&i| ring[i] != ring[(i + n - 1) % n]).count();
        if distinct < 3 {
            return Err(Error::degenerate(r, format!("{} distinct vertices", distinct)));
        }
        if signed_area(ring).abs() < EPSILON {
            return Err(Error::degenerate(r, "zero area"));
        }
    }
    if let Some((ring, other)) = find_self_intersection(rings) {
        return Err(Error::SelfIntersection { ring, other });
    }

    // Rings neither cross nor touch, so one vertex decides containment
    for (h, hole) in rings.iter().enumerate().skip(1) {
        let first = &hole[0];
        if !point_in_ring(first, rings[0]) {
            return Err(Error::degenerate(h, "hole outside the outer ring"));
        }
        if let Some((k, _)) = rings
            .iter()
            .enumerate()
            .skip(1)
            .find(|(k, other)| *k != h && point_in_ring(first, other))
        {
            return Err(Error::degenerate(h, format!("hole nested in hole {}", k)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ]
    }

    #[test]
    fn area_and_orientation() {
        let sq = square(10.0);
        assert_eq!(signed_area(&sq), 100.0);
        let rev: Vec<_> = sq.iter().rev().cloned().collect();
        assert_eq!(signed_area(&rev), -100.0);

        let hole = vec![
            Point2::new(2.0, 2.0),
            Point2::new(2.0, 4.0),
            Point2::new(4.0, 4.0),
            Point2::new(4.0, 2.0),
        ];
        assert_eq!(polygon_area(&sq, &[hole]), 96.0);
    }

    #[test]
    fn containment_with_holes() {
        let sq = square(10.0);
        let hole = vec![
            Point2::new(2.0, 2.0),
            Point2::new(2.0, 4.0),
            Point2::new(4.0, 4.0),
            Point2::new(4.0, 2.0),
        ];
        let holes = vec![hole];
        assert!(point_in_polygon(&Point2::new(5.0, 5.0), &sq, &holes));
        assert!(!point_in_polygon(&Point2::new(3.0, 3.0), &sq, &holes));
        assert!(!point_in_polygon(&Point2::new(11.0, 5.0), &sq, &holes));
    }

    #[test]
    fn boundary_distance() {
        let sq = square(10.0);
        let d = distance_to_boundary(&Point2::new(5.0, 1.0), [sq.as_slice()]);
        assert!((d - 1.0).abs() < 1e-12);
        let d = distance_to_boundary(&Point2::new(-3.0, -4.0), [sq.as_slice()]);
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn bow_tie_rejected() {
        let bow = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(matches!(
            validate_rings(&[bow.as_slice()]),
            Err(Error::SelfIntersection { ring: 0, other: 0 })
        ));
    }

    #[test]
    fn degenerate_rings_rejected() {
        let line = vec![Point2::new(0.0, 0.0), Point2::new(5.0, 0.0), Point2::new(10.0, 0.0)];
        assert!(matches!(
            validate_rings(&[line.as_slice()]),
            Err(Error::DegenerateRing { .. })
        ));
        let two = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)];
        assert!(validate_rings(&[two.as_slice()]).is_err());
    }

    #[test]
    fn hole_crossing_outer_rejected() {
        let sq = square(10.0);
        let hole = vec![
            Point2::new(8.0, 2.0),
            Point2::new(12.0, 2.0),
            Point2::new(12.0, 4.0),
            Point2::new(8.0, 4.0),
        ];
        assert!(matches!(
            validate_rings(&[sq.as_slice(), hole.as_slice()]),
            Err(Error::SelfIntersection { ring: 0, other: 1 })
        ));
        let inner = vec![
            Point2::new(2.0, 2.0),
            Point2::new(4.0, 2.0),
            Point2::new(4.0, 4.0),
            Point2::new(2.0, 4.0),
        ];
        assert!(validate_rings(&[sq.as_slice(), inner.as_slice()]).is_ok());
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2<f64>> {
        vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ]
    }

    #[test]
    fn hole_outside_outer_rejected() {
        let sq = square(10.0);
        let away = rect(20.0, 2.0, 24.0, 6.0);
        assert!(matches!(
            validate_rings(&[sq.as_slice(), away.as_slice()]),
            Err(Error::DegenerateRing { ring: 1, .. })
        ));
    }

    #[test]
    fn nested_holes_rejected() {
        let sq = square(10.0);
        let big = rect(1.0, 1.0, 9.0, 9.0);
        let small = rect(3.0, 3.0, 5.0, 5.0);
        assert!(matches!(
            validate_rings(&[sq.as_slice(), big.as_slice(), small.as_slice()]),
            Err(Error::DegenerateRing { ring: 2, .. })
        ));
        let beside = rect(6.0, 6.0, 8.0, 8.0);
        assert!(validate_rings(&[sq.as_slice(), small.as_slice(), beside.as_slice()]).is_ok());
    }
}
