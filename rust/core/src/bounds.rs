// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar bounding boxes and requested extents
//!
//! Footprint bounds feed the spatial index; the requested extent restricts
//! which footprints take part in a run. Lifting never changes planar extent,
//! so bounds are computed once.

use crate::error::{Error, Result};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned 2D bounding box in f64 precision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox2 {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox2 {
    /// Create new bounds initialized to an empty (inverted) state
    pub fn empty() -> Self {
        Self {
            min_x: f64::MAX,
            min_y: f64::MAX,
            max_x: f64::MIN,
            max_y: f64::MIN,
        }
    }

    /// Box from corner coordinates
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounds of a point set
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2<f64>>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.expand(p.x, p.y);
        }
        b
    }

    /// Check if bounds are valid (at least one point added, all finite)
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x
            && self.min_y <= self.max_y
            && self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// Expand bounds to include a point
    #[inline]
    pub fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow the box by `d` on every side
    #[inline]
    pub fn buffered(&self, d: f64) -> Self {
        Self {
            min_x: self.min_x - d,
            min_y: self.min_y - d,
            max_x: self.max_x + d,
            max_y: self.max_y + d,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        if self.is_valid() {
            self.width() * self.height()
        } else {
            0.0
        }
    }

    /// Closed-interval overlap test
    #[inline]
    pub fn intersects(&self, other: &BBox2) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    #[inline]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Union of two boxes
    pub fn merged(&self, other: &BBox2) -> BBox2 {
        BBox2 {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

impl Default for BBox2 {
    fn default() -> Self {
        Self::empty()
    }
}

/// A requested processing extent, `[xmin, ymin, xmax, ymax]` in documents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Extent(pub BBox2);

impl Extent {
    /// Validate a requested extent. An inverted, non-finite or zero-area
    /// extent is rejected so the caller can fall back to an unrestricted run.
    pub fn validated(self) -> Result<Extent> {
        let b = self.0;
        if !b.is_valid() || b.area() <= 0.0 {
            return Err(Error::InvalidExtent {
                xmin: b.min_x,
                ymin: b.min_y,
                xmax: b.max_x,
                ymax: b.max_y,
            });
        }
        Ok(self)
    }

    /// Whether a footprint with these bounds takes part in the run
    #[inline]
    pub fn admits(&self, bounds: &BBox2) -> bool {
        self.0.intersects(bounds)
    }
}

impl From<[f64; 4]> for Extent {
    fn from(v: [f64; 4]) -> Self {
        Extent(BBox2::new(v[0], v[1], v[2], v[3]))
    }
}

impl From<Extent> for [f64; 4] {
    fn from(e: Extent) -> Self {
        [e.0.min_x, e.0.min_y, e.0.max_x, e.0.max_y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let pts = vec![Point2::new(1.0, 5.0), Point2::new(-2.0, 3.0), Point2::new(4.0, -1.0)];
        let b = BBox2::from_points(&pts);
        assert_eq!(b, BBox2::new(-2.0, -1.0, 4.0, 5.0));
        assert!(b.is_valid());
        assert!(!BBox2::empty().is_valid());
    }

    #[test]
    fn test_intersects_touching() {
        let a = BBox2::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox2::new(10.0, 10.0, 20.0, 20.0);
        let c = BBox2::new(10.1, 0.0, 20.0, 5.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.buffered(0.2).intersects(&c));
    }

    #[test]
    fn test_extent_validation() {
        assert!(Extent::from([0.0, 0.0, 10.0, 10.0]).validated().is_ok());
        // inverted
        assert!(Extent::from([10.0, 0.0, 0.0, 10.0]).validated().is_err());
        // zero area
        assert!(Extent::from([0.0, 0.0, 0.0, 10.0]).validated().is_err());
        // not finite
        assert!(Extent::from([0.0, f64::NAN, 1.0, 1.0]).validated().is_err());
    }
}
