// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Footprint bounding-box R-tree
//!
//! Bulk-loaded once over every footprint's bounding box, then shared
//! read-only by all ingesting threads. Queries return footprint indices
//! whose box intersects the query region; exact tests are left to callers.

use crate::error::{Error, Result};
use rstar::{RTree, RTreeObject, AABB};
use smallvec::SmallVec;
use terralift_core::BBox2;

/// Candidate list returned by queries; most points touch few footprints.
pub type Candidates = SmallVec<[u32; 8]>;

#[derive(Debug, Clone)]
struct IndexEntry {
    footprint: u32,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

#[inline]
fn to_aabb(b: &BBox2) -> AABB<[f64; 2]> {
    AABB::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y])
}

/// Static R-tree over footprint bounding boxes
#[derive(Debug)]
pub struct FootprintIndex {
    tree: RTree<IndexEntry>,
}

impl FootprintIndex {
    /// Bulk-load the tree. Entry `i` of `bounds` is footprint `i`.
    ///
    /// Fails on an empty set. Footprints with invalid bounds are left out
    /// of the tree and never returned.
    pub fn build<I>(bounds: I) -> Result<Self>
    where
        I: IntoIterator<Item = BBox2>,
    {
        let entries: Vec<IndexEntry> = bounds
            .into_iter()
            .enumerate()
            .filter(|(_, b)| b.is_valid())
            .map(|(i, b)| IndexEntry {
                footprint: i as u32,
                env: to_aabb(&b),
            })
            .collect();

        if entries.is_empty() {
            return Err(Error::EmptyIndex);
        }

        Ok(Self {
            tree: RTree::bulk_load(entries),
        })
    }

    /// Number of indexed footprints
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Footprints whose bounding box intersects `region`, in ascending order.
    ///
    /// An inverted or non-finite region yields no candidates; a zero-area
    /// region (a point) is valid.
    pub fn query(&self, region: &BBox2) -> Candidates {
        let mut out = Candidates::new();
        if !region.is_valid() {
            return out;
        }
        for entry in self.tree.locate_in_envelope_intersecting(&to_aabb(region)) {
            out.push(entry.footprint);
        }
        out.sort_unstable();
        out
    }

    /// Footprints whose bounding box, grown by `radius`, contains the point.
    #[inline]
    pub fn query_point(&self, x: f64, y: f64, radius: f64) -> Candidates {
        self.query(&BBox2::new(x, y, x, y).buffered(radius.max(0.0)))
    }
}
