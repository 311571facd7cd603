// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tile stitching: reconcile elevations of coincident vertices
//!
//! Vertices of different footprints within the snap tolerance form a group
//! (connected components over a grid hash). Inside a group, hard classes
//! are clustered by elevation and each member takes its cluster's median;
//! soft classes follow the lowest hard cluster, or their own median when
//! the group has no hard member. Clusters further apart than the jump
//! threshold stay apart and are closed by vertical walls later.

use crate::estimator::median;
use crate::lifter::LiftedFeature;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use terralift_core::Provenance;

/// What one stitching pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchStats {
    /// Vertex groups spanning more than one footprint
    pub groups: usize,
    pub vertices_changed: usize,
}

/// (feature, ring, vertex)
type VertexRef = (usize, usize, usize);

/// Grid-hash over 2D vertex positions, cells the size of the snap tolerance
struct SnapGrid {
    cell_size: f64,
    grid: FxHashMap<(i64, i64), SmallVec<[u32; 4]>>,
}

impl SnapGrid {
    fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            grid: FxHashMap::default(),
        }
    }

    fn cell_coords(&self, x: f64, y: f64) -> (i64, i64) {
        ((x / self.cell_size).floor() as i64, (y / self.cell_size).floor() as i64)
    }

    fn insert(&mut self, id: u32, x: f64, y: f64) {
        let cell = self.cell_coords(x, y);
        self.grid.entry(cell).or_default().push(id);
    }

    /// Ids in the 3x3 neighbourhood of a position
    fn neighbours(&self, x: f64, y: f64) -> impl Iterator<Item = u32> + '_ {
        let (cx, cy) = self.cell_coords(x, y);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| (cx + dx, cy + dy)))
            .filter_map(|cell| self.grid.get(&cell))
            .flatten()
            .copied()
    }
}

/// Disjoint sets with path halving and union by size
struct UnionFind {
    parent: Vec<u32>,
    size: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grand = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grand;
            x = grand;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra as usize] >= self.size[rb as usize] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small as usize] = big;
        self.size[big as usize] += self.size[small as usize];
    }
}

/// Reconciles shared vertices between lifted footprints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileStitcher {
    pub snap_tolerance: f64,
    pub jump_threshold: f64,
}

impl TileStitcher {
    pub fn new(snap_tolerance: f64, jump_threshold: f64) -> Self {
        Self {
            snap_tolerance,
            jump_threshold,
        }
    }

    pub fn stitch(&self, features: &mut [LiftedFeature]) -> StitchStats {
        let mut refs: Vec<VertexRef> = Vec::new();
        for (f, feature) in features.iter().enumerate() {
            for (r, ring) in feature.rings.iter().enumerate() {
                refs.extend((0..ring.len()).map(|v| (f, r, v)));
            }
        }
        let position = |(f, r, v): VertexRef| features[f].rings[r][v].position;

        let snap = self.snap_tolerance.max(1e-10);
        let snap_sq = snap * snap;
        let mut grid = SnapGrid::new(snap);
        for (id, &vr) in refs.iter().enumerate() {
            let p = position(vr);
            grid.insert(id as u32, p.x, p.y);
        }

        let mut sets = UnionFind::new(refs.len());
        for (id, &vr) in refs.iter().enumerate() {
            let p = position(vr);
            for other in grid.neighbours(p.x, p.y) {
                if other as usize <= id {
                    continue;
                }
                let q = position(refs[other as usize]);
                if (q - p).norm_squared() <= snap_sq {
                    sets.union(id as u32, other);
                }
            }
        }

        let mut groups: FxHashMap<u32, SmallVec<[u32; 4]>> = FxHashMap::default();
        for id in 0..refs.len() as u32 {
            let root = sets.find(id);
            groups.entry(root).or_default().push(id);
        }

        let mut stats = StitchStats::default();
        let mut members: Vec<&SmallVec<[u32; 4]>> = groups
            .values()
            .filter(|m| m.len() > 1 && m.iter().any(|&i| refs[i as usize].0 != refs[m[0] as usize].0))
            .collect();
        members.sort_by_key(|m| m[0]);

        for group in members {
            stats.groups += 1;
            let targets = self.reconcile(features, &refs, group);
            for (id, z) in targets {
                let (f, r, v) = refs[id as usize];
                let vertex = &mut features[f].rings[r][v];
                if vertex.z.to_bits() != z.to_bits() {
                    vertex.z = z;
                    vertex.provenance = Provenance::Stitched;
                    stats.vertices_changed += 1;
                }
            }
        }

        tracing::debug!(
            groups = stats.groups,
            vertices_changed = stats.vertices_changed,
            "Stitching complete"
        );
        stats
    }

    /// Target elevation for every member of one group
    fn reconcile(&self, features: &[LiftedFeature], refs: &[VertexRef], group: &[u32]) -> Vec<(u32, f64)> {
        let z_of = |id: u32| {
            let (f, r, v) = refs[id as usize];
            features[f].rings[r][v].z
        };
        let is_hard = |id: u32| features[refs[id as usize].0].class.is_hard();

        let mut hard: Vec<(u32, f64)> = group.iter().filter(|&&i| is_hard(i)).map(|&i| (i, z_of(i))).collect();
        hard.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut targets = Vec::with_capacity(group.len());
        let mut lowest: Option<f64> = None;
        let mut start = 0;
        for end in 1..=hard.len() {
            if end == hard.len() || hard[end].1 - hard[end - 1].1 > self.jump_threshold {
                let cluster = &hard[start..end];
                let values: Vec<f64> = cluster.iter().map(|c| c.1).collect();
                if let Some(m) = median(&values) {
                    if lowest.is_none() {
                        lowest = Some(m);
                    }
                    targets.extend(cluster.iter().map(|c| (c.0, m)));
                }
                start = end;
            }
        }

        let soft: Vec<u32> = group.iter().copied().filter(|&i| !is_hard(i)).collect();
        let soft_target = match lowest {
            Some(m) => Some(m),
            None => median(&soft.iter().map(|&i| z_of(i)).collect::<Vec<_>>()),
        };
        if let Some(m) = soft_target {
            targets.extend(soft.iter().map(|&i| (i, m)));
        }
        targets
    }
}
