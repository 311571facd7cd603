// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sample collection: associate incoming points with footprints
//!
//! Candidates come from the R-tree grown by the largest sampling radius and
//! are then re-checked against their own class radius. A point may land on
//! several vertices of several footprints; every hit is recorded.

use crate::source::{PointRecord, PointSource};
use crate::store::FootprintStore;
use smallvec::SmallVec;
use std::sync::Arc;
use terralift_core::{ElevationSample, Policies, Point2, SampleTarget};
use terralift_geometry::polygon::{distance_to_boundary, point_in_polygon};
use terralift_geometry::FootprintIndex;

/// Per-source ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Points read from the source
    pub read: usize,
    /// Points left after thinning and class omission
    pub delivered: usize,
    /// Samples recorded across all footprints
    pub recorded: usize,
}

/// Associates points with footprints and records elevation samples
pub struct SampleCollector {
    store: Arc<FootprintStore>,
    index: Arc<FootprintIndex>,
    policies: Arc<Policies>,
    search_radius: f64,
}

impl SampleCollector {
    pub fn new(store: Arc<FootprintStore>, index: Arc<FootprintIndex>, policies: Arc<Policies>) -> Self {
        let search_radius = policies.max_radius();
        Self {
            store,
            index,
            policies,
            search_radius,
        }
    }

    /// Record samples for one point. Returns the number of samples recorded.
    pub fn ingest(&self, x: f64, y: f64, z: f64, classification: u8) -> usize {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return 0;
        }
        let position = Point2::new(x, y);
        let mut recorded = 0;

        for candidate in self.index.query_point(x, y, self.search_radius) {
            let i = candidate as usize;
            let footprint = self.store.footprint(i);
            let policy = self.policies.get(footprint.class);
            if !policy.accepted_classes().contains(classification) {
                continue;
            }
            let radius = policy.radius;
            if !self.store.bounds(i).buffered(radius).contains_point(x, y) {
                continue;
            }

            let mut hits: SmallVec<[(SampleTarget, ElevationSample); 4]> = SmallVec::new();

            if policy.accepts_vertex_sample(classification) {
                let r2 = radius * radius;
                for (ring, points) in footprint.rings().enumerate() {
                    for (vertex, p) in points.iter().enumerate() {
                        if (p - position).norm_squared() <= r2 {
                            hits.push((
                                SampleTarget::Vertex {
                                    ring: ring as u32,
                                    vertex: vertex as u32,
                                },
                                ElevationSample {
                                    position,
                                    z,
                                    classification,
                                    within: false,
                                    radius,
                                },
                            ));
                        }
                    }
                }
            }

            if policy.accepts_interior_sample(classification)
                && point_in_polygon(&position, &footprint.outer, &footprint.holes)
            {
                let buffer = policy.tin.as_ref().map_or(0.0, |t| t.inner_buffer);
                let clear = buffer <= 0.0
                    || distance_to_boundary(&position, footprint.rings().map(|r| r.as_slice())) >= buffer;
                if clear {
                    hits.push((
                        SampleTarget::Interior,
                        ElevationSample {
                            position,
                            z,
                            classification,
                            within: true,
                            radius,
                        },
                    ));
                }
            }

            if !hits.is_empty() {
                recorded += self.store.record(i, hits);
            }
        }
        recorded
    }

    #[inline]
    pub fn ingest_record(&self, point: &PointRecord) -> usize {
        self.ingest(point.x, point.y, point.z, point.classification)
    }

    /// Stream one source sequentially through the collector
    pub fn ingest_source(&self, source: &PointSource) -> SourceStats {
        let mut stats = SourceStats {
            read: source.points.len(),
            ..Default::default()
        };
        for point in source.delivered() {
            stats.delivered += 1;
            stats.recorded += self.ingest_record(point);
        }
        tracing::debug!(
            source = %source.name,
            read = stats.read,
            delivered = stats.delivered,
            recorded = stats.recorded,
            "Source ingested"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terralift_core::{FeatureClass, Footprint, ReconstructionConfig};

    fn square(id: &str, class: FeatureClass, x0: f64) -> Footprint {
        Footprint::new(
            id,
            class,
            vec![
                Point2::new(x0, 0.0),
                Point2::new(x0 + 10.0, 0.0),
                Point2::new(x0 + 10.0, 10.0),
                Point2::new(x0, 10.0),
            ],
        )
    }

    fn collector(footprints: Vec<Footprint>, config: &ReconstructionConfig) -> (Arc<FootprintStore>, SampleCollector) {
        let store = Arc::new(FootprintStore::new(footprints));
        let index = Arc::new(FootprintIndex::build(store.all_bounds().iter().copied()).unwrap());
        let policies = Arc::new(config.resolve().unwrap());
        (Arc::clone(&store), SampleCollector::new(store, index, policies))
    }

    #[test]
    fn vertex_and_interior_samples() {
        let (store, c) = collector(
            vec![square("t", FeatureClass::Terrain, 0.0)],
            &ReconstructionConfig::default(),
        );
        // near vertex (0,0), inside the polygon
        assert_eq!(c.ingest(0.5, 0.5, 3.0, 2), 2);
        // centre: interior only
        assert_eq!(c.ingest(5.0, 5.0, 4.0, 2), 1);
        // outside, but within radius of vertex (10,10)
        assert_eq!(c.ingest(10.5, 10.5, 6.0, 2), 1);
        // disallowed class
        assert_eq!(c.ingest(5.0, 5.0, 4.0, 6), 0);

        let samples = store.samples(0);
        assert_eq!(samples.vertex_samples(0, 0).len(), 1);
        assert_eq!(samples.vertex_samples(0, 2).len(), 1);
        assert_eq!(samples.interior.len(), 2);
        assert!(samples.interior.iter().all(|s| s.within));
    }

    #[test]
    fn shared_point_reaches_both_footprints() {
        let (store, c) = collector(
            vec![
                square("a", FeatureClass::Road, 0.0),
                square("b", FeatureClass::Road, 10.0),
            ],
            &ReconstructionConfig::default(),
        );
        // near (10,0), a vertex of both, and inside "b"
        assert_eq!(c.ingest(10.2, 0.3, 1.0, 2), 3);
        assert_eq!(store.samples(0).vertex_samples(0, 1).len(), 1);
        assert_eq!(store.samples(1).vertex_samples(0, 0).len(), 1);
    }

    #[test]
    fn building_roof_codes_only_inside() {
        let (store, c) = collector(
            vec![square("b", FeatureClass::Building, 0.0)],
            &ReconstructionConfig::default(),
        );
        // roof code inside
        assert_eq!(c.ingest(5.0, 5.0, 12.0, 6), 1);
        // ground code inside, far from vertices: nothing
        assert_eq!(c.ingest(5.0, 5.0, 0.0, 2), 0);
        // ground code near a vertex, building radius is 3
        assert_eq!(c.ingest(-2.0, 0.0, 0.2, 2), 1);
        let samples = store.samples(0);
        assert_eq!(samples.interior.len(), 1);
        assert_eq!(samples.vertex_samples(0, 0)[0].radius, 3.0);
    }

    #[test]
    fn inner_buffer_skips_edge_interior_points() {
        let config: ReconstructionConfig = serde_json::from_str(
            r#"{"classes": {"Terrain": {"inner_buffer": 2.0}}}"#,
        )
        .unwrap();
        let (store, c) = collector(vec![square("t", FeatureClass::Terrain, 0.0)], &config);
        c.ingest(5.0, 1.0, 1.0, 2);
        c.ingest(5.0, 5.0, 1.0, 2);
        assert_eq!(store.samples(0).interior.len(), 1);
    }

    #[test]
    fn source_stats() {
        let (_, c) = collector(
            vec![square("t", FeatureClass::Terrain, 0.0)],
            &ReconstructionConfig::default(),
        );
        let points = (0..20).map(|i| PointRecord::new(5.0, i as f64 * 0.4, 1.0, 2)).collect();
        let stats = c.ingest_source(&PointSource::new("s", points).with_thinning(4));
        assert_eq!(stats.read, 20);
        assert_eq!(stats.delivered, 5);
        assert!(stats.recorded >= 5);
    }
}
