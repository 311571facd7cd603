// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vertex lifting
//!
//! Turns a footprint's accumulated samples into one elevation per boundary
//! vertex. With outlier filtering on, the footprint-wide sample pool is
//! filtered first and rejected points are dropped from every vertex.
//! Vertices without data borrow from the nearest vertex that has some; a
//! footprint without any vertex data falls back to the aggregate of its
//! pool. Buildings pool ground samples only. Lifting only reads the
//! samples, so it can be repeated.

use crate::error::{Error, Result};
use crate::estimator::{HeightEstimator, OutlierReport};
use crate::store::SampleSet;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use terralift_core::{
    ClassPolicy, ElevationSample, FeatureClass, Footprint, LiftedVertex, Policies, Point2, Point3,
    Provenance,
};

/// Number of vertices per provenance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceCounts {
    pub estimated: usize,
    pub fallback: usize,
    pub flattened: usize,
    pub stitched: usize,
}

impl ProvenanceCounts {
    pub fn add(&mut self, provenance: Provenance) {
        match provenance {
            Provenance::Estimated => self.estimated += 1,
            Provenance::Fallback => self.fallback += 1,
            Provenance::Flattened => self.flattened += 1,
            Provenance::Stitched => self.stitched += 1,
        }
    }

    pub fn merge(&mut self, other: &ProvenanceCounts) {
        self.estimated += other.estimated;
        self.fallback += other.fallback;
        self.flattened += other.flattened;
        self.stitched += other.stitched;
    }

    pub fn total(&self) -> usize {
        self.estimated + self.fallback + self.flattened + self.stitched
    }
}

/// A footprint with an elevation on every boundary vertex
#[derive(Debug, Clone, PartialEq)]
pub struct LiftedFeature {
    /// Position in the footprint store
    pub index: usize,
    pub class: FeatureClass,
    /// Outer ring first, same shape as the footprint's rings
    pub rings: Vec<Vec<LiftedVertex>>,
    /// Buildings only
    pub roof_z: Option<f64>,
    /// Interior samples kept for TIN classes
    pub interior: Vec<Point3<f64>>,
    pub outliers: OutlierReport,
}

impl LiftedFeature {
    pub fn ring_points(&self) -> Vec<Vec<Point3<f64>>> {
        self.rings
            .iter()
            .map(|r| r.iter().map(LiftedVertex::to_point3).collect())
            .collect()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &LiftedVertex> {
        self.rings.iter().flatten()
    }

    pub fn provenance_counts(&self) -> ProvenanceCounts {
        let mut counts = ProvenanceCounts::default();
        for v in self.vertices() {
            counts.add(v.provenance);
        }
        counts
    }

    /// Highest vertex elevation
    pub fn max_z(&self) -> Option<f64> {
        self.vertices().map(|v| v.z).reduce(f64::max)
    }
}

/// Assigns elevations to footprint vertices under the class policies
pub struct VertexLifter {
    policies: Arc<Policies>,
    estimator: HeightEstimator,
}

impl VertexLifter {
    pub fn new(policies: Arc<Policies>) -> Self {
        let estimator = HeightEstimator::from_options(policies.options());
        Self {
            policies,
            estimator,
        }
    }

    pub fn lift(&self, index: usize, footprint: &Footprint, samples: &SampleSet) -> Result<LiftedFeature> {
        let policy = self.policies.get(footprint.class);
        let max_fraction = policy.filter_outliers.then_some(policy.max_outlier_fraction);
        let mut outliers = OutlierReport {
            converged: true,
            ..Default::default()
        };

        let rings = if policy.flatten {
            self.lift_flat(footprint, samples, policy, max_fraction, &mut outliers)?
        } else {
            let mut rings = self.lift_vertices(footprint, samples, policy, max_fraction, &mut outliers)?;
            if let Some(fraction) = max_fraction {
                self.reject_vertex_outliers(&mut rings, fraction, &mut outliers);
            }
            rings
        };

        let roof_z = match &policy.building {
            Some(building) => {
                let roof: Vec<f64> = samples.interior.iter().map(|s| s.z).collect();
                match self.estimator.estimate(&roof, building.roof_height, max_fraction) {
                    Ok(est) => {
                        outliers.merge(&est.report);
                        Some(est.z)
                    }
                    Err(_) => {
                        let ground = rings.iter().flatten().map(|v| v.z).fold(f64::NEG_INFINITY, f64::max);
                        tracing::warn!(
                            id = %footprint.id,
                            ground_z = ground,
                            "No roof samples, roof placed at highest ground elevation"
                        );
                        Some(ground)
                    }
                }
            }
            None => None,
        };

        let interior = if footprint.class.uses_interior_points() {
            samples
                .interior
                .iter()
                .map(|s| Point3::new(s.position.x, s.position.y, s.z))
                .collect()
        } else {
            Vec::new()
        };

        Ok(LiftedFeature {
            index,
            class: footprint.class,
            rings,
            roof_z,
            interior,
            outliers,
        })
    }

    /// One elevation for the whole footprint
    fn lift_flat(
        &self,
        footprint: &Footprint,
        samples: &SampleSet,
        policy: &ClassPolicy,
        max_fraction: Option<f64>,
        outliers: &mut OutlierReport,
    ) -> Result<Vec<Vec<LiftedVertex>>> {
        let pool: Vec<f64> = footprint_pool(samples, policy).iter().map(|s| s.z).collect();
        let est = self.estimator.estimate(&pool, policy.height, max_fraction)?;
        outliers.merge(&est.report);
        Ok(footprint
            .rings()
            .map(|ring| {
                ring.iter()
                    .map(|p| LiftedVertex::new(*p, est.z, Provenance::Flattened))
                    .collect()
            })
            .collect())
    }

    /// Per-vertex estimates with nearest-vertex and interior fallbacks
    fn lift_vertices(
        &self,
        footprint: &Footprint,
        samples: &SampleSet,
        policy: &ClassPolicy,
        max_fraction: Option<f64>,
        outliers: &mut OutlierReport,
    ) -> Result<Vec<Vec<LiftedVertex>>> {
        let pool = footprint_pool(samples, policy);
        let mut pool_z: Vec<f64> = pool.iter().map(|s| s.z).collect();
        let mut rejected: FxHashSet<(u64, u64, u64)> = FxHashSet::default();
        if let Some(fraction) = max_fraction {
            let (keep, report) = self.estimator.outlier_mask(&pool_z, fraction);
            if report.discarded > 0 {
                outliers.merge(&report);
                rejected.extend(
                    pool.iter()
                        .zip(&keep)
                        .filter(|(_, k)| !**k)
                        .map(|(s, _)| sample_key(s)),
                );
                pool_z = pool_z
                    .into_iter()
                    .zip(keep)
                    .filter_map(|(z, k)| k.then_some(z))
                    .collect();
            }
        }

        let mut estimated: Vec<Vec<Option<f64>>> = Vec::with_capacity(footprint.ring_count());
        for (r, ring) in footprint.rings().enumerate() {
            let mut zs = Vec::with_capacity(ring.len());
            for v in 0..ring.len() {
                let values: Vec<f64> = samples
                    .vertex_samples(r, v)
                    .iter()
                    .filter(|s| !rejected.contains(&sample_key(s)))
                    .map(|s| s.z)
                    .collect();
                let z = match self.estimator.estimate(&values, policy.height, max_fraction) {
                    Ok(est) => {
                        outliers.merge(&est.report);
                        Some(est.z)
                    }
                    Err(_) => None,
                };
                zs.push(z);
            }
            estimated.push(zs);
        }

        let sources: Vec<(Point2<f64>, f64)> = footprint
            .rings()
            .zip(&estimated)
            .flat_map(|(ring, zs)| ring.iter().zip(zs).filter_map(|(p, z)| z.map(|z| (*p, z))))
            .collect();

        let aggregate = if sources.is_empty() {
            // pool is already filtered
            let est = match self.estimator.estimate(&pool_z, policy.height, None) {
                Ok(est) => est,
                Err(_) => {
                    if policy.building.is_some() {
                        tracing::warn!(
                            id = %footprint.id,
                            roof_samples = samples.interior.len(),
                            "No ground samples near building vertices"
                        );
                    }
                    return Err(Error::NoData);
                }
            };
            tracing::debug!(
                id = %footprint.id,
                z = est.z,
                "No vertex samples, using footprint aggregate"
            );
            Some(est.z)
        } else {
            None
        };

        Ok(footprint
            .rings()
            .zip(estimated)
            .map(|(ring, zs)| {
                ring.iter()
                    .zip(zs)
                    .map(|(p, z)| match (z, aggregate) {
                        (Some(z), _) => LiftedVertex::new(*p, z, Provenance::Estimated),
                        (None, Some(a)) => LiftedVertex::new(*p, a, Provenance::Fallback),
                        (None, None) => {
                            let z = nearest(p, &sources).unwrap_or(0.0);
                            LiftedVertex::new(*p, z, Provenance::Fallback)
                        }
                    })
                    .collect()
            })
            .collect())
    }

    /// Run the outlier filter over the vertex elevations themselves and
    /// re-assign rejected vertices from the nearest kept one
    fn reject_vertex_outliers(&self, rings: &mut [Vec<LiftedVertex>], fraction: f64, outliers: &mut OutlierReport) {
        let values: Vec<f64> = rings.iter().flatten().map(|v| v.z).collect();
        let (keep, report) = self.estimator.outlier_mask(&values, fraction);
        if report.discarded == 0 {
            return;
        }
        outliers.merge(&report);

        let inliers: Vec<(Point2<f64>, f64)> = rings
            .iter()
            .flatten()
            .zip(&keep)
            .filter_map(|(v, k)| k.then_some((v.position, v.z)))
            .collect();
        for (v, k) in rings.iter_mut().flatten().zip(keep) {
            if !k {
                if let Some(z) = nearest(&v.position, &inliers) {
                    v.z = z;
                    v.provenance = Provenance::Fallback;
                }
            }
        }
    }
}

/// Samples of the whole footprint, one entry per point. Buildings pool
/// their ground samples only, interior samples being roof points.
fn footprint_pool<'a>(samples: &'a SampleSet, policy: &ClassPolicy) -> Vec<&'a ElevationSample> {
    let interior: &[ElevationSample] = if policy.building.is_some() { &[] } else { &samples.interior };
    let mut seen = FxHashSet::default();
    samples
        .vertex
        .iter()
        .flatten()
        .flatten()
        .chain(interior)
        .filter(|s| seen.insert(sample_key(s)))
        .collect()
}

/// Identity of a point: a point near several vertices is counted once
#[inline]
fn sample_key(s: &ElevationSample) -> (u64, u64, u64) {
    (s.position.x.to_bits(), s.position.y.to_bits(), s.z.to_bits())
}

/// Elevation of the nearest source point (first one on ties)
fn nearest(p: &Point2<f64>, sources: &[(Point2<f64>, f64)]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for (q, z) in sources {
        let d = (q - p).norm_squared();
        if best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, *z));
        }
    }
    best.map(|(_, z)| z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use terralift_core::{ElevationSample, ReconstructionConfig, SampleTarget};

    fn square(class: FeatureClass) -> Footprint {
        Footprint::new(
            "f",
            class,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 10.0),
                Point2::new(0.0, 10.0),
            ],
        )
    }

    fn sample(x: f64, y: f64, z: f64) -> ElevationSample {
        ElevationSample {
            position: Point2::new(x, y),
            z,
            classification: 2,
            within: false,
            radius: 1.0,
        }
    }

    fn lifter(json: &str) -> VertexLifter {
        let config: ReconstructionConfig = serde_json::from_str(json).unwrap();
        VertexLifter::new(Arc::new(config.resolve().unwrap()))
    }

    fn vertex(v: u32) -> SampleTarget {
        SampleTarget::Vertex { ring: 0, vertex: v }
    }

    #[test]
    fn per_vertex_estimates_and_nearest_fallback() {
        let fp = square(FeatureClass::Road);
        let mut samples = SampleSet::for_footprint(&fp);
        samples.push(vertex(0), sample(0.1, 0.0, 1.0));
        samples.push(vertex(0), sample(0.0, 0.2, 3.0));
        samples.push(vertex(0), sample(0.2, 0.2, 2.0));
        samples.push(vertex(2), sample(10.0, 9.9, 7.0));

        let lifted = lifter("{}").lift(0, &fp, &samples).unwrap();
        let zs: Vec<f64> = lifted.vertices().map(|v| v.z).collect();
        // vertex 1 (10,0) is equidistant from 0 and 2; the first wins
        assert_eq!(zs, vec![2.0, 2.0, 7.0, 2.0]);
        let counts = lifted.provenance_counts();
        assert_eq!(counts.estimated, 2);
        assert_eq!(counts.fallback, 2);
        assert!(lifted.roof_z.is_none());
    }

    #[test]
    fn interior_aggregate_when_no_vertex_data() {
        let fp = square(FeatureClass::Road);
        let mut samples = SampleSet::for_footprint(&fp);
        for z in [4.0, 5.0, 6.0] {
            samples.push(SampleTarget::Interior, sample(5.0, 5.0, z));
        }
        let lifted = lifter("{}").lift(0, &fp, &samples).unwrap();
        assert!(lifted.vertices().all(|v| v.z == 5.0 && v.provenance == Provenance::Fallback));
    }

    #[test]
    fn no_samples_is_no_data() {
        let fp = square(FeatureClass::Road);
        let samples = SampleSet::for_footprint(&fp);
        assert_eq!(lifter("{}").lift(0, &fp, &samples), Err(Error::NoData));
    }

    #[test]
    fn flatten_gives_one_elevation() {
        let fp = square(FeatureClass::Water);
        let mut samples = SampleSet::for_footprint(&fp);
        samples.push(vertex(0), sample(0.0, 0.0, 1.0));
        samples.push(vertex(1), sample(10.0, 0.0, 1.4));
        samples.push(vertex(3), sample(0.0, 10.0, 0.8));
        samples.push(SampleTarget::Interior, sample(5.0, 5.0, 1.1));
        // same point seen by two vertices counts once
        samples.push(vertex(2), sample(9.5, 9.5, 1.2));
        samples.push(vertex(1), sample(9.5, 9.5, 1.2));

        let lifted = lifter("{}").lift(0, &fp, &samples).unwrap();
        let first = lifted.rings[0][0].z;
        assert!(lifted.vertices().all(|v| v.z == first && v.provenance == Provenance::Flattened));
        // water: percentile 10 over 5 values -> rank round(0.4) = 0
        assert_eq!(first, 0.8);
    }

    #[test]
    fn vertex_outlier_reassigned() {
        let fp = Footprint::new(
            "f",
            FeatureClass::Road,
            (0..8)
                .map(|i| Point2::new(i as f64, if i % 2 == 0 { 0.0 } else { 1.0 }))
                .chain((0..8).rev().map(|i| Point2::new(i as f64, 5.0)))
                .collect(),
        );
        let mut samples = SampleSet::for_footprint(&fp);
        for v in 0..16u32 {
            let z = if v == 5 { 40.0 } else { 2.0 };
            samples.push(vertex(v), sample(0.0, 0.0, z));
        }
        let lifted = lifter(r#"{"classes": {"Road": {"filter_outliers": true, "max_outlier_fraction": 0.2}}}"#)
            .lift(0, &fp, &samples)
            .unwrap();
        assert!(lifted.vertices().all(|v| v.z == 2.0));
        assert_eq!(lifted.rings[0][5].provenance, Provenance::Fallback);
        assert_eq!(lifted.outliers.discarded, 1);
    }

    #[test]
    fn filtered_spike_not_copied_to_other_vertices() {
        let fp = square(FeatureClass::Road);
        let mut samples = SampleSet::for_footprint(&fp);
        // the spike is the only point near a vertex
        samples.push(vertex(0), sample(0.5, 0.5, 500.0));
        samples.push(SampleTarget::Interior, sample(0.5, 0.5, 500.0));
        for (x, y) in [(3.0, 3.0), (5.0, 3.0), (7.0, 3.0), (3.0, 5.0), (5.0, 5.0), (7.0, 5.0), (3.0, 7.0), (5.0, 7.0), (7.0, 7.0)] {
            samples.push(SampleTarget::Interior, sample(x, y, 5.0));
        }
        let lifted = lifter(
            r#"{"classes": {"Road": {"height": "percentile-50", "filter_outliers": true, "max_outlier_fraction": 0.2}}}"#,
        )
        .lift(0, &fp, &samples)
        .unwrap();
        let zs: Vec<f64> = lifted.vertices().map(|v| v.z).collect();
        assert_eq!(zs, vec![5.0; 4]);
        assert_eq!(lifted.outliers.discarded, 1);
    }

    #[test]
    fn filtered_pool_leaves_other_vertices_alone() {
        let fp = square(FeatureClass::Road);
        let mut samples = SampleSet::for_footprint(&fp);
        samples.push(vertex(0), sample(0.5, 0.5, 500.0));
        samples.push(vertex(1), sample(9.5, 0.5, 4.0));
        samples.push(vertex(2), sample(9.5, 9.5, 6.0));
        samples.push(SampleTarget::Interior, sample(5.0, 5.0, 5.0));
        let lifted = lifter(r#"{"classes": {"Road": {"filter_outliers": true, "max_outlier_fraction": 0.25}}}"#)
            .lift(0, &fp, &samples)
            .unwrap();
        let zs: Vec<f64> = lifted.vertices().map(|v| v.z).collect();
        // (0,0) loses its spike and borrows from (10,0); (0,10) borrows from (10,10)
        assert_eq!(zs, vec![4.0, 4.0, 6.0, 6.0]);
        assert_eq!(lifted.rings[0][0].provenance, Provenance::Fallback);
        assert_eq!(lifted.outliers.discarded, 1);
    }

    #[test]
    fn building_without_ground_samples_fails() {
        let fp = square(FeatureClass::Building);
        let mut samples = SampleSet::for_footprint(&fp);
        for i in 0..20 {
            let mut s = sample(2.0 + 0.3 * i as f64, 5.0, 20.0 + 0.1 * i as f64);
            s.classification = 6;
            s.within = true;
            samples.push(SampleTarget::Interior, s);
        }
        assert_eq!(lifter("{}").lift(0, &fp, &samples), Err(Error::NoData));
    }

    #[test]
    fn building_roof_and_ground() {
        let fp = square(FeatureClass::Building);
        let mut samples = SampleSet::for_footprint(&fp);
        for v in 0..4 {
            samples.push(vertex(v), sample(0.0, 0.0, 0.5));
        }
        for z in [10.0, 11.0, 12.0, 13.0, 14.0] {
            let mut s = sample(5.0, 5.0, z);
            s.classification = 6;
            s.within = true;
            samples.push(SampleTarget::Interior, s);
        }
        let lifted = lifter("{}").lift(0, &fp, &samples).unwrap();
        assert!(lifted.vertices().all(|v| v.z == 0.5));
        // percentile 90 over 5 -> rank round(3.6) = 4
        assert_relative_eq!(lifted.roof_z.unwrap(), 14.0);
        assert!(lifted.interior.is_empty());
    }

    #[test]
    fn building_without_roof_samples() {
        let fp = square(FeatureClass::Building);
        let mut samples = SampleSet::for_footprint(&fp);
        samples.push(vertex(0), sample(0.0, 0.0, 0.5));
        samples.push(vertex(2), sample(10.0, 10.0, 1.5));
        let lifted = lifter("{}").lift(0, &fp, &samples).unwrap();
        assert_eq!(lifted.roof_z, Some(1.5));
    }

    #[test]
    fn lifting_is_repeatable() {
        let fp = square(FeatureClass::Terrain);
        let mut samples = SampleSet::for_footprint(&fp);
        samples.push(vertex(1), sample(10.0, 0.0, 3.0));
        samples.push(SampleTarget::Interior, sample(4.0, 4.0, 3.5));
        let l = lifter("{}");
        let a = l.lift(3, &fp, &samples).unwrap();
        let b = l.lift(3, &fp, &samples).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.interior.len(), 1);
        assert_eq!(a.index, 3);
    }
}
