// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Footprint store with per-footprint sample accumulators
//!
//! Footprints and their bounds are immutable after construction. Each
//! footprint's samples sit behind their own mutex so concurrent ingestion
//! only contends on footprints that actually share points.

use std::sync::{Mutex, MutexGuard, PoisonError};
use terralift_core::{BBox2, ElevationSample, Footprint, SampleTarget};

/// Samples accumulated for one footprint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    /// Indexed by ring, then vertex
    pub vertex: Vec<Vec<Vec<ElevationSample>>>,
    pub interior: Vec<ElevationSample>,
}

impl SampleSet {
    /// Empty set shaped after a footprint's rings
    pub fn for_footprint(footprint: &Footprint) -> Self {
        Self {
            vertex: footprint.rings().map(|r| vec![Vec::new(); r.len()]).collect(),
            interior: Vec::new(),
        }
    }

    /// Store a sample. Returns `false` when the target vertex does not exist.
    pub fn push(&mut self, target: SampleTarget, sample: ElevationSample) -> bool {
        match target {
            SampleTarget::Vertex { ring, vertex } => {
                match self
                    .vertex
                    .get_mut(ring as usize)
                    .and_then(|r| r.get_mut(vertex as usize))
                {
                    Some(v) => {
                        v.push(sample);
                        true
                    }
                    None => false,
                }
            }
            SampleTarget::Interior => {
                self.interior.push(sample);
                true
            }
        }
    }

    #[inline]
    pub fn vertex_samples(&self, ring: usize, vertex: usize) -> &[ElevationSample] {
        self.vertex
            .get(ring)
            .and_then(|r| r.get(vertex))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Total number of samples, vertex and interior
    pub fn len(&self) -> usize {
        self.vertex.iter().flatten().map(|v| v.len()).sum::<usize>() + self.interior.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All footprints of a run with their accumulators
#[derive(Debug)]
pub struct FootprintStore {
    footprints: Vec<Footprint>,
    bounds: Vec<BBox2>,
    samples: Vec<Mutex<SampleSet>>,
}

impl FootprintStore {
    pub fn new(footprints: Vec<Footprint>) -> Self {
        let bounds = footprints.iter().map(|f| f.bbox()).collect();
        let samples = footprints
            .iter()
            .map(|f| Mutex::new(SampleSet::for_footprint(f)))
            .collect();
        Self {
            footprints,
            bounds,
            samples,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }

    #[inline]
    pub fn footprint(&self, i: usize) -> &Footprint {
        &self.footprints[i]
    }

    pub fn footprints(&self) -> &[Footprint] {
        &self.footprints
    }

    #[inline]
    pub fn bounds(&self, i: usize) -> &BBox2 {
        &self.bounds[i]
    }

    pub fn all_bounds(&self) -> &[BBox2] {
        &self.bounds
    }

    /// Lock a footprint's accumulator. A poisoned lock is recovered: samples
    /// are only ever appended, so a panicking writer leaves them usable.
    pub fn samples(&self, i: usize) -> MutexGuard<'_, SampleSet> {
        self.samples[i].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append samples for one footprint under a single lock and return how
    /// many were stored
    pub fn record<I>(&self, i: usize, samples: I) -> usize
    where
        I: IntoIterator<Item = (SampleTarget, ElevationSample)>,
    {
        let mut guard = self.samples(i);
        let mut stored = 0;
        for (target, sample) in samples {
            if guard.push(target, sample) {
                stored += 1;
            }
        }
        stored
    }

    /// Take a footprint's samples, leaving an empty accumulator
    pub fn release(&self, i: usize) -> SampleSet {
        std::mem::take(&mut *self.samples(i))
    }

    /// Samples currently held across all footprints
    pub fn total_samples(&self) -> usize {
        (0..self.len()).map(|i| self.samples(i).len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use terralift_core::{FeatureClass, Point2};

    fn square(id: &str) -> Footprint {
        Footprint::new(
            id,
            FeatureClass::Road,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(4.0, 0.0),
                Point2::new(4.0, 4.0),
                Point2::new(0.0, 4.0),
            ],
        )
    }

    fn sample(z: f64) -> ElevationSample {
        ElevationSample {
            position: Point2::new(1.0, 1.0),
            z,
            classification: 2,
            within: true,
            radius: 1.0,
        }
    }

    #[test]
    fn record_and_release() {
        let store = FootprintStore::new(vec![square("a")]);
        let n = store.record(
            0,
            [
                (SampleTarget::Vertex { ring: 0, vertex: 2 }, sample(1.0)),
                (SampleTarget::Interior, sample(2.0)),
                (SampleTarget::Vertex { ring: 3, vertex: 0 }, sample(9.0)),
            ],
        );
        // out-of-range target ignored
        assert_eq!(n, 2);
        assert_eq!(store.samples(0).vertex_samples(0, 2).len(), 1);
        assert_eq!(store.total_samples(), 2);

        let taken = store.release(0);
        assert_eq!(taken.len(), 2);
        assert!(store.samples(0).is_empty());
    }

    #[test]
    fn concurrent_recording() {
        let store = Arc::new(FootprintStore::new(vec![square("a")]));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for k in 0..100 {
                        store.record(0, [(SampleTarget::Interior, sample((t * 100 + k) as f64))]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.total_samples(), 800);
    }

    #[test]
    fn poisoned_lock_recovered() {
        let store = Arc::new(FootprintStore::new(vec![square("a")]));
        store.record(0, [(SampleTarget::Interior, sample(1.0))]);
        let s = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = s.samples(0);
            panic!("writer died");
        })
        .join();
        assert_eq!(store.samples(0).len(), 1);
    }
}
