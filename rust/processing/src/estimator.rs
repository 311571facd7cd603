// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Height estimation: percentiles with bounded MAD outlier rejection

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use terralift_core::{HeightReference, LiftingOptions};

/// Scale from MAD to standard deviation for normal data
const MAD_SCALE: f64 = 1.4826;

/// Below this many kept values the filter stops
const MIN_KEPT: usize = 3;

/// What the outlier filter did to one set of values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlierReport {
    pub sample_count: usize,
    pub discarded: usize,
    pub iterations: usize,
    /// False when the budget ran out or the iteration cap was hit
    pub converged: bool,
}

impl OutlierReport {
    /// Fold another report into a running total
    pub fn merge(&mut self, other: &OutlierReport) {
        self.sample_count += other.sample_count;
        self.discarded += other.discarded;
        self.iterations = self.iterations.max(other.iterations);
        self.converged = self.converged && other.converged;
    }
}

/// A single estimated elevation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub z: f64,
    pub report: OutlierReport,
}

/// Reduces sample elevations to one value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightEstimator {
    pub sigma: f64,
    pub max_iterations: usize,
}

impl Default for HeightEstimator {
    fn default() -> Self {
        Self {
            sigma: 3.0,
            max_iterations: 8,
        }
    }
}

impl HeightEstimator {
    pub fn from_options(options: &LiftingOptions) -> Self {
        Self {
            sigma: options.outlier_sigma,
            max_iterations: options.max_outlier_iterations,
        }
    }

    /// Nearest-rank percentile: index `round(p/100 * (n-1))` of the sorted values.
    pub fn percentile(values: &[f64], reference: HeightReference) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut scratch = values.to_vec();
        let rank = ((reference.fraction() * (scratch.len() - 1) as f64).round() as usize).min(scratch.len() - 1);
        let (_, v, _) = scratch.select_nth_unstable_by(rank, f64::total_cmp);
        Some(*v)
    }

    /// Estimate an elevation. With `max_fraction` set, outliers are removed
    /// first within a budget of `ceil(max_fraction * n)` values.
    pub fn estimate(&self, values: &[f64], reference: HeightReference, max_fraction: Option<f64>) -> Result<Estimate> {
        if values.is_empty() {
            return Err(Error::NoData);
        }
        let Some(fraction) = max_fraction else {
            let z = Self::percentile(values, reference).ok_or(Error::NoData)?;
            return Ok(Estimate {
                z,
                report: OutlierReport {
                    sample_count: values.len(),
                    converged: true,
                    ..Default::default()
                },
            });
        };

        let (keep, report) = self.outlier_mask(values, fraction);
        let kept: Vec<f64> = values
            .iter()
            .zip(&keep)
            .filter_map(|(v, k)| k.then_some(*v))
            .collect();
        let z = Self::percentile(&kept, reference).ok_or(Error::NoData)?;
        Ok(Estimate { z, report })
    }

    /// Mark values to keep. The number of `false` entries never exceeds
    /// `ceil(max_fraction * n)`.
    pub fn outlier_mask(&self, values: &[f64], max_fraction: f64) -> (Vec<bool>, OutlierReport) {
        let n = values.len();
        let mut keep = vec![true; n];
        let mut report = OutlierReport {
            sample_count: n,
            ..Default::default()
        };
        let budget = (max_fraction.clamp(0.0, 1.0) * n as f64 - 1e-9).ceil().max(0.0) as usize;

        let mut kept_count = n;
        for _ in 0..self.max_iterations {
            if kept_count < MIN_KEPT || report.discarded >= budget {
                report.converged = kept_count < MIN_KEPT || self.no_outliers(values, &keep);
                return (keep, report);
            }
            report.iterations += 1;

            let kept: Vec<f64> = values
                .iter()
                .zip(&keep)
                .filter_map(|(v, k)| k.then_some(*v))
                .collect();
            let Some(centre) = median(&kept) else { break };
            let deviations: Vec<f64> = kept.iter().map(|v| (v - centre).abs()).collect();
            let mad = median(&deviations).unwrap_or(0.0);
            let threshold = self.sigma * MAD_SCALE * mad;

            let mut candidates: Vec<(usize, f64)> = values
                .iter()
                .enumerate()
                .filter(|(i, _)| keep[*i])
                .map(|(i, v)| (i, (v - centre).abs()))
                .filter(|(_, d)| *d > threshold)
                .collect();
            if candidates.is_empty() {
                report.converged = true;
                return (keep, report);
            }
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

            let remaining = budget - report.discarded;
            let exhausted = candidates.len() > remaining;
            for (i, _) in candidates.into_iter().take(remaining) {
                keep[i] = false;
                report.discarded += 1;
                kept_count -= 1;
            }
            if exhausted {
                report.converged = false;
                return (keep, report);
            }
        }

        report.converged = kept_count < MIN_KEPT || self.no_outliers(values, &keep);
        (keep, report)
    }

    /// True when no kept value exceeds the current MAD threshold
    fn no_outliers(&self, values: &[f64], keep: &[bool]) -> bool {
        let kept: Vec<f64> = values
            .iter()
            .zip(keep)
            .filter_map(|(v, k)| k.then_some(*v))
            .collect();
        let Some(m) = median(&kept) else { return true };
        let deviations: Vec<f64> = kept.iter().map(|v| (v - m).abs()).collect();
        let threshold = self.sigma * MAD_SCALE * median(&deviations).unwrap_or(0.0);
        deviations.iter().all(|d| *d <= threshold)
    }
}

/// Median; the mean of the two middle values for an even count
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(v: f64) -> HeightReference {
        HeightReference::percentile(v).unwrap()
    }

    #[test]
    fn uniform_values_any_percentile() {
        let values = vec![7.25; 13];
        for q in [0.0, 10.0, 33.0, 50.0, 90.0, 100.0] {
            let est = HeightEstimator::default().estimate(&values, p(q), None).unwrap();
            assert_eq!(est.z, 7.25);
            let est = HeightEstimator::default().estimate(&values, p(q), Some(0.3)).unwrap();
            assert_eq!(est.z, 7.25);
            assert_eq!(est.report.discarded, 0);
        }
    }

    #[test]
    fn nearest_rank() {
        let values = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(HeightEstimator::percentile(&values, p(0.0)), Some(1.0));
        assert_eq!(HeightEstimator::percentile(&values, p(50.0)), Some(3.0));
        assert_eq!(HeightEstimator::percentile(&values, p(100.0)), Some(5.0));
        // 0.9 * 4 = 3.6 -> rank 4
        assert_eq!(HeightEstimator::percentile(&values, p(90.0)), Some(5.0));
        // 0.1 * 4 = 0.4 -> rank 0
        assert_eq!(HeightEstimator::percentile(&values, p(10.0)), Some(1.0));
        assert_eq!(HeightEstimator::percentile(&[], p(10.0)), None);
    }

    #[test]
    fn empty_is_no_data() {
        assert_eq!(
            HeightEstimator::default().estimate(&[], p(50.0), None),
            Err(Error::NoData)
        );
    }

    #[test]
    fn single_spike_removed() {
        let mut values = vec![5.0; 9];
        values.push(500.0);
        let est = HeightEstimator::default().estimate(&values, p(50.0), Some(0.2)).unwrap();
        assert_eq!(est.z, 5.0);
        assert_eq!(est.report.discarded, 1);
        assert!(est.report.converged);
    }

    #[test]
    fn noisy_values_keep_inliers() {
        let mut values: Vec<f64> = (0..40).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
        values.extend([55.0, -30.0]);
        let est = HeightEstimator::default().estimate(&values, p(50.0), Some(0.1)).unwrap();
        assert_eq!(est.report.discarded, 2);
        assert_relative_eq!(est.z, 10.2, epsilon = 1e-12);
    }

    #[test]
    fn discard_bound_holds() {
        let estimator = HeightEstimator::default();
        for n in [1usize, 2, 5, 10, 17, 64] {
            // half the values are wild
            let values: Vec<f64> = (0..n)
                .map(|i| if i % 2 == 0 { 1.0 } else { 1000.0 * i as f64 })
                .collect();
            for fraction in [0.0, 0.05, 0.1, 0.25, 0.5] {
                let (keep, report) = estimator.outlier_mask(&values, fraction);
                let budget = (fraction * n as f64).ceil() as usize;
                let dropped = keep.iter().filter(|k| !**k).count();
                assert_eq!(dropped, report.discarded);
                assert!(dropped <= budget, "n={} f={} dropped={}", n, fraction, dropped);
                assert!(report.iterations <= estimator.max_iterations);
            }
        }
    }

    #[test]
    fn budget_exhaustion_stops() {
        let mut values = vec![0.0; 10];
        values.extend([100.0, 200.0, 300.0]);
        let (keep, report) = HeightEstimator::default().outlier_mask(&values, 0.1);
        // ceil(0.1 * 13) = 2, the two largest deviations go
        assert_eq!(report.discarded, 2);
        assert!(!keep[12] && !keep[11] && keep[10]);
        assert!(!report.converged);
    }

    #[test]
    fn merge_reports() {
        let mut total = OutlierReport {
            converged: true,
            ..Default::default()
        };
        total.merge(&OutlierReport {
            sample_count: 4,
            discarded: 1,
            iterations: 2,
            converged: true,
        });
        total.merge(&OutlierReport {
            sample_count: 6,
            discarded: 0,
            iterations: 1,
            converged: false,
        });
        assert_eq!(total.sample_count, 10);
        assert_eq!(total.discarded, 1);
        assert_eq!(total.iterations, 2);
        assert!(!total.converged);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
