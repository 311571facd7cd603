// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point sources and the scene document
//!
//! A source is one already-parsed point cloud with its own thinning factor
//! and omitted classification codes. Thinning counts every point read; the
//! omitted codes are checked on the points thinning keeps.

use serde::{Deserialize, Serialize};
use terralift_core::{ClassCodes, Footprint};

/// One point-cloud sample as delivered by a reader
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub classification: u8,
}

impl PointRecord {
    pub fn new(x: f64, y: f64, z: f64, classification: u8) -> Self {
        Self {
            x,
            y,
            z,
            classification,
        }
    }
}

/// A point cloud with its per-source filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub name: String,
    /// Keep one of every N points (0 is treated as 1)
    #[serde(default)]
    pub thinning: u32,
    /// Classification codes dropped before collection
    #[serde(default)]
    pub omit_classes: ClassCodes,
    pub points: Vec<PointRecord>,
}

impl PointSource {
    pub fn new(name: impl Into<String>, points: Vec<PointRecord>) -> Self {
        Self {
            name: name.into(),
            points,
            ..Default::default()
        }
    }

    pub fn with_thinning(mut self, thinning: u32) -> Self {
        self.thinning = thinning;
        self
    }

    pub fn with_omitted(mut self, codes: &[u8]) -> Self {
        self.omit_classes = ClassCodes::from_codes(codes);
        self
    }

    #[inline]
    pub fn thinning_factor(&self) -> usize {
        self.thinning.max(1) as usize
    }

    /// Points that pass thinning and the omitted-class filter, in order
    pub fn delivered(&self) -> impl Iterator<Item = &PointRecord> + '_ {
        self.points
            .iter()
            .step_by(self.thinning_factor())
            .filter(move |p| !self.omit_classes.contains(p.classification))
    }
}

/// Input document: footprints plus point sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub footprints: Vec<Footprint>,
    #[serde(default)]
    pub sources: Vec<PointSource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<PointRecord> {
        (0..n)
            .map(|i| PointRecord::new(i as f64, 0.0, 1.0, (i % 4) as u8 + 1))
            .collect()
    }

    #[test]
    fn thinning_keeps_one_of_n() {
        let source = PointSource::new("a", numbered(100)).with_thinning(10);
        let kept: Vec<f64> = source.delivered().map(|p| p.x).collect();
        assert_eq!(kept.len(), 10);
        assert_eq!(kept[0], 0.0);
        assert_eq!(kept[1], 10.0);
    }

    #[test]
    fn zero_thinning_keeps_everything() {
        let source = PointSource::new("a", numbered(7)).with_thinning(0);
        assert_eq!(source.delivered().count(), 7);
    }

    #[test]
    fn omitted_classes_dropped() {
        // classes cycle 1, 2, 3, 4
        let source = PointSource::new("a", numbered(8)).with_omitted(&[1, 3]);
        assert!(source.delivered().all(|p| p.classification == 2 || p.classification == 4));
        assert_eq!(source.delivered().count(), 4);
    }

    #[test]
    fn scene_document() {
        let json = r#"{
            "footprints": [
                {"id": "r1", "class": "Road", "outer": [[0,0],[1,0],[1,1]]}
            ],
            "sources": [
                {"name": "ahn", "thinning": 2, "omit_classes": [7],
                 "points": [{"x": 0.5, "y": 0.2, "z": 3.0, "classification": 2}]}
            ]
        }"#;
        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.footprints.len(), 1);
        assert_eq!(scene.sources[0].thinning_factor(), 2);
        assert!(scene.sources[0].omit_classes.contains(7));
    }
}
