// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-class lifting policies
//!
//! A [`ClassPolicy`] is resolved once from the configuration document and
//! then shared by reference with every footprint of that class.

use crate::class::FeatureClass;
use crate::codes::ClassCodes;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which statistic of the accepted samples becomes the elevation.
///
/// Written as `"percentile-NN"` in documents; a bare number is accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HeightReferenceDoc", into = "String")]
pub struct HeightReference {
    percentile: f64,
}

impl HeightReference {
    /// Percentile reference, 0 <= p <= 100.
    pub fn percentile(p: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&p) {
            return Err(Error::InvalidHeightReference(format!("percentile-{}", p)));
        }
        Ok(Self { percentile: p })
    }

    /// Median reference.
    pub const fn median() -> Self {
        Self { percentile: 50.0 }
    }

    /// The percentile in [0, 100].
    #[inline]
    pub fn value(&self) -> f64 {
        self.percentile
    }

    /// The percentile as a fraction in [0, 1].
    #[inline]
    pub fn fraction(&self) -> f64 {
        self.percentile / 100.0
    }
}

impl FromStr for HeightReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidHeightReference(s.to_string());
        let (kind, value) = s.split_once('-').ok_or_else(invalid)?;
        if kind != "percentile" {
            return Err(invalid());
        }
        let p: f64 = value.trim().parse().map_err(|_| invalid())?;
        HeightReference::percentile(p).map_err(|_| invalid())
    }
}

impl fmt::Display for HeightReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "percentile-{}", self.percentile)
    }
}

impl From<HeightReference> for String {
    fn from(h: HeightReference) -> Self {
        h.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeightReferenceDoc {
    Text(String),
    Number(f64),
}

impl TryFrom<HeightReferenceDoc> for HeightReference {
    type Error = Error;

    fn try_from(doc: HeightReferenceDoc) -> Result<Self> {
        match doc {
            HeightReferenceDoc::Text(s) => s.parse(),
            HeightReferenceDoc::Number(p) => HeightReference::percentile(p),
        }
    }
}

/// Building level of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Lod {
    /// Footprint lifted to ground level
    Lod0,
    /// Flat-roofed block
    Lod1,
}

impl TryFrom<u8> for Lod {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Lod::Lod0),
            1 => Ok(Lod::Lod1),
            other => Err(Error::config("Building.lod", format!("must be 0 or 1, got {}", other))),
        }
    }
}

impl From<Lod> for u8 {
    fn from(l: Lod) -> Self {
        match l {
            Lod::Lod0 => 0,
            Lod::Lod1 => 1,
        }
    }
}

/// Building-only settings: roof reference and block generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingPolicy {
    /// Roof elevation reference over interior samples
    pub roof_height: HeightReference,
    /// Classification codes accepted for roof samples
    pub roof_classes: ClassCodes,
    pub lod: Lod,
    /// Produce a mesh at all; when false only lifted rings are emitted
    pub triangulate: bool,
    /// Close the LoD1 block with a floor
    pub include_floor: bool,
}

impl Default for BuildingPolicy {
    fn default() -> Self {
        Self {
            roof_height: HeightReference { percentile: 90.0 },
            roof_classes: ClassCodes::from_codes(&[6]),
            lod: Lod::Lod1,
            triangulate: true,
            include_floor: false,
        }
    }
}

/// Interior-point settings for TIN classes (terrain, forest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TinPolicy {
    /// Keep one of every N interior points (0 and 1 keep all)
    pub simplification: u32,
    /// Vertical tolerance: points closer than this to the current surface are not inserted
    pub simplification_tolerance: f64,
    /// Interior points closer than this to the boundary are ignored
    pub inner_buffer: f64,
    /// Forest only: restrict interior points to ground codes
    pub ground_points_only: bool,
    /// Codes treated as ground when `ground_points_only` is set
    pub ground_classes: ClassCodes,
}

impl Default for TinPolicy {
    fn default() -> Self {
        Self {
            simplification: 0,
            simplification_tolerance: 0.0,
            inner_buffer: 0.0,
            ground_points_only: false,
            ground_classes: ClassCodes::from_codes(&[2]),
        }
    }
}

/// The resolved lifting policy of one feature class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicy {
    pub class: FeatureClass,
    /// Vertex (and, for non-buildings, interior) elevation reference
    pub height: HeightReference,
    /// Classification codes accepted for this class
    pub allowed_classes: ClassCodes,
    /// Sampling radius around boundary vertices
    pub radius: f64,
    pub filter_outliers: bool,
    /// Upper bound on the fraction of samples the outlier filter may discard
    pub max_outlier_fraction: f64,
    /// Collapse the footprint to one elevation
    pub flatten: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tin: Option<TinPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<BuildingPolicy>,
}

impl ClassPolicy {
    /// Built-in defaults for a class, before configuration overrides.
    pub fn defaults_for(class: FeatureClass, radius: f64) -> Self {
        let (percentile, codes, flatten) = match class {
            FeatureClass::Building => (10.0, ClassCodes::from_codes(&[2]), false),
            FeatureClass::Road => (50.0, ClassCodes::from_codes(&[2]), false),
            FeatureClass::Water => (10.0, ClassCodes::from_codes(&[2, 9]), true),
            FeatureClass::Terrain => (50.0, ClassCodes::from_codes(&[2]), false),
            FeatureClass::Forest => (50.0, ClassCodes::from_codes(&[2, 3, 4, 5]), false),
            FeatureClass::Separation => (80.0, ClassCodes::from_codes(&[2]), false),
            FeatureClass::Bridge => (50.0, ClassCodes::from_codes(&[2, 17]), false),
        };
        Self {
            class,
            height: HeightReference { percentile },
            allowed_classes: codes,
            radius,
            filter_outliers: false,
            max_outlier_fraction: 0.1,
            flatten,
            tin: class.uses_interior_points().then(TinPolicy::default),
            building: (class == FeatureClass::Building).then(BuildingPolicy::default),
        }
    }

    /// Codes accepted for a sample of either kind.
    pub fn accepted_classes(&self) -> ClassCodes {
        match &self.building {
            Some(b) => self.allowed_classes.union(&b.roof_classes),
            None => self.allowed_classes,
        }
    }

    /// Whether a code is accepted for a vertex sample.
    #[inline]
    pub fn accepts_vertex_sample(&self, code: u8) -> bool {
        self.allowed_classes.contains(code)
    }

    /// Whether a code is accepted for an interior sample.
    #[inline]
    pub fn accepts_interior_sample(&self, code: u8) -> bool {
        if let Some(b) = &self.building {
            return b.roof_classes.contains(code);
        }
        if let Some(t) = &self.tin {
            if t.ground_points_only && !t.ground_classes.contains(code) {
                return false;
            }
        }
        self.allowed_classes.contains(code)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let field = |name: &str| format!("{}.{}", self.class, name);
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(Error::config(field("radius"), format!("must be > 0, got {}", self.radius)));
        }
        if !(0.0..=1.0).contains(&self.max_outlier_fraction) {
            return Err(Error::config(
                field("max_outlier_fraction"),
                format!("must be within [0, 1], got {}", self.max_outlier_fraction),
            ));
        }
        if self.allowed_classes.is_empty() {
            return Err(Error::config(field("use_classes"), "at least one classification code is required"));
        }
        if let Some(t) = &self.tin {
            if !(t.inner_buffer.is_finite() && t.inner_buffer >= 0.0) {
                return Err(Error::config(field("inner_buffer"), "must be >= 0"));
            }
            if !(t.simplification_tolerance.is_finite() && t.simplification_tolerance >= 0.0) {
                return Err(Error::config(field("simplification_tolerance"), "must be >= 0"));
            }
        }
        if let Some(b) = &self.building {
            if b.roof_classes.is_empty() {
                return Err(Error::config(field("roof.use_classes"), "at least one classification code is required"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_percentile_reference() {
        let h: HeightReference = "percentile-90".parse().unwrap();
        assert_eq!(h.value(), 90.0);
        assert!((h.fraction() - 0.9).abs() < 1e-12);

        assert!("percentile-101".parse::<HeightReference>().is_err());
        assert!("median".parse::<HeightReference>().is_err());
        assert!("mean-50".parse::<HeightReference>().is_err());
    }

    #[test]
    fn reference_from_document() {
        let h: HeightReference = serde_json::from_str("\"percentile-10\"").unwrap();
        assert_eq!(h.value(), 10.0);
        let h: HeightReference = serde_json::from_str("75").unwrap();
        assert_eq!(h.value(), 75.0);
        assert!(serde_json::from_str::<HeightReference>("-5").is_err());
        assert_eq!(serde_json::to_string(&h).unwrap(), "\"percentile-75\"");
    }

    #[test]
    fn lod_range() {
        assert_eq!(Lod::try_from(1).unwrap(), Lod::Lod1);
        assert!(Lod::try_from(2).is_err());
    }

    #[test]
    fn building_sample_codes() {
        let p = ClassPolicy::defaults_for(FeatureClass::Building, 3.0);
        assert!(p.accepts_vertex_sample(2));
        assert!(!p.accepts_vertex_sample(6));
        assert!(p.accepts_interior_sample(6));
        assert!(!p.accepts_interior_sample(2));
        assert!(p.accepted_classes().contains(2) && p.accepted_classes().contains(6));
    }

    #[test]
    fn forest_ground_points_only() {
        let mut p = ClassPolicy::defaults_for(FeatureClass::Forest, 1.0);
        assert!(p.accepts_interior_sample(4));
        p.tin.as_mut().unwrap().ground_points_only = true;
        assert!(!p.accepts_interior_sample(4));
        assert!(p.accepts_interior_sample(2));
    }

    #[test]
    fn validate_ranges() {
        let mut p = ClassPolicy::defaults_for(FeatureClass::Road, 1.0);
        assert!(p.validate().is_ok());
        p.max_outlier_fraction = 1.5;
        assert!(matches!(p.validate(), Err(Error::InvalidConfig { .. })));
        p.max_outlier_fraction = 0.2;
        p.radius = 0.0;
        assert!(p.validate().is_err());
    }
}
