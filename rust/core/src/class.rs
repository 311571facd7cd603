// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Feature class tags.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of feature classes a footprint can belong to.
///
/// Per-class behaviour lives in [`crate::ClassPolicy`]; only buildings take a
/// different code path (dual height reference and block extrusion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureClass {
    Building = 0,
    Road = 1,
    Water = 2,
    Terrain = 3,
    Forest = 4,
    Separation = 5,
    #[serde(rename = "Bridge/Overpass", alias = "Bridge")]
    Bridge = 6,
}

impl FeatureClass {
    /// Number of feature classes.
    pub const COUNT: usize = 7;

    /// All classes in index order.
    pub const ALL: [FeatureClass; Self::COUNT] = [
        FeatureClass::Building,
        FeatureClass::Road,
        FeatureClass::Water,
        FeatureClass::Terrain,
        FeatureClass::Forest,
        FeatureClass::Separation,
        FeatureClass::Bridge,
    ];

    /// Dense index for per-class tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the class name as used in configuration documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureClass::Building => "Building",
            FeatureClass::Road => "Road",
            FeatureClass::Water => "Water",
            FeatureClass::Terrain => "Terrain",
            FeatureClass::Forest => "Forest",
            FeatureClass::Separation => "Separation",
            FeatureClass::Bridge => "Bridge/Overpass",
        }
    }

    /// Hard classes keep their elevation at shared vertices; soft classes
    /// (terrain-like surfaces) adapt to them.
    #[inline]
    pub fn is_hard(self) -> bool {
        !matches!(self, FeatureClass::Terrain | FeatureClass::Forest)
    }

    /// Classes whose interior points are inserted into the triangulation.
    #[inline]
    pub fn uses_interior_points(self) -> bool {
        matches!(self, FeatureClass::Terrain | FeatureClass::Forest)
    }
}

impl fmt::Display for FeatureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Building" => Ok(FeatureClass::Building),
            "Road" => Ok(FeatureClass::Road),
            "Water" => Ok(FeatureClass::Water),
            "Terrain" => Ok(FeatureClass::Terrain),
            "Forest" => Ok(FeatureClass::Forest),
            "Separation" => Ok(FeatureClass::Separation),
            "Bridge/Overpass" | "Bridge" => Ok(FeatureClass::Bridge),
            other => Err(Error::UnknownFeatureClass(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_all_order() {
        for (i, class) in FeatureClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
        }
    }

    #[test]
    fn parse_names() {
        assert_eq!("Bridge/Overpass".parse::<FeatureClass>().unwrap(), FeatureClass::Bridge);
        assert_eq!("Terrain".parse::<FeatureClass>().unwrap(), FeatureClass::Terrain);
        assert!(matches!(
            "Parking".parse::<FeatureClass>(),
            Err(Error::UnknownFeatureClass(_))
        ));
    }

    #[test]
    fn hard_and_soft() {
        assert!(FeatureClass::Road.is_hard());
        assert!(FeatureClass::Building.is_hard());
        assert!(!FeatureClass::Terrain.is_hard());
        assert!(!FeatureClass::Forest.is_hard());
    }

    #[test]
    fn serde_uses_document_names() {
        let json = serde_json::to_string(&FeatureClass::Bridge).unwrap();
        assert_eq!(json, "\"Bridge/Overpass\"");
        let back: FeatureClass = serde_json::from_str("\"Bridge\"").unwrap();
        assert_eq!(back, FeatureClass::Bridge);
    }
}
