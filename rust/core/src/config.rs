// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction configuration document
//!
//! The document mirrors the declarative lifting options: global options plus
//! optional per-class overrides. [`ReconstructionConfig::resolve`] validates
//! everything and produces the immutable [`Policies`] table; invalid values
//! are rejected here, before any processing begins.

use crate::bounds::Extent;
use crate::class::FeatureClass;
use crate::codes::ClassCodes;
use crate::error::{Error, Result};
use crate::policy::{BuildingPolicy, ClassPolicy, HeightReference, Lod, TinPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Global lifting options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftingOptions {
    /// Sampling radius around boundary vertices (all classes but buildings)
    pub radius_vertex_elevation: f64,
    /// Sampling radius around building vertices
    pub building_radius_vertex_elevation: f64,
    /// Elevation difference above which adjacent surfaces are not merged and
    /// vertical walls are generated
    pub threshold_jump_edges: f64,
    pub use_vertical_walls: bool,
    pub stitching: bool,
    /// Restrict the run to footprints intersecting this box
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,
    /// Distance under which two vertices count as the same location
    pub snap_tolerance: f64,
    /// Outlier threshold in robust standard deviations
    pub outlier_sigma: f64,
    /// Iteration cap of the outlier filter
    pub max_outlier_iterations: usize,
}

impl Default for LiftingOptions {
    fn default() -> Self {
        Self {
            radius_vertex_elevation: 1.0,
            building_radius_vertex_elevation: 3.0,
            threshold_jump_edges: 0.5,
            use_vertical_walls: false,
            stitching: true,
            extent: None,
            snap_tolerance: 0.001,
            outlier_sigma: 3.0,
            max_outlier_iterations: 8,
        }
    }
}

impl LiftingOptions {
    /// Check value ranges. The extent is not checked here; an invalid extent
    /// is ignored at run time rather than rejected.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(Error::config(name, format!("must be > 0, got {}", v)))
            }
        };
        positive("radius_vertex_elevation", self.radius_vertex_elevation)?;
        positive("building_radius_vertex_elevation", self.building_radius_vertex_elevation)?;
        positive("snap_tolerance", self.snap_tolerance)?;
        positive("outlier_sigma", self.outlier_sigma)?;
        if !(self.threshold_jump_edges.is_finite() && self.threshold_jump_edges >= 0.0) {
            return Err(Error::config(
                "threshold_jump_edges",
                format!("must be >= 0, got {}", self.threshold_jump_edges),
            ));
        }
        if self.max_outlier_iterations == 0 {
            return Err(Error::config("max_outlier_iterations", "must be at least 1"));
        }
        Ok(())
    }

    /// The requested extent if it is usable.
    pub fn valid_extent(&self) -> Option<Result<Extent>> {
        self.extent.map(Extent::validated)
    }
}

/// Per-class overrides as written in the document. Missing fields keep the
/// class defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassOverrides {
    pub height: Option<HeightReference>,
    pub use_classes: Option<ClassCodes>,
    pub radius: Option<f64>,
    pub filter_outliers: Option<bool>,
    pub max_outlier_fraction: Option<f64>,
    pub flatten: Option<bool>,
    // TIN classes
    pub simplification: Option<u32>,
    pub simplification_tolerance: Option<f64>,
    pub inner_buffer: Option<f64>,
    pub ground_points_only: Option<bool>,
    // Buildings
    pub roof_height: Option<HeightReference>,
    pub roof_classes: Option<ClassCodes>,
    pub lod: Option<Lod>,
    pub triangulate: Option<bool>,
    pub include_floor: Option<bool>,
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub options: LiftingOptions,
    /// Keyed by class name (`"Building"`, `"Bridge/Overpass"`, ...)
    pub classes: BTreeMap<FeatureClass, ClassOverrides>,
}

impl ReconstructionConfig {
    /// Validate and resolve into per-class policies.
    pub fn resolve(&self) -> Result<Policies> {
        self.options.validate()?;

        let mut table = Vec::with_capacity(FeatureClass::COUNT);
        for class in FeatureClass::ALL {
            let radius = match class {
                FeatureClass::Building => self.options.building_radius_vertex_elevation,
                _ => self.options.radius_vertex_elevation,
            };
            let mut policy = ClassPolicy::defaults_for(class, radius);
            if let Some(o) = self.classes.get(&class) {
                apply_overrides(&mut policy, o)?;
            }
            policy.validate()?;
            table.push(Arc::new(policy));
        }

        Ok(Policies {
            table,
            options: self.options.clone(),
        })
    }
}

fn apply_overrides(policy: &mut ClassPolicy, o: &ClassOverrides) -> Result<()> {
    let class = policy.class;
    let only = |ok: bool, name: &str| {
        if ok {
            Ok(())
        } else {
            Err(Error::config(
                format!("{}.{}", class, name),
                "option does not apply to this class",
            ))
        }
    };

    if let Some(h) = o.height {
        policy.height = h;
    }
    if let Some(c) = o.use_classes {
        policy.allowed_classes = c;
    }
    if let Some(r) = o.radius {
        policy.radius = r;
    }
    if let Some(f) = o.filter_outliers {
        policy.filter_outliers = f;
    }
    if let Some(f) = o.max_outlier_fraction {
        policy.max_outlier_fraction = f;
    }
    if let Some(f) = o.flatten {
        policy.flatten = f;
    }

    let tin_fields = o.simplification.is_some()
        || o.simplification_tolerance.is_some()
        || o.inner_buffer.is_some()
        || o.ground_points_only.is_some();
    if tin_fields {
        only(class.uses_interior_points(), "simplification")?;
        let tin = policy.tin.get_or_insert_with(TinPolicy::default);
        if let Some(v) = o.simplification {
            tin.simplification = v;
        }
        if let Some(v) = o.simplification_tolerance {
            tin.simplification_tolerance = v;
        }
        if let Some(v) = o.inner_buffer {
            tin.inner_buffer = v;
        }
        if let Some(v) = o.ground_points_only {
            only(class == FeatureClass::Forest, "ground_points_only")?;
            tin.ground_points_only = v;
        }
    }

    let building_fields = o.roof_height.is_some()
        || o.roof_classes.is_some()
        || o.lod.is_some()
        || o.triangulate.is_some()
        || o.include_floor.is_some();
    if building_fields {
        only(class == FeatureClass::Building, "roof")?;
        let b = policy.building.get_or_insert_with(BuildingPolicy::default);
        if let Some(v) = o.roof_height {
            b.roof_height = v;
        }
        if let Some(v) = o.roof_classes {
            b.roof_classes = v;
        }
        if let Some(v) = o.lod {
            b.lod = v;
        }
        if let Some(v) = o.triangulate {
            b.triangulate = v;
        }
        if let Some(v) = o.include_floor {
            b.include_floor = v;
        }
    }
    Ok(())
}

/// Immutable per-class policy table plus the global options.
#[derive(Debug, Clone)]
pub struct Policies {
    table: Vec<Arc<ClassPolicy>>,
    options: LiftingOptions,
}

impl Policies {
    /// Policy of a class, shared by reference.
    #[inline]
    pub fn get(&self, class: FeatureClass) -> &Arc<ClassPolicy> {
        &self.table[class.index()]
    }

    #[inline]
    pub fn options(&self) -> &LiftingOptions {
        &self.options
    }

    /// Largest sampling radius of any class; bounds index queries.
    pub fn max_radius(&self) -> f64 {
        self.table.iter().map(|p| p.radius).fold(0.0, f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClassPolicy>> {
        self.table.iter()
    }
}

impl Default for Policies {
    fn default() -> Self {
        // Defaults always validate.
        ReconstructionConfig::default()
            .resolve()
            .unwrap_or_else(|_| unreachable!("default configuration is valid"))
    }
}
