// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Terralift Core
//!
//! Data model shared by the geometry and processing crates: footprints,
//! elevation samples, lifted vertices and the per-class lifting policies.
//!
//! ## Overview
//!
//! - **Footprints**: 2D polygons with holes, a [`FeatureClass`] tag and
//!   pass-through attributes
//! - **Policies**: per-class height references, accepted classification
//!   codes, sampling radii and outlier settings, resolved once from a
//!   [`ReconstructionConfig`] document into an immutable [`Policies`] table
//! - **Samples**: [`ElevationSample`] records accepted by the collector
//! - **Lifted vertices**: boundary vertices with an elevation and its
//!   [`Provenance`]
//!
//! ## Quick Start
//!
//! ```rust
//! use terralift_core::{FeatureClass, ReconstructionConfig};
//!
//! let policies = ReconstructionConfig::default().resolve().unwrap();
//! let road = policies.get(FeatureClass::Road);
//! assert_eq!(road.height.value(), 50.0);
//! assert!(road.accepts_vertex_sample(2));
//! ```

pub mod bounds;
pub mod class;
pub mod codes;
pub mod config;
pub mod error;
pub mod footprint;
pub mod policy;

pub use bounds::{BBox2, Extent};
pub use class::FeatureClass;
pub use codes::ClassCodes;
pub use config::{ClassOverrides, LiftingOptions, Policies, ReconstructionConfig};
pub use error::{Error, Result};
pub use footprint::{
    AttributeMap, ElevationSample, Footprint, LiftedVertex, Provenance, Ring, SampleTarget,
};
pub use policy::{BuildingPolicy, ClassPolicy, HeightReference, Lod, TinPolicy};

pub use nalgebra::{Point2, Point3};
