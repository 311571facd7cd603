// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Terralift Geometry
//!
//! Footprint bounding-box indexing with rstar, constrained triangulation of
//! lifted rings using earcutr, Steiner point insertion with Lawson edge
//! flips, vertical walls at jump edges and LoD1 building blocks.

pub mod error;
pub mod extrusion;
pub mod mesh;
pub mod polygon;
pub mod spatial_index;
pub mod triangulation;
pub mod walls;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Point3, Vector3};

pub use error::{Error, Result};
pub use extrusion::extrude_block;
pub use mesh::Mesh;
pub use polygon::{point_in_polygon, polygon_area, validate_rings};
pub use spatial_index::{Candidates, FootprintIndex};
pub use triangulation::{triangulate_polygon, triangulate_surface, SteinerOptions, Tin};
pub use walls::{mesh_walls, JumpEdgeIndex};
