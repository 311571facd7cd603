// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during indexing and meshing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Degenerate ring {ring}: {reason}")]
    DegenerateRing { ring: usize, reason: String },

    #[error("Ring {ring} intersects itself or ring {other}")]
    SelfIntersection { ring: usize, other: usize },

    #[error("Triangulation failed: {0}")]
    TriangulationError(String),

    #[error("Cannot build a spatial index over an empty footprint set")]
    EmptyIndex,
}

impl Error {
    /// Shorthand for [`Error::DegenerateRing`].
    pub fn degenerate(ring: usize, reason: impl Into<String>) -> Self {
        Error::DegenerateRing {
            ring,
            reason: reason.into(),
        }
    }
}
