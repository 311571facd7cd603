// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the reconstruction data model.

use thiserror::Error;

/// Result type alias for data model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading footprints, policies and configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A policy or option value is out of range. Rejected before any processing.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// A height reference string could not be parsed (expected `percentile-NN`).
    #[error("invalid height reference '{0}': expected 'percentile-NN' with 0 <= NN <= 100")]
    InvalidHeightReference(String),

    /// A feature class name is not one of the supported classes.
    #[error("unknown feature class '{0}'")]
    UnknownFeatureClass(String),

    /// The requested extent is inverted, empty or not finite.
    #[error("invalid extent [{xmin}, {ymin}, {xmax}, {ymax}]")]
    InvalidExtent {
        xmin: f64,
        ymin: f64,
        xmax: f64,
        ymax: f64,
    },

    /// A footprint ring has fewer than three distinct vertices.
    #[error("footprint '{id}' ring {ring} has only {count} distinct vertices")]
    DegenerateRing { id: String, ring: usize, count: usize },

    /// No footprints are left to process.
    #[error("no footprints loaded, cannot reconstruct the dataset")]
    NoFootprints,

    /// No elevation point reached the collector from any source.
    #[error("no elevation data ingested, cannot reconstruct the dataset")]
    NoElevationData,
}

impl Error {
    /// Shorthand for [`Error::InvalidConfig`].
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::InvalidExtent { .. } | Error::DegenerateRing { .. })
    }
}
