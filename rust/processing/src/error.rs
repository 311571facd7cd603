// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the reconstruction pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] terralift_core::Error),

    #[error(transparent)]
    Geometry(#[from] terralift_geometry::Error),

    /// A sample set (or a whole footprint) had nothing to estimate from.
    #[error("No elevation samples")]
    NoData,
}

impl Error {
    /// Whether this error must abort the whole run rather than a single
    /// footprint.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Core(e) => e.is_fatal(),
            Error::Geometry(terralift_geometry::Error::EmptyIndex) => true,
            Error::Geometry(_) | Error::NoData => false,
        }
    }
}
