// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for document and edit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, editing or saving a vector document
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document error: {0}")]
    Document(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("No matching target: {0}")]
    NoMatchingTarget(String),

    #[error("Wall move caused overlap ({violations} overlapping segment pairs)")]
    GeometricConflict { violations: usize },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl From<dxf::DxfError> for Error {
    fn from(err: dxf::DxfError) -> Self {
        Error::Document(err.to_string())
    }
}

impl Error {
    /// True for failures caused by the command itself rather than the document
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidCommand(_)
                | Error::NoMatchingTarget(_)
                | Error::GeometricConflict { .. }
                | Error::Unsupported(_)
                | Error::InvalidGeometry(_)
        )
    }
}
