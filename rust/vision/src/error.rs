// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for reconstruction
pub type Result<T> = std::result::Result<T, VisionError>;

/// Errors raised while turning a raster plan into vector geometry
#[derive(Error, Debug)]
pub enum VisionError {
    /// The input is too weak or too noisy to reconstruct; the user should
    /// supply a clearer image.
    #[error("Image not clear enough: {0}")]
    Clarity(String),

    /// This reconstruction path cannot handle the input; another path may
    #[error("Reconstruction path unusable: {0}")]
    Unusable(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Geometry error: {0}")]
    Geometry(#[from] plancad_geometry::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VisionError {
    /// True when the fix is a better input image
    pub fn is_clarity(&self) -> bool {
        matches!(self, VisionError::Clarity(_))
    }

    pub fn is_unusable(&self) -> bool {
        matches!(self, VisionError::Unusable(_))
    }
}
