// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raster floor plan to vector wall reconstruction
//!
//! This crate turns a scanned or exported floor plan image into a DXF
//! document of wall axes:
//! 1. Line detection with Canny + Hough, retried with stricter or looser
//!    parameter tiers
//! 2. Merging of collinear fragments into single walls, then snapping
//!    near-axis walls to exact horizontals/verticals
//! 3. Optionally, a learned segmentation path producing wall outlines,
//!    windows and doors, tried before the classical path
//!
//! # Usage
//!
//! ```rust,ignore
//! use plancad_vision::{reconstruct_file, ReconstructionConfig};
//!
//! let config = ReconstructionConfig::from_env();
//! let result = reconstruct_file(Path::new("plan.png"), Path::new("plan.dxf"), &config, None)?;
//! println!("{} walls", result.report.merged_count);
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod image_ops;
pub mod line_ops;
pub mod merge;
pub mod pipeline;
pub mod segmentation;

pub use config::{DetectionConfig, MergeConfig, ReconstructionConfig, SegmentationConfig};
pub use detector::{DetectParams, DetectionTier, LineDetection, LineDetector, TierPlan, TierStep};
pub use error::{Result, VisionError};
pub use merge::{dedup_segments, merge_segments, orthogonalize, MergeParams, UnionFind};
pub use pipeline::{
    reconstruct_file, ClassicalReconstructor, LearnedReconstructor, PlanTransform, Reconstruction,
    ReconstructionChain, ReconstructionReport, Reconstructor,
};
pub use segmentation::{
    check_wall_mask, extract_document, ClassMap, InferenceError, LearnedSegmenter,
    SegmentationBackend, BACKGROUND_CLASS, DOOR_BLOCK, DOOR_CLASS, WALL_CLASS, WINDOW_BLOCK,
    WINDOW_CLASS,
};
