// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction chain
//!
//! Each [`Reconstructor`] turns a decoded image into a [`VectorDocument`]
//! in millimeters. [`ReconstructionChain`] runs them in priority order and
//! falls through to the next one whenever a stage reports
//! [`VisionError::Unusable`].

use crate::config::{MergeConfig, ReconstructionConfig};
use crate::detector::{DetectParams, DetectionTier, LineDetector};
use crate::error::{Result, VisionError};
use crate::merge::{merge_segments, orthogonalize, MergeParams};
use crate::segmentation::{extract_document, LearnedSegmenter};
use image::DynamicImage;
use plancad_geometry::{write_dxf, Point2D, Segment2D, VectorDocument, WALL_LAYER};
use serde::Serialize;
use std::path::Path;

/// Pixel -> millimeter mapping with the Y axis flipped.
///
/// Pixel coordinates are relative to the working (possibly cropped) image;
/// the crop offset is added back before scaling so output coordinates refer
/// to the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanTransform {
    pub full_height: u32,
    pub offset: (u32, u32),
    pub mm_per_px: f64,
}

impl PlanTransform {
    pub fn new(full_height: u32, offset: (u32, u32), mm_per_px: f64) -> Self {
        Self {
            full_height,
            offset,
            mm_per_px,
        }
    }

    pub fn to_world(&self, p: &Point2D) -> Point2D {
        let x = p.x + self.offset.0 as f64;
        let y = p.y + self.offset.1 as f64;
        Point2D::new(
            x * self.mm_per_px,
            (self.full_height as f64 - y) * self.mm_per_px,
        )
    }

    pub fn segment_to_world(&self, s: &Segment2D) -> Segment2D {
        Segment2D::new(self.to_world(&s.start), self.to_world(&s.end))
    }
}

/// What a reconstruction run did, for logs and callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructionReport {
    pub reconstructor: String,
    /// Detection tier; `None` for the learned path
    pub tier: Option<DetectionTier>,
    pub raw_count: usize,
    pub merged_count: usize,
    pub crop_offset: (u32, u32),
    pub used_fallback: bool,
}

/// Output of a successful stage
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub document: VectorDocument,
    pub report: ReconstructionReport,
}

/// One way of turning a raster plan into vectors
pub trait Reconstructor {
    fn name(&self) -> &str;

    /// `Unusable` hands over to the next stage; any other error is final
    fn attempt(&mut self, image: &DynamicImage) -> Result<Reconstruction>;
}

/// Canny/Hough detection followed by merging and orthogonalization
pub struct ClassicalReconstructor {
    detector: LineDetector,
    merge: MergeConfig,
    mm_per_px: f64,
    min_merged_segments: usize,
}

impl ClassicalReconstructor {
    pub fn new(config: &ReconstructionConfig) -> Self {
        Self {
            detector: LineDetector::new(config.detection.clone()),
            merge: config.merge.clone(),
            mm_per_px: config.mm_per_px,
            min_merged_segments: config.min_merged_segments,
        }
    }

    /// Merge tolerances; gap and length default to the base detection tier
    fn merge_params(&self) -> MergeParams {
        let base = DetectParams::from_config(self.detector.config());
        MergeParams {
            angle_tol_deg: self.merge.angle_tol_deg,
            dist_tol_px: self.merge.dist_tol_px,
            gap_tol_px: self.merge.gap_tol_px.unwrap_or(base.max_gap as f64),
            min_len_px: self.merge.min_len_px.unwrap_or(base.min_line as f64),
        }
    }
}

impl Reconstructor for ClassicalReconstructor {
    fn name(&self) -> &str {
        "classical"
    }

    fn attempt(&mut self, image: &DynamicImage) -> Result<Reconstruction> {
        let gray = image.to_luma8();
        let detection = self.detector.detect(&gray)?;

        let mut segments = if self.merge.enabled {
            merge_segments(&detection.segments, &self.merge_params())
        } else {
            detection.segments.clone()
        };
        if self.merge.ortho && !segments.is_empty() {
            segments = orthogonalize(&segments, self.merge.ortho_tol_deg);
        }
        tracing::info!(
            raw = detection.raw_count,
            merged = segments.len(),
            "Merged lines into wall axes"
        );
        if segments.len() < self.min_merged_segments.max(1) {
            return Err(VisionError::Clarity(format!(
                "only {} wall lines after merging; provide a clearer image",
                segments.len()
            )));
        }

        let transform = PlanTransform::new(detection.image_height, detection.crop_offset, self.mm_per_px);
        let mut document = VectorDocument::new();
        for s in &segments {
            let w = transform.segment_to_world(s);
            document.add_line(WALL_LAYER, w.start, w.end);
        }

        Ok(Reconstruction {
            report: ReconstructionReport {
                reconstructor: self.name().to_string(),
                tier: Some(detection.tier),
                raw_count: detection.raw_count,
                merged_count: segments.len(),
                crop_offset: detection.crop_offset,
                used_fallback: detection.used_fallback,
            },
            document,
        })
    }
}

/// Semantic segmentation followed by contour vectorization
pub struct LearnedReconstructor {
    segmenter: LearnedSegmenter,
    mm_per_px: f64,
}

impl LearnedReconstructor {
    pub fn new(segmenter: LearnedSegmenter, mm_per_px: f64) -> Self {
        Self {
            segmenter,
            mm_per_px,
        }
    }
}

impl Reconstructor for LearnedReconstructor {
    fn name(&self) -> &str {
        "learned"
    }

    fn attempt(&mut self, image: &DynamicImage) -> Result<Reconstruction> {
        let classes = self.segmenter.segment(image)?;
        let transform = PlanTransform::new(image.height(), (0, 0), self.mm_per_px);
        let document = extract_document(&classes, self.segmenter.config(), &transform)?;
        let walls = document
            .entities()
            .iter()
            .filter(|e| e.is_on_layer(WALL_LAYER))
            .count();
        Ok(Reconstruction {
            report: ReconstructionReport {
                reconstructor: self.name().to_string(),
                tier: None,
                raw_count: walls,
                merged_count: walls,
                crop_offset: (0, 0),
                used_fallback: false,
            },
            document,
        })
    }
}

/// Reconstructors in fixed priority order
#[derive(Default)]
pub struct ReconstructionChain {
    stages: Vec<Box<dyn Reconstructor>>,
}

impl ReconstructionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learned path first when a segmenter is available, classical last
    pub fn from_config(config: &ReconstructionConfig, segmenter: Option<LearnedSegmenter>) -> Self {
        let mut chain = Self::new();
        if let Some(segmenter) = segmenter {
            chain = chain.with_stage(Box::new(LearnedReconstructor::new(segmenter, config.mm_per_px)));
        }
        chain.with_stage(Box::new(ClassicalReconstructor::new(config)))
    }

    pub fn with_stage(mut self, stage: Box<dyn Reconstructor>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&mut self, image: &DynamicImage) -> Result<Reconstruction> {
        let mut reasons = Vec::new();
        for stage in self.stages.iter_mut() {
            match stage.attempt(image) {
                Ok(result) => {
                    tracing::info!(
                        reconstructor = stage.name(),
                        entities = result.document.len(),
                        "Reconstruction succeeded"
                    );
                    return Ok(result);
                }
                Err(VisionError::Unusable(reason)) => {
                    tracing::warn!(reconstructor = stage.name(), %reason, "Falling back to next reconstructor");
                    reasons.push(format!("{}: {}", stage.name(), reason));
                }
                Err(e) => return Err(e),
            }
        }
        Err(VisionError::Clarity(if reasons.is_empty() {
            "no reconstructor available".to_string()
        } else {
            format!("no reconstructor could read the image ({})", reasons.join("; "))
        }))
    }
}

/// Decode `image_path`, reconstruct it and write the result as DXF.
///
/// Only the classical path runs unless a segmenter is supplied.
pub fn reconstruct_file(
    image_path: &Path,
    dxf_path: &Path,
    config: &ReconstructionConfig,
    segmenter: Option<LearnedSegmenter>,
) -> Result<Reconstruction> {
    let image = image::open(image_path)?;
    tracing::info!(
        path = %image_path.display(),
        width = image.width(),
        height = image.height(),
        "Loaded plan image"
    );

    let mut chain = ReconstructionChain::from_config(config, segmenter);
    let result = chain.run(&image)?;

    if let Some(parent) = dxf_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_dxf(&result.document, dxf_path)?;
    tracing::info!(path = %dxf_path.display(), "Saved DXF");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Scripted {
        name: &'static str,
        outcome: fn() -> Result<Reconstruction>,
        calls: usize,
    }

    impl Reconstructor for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn attempt(&mut self, _image: &DynamicImage) -> Result<Reconstruction> {
            self.calls += 1;
            (self.outcome)()
        }
    }

    fn ok_result() -> Result<Reconstruction> {
        Ok(Reconstruction {
            document: VectorDocument::new(),
            report: ReconstructionReport {
                reconstructor: "ok".into(),
                tier: None,
                raw_count: 0,
                merged_count: 0,
                crop_offset: (0, 0),
                used_fallback: false,
            },
        })
    }

    fn stage(name: &'static str, outcome: fn() -> Result<Reconstruction>) -> Box<dyn Reconstructor> {
        Box::new(Scripted {
            name,
            outcome,
            calls: 0,
        })
    }

    fn blank() -> DynamicImage {
        DynamicImage::new_luma8(10, 10)
    }

    #[test]
    fn test_transform_flips_and_offsets() {
        let t = PlanTransform::new(100, (5, 10), 10.0);
        let p = t.to_world(&Point2D::new(0.0, 0.0));
        assert_relative_eq!(p.x, 50.0);
        assert_relative_eq!(p.y, 900.0);
        let q = t.to_world(&Point2D::new(20.0, 90.0));
        assert_relative_eq!(q.x, 250.0);
        assert_relative_eq!(q.y, 0.0);
    }

    #[test]
    fn test_chain_falls_through_unusable() {
        let mut chain = ReconstructionChain::new()
            .with_stage(stage("first", || Err(VisionError::Unusable("no model".into()))))
            .with_stage(stage("second", ok_result));
        assert_eq!(chain.stage_names(), vec!["first", "second"]);
        assert!(chain.run(&blank()).is_ok());
    }

    #[test]
    fn test_chain_stops_on_terminal_error() {
        let mut chain = ReconstructionChain::new()
            .with_stage(stage("first", || Err(VisionError::Clarity("blank".into()))))
            .with_stage(stage("second", ok_result));
        assert!(chain.run(&blank()).unwrap_err().is_clarity());
    }

    #[test]
    fn test_all_unusable_is_clarity() {
        let mut chain = ReconstructionChain::new()
            .with_stage(stage("a", || Err(VisionError::Unusable("x".into()))))
            .with_stage(stage("b", || Err(VisionError::Unusable("y".into()))));
        let err = chain.run(&blank()).unwrap_err();
        assert!(err.is_clarity());
        assert!(err.to_string().contains("a: x"));
    }

    #[test]
    fn test_empty_chain_is_clarity() {
        assert!(ReconstructionChain::new().run(&blank()).unwrap_err().is_clarity());
    }

    #[test]
    fn test_chain_order_from_config() {
        let chain = ReconstructionChain::from_config(&ReconstructionConfig::default(), None);
        assert_eq!(chain.stage_names(), vec!["classical"]);
    }

    #[test]
    fn test_merge_params_default_to_base_tier() {
        let r = ClassicalReconstructor::new(&ReconstructionConfig::default());
        let p = r.merge_params();
        assert_relative_eq!(p.gap_tol_px, 25.0);
        assert_relative_eq!(p.min_len_px, 10.0);
    }
}
