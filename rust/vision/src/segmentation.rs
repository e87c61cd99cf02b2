// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Learned segmentation path
//!
//! A [`SegmentationBackend`] turns an RGB plan into a per-pixel class map.
//! [`LearnedSegmenter`] handles resizing and accelerator fallback around
//! it, and [`extract_document`] vectorizes an accepted class map.

use crate::config::SegmentationConfig;
use crate::detector::outer_contours;
use crate::error::{Result, VisionError};
use crate::image_ops::{foreground_ratio, morphological_close};
use crate::line_ops::{polygon_area, polygon_perimeter, simplify_closed};
use crate::pipeline::PlanTransform;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use plancad_geometry::{
    BlockDefinition, Bounds, Point2D, VectorDocument, DOOR_LAYER, WALL_FILL_LAYER, WALL_LAYER,
    WINDOW_LAYER,
};
use thiserror::Error;

pub const BACKGROUND_CLASS: u8 = 0;
pub const WALL_CLASS: u8 = 1;
pub const WINDOW_CLASS: u8 = 2;
pub const DOOR_CLASS: u8 = 3;

pub const WINDOW_BLOCK: &str = "WINDOW_BLOCK";
pub const DOOR_BLOCK: &str = "DOOR_BLOCK";

/// Per-pixel class ids, same size as the image it was inferred from
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    labels: GrayImage,
}

impl ClassMap {
    pub fn new(labels: GrayImage) -> Self {
        Self { labels }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.labels.dimensions()
    }

    /// Binary mask (255/0) of one class
    pub fn mask(&self, class: u8) -> GrayImage {
        let (w, h) = self.labels.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            if self.labels.get_pixel(x, y).0[0] == class {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Nearest-neighbour resize; class ids are never blended
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.labels.dimensions() == (width, height) {
            return self.clone();
        }
        Self::new(image::imageops::resize(
            &self.labels,
            width,
            height,
            FilterType::Nearest,
        ))
    }
}

/// Backend failure while running inference
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Out of memory on {0}")]
    OutOfMemory(String),

    #[error("Accelerator failure: {0}")]
    Accelerator(String),

    #[error("Inference failed: {0}")]
    Other(String),
}

impl InferenceError {
    /// Failures a CPU retry can recover from
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            InferenceError::OutOfMemory(_) | InferenceError::Accelerator(_)
        )
    }
}

/// Semantic segmentation model producing wall/window/door classes
pub trait SegmentationBackend {
    /// Device name for logging, e.g. "cpu" or "cuda:0"
    fn device(&self) -> &str;

    /// Infer a class map with the same dimensions as `image`
    fn infer(&mut self, image: &RgbImage) -> std::result::Result<ClassMap, InferenceError>;
}

/// Runs a backend with bounded input size and a one-shot CPU fallback
pub struct LearnedSegmenter {
    primary: Box<dyn SegmentationBackend>,
    cpu_fallback: Option<Box<dyn SegmentationBackend>>,
    on_fallback: bool,
    config: SegmentationConfig,
}

impl LearnedSegmenter {
    pub fn new(primary: Box<dyn SegmentationBackend>, config: SegmentationConfig) -> Self {
        Self {
            primary,
            cpu_fallback: None,
            on_fallback: false,
            config,
        }
    }

    pub fn with_cpu_fallback(mut self, backend: Box<dyn SegmentationBackend>) -> Self {
        self.cpu_fallback = Some(backend);
        self
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Device currently used for inference
    pub fn device(&self) -> &str {
        match (&self.cpu_fallback, self.on_fallback) {
            (Some(cpu), true) => cpu.device(),
            _ => self.primary.device(),
        }
    }

    pub fn is_on_fallback(&self) -> bool {
        self.on_fallback
    }

    fn active(&mut self) -> &mut dyn SegmentationBackend {
        match (&mut self.cpu_fallback, self.on_fallback) {
            (Some(cpu), true) => cpu.as_mut(),
            _ => self.primary.as_mut(),
        }
    }

    /// Class map at the input's full resolution
    pub fn segment(&mut self, image: &DynamicImage) -> Result<ClassMap> {
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();
        if w == 0 || h == 0 {
            return Err(VisionError::Unusable("image is empty".into()));
        }

        let input = downscale_to_max_side(&rgb, self.config.max_side);
        let (iw, ih) = input.dimensions();

        let classes = match self.active().infer(&input) {
            Ok(classes) => classes,
            Err(e) if e.is_device_failure() && !self.on_fallback && self.cpu_fallback.is_some() => {
                tracing::warn!(
                    device = self.primary.device(),
                    error = %e,
                    "Inference failed on accelerator, switching to CPU"
                );
                self.on_fallback = true;
                self.active()
                    .infer(&input)
                    .map_err(|e| VisionError::Unusable(e.to_string()))?
            }
            Err(e) => return Err(VisionError::Unusable(e.to_string())),
        };

        if classes.dimensions() != (iw, ih) {
            return Err(VisionError::Unusable(format!(
                "backend returned {}x{} class map for {}x{} input",
                classes.dimensions().0,
                classes.dimensions().1,
                iw,
                ih
            )));
        }
        tracing::debug!(device = self.device(), width = iw, height = ih, "Segmentation done");
        Ok(classes.resized(w, h))
    }
}

/// Shrink so the longer side is at most `max_side`; never upscales
pub fn downscale_to_max_side(rgb: &RgbImage, max_side: u32) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let longest = w.max(h);
    if max_side == 0 || longest <= max_side {
        return rgb.clone();
    }
    let scale = max_side as f64 / longest as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::resize(rgb, nw, nh, FilterType::Triangle)
}

/// Reject wall masks that are empty, flooded or fragmented
pub fn check_wall_mask(mask: &GrayImage, config: &SegmentationConfig) -> Result<()> {
    let ratio = foreground_ratio(mask);
    if ratio <= 0.0 {
        return Err(VisionError::Unusable("no wall pixels".into()));
    }
    if ratio < config.min_fg_ratio || ratio > config.max_fg_ratio {
        return Err(VisionError::Unusable(format!(
            "wall foreground ratio {:.4} outside [{}, {}]",
            ratio, config.min_fg_ratio, config.max_fg_ratio
        )));
    }

    let contours = outer_contours(mask);
    let largest = contours.iter().map(|c| polygon_area(c)).fold(0.0, f64::max);
    if largest < config.min_contour_area {
        return Err(VisionError::Unusable(format!(
            "largest wall region {:.0} px² below {}",
            largest, config.min_contour_area
        )));
    }
    let max_contours = config.max_contours_base + config.max_contours_per_ratio * ratio;
    if contours.len() as f64 > max_contours {
        return Err(VisionError::Unusable(format!(
            "{} wall regions, at most {:.0} expected",
            contours.len(),
            max_contours
        )));
    }
    Ok(())
}

/// Vectorize a class map: wall outlines with fills, window and door boxes
pub fn extract_document(
    classes: &ClassMap,
    config: &SegmentationConfig,
    transform: &PlanTransform,
) -> Result<VectorDocument> {
    let walls = classes.mask(WALL_CLASS);
    check_wall_mask(&walls, config)?;

    let mut doc = VectorDocument::new();
    let closed = morphological_close(&walls, config.close_kernel);
    let mut wall_count = 0usize;
    for ring in outer_contours(&closed) {
        if polygon_area(&ring) < config.min_contour_area {
            continue;
        }
        let epsilon = (config.approx_epsilon_frac * polygon_perimeter(&ring)).max(1.0);
        let simplified = simplify_closed(&ring, epsilon);
        if simplified.len() < 3 {
            continue;
        }
        let points: Vec<Point2D> = simplified.iter().map(|p| transform.to_world(p)).collect();
        doc.add_polyline(WALL_LAYER, points.clone(), true);
        doc.add_hatch(WALL_FILL_LAYER, points);
        wall_count += 1;
    }
    if wall_count == 0 {
        return Err(VisionError::Unusable("no wall outline survived simplification".into()));
    }

    let windows = add_openings(&mut doc, classes, WINDOW_CLASS, WINDOW_LAYER, WINDOW_BLOCK, config, transform);
    let doors = add_openings(&mut doc, classes, DOOR_CLASS, DOOR_LAYER, DOOR_BLOCK, config, transform);
    tracing::info!(walls = wall_count, windows, doors, "Extracted learned geometry");
    Ok(doc)
}

fn add_openings(
    doc: &mut VectorDocument,
    classes: &ClassMap,
    class: u8,
    layer: &str,
    block: &str,
    config: &SegmentationConfig,
    transform: &PlanTransform,
) -> usize {
    let mask = classes.mask(class);
    let mut count = 0;
    for ring in outer_contours(&mask) {
        if polygon_area(&ring) < config.min_opening_area {
            continue;
        }
        let Some(b) = Bounds::of_points(ring.iter()) else {
            continue;
        };
        // Pixel boxes are inclusive; the block spans whole pixels
        let w_px = b.extent_x() + 1.0;
        let h_px = b.extent_y() + 1.0;
        // Image bottom-left becomes the world-space minimum corner
        let insertion = transform.to_world(&Point2D::new(b.min_x, b.min_y + h_px));
        if doc.blocks().iter().all(|d| d.name != block) {
            doc.define_block(BlockDefinition::unit_square(block));
        }
        doc.add_block_ref(
            layer,
            block,
            insertion,
            w_px * transform.mm_per_px,
            h_px * transform.mm_per_px,
        );
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancad_geometry::EntityGeometry;

    /// Returns a fixed class map scaled to the input, or scripted failures
    struct MockBackend {
        pub device: String,
        pub template: GrayImage,
        pub failures: Vec<InferenceError>,
        pub calls: usize,
    }

    impl SegmentationBackend for MockBackend {
        fn device(&self) -> &str {
            &self.device
        }

        fn infer(&mut self, image: &RgbImage) -> std::result::Result<ClassMap, InferenceError> {
            self.calls += 1;
            if !self.failures.is_empty() {
                return Err(self.failures.remove(0));
            }
            let (w, h) = image.dimensions();
            Ok(ClassMap::new(self.template.clone()).resized(w, h))
        }
    }

    fn plan_classes() -> GrayImage {
        let mut labels = GrayImage::new(200, 200);
        for (x, y, p) in labels.enumerate_pixels_mut() {
            let on_wall = (20..180).contains(&x)
                && (20..180).contains(&y)
                && !((28..172).contains(&x) && (28..172).contains(&y));
            if on_wall {
                p.0[0] = WALL_CLASS;
            }
        }
        // window set into the top wall
        for y in 20..28 {
            for x in 80..120 {
                labels.put_pixel(x, y, Luma([WINDOW_CLASS]));
            }
        }
        labels
    }

    fn mock(failures: Vec<InferenceError>, device: &str) -> MockBackend {
        MockBackend {
            device: device.into(),
            template: plan_classes(),
            failures,
            calls: 0,
        }
    }

    fn transform() -> PlanTransform {
        PlanTransform::new(200, (0, 0), 10.0)
    }

    #[test]
    fn test_class_mask() {
        let classes = ClassMap::new(plan_classes());
        let windows = classes.mask(WINDOW_CLASS);
        assert_eq!(windows.get_pixel(100, 24).0[0], 255);
        assert_eq!(windows.get_pixel(24, 100).0[0], 0);
    }

    #[test]
    fn test_downscale_keeps_aspect() {
        let rgb = RgbImage::new(2048, 1024);
        let out = downscale_to_max_side(&rgb, 1024);
        assert_eq!(out.dimensions(), (1024, 512));
        let small = RgbImage::new(100, 50);
        assert_eq!(downscale_to_max_side(&small, 1024).dimensions(), (100, 50));
    }

    #[test]
    fn test_cpu_fallback_switches_permanently() {
        let primary = mock(vec![InferenceError::OutOfMemory("cuda:0".into())], "cuda:0");
        let cpu = mock(Vec::new(), "cpu");
        let mut segmenter = LearnedSegmenter::new(Box::new(primary), SegmentationConfig::default())
            .with_cpu_fallback(Box::new(cpu));
        let image = DynamicImage::ImageRgb8(RgbImage::new(200, 200));

        let classes = segmenter.segment(&image).unwrap();
        assert_eq!(classes.dimensions(), (200, 200));
        assert!(segmenter.is_on_fallback());
        assert_eq!(segmenter.device(), "cpu");
        segmenter.segment(&image).unwrap();
        assert_eq!(segmenter.device(), "cpu");
    }

    #[test]
    fn test_other_inference_error_is_unusable() {
        let primary = mock(vec![InferenceError::Other("bad weights".into())], "cuda:0");
        let mut segmenter = LearnedSegmenter::new(Box::new(primary), SegmentationConfig::default())
            .with_cpu_fallback(Box::new(mock(Vec::new(), "cpu")));
        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let err = segmenter.segment(&image).unwrap_err();
        assert!(err.is_unusable());
        assert!(!segmenter.is_on_fallback());
    }

    #[test]
    fn test_large_input_is_upscaled_back() {
        let mut segmenter = LearnedSegmenter::new(Box::new(mock(Vec::new(), "cpu")), SegmentationConfig {
            max_side: 100,
            ..Default::default()
        });
        let image = DynamicImage::ImageRgb8(RgbImage::new(400, 300));
        assert_eq!(segmenter.segment(&image).unwrap().dimensions(), (400, 300));
    }

    #[test]
    fn test_gate_rejects_empty_and_flooded() {
        let config = SegmentationConfig::default();
        let empty = GrayImage::new(100, 100);
        assert!(check_wall_mask(&empty, &config).unwrap_err().is_unusable());
        let flooded = GrayImage::from_pixel(100, 100, Luma([255]));
        assert!(check_wall_mask(&flooded, &config).unwrap_err().is_unusable());
    }

    #[test]
    fn test_gate_rejects_speckle() {
        // Many tiny regions, none large enough
        let mut mask = GrayImage::new(200, 200);
        for y in (0..200).step_by(4) {
            for x in (0..200).step_by(4) {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        assert!(check_wall_mask(&mask, &SegmentationConfig::default()).is_err());
    }

    #[test]
    fn test_extract_walls_and_window() {
        let classes = ClassMap::new(plan_classes());
        let doc = extract_document(&classes, &SegmentationConfig::default(), &transform()).unwrap();

        let walls: Vec<_> = doc.entities().iter().filter(|e| e.is_on_layer(WALL_LAYER)).collect();
        let fills: Vec<_> = doc.entities().iter().filter(|e| e.is_on_layer(WALL_FILL_LAYER)).collect();
        assert_eq!(walls.len(), 1);
        assert_eq!(fills.len(), 1);
        assert!(matches!(walls[0].geometry, EntityGeometry::Polyline { closed: true, .. }));

        let windows: Vec<_> = doc.entities().iter().filter(|e| e.is_on_layer(WINDOW_LAYER)).collect();
        assert_eq!(windows.len(), 1);
        match &windows[0].geometry {
            EntityGeometry::BlockRef {
                block,
                insertion,
                x_scale,
                y_scale,
            } => {
                assert_eq!(block, WINDOW_BLOCK);
                approx::assert_relative_eq!(*x_scale, 400.0);
                approx::assert_relative_eq!(*y_scale, 80.0);
                approx::assert_relative_eq!(insertion.x, 800.0);
                approx::assert_relative_eq!(insertion.y, (200.0 - 28.0) * 10.0);
            }
            other => panic!("expected block reference, got {:?}", other),
        }
        assert!(doc.blocks().iter().any(|b| b.name == WINDOW_BLOCK));
        assert!(doc.blocks().iter().all(|b| b.name != DOOR_BLOCK));
    }
}
