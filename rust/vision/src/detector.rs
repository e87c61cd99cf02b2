// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raster line detector
//!
//! Grayscale plan -> raw pixel-space segments. One pass is
//! blur -> binarize -> close -> component filter -> Canny -> Hough. Passes
//! are retried with different parameter tiers when the first one finds too
//! few or too many lines, and a bounding-rectangle fallback covers images
//! where Hough finds nothing at all.

use crate::config::DetectionConfig;
use crate::error::{Result, VisionError};
use crate::image_ops::{
    adaptive_threshold_inv, canny_edges, foreground_ratio, gaussian_blur, invert,
    morphological_close, odd_kernel, otsu_binarize, remove_small_and_thin_components,
};
use crate::line_ops::{detect_lines, polygon_area};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use plancad_geometry::{Point2D, Segment2D};
use serde::Serialize;
use std::path::Path;

/// Minimum image side for frame cropping, before and after the inset
const MIN_CROP_SIDE: u32 = 32;
/// The frame contour must cover at least this share of the image
const MIN_FRAME_AREA_FRAC: f64 = 0.15;
/// Masks with more foreground than this are treated as featureless
const MAX_FALLBACK_FG_RATIO: f64 = 0.98;
const MIN_FALLBACK_SIDE: u32 = 4;

/// Parameter bundle for one detection pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectParams {
    pub blur_kernel: u32,
    pub morph_close: bool,
    pub morph_kernel: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_threshold: u32,
    pub min_line: u32,
    pub max_gap: u32,
}

impl DetectParams {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            blur_kernel: config.blur_kernel,
            morph_close: config.morph_close,
            morph_kernel: config.morph_kernel,
            canny_low: config.canny_low,
            canny_high: config.canny_high,
            hough_threshold: config.hough_threshold,
            min_line: config.min_line,
            max_gap: config.max_gap,
        }
    }

    /// Lower thresholds and longer gaps for faint drawings
    pub fn aggressive(&self) -> Self {
        Self {
            canny_low: 10.0,
            canny_high: 50.0,
            hough_threshold: 15,
            min_line: (self.min_line / 2).max(6),
            max_gap: self.max_gap.max(35),
            ..*self
        }
    }

    /// Heavier blur and stricter votes for noisy drawings
    pub fn strict(&self) -> Self {
        Self {
            blur_kernel: self.blur_kernel.max(5),
            canny_low: 40.0,
            canny_high: 120.0,
            hough_threshold: 70,
            min_line: 60,
            max_gap: 12,
            ..*self
        }
    }
}

/// Which parameter tier produced the accepted lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionTier {
    Default,
    Aggressive,
    Strict,
}

/// One retry step: when to run it, how to derive its parameters and when
/// to prefer its result over the current one.
#[derive(Clone, Copy)]
pub struct TierStep {
    pub tier: DetectionTier,
    pub trigger: fn(current: usize, config: &DetectionConfig) -> bool,
    pub derive: fn(base: &DetectParams) -> DetectParams,
    pub accept: fn(candidate: usize, current: usize) -> bool,
}

/// Ordered retry steps after the default pass
#[derive(Clone)]
pub struct TierPlan {
    steps: Vec<TierStep>,
}

impl TierPlan {
    /// Aggressive when too few lines, then strict when too many
    pub fn standard() -> Self {
        Self {
            steps: vec![
                TierStep {
                    tier: DetectionTier::Aggressive,
                    trigger: |current, config| current < config.min_raw_lines,
                    derive: DetectParams::aggressive,
                    accept: |candidate, current| candidate > current,
                },
                TierStep {
                    tier: DetectionTier::Strict,
                    trigger: |current, config| current > config.max_raw_lines,
                    derive: DetectParams::strict,
                    accept: |candidate, current| candidate > 0 && candidate < current,
                },
            ],
        }
    }

    pub fn steps(&self) -> &[TierStep] {
        &self.steps
    }
}

impl Default for TierPlan {
    fn default() -> Self {
        Self::standard()
    }
}

/// Output of one detection pass
#[derive(Debug, Clone)]
struct TierRun {
    blurred: GrayImage,
    mask: GrayImage,
    edges: GrayImage,
    lines: Vec<Segment2D>,
}

/// Lines found in one image, in pixel coordinates of the (possibly cropped)
/// working image.
#[derive(Debug, Clone)]
pub struct LineDetection {
    pub segments: Vec<Segment2D>,
    pub tier: DetectionTier,
    pub params: DetectParams,
    /// Segments before merging (fallback rectangle included)
    pub raw_count: usize,
    /// Top-left of the working image inside the original
    pub crop_offset: (u32, u32),
    pub used_fallback: bool,
    pub image_width: u32,
    pub image_height: u32,
}

/// Tiered Canny/Hough line detector
#[derive(Debug, Clone, Default)]
pub struct LineDetector {
    config: DetectionConfig,
}

impl LineDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect raw segments or fail with [`VisionError::Clarity`]
    pub fn detect(&self, gray: &GrayImage) -> Result<LineDetection> {
        self.detect_with_plan(gray, &TierPlan::standard())
    }

    pub fn detect_with_plan(&self, gray: &GrayImage, plan: &TierPlan) -> Result<LineDetection> {
        let (full_w, full_h) = gray.dimensions();
        if full_w == 0 || full_h == 0 {
            return Err(VisionError::Clarity("image is empty".into()));
        }
        let base = DetectParams::from_config(&self.config);

        let (work, crop_offset) = if self.config.crop_frame {
            crop_to_frame(gray, &self.config, &base)
        } else {
            (gray.clone(), (0, 0))
        };

        let mut tier = DetectionTier::Default;
        let mut params = base;
        let mut run = self.run_tier(&work, &params);
        tracing::debug!(lines = run.lines.len(), "Default tier");

        for step in plan.steps() {
            let current = run.lines.len();
            if !(step.trigger)(current, &self.config) {
                continue;
            }
            let candidate_params = (step.derive)(&base);
            tracing::warn!(tier = ?step.tier, current, "Retrying line detection");
            let candidate = self.run_tier(&work, &candidate_params);
            if (step.accept)(candidate.lines.len(), current) {
                tier = step.tier;
                params = candidate_params;
                run = candidate;
            }
        }

        let mut segments = run.lines.clone();
        let mut used_fallback = false;
        if segments.is_empty() && self.config.fallback_contour {
            if let Some(rect) = self.fallback_rectangle(&run) {
                tracing::warn!("No lines found, using contour bounding rectangle");
                segments = rect;
                used_fallback = true;
            }
        }

        if let Some(dir) = &self.config.debug_dir {
            save_debug_images(dir, &work, &run.edges, &segments)?;
        }

        if segments.is_empty() {
            return Err(VisionError::Clarity(
                "no wall lines found; provide a clearer, higher-contrast image".into(),
            ));
        }

        tracing::info!(
            tier = ?tier,
            raw = segments.len(),
            offset_x = crop_offset.0,
            offset_y = crop_offset.1,
            "Line detection finished"
        );
        Ok(LineDetection {
            raw_count: segments.len(),
            segments,
            tier,
            params,
            crop_offset,
            used_fallback,
            image_width: full_w,
            image_height: full_h,
        })
    }

    fn binarize(&self, blurred: &GrayImage) -> GrayImage {
        if self.config.adaptive_binarize {
            adaptive_threshold_inv(blurred, self.config.adaptive_block, self.config.adaptive_c)
        } else {
            otsu_binarize(blurred, true)
        }
    }

    fn run_tier(&self, gray: &GrayImage, params: &DetectParams) -> TierRun {
        let blurred = gaussian_blur(gray, params.blur_kernel);
        let mut mask = self.binarize(&blurred);
        if params.morph_close {
            mask = morphological_close(&mask, params.morph_kernel);
        }
        if self.config.filter_components {
            mask = remove_small_and_thin_components(
                &mask,
                self.config.cc_min_area,
                self.config.cc_thin_px,
                self.config.cc_long_px,
            );
        }
        let edges = canny_edges(&mask, params.canny_low, params.canny_high);
        let lines = detect_lines(
            &edges,
            params.hough_threshold,
            params.min_line as f64,
            params.max_gap as f64,
        );
        TierRun {
            blurred,
            mask,
            edges,
            lines,
        }
    }

    /// Bounding rectangle of the largest outer contour over a series of
    /// candidate masks, as four segments.
    fn fallback_rectangle(&self, run: &TierRun) -> Option<Vec<Segment2D>> {
        let adaptive_inv =
            adaptive_threshold_inv(&run.blurred, self.config.adaptive_block, self.config.adaptive_c);
        let candidates = [
            run.mask.clone(),
            otsu_binarize(&run.blurred, true),
            otsu_binarize(&run.blurred, false),
            invert(&adaptive_inv),
            adaptive_inv,
        ];
        // The non-inverted adaptive mask goes last
        let ordered = [
            &candidates[0],
            &candidates[1],
            &candidates[2],
            &candidates[4],
            &candidates[3],
        ];

        let (w, h) = run.mask.dimensions();
        let pad = self.config.fallback_pad;
        for mask in ordered {
            let ratio = foreground_ratio(mask);
            if ratio <= 0.0 || ratio > MAX_FALLBACK_FG_RATIO {
                continue;
            }
            let Some((min_x, min_y, max_x, max_y)) = largest_outer_bbox(mask) else {
                continue;
            };
            let x0 = min_x.saturating_sub(pad);
            let y0 = min_y.saturating_sub(pad);
            let x1 = (max_x + 1 + pad).min(w.saturating_sub(1));
            let y1 = (max_y + 1 + pad).min(h.saturating_sub(1));
            if x1.saturating_sub(x0) < MIN_FALLBACK_SIDE || y1.saturating_sub(y0) < MIN_FALLBACK_SIDE {
                continue;
            }
            let (fx0, fy0, fx1, fy1) = (x0 as f64, y0 as f64, x1 as f64, y1 as f64);
            return Some(vec![
                Segment2D::from_coords(fx0, fy0, fx1, fy0),
                Segment2D::from_coords(fx1, fy0, fx1, fy1),
                Segment2D::from_coords(fx1, fy1, fx0, fy1),
                Segment2D::from_coords(fx0, fy1, fx0, fy0),
            ]);
        }
        None
    }
}

/// Outer contours of a binary mask as point rings
pub fn outer_contours(mask: &GrayImage) -> Vec<Vec<Point2D>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .iter()
                .map(|p| Point2D::new(p.x as f64, p.y as f64))
                .collect()
        })
        .collect()
}

fn ring_bbox(ring: &[Point2D]) -> Option<(u32, u32, u32, u32)> {
    let b = plancad_geometry::Bounds::of_points(ring.iter())?;
    Some((
        b.min_x.max(0.0) as u32,
        b.min_y.max(0.0) as u32,
        b.max_x.max(0.0) as u32,
        b.max_y.max(0.0) as u32,
    ))
}

/// Inclusive pixel bounding box of the largest outer contour
fn largest_outer_bbox(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let contours = outer_contours(mask);
    let mut best: Option<(f64, &Vec<Point2D>)> = None;
    for ring in &contours {
        let area = polygon_area(ring);
        if best.map_or(true, |(a, _)| area > a) {
            best = Some((area, ring));
        }
    }
    best.and_then(|(_, ring)| ring_bbox(ring))
}

/// Crop away a drawing frame around the plan.
///
/// Returns the working image and its offset in the original. The image is
/// returned unchanged when no plausible frame is found.
pub fn crop_to_frame(
    gray: &GrayImage,
    config: &DetectionConfig,
    params: &DetectParams,
) -> (GrayImage, (u32, u32)) {
    let (w, h) = gray.dimensions();
    if w < MIN_CROP_SIDE || h < MIN_CROP_SIDE {
        return (gray.clone(), (0, 0));
    }

    let blurred = gaussian_blur(gray, params.blur_kernel);
    let mut mask = adaptive_threshold_inv(&blurred, config.adaptive_block, config.adaptive_c);
    if params.morph_close {
        mask = morphological_close(&mask, odd_kernel(params.morph_kernel));
    }

    let contours = outer_contours(&mask);
    let largest = contours
        .iter()
        .map(|ring| (polygon_area(ring), ring))
        .fold(None, |best: Option<(f64, &Vec<Point2D>)>, cur| match best {
            Some(b) if b.0 >= cur.0 => Some(b),
            _ => Some(cur),
        });
    let Some((area, ring)) = largest else {
        return (gray.clone(), (0, 0));
    };
    if area < MIN_FRAME_AREA_FRAC * (w as f64 * h as f64) {
        return (gray.clone(), (0, 0));
    }
    let Some((min_x, min_y, max_x, max_y)) = ring_bbox(ring) else {
        return (gray.clone(), (0, 0));
    };

    let margin = config.crop_margin;
    let x0 = (min_x + margin).min(w);
    let y0 = (min_y + margin).min(h);
    let x1 = (max_x + 1).saturating_sub(margin).min(w);
    let y1 = (max_y + 1).saturating_sub(margin).min(h);
    if x1 <= x0 || y1 <= y0 || x1 - x0 < MIN_CROP_SIDE || y1 - y0 < MIN_CROP_SIDE {
        return (gray.clone(), (0, 0));
    }

    tracing::debug!(x0, y0, x1, y1, "Cropped drawing frame");
    let cropped = image::imageops::crop_imm(gray, x0, y0, x1 - x0, y1 - y0).to_image();
    (cropped, (x0, y0))
}

/// Write the working image, its edges and the detected lines to `dir`
fn save_debug_images(dir: &Path, gray: &GrayImage, edges: &GrayImage, lines: &[Segment2D]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    gray.save(dir.join("debug_01_gray.png"))?;
    edges.save(dir.join("debug_02_edges.png"))?;

    let mut canvas: RgbImage = image::DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
    for l in lines {
        imageproc::drawing::draw_line_segment_mut(
            &mut canvas,
            (l.start.x as f32, l.start.y as f32),
            (l.end.x as f32, l.end.y as f32),
            Rgb([255, 0, 0]),
        );
    }
    canvas.save(dir.join("debug_03_lines.png"))?;
    tracing::debug!(dir = %dir.display(), "Saved debug images");
    Ok(())
}
