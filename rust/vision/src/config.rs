// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction configuration
//!
//! Every tunable has a default. A partial JSON document overrides single
//! fields, and `PLANCAD_*` environment variables override the defaults.

use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Line detector tunables. Lengths are pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Gaussian kernel size (forced odd)
    pub blur_kernel: u32,
    pub morph_close: bool,
    /// Square closing kernel size (forced odd)
    pub morph_kernel: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_threshold: u32,
    pub min_line: u32,
    pub max_gap: u32,
    /// Local-mean threshold when true, Otsu otherwise
    pub adaptive_binarize: bool,
    pub adaptive_block: u32,
    pub adaptive_c: f64,
    pub filter_components: bool,
    pub cc_min_area: u32,
    pub cc_thin_px: u32,
    pub cc_long_px: u32,
    /// Fewer raw lines than this triggers the aggressive tier
    pub min_raw_lines: usize,
    /// More raw lines than this triggers the strict tier
    pub max_raw_lines: usize,
    pub crop_frame: bool,
    pub crop_margin: u32,
    pub fallback_contour: bool,
    pub fallback_pad: u32,
    /// Write intermediate images here when set
    pub debug_dir: Option<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 3,
            morph_close: true,
            morph_kernel: 3,
            canny_low: 25.0,
            canny_high: 75.0,
            hough_threshold: 25,
            min_line: 10,
            max_gap: 25,
            adaptive_binarize: true,
            adaptive_block: 35,
            adaptive_c: 10.0,
            filter_components: true,
            cc_min_area: 50,
            cc_thin_px: 4,
            cc_long_px: 250,
            min_raw_lines: 5,
            max_raw_lines: 800,
            crop_frame: true,
            crop_margin: 24,
            fallback_contour: true,
            fallback_pad: 2,
            debug_dir: None,
        }
    }
}

/// Segment merger and orthogonalizer tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Pass raw segments through when false
    pub enabled: bool,
    pub angle_tol_deg: f64,
    pub dist_tol_px: f64,
    /// Defaults to the base detection tier's max gap, whichever tier was accepted
    pub gap_tol_px: Option<f64>,
    /// Defaults to the base detection tier's min line length
    pub min_len_px: Option<f64>,
    pub ortho: bool,
    pub ortho_tol_deg: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            angle_tol_deg: 5.0,
            dist_tol_px: 10.0,
            gap_tol_px: None,
            min_len_px: None,
            ortho: true,
            ortho_tol_deg: 5.0,
        }
    }
}

/// Learned segmentation path tunables. Areas are square pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Longest side fed to the model
    pub max_side: u32,
    pub min_fg_ratio: f64,
    pub max_fg_ratio: f64,
    pub min_contour_area: f64,
    pub max_contours_base: f64,
    pub max_contours_per_ratio: f64,
    pub close_kernel: u32,
    /// Polygon simplification tolerance as a fraction of contour perimeter
    pub approx_epsilon_frac: f64,
    pub min_opening_area: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_side: 1024,
            min_fg_ratio: 0.005,
            max_fg_ratio: 0.60,
            min_contour_area: 200.0,
            max_contours_base: 50.0,
            max_contours_per_ratio: 2000.0,
            close_kernel: 5,
            approx_epsilon_frac: 0.01,
            min_opening_area: 50.0,
        }
    }
}

/// Top-level configuration passed to the reconstruction chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub detection: DetectionConfig,
    pub merge: MergeConfig,
    pub segmentation: SegmentationConfig,
    /// Output millimeters per image pixel
    pub mm_per_px: f64,
    /// Fewer merged segments than this is a clarity failure
    pub min_merged_segments: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            merge: MergeConfig::default(),
            segmentation: SegmentationConfig::default(),
            mm_per_px: 10.0,
            min_merged_segments: 1,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        _ => default,
    }
}

fn parse_opt<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: Option<T>) -> Option<T> {
    match lookup(name).and_then(|v| v.trim().parse().ok()) {
        Some(v) => Some(v),
        None => default,
    }
}

impl ReconstructionConfig {
    /// Load configuration from `PLANCAD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let dd = d.detection;
        let md = d.merge;
        let sd = d.segmentation;
        let l = &lookup;

        Self {
            detection: DetectionConfig {
                blur_kernel: parse_var(l, "PLANCAD_BLUR_KERNEL", dd.blur_kernel),
                morph_close: parse_bool(l, "PLANCAD_MORPH_CLOSE", dd.morph_close),
                morph_kernel: parse_var(l, "PLANCAD_MORPH_KERNEL", dd.morph_kernel),
                canny_low: parse_var(l, "PLANCAD_CANNY_LOW", dd.canny_low),
                canny_high: parse_var(l, "PLANCAD_CANNY_HIGH", dd.canny_high),
                hough_threshold: parse_var(l, "PLANCAD_HOUGH_THRESHOLD", dd.hough_threshold),
                min_line: parse_var(l, "PLANCAD_MIN_LINE", dd.min_line),
                max_gap: parse_var(l, "PLANCAD_MAX_GAP", dd.max_gap),
                adaptive_binarize: parse_bool(l, "PLANCAD_BINARIZE", dd.adaptive_binarize),
                adaptive_block: parse_var(l, "PLANCAD_ADAPTIVE_BLOCK", dd.adaptive_block),
                adaptive_c: parse_var(l, "PLANCAD_ADAPTIVE_C", dd.adaptive_c),
                filter_components: parse_bool(l, "PLANCAD_FILTER_COMPONENTS", dd.filter_components),
                cc_min_area: parse_var(l, "PLANCAD_CC_MIN_AREA", dd.cc_min_area),
                cc_thin_px: parse_var(l, "PLANCAD_CC_THIN_PX", dd.cc_thin_px),
                cc_long_px: parse_var(l, "PLANCAD_CC_LONG_PX", dd.cc_long_px),
                min_raw_lines: parse_var(l, "PLANCAD_MIN_RAW_LINES", dd.min_raw_lines),
                max_raw_lines: parse_var(l, "PLANCAD_MAX_RAW_LINES", dd.max_raw_lines),
                crop_frame: parse_bool(l, "PLANCAD_CROP_FRAME", dd.crop_frame),
                crop_margin: parse_var(l, "PLANCAD_CROP_MARGIN", dd.crop_margin),
                fallback_contour: parse_bool(l, "PLANCAD_FALLBACK_CONTOUR", dd.fallback_contour),
                fallback_pad: parse_var(l, "PLANCAD_FALLBACK_PAD", dd.fallback_pad),
                debug_dir: lookup("PLANCAD_DEBUG_DIR")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
                    .or(dd.debug_dir),
            },
            merge: MergeConfig {
                enabled: parse_bool(l, "PLANCAD_MERGE", md.enabled),
                angle_tol_deg: parse_var(l, "PLANCAD_MERGE_ANGLE_TOL", md.angle_tol_deg),
                dist_tol_px: parse_var(l, "PLANCAD_MERGE_DIST_TOL", md.dist_tol_px),
                gap_tol_px: parse_opt(l, "PLANCAD_MERGE_GAP_TOL", md.gap_tol_px),
                min_len_px: parse_opt(l, "PLANCAD_MIN_MERGED_LINE_PX", md.min_len_px),
                ortho: parse_bool(l, "PLANCAD_ORTHO", md.ortho),
                ortho_tol_deg: parse_var(l, "PLANCAD_ORTHO_TOL", md.ortho_tol_deg),
            },
            segmentation: SegmentationConfig {
                max_side: parse_var(l, "PLANCAD_SEG_MAX_SIDE", sd.max_side),
                min_fg_ratio: parse_var(l, "PLANCAD_SEG_MIN_FG_RATIO", sd.min_fg_ratio),
                max_fg_ratio: parse_var(l, "PLANCAD_SEG_MAX_FG_RATIO", sd.max_fg_ratio),
                min_contour_area: parse_var(l, "PLANCAD_SEG_MIN_CONTOUR_AREA", sd.min_contour_area),
                max_contours_base: parse_var(l, "PLANCAD_SEG_MAX_CONTOURS_BASE", sd.max_contours_base),
                max_contours_per_ratio: parse_var(
                    l,
                    "PLANCAD_SEG_MAX_CONTOURS_PER_RATIO",
                    sd.max_contours_per_ratio,
                ),
                close_kernel: parse_var(l, "PLANCAD_SEG_CLOSE_KERNEL", sd.close_kernel),
                approx_epsilon_frac: parse_var(l, "PLANCAD_SEG_APPROX_EPSILON", sd.approx_epsilon_frac),
                min_opening_area: parse_var(l, "PLANCAD_SEG_MIN_OPENING_AREA", sd.min_opening_area),
            },
            mm_per_px: parse_var(l, "PLANCAD_MM_PER_PX", d.mm_per_px),
            min_merged_segments: parse_var(l, "PLANCAD_MIN_MERGED_SEGMENTS", d.min_merged_segments),
        }
    }

    /// Parse a (possibly partial) JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VisionError::Config(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| VisionError::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_partial_json_overrides_single_fields() {
        let cfg = ReconstructionConfig::from_json(
            r#"{"detection":{"crop_frame":false,"hough_threshold":40},"mm_per_px":5}"#,
        )
        .unwrap();
        assert!(!cfg.detection.crop_frame);
        assert_eq!(cfg.detection.hough_threshold, 40);
        assert_eq!(cfg.detection.canny_low, 25.0);
        assert_eq!(cfg.mm_per_px, 5.0);
        assert_eq!(cfg.merge, MergeConfig::default());
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = ReconstructionConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, VisionError::Config(_)));
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: FxHashMap<&str, &str> = [
            ("PLANCAD_CROP_FRAME", "off"),
            ("PLANCAD_MIN_LINE", " 20 "),
            ("PLANCAD_MERGE_GAP_TOL", "7.5"),
            ("PLANCAD_MM_PER_PX", "garbage"),
            ("PLANCAD_DEBUG_DIR", "/tmp/plancad-debug"),
        ]
        .into_iter()
        .collect();
        let cfg = ReconstructionConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(!cfg.detection.crop_frame);
        assert_eq!(cfg.detection.min_line, 20);
        assert_eq!(cfg.merge.gap_tol_px, Some(7.5));
        // Unparseable values keep the default
        assert_eq!(cfg.mm_per_px, 10.0);
        assert_eq!(cfg.detection.debug_dir, Some(PathBuf::from("/tmp/plancad-debug")));
    }

    #[test]
    fn test_empty_lookup_is_default() {
        assert_eq!(ReconstructionConfig::from_lookup(|_| None), ReconstructionConfig::default());
    }
}
