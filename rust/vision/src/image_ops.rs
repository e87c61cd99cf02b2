// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Image processing operations for floor plan recognition
//!
//! Masks are binary `GrayImage`s with foreground 255 and background 0.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{connected_components, Connectivity};

/// Force a kernel size to be odd and at least 1
pub fn odd_kernel(k: u32) -> u32 {
    let k = k.max(1);
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

/// Gaussian sigma matching a square kernel of size `k`
pub fn sigma_for_kernel(k: u32) -> f32 {
    let k = odd_kernel(k) as f32;
    0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian blur parameterized by kernel size
pub fn gaussian_blur(image: &GrayImage, kernel: u32) -> GrayImage {
    if odd_kernel(kernel) <= 1 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma_for_kernel(kernel))
}

/// Inverted local-mean adaptive threshold.
///
/// A pixel becomes foreground when it is darker than the mean of its
/// `block`×`block` neighbourhood minus `c`. The window is clipped at the
/// image border.
pub fn adaptive_threshold_inv(image: &GrayImage, block: u32, c: f64) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let radius = (odd_kernel(block) / 2) as i64;

    // Summed-area table with a zero row/column in front
    let stride = (w + 1) as usize;
    let mut integral = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row = 0u64;
        for x in 0..w as usize {
            row += image.get_pixel(x as u32, y as u32).0[0] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    for y in 0..h as i64 {
        let y0 = (y - radius).max(0) as usize;
        let y1 = (y + radius + 1).min(h as i64) as usize;
        for x in 0..w as i64 {
            let x0 = (x - radius).max(0) as usize;
            let x1 = (x + radius + 1).min(w as i64) as usize;
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((x1 - x0) * (y1 - y0)) as f64;
            let mean = sum as f64 / count;
            let v = image.get_pixel(x as u32, y as u32).0[0] as f64;
            let fg = v <= mean - c;
            out.put_pixel(x as u32, y as u32, Luma([if fg { 255 } else { 0 }]));
        }
    }
    out
}

/// Otsu binarization; `inverted` marks dark pixels as foreground
pub fn otsu_binarize(image: &GrayImage, inverted: bool) -> GrayImage {
    let level = imageproc::contrast::otsu_level(image);
    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, p) in image.enumerate_pixels() {
        let above = p.0[0] > level;
        let fg = if inverted { !above } else { above };
        out.put_pixel(x, y, Luma([if fg { 255 } else { 0 }]));
    }
    out
}

/// Apply Canny edge detection
pub fn canny_edges(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    imageproc::edges::canny(image, low_threshold, high_threshold)
}

/// Morphological dilation with a square `k`×`k` kernel
pub fn dilate(image: &GrayImage, k: u32) -> GrayImage {
    let radius = (odd_kernel(k) / 2).min(u8::MAX as u32) as u8;
    imageproc::morphology::dilate(image, Norm::LInf, radius)
}

/// Morphological erosion with a square `k`×`k` kernel
pub fn erode(image: &GrayImage, k: u32) -> GrayImage {
    let radius = (odd_kernel(k) / 2).min(u8::MAX as u32) as u8;
    imageproc::morphology::erode(image, Norm::LInf, radius)
}

/// Morphological closing (dilate then erode) - fills small gaps
pub fn morphological_close(image: &GrayImage, k: u32) -> GrayImage {
    let dilated = dilate(image, k);
    erode(&dilated, k)
}

/// Invert a binary image
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut result = image.clone();
    for pixel in result.pixels_mut() {
        pixel.0[0] = 255 - pixel.0[0];
    }
    result
}

/// Share of nonzero pixels, 0 for an empty image
pub fn foreground_ratio(mask: &GrayImage) -> f64 {
    let total = mask.width() as u64 * mask.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let fg = mask.pixels().filter(|p| p.0[0] > 0).count() as u64;
    fg as f64 / total as f64
}

#[derive(Debug, Clone, Copy)]
struct ComponentStats {
    area: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

/// Drop 8-connected components that are specks (`area < min_area`) or thin
/// long strokes (`min(w,h) <= thin_px` and `max(w,h) >= long_px`), such as
/// dimension lines and hatching.
pub fn remove_small_and_thin_components(
    mask: &GrayImage,
    min_area: u32,
    thin_px: u32,
    long_px: u32,
) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut stats: Vec<Option<ComponentStats>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let id = label.0[0] as usize;
        if id == 0 {
            continue;
        }
        if stats.len() <= id {
            stats.resize(id + 1, None);
        }
        let s = stats[id].get_or_insert(ComponentStats {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        });
        s.area += 1;
        s.min_x = s.min_x.min(x);
        s.min_y = s.min_y.min(y);
        s.max_x = s.max_x.max(x);
        s.max_y = s.max_y.max(y);
    }

    let keep: Vec<bool> = stats
        .iter()
        .map(|s| match s {
            None => false,
            Some(s) => {
                let w = s.max_x - s.min_x + 1;
                let h = s.max_y - s.min_y + 1;
                let speck = s.area < min_area;
                let stroke = w.min(h) <= thin_px && w.max(h) >= long_px;
                !(speck || stroke)
            }
        })
        .collect();

    let mut out = GrayImage::new(mask.width(), mask.height());
    for (x, y, label) in labels.enumerate_pixels() {
        let id = label.0[0] as usize;
        if id != 0 && keep.get(id).copied().unwrap_or(false) {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(w: u32, h: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([value]))
    }

    #[test]
    fn test_sigma_matches_kernel_formula() {
        assert!((sigma_for_kernel(3) - 0.8).abs() < 1e-6);
        assert!((sigma_for_kernel(5) - 1.1).abs() < 1e-6);
        assert_eq!(odd_kernel(4), 5);
        assert_eq!(odd_kernel(0), 1);
    }

    #[test]
    fn test_adaptive_threshold_marks_dark_strokes() {
        let mut img = filled(60, 60, 255);
        for y in 28..32 {
            for x in 5..55 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let mask = adaptive_threshold_inv(&img, 35, 10.0);
        assert_eq!(mask.get_pixel(30, 30).0[0], 255);
        assert_eq!(mask.get_pixel(30, 5).0[0], 0);
    }

    #[test]
    fn test_adaptive_threshold_featureless() {
        let mask = adaptive_threshold_inv(&filled(40, 40, 255), 35, 10.0);
        assert_eq!(foreground_ratio(&mask), 0.0);
    }

    #[test]
    fn test_otsu_polarity() {
        let mut img = filled(10, 10, 200);
        for y in 0..10 {
            for x in 0..5 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        let inv = otsu_binarize(&img, true);
        let direct = otsu_binarize(&img, false);
        assert_eq!(inv.get_pixel(0, 0).0[0], 255);
        assert_eq!(direct.get_pixel(0, 0).0[0], 0);
        assert_eq!(direct.get_pixel(9, 0).0[0], 255);
    }

    #[test]
    fn test_close_fills_gap() {
        let mut img = filled(20, 5, 0);
        for x in 2..18 {
            if x != 10 {
                img.put_pixel(x, 2, Luma([255]));
            }
        }
        let closed = morphological_close(&img, 3);
        assert_eq!(closed.get_pixel(10, 2).0[0], 255);
    }

    #[test]
    fn test_component_filter() {
        let mut img = filled(400, 100, 0);
        // speck
        img.put_pixel(5, 5, Luma([255]));
        // long thin stroke: 300 x 2
        for y in 20..22 {
            for x in 50..350 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        // solid block: 20 x 20
        for y in 60..80 {
            for x in 60..80 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let out = remove_small_and_thin_components(&img, 50, 4, 250);
        assert_eq!(out.get_pixel(5, 5).0[0], 0);
        assert_eq!(out.get_pixel(100, 20).0[0], 0);
        assert_eq!(out.get_pixel(70, 70).0[0], 255);
    }

    #[test]
    fn test_invert() {
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 1, Luma([255]));

        let inverted = invert(&img);

        assert_eq!(inverted.get_pixel(0, 0).0[0], 255);
        assert_eq!(inverted.get_pixel(1, 1).0[0], 0);
    }
}
