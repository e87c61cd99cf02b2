// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line and polygon operations on pixel-space geometry

use image::GrayImage;
use plancad_geometry::{Point2D, Segment2D};
use std::f64::consts::PI;

/// Upper bound on Hough peaks examined per image
const MAX_PEAKS: usize = 1000;

/// Max distance in pixels between an edge point and a peak's line
const PEAK_BAND: f64 = 2.0;

/// Detect segments with a probabilistic Hough transform.
///
/// 1 px rho and 1° theta resolution. Peaks are local maxima of the
/// accumulator with at least `threshold` votes, visited in descending vote
/// order; each edge point is claimed by at most one segment. No randomness:
/// the same edge image always yields the same segments in the same order.
pub fn detect_lines(
    edges: &GrayImage,
    threshold: u32,
    min_line_length: f64,
    max_line_gap: f64,
) -> Vec<Segment2D> {
    let width = edges.width() as i64;
    let height = edges.height() as i64;

    let num_thetas = 180usize;
    let theta_resolution = PI / num_thetas as f64;
    let cos_table: Vec<f64> = (0..num_thetas)
        .map(|i| (i as f64 * theta_resolution).cos())
        .collect();
    let sin_table: Vec<f64> = (0..num_thetas)
        .map(|i| (i as f64 * theta_resolution).sin())
        .collect();

    let max_rho = ((width * width + height * height) as f64).sqrt();
    let num_rhos = (2.0 * max_rho) as usize + 1;
    let rho_offset = max_rho;

    let mut edge_points: Vec<(i64, i64)> = Vec::new();
    for (x, y, p) in edges.enumerate_pixels() {
        if p.0[0] > 128 {
            edge_points.push((x as i64, y as i64));
        }
    }
    if edge_points.is_empty() {
        return Vec::new();
    }

    let mut accumulator = vec![0u32; num_thetas * num_rhos];
    for &(x, y) in &edge_points {
        for t in 0..num_thetas {
            let rho = x as f64 * cos_table[t] + y as f64 * sin_table[t];
            let r = (rho + rho_offset).round() as usize;
            if r < num_rhos {
                accumulator[t * num_rhos + r] += 1;
            }
        }
    }

    let votes_at = |t: i64, r: i64| -> u32 {
        // theta wraps around with a mirrored rho
        let (t, r) = if t < 0 {
            (t + num_thetas as i64, num_rhos as i64 - 1 - r)
        } else if t >= num_thetas as i64 {
            (t - num_thetas as i64, num_rhos as i64 - 1 - r)
        } else {
            (t, r)
        };
        if r < 0 || r >= num_rhos as i64 {
            0
        } else {
            accumulator[t as usize * num_rhos + r as usize]
        }
    };

    let mut peaks: Vec<(usize, usize, u32)> = Vec::new();
    for t in 0..num_thetas {
        for r in 0..num_rhos {
            let v = accumulator[t * num_rhos + r];
            if v < threshold.max(1) {
                continue;
            }
            let (ti, ri) = (t as i64, r as i64);
            // Strict on the earlier neighbours, loose on the later ones, so
            // plateaus keep exactly one peak
            let is_max = v > votes_at(ti - 1, ri)
                && v > votes_at(ti, ri - 1)
                && v >= votes_at(ti + 1, ri)
                && v >= votes_at(ti, ri + 1);
            if is_max {
                peaks.push((t, r, v));
            }
        }
    }
    // Stable: equal votes keep accumulator order
    peaks.sort_by(|a, b| b.2.cmp(&a.2));

    let mut lines = Vec::new();
    let mut used = vec![false; edge_points.len()];

    for &(t, r, _) in peaks.iter().take(MAX_PEAKS) {
        let rho = r as f64 - rho_offset;
        let (cos_t, sin_t) = (cos_table[t], sin_table[t]);

        let mut line_points: Vec<(i64, i64, usize)> = edge_points
            .iter()
            .enumerate()
            .filter(|(i, &(x, y))| {
                !used[*i] && (x as f64 * cos_t + y as f64 * sin_t - rho).abs() < PEAK_BAND
            })
            .map(|(i, &(x, y))| (x, y, i))
            .collect();
        if line_points.len() < 2 {
            continue;
        }

        // Order along the line direction
        let along = |p: &(i64, i64, usize)| p.0 as f64 * (-sin_t) + p.1 as f64 * cos_t;
        line_points.sort_by(|a, b| along(a).total_cmp(&along(b)));

        let mut run_start = 0;
        for i in 1..=line_points.len() {
            let split = i == line_points.len() || {
                let dx = (line_points[i].0 - line_points[i - 1].0) as f64;
                let dy = (line_points[i].1 - line_points[i - 1].1) as f64;
                (dx * dx + dy * dy).sqrt() > max_line_gap
            };
            if !split {
                continue;
            }
            if i - run_start >= 2 {
                let a = &line_points[run_start];
                let b = &line_points[i - 1];
                let segment = Segment2D::from_coords(a.0 as f64, a.1 as f64, b.0 as f64, b.1 as f64);
                if segment.length() >= min_line_length {
                    lines.push(segment);
                    for p in &line_points[run_start..i] {
                        used[p.2] = true;
                    }
                }
            }
            run_start = i;
        }
    }

    lines
}

/// Distance from `point` to the infinite line through `a` and `b`; falls
/// back to the distance to `a` when the line is degenerate.
pub fn point_line_distance(point: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let denom = (abx * abx + aby * aby).sqrt();
    if denom < 1e-6 {
        return point.distance_to(a);
    }
    let cross = abx * (point.y - a.y) - aby * (point.x - a.x);
    cross.abs() / denom
}

/// Douglas-Peucker line simplification algorithm
pub fn douglas_peucker(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = &points[0];
    let last = &points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_idx = 0;
    for (i, point) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = point_line_distance(point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        let left = douglas_peucker(&points[..=max_idx], epsilon);
        let right = douglas_peucker(&points[max_idx..], epsilon);
        let mut result = left;
        result.extend_from_slice(&right[1..]);
        result
    } else {
        vec![*first, *last]
    }
}

/// Douglas-Peucker on a closed ring.
///
/// The ring is split at the vertex farthest from the first one and both
/// halves are simplified as open chains. The result has no repeated
/// closing vertex.
pub fn simplify_closed(ring: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if ring.len() < 4 {
        return ring.to_vec();
    }
    let origin = ring[0];
    let split = ring
        .iter()
        .enumerate()
        .max_by(|a, b| origin.distance_to(a.1).total_cmp(&origin.distance_to(b.1)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    if split == 0 {
        return vec![origin];
    }

    let first_half = douglas_peucker(&ring[..=split], epsilon);
    let mut second: Vec<Point2D> = ring[split..].to_vec();
    second.push(origin);
    let second_half = douglas_peucker(&second, epsilon);

    let mut out = first_half;
    // Skip the shared split vertex and the repeated origin
    out.extend_from_slice(&second_half[1..second_half.len() - 1]);
    out
}

/// Absolute polygon area (shoelace)
pub fn polygon_area(points: &[Point2D]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    area.abs() / 2.0
}

/// Closed polygon perimeter
pub fn polygon_perimeter(points: &[Point2D]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    (0..points.len())
        .map(|i| points[i].distance_to(&points[(i + 1) % points.len()]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_point_line_distance() {
        let start = Point2D::new(0.0, 0.0);
        let end = Point2D::new(10.0, 0.0);
        // Infinite line: beyond the segment end still measures perpendicular
        let point = Point2D::new(20.0, 5.0);

        let dist = point_line_distance(&point, &start, &end);
        assert!((dist - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_douglas_peucker() {
        let points = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.1),
            Point2D::new(2.0, -0.1),
            Point2D::new(3.0, 0.0),
            Point2D::new(4.0, 0.0),
        ];

        let simplified = douglas_peucker(&points, 0.5);
        assert_eq!(simplified.len(), 2);
    }

    #[test]
    fn test_simplify_closed_square_ring() {
        let mut ring = Vec::new();
        for x in 0..10 {
            ring.push(Point2D::new(x as f64, 0.0));
        }
        for y in 0..10 {
            ring.push(Point2D::new(10.0, y as f64));
        }
        for x in (1..=10).rev() {
            ring.push(Point2D::new(x as f64, 10.0));
        }
        for y in (1..=10).rev() {
            ring.push(Point2D::new(0.0, y as f64));
        }
        let simplified = simplify_closed(&ring, 1.0);
        assert_eq!(simplified.len(), 4);
        assert!((polygon_area(&simplified) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_area_and_perimeter() {
        let square = vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
            Point2D::new(0.0, 10.0),
        ];
        assert!((polygon_area(&square) - 100.0).abs() < 1e-9);
        assert!((polygon_perimeter(&square) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_detect_horizontal_line() {
        let mut edges = GrayImage::new(100, 50);
        for x in 10..90 {
            edges.put_pixel(x, 25, Luma([255]));
        }
        let lines = detect_lines(&edges, 20, 10.0, 5.0);
        assert_eq!(lines.len(), 1);
        let l = &lines[0];
        assert!((l.start.y - 25.0).abs() < 1e-9 && (l.end.y - 25.0).abs() < 1e-9);
        assert!((l.length() - 79.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_splits_segments() {
        let mut edges = GrayImage::new(200, 20);
        for x in (10..60).chain(120..170) {
            edges.put_pixel(x, 10, Luma([255]));
        }
        let lines = detect_lines(&edges, 20, 10.0, 5.0);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_empty_edges() {
        assert!(detect_lines(&GrayImage::new(30, 30), 10, 5.0, 5.0).is_empty());
    }
}
