// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collinear overlap detection between moved and stationary segments

use crate::types::Segment2D;
use serde::{Deserialize, Serialize};

/// Shortest shared length reported as an overlap
pub const DEFAULT_MIN_OVERLAP: f64 = 1e-3;

/// Relative tolerance for "lies on the same line"
const COLLINEAR_EPSILON: f64 = 1e-9;

/// A moved segment running along a stationary one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapViolation {
    pub moved_segment: Segment2D,
    pub overlapped_segment: Segment2D,
    pub overlap_length: f64,
}

/// Shared length of two segments when both lie on the same infinite line,
/// `None` if they are not collinear or either is degenerate.
pub fn collinear_overlap_length(a: &Segment2D, b: &Segment2D) -> Option<f64> {
    let dir = a.direction()?;
    b.direction()?;

    let origin = a.start.to_nalgebra();
    let tol = COLLINEAR_EPSILON * a.length().max(b.length()).max(1.0);

    // Perpendicular distance of b's endpoints to a's line
    let normal = nalgebra::Vector2::new(-dir.y, dir.x);
    for p in [b.start, b.end] {
        let offset = p.to_nalgebra() - origin;
        if offset.dot(&normal).abs() > tol {
            return None;
        }
    }

    let project = |p: &crate::types::Point2D| (p.to_nalgebra() - origin).dot(&dir);
    let (a0, a1) = (0.0_f64, a.length());
    let (mut b0, mut b1) = (project(&b.start), project(&b.end));
    if b0 > b1 {
        std::mem::swap(&mut b0, &mut b1);
    }

    let lo = a0.max(b0);
    let hi = a1.min(b1);
    Some((hi - lo).max(0.0))
}

/// Every (moved, other) pair that overlaps along a shared line by at least
/// `min_overlap_length`. Pairwise, O(n·m).
pub fn find_collinear_overlaps(
    moved: &[Segment2D],
    others: &[Segment2D],
    min_overlap_length: f64,
) -> Vec<OverlapViolation> {
    let mut violations = Vec::new();
    for m in moved {
        for o in others {
            if let Some(len) = collinear_overlap_length(m, o) {
                if len >= min_overlap_length {
                    violations.push(OverlapViolation {
                        moved_segment: *m,
                        overlapped_segment: *o,
                        overlap_length: len,
                    });
                }
            }
        }
    }
    violations
}
