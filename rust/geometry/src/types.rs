// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar primitives shared by detection and editing

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Smallest width/height reported by [`Bounds`]
pub const BOUNDS_EPSILON: f64 = 1e-6;

/// A 2D point in pixel space (detection) or millimeter space (documents)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Straight segment between two points. Direction carries no meaning for
/// geometric tests; swapping endpoints describes the same wall.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Segment2D {
    pub start: Point2D,
    pub end: Point2D,
}

impl Segment2D {
    pub fn new(start: Point2D, end: Point2D) -> Self {
        Self { start, end }
    }

    pub fn from_coords(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(Point2D::new(x1, y1), Point2D::new(x2, y2))
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    /// Unit direction from start to end, `None` for degenerate segments
    pub fn direction(&self) -> Option<Vector2<f64>> {
        let d = self.end.to_nalgebra() - self.start.to_nalgebra();
        let len = d.norm();
        if len < 1e-12 {
            None
        } else {
            Some(d / len)
        }
    }

    /// Undirected angle in degrees, folded into `[0, 180)`
    pub fn angle_deg(&self) -> f64 {
        let dy = self.end.y - self.start.y;
        let dx = self.end.x - self.start.x;
        dy.atan2(dx).to_degrees().rem_euclid(180.0)
    }

    /// Same segment with endpoints swapped
    pub fn reversed(&self) -> Self {
        Self::new(self.end, self.start)
    }
}

/// Axis-aligned bounding box of a point or segment set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn of_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point2D>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        Some(bounds)
    }

    pub fn of_segments(segments: &[Segment2D]) -> Option<Self> {
        Self::of_points(segments.iter().flat_map(|s| [&s.start, &s.end]))
    }

    pub fn center(&self) -> Point2D {
        Point2D::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Width, floored at [`BOUNDS_EPSILON`]
    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(BOUNDS_EPSILON)
    }

    /// Height, floored at [`BOUNDS_EPSILON`]
    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(BOUNDS_EPSILON)
    }

    /// Raw extents without the epsilon floor
    pub fn extent_x(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn extent_y(&self) -> f64 {
        self.max_y - self.min_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_angle_is_direction_agnostic() {
        let s = Segment2D::from_coords(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(s.angle_deg(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(s.reversed().angle_deg(), 45.0, epsilon = 1e-9);

        let h = Segment2D::from_coords(10.0, 0.0, 0.0, 0.0);
        assert!(h.angle_deg() < 1e-9);
    }

    #[test]
    fn test_bounds_floor_width() {
        let segs = vec![Segment2D::from_coords(5.0, 0.0, 5.0, 10.0)];
        let b = Bounds::of_segments(&segs).unwrap();
        assert_eq!(b.extent_x(), 0.0);
        assert_eq!(b.width(), BOUNDS_EPSILON);
        assert_relative_eq!(b.height(), 10.0);
        assert_eq!(b.center(), Point2D::new(5.0, 5.0));
    }

    #[test]
    fn test_bounds_empty() {
        assert!(Bounds::of_segments(&[]).is_none());
    }

    #[test]
    fn test_direction_degenerate() {
        let s = Segment2D::from_coords(1.0, 1.0, 1.0, 1.0);
        assert!(s.direction().is_none());
        let d = Segment2D::from_coords(0.0, 0.0, 3.0, 4.0).direction().unwrap();
        assert_relative_eq!(d.x, 0.6);
        assert_relative_eq!(d.y, 0.8);
    }
}
