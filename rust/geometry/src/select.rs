// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keyword-based target selection
//!
//! Descriptions are matched by keywords only: a wall keyword restricts the
//! candidates to the wall layer, and a compass keyword narrows them to the
//! walls sitting on that side of the plan.

use crate::document::{VectorDocument, WALL_LAYER};
use crate::types::{Bounds, Point2D};

/// Relative tolerance for "on the extreme side" tests
const SIDE_TOLERANCE_FRAC: f64 = 0.02;
const MIN_SIDE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
struct Sides {
    north: bool,
    south: bool,
    east: bool,
    west: bool,
}

impl Sides {
    fn parse(desc: &str, lowered: &str) -> Self {
        Self {
            north: desc.contains('北') || lowered.contains("north"),
            south: desc.contains('南') || lowered.contains("south"),
            east: desc.contains('东') || lowered.contains("east"),
            west: desc.contains('西') || lowered.contains("west"),
        }
    }

    fn any(&self) -> bool {
        self.north || self.south || self.east || self.west
    }
}

fn mentions_wall(desc: &str, lowered: &str) -> bool {
    desc.contains('墙') || lowered.contains("wall")
}

/// Handles of the entities a description refers to, in document order.
///
/// An empty result means nothing matched; the caller decides whether that
/// is an error.
pub fn select_targets(doc: &VectorDocument, target_description: &str) -> Vec<String> {
    let desc = target_description.trim();
    if desc.is_empty() {
        return Vec::new();
    }
    let lowered = desc.to_lowercase();

    if !mentions_wall(desc, &lowered) {
        return doc.entities().iter().map(|e| e.handle.clone()).collect();
    }

    let walls: Vec<&crate::document::VectorEntity> = doc
        .entities()
        .iter()
        .filter(|e| e.layer.to_uppercase() == WALL_LAYER)
        .collect();
    if walls.is_empty() {
        return Vec::new();
    }
    let all_walls = || walls.iter().map(|e| e.handle.clone()).collect::<Vec<_>>();

    let sides = Sides::parse(desc, &lowered);
    if !sides.any() {
        return all_walls();
    }

    let mids: Vec<(&str, Point2D)> = walls
        .iter()
        .filter_map(|e| e.segment_bounds().map(|b| (e.handle.as_str(), b.center())))
        .collect();
    let span = match Bounds::of_points(mids.iter().map(|(_, p)| p)) {
        Some(span) => span,
        None => return all_walls(),
    };
    let tol_x = (span.extent_x() * SIDE_TOLERANCE_FRAC).max(MIN_SIDE_TOLERANCE);
    let tol_y = (span.extent_y() * SIDE_TOLERANCE_FRAC).max(MIN_SIDE_TOLERANCE);

    let selected: Vec<String> = mids
        .iter()
        .filter(|(_, p)| {
            // First matching side wins, north to west
            if sides.north && span.max_y - p.y <= tol_y {
                true
            } else if sides.south && p.y - span.min_y <= tol_y {
                true
            } else if sides.east && span.max_x - p.x <= tol_x {
                true
            } else {
                sides.west && p.x - span.min_x <= tol_x
            }
        })
        .map(|(h, _)| h.to_string())
        .collect();

    if selected.is_empty() {
        all_walls()
    } else {
        selected
    }
}
