// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command engine: applies a [`CadModificationCommand`] to a document in place

use crate::command::{Axis, CadAction, CadModificationCommand};
use crate::document::{EntityGeometry, VectorDocument};
use crate::error::{Error, Result};
use crate::overlap::{find_collinear_overlaps, DEFAULT_MIN_OVERLAP};
use crate::select::select_targets;
use crate::types::{Bounds, Point2D, Segment2D};
use rustc_hash::FxHashSet;
use serde::Serialize;

/// What a successful edit touched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditOutcome {
    pub action: CadAction,
    pub affected_handles: Vec<String>,
}

/// Apply `cmd` to `doc`.
///
/// On `GeometricConflict` the document has already been mutated; callers
/// are expected to discard it rather than save it.
pub fn apply_command(doc: &mut VectorDocument, cmd: &CadModificationCommand) -> Result<EditOutcome> {
    cmd.validate()?;

    let targets = select_targets(doc, &cmd.target_description);
    if targets.is_empty() {
        return Err(Error::NoMatchingTarget(cmd.target_description.clone()));
    }
    tracing::debug!(
        action = %cmd.action_type,
        target = %cmd.target_description,
        selected = targets.len(),
        "Selected edit targets"
    );

    match cmd.action_type {
        CadAction::DeleteItem => delete_targets(doc, &targets),
        CadAction::ResizeRoom => {
            // validate() guarantees a positive value
            let value = cmd
                .value
                .ok_or_else(|| Error::InvalidCommand("RESIZE_ROOM requires value".into()))?;
            resize_targets(doc, &targets, cmd.resize_axis(), value)?;
        }
        CadAction::MoveWall => {
            let (dx, dy) = cmd.translation();
            move_targets(doc, &targets, dx, dy)?;
        }
    }

    tracing::info!(action = %cmd.action_type, affected = targets.len(), "Applied edit");
    Ok(EditOutcome {
        action: cmd.action_type,
        affected_handles: targets,
    })
}

fn delete_targets(doc: &mut VectorDocument, targets: &[String]) {
    for handle in targets {
        doc.remove(handle);
    }
}

fn resize_targets(doc: &mut VectorDocument, targets: &[String], axis: Axis, value: f64) -> Result<()> {
    // Reject the whole command before touching anything
    let mut plans = Vec::with_capacity(targets.len());
    for handle in targets {
        let entity = doc
            .entity(handle)
            .ok_or_else(|| Error::NoMatchingTarget(handle.clone()))?;
        if !matches!(entity.geometry, EntityGeometry::Polyline { .. }) {
            return Err(Error::Unsupported(format!(
                "RESIZE_ROOM only supports polylines, {} is {}",
                handle,
                entity.geometry.kind_name()
            )));
        }
        let bounds = entity.segment_bounds().ok_or_else(|| {
            Error::InvalidGeometry(format!("polyline {} has no segments", handle))
        })?;
        let current = match axis {
            Axis::X => bounds.extent_x(),
            Axis::Y => bounds.extent_y(),
        };
        if current <= 0.0 {
            return Err(Error::InvalidGeometry(format!(
                "polyline {} has zero extent along {}",
                handle,
                String::from(axis)
            )));
        }
        plans.push((handle.clone(), bounds, value / current));
    }

    for (handle, bounds, factor) in plans {
        if let Some(entity) = doc.entity_mut(&handle) {
            scale_about_center(&mut entity.geometry, &bounds, axis, factor);
        }
    }
    Ok(())
}

fn scale_about_center(geometry: &mut EntityGeometry, bounds: &Bounds, axis: Axis, factor: f64) {
    let c = bounds.center();
    let (sx, sy) = match axis {
        Axis::X => (factor, 1.0),
        Axis::Y => (1.0, factor),
    };
    geometry.map_points(|p| Point2D::new(c.x + (p.x - c.x) * sx, c.y + (p.y - c.y) * sy));
}

fn move_targets(doc: &mut VectorDocument, targets: &[String], dx: f64, dy: f64) -> Result<()> {
    let mut moved: Vec<Segment2D> = Vec::new();
    for handle in targets {
        if let Some(entity) = doc.entity_mut(handle) {
            entity.geometry.map_points(|p| p.translated(dx, dy));
            moved.extend(entity.segments());
        }
    }
    if moved.is_empty() {
        return Ok(());
    }

    let excluded: FxHashSet<String> = targets.iter().cloned().collect();
    let others = doc.segments_excluding(&excluded);
    let violations = find_collinear_overlaps(&moved, &others, DEFAULT_MIN_OVERLAP);
    if !violations.is_empty() {
        tracing::warn!(
            violations = violations.len(),
            dx,
            dy,
            "Wall move overlaps stationary geometry"
        );
        return Err(Error::GeometricConflict {
            violations: violations.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{WALL_FILL_LAYER, WALL_LAYER};
    use approx::assert_relative_eq;

    fn room(doc: &mut VectorDocument) -> String {
        doc.add_polyline(
            WALL_LAYER,
            vec![
                Point2D::new(0.0, 0.0),
                Point2D::new(1000.0, 0.0),
                Point2D::new(1000.0, 600.0),
                Point2D::new(0.0, 600.0),
            ],
            true,
        )
    }

    #[test]
    fn test_resize_room_y() {
        let mut doc = VectorDocument::new();
        let h = room(&mut doc);
        let cmd = CadModificationCommand::resize("room", Axis::Y, 300.0).unwrap();
        let outcome = apply_command(&mut doc, &cmd).unwrap();
        assert_eq!(outcome.affected_handles, vec![h.clone()]);

        let b = doc.entity(&h).unwrap().segment_bounds().unwrap();
        assert_relative_eq!(b.min_y, 150.0);
        assert_relative_eq!(b.max_y, 450.0);
        assert_relative_eq!(b.min_x, 0.0);
        assert_relative_eq!(b.max_x, 1000.0);
    }

    #[test]
    fn test_resize_rejects_lines_without_mutation() {
        let mut doc = VectorDocument::new();
        let poly = room(&mut doc);
        doc.add_line(WALL_LAYER, Point2D::new(0.0, 0.0), Point2D::new(5.0, 0.0));
        let before = doc.clone();
        let cmd = CadModificationCommand::resize("room", Axis::X, 2000.0).unwrap();
        let err = apply_command(&mut doc, &cmd).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert_eq!(doc, before);
        assert!(doc.entity(&poly).is_some());
    }

    #[test]
    fn test_non_finite_move_leaves_document_untouched() {
        let mut doc = VectorDocument::new();
        room(&mut doc);
        let before = doc.clone();
        let mut cmd = CadModificationCommand::move_by("wall", 100.0, 0.0).unwrap();
        cmd.delta_y = Some(f64::NAN);
        let err = apply_command(&mut doc, &cmd).unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_resize_zero_extent() {
        let mut doc = VectorDocument::new();
        doc.add_polyline(
            WALL_LAYER,
            vec![Point2D::new(5.0, 0.0), Point2D::new(5.0, 100.0)],
            false,
        );
        let cmd = CadModificationCommand::resize("room", Axis::X, 10.0).unwrap();
        let err = apply_command(&mut doc, &cmd).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[test]
    fn test_move_translates_markers_too() {
        let mut doc = VectorDocument::new();
        let wall = doc.add_line(WALL_LAYER, Point2D::new(0.0, 0.0), Point2D::new(0.0, 100.0));
        let fill = doc.add_hatch(WALL_LAYER, vec![Point2D::new(1.0, 1.0), Point2D::new(2.0, 2.0)]);
        doc.add_line(WALL_FILL_LAYER, Point2D::new(50.0, 0.0), Point2D::new(50.0, 100.0));

        let cmd = CadModificationCommand::move_by("wall", 10.0, -5.0).unwrap();
        apply_command(&mut doc, &cmd).unwrap();

        match &doc.entity(&wall).unwrap().geometry {
            EntityGeometry::Line { start, end } => {
                assert_eq!(*start, Point2D::new(10.0, -5.0));
                assert_eq!(*end, Point2D::new(10.0, 95.0));
            }
            other => panic!("unexpected geometry {:?}", other),
        }
        match &doc.entity(&fill).unwrap().geometry {
            EntityGeometry::Hatch { boundary } => assert_eq!(boundary[0], Point2D::new(11.0, -4.0)),
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_delete_without_match() {
        let mut doc = VectorDocument::new();
        doc.add_line("DOOR", Point2D::new(0.0, 0.0), Point2D::new(1.0, 0.0));
        let cmd = CadModificationCommand::delete("north wall").unwrap();
        let err = apply_command(&mut doc, &cmd).unwrap_err();
        assert!(matches!(err, Error::NoMatchingTarget(_)));
        assert_eq!(doc.len(), 1);
    }
}
