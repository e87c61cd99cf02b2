// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PlanCAD Geometry
//!
//! Vector floor-plan documents: DXF persistence, structured wall edits with
//! overlap checks, and SVG previews.

pub mod command;
pub mod document;
pub mod dxf_io;
pub mod edit;
pub mod error;
pub mod overlap;
pub mod select;
pub mod session;
pub mod svg;
pub mod types;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Vector2};

pub use command::{Axis, CadAction, CadModificationCommand};
pub use document::{
    BlockDefinition, EntityGeometry, VectorDocument, VectorEntity, DOOR_LAYER, WALL_FILL_LAYER,
    WALL_LAYER, WINDOW_LAYER,
};
pub use dxf_io::{open_dxf, read_dxf, write_dxf};
pub use edit::{apply_command, EditOutcome};
pub use error::{Error, Result};
pub use overlap::{find_collinear_overlaps, OverlapViolation, DEFAULT_MIN_OVERLAP};
pub use select::select_targets;
pub use session::{next_revision_path, EditResult, EditSession};
pub use svg::render_svg;
pub use types::{Bounds, Point2D, Segment2D};
