// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory vector document: layered line/polyline entities with stable handles

use crate::types::{Bounds, Point2D, Segment2D};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Layer holding wall axes and wall footprints
pub const WALL_LAYER: &str = "WALL";
/// Layer holding fill markers paired with wall footprints
pub const WALL_FILL_LAYER: &str = "WALL_FILL";
pub const WINDOW_LAYER: &str = "WINDOW";
pub const DOOR_LAYER: &str = "DOOR";

/// Geometry carried by a [`VectorEntity`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityGeometry {
    Line {
        start: Point2D,
        end: Point2D,
    },
    Polyline {
        points: Vec<Point2D>,
        closed: bool,
    },
    /// Filled-region marker; never decomposed into segments
    Hatch { boundary: Vec<Point2D> },
    /// Insertion of a named block definition
    BlockRef {
        block: String,
        insertion: Point2D,
        x_scale: f64,
        y_scale: f64,
    },
}

impl EntityGeometry {
    /// DXF-style type name, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            EntityGeometry::Line { .. } => "LINE",
            EntityGeometry::Polyline { .. } => "POLYLINE",
            EntityGeometry::Hatch { .. } => "HATCH",
            EntityGeometry::BlockRef { .. } => "INSERT",
        }
    }

    /// Decompose into straight segments.
    ///
    /// Polylines yield consecutive segments plus a closing segment when closed
    /// with at least three points. Hatches and block references yield nothing.
    pub fn segments(&self) -> Vec<Segment2D> {
        match self {
            EntityGeometry::Line { start, end } => vec![Segment2D::new(*start, *end)],
            EntityGeometry::Polyline { points, closed } => {
                if points.len() < 2 {
                    return Vec::new();
                }
                let mut segs: Vec<Segment2D> = points
                    .windows(2)
                    .map(|w| Segment2D::new(w[0], w[1]))
                    .collect();
                if *closed && points.len() >= 3 {
                    segs.push(Segment2D::new(points[points.len() - 1], points[0]));
                }
                segs
            }
            EntityGeometry::Hatch { .. } | EntityGeometry::BlockRef { .. } => Vec::new(),
        }
    }

    /// Apply `f` to every stored point (block insertion point included)
    pub fn map_points<F>(&mut self, mut f: F)
    where
        F: FnMut(Point2D) -> Point2D,
    {
        match self {
            EntityGeometry::Line { start, end } => {
                *start = f(*start);
                *end = f(*end);
            }
            EntityGeometry::Polyline { points, .. } => {
                for p in points.iter_mut() {
                    *p = f(*p);
                }
            }
            EntityGeometry::Hatch { boundary } => {
                for p in boundary.iter_mut() {
                    *p = f(*p);
                }
            }
            EntityGeometry::BlockRef { insertion, .. } => {
                *insertion = f(*insertion);
            }
        }
    }
}

/// One drawable entity: geometry tagged with a layer and a stable handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntity {
    /// Upper-case hexadecimal identity, unique within a document
    pub handle: String,
    pub layer: String,
    pub geometry: EntityGeometry,
}

impl VectorEntity {
    pub fn segments(&self) -> Vec<Segment2D> {
        self.geometry.segments()
    }

    pub fn is_on_layer(&self, layer: &str) -> bool {
        self.layer.eq_ignore_ascii_case(layer)
    }

    /// Bounding box of the entity's segments
    pub fn segment_bounds(&self) -> Option<Bounds> {
        Bounds::of_segments(&self.segments())
    }
}

/// Named block: a reusable set of segments in block-local coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    pub segments: Vec<Segment2D>,
}

impl BlockDefinition {
    /// Axis-aligned unit square anchored at the origin
    pub fn unit_square(name: &str) -> Self {
        let p = [
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(0.0, 1.0),
        ];
        Self {
            name: name.to_string(),
            segments: (0..4).map(|i| Segment2D::new(p[i], p[(i + 1) % 4])).collect(),
        }
    }
}

/// Collection of entities produced by one reconstruction run or loaded for
/// one edit session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    entities: Vec<VectorEntity>,
    blocks: Vec<BlockDefinition>,
    next_handle: u64,
}

impl Default for VectorDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorDocument {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            blocks: Vec::new(),
            // Low handles are reserved for DXF tables
            next_handle: 0x100,
        }
    }

    fn allocate_handle(&mut self) -> String {
        let handle = format!("{:X}", self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Insert an entity, keeping its handle when it is free and allocating a
    /// fresh one otherwise. Returns the handle actually used.
    pub fn insert(&mut self, mut entity: VectorEntity) -> String {
        let normalized = entity.handle.trim().to_ascii_uppercase();
        let taken = normalized.is_empty() || self.entity(&normalized).is_some();
        entity.handle = if taken {
            self.allocate_handle()
        } else {
            if let Ok(value) = u64::from_str_radix(&normalized, 16) {
                self.next_handle = self.next_handle.max(value + 1);
            }
            normalized
        };
        let handle = entity.handle.clone();
        self.entities.push(entity);
        handle
    }

    fn push(&mut self, layer: &str, geometry: EntityGeometry) -> String {
        let handle = self.allocate_handle();
        self.entities.push(VectorEntity {
            handle: handle.clone(),
            layer: layer.to_string(),
            geometry,
        });
        handle
    }

    pub fn add_line(&mut self, layer: &str, start: Point2D, end: Point2D) -> String {
        self.push(layer, EntityGeometry::Line { start, end })
    }

    pub fn add_polyline(&mut self, layer: &str, points: Vec<Point2D>, closed: bool) -> String {
        self.push(layer, EntityGeometry::Polyline { points, closed })
    }

    pub fn add_hatch(&mut self, layer: &str, boundary: Vec<Point2D>) -> String {
        self.push(layer, EntityGeometry::Hatch { boundary })
    }

    pub fn add_block_ref(
        &mut self,
        layer: &str,
        block: &str,
        insertion: Point2D,
        x_scale: f64,
        y_scale: f64,
    ) -> String {
        self.push(
            layer,
            EntityGeometry::BlockRef {
                block: block.to_string(),
                insertion,
                x_scale,
                y_scale,
            },
        )
    }

    /// Register a block definition, replacing any previous one with the same name
    pub fn define_block(&mut self, block: BlockDefinition) {
        self.blocks.retain(|b| b.name != block.name);
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[BlockDefinition] {
        &self.blocks
    }

    pub fn entities(&self) -> &[VectorEntity] {
        &self.entities
    }

    pub fn entity(&self, handle: &str) -> Option<&VectorEntity> {
        self.entities.iter().find(|e| e.handle == handle)
    }

    pub fn entity_mut(&mut self, handle: &str) -> Option<&mut VectorEntity> {
        self.entities.iter_mut().find(|e| e.handle == handle)
    }

    /// Remove an entity by handle, returning it if present
    pub fn remove(&mut self, handle: &str) -> Option<VectorEntity> {
        let idx = self.entities.iter().position(|e| e.handle == handle)?;
        Some(self.entities.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All segments of all entities, in entity order
    pub fn segments(&self) -> Vec<Segment2D> {
        self.entities.iter().flat_map(|e| e.segments()).collect()
    }

    /// Segments of every entity whose handle is not in `excluded`
    pub fn segments_excluding(&self, excluded: &FxHashSet<String>) -> Vec<Segment2D> {
        self.entities
            .iter()
            .filter(|e| !excluded.contains(&e.handle))
            .flat_map(|e| e.segments())
            .collect()
    }

    /// Distinct layer names in first-use order
    pub fn layer_names(&self) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut names = Vec::new();
        for e in &self.entities {
            if seen.insert(e.layer.clone()) {
                names.push(e.layer.clone());
            }
        }
        names
    }
}
