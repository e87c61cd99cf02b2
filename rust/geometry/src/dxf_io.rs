// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DXF persistence for [`VectorDocument`]
//!
//! Reading understands LINE, LWPOLYLINE, POLYLINE and INSERT entities; every
//! other entity type is skipped. Fill markers are written as closed
//! LWPOLYLINEs on the fill layer and read back as hatches.

use crate::document::{BlockDefinition, EntityGeometry, VectorDocument, VectorEntity, WALL_FILL_LAYER};
use crate::error::{Error, Result};
use crate::types::{Point2D, Segment2D};
use dxf::entities::{Entity, EntityType, Insert, Line, LwPolyline};
use dxf::enums::AcadVersion;
use dxf::tables::Layer;
use dxf::{Block, Drawing, Handle, LwPolylineVertex, Point};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn to_dxf_point(p: &Point2D) -> Point {
    Point::new(p.x, p.y, 0.0)
}

fn from_dxf_point(p: &Point) -> Point2D {
    Point2D::new(p.x, p.y)
}

/// Validate that `path` names an existing `.dxf` file and load it
pub fn open_dxf(path: &Path) -> Result<VectorDocument> {
    if !path.is_file() {
        return Err(Error::Document(format!(
            "DXF file does not exist: {}",
            path.display()
        )));
    }
    let is_dxf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("dxf"))
        .unwrap_or(false);
    if !is_dxf {
        return Err(Error::Document(format!(
            "only .dxf files are supported: {}",
            path.display()
        )));
    }
    read_dxf(path)
}

/// Read a DXF file into a new document
pub fn read_dxf(path: &Path) -> Result<VectorDocument> {
    let file = File::open(path)
        .map_err(|e| Error::Document(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let drawing = Drawing::load(&mut reader)
        .map_err(|e| Error::Document(format!("cannot parse {}: {}", path.display(), e)))?;
    let doc = document_from_drawing(&drawing);
    tracing::debug!(
        path = %path.display(),
        entities = doc.len(),
        blocks = doc.blocks().len(),
        "Loaded DXF document"
    );
    Ok(doc)
}

/// Write a document as a DXF R2010 file
pub fn write_dxf(doc: &VectorDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let drawing = drawing_from_document(doc);
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    drawing.save(&mut writer)?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), entities = doc.len(), "Saved DXF document");
    Ok(())
}

/// Convert a parsed drawing into a document
pub fn document_from_drawing(drawing: &Drawing) -> VectorDocument {
    let mut doc = VectorDocument::new();

    for block in drawing.blocks() {
        // *Model_Space, *Paper_Space and anonymous blocks are not user blocks
        if block.name.is_empty() || block.name.starts_with('*') {
            continue;
        }
        let segments = block
            .entities
            .iter()
            .filter_map(|e| geometry_from_entity(&e.specific, &e.common.layer))
            .flat_map(|g| g.segments())
            .collect();
        doc.define_block(BlockDefinition {
            name: block.name.clone(),
            segments,
        });
    }

    let mut skipped = 0usize;
    for entity in drawing.entities() {
        match geometry_from_entity(&entity.specific, &entity.common.layer) {
            Some(geometry) => {
                let handle = if entity.common.handle.0 == 0 {
                    String::new()
                } else {
                    format!("{:X}", entity.common.handle.0)
                };
                doc.insert(VectorEntity {
                    handle,
                    layer: entity.common.layer.clone(),
                    geometry,
                });
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "Skipped unsupported DXF entities");
    }
    doc
}

fn geometry_from_entity(specific: &EntityType, layer: &str) -> Option<EntityGeometry> {
    match specific {
        EntityType::Line(line) => Some(EntityGeometry::Line {
            start: from_dxf_point(&line.p1),
            end: from_dxf_point(&line.p2),
        }),
        EntityType::LwPolyline(polyline) => {
            let points: Vec<Point2D> = polyline
                .vertices
                .iter()
                .map(|v| Point2D::new(v.x, v.y))
                .collect();
            // Bit 0 (value 1) indicates closed
            let closed = polyline.flags & 1 != 0;
            if closed && layer.eq_ignore_ascii_case(WALL_FILL_LAYER) {
                Some(EntityGeometry::Hatch { boundary: points })
            } else {
                Some(EntityGeometry::Polyline { points, closed })
            }
        }
        EntityType::Polyline(polyline) => {
            let points = polyline
                .vertices()
                .map(|v| from_dxf_point(&v.location))
                .collect();
            Some(EntityGeometry::Polyline {
                points,
                closed: polyline.flags & 1 != 0,
            })
        }
        EntityType::Insert(insert) => Some(EntityGeometry::BlockRef {
            block: insert.name.clone(),
            insertion: from_dxf_point(&insert.location),
            x_scale: insert.x_scale_factor,
            y_scale: insert.y_scale_factor,
        }),
        _ => None,
    }
}

fn lw_polyline(points: &[Point2D], closed: bool) -> LwPolyline {
    let mut polyline = LwPolyline::default();
    polyline.vertices = points
        .iter()
        .map(|p| {
            let mut vertex = LwPolylineVertex::default();
            vertex.x = p.x;
            vertex.y = p.y;
            vertex
        })
        .collect();
    if closed {
        polyline.flags |= 1;
    }
    polyline
}

fn line_entity(segment: &Segment2D) -> Entity {
    Entity::new(EntityType::Line(Line::new(
        to_dxf_point(&segment.start),
        to_dxf_point(&segment.end),
    )))
}

/// Convert a document into a drawing ready to be saved
pub fn drawing_from_document(doc: &VectorDocument) -> Drawing {
    let mut drawing = Drawing::new();
    drawing.header.version = AcadVersion::R2010;

    // Entity handles are kept as-is; tables, blocks and child records are
    // numbered above the largest one
    let handles: Vec<Option<u64>> = doc
        .entities()
        .iter()
        .map(|e| u64::from_str_radix(&e.handle, 16).ok().filter(|&v| v != 0))
        .collect();
    let max_handle = handles.iter().flatten().copied().max().unwrap_or(0);
    if drawing.header.next_available_handle.0 <= max_handle {
        drawing.header.next_available_handle = Handle(max_handle + 1);
    }

    for name in doc.layer_names() {
        if name == "0" {
            continue;
        }
        let mut layer = Layer::default();
        layer.name = name;
        drawing.add_layer(layer);
    }

    for block in doc.blocks() {
        let mut dxf_block = Block::default();
        dxf_block.name = block.name.clone();
        dxf_block.entities = block.segments.iter().map(line_entity).collect();
        drawing.add_block(dxf_block);
    }

    for e in doc.entities() {
        let specific = match &e.geometry {
            EntityGeometry::Line { start, end } => {
                EntityType::Line(Line::new(to_dxf_point(start), to_dxf_point(end)))
            }
            EntityGeometry::Polyline { points, closed } => {
                EntityType::LwPolyline(lw_polyline(points, *closed))
            }
            EntityGeometry::Hatch { boundary } => EntityType::LwPolyline(lw_polyline(boundary, true)),
            EntityGeometry::BlockRef {
                block,
                insertion,
                x_scale,
                y_scale,
            } => {
                let mut insert = Insert::default();
                insert.name = block.clone();
                insert.location = to_dxf_point(insertion);
                insert.x_scale_factor = *x_scale;
                insert.y_scale_factor = *y_scale;
                EntityType::Insert(insert)
            }
        };
        let mut entity = Entity::new(specific);
        entity.common.layer = e.layer.clone();
        drawing.add_entity(entity);
    }

    // add_entity always allocates a fresh handle
    for (entity, handle) in drawing.entities_mut().zip(&handles) {
        if let Some(value) = handle {
            entity.common.handle = Handle(*value);
        }
    }

    drawing
}
