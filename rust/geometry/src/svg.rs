// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flat SVG preview of a document's segments

use crate::document::VectorDocument;
use crate::types::Bounds;
use std::fmt::Write;

const EMPTY_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"></svg>"#;

/// Render every segment as an SVG `<line>`, Y pointing down
pub fn render_svg(doc: &VectorDocument) -> String {
    let segments = doc.segments();
    let bounds = match Bounds::of_segments(&segments) {
        Some(b) => b,
        None => return EMPTY_SVG.to_string(),
    };

    let mut pad = bounds.extent_x().max(bounds.extent_y()) * 0.05;
    if pad == 0.0 {
        pad = 10.0;
    }
    let min_x = bounds.min_x - pad;
    let max_y = bounds.max_y + pad;
    let width = bounds.extent_x() + 2.0 * pad;
    let height = bounds.extent_y() + 2.0 * pad;

    let mut body = String::with_capacity(segments.len() * 96);
    for s in &segments {
        let _ = write!(
            body,
            r##"<line x1="{:.3}" y1="{:.3}" x2="{:.3}" y2="{:.3}" stroke="#111" stroke-width="1" />"##,
            s.start.x - min_x,
            max_y - s.start.y,
            s.end.x - min_x,
            max_y - s.end.y,
        );
    }

    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {:.3} {:.3}">{}</svg>"#,
        width, height, body
    )
}
