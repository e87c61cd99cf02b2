// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edit session over a DXF file on disk
//!
//! Every successful edit is written to a new sibling file so earlier
//! revisions are never overwritten.

use crate::command::CadModificationCommand;
use crate::document::VectorDocument;
use crate::dxf_io::{open_dxf, write_dxf};
use crate::edit::{apply_command, EditOutcome};
use crate::error::{Error, Result};
use crate::svg::render_svg;
use std::path::{Path, PathBuf};

/// Result of one applied edit
#[derive(Debug, Clone)]
pub struct EditResult {
    pub output_path: PathBuf,
    pub svg_preview: String,
    pub outcome: EditOutcome,
}

/// A document loaded from disk plus the path it came from
#[derive(Debug)]
pub struct EditSession {
    source: PathBuf,
    document: VectorDocument,
}

impl EditSession {
    /// Load a `.dxf` file for editing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = open_dxf(path)?;
        Ok(Self {
            source: path.to_path_buf(),
            document,
        })
    }

    pub fn document(&self) -> &VectorDocument {
        &self.document
    }

    /// Apply a command and save the result next to the source file.
    ///
    /// The session's document only changes when the edit succeeds.
    pub fn apply(&mut self, cmd: &CadModificationCommand) -> Result<EditResult> {
        let mut working = self.document.clone();
        let outcome = apply_command(&mut working, cmd)?;

        let output_path = next_revision_path(&self.source)?;
        write_dxf(&working, &output_path)?;
        let svg_preview = render_svg(&working);
        self.document = working;

        tracing::info!(output = %output_path.display(), "Saved edited drawing");
        Ok(EditResult {
            output_path,
            svg_preview,
            outcome,
        })
    }

    /// SVG of the current document
    pub fn preview(&self) -> String {
        render_svg(&self.document)
    }
}

/// First free `<stem>_modified.dxf`, `<stem>_modified_2.dxf`, ... next to `source`
pub fn next_revision_path(source: &Path) -> Result<PathBuf> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Document(format!("invalid file name: {}", source.display())))?;
    let dir = source.parent().unwrap_or_else(|| Path::new(""));

    let first = dir.join(format!("{}_modified.dxf", stem));
    if !first.exists() {
        return Ok(first);
    }
    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{}_modified_{}.dxf", stem, n));
        if !candidate.exists() {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_path_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("plan.dxf");
        assert_eq!(next_revision_path(&source).unwrap(), dir.path().join("plan_modified.dxf"));

        std::fs::write(dir.path().join("plan_modified.dxf"), "").unwrap();
        assert_eq!(next_revision_path(&source).unwrap(), dir.path().join("plan_modified_2.dxf"));

        std::fs::write(dir.path().join("plan_modified_2.dxf"), "").unwrap();
        assert_eq!(next_revision_path(&source).unwrap(), dir.path().join("plan_modified_3.dxf"));
    }

    #[test]
    fn test_open_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = EditSession::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Document(_)));
    }
}
