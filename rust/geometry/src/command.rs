// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structured CAD modification commands
//!
//! Commands arrive already parsed (typically as JSON). Only the shape
//! invariants are checked here; geometry is validated by the edit engine.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported edit actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CadAction {
    MoveWall,
    ResizeRoom,
    DeleteItem,
}

impl CadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CadAction::MoveWall => "MOVE_WALL",
            CadAction::ResizeRoom => "RESIZE_ROOM",
            CadAction::DeleteItem => "DELETE_ITEM",
        }
    }
}

impl fmt::Display for CadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CadAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MOVE_WALL" => Ok(CadAction::MoveWall),
            "RESIZE_ROOM" => Ok(CadAction::ResizeRoom),
            "DELETE_ITEM" => Ok(CadAction::DeleteItem),
            other => Err(Error::Unsupported(format!("action type {:?}", other))),
        }
    }
}

impl TryFrom<String> for CadAction {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CadAction> for String {
    fn from(action: CadAction) -> Self {
        action.as_str().to_string()
    }
}

/// Axis along which a resize applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Axis {
    #[default]
    X,
    Y,
}

impl FromStr for Axis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            other => Err(Error::InvalidCommand(format!(
                "axis must be x or y, got {:?}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Axis {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Axis> for String {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::X => "x".to_string(),
            Axis::Y => "y".to_string(),
        }
    }
}

/// One edit request. Lengths are millimeters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadModificationCommand {
    pub action_type: CadAction,
    /// Free-text description of the target, e.g. "north wall"
    pub target_description: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub delta_x: Option<f64>,
    #[serde(default)]
    pub delta_y: Option<f64>,
    #[serde(default)]
    pub axis: Option<Axis>,
}

impl CadModificationCommand {
    fn bare(action_type: CadAction, target_description: &str) -> Self {
        Self {
            action_type,
            target_description: target_description.trim().to_string(),
            value: None,
            delta_x: None,
            delta_y: None,
            axis: None,
        }
    }

    /// Build a command with only an action and a target
    pub fn new(action_type: CadAction, target_description: &str) -> Result<Self> {
        let cmd = Self::bare(action_type, target_description);
        cmd.validate()?;
        Ok(cmd)
    }

    pub fn delete(target_description: &str) -> Result<Self> {
        Self::new(CadAction::DeleteItem, target_description)
    }

    pub fn move_by(target_description: &str, delta_x: f64, delta_y: f64) -> Result<Self> {
        let mut cmd = Self::bare(CadAction::MoveWall, target_description);
        cmd.delta_x = Some(delta_x);
        cmd.delta_y = Some(delta_y);
        cmd.validate()?;
        Ok(cmd)
    }

    pub fn resize(target_description: &str, axis: Axis, value: f64) -> Result<Self> {
        let mut cmd = Self::bare(CadAction::ResizeRoom, target_description);
        cmd.axis = Some(axis);
        cmd.value = Some(value);
        cmd.validate()?;
        Ok(cmd)
    }

    /// Parse and validate a JSON command
    pub fn from_json(json: &str) -> Result<Self> {
        let malformed =
            |e: serde_json::Error| Error::InvalidCommand(format!("malformed command JSON: {}", e));
        let raw: serde_json::Value = serde_json::from_str(json).map_err(malformed)?;
        // Unknown actions surface as Unsupported, not as a shape error
        if let Some(action) = raw.get("action_type").and_then(serde_json::Value::as_str) {
            action.parse::<CadAction>()?;
        }
        let mut cmd: Self = serde_json::from_value(raw).map_err(malformed)?;
        cmd.target_description = cmd.target_description.trim().to_string();
        cmd.validate()?;
        Ok(cmd)
    }

    /// Check the command invariants before any geometry is touched
    pub fn validate(&self) -> Result<()> {
        if self.target_description.trim().is_empty() {
            return Err(Error::InvalidCommand(
                "target_description must not be empty".into(),
            ));
        }
        match self.action_type {
            CadAction::ResizeRoom => match self.value {
                None => Err(Error::InvalidCommand("RESIZE_ROOM requires value".into())),
                Some(v) if !(v.is_finite() && v > 0.0) => Err(Error::InvalidCommand(format!(
                    "RESIZE_ROOM value must be positive, got {}",
                    v
                ))),
                Some(_) => Ok(()),
            },
            CadAction::MoveWall => {
                let (dx, dy) = self.translation();
                if !dx.is_finite() || !dy.is_finite() {
                    Err(Error::InvalidCommand(format!(
                        "MOVE_WALL delta must be finite, got ({}, {})",
                        dx, dy
                    )))
                } else if dx == 0.0 && dy == 0.0 {
                    Err(Error::InvalidCommand(
                        "MOVE_WALL requires a nonzero delta_x/delta_y".into(),
                    ))
                } else {
                    Ok(())
                }
            }
            CadAction::DeleteItem => Ok(()),
        }
    }

    /// Translation for MOVE_WALL; `value` stands in for a missing `delta_x`
    pub fn translation(&self) -> (f64, f64) {
        let dx = self.delta_x.or(self.value).unwrap_or(0.0);
        let dy = self.delta_y.unwrap_or(0.0);
        (dx, dy)
    }

    pub fn resize_axis(&self) -> Axis {
        self.axis.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_command_parses_and_trims() {
        let cmd = CadModificationCommand::from_json(
            r#"{"action_type":"RESIZE_ROOM","target_description":"  living room ","value":2000,"axis":" Y "}"#,
        )
        .unwrap();
        assert_eq!(cmd.action_type, CadAction::ResizeRoom);
        assert_eq!(cmd.target_description, "living room");
        assert_eq!(cmd.resize_axis(), Axis::Y);
    }

    #[test]
    fn test_empty_target_rejected() {
        let err = CadModificationCommand::delete("   ").unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }

    #[test]
    fn test_invalid_axis_rejected() {
        let err = CadModificationCommand::from_json(
            r#"{"action_type":"RESIZE_ROOM","target_description":"room","value":10,"axis":"z"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = CadModificationCommand::from_json(
            r#"{"action_type":"ROTATE_WALL","target_description":"wall"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)), "got {:?}", err);
        assert!(err.to_string().contains("ROTATE_WALL"));
        assert!(matches!("ROTATE_WALL".parse::<CadAction>(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_non_string_action_is_invalid() {
        let err = CadModificationCommand::from_json(r#"{"action_type":7,"target_description":"wall"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
        let err = CadModificationCommand::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }

    #[test]
    fn test_move_requires_nonzero_delta() {
        assert!(CadModificationCommand::move_by("wall", 0.0, 0.0).is_err());
        assert!(CadModificationCommand::move_by("wall", 0.0, -5.0).is_ok());
    }

    #[test]
    fn test_move_rejects_non_finite_delta() {
        for (dx, dy) in [
            (f64::NAN, 0.0),
            (0.0, f64::NAN),
            (f64::INFINITY, 10.0),
            (10.0, f64::NEG_INFINITY),
        ] {
            let err = CadModificationCommand::move_by("wall", dx, dy).unwrap_err();
            assert!(matches!(err, Error::InvalidCommand(_)), "({}, {}) accepted", dx, dy);
        }

        let mut cmd = CadModificationCommand::move_by("wall", 10.0, 0.0).unwrap();
        cmd.delta_x = None;
        cmd.value = Some(f64::INFINITY);
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_move_value_fallback() {
        let cmd = CadModificationCommand::from_json(
            r#"{"action_type":"MOVE_WALL","target_description":"east wall","value":500}"#,
        )
        .unwrap();
        assert_eq!(cmd.translation(), (500.0, 0.0));
    }

    #[test]
    fn test_resize_requires_positive_value() {
        assert!(CadModificationCommand::resize("room", Axis::X, 0.0).is_err());
        assert!(CadModificationCommand::resize("room", Axis::X, -1.0).is_err());
        assert!(CadModificationCommand::resize("room", Axis::X, f64::NAN).is_err());
        assert!(CadModificationCommand::resize("room", Axis::X, f64::INFINITY).is_err());
        assert!(CadModificationCommand::resize("room", Axis::X, 1.0).is_ok());
    }

    #[test]
    fn test_action_serializes_as_wire_name() {
        let cmd = CadModificationCommand::delete("north wall").unwrap();
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""action_type":"DELETE_ITEM""#));
    }
}
