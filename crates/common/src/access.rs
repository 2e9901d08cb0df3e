//! Access request contracts for the control point.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plates::ImageInput;

/// Direction requested by the guard at the control point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    #[serde(alias = "entrada")]
    Entry,
    #[serde(alias = "salida")]
    Exit,
}

impl AccessAction {
    /// Parse the action the way the guard clients send it.
    ///
    /// Only an explicit exit is treated as exit; anything else is an entry.
    pub fn from_request(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "salida" | "exit" => AccessAction::Exit,
            _ => AccessAction::Entry,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::Entry => "entry",
            AccessAction::Exit => "exit",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to validate a vehicle at the control point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Captured frame
    pub image: ImageInput,

    /// Requested direction
    pub action: AccessAction,

    /// Identifier of the guard operating the control point
    pub guard_id: String,
}
