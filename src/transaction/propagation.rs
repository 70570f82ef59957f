//! Propagation modes.
//!
//! A propagation mode states how a unit of work relates to a transaction
//! already running on the same backend:
//! - `Required`: join it, or start one
//! - `RequiresNew`: always start an independent one
//! - `Mandatory`: join it, fail without one
//! - `Supports`: join it if present, otherwise run without one
//! - `NotSupported`: run outside it on a fresh session
//! - `Never`: fail if one is running

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PropagationMode {
    Mandatory,
    Never,
    NotSupported,
    #[default]
    Required,
    RequiresNew,
    Supports,
}

impl PropagationMode {
    pub const ALL: [PropagationMode; 6] = [
        PropagationMode::Mandatory,
        PropagationMode::Never,
        PropagationMode::NotSupported,
        PropagationMode::Required,
        PropagationMode::RequiresNew,
        PropagationMode::Supports,
    ];

    /// Whether this mode can start a native transaction.
    pub fn may_begin(&self) -> bool {
        matches!(self, PropagationMode::Required | PropagationMode::RequiresNew)
    }
}

impl fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropagationMode::Mandatory => "MANDATORY",
            PropagationMode::Never => "NEVER",
            PropagationMode::NotSupported => "NOT_SUPPORTED",
            PropagationMode::Required => "REQUIRED",
            PropagationMode::RequiresNew => "REQUIRES_NEW",
            PropagationMode::Supports => "SUPPORTS",
        };
        f.write_str(name)
    }
}

/// Accepts `REQUIRES_NEW`, `requires-new` and `RequiresNew` spellings.
impl FromStr for PropagationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_uppercase();
        match normalized.as_str() {
            "MANDATORY" => Ok(PropagationMode::Mandatory),
            "NEVER" => Ok(PropagationMode::Never),
            "NOTSUPPORTED" => Ok(PropagationMode::NotSupported),
            "REQUIRED" => Ok(PropagationMode::Required),
            "REQUIRESNEW" => Ok(PropagationMode::RequiresNew),
            "SUPPORTS" => Ok(PropagationMode::Supports),
            _ => Err(format!("unknown propagation mode: {}", s)),
        }
    }
}

impl TryFrom<String> for PropagationMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PropagationMode> for String {
    fn from(mode: PropagationMode) -> Self {
        mode.to_string()
    }
}
