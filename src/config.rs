use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Selects the device transfers go through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub ordinal: usize,
}

/// What a flat setter does with elements left over once every slot is filled.
///
/// Supplying fewer elements than slots always fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Extra trailing elements are dropped.
    #[default]
    IgnoreTrailing,
    /// Extra trailing elements are an `FsetErr::Overflow`.
    Strict,
}

/// Configuration of a `FunctionSet`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub length_policy: LengthPolicy,
}

impl SetConfig {
    /// Parses a `SetConfig` from a JSON document, missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a `SetConfig` from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
