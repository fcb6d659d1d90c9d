//! The on-disk pairs configuration.
//!
//! Timeout deltas are declared in wall-clock minutes, either as a single
//! value (legacy form) or split per swap direction. `set_timeout` rewrites
//! the file while preserving all other fields.

use crate::error::Error;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::io::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub base: String,
    pub quote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    pub fee: f64,
    #[serde(rename = "timeoutDelta")]
    pub timeout_delta: TimeoutDelta,
}

/// Timeout deltas of a pair, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutDelta {
    /// Legacy form: one value for every direction.
    Single(u64),
    Detailed {
        reverse: u64,
        #[serde(rename = "swapMinimal")]
        swap_minimal: u64,
        #[serde(rename = "swapMaximal")]
        swap_maximal: u64,
    },
}

impl TimeoutDelta {
    /// `(reverse, swap_minimal, swap_maximal)` in minutes.
    pub fn normalize(&self) -> (u64, u64, u64) {
        match *self {
            TimeoutDelta::Single(minutes) => (minutes, minutes, minutes),
            TimeoutDelta::Detailed {
                reverse,
                swap_minimal,
                swap_maximal,
            } => (reverse, swap_minimal, swap_maximal),
        }
    }
}

pub fn load(path: &Path) -> Result<Config, Error> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    toml::from_str(&raw).map_err(|e| Error::Config(format!("failed to parse config: {e}")))
}

/// Rewrite the configuration atomically: serialize into a temporary file in
/// the same directory, then rename over the original.
pub fn store(path: &Path, config: &Config) -> Result<(), Error> {
    let serialized = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::Config(format!("failed to create temp config: {e}")))?;

    temp.write_all(serialized.as_bytes())
        .map_err(|e| Error::Config(format!("failed to write temp config: {e}")))?;

    temp.persist(path)
        .map_err(|e| Error::Config(format!("failed to persist config: {e}")))?;

    Ok(())
}
