// ⚙️ Config - Run settings, JSON file with every field optional

use crate::classifier::DEFAULT_WINDOW;
use crate::deduplication::DuplicatePolicy;
use crate::entities::MIN_STEM_LEN;
use crate::ordering::OrderingStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the history store lives
    pub store_path: PathBuf,

    /// Extra `{name: code|null}` entries on top of the built-in seed table
    pub seed_path: Option<PathBuf>,

    /// Max characters between the words of one classifier rule
    pub proximity_window: usize,

    /// Stem floor for name patterns
    pub min_stem_len: usize,

    pub ordering: OrderingStrategy,

    pub duplicate_events: DuplicatePolicy,

    /// Read timestamps without an offset as UTC instead of skipping the item
    pub assume_utc_for_naive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_path: PathBuf::from("status.json"),
            seed_path: None,
            proximity_window: DEFAULT_WINDOW,
            min_stem_len: MIN_STEM_LEN,
            ordering: OrderingStrategy::default(),
            duplicate_events: DuplicatePolicy::default(),
            assume_utc_for_naive: true,
        }
    }
}

impl Config {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// File config when a path is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
