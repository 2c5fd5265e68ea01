//! Option structs for loading and transforming sessions
//!
//! Every struct has sensible defaults and can be deserialized from partial
//! JSON, so a config file only needs the keys it overrides.

use chrono::Duration;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::SessionError;
use crate::schema::DEFAULT_TIMESTAMP_COLUMN;
use crate::types::{DedupPolicy, Field};

/// Parse any option struct from JSON
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, SessionError> {
    Ok(serde_json::from_str(json)?)
}

fn default_reset_columns() -> Vec<Field> {
    Field::COUNTERS.to_vec()
}

/// How a file is turned into a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Column holding the row timestamps
    pub timestamp_column: String,
    /// Drop rows in which every field is empty
    pub drop_empty_rows: bool,
    /// Repair duplicate timestamps on load; `None` keeps them and warns
    pub deduplicate: Option<DedupPolicy>,
    /// Step used by the `offset` policy, in milliseconds
    pub dedup_offset_ms: i64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            drop_empty_rows: true,
            deduplicate: None,
            dedup_offset_ms: 100,
        }
    }
}

impl LoadOptions {
    pub fn dedup_offset(&self) -> Duration {
        Duration::milliseconds(self.dedup_offset_ms.max(1))
    }
}

/// Options for joining sessions end to end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcatOptions {
    /// Name of the result; defaults to the name of the first input
    pub name: Option<String>,
    /// Tag each row with the index of its source session
    pub add_concat_index: bool,
    /// Counters carried across session boundaries
    pub reset_columns: Vec<Field>,
}

impl Default for ConcatOptions {
    fn default() -> Self {
        ConcatOptions {
            name: None,
            add_concat_index: true,
            reset_columns: default_reset_columns(),
        }
    }
}

/// Options for cutting a session at date boundaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// Counters re-based to zero at each segment start
    pub reset_columns: Vec<Field>,
    /// Keep segments with no rows
    pub return_empty: bool,
    /// Append `_<n>` to each segment's name
    pub tag_name: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        SplitOptions {
            reset_columns: default_reset_columns(),
            return_empty: false,
            tag_name: true,
        }
    }
}

/// Meal segmentation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MealOptions {
    /// Pellets a group needs to count as a meal
    pub pellet_minimum: u32,
    /// Interpellet interval (minutes) at or above which a new meal starts
    pub intermeal_interval_minutes: f64,
}

impl Default for MealOptions {
    fn default() -> Self {
        MealOptions {
            pellet_minimum: 1,
            intermeal_interval_minutes: 1.0,
        }
    }
}
