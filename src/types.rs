//! Core enumerations shared across the session pipeline
//!
//! Every string-keyed option accepted by the public API is parsed into one of
//! these types up front, so invalid input is rejected before any table is
//! touched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

/// Canonical device columns recognized by schema repair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    DeviceNumber,
    BatteryVoltage,
    MotorTurns,
    SessionType,
    Event,
    ActivePoke,
    LeftPokeCount,
    RightPokeCount,
    PelletCount,
    RetrievalTime,
}

/// Storage class of a canonical column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Monotonic non-decreasing integer counter
    Counter,
    /// Free numeric telemetry
    Numeric,
    /// Categorical label
    Text,
}

impl Field {
    /// All canonical fields, in device header order
    pub const ALL: [Field; 10] = [
        Field::DeviceNumber,
        Field::BatteryVoltage,
        Field::MotorTurns,
        Field::SessionType,
        Field::Event,
        Field::ActivePoke,
        Field::LeftPokeCount,
        Field::RightPokeCount,
        Field::PelletCount,
        Field::RetrievalTime,
    ];

    /// Fields whose absence is reported in `missing_columns`
    pub const REQUIRED: [Field; 3] = [
        Field::PelletCount,
        Field::LeftPokeCount,
        Field::RightPokeCount,
    ];

    /// Monotonic counters renormalized by concat/split/crop
    pub const COUNTERS: [Field; 3] = [
        Field::PelletCount,
        Field::LeftPokeCount,
        Field::RightPokeCount,
    ];

    /// Header spelling written by the device
    pub fn header(&self) -> &'static str {
        match self {
            Field::DeviceNumber => "Device_Number",
            Field::BatteryVoltage => "Battery_Voltage",
            Field::MotorTurns => "Motor_Turns",
            Field::SessionType => "Session_Type",
            Field::Event => "Event",
            Field::ActivePoke => "Active_Poke",
            Field::LeftPokeCount => "Left_Poke_Count",
            Field::RightPokeCount => "Right_Poke_Count",
            Field::PelletCount => "Pellet_Count",
            Field::RetrievalTime => "Retrieval_Time",
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Field::PelletCount | Field::LeftPokeCount | Field::RightPokeCount => {
                ColumnKind::Counter
            }
            Field::BatteryVoltage | Field::MotorTurns | Field::RetrievalTime => {
                ColumnKind::Numeric
            }
            Field::DeviceNumber | Field::SessionType | Field::Event | Field::ActivePoke => {
                ColumnKind::Text
            }
        }
    }

    pub fn is_counter(&self) -> bool {
        self.kind() == ColumnKind::Counter
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Coordinate system of a session's timestamp axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Timestamps as recorded
    #[default]
    Datetime,
    /// Start date moved to the reference date, time of day preserved
    Time,
    /// First timestamp moved onto the reference instant
    Elapsed,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Datetime => "datetime",
            Alignment::Time => "time",
            Alignment::Elapsed => "elapsed",
        }
    }
}

impl FromStr for Alignment {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "datetime" => Ok(Alignment::Datetime),
            "time" => Ok(Alignment::Time),
            "elapsed" => Ok(Alignment::Elapsed),
            other => Err(SessionError::InvalidAlignmentMode(other.to_string())),
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alignment shared by a collection of sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedAlignment {
    Uniform(Alignment),
    Mixed,
}

impl SharedAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharedAlignment::Uniform(alignment) => alignment.as_str(),
            SharedAlignment::Mixed => "mixed",
        }
    }
}

/// How to react when a collection mixes alignments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedAlignmentPolicy {
    #[default]
    Raise,
    Warn,
    Ignore,
}

impl FromStr for MixedAlignmentPolicy {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raise" => Ok(MixedAlignmentPolicy::Raise),
            "warn" => Ok(MixedAlignmentPolicy::Warn),
            "ignore" => Ok(MixedAlignmentPolicy::Ignore),
            other => Err(SessionError::InvalidMixedAlignmentOption(other.to_string())),
        }
    }
}

/// Which poke signal to derive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PokeKind {
    Left,
    Right,
    #[default]
    Any,
    /// Poke on the currently active side
    Correct,
    /// Poke on the inactive side
    Error,
}

impl FromStr for PokeKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(PokeKind::Left),
            "right" => Ok(PokeKind::Right),
            "any" => Ok(PokeKind::Any),
            "correct" => Ok(PokeKind::Correct),
            "error" => Ok(PokeKind::Error),
            _ => Err(SessionError::InvalidPokeKind(s.to_string())),
        }
    }
}

/// Event recorded (or inferred) for a single row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pellet,
    Left,
    Right,
    /// Poke with the side deliberately not reported
    Poke,
    /// Any other device label (e.g. "LeftShort", "LeftWithPellet")
    #[serde(untagged)]
    Other(String),
}

impl EventKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "pellet" => EventKind::Pellet,
            "left" => EventKind::Left,
            "right" => EventKind::Right,
            "poke" => EventKind::Poke,
            _ => EventKind::Other(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Pellet => "Pellet",
            EventKind::Left => "Left",
            EventKind::Right => "Right",
            EventKind::Poke => "Poke",
            EventKind::Other(label) => label.as_str(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort label for the device's operating mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Fixed ratio schedule (FR1, FR3, ...)
    FixedRatio(i64),
    /// Progressive ratio schedule
    ProgressiveRatio,
    /// Any other label written by the device
    Named(String),
    Unknown,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::FixedRatio(n) => write!(f, "FR{}", n),
            OperatingMode::ProgressiveRatio => f.write_str("PR"),
            OperatingMode::Named(name) => f.write_str(name),
            OperatingMode::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Repair policy for repeated timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    KeepFirst,
    KeepLast,
    /// Drop every row of every duplicate group
    Remove,
    /// Nudge repeats forward until the index is unique
    Offset,
    /// Place repeats linearly between their neighbors
    Interpolate,
}

impl FromStr for DedupPolicy {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_first" => Ok(DedupPolicy::KeepFirst),
            "keep_last" => Ok(DedupPolicy::KeepLast),
            "remove" => Ok(DedupPolicy::Remove),
            "offset" => Ok(DedupPolicy::Offset),
            "interpolate" => Ok(DedupPolicy::Interpolate),
            other => Err(SessionError::InvalidDeduplicationPolicy(other.to_string())),
        }
    }
}

/// Advisory conditions detected on a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// The timestamp index repeats
    DuplicateTimestamps,
    /// Some input columns did not match the canonical schema
    ForeignColumns,
    /// Some required counters are absent
    MissingColumns,
    /// The session has no rows
    Empty,
}
