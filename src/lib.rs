//! fedframe - Session tables for FED3 pellet-dispenser logs
//!
//! A FED3 device logs one row per event with running pellet and poke totals.
//! fedframe turns those logs into a canonical `SessionTable` and derives
//! everything else from it: schema repair → signal derivation →
//! deduplication → temporal alignment → concatenation / splitting →
//! named metrics.
//!
//! ## Modules
//!
//! - **Table**: schema-repaired session with alignment bookkeeping
//! - **Signals**: event inference, binary/cumulative pellets and pokes, IPI, meals
//! - **Combinator**: concatenation, splitting and cropping with counter re-basing
//! - **Metrics**: named, optionally binned per-session metrics

pub mod alignment;
pub mod combinator;
pub mod config;
pub mod dedup;
pub mod error;
pub mod lightcycle;
pub mod metrics;
pub mod reader;
pub mod schema;
pub mod series;
pub mod signals;
pub mod table;
pub mod types;

pub use alignment::{align, align_in_place, determine_alignment, screen_mixed_alignment, zero_date};
pub use combinator::{can_concat, concat, split, timecrop, ToTimestamp};
pub use config::{ConcatOptions, LoadOptions, MealOptions, SplitOptions};
pub use error::SessionError;
pub use lightcycle::LightCycle;
pub use metrics::{get_metric, list_metrics, Aggregator, Metric};
pub use reader::{load, write_csv};
pub use series::Series;
pub use table::{Column, SessionSummary, SessionTable};
pub use types::{
    Alignment, DedupPolicy, EventKind, Field, MixedAlignmentPolicy, OperatingMode, PokeKind,
    QualityFlag, SharedAlignment,
};

// Schema exports
pub use schema::{CellValue, RawColumn, RawTable, SchemaRepair};

/// fedframe version reported by the CLI
pub const FEDFRAME_VERSION: &str = env!("CARGO_PKG_VERSION");
