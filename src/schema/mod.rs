//! Raw input contract and column reconciliation
//!
//! A `RawTable` is what a file reader hands to the core: a timestamp index
//! plus loosely-named columns. `SchemaRepair` maps those names onto the
//! canonical `Field` set once, at construction time.

mod raw_table;
mod repair;

pub use raw_table::*;
pub use repair::*;
