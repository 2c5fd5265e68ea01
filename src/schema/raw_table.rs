//! Tabular input as produced by a file reader
//!
//! Cells are kept loosely typed here; typing happens when the table is
//! promoted to a `SessionTable`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Default name of the device's timestamp column
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "MM:DD:YYYY hh:mm:ss";

/// Column tagging each row with the index of the session it came from after
/// concatenation
pub const CONCAT_INDEX_COLUMN: &str = "Concat_#";

const DATETIME_FORMATS: [&str; 7] = [
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m:%d:%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a timestamp in any of the layouts FED3 files and users commonly
/// write. Date-only strings resolve to midnight.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, SessionError> {
    let trimmed = s.trim();
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.and_time(chrono::NaiveTime::default()));
        }
    }
    Err(SessionError::DateParse(format!(
        "Unrecognized timestamp \"{}\"",
        trimmed
    )))
}

/// A single loosely-typed cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl CellValue {
    /// Interpret a raw field: empty is missing, numeric-looking is a number
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return CellValue::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(trimmed.to_string()),
        }
    }

    /// Numeric view; text is parsed if it looks like a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Textual view; numbers are rendered without a trailing `.0` when integral
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Number(v as f64)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Missing)
    }
}

/// A named column of raw cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<CellValue>,
}

/// Rows of named fields keyed by a timestamp index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Self {
        RawTable {
            timestamps,
            columns: Vec::new(),
        }
    }

    /// Builder-style column insertion. Short columns are padded with missing
    /// cells, long ones truncated.
    pub fn with_column<V, I>(mut self, name: &str, values: I) -> Self
    where
        V: Into<CellValue>,
        I: IntoIterator<Item = V>,
    {
        self.push_column(name, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn push_column(&mut self, name: &str, mut values: Vec<CellValue>) {
        values.resize(self.timestamps.len(), CellValue::Missing);
        self.columns.push(RawColumn {
            name: name.to_string(),
            values,
        });
    }

    /// Pad or truncate every column to the index length. Returns the names
    /// of the columns that had to be resized.
    pub fn conform(&mut self) -> Vec<String> {
        let rows = self.timestamps.len();
        let mut ragged = Vec::new();
        for column in &mut self.columns {
            if column.values.len() != rows {
                column.values.resize(rows, CellValue::Missing);
                ragged.push(column.name.clone());
            }
        }
        ragged
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Remove rows in which every column is missing
    pub fn drop_empty_rows(&mut self) {
        if self.columns.is_empty() {
            return;
        }
        let keep: Vec<bool> = (0..self.len())
            .map(|row| {
                self.columns
                    .iter()
                    .any(|c| c.values.get(row).is_some_and(|v| !v.is_missing()))
            })
            .collect();
        let mut flags = keep.iter();
        self.timestamps.retain(|_| *flags.next().unwrap_or(&true));
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.values.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// Stack tables vertically. Columns are matched by name; a table lacking
    /// a column contributes missing cells for it.
    pub fn concat(tables: Vec<RawTable>) -> RawTable {
        let mut names: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !names.contains(&column.name) {
                    names.push(column.name.clone());
                }
            }
        }

        let mut out = RawTable::default();
        let mut stacked: Vec<Vec<CellValue>> = vec![Vec::new(); names.len()];
        for table in tables {
            let n = table.len();
            for (name, cells) in names.iter().zip(stacked.iter_mut()) {
                match table.column(name) {
                    Some(column) => cells.extend(column.values.iter().cloned()),
                    None => cells.extend(std::iter::repeat(CellValue::Missing).take(n)),
                }
            }
            out.timestamps.extend(table.timestamps);
        }
        out.columns = names
            .into_iter()
            .zip(stacked)
            .map(|(name, values)| RawColumn { name, values })
            .collect();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 21)
            .unwrap()
            .and_hms_opt(14, 33, 2)
            .unwrap();
        assert_eq!(parse_timestamp("01/21/2021 14:33:02").unwrap(), expected);
        assert_eq!(parse_timestamp("2021-01-21 14:33:02").unwrap(), expected);
        assert_eq!(parse_timestamp("2021-01-21T14:33:02").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2021-01-21").unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 21).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(SessionError::DateParse(_))
        ));
    }

    #[test]
    fn test_cell_parsing() {
        assert_eq!(CellValue::parse(" 3 "), CellValue::Number(3.0));
        assert_eq!(CellValue::parse(""), CellValue::Missing);
        assert_eq!(CellValue::parse("Left"), CellValue::Text("Left".to_string()));
        assert_eq!(CellValue::Number(2.0).as_text().as_deref(), Some("2"));
        assert_eq!(CellValue::Text("4.5".into()).as_f64(), Some(4.5));
    }

    #[test]
    fn test_drop_empty_rows() {
        let t0 = parse_timestamp("2021-01-01 00:00:00").unwrap();
        let t1 = parse_timestamp("2021-01-01 00:01:00").unwrap();
        let mut table = RawTable::new(vec![t0, t1])
            .with_column("A", vec![CellValue::Missing, CellValue::Number(1.0)])
            .with_column("B", vec![CellValue::Missing, CellValue::Missing]);
        table.drop_empty_rows();
        assert_eq!(table.timestamps, vec![t1]);
        assert_eq!(table.columns[0].values, vec![CellValue::Number(1.0)]);
    }

    #[test]
    fn test_concat_fills_missing_columns() {
        let t0 = parse_timestamp("2021-01-01 00:00:00").unwrap();
        let t1 = parse_timestamp("2021-01-02 00:00:00").unwrap();
        let a = RawTable::new(vec![t0]).with_column("A", vec![1.0]);
        let b = RawTable::new(vec![t1]).with_column("B", vec![2.0]);
        let joined = RawTable::concat(vec![a, b]);
        assert_eq!(joined.len(), 2);
        assert_eq!(
            joined.column("A").unwrap().values,
            vec![CellValue::Number(1.0), CellValue::Missing]
        );
        assert_eq!(
            joined.column("B").unwrap().values,
            vec![CellValue::Missing, CellValue::Number(2.0)]
        );
    }
}
