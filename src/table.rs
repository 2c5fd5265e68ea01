//! The canonical in-memory session
//!
//! A `SessionTable` owns a time-ordered index, the canonical device columns
//! recovered by schema repair, any columns that could not be matched, and the
//! metadata needed to undo temporal alignment. Transforms either mutate a
//! table through `&mut self` or hand back an independent clone; storage is
//! never shared between two tables.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::SessionError;
use crate::schema::{
    CellValue, ColumnRole, RawColumn, RawTable, SchemaRepair, CONCAT_INDEX_COLUMN,
};
use crate::types::{Alignment, ColumnKind, DedupPolicy, Field, OperatingMode, QualityFlag};

/// Header names consulted for the operating mode; later entries win
const MODE_COLUMNS: [&str; 5] = ["FR", "FR_Ratio", " FR_Ratio", "Mode", "Session_Type"];

/// Typed storage for one canonical column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Column {
    Counter(Vec<i64>),
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Column {
    /// Coerce raw cells to the storage class of `kind`.
    ///
    /// Counters are forward-filled over missing or unparseable cells (a
    /// leading gap reads as zero); numeric cells that do not parse become
    /// missing.
    pub fn from_cells(kind: ColumnKind, cells: &[CellValue]) -> Column {
        match kind {
            ColumnKind::Counter => {
                let mut last = 0_i64;
                Column::Counter(
                    cells
                        .iter()
                        .map(|c| {
                            if let Some(v) = c.as_f64() {
                                last = v.round() as i64;
                            }
                            last
                        })
                        .collect(),
                )
            }
            ColumnKind::Numeric => Column::Numeric(cells.iter().map(CellValue::as_f64).collect()),
            ColumnKind::Text => Column::Text(cells.iter().map(CellValue::as_text).collect()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Counter(v) => v.len(),
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_cells(&self) -> Vec<CellValue> {
        match self {
            Column::Counter(v) => v.iter().map(|&n| CellValue::from(n)).collect(),
            Column::Numeric(v) => v.iter().map(|&n| CellValue::from(n)).collect(),
            Column::Text(v) => v.iter().map(|s| CellValue::from(s.clone())).collect(),
        }
    }

    pub(crate) fn select(&self, positions: &[usize]) -> Column {
        match self {
            Column::Counter(v) => Column::Counter(positions.iter().map(|&i| v[i]).collect()),
            Column::Numeric(v) => Column::Numeric(positions.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(positions.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// One recording session in canonical form
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTable {
    pub(crate) name: Option<String>,
    pub(crate) source_path: Option<PathBuf>,
    pub(crate) index: Vec<NaiveDateTime>,
    pub(crate) columns: BTreeMap<Field, Column>,
    /// Unmatched input columns, kept verbatim
    pub(crate) foreign: Vec<RawColumn>,
    pub(crate) concat_index: Option<Vec<Option<usize>>>,
    pub(crate) foreign_columns: Vec<String>,
    pub(crate) missing_columns: Vec<Field>,
    pub(crate) alignment: Alignment,
    pub(crate) cumulative_offset: Duration,
}

/// Serializable overview of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub name: Option<String>,
    pub source_path: Option<PathBuf>,
    pub rows: usize,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub duration_minutes: Option<f64>,
    pub mode: String,
    pub alignment: Alignment,
    pub foreign_columns: Vec<String>,
    pub missing_columns: Vec<Field>,
    pub has_duplicates: bool,
    pub quality_flags: Vec<QualityFlag>,
}

impl SessionTable {
    /// Build a session from reader output. Runs schema repair and resets the
    /// alignment metadata. Duplicate timestamps are tolerated but logged.
    pub fn from_raw(raw: RawTable) -> SessionTable {
        let table = Self::assemble(raw);
        if table.has_duplicates() {
            log::warn!(
                "Session {} has duplicate timestamps; interpellet-interval concatenation \
                 correction will be skipped. Consider deduplicate_index()",
                table.display_name()
            );
        }
        table
    }

    /// Build a session and immediately repair duplicate timestamps with
    /// `policy`.
    pub fn from_raw_deduplicated(
        raw: RawTable,
        policy: DedupPolicy,
    ) -> Result<SessionTable, SessionError> {
        let mut table = Self::assemble(raw);
        table.deduplicate_index(policy)?;
        Ok(table)
    }

    fn assemble(mut raw: RawTable) -> SessionTable {
        let ragged = raw.conform();
        if !ragged.is_empty() {
            log::warn!(
                "Columns {:?} do not match the {} indexed rows; padded or truncated",
                ragged,
                raw.len()
            );
        }
        let names: Vec<&str> = raw.columns.iter().map(|c| c.name.as_str()).collect();
        let report = SchemaRepair::repair(&names);

        let mut columns = BTreeMap::new();
        let mut foreign = Vec::new();
        let mut concat_index = None;

        for (column, role) in raw.columns.into_iter().zip(report.roles) {
            match role {
                ColumnRole::Canonical(field) => {
                    columns.insert(field, Column::from_cells(field.kind(), &column.values));
                }
                ColumnRole::ConcatIndex => {
                    concat_index = Some(
                        column
                            .values
                            .iter()
                            .map(|c| {
                                c.as_f64()
                                    .filter(|v| *v >= 0.0 && v.fract() == 0.0)
                                    .map(|v| v as usize)
                            })
                            .collect(),
                    );
                }
                ColumnRole::Foreign => foreign.push(column),
            }
        }

        SessionTable {
            name: None,
            source_path: None,
            index: raw.timestamps,
            columns,
            foreign,
            concat_index,
            foreign_columns: report.foreign_columns,
            missing_columns: report.missing_columns,
            alignment: Alignment::Datetime,
            cumulative_offset: Duration::zero(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    // ---- Identity

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    // ---- Shape and time span

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of logged events (rows)
    pub fn events(&self) -> usize {
        self.len()
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.index.first().copied()
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.index.last().copied()
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_time()? - self.start_time()?)
    }

    // ---- Alignment state

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Net shift already applied to the index; `index - cumulative_offset`
    /// is the axis as loaded
    pub fn cumulative_offset(&self) -> Duration {
        self.cumulative_offset
    }

    /// The timestamps as originally loaded, regardless of current alignment
    pub fn original_index(&self) -> Vec<NaiveDateTime> {
        self.index.iter().map(|t| *t - self.cumulative_offset).collect()
    }

    // ---- Schema

    pub fn foreign_columns(&self) -> &[String] {
        &self.foreign_columns
    }

    pub fn missing_columns(&self) -> &[Field] {
        &self.missing_columns
    }

    pub fn has_column(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn column(&self, field: Field) -> Option<&Column> {
        self.columns.get(&field)
    }

    pub fn foreign_column(&self, name: &str) -> Option<&RawColumn> {
        self.foreign.iter().find(|c| c.name == name)
    }

    pub fn concat_index(&self) -> Option<&[Option<usize>]> {
        self.concat_index.as_deref()
    }

    /// Cumulative counter values, or `MissingColumn`
    pub fn counter(&self, field: Field) -> Result<&[i64], SessionError> {
        match self.columns.get(&field) {
            Some(Column::Counter(values)) => Ok(values),
            _ => Err(SessionError::MissingColumn(field)),
        }
    }

    pub fn numeric(&self, field: Field) -> Result<&[Option<f64>], SessionError> {
        match self.columns.get(&field) {
            Some(Column::Numeric(values)) => Ok(values),
            _ => Err(SessionError::MissingColumn(field)),
        }
    }

    pub fn text(&self, field: Field) -> Result<&[Option<String>], SessionError> {
        match self.columns.get(&field) {
            Some(Column::Text(values)) => Ok(values),
            _ => Err(SessionError::MissingColumn(field)),
        }
    }

    pub(crate) fn counter_mut(&mut self, field: Field) -> Option<&mut Vec<i64>> {
        match self.columns.get_mut(&field) {
            Some(Column::Counter(values)) => Some(values),
            _ => None,
        }
    }

    pub(crate) fn set_column(&mut self, field: Field, column: Column) {
        self.columns.insert(field, column);
        self.missing_columns.retain(|f| *f != field);
    }

    // ---- Row selection

    /// Independent copy holding only the rows at `positions`
    pub(crate) fn select_rows(&self, positions: &[usize]) -> SessionTable {
        SessionTable {
            name: self.name.clone(),
            source_path: self.source_path.clone(),
            index: positions.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(field, column)| (*field, column.select(positions)))
                .collect(),
            foreign: self
                .foreign
                .iter()
                .map(|c| RawColumn {
                    name: c.name.clone(),
                    values: positions.iter().map(|&i| c.values[i].clone()).collect(),
                })
                .collect(),
            concat_index: self
                .concat_index
                .as_ref()
                .map(|tags| positions.iter().map(|&i| tags[i]).collect()),
            foreign_columns: self.foreign_columns.clone(),
            missing_columns: self.missing_columns.clone(),
            alignment: self.alignment,
            cumulative_offset: self.cumulative_offset,
        }
    }

    /// Positions of rows whose timestamp satisfies `keep`
    pub(crate) fn positions_where<F>(&self, mut keep: F) -> Vec<usize>
    where
        F: FnMut(&NaiveDateTime) -> bool,
    {
        self.index
            .iter()
            .enumerate()
            .filter(|(_, t)| keep(t))
            .map(|(i, _)| i)
            .collect()
    }

    // ---- Diagnostics

    /// Whether any timestamp appears more than once
    pub fn has_duplicates(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.index.len());
        !self.index.iter().all(|t| seen.insert(*t))
    }

    pub fn quality_flags(&self) -> Vec<QualityFlag> {
        let mut flags = Vec::new();
        if self.is_empty() {
            flags.push(QualityFlag::Empty);
        }
        if self.has_duplicates() {
            flags.push(QualityFlag::DuplicateTimestamps);
        }
        if !self.foreign_columns.is_empty() {
            flags.push(QualityFlag::ForeignColumns);
        }
        if !self.missing_columns.is_empty() {
            flags.push(QualityFlag::MissingColumns);
        }
        flags
    }

    /// Best-effort operating mode from whichever mode column is present
    pub fn mode(&self) -> OperatingMode {
        let mut cells: Option<Vec<CellValue>> = None;
        for name in MODE_COLUMNS {
            if name == Field::SessionType.header() {
                if let Some(column) = self.columns.get(&Field::SessionType) {
                    cells = Some(column.to_cells());
                }
            } else if let Some(column) = self.foreign_column(name) {
                cells = Some(column.values.clone());
            }
        }

        let cells = match cells {
            Some(cells) if !cells.is_empty() => cells,
            _ => return OperatingMode::Unknown,
        };

        let integers: Option<Vec<i64>> = cells
            .iter()
            .map(|c| c.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
            .collect();
        if let Some(values) = integers {
            let unique: HashSet<i64> = values.iter().copied().collect();
            return if unique.len() == 1 {
                OperatingMode::FixedRatio(values[0])
            } else {
                OperatingMode::ProgressiveRatio
            };
        }

        match cells.iter().find_map(CellValue::as_text) {
            Some(first) if first.contains("PR") => OperatingMode::ProgressiveRatio,
            Some(first) => OperatingMode::Named(first),
            None => OperatingMode::Unknown,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            name: self.name.clone(),
            source_path: self.source_path.clone(),
            rows: self.len(),
            start_time: self.start_time(),
            end_time: self.end_time(),
            duration_minutes: self
                .duration()
                .map(|d| d.num_milliseconds() as f64 / 60_000.0),
            mode: self.mode().to_string(),
            alignment: self.alignment,
            foreign_columns: self.foreign_columns.clone(),
            missing_columns: self.missing_columns.clone(),
            has_duplicates: self.has_duplicates(),
            quality_flags: self.quality_flags(),
        }
    }

    /// Export back to the reader contract, with canonical headers
    pub fn to_raw(&self) -> RawTable {
        let mut raw = RawTable::new(self.index.clone());
        for (field, column) in &self.columns {
            raw.push_column(field.header(), column.to_cells());
        }
        for column in &self.foreign {
            raw.push_column(&column.name, column.values.clone());
        }
        if let Some(tags) = &self.concat_index {
            raw.push_column(
                CONCAT_INDEX_COLUMN,
                tags.iter().map(|t| CellValue::from(t.map(|v| v as i64))).collect(),
            );
        }
        raw
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    pub fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    /// Session with the three counters and an active side, one row per minute
    /// starting at `start`
    pub fn session(
        start: NaiveDateTime,
        pellets: &[i64],
        left: &[i64],
        right: &[i64],
    ) -> SessionTable {
        let index: Vec<NaiveDateTime> = (0..pellets.len())
            .map(|i| start + Duration::minutes(i as i64))
            .collect();
        SessionTable::from_raw(
            RawTable::new(index)
                .with_column("Pellet_Count", pellets.iter().copied())
                .with_column("Left_Poke_Count", left.iter().copied())
                .with_column("Right_Poke_Count", right.iter().copied())
                .with_column("Active_Poke", std::iter::repeat("Left").take(pellets.len())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::types::EventKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_construction_repairs_schema() {
        let raw = RawTable::new(vec![at(1, 10, 0, 0), at(1, 10, 1, 0)])
            .with_column(" Pellet_Count", vec![0_i64, 1])
            .with_column("Left_Poke_Count", vec![1_i64, 1])
            .with_column("Temperature", vec![20.5, 21.0]);
        let table = SessionTable::from_raw(raw);

        assert_eq!(table.counter(Field::PelletCount).unwrap(), &[0, 1]);
        assert_eq!(table.foreign_columns(), &["Temperature".to_string()]);
        assert_eq!(table.missing_columns(), &[Field::RightPokeCount]);
        assert_eq!(table.alignment(), Alignment::Datetime);
        assert_eq!(table.cumulative_offset(), Duration::zero());
        assert!(matches!(
            table.counter(Field::RightPokeCount),
            Err(SessionError::MissingColumn(Field::RightPokeCount))
        ));
    }

    #[test]
    fn test_retrieval_time_is_coerced() {
        let raw = RawTable::new(vec![at(1, 10, 0, 0), at(1, 10, 1, 0), at(1, 10, 2, 0)])
            .with_column(
                "Retrieval_Time",
                vec![
                    CellValue::Number(1.5),
                    CellValue::Text("Timed_out".into()),
                    CellValue::Text("2.25".into()),
                ],
            );
        let table = SessionTable::from_raw(raw);
        assert_eq!(
            table.numeric(Field::RetrievalTime).unwrap(),
            &[Some(1.5), None, Some(2.25)]
        );
    }

    #[test]
    fn test_counter_gaps_are_forward_filled() {
        let raw = RawTable::new(vec![at(1, 10, 0, 0), at(1, 10, 1, 0), at(1, 10, 2, 0)])
            .with_column(
                "Pellet_Count",
                vec![CellValue::Missing, CellValue::Number(2.0), CellValue::Missing],
            );
        let table = SessionTable::from_raw(raw);
        assert_eq!(table.counter(Field::PelletCount).unwrap(), &[0, 2, 2]);
    }

    #[test]
    fn test_time_span() {
        let table = session(at(1, 10, 0, 0), &[0, 1, 2], &[0, 0, 0], &[0, 0, 0]);
        assert_eq!(table.start_time(), Some(at(1, 10, 0, 0)));
        assert_eq!(table.end_time(), Some(at(1, 10, 2, 0)));
        assert_eq!(table.duration(), Some(Duration::minutes(2)));
        assert_eq!(table.events(), 3);
    }

    #[test]
    fn test_mode_detection() {
        let index = vec![at(1, 10, 0, 0), at(1, 10, 1, 0)];
        let fr = SessionTable::from_raw(RawTable::new(index.clone()).with_column("FR", vec![3_i64, 3]));
        assert_eq!(fr.mode(), OperatingMode::FixedRatio(3));

        let pr = SessionTable::from_raw(RawTable::new(index.clone()).with_column("FR", vec![1_i64, 2]));
        assert_eq!(pr.mode(), OperatingMode::ProgressiveRatio);

        let named = SessionTable::from_raw(
            RawTable::new(index.clone()).with_column("Session_Type", vec!["Bandit", "Bandit"]),
        );
        assert_eq!(named.mode(), OperatingMode::Named("Bandit".to_string()));

        let progressive = SessionTable::from_raw(
            RawTable::new(index.clone()).with_column("Session_Type", vec!["PR1", "PR1"]),
        );
        assert_eq!(progressive.mode(), OperatingMode::ProgressiveRatio);

        let unknown = SessionTable::from_raw(RawTable::new(index));
        assert_eq!(unknown.mode(), OperatingMode::Unknown);
    }

    #[test]
    fn test_quality_flags() {
        let raw = RawTable::new(vec![at(1, 10, 0, 0), at(1, 10, 0, 0)])
            .with_column("Pellet_Count", vec![0_i64, 1]);
        let table = SessionTable::from_raw(raw);
        assert_eq!(
            table.quality_flags(),
            vec![QualityFlag::DuplicateTimestamps, QualityFlag::MissingColumns]
        );
    }

    #[test]
    fn test_to_raw_round_trips_through_construction() {
        let table = session(at(1, 10, 0, 0), &[0, 1, 1], &[1, 1, 2], &[0, 0, 0])
            .with_name("mouse1");
        let rebuilt = SessionTable::from_raw(table.to_raw()).with_name("mouse1");
        assert_eq!(rebuilt, table);
    }

    #[test]
    fn test_ragged_columns_are_conformed() {
        let raw = RawTable {
            timestamps: vec![at(1, 10, 0, 0), at(1, 10, 1, 0)],
            columns: vec![
                RawColumn {
                    name: "Pellet_Count".to_string(),
                    values: vec![CellValue::Number(0.0)],
                },
                RawColumn {
                    name: "Left_Poke_Count".to_string(),
                    values: vec![
                        CellValue::Number(0.0),
                        CellValue::Number(1.0),
                        CellValue::Number(2.0),
                    ],
                },
                RawColumn {
                    name: "Right_Poke_Count".to_string(),
                    values: vec![CellValue::Number(0.0)],
                },
            ],
        };
        let table = SessionTable::from_raw(raw);

        assert_eq!(table.counter(Field::PelletCount).unwrap(), &[0, 0]);
        assert_eq!(table.counter(Field::LeftPokeCount).unwrap(), &[0, 1]);
        assert_eq!(table.event_type(1, true).unwrap(), EventKind::Left);
    }

    #[test]
    fn test_fractional_concat_tags_read_as_missing() {
        let raw = RawTable::new(vec![at(1, 10, 0, 0), at(1, 10, 1, 0), at(1, 10, 2, 0)])
            .with_column("Pellet_Count", vec![0_i64, 1, 2])
            .with_column("Concat_#", vec![0.0, 1.5, 1.0]);
        let table = SessionTable::from_raw(raw);
        assert_eq!(table.concat_index().unwrap(), &[Some(0), None, Some(1)]);
    }

    #[test]
    fn test_select_rows_is_independent() {
        let table = session(at(1, 10, 0, 0), &[0, 1, 2], &[0, 0, 0], &[0, 0, 0]);
        let mut subset = table.select_rows(&[1, 2]);
        subset.counter_mut(Field::PelletCount).unwrap()[0] = 99;
        assert_eq!(table.counter(Field::PelletCount).unwrap(), &[0, 1, 2]);
        assert_eq!(subset.counter(Field::PelletCount).unwrap(), &[99, 2]);
    }
}
