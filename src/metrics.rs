//! Named per-session metrics
//!
//! Each metric produces a condensed time series from a session. With a bin
//! width, the series is grouped into fixed bins anchored at its first
//! timestamp and reduced with the metric's aggregator; empty bins between
//! populated ones are kept.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;
use crate::series::Series;
use crate::table::SessionTable;
use crate::types::{Field, PokeKind};

/// How values falling in one bin are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Total; an empty bin sums to zero
    Sum,
    Max,
    Mean,
    /// Last defined value
    Last,
}

impl Aggregator {
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregator::Sum => Some(values.iter().sum()),
            Aggregator::Max => values.iter().copied().reduce(f64::max),
            Aggregator::Mean if values.is_empty() => None,
            Aggregator::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregator::Last => values.last().copied(),
        }
    }
}

/// Every metric known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    BinaryPellets,
    CumulativePellets,
    Pellets,
    BinaryPokes,
    CumulativePokes,
    Pokes,
    BinaryLeftPokes,
    BinaryRightPokes,
    CumulativeLeftPokes,
    CumulativeRightPokes,
    CumulativeLeftPercent,
    CumulativeRightPercent,
    LeftPokes,
    RightPokes,
    BinaryCorrectPokes,
    BinaryErrorPokes,
    CumulativeCorrectPokes,
    CumulativeErrorPokes,
    CumulativeCorrectPercent,
    CumulativeErrorPercent,
    CorrectPokes,
    ErrorPokes,
    Battery,
    Ipi,
    Motor,
    Rt,
}

impl Metric {
    pub const ALL: [Metric; 26] = [
        Metric::BinaryPellets,
        Metric::CumulativePellets,
        Metric::Pellets,
        Metric::BinaryPokes,
        Metric::CumulativePokes,
        Metric::Pokes,
        Metric::BinaryLeftPokes,
        Metric::BinaryRightPokes,
        Metric::CumulativeLeftPokes,
        Metric::CumulativeRightPokes,
        Metric::CumulativeLeftPercent,
        Metric::CumulativeRightPercent,
        Metric::LeftPokes,
        Metric::RightPokes,
        Metric::BinaryCorrectPokes,
        Metric::BinaryErrorPokes,
        Metric::CumulativeCorrectPokes,
        Metric::CumulativeErrorPokes,
        Metric::CumulativeCorrectPercent,
        Metric::CumulativeErrorPercent,
        Metric::CorrectPokes,
        Metric::ErrorPokes,
        Metric::Battery,
        Metric::Ipi,
        Metric::Motor,
        Metric::Rt,
    ];

    /// Registry key
    pub fn key(&self) -> &'static str {
        match self {
            Metric::BinaryPellets => "binary_pellets",
            Metric::CumulativePellets => "cumulative_pellets",
            Metric::Pellets => "pellets",
            Metric::BinaryPokes => "binary_pokes",
            Metric::CumulativePokes => "cumulative_pokes",
            Metric::Pokes => "pokes",
            Metric::BinaryLeftPokes => "binary_left_pokes",
            Metric::BinaryRightPokes => "binary_right_pokes",
            Metric::CumulativeLeftPokes => "cumulative_left_pokes",
            Metric::CumulativeRightPokes => "cumulative_right_pokes",
            Metric::CumulativeLeftPercent => "cumulative_left_percent",
            Metric::CumulativeRightPercent => "cumulative_right_percent",
            Metric::LeftPokes => "left_pokes",
            Metric::RightPokes => "right_pokes",
            Metric::BinaryCorrectPokes => "binary_correct_pokes",
            Metric::BinaryErrorPokes => "binary_error_pokes",
            Metric::CumulativeCorrectPokes => "cumulative_correct_pokes",
            Metric::CumulativeErrorPokes => "cumulative_error_pokes",
            Metric::CumulativeCorrectPercent => "cumulative_correct_percent",
            Metric::CumulativeErrorPercent => "cumulative_error_percent",
            Metric::CorrectPokes => "correct_pokes",
            Metric::ErrorPokes => "error_pokes",
            Metric::Battery => "battery",
            Metric::Ipi => "ipi",
            Metric::Motor => "motor",
            Metric::Rt => "rt",
        }
    }

    /// Axis label
    pub fn nice_name(&self) -> &'static str {
        match self {
            Metric::BinaryPellets | Metric::CumulativePellets | Metric::Pellets => "Pellets",
            Metric::BinaryPokes | Metric::CumulativePokes | Metric::Pokes => "Pokes",
            Metric::BinaryLeftPokes | Metric::CumulativeLeftPokes | Metric::LeftPokes => {
                "Left Pokes"
            }
            Metric::BinaryRightPokes | Metric::CumulativeRightPokes | Metric::RightPokes => {
                "Right Pokes"
            }
            Metric::CumulativeLeftPercent => "Left Pokes (%)",
            Metric::CumulativeRightPercent => "Right Pokes (%)",
            Metric::BinaryCorrectPokes | Metric::CumulativeCorrectPokes | Metric::CorrectPokes => {
                "Correct Pokes"
            }
            Metric::BinaryErrorPokes | Metric::CumulativeErrorPokes | Metric::ErrorPokes => {
                "Error Pokes"
            }
            Metric::CumulativeCorrectPercent => "Correct Pokes (%)",
            Metric::CumulativeErrorPercent => "Error Pokes (%)",
            Metric::Battery => "Battery Life (V)",
            Metric::Ipi => "Interpellet Intervals",
            Metric::Motor => "Motor Turns",
            Metric::Rt => "Retrieval Time (s)",
        }
    }

    /// The concrete metric an undecorated name stands for: cumulative when
    /// unbinned, binary when binned
    pub fn resolve(&self, binned: bool) -> Metric {
        let pick = |cumulative, binary| if binned { binary } else { cumulative };
        match self {
            Metric::Pellets => pick(Metric::CumulativePellets, Metric::BinaryPellets),
            Metric::Pokes => pick(Metric::CumulativePokes, Metric::BinaryPokes),
            Metric::LeftPokes => pick(Metric::CumulativeLeftPokes, Metric::BinaryLeftPokes),
            Metric::RightPokes => pick(Metric::CumulativeRightPokes, Metric::BinaryRightPokes),
            Metric::CorrectPokes => {
                pick(Metric::CumulativeCorrectPokes, Metric::BinaryCorrectPokes)
            }
            Metric::ErrorPokes => pick(Metric::CumulativeErrorPokes, Metric::BinaryErrorPokes),
            other => *other,
        }
    }

    pub fn aggregator(&self) -> Aggregator {
        match self {
            Metric::BinaryPellets
            | Metric::BinaryPokes
            | Metric::BinaryLeftPokes
            | Metric::BinaryRightPokes
            | Metric::BinaryCorrectPokes
            | Metric::BinaryErrorPokes
            | Metric::Pellets
            | Metric::Pokes
            | Metric::LeftPokes
            | Metric::RightPokes
            | Metric::CorrectPokes
            | Metric::ErrorPokes => Aggregator::Sum,
            Metric::CumulativePellets
            | Metric::CumulativePokes
            | Metric::CumulativeLeftPokes
            | Metric::CumulativeRightPokes
            | Metric::CumulativeCorrectPokes
            | Metric::CumulativeErrorPokes => Aggregator::Max,
            Metric::CumulativeLeftPercent
            | Metric::CumulativeRightPercent
            | Metric::CumulativeCorrectPercent
            | Metric::CumulativeErrorPercent => Aggregator::Last,
            Metric::Battery | Metric::Ipi | Metric::Motor | Metric::Rt => Aggregator::Mean,
        }
    }

    /// Compute this metric for `table`, optionally binned into `bins`-wide
    /// intervals
    pub fn compute(
        &self,
        table: &SessionTable,
        bins: Option<Duration>,
    ) -> Result<Series<Option<f64>>, SessionError> {
        if let Some(width) = bins {
            if width <= Duration::zero() {
                return Err(SessionError::InvalidBinWidth(width.num_milliseconds()));
            }
        }
        let metric = self.resolve(bins.is_some());
        let raw = metric.raw_series(table)?;
        Ok(match bins {
            Some(width) => bin_series(&raw, width, metric.aggregator()),
            None => raw,
        })
    }

    fn raw_series(&self, table: &SessionTable) -> Result<Series<Option<f64>>, SessionError> {
        let counts = |s: Series<i64>| s.map(|v| Some(v as f64));
        Ok(match self {
            Metric::BinaryPellets | Metric::Pellets => counts(table.pellets(false, true)?),
            Metric::CumulativePellets => counts(table.pellets(true, true)?),
            Metric::BinaryPokes | Metric::Pokes => counts(table.pokes(PokeKind::Any, false, true)?),
            Metric::CumulativePokes => counts(table.pokes(PokeKind::Any, true, true)?),
            Metric::BinaryLeftPokes | Metric::LeftPokes => {
                counts(table.pokes(PokeKind::Left, false, true)?)
            }
            Metric::BinaryRightPokes | Metric::RightPokes => {
                counts(table.pokes(PokeKind::Right, false, true)?)
            }
            Metric::CumulativeLeftPokes => counts(table.pokes(PokeKind::Left, true, true)?),
            Metric::CumulativeRightPokes => counts(table.pokes(PokeKind::Right, true, true)?),
            Metric::BinaryCorrectPokes | Metric::CorrectPokes => {
                counts(table.pokes(PokeKind::Correct, false, true)?)
            }
            Metric::BinaryErrorPokes | Metric::ErrorPokes => {
                counts(table.pokes(PokeKind::Error, false, true)?)
            }
            Metric::CumulativeCorrectPokes => counts(table.pokes(PokeKind::Correct, true, true)?),
            Metric::CumulativeErrorPokes => counts(table.pokes(PokeKind::Error, true, true)?),
            Metric::CumulativeLeftPercent => {
                cumulative_percent(table, PokeKind::Left, PokeKind::Right)?
            }
            Metric::CumulativeRightPercent => {
                cumulative_percent(table, PokeKind::Right, PokeKind::Left)?
            }
            Metric::CumulativeCorrectPercent => {
                cumulative_percent(table, PokeKind::Correct, PokeKind::Error)?
            }
            Metric::CumulativeErrorPercent => {
                cumulative_percent(table, PokeKind::Error, PokeKind::Correct)?
            }
            Metric::Battery => {
                Series::new(table.index().to_vec(), table.numeric(Field::BatteryVoltage)?.to_vec())
            }
            Metric::Ipi => table.interpellet_intervals(true, true)?,
            Metric::Motor => {
                let turns = table.numeric(Field::MotorTurns)?.to_vec();
                let pellet_rows: Vec<usize> = table
                    .binary_pellets()?
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0)
                    .map(|(i, _)| i)
                    .collect();
                Series::new(table.index().to_vec(), turns).select(&pellet_rows)
            }
            Metric::Rt => {
                Series::new(table.index().to_vec(), table.numeric(Field::RetrievalTime)?.to_vec())
                    .drop_missing()
            }
        })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.to_lowercase();
        Metric::ALL
            .iter()
            .find(|m| m.key() == key)
            .copied()
            .ok_or_else(|| SessionError::InvalidMetric(s.to_string()))
    }
}

/// Look up a metric by (case-insensitive) key
pub fn get_metric(key: &str) -> Result<Metric, SessionError> {
    key.parse()
}

/// All registry keys
pub fn list_metrics() -> Vec<&'static str> {
    Metric::ALL.iter().map(Metric::key).collect()
}

/// Share of `a` in `a + b` over time, in percent.
///
/// Both cumulative series are forward-filled (zero before their first value)
/// over the union of their timestamps; repeated timestamps keep their first
/// value. Undefined while both totals are zero.
fn cumulative_percent(
    table: &SessionTable,
    a: PokeKind,
    b: PokeKind,
) -> Result<Series<Option<f64>>, SessionError> {
    fn first_values(series: Series<i64>) -> BTreeMap<NaiveDateTime, i64> {
        let mut map = BTreeMap::new();
        for (t, v) in series.iter() {
            map.entry(*t).or_insert(*v);
        }
        map
    }

    let a = first_values(table.pokes(a, true, true)?);
    let b = first_values(table.pokes(b, true, true)?);
    let mut index: Vec<NaiveDateTime> = a.keys().chain(b.keys()).copied().collect();
    index.sort();
    index.dedup();

    let (mut last_a, mut last_b) = (0_i64, 0_i64);
    let values = index
        .iter()
        .map(|t| {
            last_a = a.get(t).copied().unwrap_or(last_a);
            last_b = b.get(t).copied().unwrap_or(last_b);
            let total = last_a + last_b;
            (total != 0).then(|| last_a as f64 / total as f64 * 100.0)
        })
        .collect();
    Ok(Series::new(index, values))
}

/// Group `series` into `width`-wide bins starting at its earliest timestamp.
/// Bins are labelled by their start.
pub fn bin_series(
    series: &Series<Option<f64>>,
    width: Duration,
    aggregator: Aggregator,
) -> Series<Option<f64>> {
    let origin = match series.index().iter().min() {
        Some(origin) => *origin,
        None => return Series::empty(),
    };
    let width_ms = width.num_milliseconds().max(1);

    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (t, v) in series.iter() {
        let k = (*t - origin).num_milliseconds() / width_ms;
        let bucket = buckets.entry(k).or_default();
        if let Some(v) = v {
            bucket.push(*v);
        }
    }
    let last = buckets.keys().next_back().copied().unwrap_or(0);

    let empty: Vec<f64> = Vec::new();
    let (index, values) = (0..=last)
        .map(|k| {
            let start = origin + Duration::milliseconds(k * width_ms);
            let bucket = buckets.get(&k).unwrap_or(&empty);
            (start, aggregator.apply(bucket))
        })
        .unzip();
    Series::new(index, values)
}
