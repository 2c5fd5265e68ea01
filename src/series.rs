//! Time-indexed metric results
//!
//! A `Series` owns both its timestamps and its values; nothing in it refers
//! back to the session it was derived from.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// Ordered sequence of values keyed by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series<T> {
    index: Vec<NaiveDateTime>,
    values: Vec<T>,
}

impl<T> Series<T> {
    /// Build a series from parallel vectors. Extra entries on the longer side
    /// are discarded.
    pub fn new(mut index: Vec<NaiveDateTime>, mut values: Vec<T>) -> Self {
        let n = index.len().min(values.len());
        index.truncate(n);
        values.truncate(n);
        Series { index, values }
    }

    pub fn empty() -> Self {
        Series {
            index: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDateTime, &T)> {
        self.index.iter().zip(self.values.iter())
    }

    pub fn into_parts(self) -> (Vec<NaiveDateTime>, Vec<T>) {
        (self.index, self.values)
    }

    /// Keep only the entries for which `keep` returns true
    pub fn filter<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&NaiveDateTime, &T) -> bool,
    {
        let (index, values): (Vec<_>, Vec<_>) = self
            .index
            .into_iter()
            .zip(self.values)
            .filter(|(t, v)| keep(t, v))
            .unzip();
        Series { index, values }
    }

    /// Keep only the entries at the given positions (ascending)
    pub fn select(self, positions: &[usize]) -> Self {
        let wanted: HashSet<usize> = positions.iter().copied().collect();
        let (index, values): (Vec<_>, Vec<_>) = self
            .index
            .into_iter()
            .zip(self.values)
            .enumerate()
            .filter(|(i, _)| wanted.contains(i))
            .map(|(_, pair)| pair)
            .unzip();
        Series { index, values }
    }

    pub fn map<U, F>(self, f: F) -> Series<U>
    where
        F: FnMut(T) -> U,
    {
        Series {
            index: self.index,
            values: self.values.into_iter().map(f).collect(),
        }
    }
}

impl<T: PartialEq + Default> Series<T> {
    /// Drop entries equal to zero
    pub fn drop_zero(self) -> Self {
        let zero = T::default();
        self.filter(|_, v| *v != zero)
    }
}

impl<T: Eq + Hash + Clone> Series<T> {
    /// Drop every entry whose value already appeared earlier in the series
    pub fn deduplicate(self) -> Self {
        let mut seen = HashSet::new();
        self.filter(|_, v| seen.insert(v.clone()))
    }
}

impl<T> Series<Option<T>> {
    /// Drop missing entries
    pub fn drop_missing(self) -> Self {
        self.filter(|_, v| v.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_condense_counter() {
        let series = Series::new(
            (0..6).map(ts).collect(),
            vec![0_i64, 1, 1, 2, 2, 3],
        );
        let condensed = series.deduplicate().drop_zero();
        assert_eq!(condensed.values(), &[1, 2, 3]);
        assert_eq!(condensed.index(), &[ts(1), ts(3), ts(5)]);
    }

    #[test]
    fn test_drop_missing() {
        let series = Series::new((0..3).map(ts).collect(), vec![None, Some(1.5), None]);
        let dropped = series.drop_missing();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped.values(), &[Some(1.5)]);
    }

    #[test]
    fn test_mismatched_lengths_truncate() {
        let series = Series::new((0..3).map(ts).collect(), vec![1_i64]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.index().len(), 1);
    }

    #[test]
    fn test_select_positions() {
        let series = Series::new((0..4).map(ts).collect(), vec![10_i64, 11, 12, 13]);
        let picked = series.select(&[1, 3]);
        assert_eq!(picked.values(), &[11, 13]);
    }
}
