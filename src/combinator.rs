//! Joining sessions end to end and cutting them apart again
//!
//! Counters are re-offset at every boundary so they stay monotonic across a
//! concatenation and restart from zero in each split segment.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

use crate::config::{ConcatOptions, SplitOptions};
use crate::error::SessionError;
use crate::schema::{parse_timestamp, RawTable};
use crate::table::SessionTable;
use crate::types::Field;

/// Anything usable as a split or crop boundary
pub trait ToTimestamp {
    fn to_timestamp(&self) -> Result<NaiveDateTime, SessionError>;
}

impl ToTimestamp for NaiveDateTime {
    fn to_timestamp(&self) -> Result<NaiveDateTime, SessionError> {
        Ok(*self)
    }
}

impl ToTimestamp for NaiveDate {
    fn to_timestamp(&self) -> Result<NaiveDateTime, SessionError> {
        Ok(self.and_time(chrono::NaiveTime::default()))
    }
}

impl ToTimestamp for &str {
    fn to_timestamp(&self) -> Result<NaiveDateTime, SessionError> {
        parse_timestamp(self)
    }
}

impl ToTimestamp for String {
    fn to_timestamp(&self) -> Result<NaiveDateTime, SessionError> {
        parse_timestamp(self)
    }
}

fn sentinel(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_default()
        .and_time(chrono::NaiveTime::default())
}

/// Non-empty sessions ordered by start time
fn chronological(sessions: &[SessionTable]) -> Vec<&SessionTable> {
    let mut ordered: Vec<&SessionTable> = sessions.iter().filter(|s| !s.is_empty()).collect();
    ordered.sort_by_key(|s| s.start_time());
    ordered
}

/// First pair (in start order) where a session starts at or before the end
/// of the one preceding it
fn first_overlap(sessions: &[SessionTable]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    chronological(sessions).windows(2).find_map(|pair| {
        let previous_end = pair[0].end_time()?;
        let next_start = pair[1].start_time()?;
        (next_start <= previous_end).then_some((previous_end, next_start))
    })
}

/// Whether `sessions` can be concatenated: once sorted by start time, each
/// must start strictly after the previous one ends. Empty sessions are
/// ignored.
pub fn can_concat(sessions: &[SessionTable]) -> bool {
    first_overlap(sessions).is_none()
}

/// Join sessions in chronological order into one table.
///
/// Counters listed in `reset_columns` that the earliest session carries are
/// offset by the running total of the sessions before, so the result counts
/// as if the device had never stopped. The result is rebuilt from scratch:
/// schema repair runs again and alignment returns to `datetime`.
pub fn concat(
    sessions: &[SessionTable],
    options: &ConcatOptions,
) -> Result<SessionTable, SessionError> {
    let first = sessions.first().ok_or(SessionError::EmptyCollection)?;
    if let Some((previous_end, next_start)) = first_overlap(sessions) {
        return Err(SessionError::Overlap {
            previous_end,
            next_start,
        });
    }

    let name = options
        .name
        .clone()
        .or_else(|| first.name().map(str::to_string));

    let ordered = chronological(sessions);
    let skipped = sessions.len() - ordered.len();
    if skipped > 0 {
        log::debug!("Skipping {} empty session(s) in concatenation", skipped);
    }

    let mut offsets: BTreeMap<Field, i64> = BTreeMap::new();
    let mut parts: Vec<RawTable> = Vec::with_capacity(ordered.len());
    for (i, session) in ordered.into_iter().enumerate() {
        let mut part = session.clone();
        if options.add_concat_index {
            part.concat_index = Some(vec![Some(i); part.len()]);
        }

        if i == 0 {
            for field in &options.reset_columns {
                if let Ok(values) = part.counter(*field) {
                    offsets.insert(*field, values.iter().copied().max().unwrap_or(0));
                }
            }
        } else {
            for (field, offset) in offsets.iter_mut() {
                if let Some(values) = part.counter_mut(*field) {
                    for v in values.iter_mut() {
                        *v += *offset;
                    }
                    if let Some(max) = values.iter().copied().max() {
                        *offset = max;
                    }
                }
            }
            log::debug!("Concatenation offsets after session {}: {:?}", i, offsets);
        }
        parts.push(part.to_raw());
    }

    let mut joined = SessionTable::from_raw(RawTable::concat(parts));
    joined.name = name;
    Ok(joined)
}

/// Cut `table` at `boundaries` into half-open segments
/// `[boundary[i], boundary[i + 1])`, implicitly bounded by 1970-01-01 and
/// 2200-12-31.
///
/// Each segment's reset counters are re-based by the last segment's
/// maximum, so a split undoes a concatenation. Segment `i` is named
/// `<name>_<i>` when `tag_name` is set, with `i` counting every interval,
/// kept or not.
pub fn split<T: ToTimestamp>(
    table: &SessionTable,
    boundaries: &[T],
    options: &SplitOptions,
) -> Result<Vec<SessionTable>, SessionError> {
    let mut edges = Vec::with_capacity(boundaries.len() + 2);
    edges.push(sentinel(1970, 1, 1));
    for boundary in boundaries {
        edges.push(boundary.to_timestamp()?);
    }
    edges.push(sentinel(2200, 12, 31));

    let mut offsets: BTreeMap<Field, i64> = options
        .reset_columns
        .iter()
        .map(|field| (*field, 0))
        .collect();
    let mut segments = Vec::new();

    for (i, window) in edges.windows(2).enumerate() {
        let (start, end) = (window[0], window[1]);
        let rows = table.positions_where(|t| *t >= start && *t < end);
        if rows.is_empty() && !options.return_empty {
            continue;
        }

        let mut segment = table.select_rows(&rows);
        if options.tag_name {
            segment.name = table.name().map(|name| format!("{}_{}", name, i));
        }
        for (field, offset) in offsets.iter_mut() {
            if let Some(values) = segment.counter_mut(*field) {
                let Some(max) = values.iter().copied().max() else {
                    continue;
                };
                for v in values.iter_mut() {
                    *v -= *offset;
                }
                *offset = max;
            }
        }
        segments.push(segment);
    }
    Ok(segments)
}

/// Rows in `[start, end)` with reset counters measured from `start`: each is
/// reduced by its maximum over the rows strictly before `start`
pub fn timecrop<S: ToTimestamp, E: ToTimestamp>(
    table: &SessionTable,
    start: S,
    end: E,
    reset_columns: &[Field],
    name: Option<&str>,
) -> Result<SessionTable, SessionError> {
    let start = start.to_timestamp()?;
    let end = end.to_timestamp()?;

    let prior = table.positions_where(|t| *t < start);
    let rows = table.positions_where(|t| *t >= start && *t < end);

    let mut cropped = table.select_rows(&rows);
    for field in reset_columns {
        let before = match table.counter(*field) {
            Ok(values) => prior.iter().map(|&i| values[i]).max(),
            Err(_) => None,
        };
        if let (Some(before), Some(values)) = (before, cropped.counter_mut(*field)) {
            for v in values.iter_mut() {
                *v -= before;
            }
        }
    }
    if let Some(name) = name {
        cropped.name = Some(name.to_string());
    }
    Ok(cropped)
}
