//! Repair of repeated timestamps
//!
//! FED3 clocks have one-second resolution, so bursts of pokes regularly land
//! on the same timestamp. All policies leave the index unique; `offset` and
//! `interpolate` keep every row.

use chrono::{Duration, NaiveDateTime};
use std::collections::{HashMap, HashSet};

use crate::error::SessionError;
use crate::table::SessionTable;
use crate::types::DedupPolicy;

/// Step used by the `offset` policy unless another is given
pub const DEFAULT_OFFSET_STEP_MS: i64 = 100;

/// For each row, whether the same timestamp occurs at an earlier row
fn repeats_earlier(index: &[NaiveDateTime]) -> Vec<bool> {
    let mut seen = HashSet::with_capacity(index.len());
    index.iter().map(|t| !seen.insert(*t)).collect()
}

/// For each row, whether the same timestamp occurs at a later row
fn repeats_later(index: &[NaiveDateTime]) -> Vec<bool> {
    let mut seen = HashSet::with_capacity(index.len());
    let mut flags: Vec<bool> = index.iter().rev().map(|t| !seen.insert(*t)).collect();
    flags.reverse();
    flags
}

/// Push every repeat forward by `step` until no timestamp repeats
fn offset_repeats(index: &mut [NaiveDateTime], step: Duration) {
    loop {
        let repeats = repeats_earlier(index);
        if !repeats.contains(&true) {
            return;
        }
        for (t, repeat) in index.iter_mut().zip(repeats) {
            if repeat {
                *t += step;
            }
        }
    }
}

/// Place repeats linearly (by row position) between the nearest unique
/// neighbors, measured in microseconds from the first row
fn interpolate_repeats(index: &mut [NaiveDateTime]) -> Result<(), SessionError> {
    let repeats = repeats_earlier(index);
    if repeats.last().copied().unwrap_or(false) {
        return Err(SessionError::UninterpolatableDuplicate);
    }
    let t0 = match index.first() {
        Some(t) => *t,
        None => return Ok(()),
    };

    let micros: Vec<Option<f64>> = index
        .iter()
        .zip(&repeats)
        .map(|(t, repeat)| {
            if *repeat {
                None
            } else {
                (*t - t0).num_microseconds().map(|us| us as f64)
            }
        })
        .collect();

    let mut anchor = 0;
    for row in 1..index.len() {
        if micros[row].is_none() {
            continue;
        }
        let gap = row - anchor;
        if gap > 1 {
            // rows anchor+1 .. row-1 are repeats; both anchors are known
            if let (Some(lo), Some(hi)) = (micros[anchor], micros[row]) {
                for k in 1..gap {
                    let us = lo + (hi - lo) * k as f64 / gap as f64;
                    index[anchor + k] = t0 + Duration::microseconds(us.round() as i64);
                }
            }
        }
        anchor = row;
    }
    Ok(())
}

impl SessionTable {
    /// Make the timestamp index unique with `policy`.
    ///
    /// `offset` uses a step of `DEFAULT_OFFSET_STEP_MS`.
    pub fn deduplicate_index(&mut self, policy: DedupPolicy) -> Result<(), SessionError> {
        self.deduplicate_index_with_step(policy, Duration::milliseconds(DEFAULT_OFFSET_STEP_MS))
    }

    /// As `deduplicate_index`, with an explicit step for the `offset` policy
    pub fn deduplicate_index_with_step(
        &mut self,
        policy: DedupPolicy,
        step: Duration,
    ) -> Result<(), SessionError> {
        if !self.has_duplicates() {
            return Ok(());
        }
        let before = self.len();

        match policy {
            DedupPolicy::KeepFirst => {
                let repeats = repeats_earlier(&self.index);
                *self = self.select_rows(&positions_of(&repeats, false));
            }
            DedupPolicy::KeepLast => {
                let repeats = repeats_later(&self.index);
                *self = self.select_rows(&positions_of(&repeats, false));
            }
            DedupPolicy::Remove => {
                let mut counts: HashMap<NaiveDateTime, usize> = HashMap::new();
                for t in &self.index {
                    *counts.entry(*t).or_insert(0) += 1;
                }
                let keep = self.positions_where(|t| counts.get(t).copied() == Some(1));
                *self = self.select_rows(&keep);
            }
            DedupPolicy::Offset => {
                let step = if step > Duration::zero() {
                    step
                } else {
                    Duration::milliseconds(DEFAULT_OFFSET_STEP_MS)
                };
                offset_repeats(&mut self.index, step);
            }
            DedupPolicy::Interpolate => {
                let mut index = self.index.clone();
                interpolate_repeats(&mut index)?;
                if repeats_earlier(&index).contains(&true) {
                    log::warn!(
                        "Interpolation left colliding timestamps in {}; offsetting them by 1ms",
                        self.display_name()
                    );
                    offset_repeats(&mut index, Duration::milliseconds(1));
                }
                self.index = index;
            }
        }

        log::debug!(
            "Deduplicated {} with {:?}: {} -> {} rows",
            self.display_name(),
            policy,
            before,
            self.len()
        );
        Ok(())
    }
}

fn positions_of(flags: &[bool], value: bool) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter(|(_, f)| **f == value)
        .map(|(i, _)| i)
        .collect()
}
