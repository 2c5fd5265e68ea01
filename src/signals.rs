//! Event-level signals derived from the device's cumulative counters
//!
//! The device only logs running totals. Binary (0/1) indicators come from
//! first differences; the first row has no predecessor and is resolved from
//! the event recorded (or inferred) for that row instead.

use chrono::NaiveDateTime;

use crate::config::MealOptions;
use crate::error::SessionError;
use crate::series::Series;
use crate::table::{Column, SessionTable};
use crate::types::{EventKind, Field, PokeKind};

const ACTIVE_LEFT: &str = "Left";
const ACTIVE_RIGHT: &str = "Right";

/// Per-row change of a counter. The first row is measured against zero.
fn deltas(values: &[i64]) -> Vec<i64> {
    let mut prev = 0;
    values
        .iter()
        .map(|&v| {
            let d = v - prev;
            prev = v;
            d
        })
        .collect()
}

/// First difference with the first row replaced by `first`
fn first_difference(values: &[i64], first: bool) -> Vec<i64> {
    let mut out = deltas(values);
    if let Some(head) = out.first_mut() {
        *head = first as i64;
    }
    out
}

fn cumulative_sum(values: &[i64]) -> Vec<i64> {
    values
        .iter()
        .scan(0_i64, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

fn minutes_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    (b - a).num_milliseconds() as f64 / 60_000.0
}

impl SessionTable {
    /// Event for the row at `row`.
    ///
    /// An explicit `Event` label is returned as written. Without one, the
    /// event is inferred from which single counter changed at that row;
    /// `poke_side = false` reports inferred pokes as `Poke`.
    pub fn event_type(&self, row: usize, poke_side: bool) -> Result<EventKind, SessionError> {
        if row >= self.len() {
            return Err(SessionError::RowOutOfRange {
                row,
                len: self.len(),
            });
        }

        if let Some(Column::Text(labels)) = self.column(Field::Event) {
            if let Some(label) = &labels[row] {
                return Ok(EventKind::from_label(label));
            }
        }

        let changed = |field| -> Result<bool, SessionError> {
            let values = self.counter(field)?;
            let prev = if row == 0 { 0 } else { values[row - 1] };
            Ok(values[row] - prev != 0)
        };
        let pellet = changed(Field::PelletCount)?;
        let left = changed(Field::LeftPokeCount)?;
        let right = changed(Field::RightPokeCount)?;

        match (pellet, left, right) {
            (true, false, false) => Ok(EventKind::Pellet),
            (false, true, false) if poke_side => Ok(EventKind::Left),
            (false, false, true) if poke_side => Ok(EventKind::Right),
            (false, true, false) | (false, false, true) => Ok(EventKind::Poke),
            _ => Err(SessionError::AmbiguousEvent {
                timestamp: self.index[row],
            }),
        }
    }

    /// Event at the first row stamped `timestamp`, if there is one
    pub fn event_type_at(
        &self,
        timestamp: NaiveDateTime,
        poke_side: bool,
    ) -> Result<Option<EventKind>, SessionError> {
        match self.index.iter().position(|t| *t == timestamp) {
            Some(row) => self.event_type(row, poke_side).map(Some),
            None => Ok(None),
        }
    }

    fn first_event_is(&self, kind: &EventKind) -> Result<bool, SessionError> {
        if self.is_empty() {
            return Ok(false);
        }
        Ok(self.event_type(0, true)? == *kind)
    }

    pub(crate) fn binary_pellets(&self) -> Result<Vec<i64>, SessionError> {
        let counts = self.counter(Field::PelletCount)?;
        let first = self.first_event_is(&EventKind::Pellet)?;
        Ok(first_difference(counts, first))
    }

    fn binary_poke_side(&self, field: Field, side: EventKind) -> Result<Vec<i64>, SessionError> {
        let counts = self.counter(field)?;
        let first = self.first_event_is(&side)?;
        Ok(first_difference(counts, first))
    }

    fn active_sides(&self) -> Result<&[Option<String>], SessionError> {
        self.text(Field::ActivePoke)
    }

    pub(crate) fn binary_pokes(&self, kind: PokeKind) -> Result<Vec<i64>, SessionError> {
        match kind {
            PokeKind::Left => self.binary_poke_side(Field::LeftPokeCount, EventKind::Left),
            PokeKind::Right => self.binary_poke_side(Field::RightPokeCount, EventKind::Right),
            PokeKind::Any => {
                let left = self.binary_pokes(PokeKind::Left)?;
                let right = self.binary_pokes(PokeKind::Right)?;
                Ok(left
                    .iter()
                    .zip(&right)
                    .map(|(l, r)| (*l > 0 || *r > 0) as i64)
                    .collect())
            }
            PokeKind::Correct | PokeKind::Error => {
                let left = self.binary_pokes(PokeKind::Left)?;
                let right = self.binary_pokes(PokeKind::Right)?;
                let active = self.active_sides()?;
                let want_correct = kind == PokeKind::Correct;
                Ok(left
                    .iter()
                    .zip(&right)
                    .zip(active)
                    .map(|((l, r), side)| {
                        let side = side.as_deref();
                        let active_left = side == Some(ACTIVE_LEFT);
                        let active_right = side == Some(ACTIVE_RIGHT);
                        let hit = if want_correct {
                            (*l > 0 && active_left) || (*r > 0 && active_right)
                        } else {
                            (*l > 0 && active_right) || (*r > 0 && active_left)
                        };
                        hit as i64
                    })
                    .collect())
            }
        }
    }

    fn cumulative_pokes(&self, kind: PokeKind) -> Result<Vec<i64>, SessionError> {
        match kind {
            PokeKind::Left => Ok(self.counter(Field::LeftPokeCount)?.to_vec()),
            PokeKind::Right => Ok(self.counter(Field::RightPokeCount)?.to_vec()),
            PokeKind::Any => {
                let left = self.counter(Field::LeftPokeCount)?;
                let right = self.counter(Field::RightPokeCount)?;
                Ok(left.iter().zip(right).map(|(l, r)| l + r).collect())
            }
            PokeKind::Correct | PokeKind::Error => Ok(cumulative_sum(&self.binary_pokes(kind)?)),
        }
    }

    /// Pellet signal: the raw counter when `cumulative`, otherwise the binary
    /// retrieval indicator.
    ///
    /// Condensing drops repeated and zero totals (cumulative) or zero
    /// indicators (binary).
    pub fn pellets(&self, cumulative: bool, condense: bool) -> Result<Series<i64>, SessionError> {
        let values = if cumulative {
            self.counter(Field::PelletCount)?.to_vec()
        } else {
            self.binary_pellets()?
        };
        let series = Series::new(self.index.clone(), values);
        Ok(match (condense, cumulative) {
            (false, _) => series,
            (true, true) => series.deduplicate().drop_zero(),
            (true, false) => series.drop_zero(),
        })
    }

    /// Poke signal of the given kind, cumulative or binary, with the same
    /// condensing rules as `pellets`
    pub fn pokes(
        &self,
        kind: PokeKind,
        cumulative: bool,
        condense: bool,
    ) -> Result<Series<i64>, SessionError> {
        let values = if cumulative {
            self.cumulative_pokes(kind)?
        } else {
            self.binary_pokes(kind)?
        };
        let series = Series::new(self.index.clone(), values);
        Ok(match (condense, cumulative) {
            (false, _) => series,
            (true, true) => series.deduplicate().drop_zero(),
            (true, false) => series.drop_zero(),
        })
    }

    /// Positions of rows where exactly one pellet was retrieved
    fn pellet_rows(&self) -> Result<Vec<usize>, SessionError> {
        Ok(self
            .binary_pellets()?
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == 1)
            .map(|(i, _)| i)
            .collect())
    }

    /// Minutes since the previous pellet, defined on pellet rows only.
    ///
    /// With `check_concat`, the first pellet of each concatenated source
    /// session gets no interval, so no gap spans two recordings. The
    /// correction needs a unique index and is skipped otherwise.
    pub fn interpellet_intervals(
        &self,
        check_concat: bool,
        condense: bool,
    ) -> Result<Series<Option<f64>>, SessionError> {
        let rows = self.pellet_rows()?;
        let mut intervals: Vec<Option<f64>> = vec![None; self.len()];
        for pair in rows.windows(2) {
            intervals[pair[1]] = Some(minutes_between(self.index[pair[0]], self.index[pair[1]]));
        }

        if check_concat {
            if let Some(tags) = &self.concat_index {
                if self.has_duplicates() {
                    log::debug!(
                        "Skipping concatenation correction for {}: duplicate timestamps",
                        self.display_name()
                    );
                } else {
                    for pair in rows.windows(2) {
                        if tags[pair[0]] != tags[pair[1]] {
                            intervals[pair[1]] = None;
                        }
                    }
                }
            }
        }

        let series = Series::new(self.index.clone(), intervals);
        Ok(if condense {
            series.select(&rows).drop_missing()
        } else {
            series
        })
    }

    /// Meal number for each pellet.
    ///
    /// A new group starts at the first pellet and whenever the interval since
    /// the previous pellet is missing or at least the intermeal interval.
    /// Groups with fewer than `pellet_minimum` pellets are dropped (`None`)
    /// and the survivors are renumbered 1, 2, ... in order. Condensing keeps
    /// pellet rows only.
    pub fn meals(
        &self,
        options: &MealOptions,
        condense: bool,
    ) -> Result<Series<Option<u32>>, SessionError> {
        let rows = self.pellet_rows()?;
        let ipi = self.interpellet_intervals(true, false)?;
        let ipi = ipi.values();

        let mut groups: Vec<usize> = Vec::with_capacity(rows.len());
        let mut sizes: Vec<u32> = Vec::new();
        for (k, &row) in rows.iter().enumerate() {
            let starts_meal = k == 0
                || match ipi[row] {
                    Some(minutes) => minutes >= options.intermeal_interval_minutes,
                    None => true,
                };
            if starts_meal {
                sizes.push(0);
            }
            let group = sizes.len() - 1;
            sizes[group] += 1;
            groups.push(group);
        }

        let mut next = 0_u32;
        let renumbered: Vec<Option<u32>> = sizes
            .iter()
            .map(|&size| {
                (size >= options.pellet_minimum).then(|| {
                    next += 1;
                    next
                })
            })
            .collect();

        let mut meals: Vec<Option<u32>> = vec![None; self.len()];
        for (&row, &group) in rows.iter().zip(&groups) {
            meals[row] = renumbered[group];
        }

        let series = Series::new(self.index.clone(), meals);
        Ok(if condense { series.select(&rows) } else { series })
    }

    /// Rewrite the `Event` column from the counters.
    ///
    /// With `include_side`, rows become `Pellet`, `Left` or `Right` (later
    /// kinds win when several counters moved) and rows where nothing moved
    /// are left empty; without it every row is `Pellet` or `Poke`.
    pub fn reassign_events(&mut self, include_side: bool) -> Result<(), SessionError> {
        let pellets = self.binary_pellets()?;
        let events: Vec<Option<String>> = if include_side {
            let left = self.binary_pokes(PokeKind::Left)?;
            let right = self.binary_pokes(PokeKind::Right)?;
            pellets
                .iter()
                .zip(&left)
                .zip(&right)
                .map(|((p, l), r)| {
                    let mut event = None;
                    if *p != 0 {
                        event = Some(EventKind::Pellet);
                    }
                    if *l != 0 {
                        event = Some(EventKind::Left);
                    }
                    if *r != 0 {
                        event = Some(EventKind::Right);
                    }
                    event.map(|e| e.to_string())
                })
                .collect()
        } else {
            pellets
                .iter()
                .map(|p| {
                    let event = if *p != 0 { EventKind::Pellet } else { EventKind::Poke };
                    Some(event.to_string())
                })
                .collect()
        };
        self.set_column(Field::Event, Column::Text(events));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::concat;
    use crate::config::ConcatOptions;
    use crate::schema::RawTable;
    use crate::table::test_support::{at, session};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn pellet_session(minutes: &[f64]) -> SessionTable {
        pellet_session_from(at(1, 8, 0, 0), minutes)
    }

    fn pellet_session_from(start: NaiveDateTime, minutes: &[f64]) -> SessionTable {
        let index: Vec<NaiveDateTime> = minutes
            .iter()
            .map(|m| start + Duration::milliseconds((m * 60_000.0) as i64))
            .collect();
        let n = index.len() as i64;
        SessionTable::from_raw(
            RawTable::new(index)
                .with_column("Pellet_Count", 1..=n)
                .with_column("Left_Poke_Count", std::iter::repeat(0_i64).take(n as usize))
                .with_column("Right_Poke_Count", std::iter::repeat(0_i64).take(n as usize)),
        )
    }

    #[test]
    fn test_infers_pellet_event() {
        let table = session(at(1, 10, 0, 0), &[0, 1], &[3, 3], &[2, 2]);
        assert_eq!(table.event_type(1, true).unwrap(), EventKind::Pellet);
    }

    #[test]
    fn test_infers_poke_side() {
        let table = session(at(1, 10, 0, 0), &[1, 1, 1], &[0, 1, 1], &[0, 0, 1]);
        assert_eq!(table.event_type(1, true).unwrap(), EventKind::Left);
        assert_eq!(table.event_type(2, true).unwrap(), EventKind::Right);
        assert_eq!(table.event_type(2, false).unwrap(), EventKind::Poke);
    }

    #[test]
    fn test_ambiguous_event_is_an_error() {
        let table = session(at(1, 10, 0, 0), &[0, 1], &[0, 1], &[0, 1]);
        assert!(matches!(
            table.event_type(1, true),
            Err(SessionError::AmbiguousEvent { timestamp }) if timestamp == at(1, 10, 1, 0)
        ));
        // also when nothing moved
        let idle = session(at(1, 10, 0, 0), &[1, 1], &[0, 0], &[0, 0]);
        assert!(idle.event_type(1, true).is_err());
    }

    #[test]
    fn test_explicit_event_column_wins() {
        let raw = RawTable::new(vec![at(1, 10, 0, 0)])
            .with_column("Pellet_Count", vec![5_i64])
            .with_column("Left_Poke_Count", vec![5_i64])
            .with_column("Right_Poke_Count", vec![5_i64])
            .with_column("Event", vec!["LeftShort"]);
        let table = SessionTable::from_raw(raw);
        assert_eq!(
            table.event_type(0, true).unwrap(),
            EventKind::Other("LeftShort".to_string())
        );
        assert!(matches!(
            table.event_type(4, true),
            Err(SessionError::RowOutOfRange { row: 4, len: 1 })
        ));
    }

    #[test]
    fn test_binary_pellets_sum_to_counter_growth() {
        let counts = [1, 1, 2, 3, 3, 4];
        let table = session(at(1, 10, 0, 0), &counts, &[0, 1, 1, 1, 2, 2], &[0; 6]);
        let binary = table.pellets(false, false).unwrap();
        let first = binary.values()[0];
        assert_eq!(first, 1);
        let mut running = 0;
        for (i, v) in binary.values().iter().enumerate() {
            running += v;
            assert_eq!(running - first, counts[i] - counts[0]);
        }
    }

    #[test]
    fn test_condensed_pellets() {
        let table = session(at(1, 10, 0, 0), &[0, 1, 1, 2], &[1, 1, 2, 2], &[0; 4]);
        let cumulative = table.pellets(true, true).unwrap();
        assert_eq!(cumulative.values(), &[1, 2]);
        assert_eq!(cumulative.index(), &[at(1, 10, 1, 0), at(1, 10, 3, 0)]);

        let binary = table.pellets(false, true).unwrap();
        assert_eq!(binary.values(), &[1, 1]);
    }

    #[test]
    fn test_poke_kinds() {
        // active side is Left throughout
        let table = session(at(1, 10, 0, 0), &[0, 0, 0, 1], &[1, 1, 2, 2], &[0, 1, 1, 1]);
        assert_eq!(table.pokes(PokeKind::Left, false, false).unwrap().values(), &[1, 0, 1, 0]);
        assert_eq!(table.pokes(PokeKind::Right, false, false).unwrap().values(), &[0, 1, 0, 0]);
        assert_eq!(table.pokes(PokeKind::Any, false, false).unwrap().values(), &[1, 1, 1, 0]);
        assert_eq!(table.pokes(PokeKind::Correct, false, false).unwrap().values(), &[1, 0, 1, 0]);
        assert_eq!(table.pokes(PokeKind::Error, false, false).unwrap().values(), &[0, 1, 0, 0]);
        assert_eq!(table.pokes(PokeKind::Any, true, false).unwrap().values(), &[1, 2, 3, 3]);
        assert_eq!(table.pokes(PokeKind::Correct, true, false).unwrap().values(), &[1, 1, 2, 2]);
        assert_eq!(table.pokes(PokeKind::Error, true, true).unwrap().values(), &[1]);
    }

    #[test]
    fn test_correct_pokes_need_active_side() {
        let raw = RawTable::new(vec![at(1, 10, 0, 0)])
            .with_column("Pellet_Count", vec![0_i64])
            .with_column("Left_Poke_Count", vec![1_i64])
            .with_column("Right_Poke_Count", vec![0_i64]);
        let table = SessionTable::from_raw(raw);
        assert!(matches!(
            table.pokes(PokeKind::Correct, false, false),
            Err(SessionError::MissingColumn(Field::ActivePoke))
        ));
    }

    #[test]
    fn test_interpellet_intervals() {
        let table = pellet_session(&[0.0, 0.5, 1.0, 3.0]);
        let ipi = table.interpellet_intervals(true, false).unwrap();
        assert_eq!(ipi.values(), &[None, Some(0.5), Some(0.5), Some(2.0)]);

        let condensed = table.interpellet_intervals(true, true).unwrap();
        assert_eq!(condensed.len(), 3);
        assert_eq!(condensed.index()[0], at(1, 8, 0, 30));
    }

    #[test]
    fn test_interpellet_intervals_skip_non_pellet_rows() {
        let table = session(at(1, 10, 0, 0), &[1, 1, 2], &[0, 1, 1], &[0, 0, 0]);
        let ipi = table.interpellet_intervals(true, false).unwrap();
        assert_eq!(ipi.values(), &[None, None, Some(2.0)]);
    }

    #[test]
    fn test_interpellet_intervals_reset_at_concat_boundary() {
        let morning = pellet_session_from(at(1, 8, 0, 0), &[0.0, 1.0, 2.0]);
        let later = pellet_session_from(at(1, 8, 3, 0), &[0.0, 1.0, 2.0]);
        let joined = concat(&[morning, later], &ConcatOptions::default()).unwrap();

        let ipi = joined.interpellet_intervals(true, false).unwrap();
        assert_eq!(
            ipi.values(),
            &[None, Some(1.0), Some(1.0), None, Some(1.0), Some(1.0)]
        );

        let raw = joined.interpellet_intervals(false, false).unwrap();
        assert_eq!(raw.values()[3], Some(1.0));
    }

    #[test]
    fn test_concat_correction_skipped_with_duplicate_index() {
        let morning = pellet_session_from(at(1, 8, 0, 0), &[0.0, 1.0, 1.0]);
        let later = pellet_session_from(at(1, 8, 3, 0), &[0.0, 1.0, 2.0]);
        let joined = concat(&[morning, later], &ConcatOptions::default()).unwrap();
        assert!(joined.has_duplicates());

        let ipi = joined.interpellet_intervals(true, false).unwrap();
        assert_eq!(
            ipi.values(),
            &[None, Some(1.0), Some(0.0), Some(2.0), Some(1.0), Some(1.0)]
        );
    }

    #[test]
    fn test_meals_split_at_concat_boundary() {
        let morning = pellet_session_from(at(1, 8, 0, 0), &[0.0, 1.0, 2.0]);
        let later = pellet_session_from(at(1, 8, 3, 0), &[0.0, 1.0, 2.0]);
        let joined = concat(&[morning, later], &ConcatOptions::default()).unwrap();

        let options = MealOptions { pellet_minimum: 1, intermeal_interval_minutes: 5.0 };
        let meals = joined.meals(&options, true).unwrap();
        assert_eq!(
            meals.values(),
            &[Some(1), Some(1), Some(1), Some(2), Some(2), Some(2)]
        );
    }

    #[test]
    fn test_meal_segmentation() {
        // intervals 0.5, 0.5, 2.0, 0.5
        let table = pellet_session(&[0.0, 0.5, 1.0, 3.0, 3.5]);

        let one = MealOptions { pellet_minimum: 1, intermeal_interval_minutes: 1.0 };
        let meals = table.meals(&one, true).unwrap();
        assert_eq!(meals.values(), &[Some(1), Some(1), Some(1), Some(2), Some(2)]);

        let three = MealOptions { pellet_minimum: 3, ..one };
        let meals = table.meals(&three, true).unwrap();
        assert_eq!(meals.values(), &[Some(1), Some(1), Some(1), None, None]);

        let four = MealOptions { pellet_minimum: 4, ..one };
        let meals = table.meals(&four, true).unwrap();
        assert!(meals.values().iter().all(Option::is_none));
    }

    #[test]
    fn test_meal_numbering_has_no_gaps() {
        // groups of 1, 3, 1, 2 pellets
        let table = pellet_session(&[0.0, 5.0, 5.2, 5.4, 10.0, 15.0, 15.1]);
        let opts = MealOptions { pellet_minimum: 2, intermeal_interval_minutes: 1.0 };
        let meals = table.meals(&opts, false).unwrap();
        assert_eq!(
            meals.values(),
            &[None, Some(1), Some(1), Some(1), None, Some(2), Some(2)]
        );
    }

    #[test]
    fn test_reassign_events() {
        let mut table = session(at(1, 10, 0, 0), &[1, 1, 1, 2], &[0, 1, 1, 1], &[0, 0, 1, 1]);
        table.reassign_events(true).unwrap();
        assert_eq!(
            table.text(Field::Event).unwrap(),
            &[
                Some("Pellet".to_string()),
                Some("Left".to_string()),
                Some("Right".to_string()),
                Some("Pellet".to_string()),
            ]
        );

        table.reassign_events(false).unwrap();
        assert_eq!(
            table.text(Field::Event).unwrap(),
            &[
                Some("Pellet".to_string()),
                Some("Poke".to_string()),
                Some("Poke".to_string()),
                Some("Pellet".to_string()),
            ]
        );
    }
}
