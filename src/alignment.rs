//! Re-basing a session's timestamp axis
//!
//! Every shift is recorded in `cumulative_offset`, so `datetime` alignment
//! can always restore the axis the session was loaded with.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::SessionError;
use crate::table::SessionTable;
use crate::types::{Alignment, MixedAlignmentPolicy, SharedAlignment};

/// Reference instant for `time` and `elapsed` alignment (2000-01-01 00:00:00)
pub fn zero_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap_or_default()
        .and_time(chrono::NaiveTime::default())
}

impl SessionTable {
    /// Shift needed to move this table into `mode`; subtracted from the index
    fn alignment_delta(&self, mode: Alignment) -> Duration {
        match (mode, self.start_time()) {
            (Alignment::Datetime, _) => self.cumulative_offset,
            (_, None) => Duration::zero(),
            (Alignment::Time, Some(first)) => first.date() - zero_date().date(),
            (Alignment::Elapsed, Some(first)) => first - zero_date(),
        }
    }

    /// Move the index into `mode` in place
    pub fn align_in_place(&mut self, mode: Alignment) {
        let delta = self.alignment_delta(mode);
        for t in &mut self.index {
            *t -= delta;
        }
        self.cumulative_offset = self.cumulative_offset - delta;
        self.alignment = mode;
        log::debug!(
            "Aligned {} to {} (shift {}s)",
            self.display_name(),
            mode,
            -delta.num_seconds()
        );
    }

    /// Independent copy of this table aligned to `mode`
    pub fn aligned(&self, mode: Alignment) -> SessionTable {
        let mut copy = self.clone();
        copy.align_in_place(mode);
        copy
    }
}

/// Copy of `table` aligned to `mode` (`"datetime"`, `"time"` or `"elapsed"`)
pub fn align(table: &SessionTable, mode: &str) -> Result<SessionTable, SessionError> {
    let mode: Alignment = mode.parse()?;
    Ok(table.aligned(mode))
}

/// Align `table` to `mode` in place. An invalid mode leaves it untouched.
pub fn align_in_place(table: &mut SessionTable, mode: &str) -> Result<(), SessionError> {
    let mode: Alignment = mode.parse()?;
    table.align_in_place(mode);
    Ok(())
}

/// The alignment all `sessions` share, or `Mixed`
pub fn determine_alignment(sessions: &[SessionTable]) -> Result<SharedAlignment, SessionError> {
    let first = sessions
        .first()
        .ok_or(SessionError::EmptyCollection)?
        .alignment();
    if sessions.iter().all(|s| s.alignment() == first) {
        Ok(SharedAlignment::Uniform(first))
    } else {
        Ok(SharedAlignment::Mixed)
    }
}

/// Apply a mixed-alignment policy to a collection. Returns the shared
/// alignment; `Raise` turns `Mixed` into an error and `Warn` logs it.
pub fn screen_mixed_alignment(
    sessions: &[SessionTable],
    policy: MixedAlignmentPolicy,
) -> Result<SharedAlignment, SessionError> {
    let shared = determine_alignment(sessions)?;
    if shared == SharedAlignment::Mixed {
        match policy {
            MixedAlignmentPolicy::Raise => return Err(SessionError::MixedAlignment),
            MixedAlignmentPolicy::Warn => {
                log::warn!("Sessions have mixed alignment; results may not be comparable")
            }
            MixedAlignmentPolicy::Ignore => {}
        }
    }
    Ok(shared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::{at, session};
    use pretty_assertions::assert_eq;

    fn sample() -> SessionTable {
        session(at(3, 21, 30, 0), &[0, 1, 2], &[0, 0, 0], &[0, 0, 0])
    }

    #[test]
    fn test_elapsed_moves_start_to_zero_date() {
        let table = align(&sample(), "elapsed").unwrap();
        assert_eq!(table.start_time(), Some(zero_date()));
        assert_eq!(table.index()[2], zero_date() + Duration::minutes(2));
        assert_eq!(table.alignment(), Alignment::Elapsed);
    }

    #[test]
    fn test_time_keeps_time_of_day() {
        let table = align(&sample(), "time").unwrap();
        assert_eq!(
            table.start_time(),
            Some(zero_date() + Duration::hours(21) + Duration::minutes(30))
        );
    }

    #[test]
    fn test_datetime_restores_loaded_axis() {
        let original = sample();
        let mut table = original.clone();
        for mode in [Alignment::Elapsed, Alignment::Time, Alignment::Elapsed] {
            table.align_in_place(mode);
            assert_eq!(table.original_index(), original.index());
        }
        table.align_in_place(Alignment::Datetime);
        assert_eq!(table.index(), original.index());
        assert_eq!(table.cumulative_offset(), Duration::zero());
    }

    #[test]
    fn test_aligned_copy_leaves_source_alone() {
        let original = sample();
        let _ = original.aligned(Alignment::Elapsed);
        assert_eq!(original.start_time(), Some(at(3, 21, 30, 0)));
        assert_eq!(original.alignment(), Alignment::Datetime);
    }

    #[test]
    fn test_invalid_mode_is_rejected_before_mutation() {
        let mut table = sample();
        let before = table.clone();
        assert!(matches!(
            align_in_place(&mut table, "absolute"),
            Err(SessionError::InvalidAlignmentMode(_))
        ));
        assert_eq!(table, before);
    }

    #[test]
    fn test_empty_table_aligns_trivially() {
        let mut empty = sample().select_rows(&[]);
        empty.align_in_place(Alignment::Elapsed);
        assert_eq!(empty.cumulative_offset(), Duration::zero());
        assert_eq!(empty.alignment(), Alignment::Elapsed);
    }

    #[test]
    fn test_determine_alignment() {
        let a = sample();
        let b = sample().aligned(Alignment::Elapsed);
        assert_eq!(
            determine_alignment(&[a.clone(), a.clone()]).unwrap(),
            SharedAlignment::Uniform(Alignment::Datetime)
        );
        assert_eq!(
            determine_alignment(&[a.clone(), b.clone()]).unwrap(),
            SharedAlignment::Mixed
        );
        assert!(matches!(
            determine_alignment(&[]),
            Err(SessionError::EmptyCollection)
        ));

        let mixed = [a, b];
        assert!(matches!(
            screen_mixed_alignment(&mixed, MixedAlignmentPolicy::Raise),
            Err(SessionError::MixedAlignment)
        ));
        assert_eq!(
            screen_mixed_alignment(&mixed, MixedAlignmentPolicy::Ignore).unwrap(),
            SharedAlignment::Mixed
        );
    }
}
