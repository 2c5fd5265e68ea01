//! Housing-room light schedule

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Daily lights-on / lights-off times. Defaults to 07:00 on, 19:00 off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightCycle {
    pub lights_on: NaiveTime,
    pub lights_off: NaiveTime,
}

impl Default for LightCycle {
    fn default() -> Self {
        LightCycle {
            lights_on: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            lights_off: NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default(),
        }
    }
}

impl LightCycle {
    pub fn new(lights_on: NaiveTime, lights_off: NaiveTime) -> Self {
        LightCycle {
            lights_on,
            lights_off,
        }
    }

    /// Whether the lights are off at `timestamp`. Works for dark phases that
    /// cross midnight and for ones that don't.
    pub fn is_at_night(&self, timestamp: NaiveDateTime) -> bool {
        let time = timestamp.time();
        if self.lights_on > self.lights_off {
            self.lights_off <= time && time < self.lights_on
        } else {
            time < self.lights_on || time >= self.lights_off
        }
    }

    /// Dark periods overlapping `[start, end]`, clipped to it
    pub fn night_intervals(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        if end <= start {
            return Vec::new();
        }
        // equal times never switch the lights on
        if self.lights_on == self.lights_off {
            return vec![(start, end)];
        }

        let mut intervals = Vec::new();
        let mut dark_since = self.is_at_night(start).then_some(start);
        let mut t = start;
        loop {
            let switch = match dark_since {
                Some(_) => next_occurrence(t, self.lights_on),
                None => next_occurrence(t, self.lights_off),
            };
            if switch >= end {
                break;
            }
            match dark_since.take() {
                Some(since) => intervals.push((since, switch)),
                None => dark_since = Some(switch),
            }
            t = switch;
        }
        if let Some(since) = dark_since {
            intervals.push((since, end));
        }
        intervals
    }
}

/// First instant strictly after `t` whose time of day is `time`
fn next_occurrence(t: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let candidate = t.date().and_time(time);
    if candidate <= t {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::at;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_cycle() {
        let cycle = LightCycle::default();
        assert!(cycle.is_at_night(at(1, 6, 59, 0)));
        assert!(!cycle.is_at_night(at(1, 7, 0, 0)));
        assert!(!cycle.is_at_night(at(1, 18, 59, 59)));
        assert!(cycle.is_at_night(at(1, 19, 0, 0)));
    }

    #[test]
    fn test_inverted_cycle() {
        let on = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        let off = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let cycle = LightCycle::new(on, off);
        assert!(cycle.is_at_night(at(1, 12, 0, 0)));
        assert!(!cycle.is_at_night(at(1, 22, 0, 0)));
    }

    #[test]
    fn test_night_intervals_are_clipped() {
        let cycle = LightCycle::default();
        let nights = cycle.night_intervals(at(1, 5, 0, 0), at(2, 20, 0, 0));
        assert_eq!(
            nights,
            vec![
                (at(1, 5, 0, 0), at(1, 7, 0, 0)),
                (at(1, 19, 0, 0), at(2, 7, 0, 0)),
                (at(2, 19, 0, 0), at(2, 20, 0, 0)),
            ]
        );
    }

    #[test]
    fn test_daytime_span_has_no_nights() {
        let cycle = LightCycle::default();
        assert!(cycle.night_intervals(at(1, 8, 0, 0), at(1, 19, 0, 0)).is_empty());
        assert!(cycle.night_intervals(at(1, 9, 0, 0), at(1, 9, 0, 0)).is_empty());
    }
}
