//! Display-range selection
//!
//! The user-selected window governing which readings are fetched and
//! retained: a fixed number of trailing hours, or everything since local
//! midnight. A selection translates into the REST query parameter and the
//! cutoff instant used to filter both fetch results and push events.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

/// Hour presets offered by the range picker
pub const RANGE_HOURS: [u32; 6] = [1, 6, 12, 24, 48, 72];

/// The currently selected display range.
///
/// Mutated only by explicit user selection; switching ranges triggers a
/// fresh fetch and a wholesale buffer replace but never tears down the
/// push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// Trailing `n` hours from now
    Hours(u32),
    /// Since midnight of the local calendar day
    SinceLocalMidnight,
}

/// Query parameter and filter cutoff derived from a range at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    /// Hour count for the `hours=N` REST query
    pub query_hours: u32,
    /// Earliest instant a retained reading must satisfy
    pub cutoff: DateTime<Utc>,
}

impl RangeSpec {
    /// Query parameter and cutoff for this range as of `now`.
    ///
    /// `Hours(n)` asks for n hours with a cutoff n hours back. Since-midnight
    /// asks for enough whole hours to reach back past local midnight (at
    /// least one, so the query is never empty just after midnight) and cuts
    /// off at midnight itself.
    pub fn window(&self, now: DateTime<Local>) -> RangeWindow {
        match self {
            RangeSpec::Hours(n) => RangeWindow {
                query_hours: *n,
                cutoff: (now - Duration::hours(i64::from(*n))).with_timezone(&Utc),
            },
            RangeSpec::SinceLocalMidnight => {
                let midnight = local_midnight(now);
                let secs = (now - midnight).num_seconds().max(0);
                let query_hours = ((secs + 3599) / 3600).max(1) as u32;
                RangeWindow {
                    query_hours,
                    cutoff: midnight.with_timezone(&Utc),
                }
            }
        }
    }

    /// Cutoff instant for this range as of `now`.
    ///
    /// Recomputed from `now` at every use, so a since-midnight range keeps
    /// filtering against the current day after a midnight rollover.
    pub fn cutoff(&self, now: DateTime<Local>) -> DateTime<Utc> {
        self.window(now).cutoff
    }
}

impl Default for RangeSpec {
    fn default() -> Self {
        RangeSpec::Hours(24)
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSpec::Hours(n) => write!(f, "{}h", n),
            RangeSpec::SinceLocalMidnight => write!(f, "today"),
        }
    }
}

impl FromStr for RangeSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("today") {
            return Ok(RangeSpec::SinceLocalMidnight);
        }
        match s.parse::<u32>() {
            Ok(n) if RANGE_HOURS.contains(&n) => Ok(RangeSpec::Hours(n)),
            _ => Err(format!(
                "invalid range '{}', expected one of 1|6|12|24|48|72|today",
                s
            )),
        }
    }
}

/// Start of the local calendar day containing `now`.
fn local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let day_start = now.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&day_start) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Midnight skipped by a DST transition; the day starts at the
            // earliest representable local time instead.
            let mut candidate = day_start;
            for _ in 0..4 {
                candidate = candidate + Duration::hours(1);
                match Local.from_local_datetime(&candidate) {
                    LocalResult::Single(t) => return t,
                    LocalResult::Ambiguous(earliest, _) => return earliest,
                    LocalResult::None => continue,
                }
            }
            now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_fixed_hours_window() {
        let now = local(12, 0);
        let window = RangeSpec::Hours(6).window(now);

        assert_eq!(window.query_hours, 6);
        assert_eq!(window.cutoff, (now - Duration::hours(6)).with_timezone(&Utc));
    }

    #[test]
    fn test_today_query_hours_rounds_up() {
        // At 10:00 local the day spans exactly 10 hours.
        let window = RangeSpec::SinceLocalMidnight.window(local(10, 0));
        assert_eq!(window.query_hours, 10);

        // A partial hour rounds up.
        let window = RangeSpec::SinceLocalMidnight.window(local(10, 30));
        assert_eq!(window.query_hours, 11);
    }

    #[test]
    fn test_today_requests_at_least_one_hour() {
        let window = RangeSpec::SinceLocalMidnight.window(local(0, 5));
        assert_eq!(window.query_hours, 1);
    }

    #[test]
    fn test_today_cutoff_is_local_midnight() {
        let now = local(10, 0);
        let window = RangeSpec::SinceLocalMidnight.window(now);

        let midnight = Local.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(window.cutoff, midnight.with_timezone(&Utc));
    }

    #[test]
    fn test_today_cutoff_advances_across_rollover() {
        let before = RangeSpec::SinceLocalMidnight.cutoff(local(23, 59));
        let after = RangeSpec::SinceLocalMidnight
            .cutoff(Local.with_ymd_and_hms(2024, 6, 2, 0, 1, 0).unwrap());

        assert_eq!(after - before, Duration::days(1));
    }

    #[test]
    fn test_default_is_24_hours() {
        assert_eq!(RangeSpec::default(), RangeSpec::Hours(24));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!("24".parse::<RangeSpec>().unwrap(), RangeSpec::Hours(24));
        assert_eq!(
            "today".parse::<RangeSpec>().unwrap(),
            RangeSpec::SinceLocalMidnight
        );
        assert!("0".parse::<RangeSpec>().is_err());
        assert!("7".parse::<RangeSpec>().is_err());
        assert!("yesterday".parse::<RangeSpec>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(RangeSpec::Hours(48).to_string(), "48h");
        assert_eq!(RangeSpec::SinceLocalMidnight.to_string(), "today");
    }
}
