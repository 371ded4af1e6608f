//! Wall-clock arithmetic for the daily slot.

use chrono::{DateTime, Days, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Returns the first occurrence of local `time` in `tz` strictly after `now`.
///
/// If `time` falls into a DST gap on some day, that day's slot moves to the
/// first valid local minute after it. If it is ambiguous, the earlier instant
/// is used.
#[must_use]
pub fn next_fire_after(now: DateTime<Utc>, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();

    (0..=2)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|date| resolve_local(date.and_time(time), tz))
        .find(|candidate| *candidate > now)
        .unwrap_or(now + TimeDelta::days(1))
}

/// Maps a local wall-clock time to UTC.
fn resolve_local(local: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    // Gaps are at most a few hours wide; scan forward a minute at a time.
    (0..=24 * 60).find_map(|minutes| {
        let shifted = local + TimeDelta::minutes(minutes);
        tz.from_local_datetime(&shifted)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Formats an instant as local time for display.
#[must_use]
pub fn format_local(instant: DateTime<Utc>, tz: Tz) -> String {
    instant
        .with_timezone(&tz)
        .format("%Y-%m-%d %H:%M %Z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_later_today() {
        let next = next_fire_after(utc(2024, 5, 1, 7, 0), hm(9, 0), Tz::UTC);
        assert_eq!(next, utc(2024, 5, 1, 9, 0));
    }

    #[test]
    fn test_already_passed_rolls_to_tomorrow() {
        let next = next_fire_after(utc(2024, 5, 1, 9, 30), hm(9, 0), Tz::UTC);
        assert_eq!(next, utc(2024, 5, 2, 9, 0));
    }

    #[test]
    fn test_exact_slot_is_not_repeated() {
        let now = utc(2024, 5, 1, 9, 0);
        assert_eq!(next_fire_after(now, hm(9, 0), Tz::UTC), utc(2024, 5, 2, 9, 0));
    }

    #[test]
    fn test_fixed_offset_zone() {
        // Riyadh is UTC+3 all year.
        let next = next_fire_after(utc(2024, 5, 1, 0, 0), hm(9, 0), chrono_tz::Asia::Riyadh);
        assert_eq!(next, utc(2024, 5, 1, 6, 0));
    }

    #[test]
    fn test_local_date_differs_from_utc_date() {
        // 22:00 UTC on May 1st is already May 2nd in Tokyo.
        let next = next_fire_after(utc(2024, 5, 1, 22, 0), hm(8, 0), chrono_tz::Asia::Tokyo);
        assert_eq!(next, utc(2024, 5, 1, 23, 0));
    }

    #[test]
    fn test_dst_gap_moves_forward() {
        // New York skips 02:00-03:00 on 2024-03-10.
        let next = next_fire_after(
            utc(2024, 3, 10, 5, 0),
            hm(2, 30),
            chrono_tz::America::New_York,
        );
        assert_eq!(next, utc(2024, 3, 10, 7, 0));
    }

    #[test]
    fn test_dst_overlap_uses_earliest() {
        // 01:30 happens twice in New York on 2024-11-03; the EDT one is first.
        let next = next_fire_after(
            utc(2024, 11, 3, 4, 0),
            hm(1, 30),
            chrono_tz::America::New_York,
        );
        assert_eq!(next, utc(2024, 11, 3, 5, 30));
    }

    #[test]
    fn test_format_local() {
        let text = format_local(utc(2024, 5, 1, 6, 0), chrono_tz::Europe::London);
        assert_eq!(text, "2024-05-01 07:00 BST");
    }
}
