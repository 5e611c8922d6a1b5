//! General time utility functions

use std::time::Instant;

/// Seconds from `start` to `now` on the monotonic clock, zero if `now` is earlier.
pub fn seconds_between(start: Instant, now: Instant) -> f64 {
    now.saturating_duration_since(start).as_secs_f64()
}

/// Format a UTC time the way the experiment logs display wall-clock times, for example
/// `Tue Mar  7 14:02:51 2023`.
pub fn format_wall_clock(time: &chrono::DateTime<chrono::Utc>) -> String {
    time.format("%a %b %e %H:%M:%S %Y").to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    use std::time::Duration;

    #[test]
    fn test_seconds_between() {
        let start = Instant::now();
        let later = start + Duration::from_millis(1500);

        assert_eq!(seconds_between(start, later), 1.5);
        assert_eq!(seconds_between(later, start), 0.0);
    }

    #[test]
    fn test_format_wall_clock() {
        let t = chrono::Utc.ymd(2023, 3, 7).and_hms(14, 2, 51);
        assert_eq!(format_wall_clock(&t), "Tue Mar  7 14:02:51 2023");
    }
}
