//! CLI subcommand implementations.

pub mod intervals;
pub mod run;
pub mod status;
pub mod trace;

use chrono::Duration;

/// Formats a duration as `8h 05m`, or `42s` below one minute.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    if total < 60 {
        return format!("{total}s");
    }
    let total_minutes = total / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_picks_largest_unit() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::minutes(7)), "7m");
        assert_eq!(format_duration(Duration::minutes(8 * 60 + 5)), "8h 05m");
        assert_eq!(format_duration(Duration::seconds(-5)), "0s");
    }
}
