//! Duration strings used throughout `rackgrid.toml`.
//!
//! A value is an unsigned integer followed by an optional unit: `ms`, `s`,
//! `m` or `h`. A bare number is seconds.

use std::time::Duration;

/// Parse `"500ms"`, `"10s"`, `"2m"`, `"1h"` or `"30"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().ok()?;
    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(n)),
        "ms" => Some(Duration::from_millis(n)),
        "m" => n.checked_mul(60).map(Duration::from_secs),
        "h" => n.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// Like [`parse_duration`], but zero is rejected.
///
/// Scheduler cadences and timeouts use this: a zero idle or up interval
/// turns the loop into a spin, and a zero probe timeout fails every probe.
pub fn parse_interval(s: &str) -> Option<Duration> {
    parse_duration(s).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_defaults_parse() {
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn longer_units_and_bare_seconds() {
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration(" 5 s "), Some(Duration::from_secs(5)));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for bad in ["", "soon", "-3s", "1.5s", "10 minutes", "s", "5d"] {
            assert_eq!(parse_duration(bad), None, "{bad:?}");
        }
        assert_eq!(parse_duration(&format!("{}h", u64::MAX)), None);
    }

    #[test]
    fn intervals_must_be_positive() {
        assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
        assert_eq!(parse_interval("0s"), None);
        assert_eq!(parse_interval("0ms"), None);
        assert_eq!(parse_interval("0"), None);
        assert_eq!(parse_interval("1ms"), Some(Duration::from_millis(1)));
    }
}
