//! Watcher configuration.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// What a `true` slot in an availability vector means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SignalMode {
    /// The course refreshed successfully this cycle.
    #[default]
    RefreshSucceeded,
    /// The course refreshed successfully and went from closed to open.
    BecameAvailable,
}

/// What happens when a subscriber's buffer is full at submit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Evict the stalest undelivered vector to make room.
    #[default]
    DropOldest,
    /// Discard the new vector for that subscriber.
    DropNewest,
}

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Time between the starts of consecutive refresh cycles.
    pub period: Duration,
    /// Delay before the first cycle.
    pub initial_delay: Duration,
    pub signal_mode: SignalMode,
    /// Per-subscriber buffered vectors awaiting credit.
    pub subscriber_capacity: usize,
    /// Per-subscriber buffered error notifications.
    pub error_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            initial_delay: Duration::ZERO,
            signal_mode: SignalMode::RefreshSucceeded,
            subscriber_capacity: 16,
            error_capacity: 16,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl WatcherConfig {
    /// Default configuration with the given period.
    #[must_use]
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }
}

fn iso_duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
            .expect("duration pattern is a valid regex")
    })
}

/// Parses a polling period.
///
/// Accepts ISO-8601 durations (`PT30S`, `PT1M30S`, `P1DT2H`) or a bare number
/// of seconds (`45`). Zero-length and unparsable periods yield `None`.
#[must_use]
pub fn parse_period(text: &str) -> Option<Duration> {
    let text = text.trim();

    let period = if let Ok(secs) = text.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        // "P" and "PT" alone carry no components.
        if text.len() <= 2 || text.to_ascii_uppercase().ends_with('T') {
            return None;
        }
        let caps = iso_duration_regex().captures(text)?;
        let part = |i: usize| -> Option<u64> {
            caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
        };

        let whole_secs = part(1)?
            .checked_mul(86_400)?
            .checked_add(part(2)?.checked_mul(3_600)?)?
            .checked_add(part(3)?.checked_mul(60)?)?;
        let secs = caps.get(4).map_or(Some(0.0), |m| m.as_str().parse::<f64>().ok())?;

        Duration::from_secs(whole_secs).checked_add(Duration::try_from_secs_f64(secs).ok()?)?
    };

    (!period.is_zero()).then_some(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_durations() {
        assert_eq!(parse_period("PT30S"), Some(Duration::from_secs(30)));
        assert_eq!(parse_period("PT1M30S"), Some(Duration::from_secs(90)));
        assert_eq!(parse_period("pt5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_period("P1DT2H"), Some(Duration::from_secs(93_600)));
        assert_eq!(parse_period("PT0.5S"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_period("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_period(" 10 "), Some(Duration::from_secs(10)));
    }

    #[test]
    fn rejects_empty_zero_and_garbage() {
        for bad in ["", "0", "PT0S", "P", "PT", "P1DT", "30 seconds", "-5", "PT-1S", "1h"] {
            assert_eq!(parse_period(bad), None, "accepted {bad:?}");
        }
    }

    #[test]
    fn defaults_follow_reference_behavior() {
        let cfg = WatcherConfig::default();
        assert_eq!(cfg.initial_delay, Duration::ZERO);
        assert_eq!(cfg.signal_mode, SignalMode::RefreshSucceeded);
        assert!(cfg.subscriber_capacity >= 1);
    }
}
