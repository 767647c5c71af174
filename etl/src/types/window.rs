use std::fmt;
use std::time::Duration;

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use sha2::{Digest, Sha256};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Half-open processing interval `[start, end)` over the staging log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    /// Creates a window, rejecting empty or inverted intervals.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> EtlResult<Self> {
        if start >= end {
            bail!(
                ErrorKind::ConfigError,
                "Window start must precede its end",
                format!("start {start} is not before end {end}")
            );
        }

        Ok(Self { start, end })
    }

    /// Creates the window of the given length that ends at `end`.
    pub fn ending_at(end: DateTime<Utc>, length: Duration) -> EtlResult<Self> {
        let length = to_time_delta(length)?;
        Self::new(end - length, end)
    }

    /// Returns the most recent fully elapsed window, aligned to multiples of `length`
    /// since the Unix epoch.
    pub fn latest_completed(now: DateTime<Utc>, length: Duration) -> EtlResult<Self> {
        let delta = to_time_delta(length)?;
        let end = now.duration_trunc(delta).map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Window boundary could not be aligned",
                err
            )
        })?;

        Self::new(end - delta, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns whether `timestamp` falls inside the window.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Returns the adjacent window of the same length that starts at this window's end.
    pub fn next(&self) -> Self {
        Self {
            start: self.end,
            end: self.end + (self.end - self.start),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

fn to_time_delta(length: Duration) -> EtlResult<TimeDelta> {
    let delta = TimeDelta::from_std(length).map_err(|err| {
        etl_error!(ErrorKind::ConfigError, "Window length is out of range", err)
    })?;

    if delta <= TimeDelta::zero() {
        bail!(ErrorKind::ConfigError, "Window length must be positive");
    }

    Ok(delta)
}

/// Idempotency key of one window of one pipeline.
///
/// The first 32 hex characters of `SHA-256("{pipeline}:{window_end}")`, where the window end
/// is rendered as RFC 3339 with second precision and a `Z` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowFingerprint(String);

impl WindowFingerprint {
    pub const LEN: usize = 32;

    pub fn new(pipeline_name: &str, window_end: DateTime<Utc>) -> Self {
        let input = format!(
            "{pipeline_name}:{}",
            window_end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let digest = Sha256::digest(input.as_bytes());

        let mut hex = format!("{digest:x}");
        hex.truncate(Self::LEN);

        Self(hex)
    }

    /// Wraps a fingerprint read back from a state store.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 12, hour, minute, second)
            .unwrap()
    }

    #[test]
    fn fingerprint_matches_known_values() {
        assert_eq!(
            WindowFingerprint::new("property_collapsing_etl", at(0, 15, 0)).as_str(),
            "da7e7b9270731f4f3614dead25bfd68c"
        );
        assert_eq!(
            WindowFingerprint::new("property_collapsing_etl", at(0, 30, 0)).as_str(),
            "6c4293b35dc9ac5f5d65859a33cc56cb"
        );
        assert_eq!(
            WindowFingerprint::new("other_pipeline", at(0, 15, 0)).as_str(),
            "455cadfbc47f496f0774ecb6ef8a2a29"
        );
    }

    #[test]
    fn fingerprint_ignores_sub_second_precision() {
        let end = at(0, 15, 0);
        let with_millis = end + TimeDelta::milliseconds(250);

        assert_eq!(
            WindowFingerprint::new("p", end),
            WindowFingerprint::new("p", with_millis)
        );
    }

    #[test]
    fn latest_completed_window_is_aligned() {
        let window = Window::latest_completed(at(0, 22, 41), FIFTEEN_MINUTES).unwrap();

        assert_eq!(window.start(), at(0, 0, 0));
        assert_eq!(window.end(), at(0, 15, 0));
        assert_eq!(window.next().start(), at(0, 15, 0));
        assert_eq!(window.next().end(), at(0, 30, 0));
    }

    #[test]
    fn window_on_boundary_ends_at_boundary() {
        let window = Window::latest_completed(at(0, 30, 0), FIFTEEN_MINUTES).unwrap();

        assert_eq!(window, Window::ending_at(at(0, 30, 0), FIFTEEN_MINUTES).unwrap());
        assert!(window.contains(at(0, 15, 0)));
        assert!(!window.contains(at(0, 30, 0)));
    }

    #[test]
    fn rejects_inverted_and_empty_windows() {
        assert_eq!(
            Window::new(at(0, 15, 0), at(0, 15, 0)).unwrap_err().kind(),
            ErrorKind::ConfigError
        );
        assert!(Window::ending_at(at(0, 15, 0), Duration::ZERO).is_err());
    }
}
