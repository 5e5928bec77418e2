//! Output representations for measured durations.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: u128 = 24 * NANOS_PER_HOUR;

/// Errors for raw millisecond input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    /// The value was negative, NaN or infinite.
    #[error("duration must be a finite, non-negative number of milliseconds, got {value}")]
    InvalidMillis { value: f64 },
}

/// How a measured duration is written into output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Milliseconds as a JSON number.
    #[default]
    #[serde(alias = "mills", alias = "msecs")]
    Milliseconds,
    /// Compact human-readable text such as `1m 30s`.
    #[serde(alias = "humanized")]
    Human,
    /// An object with one integer field per time unit.
    #[serde(alias = "json")]
    Breakdown,
}

impl OutputMode {
    /// Canonical configuration spelling.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Milliseconds => "milliseconds",
            Self::Human => "human",
            Self::Breakdown => "breakdown",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for unknown output mode strings.
#[derive(Debug, Clone, Error)]
#[error("unknown output mode: {0}")]
pub struct UnknownOutputMode(String);

impl FromStr for OutputMode {
    type Err = UnknownOutputMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "milliseconds" | "mills" | "msecs" => Ok(Self::Milliseconds),
            "human" | "humanized" => Ok(Self::Human),
            "breakdown" | "json" => Ok(Self::Breakdown),
            _ => Err(UnknownOutputMode(s.to_string())),
        }
    }
}

/// A duration split into calendar-free units.
///
/// The components always sum back to the duration they were built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Breakdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub milliseconds: u64,
    pub microseconds: u64,
    pub nanoseconds: u64,
}

impl Breakdown {
    /// Decomposes a duration.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "every component except days is bounded by its unit size"
    )]
    pub fn from_duration(duration: Duration) -> Self {
        let mut rest = duration.as_nanos();
        let mut take = |unit: u128| {
            let value = rest / unit;
            rest %= unit;
            value as u64
        };

        let days = take(NANOS_PER_DAY);
        let hours = take(NANOS_PER_HOUR);
        let minutes = take(NANOS_PER_MINUTE);
        let seconds = take(NANOS_PER_SECOND);
        let milliseconds = take(NANOS_PER_MILLI);
        let microseconds = take(NANOS_PER_MICRO);
        let nanoseconds = take(1);

        Self {
            days,
            hours,
            minutes,
            seconds,
            milliseconds,
            microseconds,
            nanoseconds,
        }
    }

    /// Sums the components back into a duration.
    pub fn to_duration(&self) -> Duration {
        Duration::from_secs(
            self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds,
        ) + Duration::from_millis(self.milliseconds)
            + Duration::from_micros(self.microseconds)
            + Duration::from_nanos(self.nanoseconds)
    }
}

/// Converts fractional milliseconds into a duration.
pub fn duration_from_millis(millis: f64) -> Result<Duration, FormatError> {
    if !millis.is_finite() || millis < 0.0 {
        return Err(FormatError::InvalidMillis { value: millis });
    }
    Duration::try_from_secs_f64(millis / 1_000.0)
        .map_err(|_| FormatError::InvalidMillis { value: millis })
}

/// Duration in fractional milliseconds.
#[allow(clippy::cast_precision_loss)]
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Formats a duration in the requested representation.
pub fn format(duration: Duration, mode: OutputMode) -> Value {
    match mode {
        OutputMode::Milliseconds => millis_value(duration),
        OutputMode::Human => Value::String(humanize(duration)),
        OutputMode::Breakdown => {
            let breakdown = Breakdown::from_duration(duration);
            serde_json::to_value(breakdown).unwrap_or(Value::Null)
        }
    }
}

/// Formats raw milliseconds, rejecting negative or non-finite input.
pub fn format_millis(millis: f64, mode: OutputMode) -> Result<Value, FormatError> {
    duration_from_millis(millis).map(|duration| format(duration, mode))
}

/// Whole milliseconds stay integers so `300ms` is written as `300`, not `300.0`.
fn millis_value(duration: Duration) -> Value {
    let nanos = duration.as_nanos();
    if nanos % NANOS_PER_MILLI == 0 {
        if let Ok(millis) = u64::try_from(nanos / NANOS_PER_MILLI) {
            return Value::from(millis);
        }
    }
    Value::from(as_millis_f64(duration))
}

/// Renders a compact description such as `2h 5m`, `1m 30.5s` or `350ms`.
///
/// Zero-valued units are skipped. Seconds keep one decimal; anything under a
/// second is shown in whole milliseconds.
pub fn humanize(duration: Duration) -> String {
    let millis = (duration.as_nanos() + NANOS_PER_MILLI / 2) / NANOS_PER_MILLI;
    if millis < 1_000 {
        return format!("{millis}ms");
    }

    let tenths = (millis + 50) / 100;
    let days = tenths / 864_000;
    let hours = tenths / 36_000 % 24;
    let minutes = tenths / 600 % 60;
    let second_tenths = tenths % 600;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if second_tenths > 0 {
        let whole = second_tenths / 10;
        let fraction = second_tenths % 10;
        if fraction == 0 {
            parts.push(format!("{whole}s"));
        } else {
            parts.push(format!("{whole}.{fraction}s"));
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use serde_json::json;

    #[test]
    fn milliseconds_mode_keeps_whole_values_integral() {
        assert_eq!(
            format(Duration::from_millis(300), OutputMode::Milliseconds),
            json!(300)
        );
        assert_eq!(
            format(Duration::from_micros(1_500), OutputMode::Milliseconds),
            json!(1.5)
        );
    }

    #[test]
    fn human_mode_examples() {
        assert_snapshot!(humanize(Duration::from_millis(90_000)), @"1m 30s");
        assert_snapshot!(humanize(Duration::from_millis(90_500)), @"1m 30.5s");
        assert_snapshot!(humanize(Duration::from_millis(350)), @"350ms");
        assert_snapshot!(humanize(Duration::ZERO), @"0ms");
        assert_snapshot!(humanize(Duration::from_millis(3_600_000)), @"1h");
        assert_snapshot!(humanize(Duration::from_millis(93_784_000)), @"1d 2h 3m 4s");
    }

    #[test]
    fn human_mode_carries_rounded_seconds() {
        // 59.96s rounds to a full minute rather than "60s"
        assert_eq!(humanize(Duration::from_millis(59_960)), "1m");
    }

    #[test]
    fn breakdown_of_zero_is_all_zero() {
        assert_eq!(
            format(Duration::ZERO, OutputMode::Breakdown),
            json!({
                "days": 0,
                "hours": 0,
                "minutes": 0,
                "seconds": 0,
                "milliseconds": 0,
                "microseconds": 0,
                "nanoseconds": 0
            })
        );
    }

    #[test]
    fn breakdown_splits_units() {
        let duration = Duration::from_millis(93_784_005) + Duration::from_nanos(6_007);
        let breakdown = Breakdown::from_duration(duration);

        assert_eq!(breakdown.days, 1);
        assert_eq!(breakdown.hours, 2);
        assert_eq!(breakdown.minutes, 3);
        assert_eq!(breakdown.seconds, 4);
        assert_eq!(breakdown.milliseconds, 5);
        assert_eq!(breakdown.microseconds, 6);
        assert_eq!(breakdown.nanoseconds, 7);
    }

    #[test]
    fn breakdown_sums_back_to_input() {
        for millis in [0, 1, 999, 1_000, 59_999, 90_000, 3_599_999, 86_400_000, 123_456_789] {
            let duration = Duration::from_millis(millis);
            assert_eq!(
                Breakdown::from_duration(duration).to_duration(),
                duration,
                "breakdown of {millis}ms did not sum back"
            );
        }
    }

    #[test]
    fn format_millis_rejects_invalid_input() {
        assert!(format_millis(-1.0, OutputMode::Human).is_err());
        assert!(format_millis(f64::NAN, OutputMode::Human).is_err());
        assert!(format_millis(f64::INFINITY, OutputMode::Human).is_err());
        assert_eq!(
            format_millis(90_000.0, OutputMode::Human).unwrap(),
            json!("1m 30s")
        );
    }

    #[test]
    fn output_mode_accepts_legacy_spellings() {
        assert_eq!("mills".parse::<OutputMode>().unwrap(), OutputMode::Milliseconds);
        assert_eq!("json".parse::<OutputMode>().unwrap(), OutputMode::Breakdown);
        assert_eq!("human".parse::<OutputMode>().unwrap(), OutputMode::Human);
        assert!("yaml".parse::<OutputMode>().is_err());

        let parsed: OutputMode = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(parsed, OutputMode::Breakdown);
    }
}
