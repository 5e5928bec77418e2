//! Node configuration.
//!
//! [`NodeSettings`] is the loosely typed form read from files and the
//! environment. [`NodeConfig`] is the validated, immutable form the engine runs
//! on: every amount is resolved to a [`Duration`] and every field name is a
//! parsed [`FieldPath`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::{EnvelopeError, FieldPath};
use crate::format::{FormatError, OutputMode, as_millis_f64, duration_from_millis};

/// Configuration errors, reported once at construction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Both bounds were set and the minimum exceeds the maximum.
    #[error("minimum ({minimum_ms}ms) is greater than maximum ({maximum_ms}ms)")]
    MinimumAboveMaximum { minimum_ms: f64, maximum_ms: f64 },

    /// An amount was negative or not a number.
    #[error("invalid {setting}: {source}")]
    InvalidAmount {
        setting: &'static str,
        #[source]
        source: FormatError,
    },

    /// A field name could not be parsed as a path.
    #[error("invalid {setting}: {source}")]
    InvalidField {
        setting: &'static str,
        #[source]
        source: EnvelopeError,
    },
}

/// Unit attached to a configured amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeUnit {
    #[default]
    #[serde(rename = "msecs", alias = "ms", alias = "milliseconds")]
    Milliseconds,
    #[serde(rename = "secs", alias = "s", alias = "seconds")]
    Seconds,
    #[serde(rename = "mins", alias = "m", alias = "minutes")]
    Minutes,
    #[serde(rename = "hours", alias = "h")]
    Hours,
}

impl TimeUnit {
    /// Milliseconds per unit.
    pub const fn millis(self) -> f64 {
        match self {
            Self::Milliseconds => 1.0,
            Self::Seconds => 1_000.0,
            Self::Minutes => 60_000.0,
            Self::Hours => 3_600_000.0,
        }
    }
}

/// Raw node settings as read from configuration sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Measure each topic independently.
    pub by_key: bool,
    /// Message field holding the topic.
    pub key_field: String,
    pub minimum: Option<f64>,
    pub minimum_unit: TimeUnit,
    pub maximum: Option<f64>,
    pub maximum_unit: TimeUnit,
    /// Accumulation window; unset or zero emits every interval immediately.
    pub window: Option<f64>,
    pub window_unit: TimeUnit,
    /// Emit a zero duration when a window closes without contributions.
    pub emit_on_empty_window: bool,
    /// Emit immediate intervals that measured exactly zero.
    pub emit_zero_intervals: bool,
    /// Inactivity timeout; unset or zero disables it.
    pub timeout: Option<f64>,
    pub timeout_unit: TimeUnit,
    /// Keep notifying every timeout period until a message arrives.
    pub repeat_timeout: bool,
    /// Measure the first message against engine startup.
    pub seed_from_startup: bool,
    /// Honour the reset flag on incoming messages.
    pub reset_enabled: bool,
    /// Message field holding the reset flag.
    pub reset_field: String,
    pub output_mode: OutputMode,
    /// Message field the duration is written to.
    pub duration_field: String,
    /// Optional message field for the wall-clock label.
    pub timestamp_field: Option<String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            by_key: false,
            key_field: "topic".to_string(),
            minimum: None,
            minimum_unit: TimeUnit::Milliseconds,
            maximum: None,
            maximum_unit: TimeUnit::Milliseconds,
            window: None,
            window_unit: TimeUnit::Milliseconds,
            emit_on_empty_window: false,
            emit_zero_intervals: false,
            timeout: None,
            timeout_unit: TimeUnit::Milliseconds,
            repeat_timeout: false,
            seed_from_startup: false,
            reset_enabled: false,
            reset_field: "reset".to_string(),
            output_mode: OutputMode::Milliseconds,
            duration_field: "payload".to_string(),
            timestamp_field: None,
        }
    }
}

impl NodeSettings {
    /// Validates the settings into a [`NodeConfig`].
    pub fn validate(&self) -> Result<NodeConfig, ConfigError> {
        NodeConfig::try_from(self)
    }
}

/// Validated node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    by_key: bool,
    key_field: FieldPath,
    minimum: Option<Duration>,
    maximum: Option<Duration>,
    window: Option<Duration>,
    emit_on_empty_window: bool,
    emit_zero_intervals: bool,
    timeout: Option<Duration>,
    repeat_timeout: bool,
    seed_from_startup: bool,
    reset_enabled: bool,
    reset_field: FieldPath,
    output_mode: OutputMode,
    duration_field: FieldPath,
    timestamp_field: Option<FieldPath>,
}

impl TryFrom<&NodeSettings> for NodeConfig {
    type Error = ConfigError;

    fn try_from(settings: &NodeSettings) -> Result<Self, Self::Error> {
        let minimum = resolve_amount("minimum", settings.minimum, settings.minimum_unit)?;
        let maximum = resolve_amount("maximum", settings.maximum, settings.maximum_unit)?;
        if let (Some(min), Some(max)) = (minimum, maximum) {
            if min > max {
                return Err(ConfigError::MinimumAboveMaximum {
                    minimum_ms: as_millis_f64(min),
                    maximum_ms: as_millis_f64(max),
                });
            }
        }

        Ok(Self {
            by_key: settings.by_key,
            key_field: parse_field("key_field", &settings.key_field)?,
            minimum,
            maximum,
            window: resolve_amount("window", settings.window, settings.window_unit)?,
            emit_on_empty_window: settings.emit_on_empty_window,
            emit_zero_intervals: settings.emit_zero_intervals,
            timeout: resolve_amount("timeout", settings.timeout, settings.timeout_unit)?,
            repeat_timeout: settings.repeat_timeout,
            seed_from_startup: settings.seed_from_startup,
            reset_enabled: settings.reset_enabled,
            reset_field: parse_field("reset_field", &settings.reset_field)?,
            output_mode: settings.output_mode,
            duration_field: parse_field("duration_field", &settings.duration_field)?,
            timestamp_field: settings
                .timestamp_field
                .as_deref()
                .map(|field| parse_field("timestamp_field", field))
                .transpose()?,
        })
    }
}

impl TryFrom<NodeSettings> for NodeConfig {
    type Error = ConfigError;

    fn try_from(settings: NodeSettings) -> Result<Self, Self::Error> {
        Self::try_from(&settings)
    }
}

impl NodeConfig {
    pub const fn by_key(&self) -> bool {
        self.by_key
    }

    pub const fn key_field(&self) -> &FieldPath {
        &self.key_field
    }

    pub const fn minimum(&self) -> Option<Duration> {
        self.minimum
    }

    pub const fn maximum(&self) -> Option<Duration> {
        self.maximum
    }

    pub const fn window(&self) -> Option<Duration> {
        self.window
    }

    pub const fn emit_on_empty_window(&self) -> bool {
        self.emit_on_empty_window
    }

    pub const fn emit_zero_intervals(&self) -> bool {
        self.emit_zero_intervals
    }

    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub const fn repeat_timeout(&self) -> bool {
        self.repeat_timeout
    }

    pub const fn seed_from_startup(&self) -> bool {
        self.seed_from_startup
    }

    pub const fn reset_enabled(&self) -> bool {
        self.reset_enabled
    }

    pub const fn reset_field(&self) -> &FieldPath {
        &self.reset_field
    }

    pub const fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub const fn duration_field(&self) -> &FieldPath {
        &self.duration_field
    }

    pub const fn timestamp_field(&self) -> Option<&FieldPath> {
        self.timestamp_field.as_ref()
    }

    /// Whether `value` passes the configured minimum and maximum.
    pub fn within_bounds(&self, value: Duration) -> bool {
        self.minimum.is_none_or(|min| value >= min) && self.maximum.is_none_or(|max| value <= max)
    }
}

/// Zero amounts mean "not configured".
fn resolve_amount(
    setting: &'static str,
    amount: Option<f64>,
    unit: TimeUnit,
) -> Result<Option<Duration>, ConfigError> {
    let Some(amount) = amount else {
        return Ok(None);
    };
    let duration = duration_from_millis(amount * unit.millis())
        .map_err(|source| ConfigError::InvalidAmount { setting, source })?;
    Ok((!duration.is_zero()).then_some(duration))
}

fn parse_field(setting: &'static str, field: &str) -> Result<FieldPath, ConfigError> {
    FieldPath::parse(field).map_err(|source| ConfigError::InvalidField { setting, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = NodeSettings::default().validate().unwrap();

        assert!(!config.by_key());
        assert_eq!(config.key_field().as_str(), "topic");
        assert_eq!(config.duration_field().as_str(), "payload");
        assert_eq!(config.window(), None);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.output_mode(), OutputMode::Milliseconds);
    }

    #[test]
    fn amounts_are_resolved_with_their_units() {
        let settings = NodeSettings {
            minimum: Some(2.0),
            minimum_unit: TimeUnit::Seconds,
            maximum: Some(1.5),
            maximum_unit: TimeUnit::Minutes,
            window: Some(1.0),
            window_unit: TimeUnit::Hours,
            timeout: Some(250.0),
            ..NodeSettings::default()
        };

        let config = settings.validate().unwrap();

        assert_eq!(config.minimum(), Some(Duration::from_secs(2)));
        assert_eq!(config.maximum(), Some(Duration::from_secs(90)));
        assert_eq!(config.window(), Some(Duration::from_secs(3_600)));
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn minimum_above_maximum_is_rejected() {
        let settings = NodeSettings {
            minimum: Some(2.0),
            minimum_unit: TimeUnit::Seconds,
            maximum: Some(500.0),
            ..NodeSettings::default()
        };

        let err = settings.validate().unwrap_err();

        assert_eq!(
            err,
            ConfigError::MinimumAboveMaximum {
                minimum_ms: 2_000.0,
                maximum_ms: 500.0
            }
        );
    }

    #[test]
    fn zero_amounts_mean_unset() {
        let settings = NodeSettings {
            minimum: Some(0.0),
            window: Some(0.0),
            timeout: Some(0.0),
            ..NodeSettings::default()
        };

        let config = settings.validate().unwrap();

        assert_eq!(config.minimum(), None);
        assert_eq!(config.window(), None);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let settings = NodeSettings {
            timeout: Some(-5.0),
            ..NodeSettings::default()
        };

        let err = settings.validate().unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidAmount {
                setting: "timeout",
                ..
            }
        ));
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let settings = NodeSettings {
            duration_field: "payload.".to_string(),
            ..NodeSettings::default()
        };

        let err = settings.validate().unwrap_err();

        assert!(err.to_string().starts_with("invalid duration_field"));
    }

    #[test]
    fn bounds_are_inclusive() {
        let config = NodeSettings {
            minimum: Some(100.0),
            maximum: Some(500.0),
            ..NodeSettings::default()
        }
        .validate()
        .unwrap();

        assert!(!config.within_bounds(Duration::from_millis(50)));
        assert!(config.within_bounds(Duration::from_millis(100)));
        assert!(config.within_bounds(Duration::from_millis(300)));
        assert!(config.within_bounds(Duration::from_millis(500)));
        assert!(!config.within_bounds(Duration::from_millis(600)));
    }

    #[test]
    fn settings_accept_legacy_unit_names() {
        let settings: NodeSettings =
            serde_json::from_str(r#"{"window": 2, "window_unit": "secs", "output_mode": "mills"}"#)
                .unwrap();

        let config = settings.validate().unwrap();

        assert_eq!(config.window(), Some(Duration::from_secs(2)));
        assert_eq!(config.output_mode(), OutputMode::Milliseconds);
    }
}
