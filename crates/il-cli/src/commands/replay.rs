//! Replay command: drives the engine in virtual time from recorded offsets.
//!
//! Input is JSON lines of the form `{"at_ms": 250, "message": {...}}`. Offsets
//! are milliseconds from the start of the replay and must never decrease.
//! Timers fire at their exact virtual deadlines, so the output is fully
//! deterministic for a given input.

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use il_core::format::duration_from_millis;
use il_core::{NodeConfig, RecordingSink, Simulation};
use serde::Deserialize;
use serde_json::Value;

/// One recorded message.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    at_ms: f64,
    message: Value,
}

/// How a replay is run.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Keep virtual time running to this offset after the last record.
    pub until: Option<Duration>,
    /// Wall-clock time of offset zero.
    pub origin: Option<DateTime<Utc>>,
}

/// Totals reported after a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub records: usize,
    pub emissions: usize,
    pub diagnostics: usize,
}

/// Replays `reader` and writes every emission to `writer` as a JSON line.
pub fn run<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    config: NodeConfig,
    options: &ReplayOptions,
) -> Result<ReplaySummary> {
    let origin = options.origin.unwrap_or_else(Utc::now);
    let mut simulation = Simulation::with_wall_origin(config, origin);
    let mut sink = RecordingSink::new();
    let mut summary = ReplaySummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.context("failed to read replay input")?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ReplayRecord = serde_json::from_str(&line)
            .with_context(|| format!("line {line_number}: malformed replay record"))?;
        let at = duration_from_millis(record.at_ms)
            .with_context(|| format!("line {line_number}: invalid offset"))?;
        if at < simulation.now() {
            bail!(
                "line {line_number}: offset {}ms is earlier than the previous record",
                record.at_ms
            );
        }

        simulation
            .send_at(at, record.message, &mut sink)
            .with_context(|| format!("line {line_number}: offset {}ms is out of range", record.at_ms))?;
        summary.records += 1;
        summary.emissions += write_emissions(writer, &mut sink)?;
    }

    if let Some(until) = options.until.filter(|until| *until > simulation.now()) {
        simulation
            .advance_to(until, &mut sink)
            .context("replay horizon is out of range")?;
        summary.emissions += write_emissions(writer, &mut sink)?;
    }

    simulation.shutdown();
    summary.diagnostics = sink.diagnostics.len();
    writer.flush()?;

    tracing::debug!(?summary, "replay finished");
    Ok(summary)
}

fn write_emissions<W: Write>(writer: &mut W, sink: &mut RecordingSink) -> Result<usize> {
    let emissions = sink.drain();
    for emission in &emissions {
        serde_json::to_writer(&mut *writer, emission).context("failed to write emission")?;
        writeln!(writer)?;
    }
    Ok(emissions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_core::NodeSettings;
    use insta::assert_snapshot;

    fn replay(settings: &NodeSettings, input: &str, options: &ReplayOptions) -> (String, ReplaySummary) {
        let config = settings.validate().unwrap();
        let mut out = Vec::new();
        let summary = run(input.as_bytes(), &mut out, config, options).unwrap();
        (String::from_utf8(out).unwrap(), summary)
    }

    #[test]
    fn test_replays_intervals() {
        let input = r#"
{"at_ms": 0, "message": {"payload": "a"}}
{"at_ms": 200, "message": {"payload": "b"}}
{"at_ms": 450, "message": {"payload": "c"}}
"#;

        let (out, summary) = replay(&NodeSettings::default(), input, &ReplayOptions::default());

        assert_snapshot!(out, @r#"
        {"key":"all_topics","output":"interval","message":{"payload":200}}
        {"key":"all_topics","output":"interval","message":{"payload":250}}
        "#);
        assert_eq!(
            summary,
            ReplaySummary {
                records: 3,
                emissions: 2,
                diagnostics: 0
            }
        );
    }

    #[test]
    fn test_until_lets_timers_fire() {
        let settings = NodeSettings {
            by_key: true,
            timeout: Some(500.0),
            ..NodeSettings::default()
        };
        let input = r#"{"at_ms": 100, "message": {"topic": "door"}}"#;
        let options = ReplayOptions {
            until: Some(Duration::from_secs(2)),
            origin: None,
        };

        let (out, _) = replay(&settings, input, &options);

        assert_snapshot!(out, @r#"{"key":"door","output":"timeout","message":{"payload":500,"topic":"door"}}"#);
    }

    #[test]
    fn test_without_until_pending_timers_are_dropped() {
        let settings = NodeSettings {
            timeout: Some(500.0),
            ..NodeSettings::default()
        };
        let input = r#"{"at_ms": 100, "message": {}}"#;

        let (out, summary) = replay(&settings, input, &ReplayOptions::default());

        assert!(out.is_empty());
        assert_eq!(summary.emissions, 0);
    }

    #[test]
    fn test_timestamp_label_uses_origin() {
        let settings = NodeSettings {
            timestamp_field: Some("at".to_string()),
            ..NodeSettings::default()
        };
        let input = r#"
{"at_ms": 0, "message": {}}
{"at_ms": 1500, "message": {}}
"#;
        let origin = "2024-05-01T12:00:00Z".parse().unwrap();
        let options = ReplayOptions {
            until: None,
            origin: Some(origin),
        };

        let (out, _) = replay(&settings, input, &options);

        assert_snapshot!(out, @r#"{"key":"all_topics","output":"interval","message":{"at":"2024-05-01T12:00:00.000Z","payload":1500}}"#);
    }

    #[test]
    fn test_decreasing_offsets_are_rejected() {
        let config = NodeSettings::default().validate().unwrap();
        let input = "{\"at_ms\": 100, \"message\": {}}\n{\"at_ms\": 50, \"message\": {}}\n";
        let mut out = Vec::new();

        let err = run(input.as_bytes(), &mut out, config, &ReplayOptions::default()).unwrap_err();

        assert_snapshot!(err.to_string(), @"line 2: offset 50ms is earlier than the previous record");
    }

    #[test]
    fn test_unreachable_offset_is_an_error() {
        let config = NodeSettings::default().validate().unwrap();
        let input = "{\"at_ms\": 0, \"message\": {}}\n{\"at_ms\": 1e22, \"message\": {}}\n";
        let mut out = Vec::new();

        let err = run(input.as_bytes(), &mut out, config, &ReplayOptions::default()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "line 2: offset 10000000000000000000000ms is out of range"
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_unreachable_until_is_an_error() {
        let settings = NodeSettings {
            timeout: Some(100.0),
            ..NodeSettings::default()
        };
        let config = settings.validate().unwrap();
        let input = r#"{"at_ms": 0, "message": {}}"#;
        let options = ReplayOptions {
            until: Some(Duration::MAX),
            origin: None,
        };
        let mut out = Vec::new();

        let err = run(input.as_bytes(), &mut out, config, &options).unwrap_err();

        assert_eq!(err.to_string(), "replay horizon is out of range");
        assert!(out.is_empty());
    }

    #[test]
    fn test_malformed_record_reports_line() {
        let config = NodeSettings::default().validate().unwrap();
        let input = "{\"at_ms\": 0, \"message\": {}}\nnot json\n";
        let mut out = Vec::new();

        let err = run(input.as_bytes(), &mut out, config, &ReplayOptions::default()).unwrap_err();

        assert_eq!(err.to_string(), "line 2: malformed replay record");
    }
}
