//! Format command: renders a millisecond value the way the node would.

use std::io::Write;

use anyhow::{Context, Result};
use il_core::{OutputMode, format_millis};
use serde_json::Value;

/// Writes `millis` formatted in `mode`. Strings are written bare, structured
/// values as pretty JSON.
pub fn run<W: Write>(writer: &mut W, millis: f64, mode: OutputMode) -> Result<()> {
    let value = format_millis(millis, mode).context("cannot format duration")?;
    match value {
        Value::String(text) => writeln!(writer, "{text}")?,
        other => writeln!(writer, "{}", serde_json::to_string_pretty(&other)?)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use serde_json::json;

    fn render(millis: f64, mode: OutputMode) -> String {
        let mut out = Vec::new();
        run(&mut out, millis, mode).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_milliseconds_mode() {
        assert_snapshot!(render(300.0, OutputMode::Milliseconds), @"300");
        assert_snapshot!(render(1.5, OutputMode::Milliseconds), @"1.5");
    }

    #[test]
    fn test_human_mode() {
        assert_snapshot!(render(90_000.0, OutputMode::Human), @"1m 30s");
        assert_snapshot!(render(250.0, OutputMode::Human), @"250ms");
    }

    #[test]
    fn test_breakdown_mode() {
        let rendered = render(3_723_004.0, OutputMode::Breakdown);
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            value,
            json!({
                "days": 0,
                "hours": 1,
                "minutes": 2,
                "seconds": 3,
                "milliseconds": 4,
                "microseconds": 0,
                "nanoseconds": 0
            })
        );
    }

    #[test]
    fn test_negative_input_is_rejected() {
        let mut out = Vec::new();
        let err = run(&mut out, -1.0, OutputMode::Human).unwrap_err();
        assert!(err.to_string().contains("cannot format duration"));
        assert!(out.is_empty());
    }
}
