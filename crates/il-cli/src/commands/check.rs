//! Check command: validates the configuration and prints what is in effect.

use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;

/// Validates `config` and writes the effective node settings as JSON.
pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    config
        .node
        .validate()
        .context("invalid node configuration")?;
    writeln!(writer, "{}", serde_json::to_string_pretty(&config.node)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_core::NodeSettings;
    use serde_json::Value;

    #[test]
    fn test_prints_effective_settings() {
        let config = Config {
            node: NodeSettings {
                by_key: true,
                timeout: Some(5.0),
                ..NodeSettings::default()
            },
        };
        let mut out = Vec::new();

        run(&mut out, &config).unwrap();

        let printed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed["by_key"], Value::Bool(true));
        assert_eq!(printed["timeout"], Value::from(5.0));
        assert_eq!(printed["duration_field"], Value::from("payload"));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let config = Config {
            node: NodeSettings {
                minimum: Some(10.0),
                maximum: Some(1.0),
                ..NodeSettings::default()
            },
        };
        let mut out = Vec::new();

        let err = run(&mut out, &config).unwrap_err();

        assert_eq!(err.to_string(), "invalid node configuration");
        assert!(out.is_empty());
    }
}
