//! Run command: measures live JSON-lines input in real time.
//!
//! Every input line is one message. Emissions are written as JSON lines in the
//! order the node produces them. End of input shuts the node down, cancelling
//! any pending window or timeout.

use anyhow::{Context, Result};
use il_core::NodeConfig;
use il_runtime::{IntervalNode, NodeOutput};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Runs the node over stdin and stdout until stdin closes.
pub fn run(config: NodeConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(serve(config, tokio::io::stdin(), tokio::io::stdout()))
}

/// Feeds `input` lines to a node and writes its emissions to `output`.
pub async fn serve<R, W>(config: NodeConfig, input: R, mut output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut node = IntervalNode::spawn_with_config(config);
    let sender = node.sender();
    let mut lines = BufReader::new(input).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(envelope) => sender.send(envelope)?,
                    Err(err) => tracing::warn!(%err, "skipping malformed input line"),
                }
            }
            Some(produced) = node.recv() => write_output(&mut output, &produced).await?,
        }
    }

    node.shutdown().await?;
    while let Some(produced) = node.recv().await {
        write_output(&mut output, &produced).await?;
    }
    output.flush().await?;
    Ok(())
}

async fn write_output<W: AsyncWrite + Unpin>(output: &mut W, produced: &NodeOutput) -> Result<()> {
    match produced {
        NodeOutput::Emission(emission) => {
            let mut line = serde_json::to_vec(emission)?;
            line.push(b'\n');
            output
                .write_all(&line)
                .await
                .context("failed to write emission")?;
            output.flush().await?;
        }
        NodeOutput::Diagnostic { diagnostic } => {
            tracing::debug!(%diagnostic, "node diagnostic");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_core::NodeSettings;

    fn lines(out: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_emits_one_interval_per_following_message() {
        let config = NodeSettings {
            emit_zero_intervals: true,
            ..NodeSettings::default()
        }
        .validate()
        .unwrap();
        let input = b"{\"n\": 1}\n\n{\"n\": 2}\n{\"n\": 3}\n".as_slice();
        let mut out = Vec::new();

        serve(config, input, &mut out).await.unwrap();

        let emitted = lines(&out);
        assert_eq!(emitted.len(), 2);
        for line in &emitted {
            assert_eq!(line["output"], "interval");
            assert_eq!(line["key"], "all_topics");
            assert!(line["message"]["payload"].is_number());
        }
        assert_eq!(emitted[0]["message"]["n"], 2);
        assert_eq!(emitted[1]["message"]["n"], 3);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let config = NodeSettings {
            emit_zero_intervals: true,
            ..NodeSettings::default()
        }
        .validate()
        .unwrap();
        let input = b"{\"n\": 1}\nnot json\n{\"n\": 2}\n".as_slice();
        let mut out = Vec::new();

        serve(config, input, &mut out).await.unwrap();

        assert_eq!(lines(&out).len(), 1);
    }

    #[tokio::test]
    async fn test_pending_timeout_is_cancelled_at_end_of_input() {
        let config = NodeSettings {
            timeout: Some(60_000.0),
            ..NodeSettings::default()
        }
        .validate()
        .unwrap();
        let input = b"{\"topic\": \"door\"}\n".as_slice();
        let mut out = Vec::new();

        serve(config, input, &mut out).await.unwrap();

        assert!(out.is_empty());
    }
}
