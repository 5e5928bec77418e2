//! The interval node actor.
//!
//! A single task owns the engine. Inbound messages and timer firings arrive on
//! channels and are handled one at a time, which gives the engine the
//! serialized processing sequence it requires.

use il_core::{
    ConfigError, Diagnostic, Emission, EmissionSink, FiredTimer, IntervalEngine, NodeConfig,
    NodeSettings,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::scheduler::{TokioClock, TokioScheduler};

/// Runtime errors.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The configuration was rejected; the node never started.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The node no longer accepts messages.
    #[error("interval node has shut down")]
    Closed,
    /// The node task panicked or was cancelled.
    #[error("interval node task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Something the node produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeOutput {
    Emission(Emission),
    Diagnostic {
        #[serde(serialize_with = "serialize_display")]
        diagnostic: Diagnostic,
    },
}

fn serialize_display<S>(value: &Diagnostic, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(value)
}

#[derive(Debug)]
enum Command {
    Message(Value),
    Shutdown,
}

/// Cloneable handle for feeding messages into a node.
#[derive(Debug, Clone)]
pub struct NodeSender {
    commands: mpsc::UnboundedSender<Command>,
}

impl NodeSender {
    /// Queues a message for processing.
    pub fn send(&self, envelope: Value) -> Result<(), NodeError> {
        self.commands
            .send(Command::Message(envelope))
            .map_err(|_| NodeError::Closed)
    }
}

/// Owner handle of a running node.
///
/// Dropping the handle without calling [`NodeHandle::shutdown`] still stops the
/// node and cancels its timers once every [`NodeSender`] is gone.
#[derive(Debug)]
pub struct NodeHandle {
    sender: NodeSender,
    outputs: mpsc::UnboundedReceiver<NodeOutput>,
    task: Option<JoinHandle<()>>,
}

impl NodeHandle {
    /// Queues a message for processing.
    pub fn send(&self, envelope: Value) -> Result<(), NodeError> {
        self.sender.send(envelope)
    }

    /// A sender that can be moved into another task.
    pub fn sender(&self) -> NodeSender {
        self.sender.clone()
    }

    /// Waits for the next output. Returns `None` once the node has shut down
    /// and every output has been received.
    pub async fn recv(&mut self) -> Option<NodeOutput> {
        self.outputs.recv().await
    }

    /// Stops the node: cancels every timer and waits for the task to finish.
    ///
    /// Outputs produced before shutdown remain available through
    /// [`NodeHandle::recv`]; nothing is produced afterwards.
    pub async fn shutdown(&mut self) -> Result<(), NodeError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        // The task may already have stopped if every sender was dropped.
        let _ = self.sender.commands.send(Command::Shutdown);
        task.await?;
        Ok(())
    }
}

/// Entry point for running the engine on tokio.
pub struct IntervalNode;

impl IntervalNode {
    /// Validates `settings` and starts a node.
    pub fn spawn(settings: &NodeSettings) -> Result<NodeHandle, NodeError> {
        let config = settings.validate()?;
        Ok(Self::spawn_with_config(config))
    }

    /// Starts a node with an already validated configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_with_config(config: NodeConfig) -> NodeHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();

        let engine = IntervalEngine::new(config, TokioClock, TokioScheduler::new(fired_tx));
        let sink = ChannelSink { tx: output_tx };
        let task = tokio::spawn(run(engine, command_rx, fired_rx, sink));
        tracing::info!("interval node started");

        NodeHandle {
            sender: NodeSender {
                commands: command_tx,
            },
            outputs: output_rx,
            task: Some(task),
        }
    }
}

async fn run(
    mut engine: IntervalEngine<TokioClock, TokioScheduler>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut fired: mpsc::UnboundedReceiver<FiredTimer>,
    mut sink: ChannelSink,
) {
    loop {
        // Expired timers go first: a window that is already due must close
        // before any message queued behind it is measured.
        tokio::select! {
            biased;
            Some(timer) = fired.recv() => engine.fire(&timer, &mut sink),
            command = commands.recv() => match command {
                Some(Command::Message(envelope)) => engine.process_envelope(envelope, &mut sink),
                Some(Command::Shutdown) | None => break,
            },
        }
    }

    engine.shutdown();
    engine.scheduler_mut().close();
    tracing::info!("interval node stopped");
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<NodeOutput>,
}

impl EmissionSink for ChannelSink {
    fn emit(&mut self, emission: Emission) {
        if self.tx.send(NodeOutput::Emission(emission)).is_err() {
            tracing::debug!("output receiver dropped; emission discarded");
        }
    }

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        if self.tx.send(NodeOutput::Diagnostic { diagnostic }).is_err() {
            tracing::debug!("output receiver dropped; diagnostic discarded");
        }
    }
}
