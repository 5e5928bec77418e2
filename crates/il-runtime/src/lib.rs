//! Tokio host for the interval engine.
//!
//! Runs an [`il_core::IntervalEngine`] inside a single task so messages and
//! timer firings are processed strictly one at a time.
//!
//! # Thread Safety
//!
//! [`NodeHandle`] and [`NodeSender`] are `Send`; clones of the sender may feed
//! messages from any task. The engine itself never leaves its task.

mod node;
mod scheduler;

pub use node::{IntervalNode, NodeError, NodeHandle, NodeOutput, NodeSender};
pub use scheduler::{TokioClock, TokioScheduler};
