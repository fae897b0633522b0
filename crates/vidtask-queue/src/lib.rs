//! Redis Streams broker client.
//!
//! This crate provides:
//! - Task enqueueing via Redis Streams
//! - Consumer-group dequeue with ack
//! - Delayed retry scheduling via a sorted set
//! - Result store keyed by task ID
//! - The submit/poll client surface

pub mod config;
pub mod error;
pub mod queue;

pub use config::BrokerConfig;
pub use error::{QueueError, QueueResult};
pub use queue::JobQueue;
