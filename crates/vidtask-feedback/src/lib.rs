//! Best-effort delivery of task lifecycle events.
//!
//! Events are POSTed as JSON to the configured feedback endpoint with a
//! shared API key header. Delivery is fire-and-forget with a short
//! request timeout and one bounded re-attempt; failures are logged and
//! the event is dropped. The reporter must never slow down a worker.

pub mod error;
pub mod reporter;

pub use error::{FeedbackError, FeedbackResult};
pub use reporter::{FeedbackConfig, FeedbackReporter};
