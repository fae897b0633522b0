//! Job registry and video job bodies.
//!
//! This crate provides:
//! - The registry that wraps plain async job bodies into dispatchable
//!   handles with uniform feedback, timeout, and failure conversion
//! - The job error taxonomy that drives retry policy
//! - The FFmpeg-backed video job bodies (convert, compress,
//!   frame extraction)

pub mod error;
pub mod registry;
pub mod video;

pub use error::{JobError, JobResult};
pub use registry::{AttemptOutcome, JobHandle, JobRegistry, RegistryDefaults};
pub use video::register_video_jobs;
