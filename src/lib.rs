//! # judge-core
//!
//! Execution core of an online judge. Jobs arrive on a queue, run inside an
//! external sandbox launcher under enforced resource limits, and leave as a
//! classified verdict with captured output and accounting data.
//!
//! The isolation primitive itself (isolate) is a trusted external utility;
//! this crate provisions slots, stages files, drives the compile→run
//! pipeline, decodes the accounting report, and classifies the outcome.

pub mod classify;
mod config;
mod error;
mod launcher;
mod pipeline;
mod pool;
mod queue;
mod report;
mod store;
pub mod toolchain;
mod types;
mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::Error;
pub use launcher::{Envelope, Invocation, IsolateLauncher, LaunchStatus, SandboxLauncher};
pub use pipeline::Pipeline;
pub use pool::{SandboxSession, SlotPool};
pub use queue::{job_key, Delivery, MessageQueue, RedisQueue, PROCESSING_KEY, QUEUE_KEY};
pub use report::{AccountingReport, SandboxStatus};
pub use store::{JobRecord, RedisStore, ResultStore};
pub use types::{ExecutionResult, Job, JobStatus, RunLimits, Verdict};
pub use worker::Worker;

/// Result type for judge-core operations
pub type Result<T> = std::result::Result<T, Error>;
