//! Job orchestration for UGC video generation.
//!
//! This crate provides:
//! - Per-job intermediate files with collision-free names and cleanup
//! - The stage sequence validate, randomize, overlay, deliver
//! - Sidecar persistence of the randomization log
//! - A bounded-concurrency executor with between-stage cancellation

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod files;
pub mod logging;
pub mod pipeline;

pub use cli::Cli;
pub use config::WorkerConfig;
pub use error::{Stage, WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobStatus, JobSummary};
pub use files::JobFileSet;
pub use logging::JobLogger;
pub use pipeline::{sidecar_path, JobPipeline, JobReport};
