//! `autoblog-core`: domain vocabulary shared by the job engine and its surfaces.
//!
//! This crate contains **pure domain** primitives (no runtime, storage or I/O).

pub mod error;
pub mod id;
pub mod job;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{JobStatus, JobType};
