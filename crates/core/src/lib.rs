//! `docembed-core`: shared vocabulary for the embedding queue.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the job/document status enums and the domain error type.

pub mod error;
pub mod id;
pub mod status;

pub use error::{DomainError, DomainResult};
pub use id::{ChunkId, DocumentId, JobId};
pub use status::{EmbeddingStatus, JobStatus};
