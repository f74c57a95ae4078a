//! Infrastructure layer: job queue, document store, embedding provider, Postgres.

pub mod documents;
pub mod embedding;
pub mod jobs;
pub mod schema;
