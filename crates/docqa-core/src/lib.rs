//! # docqa core
//!
//! Shared logic for the docqa ingestion and retrieval pipeline: data
//! models, upload validation, sentence chunking, the embedding trait and
//! vector text codec, and the [`store::VectorStore`] abstraction with an
//! in-memory implementation.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The Postgres
//! backend, text extraction, blob storage and the OpenAI client live in
//! the `docqa` application crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod store;
pub mod validate;

pub use error::IngestError;
