//! # docqa
//!
//! Document ingestion and hybrid retrieval for retrieval-augmented question
//! answering.
//!
//! ## Architecture
//!
//! ```text
//!  upload ─▶ Validator ─▶ BlobStore ─▶ Document(PROCESSING) ─▶ ack
//!                                          │
//!                              background task per document
//!                                          ▼
//!             TextExtractor ─▶ Chunker ─▶ EmbeddingProvider ─▶ VectorStore
//!
//!  query ─▶ Retriever ─▶ EmbeddingProvider ─▶ VectorStore (hybrid | text)
//! ```
//!
//! The storage-independent pieces (models, validation, chunking, the
//! embedding and store traits, an in-memory store) live in `docqa-core`.
//! This crate adds the Postgres/pgvector store, file storage, text
//! extraction, the OpenAI embedding client, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Explicit application context |
//! | [`blob`] | Raw upload storage |
//! | [`extract`] | PDF, Word, Excel and plain-text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Retriever with text fallback |
//! | [`pg_store`] | pgvector-backed store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`commands`] | CLI command implementations |

pub mod blob;
pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod pg_store;
pub mod search;

pub use docqa_core::{chunk, models, store, validate, IngestError};
