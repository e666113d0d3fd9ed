//! # docshelf
//!
//! Document ingestion and hybrid retrieval over a searchable chunk store.
//!
//! docshelf turns documents (PDF, DOCX, Markdown, plain text — local or
//! S3) into token-exact overlapping chunks, embeds each chunk with an
//! OpenAI embedding model, and stores everything in SQLite (FTS5 for
//! keyword search, embedding BLOBs for vector similarity). Queries run
//! through a router that answers either by keyword match or by cosine
//! similarity over a bounded candidate pool.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌───────────┐
//! │ Extractor  │──▶│   Pipeline    │──▶│  SQLite   │
//! │ FS / S3    │   │ Chunk + Embed │   │ FTS5+Vec  │
//! └────────────┘   └───────────────┘   └─────┬─────┘
//!                                            │
//!                                      ┌─────┴─────┐
//!                                      │  Router   │
//!                                      │ kw / sem  │
//!                                      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docshelf init                          # create database
//! docshelf ingest docs/handbook.pdf      # extract, chunk, embed, store
//! docshelf search "on-call rotation"     # keyword search
//! docshelf search "who do I page" --mode semantic
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Structured error taxonomy |
//! | [`retry`] | Shared retry policy with exponential backoff |
//! | [`chunker`] | Token-exact text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`extract`] | Document text extraction (FS, S3) |
//! | [`store`] | Chunk persistence and search backends |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Query routing over the two search modes |

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod retrieve;
pub mod retry;
pub mod store;

pub use error::{ErrorKind, Result, StructuredError};
pub use ingest::IngestionPipeline;
pub use retrieve::RetrievalRouter;
