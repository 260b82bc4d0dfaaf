//! # ragdrop
//!
//! Drop documents into a folder, ask questions about them.
//!
//! ragdrop watches a folder for PDF, Word and PowerPoint files, indexes
//! each new or changed file into a flat vector index, and answers queries
//! by retrieving the closest chunks and handing them to a local language
//! model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Watcher /    │──▶│  Dedup   │──▶│ Extract+Chunk │──▶│ Vector Store │
//! │ Upload / CLI │   │ Registry │   │    +Embed     │   │ index+meta   │
//! └──────────────┘   └──────────┘   └───────────────┘   └──────┬───────┘
//!                                                              │
//!                              ┌───────────┐   ┌───────────┐   │
//!                   query ────▶│ Retriever │──▶│ Generator │◀──┘
//!                              └───────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragdrop serve                   # watcher, initial scan, HTTP API
//! ragdrop index ./uploads/a.pdf   # one-off ingestion
//! ragdrop query "what changed in Q3?"
//! ragdrop reindex                 # rebuild from the watched folder
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`dedup`] | Processed-file registry |
//! | [`chunk`] | Text chunking |
//! | [`store`] | Vector store and persistence |
//! | [`extract`] | PDF/DOCX/PPTX text extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ingest`] | Indexing pipeline |
//! | [`retrieve`] | Retrieval and prompt assembly |
//! | [`generate`] | Answer generation backends |
//! | [`engine`] | Shared state and top-level operations |
//! | [`watcher`] | Monitored-folder watcher |
//! | [`server`] | HTTP API |

pub mod chunk;
pub mod config;
pub mod dedup;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod generate;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod watcher;
