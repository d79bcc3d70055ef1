//! # doc-memory
//!
//! A document ingestion pipeline that turns PDF, DOCX, and PPTX files into
//! searchable embedded chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌───────────┐   ┌──────────────┐
//! │  Extraction  │──▶│  Chunker   │──▶│ Embedding │──▶│ Vector store │
//! │ text+OCR     │   │ 500 / 50   │   │  gateway  │   │ SQLite / mem │
//! └──────────────┘   └────────────┘   └───────────┘   └──────┬───────┘
//!                                                            │
//!                                   ┌────────────────────────┤
//!                                   ▼                        ▼
//!                              ┌──────────┐            ┌──────────┐
//!                              │   CLI    │            │   HTTP   │
//!                              │ (docmem) │            │  upload  │
//!                              └──────────┘            └──────────┘
//! ```
//!
//! PDFs go through a three-stage extraction cascade: the embedded text
//! layer, OCR of every page rendered at 300 DPI, and OCR of every image
//! embedded in the pages. Each stage is isolated from the others' failures
//! and their outputs are concatenated. DOCX and PPTX files have a single
//! structural stage each.
//!
//! ## Quick Start
//!
//! ```bash
//! docmem init                        # create the vector store
//! docmem ingest ./papers             # ingest every supported file
//! docmem query "thermal runaway"     # closest chunks
//! docmem serve                       # HTTP upload endpoints
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Ingestion error kinds |
//! | [`models`] | Core data types |
//! | [`extract`] | Extraction cascade, OCR toolchain, OOXML parsing |
//! | [`chunk`] | Sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait and backends |
//! | [`services`] | Shared pipeline components |
//! | [`ingest`] | Pipeline orchestration |
//! | [`query`] | `docmem query` |
//! | [`stats`] | `docmem stats` |
//! | [`server`] | HTTP upload server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod query;
pub mod server;
pub mod services;
pub mod stats;
pub mod store;
