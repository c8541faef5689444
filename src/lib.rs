//! # reglex
//!
//! Incremental harvesting, summarization and retrieval for legal regulation
//! corpora.
//!
//! Every stage is resumable: its output on disk is its checkpoint, so a run
//! interrupted at any point picks up where it stopped without repeating
//! network downloads or model calls.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────────────────┐   ┌──────────┐
//! │ harvest  │──▶│  fetch   │──▶│ categorize → sanitize →   │──▶│  index   │
//! │ (records)│   │ (raw txt)│   │ summarize (summary txt)   │   │ (SQLite) │
//! └──────────┘   └──────────┘   └───────────────────────────┘   └────┬─────┘
//!                                                                    ▼
//!                                                          search / ask
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! reglex init
//! reglex harvest --category regulation
//! reglex fetch
//! reglex process
//! reglex index
//! reglex ask "Which fishing quotas apply in 2025?" --detect
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`store`] | Persisted, deduplicated, date-sorted Record Store |
//! | [`page`] | Page-source capability (HTTP rendering) |
//! | [`harvest`] | Paginated listing harvest |
//! | [`fetch`] | Document text extraction |
//! | [`pdf`] | PDF download and text cleaning |
//! | [`artifacts`] | On-disk layout and the finalized check |
//! | [`llm`] | Language-model capability |
//! | [`sanitize`] | Text normalization |
//! | [`stages`] | Categorize, sanitize, summarize |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding capability |
//! | [`index`] | Similarity index and index builder |
//! | [`search`] | Retrieval |
//! | [`ask`] | Question answering |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod artifacts;
pub mod ask;
pub mod categories;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod harvest;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
mod openai;
pub mod page;
pub mod pdf;
pub mod progress;
pub mod sanitize;
pub mod search;
pub mod stages;
pub mod store;
