//! # DocumentGPT
//!
//! Chat with your document: upload a file, index it for semantic retrieval,
//! and talk about it in a session-scoped chat loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │  Upload  │──▶│ Persist+Load │──▶│ Split+Embed │──▶│ Retriever │
//! │ name+hash│   │  .cache/files│   │ .cache/emb… │   │ in-memory │
//! └──────────┘   └──────────────┘   └─────────────┘   └─────┬─────┘
//!                                                           │
//!                                ┌──────────────────────────┘
//!                                ▼
//!                         ┌─────────────┐     ┌──────────────┐
//!                         │   Session   │────▶│  Transcript  │
//!                         │ state+reply │     │ human / ai   │
//!                         └─────────────┘     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors for ingestion and chat |
//! | [`extract`] | Text extraction for txt, md, pdf, docx |
//! | [`chunk`] | Separator-based text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`file_store`] | Scratch file persistence and the on-disk byte store |
//! | [`embed_cache`] | Content-addressed embedding cache |
//! | [`search`] | Vector index and retriever |
//! | [`ingest`] | Memoized ingestion pipeline |
//! | [`chat`] | Transcript, display, and responders |
//! | [`session`] | Per-session state machine and session store |
//! | [`repl`] | Terminal chat loop |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embed_cache;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod file_store;
pub mod ingest;
pub mod models;
pub mod repl;
pub mod search;
pub mod session;
