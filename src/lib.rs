//! # askdocs
//!
//! A retrieval-augmented document question-answering service.
//!
//! askdocs ingests documents (PDF, DOCX, TXT), chunks and embeds them into a
//! vector index, and answers natural-language questions by retrieving the
//! most relevant chunks and forwarding them with the question to a language
//! model. Every external call is wrapped in a defensive request-handling
//! layer: prompt-injection screening, input/output sanitization, and
//! per-client rate limiting.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌───────────────┐   ┌───────────┐
//! │ Upload │──▶│  Chunk+Embed  │──▶│  Vector   │
//! │ pdf/docx│  │   pipeline    │   │  index    │
//! └────────┘   └───────────────┘   └─────┬─────┘
//!                                        │
//! ┌────────┐   ┌───────────────┐         │
//! │ Query  │──▶│ screen→search │◀────────┘
//! │        │   │ →generate→    │──▶ Answer + sources
//! └────────┘   │  sanitize     │
//!              └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`chunk`] | Boilerplate stripping, redaction, sentence chunking |
//! | [`guard`] | Injection screen and sanitizers |
//! | [`ratelimit`] | Fixed-window rate limiter |
//! | [`extract`] | PDF/DOCX/TXT text extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index gateway |
//! | [`llm`] | Generation gateway |
//! | [`storage`] | S3-compatible object store |
//! | [`pipeline`] | RAG orchestration |
//! | [`server`] | Axum HTTP API |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod guard;
pub mod index;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod server;
pub mod storage;
