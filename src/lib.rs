//! # DocsQA Harness
//!
//! A client, CLI, and companion server for the QA Foundry
//! document-question-answering API.
//!
//! QA Foundry owns all of the heavy machinery — parsing, chunking, embedding,
//! retrieval, ranking. This crate is the operator-facing surface in front of
//! it: manage collections of ingested documents, attach and synchronize data
//! sources, upload local directories through the batched signed-URL protocol,
//! stream answers over server-sent events, and package a configured Q&A flow
//! as an embeddable RAG application.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │   CLI    │──▶│ FoundryClient │──▶│  QA Foundry  │
//! │  (dqa)   │   │  REST + SSE   │   │   backend    │
//! └──────────┘   └──────┬────────┘   └──────────────┘
//!                       │
//!                 ┌─────┴───────┐
//!                 │ QueryCache  │
//!                 │ (tag-based) │
//!                 └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dqa collections create my-docs --model openai-main/text-embedding-3-small
//! dqa upload ./docs --name my-docs-upload
//! dqa collections link my-docs localdir::my-docs-upload
//! dqa sync my-docs
//! dqa ask "How do I deploy?" --collection my-docs
//! dqa serve                     # static assets + backend reverse proxy
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Wire types mirrored from the backend |
//! | [`validate`] | Form validation (names, URLs, upload size) |
//! | [`cache`] | Tag-indexed query-result cache |
//! | [`client`] | Typed REST client for QA Foundry |
//! | [`stream`] | SSE parsing and streamed answer assembly |
//! | [`upload`] | Batched signed-URL upload protocol |
//! | [`serve`] | Static asset + reverse-proxy server |

pub mod apps;
pub mod ask;
pub mod cache;
pub mod chat_models;
pub mod client;
pub mod collections;
pub mod config;
pub mod datasources;
pub mod models;
pub mod serve;
pub mod stream;
pub mod upload;
pub mod validate;
