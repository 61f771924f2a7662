//! Memorial chat backend: answers a child's message in the voice of a parent who has
//! passed away, drawing on the family's own diary entries.
//!
//! A question is embedded and matched against a semantic index of memorial entries.
//! The nearest entries are reconciled against the authoritative records, the top
//! entry's photo is surfaced, and the family's address terms are folded into a fixed
//! prompt for the chat model. Every per-request failure degrades to a textual fallback
//! so `/chat` always produces a reply.
//!
//! # Architecture
//!
//! - **Storage**: SQLite for memorials and family relationships
//! - **Index**: a separate SQLite file holding a
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) table, rebuilt wholesale and
//!   swapped in atomically
//! - **Models**: Azure OpenAI embeddings and chat completions over HTTP
//! - **Enrichment**: Google reverse geocoding fills in place names
//! - **Transport**: plain JSON over HTTP (axum)
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite initialization, schema, migrations, and health checks
//! - [`records`] — Memorial and relationship records and the [`records::RecordStore`] seam
//! - [`embedding`] — Text-to-vector embedding over the Azure OpenAI API
//! - [`index`] — The persisted nearest-neighbour index over memorial snapshots
//! - [`llm`] — Chat model client
//! - [`chat`] — Context assembly, family data, prompt, and the reply flow
//! - [`geocode`] — Reverse geocoding and the place-name enrichment job
//! - [`server`] — HTTP endpoints

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod geocode;
pub mod index;
pub mod llm;
pub mod records;
pub mod server;
