//! # HR Assistant
//!
//! Back end for a conversational HR assistant. It answers policy questions
//! from the employee manual through hybrid retrieval, and manages vacation,
//! sick leave and payroll records kept in JSON files. Both are exposed as
//! tools for an external language-model agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │ manual/*.md  │──▶│ Chunk+Embed │──▶│  SQLite   │──┐
//! └──────────────┘   └─────────────┘   │ FTS5+Vec  │  │ PolicyRetriever
//!                                      └───────────┘  ▼
//! ┌──────────────┐                              ┌───────────┐
//! │  data/*.json │─────── RecordStore ─────────▶│   Tools   │
//! └──────────────┘                              └─────┬─────┘
//!                                 ┌──────────────┬────┴───────┐
//!                                 ▼              ▼            ▼
//!                             hrctl CLI    HTTP /tools    MCP /mcp
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`manual`] | Employee manual scanning |
//! | [`ingest`] | Incremental indexing of the manual |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, local) |
//! | [`embed_cmd`] | Embedding backfill and rebuild |
//! | [`retriever`] | The policy query interface |
//! | [`records`] | Vacation, sick leave and payroll records |
//! | [`tools`] | Tool trait, registry and built-in tools |
//! | [`server`] | HTTP tool server |
//! | [`mcp`] | MCP bridge over the tool registry |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod manual;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod records;
pub mod retriever;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod status;
pub mod tool_cmd;
pub mod tools;
