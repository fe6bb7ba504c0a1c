//! # HR Assistant Core
//!
//! Runtime-free logic for the HR assistant's retrieval pipeline: data
//! models, markdown-aware chunking, text normalisation, the store
//! abstraction, the hybrid search algorithm, and the embedding trait.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The application
//! crate supplies the SQLite store, embedding providers, and the record
//! operations on top of it.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod search;
pub mod store;
pub mod text;
