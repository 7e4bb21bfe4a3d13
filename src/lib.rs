//! sourceindex: cross-reference index aggregation service.
//!
//! Language analyzers connect over JSON-RPC, stream classified tokens through
//! a per-client [`session::Indexer`], and the results land in a shared SQLite
//! store that [`query::QueryEngine`] reads back.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod host;
pub mod index;
pub mod query;
pub mod session;
