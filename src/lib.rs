//! Loads the NCBI taxonomy dump (`taxdmp.zip`) into a SQLite tree and
//! resolves kingdom-to-species lineages over it.
//!
//! The load runs parse, link, name, order, persist in one pass; see
//! [`app::load_archive`]. Structural problems in the dump abort the load
//! before the store is written.

pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod lineage;
pub mod names;
pub mod order;
pub mod output;
pub mod parser;
pub mod store;
pub mod tree;
