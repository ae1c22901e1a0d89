//! Store layer - where compiled queries are executed
//!
//! A store opens write transactions, runs read-only fetch queries and
//! (re)creates the database from schema text. Two implementations:
//! - `MemoryStore`: an in-process graph for tests and dry runs
//! - `HttpStore`: a TypeDB server reached over its HTTP API

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

use crate::config::{StoreConfig, StoreKind};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A graph database the compiled queries run against
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the database and define `schema` in it
    ///
    /// With `force`, an existing database is dropped first; without it an
    /// existing database is an error.
    async fn setup(&self, schema: &[String], force: bool) -> Result<()>;

    /// Open a write transaction
    async fn begin_write(&self) -> Result<Box<dyn Transaction>>;

    /// Run a fetch query, returning the first answer document if any
    async fn fetch(&self, query: &str) -> Result<Option<serde_json::Value>>;
}

/// A write transaction: queries see each other's writes, nothing is visible
/// outside until `commit`
#[async_trait]
pub trait Transaction: Send {
    /// Run one write query, returning the number of answer rows it produced
    async fn query(&mut self, query: &str) -> Result<usize>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Build the store a configuration names
pub fn connect(config: &StoreConfig) -> Arc<dyn Store> {
    match config.kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Http => Arc::new(HttpStore::new(config)),
    }
}
