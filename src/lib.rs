//! ctimap - typed documents to TypeDB write pipelines
//!
//! Compiles STIX (or any typed JSON documents with a registered mapping)
//! into ordered TypeQL write stages and commits them in dependency-ordered
//! phases with bounded concurrency.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Migrator                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │   Bundle    │  │  Registry   │  │   Mapping Catalogue     │  │
//! │  │   Reader    │  │ (type→map)  │  │   (STIX 2.1)            │  │
//! │  └──────┬──────┘  └──────┬──────┘  └───────────┬─────────────┘  │
//! │         │                │                     │                │
//! │         ▼                ▼                     ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │              Document Compiler / Phase Planner              ││
//! │  │  (identity, attributes, embedded, references, links)        ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             │                                   │
//! │                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                    Batch Executor                           ││
//! │  │  (fixed-size batches, bounded open transactions, phases)    ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             │                                   │
//! │                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                        Store                                ││
//! │  │  ┌─────────────────────┐        ┌─────────────────────────┐ ││
//! │  │  │  HttpStore (TypeDB) │        │  MemoryStore (tests)    │ ││
//! │  │  └─────────────────────┘        └─────────────────────────┘ ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod mapping;
pub mod plan;
pub mod stix;
pub mod store;
pub mod validation;

pub use error::{Error, Result};

pub use config::Config;
pub use engine::{BatchExecutor, Cancellation, ExecOptions, PhaseReport};
pub use input::{Bundle, Document, Value};
pub use mapping::{DocumentMapping, Registry};
pub use plan::{Phase, Plan};
pub use store::{MemoryStore, Store};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main migration handle
pub struct Migrator {
    registry: Registry,
    store: Arc<dyn Store>,
    executor: BatchExecutor,
}

impl Migrator {
    /// Migrator over an explicit registry and store
    pub fn new(registry: Registry, store: Arc<dyn Store>, options: ExecOptions) -> Self {
        let executor = BatchExecutor::new(Arc::clone(&store), options);
        Self {
            registry,
            store,
            executor,
        }
    }

    /// STIX migrator for the store a configuration names
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let registry = stix::registry()?;
        let store = store::connect(&config.store);
        Ok(Self::new(registry, store, config.exec_options()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Handle that stops submission of further batches
    pub fn cancellation(&self) -> Cancellation {
        self.executor.cancellation()
    }

    /// Compile documents into phases without touching the store
    pub fn plan(&self, documents: &[Document]) -> Plan {
        plan::plan(&self.registry, documents)
    }

    /// (Re)create the database from schema files
    pub async fn setup(&self, schema_files: &[PathBuf], force: bool) -> Result<()> {
        let mut schema = Vec::with_capacity(schema_files.len());
        for path in schema_files {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| Error::FileReadError {
                    path: path.clone(),
                    source,
                })?;
            schema.push(text);
        }
        self.store.setup(&schema, force).await?;
        tracing::info!(files = schema_files.len(), force, "database set up");
        Ok(())
    }

    /// Plan and execute documents, phase by phase
    ///
    /// Stops at the first phase that does not fully commit; committed phases
    /// stay committed.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let plan = self.plan(documents);
        let skipped = plan.skipped.clone();
        tracing::info!(
            documents = documents.len(),
            groups = plan.len(),
            skipped = skipped.len(),
            "planned ingest"
        );

        let mut phases = Vec::new();
        for (phase, groups) in plan.into_phases() {
            let report = self.executor.execute(phase, groups).await;
            phases.push(report.into_result()?);
        }

        Ok(IngestReport { phases, skipped })
    }

    /// Read a bundle from disk and ingest it
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let documents = Bundle::open(path).read().await?;
        self.ingest(&documents).await
    }

    /// Fetch the object of `type_name` keyed by `key`, shaped like its document
    pub async fn fetch(&self, type_name: &str, key: &Value) -> Result<Option<serde_json::Value>> {
        let entry = self.registry.get(type_name).ok_or_else(|| Error::UnknownType {
            type_name: type_name.to_string(),
        })?;
        let query = entry.mapping.fetch(key).map_err(|source| Error::Compile {
            origin: format!("{} {}", type_name, key.to_json()),
            source,
        })?;
        let answer = self.store.fetch(&query.to_string()).await?;
        Ok(answer.map(|json| entry.mapping.normalize(&json)))
    }

    /// Fetch by STIX id, the type taken from the id prefix
    pub async fn fetch_id(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let type_name = validation::type_prefix(id).ok_or_else(|| Error::UnknownType {
            type_name: id.to_string(),
        })?;
        self.fetch(type_name, &Value::from(id)).await
    }
}

/// Result of an ingest run
#[derive(Debug)]
pub struct IngestReport {
    /// One report per phase, in execution order
    pub phases: Vec<PhaseReport>,
    pub skipped: Vec<plan::SkippedDocument>,
}

impl IngestReport {
    /// Statement groups committed across all phases
    pub fn committed_groups(&self) -> usize {
        self.phases.iter().map(|p| p.groups).sum()
    }
}
