//! Mapping registry
//!
//! Maps document `type` values to their mapping and load phase. A type can
//! name a subtype field (STIX `relationship` documents carry the concrete
//! relation in `relationship_type`); when present and registered, the subtype
//! wins over the plain type.

use super::{DocumentMapping, SchemaError};
use crate::input::Document;
use crate::plan::Phase;
use crate::validation::type_prefix;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub mapping: Arc<DocumentMapping>,
    pub phase: Phase,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, RegistryEntry>,
    subtype_fields: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the mapping for documents whose discriminator is `type_name`
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        mapping: Arc<DocumentMapping>,
        phase: Phase,
    ) -> Result<(), SchemaError> {
        let type_name = type_name.into();
        if self.entries.contains_key(&type_name) {
            return Err(SchemaError::DuplicateType { type_name });
        }
        self.entries.insert(type_name, RegistryEntry { mapping, phase });
        Ok(())
    }

    /// Resolve documents of `type_name` by the value of `field` first
    pub fn subtype_field(&mut self, type_name: impl Into<String>, field: impl Into<String>) {
        self.subtype_fields.insert(type_name.into(), field.into());
    }

    pub fn get(&self, type_name: &str) -> Option<&RegistryEntry> {
        self.entries.get(type_name)
    }

    /// Discriminator a document resolves to, if it has a type at all
    pub fn discriminator<'a>(&self, doc: &'a Document) -> Option<&'a str> {
        let type_name = doc.type_name()?;
        let subtype = self
            .subtype_fields
            .get(type_name)
            .and_then(|field| doc.get(field))
            .and_then(|v| v.as_str())
            .filter(|subtype| self.entries.contains_key(*subtype));
        Some(subtype.unwrap_or(type_name))
    }

    /// Entry for a document
    pub fn resolve(&self, doc: &Document) -> Option<&RegistryEntry> {
        self.discriminator(doc).and_then(|d| self.get(d))
    }

    /// Entry for a `<type>--<uuid>` identifier
    pub fn resolve_id(&self, id: &str) -> Option<&RegistryEntry> {
        type_prefix(id).and_then(|t| self.get(t))
    }

    /// Registered discriminators, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
