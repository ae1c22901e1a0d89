//! Mapping definitions
//!
//! A `DocumentMapping` describes how one document type becomes graph writes:
//!
//! ```text
//! DocumentMapping::entity("person")
//!     .key(AttributeMapping::string("id", "id"))            -> put $person has id '...'
//!     .has(AttributeMapping::string("name", "name"))        -> insert $person has name '...'
//!     .embedded(EmbeddedRelation::new(...))                 -> nested object + link
//!     .reference(ReferenceRelation::new(...))               -> match existing + link
//!     .build()?
//! ```
//!
//! Relation-rooted mappings add `LinkRelation`s naming the players the
//! relation connects. Mappings are validated once at `build()` and are
//! immutable afterwards.

pub mod attribute;
pub mod compile;
pub mod fetch;
pub mod properties;
pub mod registry;
pub mod relation;
pub mod scope;

pub use attribute::{AttributeMapping, ValueKind};
pub use compile::{CompileError, Pipeline, StageRole};
pub use properties::PropertyMappings;
pub use registry::{Registry, RegistryEntry};
pub use relation::{EmbeddedRelation, LinkRelation, Multiplicity, PlayerType, ReferenceRelation};
pub use scope::Scope;

use crate::input::{Document, Value};
use crate::validation::{self, ValidationError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tql::FetchQuery;

/// Errors in a mapping definition
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Duplicate {kind} mapping for field '{field}'")]
    DuplicateMapping { kind: DescriptorKind, field: String },

    #[error("Invalid label in mapping for '{type_label}': {source}")]
    InvalidLabel {
        type_label: String,
        #[source]
        source: ValidationError,
    },

    #[error("Entity type '{type_label}' cannot declare player links (field '{field}')")]
    LinksOnEntity { type_label: String, field: String },

    #[error("Relation type '{type_label}' declares no player links")]
    RelationWithoutLinks { type_label: String },

    #[error("Document type '{type_name}' is registered twice")]
    DuplicateType { type_name: String },
}

/// Descriptor kinds, as named in duplicate-mapping errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Key,
    Attribute,
    Embedded,
    Reference,
    Link,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DescriptorKind::Key => "key",
            DescriptorKind::Attribute => "attribute",
            DescriptorKind::Embedded => "embedded relation",
            DescriptorKind::Reference => "reference",
            DescriptorKind::Link => "player link",
        })
    }
}

/// Whether the document itself becomes an entity or a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Entity,
    Relation,
}

/// How documents of one type map onto the graph
#[derive(Debug)]
pub struct DocumentMapping {
    type_label: String,
    root: RootKind,
    properties: PropertyMappings,
}

impl DocumentMapping {
    /// Start an entity-rooted mapping
    pub fn entity(type_label: impl Into<String>) -> MappingBuilder {
        MappingBuilder::new(type_label, RootKind::Entity)
    }

    /// Start a relation-rooted mapping
    pub fn relation(type_label: impl Into<String>) -> MappingBuilder {
        MappingBuilder::new(type_label, RootKind::Relation)
    }

    pub fn type_label(&self) -> &str {
        &self.type_label
    }

    pub fn root(&self) -> RootKind {
        self.root
    }

    pub fn properties(&self) -> &PropertyMappings {
        &self.properties
    }

    /// Keyed types are written with create-if-absent semantics
    pub fn has_key(&self) -> bool {
        !self.properties.keys.is_empty()
    }

    /// Compile a top-level document into its write pipeline
    pub fn compile(&self, doc: &Document) -> Result<Pipeline, CompileError> {
        compile::compile(self, doc, &Scope::root())
    }

    /// Fetch query returning the document keyed by `key`
    pub fn fetch(&self, key: &Value) -> Result<FetchQuery, CompileError> {
        fetch::fetch_query(self, key)
    }

    /// Reshape a fetch answer so it compares equal to the source document
    pub fn normalize(&self, answer: &serde_json::Value) -> serde_json::Value {
        fetch::normalize(self, answer)
    }

    /// String values of every reference and link field, nested objects included
    pub fn referenced_values(&self, doc: &Document) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_references(doc, &mut out);
        out
    }

    fn collect_references(&self, doc: &Document, out: &mut Vec<String>) {
        for field in self.properties.reference_fields() {
            for (_, value) in relation::indexed_values(doc.get(field)) {
                if let Some(s) = value.as_str() {
                    out.push(s.to_string());
                }
            }
        }
        for embedded in &self.properties.embedded {
            for (_, value) in relation::indexed_values(doc.get(&embedded.field)) {
                if let Some(fields) = value.as_object() {
                    embedded
                        .mapping
                        .collect_references(&Document::from(fields.clone()), out);
                }
            }
        }
    }

    /// Minimal keyed document that creates an object of this type
    ///
    /// Only single-key mappings have stubs; the stub carries nothing but the key.
    pub fn stub(&self, key: &str) -> Option<Document> {
        match (self.root, self.properties.keys.as_slice()) {
            (RootKind::Entity, [only]) => Some(Document::new().with(only.field.clone(), key)),
            _ => None,
        }
    }
}

/// Builder for `DocumentMapping`
#[derive(Debug)]
pub struct MappingBuilder {
    type_label: String,
    root: RootKind,
    properties: PropertyMappings,
}

impl MappingBuilder {
    fn new(type_label: impl Into<String>, root: RootKind) -> Self {
        Self {
            type_label: type_label.into(),
            root,
            properties: PropertyMappings::new(),
        }
    }

    pub fn key(mut self, mapping: AttributeMapping) -> Self {
        self.properties = self.properties.key(mapping);
        self
    }

    pub fn has(mut self, mapping: AttributeMapping) -> Self {
        self.properties = self.properties.has(mapping);
        self
    }

    pub fn embedded(mut self, relation: EmbeddedRelation) -> Self {
        self.properties = self.properties.embedded(relation);
        self
    }

    pub fn reference(mut self, relation: ReferenceRelation) -> Self {
        self.properties = self.properties.reference(relation);
        self
    }

    pub fn link(mut self, relation: LinkRelation) -> Self {
        self.properties = self.properties.link(relation);
        self
    }

    /// Merge a shared property bag
    pub fn include(mut self, other: &PropertyMappings) -> Result<Self, SchemaError> {
        self.properties = self.properties.include(other)?;
        Ok(self)
    }

    /// Validate and freeze the mapping
    pub fn build(self) -> Result<Arc<DocumentMapping>, SchemaError> {
        let invalid = |source| SchemaError::InvalidLabel {
            type_label: self.type_label.clone(),
            source,
        };
        let props = &self.properties;

        validation::validate_type_label(&self.type_label).map_err(invalid)?;
        for m in props.keys.iter().chain(props.attributes.iter()) {
            validation::validate_attribute_label(&m.attribute).map_err(invalid)?;
        }
        for e in &props.embedded {
            validation::validate_type_label(&e.relation).map_err(invalid)?;
            validation::validate_role_label(&e.self_role).map_err(invalid)?;
            validation::validate_role_label(&e.other_role).map_err(invalid)?;
        }
        for r in &props.references {
            validation::validate_attribute_label(&r.key_attribute).map_err(invalid)?;
            validation::validate_type_label(&r.relation).map_err(invalid)?;
            validation::validate_role_label(&r.self_role).map_err(invalid)?;
            validation::validate_role_label(&r.player_role).map_err(invalid)?;
            if let PlayerType::Fixed(label) = &r.player_type {
                validation::validate_type_label(label).map_err(invalid)?;
            }
        }
        for l in &props.links {
            validation::validate_attribute_label(&l.key_attribute).map_err(invalid)?;
            validation::validate_role_label(&l.role).map_err(invalid)?;
            if let PlayerType::Fixed(label) = &l.player_type {
                validation::validate_type_label(label).map_err(invalid)?;
            }
        }

        props.check_duplicates()?;

        match self.root {
            RootKind::Entity => {
                if let Some(link) = props.links.first() {
                    return Err(SchemaError::LinksOnEntity {
                        type_label: self.type_label.clone(),
                        field: link.field.clone(),
                    });
                }
            }
            RootKind::Relation => {
                if props.links.is_empty() {
                    return Err(SchemaError::RelationWithoutLinks {
                        type_label: self.type_label.clone(),
                    });
                }
            }
        }

        Ok(Arc::new(DocumentMapping {
            type_label: self.type_label,
            root: self.root,
            properties: self.properties,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_entity() {
        let mapping = DocumentMapping::entity("person")
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::string("name", "name"))
            .build()
            .unwrap();
        assert_eq!(mapping.type_label(), "person");
        assert_eq!(mapping.root(), RootKind::Entity);
        assert!(mapping.has_key());
    }

    #[test]
    fn test_invalid_labels_rejected() {
        let result = DocumentMapping::entity("person")
            .has(AttributeMapping::string("name", "full name"))
            .build();
        assert!(matches!(result, Err(SchemaError::InvalidLabel { .. })));

        let result = DocumentMapping::entity("match").build();
        assert!(matches!(result, Err(SchemaError::InvalidLabel { .. })));
    }

    #[test]
    fn test_links_on_entity_rejected() {
        let result = DocumentMapping::entity("person")
            .link(LinkRelation::new("friend", "id", "friend"))
            .build();
        assert!(matches!(result, Err(SchemaError::LinksOnEntity { .. })));
    }

    #[test]
    fn test_relation_without_links_rejected() {
        let result = DocumentMapping::relation("friendship")
            .key(AttributeMapping::string("id", "id"))
            .build();
        assert!(matches!(result, Err(SchemaError::RelationWithoutLinks { .. })));
    }

    #[test]
    fn test_duplicate_in_builder_rejected() {
        let result = DocumentMapping::entity("person")
            .has(AttributeMapping::string("name", "name"))
            .has(AttributeMapping::string("name", "alias"))
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateMapping { .. })));
    }

    #[test]
    fn test_referenced_values_include_nested() {
        let note = DocumentMapping::entity("annotation")
            .reference(ReferenceRelation::new("author_ref", "id", "authorship", "authored", "author"))
            .build()
            .unwrap();
        let mapping = DocumentMapping::entity("report")
            .key(AttributeMapping::string("id", "id"))
            .reference(ReferenceRelation::new("object_refs", "id", "object-ref", "container", "object"))
            .embedded(EmbeddedRelation::new("notes", note, "annotating", "annotated", "annotation"))
            .build()
            .unwrap();

        let doc: Document = serde_json::from_value(serde_json::json!({
            "type": "report",
            "id": "report--1",
            "object_refs": ["indicator--1", "malware--1"],
            "notes": [{"author_ref": "identity--1"}]
        }))
        .unwrap();

        assert_eq!(
            mapping.referenced_values(&doc),
            vec!["indicator--1", "malware--1", "identity--1"]
        );
    }

    #[test]
    fn test_stub() {
        let person = DocumentMapping::entity("person")
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::string("name", "name"))
            .build()
            .unwrap();
        let stub = person.stub("p1").unwrap();
        assert_eq!(stub.id(), Some("p1"));
        assert_eq!(stub.fields.len(), 1);

        let keyless = DocumentMapping::entity("note").build().unwrap();
        assert!(keyless.stub("n1").is_none());
    }
}
