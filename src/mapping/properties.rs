//! Property bags
//!
//! `PropertyMappings` collects the descriptors of one document type, grouped
//! by kind. Bags compose with `include`, which is how shared property sets
//! (common metadata, marking references) are attached to many types.

use super::attribute::AttributeMapping;
use super::relation::{EmbeddedRelation, LinkRelation, ReferenceRelation};
use super::{DescriptorKind, SchemaError};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct PropertyMappings {
    pub keys: Vec<AttributeMapping>,
    pub attributes: Vec<AttributeMapping>,
    pub embedded: Vec<EmbeddedRelation>,
    pub references: Vec<ReferenceRelation>,
    pub links: Vec<LinkRelation>,
}

impl PropertyMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, mapping: AttributeMapping) -> Self {
        self.keys.push(mapping);
        self
    }

    pub fn has(mut self, mapping: AttributeMapping) -> Self {
        self.attributes.push(mapping);
        self
    }

    pub fn embedded(mut self, relation: EmbeddedRelation) -> Self {
        self.embedded.push(relation);
        self
    }

    pub fn reference(mut self, relation: ReferenceRelation) -> Self {
        self.references.push(relation);
        self
    }

    pub fn link(mut self, relation: LinkRelation) -> Self {
        self.links.push(relation);
        self
    }

    /// Merge another bag into this one
    ///
    /// Fails if both bags map the same field under the same descriptor kind.
    pub fn include(mut self, other: &PropertyMappings) -> Result<Self, SchemaError> {
        check_disjoint(DescriptorKind::Key, fields(&self.keys, |m| &m.field), fields(&other.keys, |m| &m.field))?;
        check_disjoint(
            DescriptorKind::Attribute,
            fields(&self.attributes, |m| &m.field),
            fields(&other.attributes, |m| &m.field),
        )?;
        check_disjoint(
            DescriptorKind::Embedded,
            fields(&self.embedded, |m| &m.field),
            fields(&other.embedded, |m| &m.field),
        )?;
        check_disjoint(
            DescriptorKind::Reference,
            fields(&self.references, |m| &m.field),
            fields(&other.references, |m| &m.field),
        )?;
        check_disjoint(DescriptorKind::Link, fields(&self.links, |m| &m.field), fields(&other.links, |m| &m.field))?;

        self.keys.extend(other.keys.iter().cloned());
        self.attributes.extend(other.attributes.iter().cloned());
        self.embedded.extend(other.embedded.iter().cloned());
        self.references.extend(other.references.iter().cloned());
        self.links.extend(other.links.iter().cloned());
        Ok(self)
    }

    /// Check that no kind maps the same field twice
    pub fn check_duplicates(&self) -> Result<(), SchemaError> {
        unique(DescriptorKind::Key, fields(&self.keys, |m| &m.field))?;
        unique(DescriptorKind::Attribute, fields(&self.attributes, |m| &m.field))?;
        unique(DescriptorKind::Embedded, fields(&self.embedded, |m| &m.field))?;
        unique(DescriptorKind::Reference, fields(&self.references, |m| &m.field))?;
        unique(DescriptorKind::Link, fields(&self.links, |m| &m.field))
    }

    /// Fields holding keys of other objects
    pub fn reference_fields(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .map(|r| r.field.as_str())
            .chain(self.links.iter().map(|l| l.field.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
            && self.attributes.is_empty()
            && self.embedded.is_empty()
            && self.references.is_empty()
            && self.links.is_empty()
    }
}

fn fields<T>(items: &[T], field: impl Fn(&T) -> &String) -> Vec<&str> {
    items.iter().map(|item| field(item).as_str()).collect()
}

fn check_disjoint(kind: DescriptorKind, ours: Vec<&str>, theirs: Vec<&str>) -> Result<(), SchemaError> {
    let ours: HashSet<&str> = ours.into_iter().collect();
    match theirs.into_iter().find(|f| ours.contains(f)) {
        Some(field) => Err(SchemaError::DuplicateMapping {
            kind,
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

fn unique(kind: DescriptorKind, fields: Vec<&str>) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field) {
            return Err(SchemaError::DuplicateMapping {
                kind,
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{LinkRelation, ReferenceRelation};

    fn common() -> PropertyMappings {
        PropertyMappings::new()
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::raw("created", "created"))
    }

    #[test]
    fn test_include_merges() {
        let props = PropertyMappings::new()
            .has(AttributeMapping::string("name", "name"))
            .include(&common())
            .unwrap();
        assert_eq!(props.keys.len(), 1);
        assert_eq!(props.attributes.len(), 2);
        assert!(props.check_duplicates().is_ok());
    }

    #[test]
    fn test_include_rejects_same_kind_duplicate() {
        let result = PropertyMappings::new()
            .has(AttributeMapping::raw("created", "created-at"))
            .include(&common());
        match result {
            Err(SchemaError::DuplicateMapping { kind, field }) => {
                assert_eq!(kind, DescriptorKind::Attribute);
                assert_eq!(field, "created");
            }
            other => panic!("expected duplicate mapping error, got {:?}", other),
        }
    }

    #[test]
    fn test_same_field_different_kind_allowed() {
        let props = PropertyMappings::new()
            .has(AttributeMapping::string("id", "stix-id"))
            .include(&common());
        assert!(props.is_ok());
    }

    #[test]
    fn test_check_duplicates_within_bag() {
        let props = PropertyMappings::new()
            .has(AttributeMapping::string("name", "name"))
            .has(AttributeMapping::string("name", "title"));
        assert!(matches!(
            props.check_duplicates(),
            Err(SchemaError::DuplicateMapping { kind: DescriptorKind::Attribute, .. })
        ));
    }

    #[test]
    fn test_reference_fields() {
        let props = PropertyMappings::new()
            .reference(ReferenceRelation::new("created_by_ref", "id", "created-by", "created", "creator"))
            .link(LinkRelation::new("source_ref", "id", "source"));
        let fields: Vec<_> = props.reference_fields().collect();
        assert_eq!(fields, vec!["created_by_ref", "source_ref"]);
    }
}
