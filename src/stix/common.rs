//! Properties shared by every STIX object

use crate::mapping::{
    AttributeMapping, DocumentMapping, EmbeddedRelation, PlayerType, PropertyMappings, ReferenceRelation,
    SchemaError,
};
use std::sync::Arc;

/// Common properties of domain, observable and meta objects
///
/// `id` is the only key, so every STIX object can be stubbed and merged by id.
pub fn object_properties() -> Result<PropertyMappings, SchemaError> {
    PropertyMappings::new()
        .key(AttributeMapping::string("id", "id"))
        .has(AttributeMapping::string("type", "stix-type"))
        .has(AttributeMapping::string("spec_version", "spec-version"))
        .has(AttributeMapping::raw("created", "created"))
        .has(AttributeMapping::raw("modified", "modified"))
        .has(AttributeMapping::boolean("revoked", "revoked"))
        .has(AttributeMapping::strings("labels", "label_"))
        .has(AttributeMapping::string("lang", "lang"))
        .has(AttributeMapping::number("confidence", "confidence"))
        .has(AttributeMapping::boolean("defanged", "defanged"))
        .embedded(EmbeddedRelation::new(
            "external_references",
            external_reference()?,
            "external-referencing",
            "referencing",
            "referenced",
        ))
        .include(&marking_properties())
}

/// `created_by_ref` and `object_marking_refs`
pub fn marking_properties() -> PropertyMappings {
    PropertyMappings::new()
        .reference(
            ReferenceRelation::new("created_by_ref", "id", "created-by", "created", "creator")
                .player_type(PlayerType::IdPrefix)
                .single(),
        )
        .reference(
            ReferenceRelation::new("object_marking_refs", "id", "object-marking", "marked", "marking")
                .player_type(PlayerType::IdPrefix),
        )
}

/// `object_refs` of containers
///
/// Referents may be relationships, which are stored under their
/// relationship type rather than the `relationship` id prefix, so they are
/// matched by id alone.
pub fn object_references() -> PropertyMappings {
    PropertyMappings::new().reference(ReferenceRelation::new(
        "object_refs",
        "id",
        "object-reference",
        "referencing-group",
        "referenced-object",
    ))
}

/// Keyless: two external references with the same text stay two objects
pub fn external_reference() -> Result<Arc<DocumentMapping>, SchemaError> {
    DocumentMapping::entity("external-reference")
        .has(AttributeMapping::string("source_name", "source-name"))
        .has(AttributeMapping::string("description", "description"))
        .has(AttributeMapping::string("url", "reference-url"))
        .has(AttributeMapping::string("external_id", "external-id"))
        .build()
}

/// Kill chain phases are shared between objects naming the same phase
pub fn kill_chain_phase() -> Result<Arc<DocumentMapping>, SchemaError> {
    DocumentMapping::entity("kill-chain-phase")
        .key(AttributeMapping::string("kill_chain_name", "kill-chain-name"))
        .key(AttributeMapping::string("phase_name", "phase-name"))
        .build()
}

/// `kill_chain_phases` as an embedded many-valued relation
pub fn kill_chain_phases() -> Result<PropertyMappings, SchemaError> {
    Ok(PropertyMappings::new().embedded(EmbeddedRelation::new(
        "kill_chain_phases",
        kill_chain_phase()?,
        "kill-chain-phase-ownership",
        "owner",
        "phase",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Document;

    #[test]
    fn test_object_properties_compose() {
        let props = object_properties().unwrap();
        assert_eq!(props.keys.len(), 1);
        assert_eq!(props.references.len(), 2);
        assert!(props.check_duplicates().is_ok());
    }

    #[test]
    fn test_kill_chain_phase_is_shared() {
        let phase = kill_chain_phase().unwrap();
        let doc = Document::new()
            .with("kill_chain_name", "mitre-attack")
            .with("phase_name", "initial-access");
        let text = phase.compile(&doc).unwrap().render();
        assert!(text.starts_with("put\n"));
        assert!(text.contains("has kill-chain-name 'mitre-attack'"));
        assert!(text.contains("has phase-name 'initial-access'"));
    }

    #[test]
    fn test_external_reference_is_keyless() {
        let reference = external_reference().unwrap();
        let doc = Document::new().with("source_name", "capec").with("external_id", "CAPEC-163");
        let text = reference.compile(&doc).unwrap().render();
        assert!(text.starts_with("insert\n"));
        assert!(reference.stub("x").is_none());
    }
}
