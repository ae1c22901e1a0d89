//! STIX meta objects

use super::common::object_properties;
use crate::mapping::{AttributeMapping, DocumentMapping, EmbeddedRelation, Registry, SchemaError};
use crate::plan::Phase;

pub(super) fn register(registry: &mut Registry) -> Result<(), SchemaError> {
    // `{"tlp": "green"}` or `{"statement": "..."}`
    let content = DocumentMapping::entity("marking-content")
        .has(AttributeMapping::string("tlp", "tlp"))
        .has(AttributeMapping::string("statement", "statement"))
        .build()?;

    let marking_definition = DocumentMapping::entity("marking-definition")
        .include(&object_properties()?)?
        .has(AttributeMapping::string("name", "name"))
        .has(AttributeMapping::string("definition_type", "definition-type"))
        .embedded(EmbeddedRelation::new("definition", content, "marking-defining", "marking", "content").single())
        .build()?;

    registry.register("marking-definition", marking_definition, Phase::Entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Document;

    #[test]
    fn test_tlp_marking() {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();

        let doc: Document = serde_json::from_value(serde_json::json!({
            "type": "marking-definition",
            "spec_version": "2.1",
            "id": "marking-definition--34098fce-860f-48ae-8e50-ebd3cc5e41da",
            "created": "2017-01-20T00:00:00.000Z",
            "definition_type": "tlp",
            "name": "TLP:GREEN",
            "definition": {"tlp": "green"}
        }))
        .unwrap();

        let mapping = &registry.resolve(&doc).unwrap().mapping;
        let text = mapping.compile(&doc).unwrap().render();
        assert!(text.contains("insert\n$definition_marking-content isa marking-content;"));
        assert!(text.contains("$definition_marking-content has tlp 'green';"));
        assert!(text.contains(
            "(marking: $marking-definition, content: $definition_marking-content) isa marking-defining;"
        ));
    }
}
