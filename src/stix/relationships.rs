//! STIX relationship objects and sightings
//!
//! A `relationship` document is stored as the relation named by its
//! `relationship_type`. Types without a dedicated mapping fall back to
//! `related-to`, keeping the original type as an attribute.

use super::common::object_properties;
use crate::mapping::{
    AttributeMapping, DocumentMapping, LinkRelation, MappingBuilder, PlayerType, Registry, SchemaError,
};
use crate::plan::Phase;

/// Relationship type, source role, target role
const RELATIONSHIP_TYPES: &[(&str, &str, &str)] = &[
    ("attributed-to", "attributing", "attributed"),
    ("authored-by", "authored", "author"),
    ("based-on", "derived", "basis"),
    ("beacons-to", "beaconing", "beacon-target"),
    ("characterizes", "characterizing", "characterized"),
    ("communicates-with", "communicating", "communicated"),
    ("compromises", "compromising", "compromised"),
    ("consists-of", "whole", "part"),
    ("controls", "controlling", "controlled"),
    ("delivers", "delivering", "delivered"),
    ("derived-from", "derived", "origin"),
    ("downloads", "downloading", "downloaded"),
    ("drops", "dropping", "dropped"),
    ("duplicate-of", "duplicate", "original"),
    ("exploits", "exploiting", "exploited"),
    ("hosts", "hosting", "hosted"),
    ("impersonates", "impersonating", "impersonated"),
    ("indicates", "indicating", "indicated"),
    ("investigates", "investigating", "investigated"),
    ("located-at", "located", "place"),
    ("mitigates", "mitigating", "mitigated"),
    ("originates-from", "originating", "origin"),
    ("remediates", "remediating", "remediated"),
    ("targets", "targeting", "targeted"),
    ("uses", "user", "used"),
    ("variant-of", "variant", "original"),
];

fn relationship(type_label: &str, source_role: &str, target_role: &str) -> Result<MappingBuilder, SchemaError> {
    Ok(DocumentMapping::relation(type_label)
        .include(&object_properties()?)?
        .has(AttributeMapping::string("relationship_type", "relationship-type"))
        .has(AttributeMapping::string("description", "description"))
        .has(AttributeMapping::raw("start_time", "start-time"))
        .has(AttributeMapping::raw("stop_time", "stop-time"))
        .link(
            LinkRelation::new("source_ref", "id", source_role)
                .player_type(PlayerType::IdPrefix)
                .single(),
        )
        .link(
            LinkRelation::new("target_ref", "id", target_role)
                .player_type(PlayerType::IdPrefix)
                .single(),
        ))
}

pub(super) fn register(registry: &mut Registry) -> Result<(), SchemaError> {
    for (type_label, source_role, target_role) in RELATIONSHIP_TYPES {
        let mapping = relationship(type_label, source_role, target_role)?.build()?;
        registry.register(*type_label, mapping, Phase::Relationships)?;
    }

    let related_to = relationship("related-to", "source", "target")?.build()?;
    registry.register("related-to", related_to.clone(), Phase::Relationships)?;
    registry.register("relationship", related_to, Phase::Relationships)?;
    registry.subtype_field("relationship", "relationship_type");

    let sighting = DocumentMapping::relation("sighting")
        .include(&object_properties()?)?
        .has(AttributeMapping::string("description", "description"))
        .has(AttributeMapping::raw("first_seen", "first-seen"))
        .has(AttributeMapping::raw("last_seen", "last-seen"))
        .has(AttributeMapping::number("count", "sighting-count"))
        .has(AttributeMapping::boolean("summary", "summary"))
        .link(
            LinkRelation::new("sighting_of_ref", "id", "sighted")
                .player_type(PlayerType::IdPrefix)
                .single(),
        )
        .link(LinkRelation::new("observed_data_refs", "id", "evidence").player_type(PlayerType::IdPrefix))
        .link(LinkRelation::new("where_sighted_refs", "id", "sighter").player_type(PlayerType::IdPrefix))
        .build()?;
    registry.register("sighting", sighting, Phase::Relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Document;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        registry
    }

    #[test]
    fn test_relationship_type_selects_mapping() {
        let registry = registry();
        let doc = Document::typed("relationship")
            .with("id", "relationship--1")
            .with("relationship_type", "uses")
            .with("source_ref", "intrusion-set--a")
            .with("target_ref", "malware--b");

        let mapping = &registry.resolve(&doc).unwrap().mapping;
        assert_eq!(mapping.type_label(), "uses");

        let stages = mapping.compile(&doc).unwrap().to_strings();
        assert_eq!(
            stages[0],
            "match\n$source_ref_player isa intrusion-set, has id 'intrusion-set--a';\n$target_ref_player isa malware, has id 'malware--b';"
        );
        assert_eq!(stages[1], "put\n$uses isa uses;\n$uses has id 'relationship--1';");
        assert_eq!(
            stages.last().unwrap(),
            "insert\n$uses links (user: $source_ref_player);\n$uses links (used: $target_ref_player);"
        );
    }

    #[test]
    fn test_unknown_relationship_type_falls_back() {
        let registry = registry();
        let doc = Document::typed("relationship")
            .with("id", "relationship--2")
            .with("relationship_type", "owns")
            .with("source_ref", "identity--a")
            .with("target_ref", "infrastructure--b");

        let mapping = &registry.resolve(&doc).unwrap().mapping;
        assert_eq!(mapping.type_label(), "related-to");
        let text = mapping.compile(&doc).unwrap().render();
        assert!(text.contains("$related-to has relationship-type 'owns';"));
    }

    #[test]
    fn test_sighting_loads_before_containers() {
        let registry = registry();
        let entry = registry.get("sighting").unwrap();
        assert_eq!(entry.phase, Phase::Relationships);
        assert!(entry.phase < Phase::Aggregates);
        assert!(entry.mapping.stub("sighting--1").is_none());
    }
}
