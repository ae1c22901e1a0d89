//! STIX 2.1 mapping catalogue
//!
//! Mappings for domain objects, cyber-observables, marking definitions,
//! relationships and sightings, registered with the phase they load in.
//!
//! ```text
//! entities          SDOs, SCOs, marking-definition
//! relationships     relationship (resolved through relationship_type), sighting
//! aggregates        report, grouping, note, opinion, observed-data
//! ```
//!
//! Sightings load with the relationships so that containers can name them
//! in `object_refs`; their `observed_data_refs` resolve against stubs.
//!
//! Every object shares the properties in [`common`]: `id` as its only key,
//! metadata attributes, external references, and the `created_by_ref` and
//! `object_marking_refs` references.

pub mod common;
mod meta;
mod relationships;
mod scos;
mod sdos;

use crate::mapping::{Registry, SchemaError};

/// Build the registry of every STIX mapping
pub fn registry() -> Result<Registry, SchemaError> {
    let mut registry = Registry::new();
    sdos::register(&mut registry)?;
    scos::register(&mut registry)?;
    meta::register(&mut registry)?;
    relationships::register(&mut registry)?;
    tracing::debug!(types = registry.len(), "built STIX registry");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Document;
    use crate::plan::{self, Phase};

    #[test]
    fn test_registry_builds() {
        let registry = registry().unwrap();
        for type_name in ["attack-pattern", "ipv4-addr", "marking-definition", "relationship", "sighting"] {
            assert!(registry.get(type_name).is_some(), "missing {}", type_name);
        }
    }

    #[test]
    fn test_bundle_plan() {
        let registry = registry().unwrap();
        let documents: Vec<Document> = serde_json::from_value(serde_json::json!([
            {
                "type": "identity",
                "id": "identity--f431f809-377b-45e0-aa1c-6a4751cae5ff",
                "name": "ACME",
                "identity_class": "organization"
            },
            {
                "type": "malware",
                "id": "malware--31b940d4-6f7f-459a-80ea-9c1f17b58abc",
                "name": "Poison Ivy",
                "is_family": true,
                "created_by_ref": "identity--f431f809-377b-45e0-aa1c-6a4751cae5ff"
            },
            {
                "type": "relationship",
                "id": "relationship--44298a74-ba52-4f0c-87a3-1824e67d7fad",
                "relationship_type": "uses",
                "source_ref": "intrusion-set--4e78f46f-a023-4e5f-bc24-71b3ca22ec29",
                "target_ref": "malware--31b940d4-6f7f-459a-80ea-9c1f17b58abc"
            },
            {
                "type": "report",
                "id": "report--84e4d88f-44ea-4bcd-bbf3-b2c1c320bcb3",
                "name": "Poison Ivy report",
                "object_refs": ["malware--31b940d4-6f7f-459a-80ea-9c1f17b58abc"]
            },
            {
                "type": "x-unknown",
                "id": "x-unknown--1"
            }
        ]))
        .unwrap();

        let plan = plan::plan(&registry, &documents);
        let referenced: Vec<&str> = plan
            .groups(Phase::Referenced)
            .iter()
            .map(|g| g.origin.as_str())
            .collect();
        assert_eq!(
            referenced,
            vec![
                "identity--f431f809-377b-45e0-aa1c-6a4751cae5ff",
                "intrusion-set--4e78f46f-a023-4e5f-bc24-71b3ca22ec29",
                "malware--31b940d4-6f7f-459a-80ea-9c1f17b58abc",
            ]
        );
        assert_eq!(plan.groups(Phase::Entities).len(), 2);
        assert_eq!(plan.groups(Phase::Relationships).len(), 1);
        assert_eq!(plan.groups(Phase::Aggregates).len(), 1);
        assert_eq!(plan.skipped.len(), 1);
    }
}
