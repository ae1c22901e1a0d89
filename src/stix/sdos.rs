//! STIX domain objects

use super::common::{kill_chain_phases, object_properties, object_references};
use crate::mapping::{AttributeMapping, DocumentMapping, MappingBuilder, Registry, SchemaError};
use crate::plan::Phase;

fn sdo(type_label: &str) -> Result<MappingBuilder, SchemaError> {
    DocumentMapping::entity(type_label).include(&object_properties()?)
}

fn named(type_label: &str) -> Result<MappingBuilder, SchemaError> {
    Ok(sdo(type_label)?
        .has(AttributeMapping::string("name", "name"))
        .has(AttributeMapping::string("description", "description")))
}

fn seen(builder: MappingBuilder) -> MappingBuilder {
    builder
        .has(AttributeMapping::raw("first_seen", "first-seen"))
        .has(AttributeMapping::raw("last_seen", "last-seen"))
}

fn motivations(builder: MappingBuilder) -> MappingBuilder {
    builder
        .has(AttributeMapping::strings("goals", "goal"))
        .has(AttributeMapping::string("resource_level", "resource-level"))
        .has(AttributeMapping::string("primary_motivation", "primary-motivation"))
        .has(AttributeMapping::strings("secondary_motivations", "secondary-motivation"))
}

pub(super) fn register(registry: &mut Registry) -> Result<(), SchemaError> {
    let entities = [
        named("attack-pattern")?
            .has(AttributeMapping::strings("aliases", "alias"))
            .include(&kill_chain_phases()?)?
            .build()?,
        seen(named("campaign")?.has(AttributeMapping::strings("aliases", "alias")))
            .has(AttributeMapping::string("objective", "objective"))
            .build()?,
        named("course-of-action")?.build()?,
        named("identity")?
            .has(AttributeMapping::strings("roles", "identity-role"))
            .has(AttributeMapping::string("identity_class", "identity-class"))
            .has(AttributeMapping::strings("sectors", "sector"))
            .has(AttributeMapping::string("contact_information", "contact-information"))
            .build()?,
        named("incident")?.include(&kill_chain_phases()?)?.build()?,
        named("indicator")?
            .has(AttributeMapping::strings("indicator_types", "indicator-type"))
            .has(AttributeMapping::string("pattern", "pattern"))
            .has(AttributeMapping::string("pattern_type", "pattern-type"))
            .has(AttributeMapping::string("pattern_version", "pattern-version"))
            .has(AttributeMapping::raw("valid_from", "valid-from"))
            .has(AttributeMapping::raw("valid_until", "valid-until"))
            .include(&kill_chain_phases()?)?
            .build()?,
        seen(
            named("infrastructure")?
                .has(AttributeMapping::strings("infrastructure_types", "infrastructure-type"))
                .has(AttributeMapping::strings("aliases", "alias")),
        )
        .include(&kill_chain_phases()?)?
        .build()?,
        motivations(seen(named("intrusion-set")?.has(AttributeMapping::strings("aliases", "alias")))).build()?,
        named("location")?
            .has(AttributeMapping::number("latitude", "latitude"))
            .has(AttributeMapping::number("longitude", "longitude"))
            .has(AttributeMapping::number("precision", "precision"))
            .has(AttributeMapping::string("region", "region"))
            .has(AttributeMapping::string("country", "country"))
            .has(AttributeMapping::string("administrative_area", "administrative-area"))
            .has(AttributeMapping::string("city", "city"))
            .has(AttributeMapping::string("street_address", "street-address"))
            .has(AttributeMapping::string("postal_code", "postal-code"))
            .build()?,
        seen(
            named("malware")?
                .has(AttributeMapping::strings("malware_types", "malware-type"))
                .has(AttributeMapping::boolean("is_family", "is-family"))
                .has(AttributeMapping::strings("aliases", "alias")),
        )
        .has(AttributeMapping::strings("architecture_execution_envs", "architecture-execution-env"))
        .has(AttributeMapping::strings("implementation_languages", "implementation-language"))
        .has(AttributeMapping::strings("capabilities", "capability"))
        .include(&kill_chain_phases()?)?
        .build()?,
        sdo("malware-analysis")?
            .has(AttributeMapping::string("product", "product"))
            .has(AttributeMapping::string("version", "version"))
            .has(AttributeMapping::string("configuration_version", "configuration-version"))
            .has(AttributeMapping::strings("modules", "analysis-module"))
            .has(AttributeMapping::string("analysis_engine_version", "analysis-engine-version"))
            .has(AttributeMapping::string("analysis_definition_version", "analysis-definition-version"))
            .has(AttributeMapping::raw("submitted", "submitted"))
            .has(AttributeMapping::raw("analysis_started", "analysis-started"))
            .has(AttributeMapping::raw("analysis_ended", "analysis-ended"))
            .has(AttributeMapping::string("result_name", "result-name"))
            .has(AttributeMapping::string("result", "analysis-result"))
            .include(&super::scos::analysis_references())?
            .build()?,
        motivations(
            seen(
                named("threat-actor")?
                    .has(AttributeMapping::strings("threat_actor_types", "threat-actor-type"))
                    .has(AttributeMapping::strings("aliases", "alias")),
            )
            .has(AttributeMapping::strings("roles", "threat-actor-role"))
            .has(AttributeMapping::string("sophistication", "sophistication")),
        )
        .has(AttributeMapping::strings("personal_motivations", "personal-motivation"))
        .build()?,
        named("tool")?
            .has(AttributeMapping::strings("tool_types", "tool-type"))
            .has(AttributeMapping::strings("aliases", "alias"))
            .has(AttributeMapping::string("tool_version", "tool-version"))
            .include(&kill_chain_phases()?)?
            .build()?,
        named("vulnerability")?.build()?,
    ];
    for mapping in entities {
        registry.register(mapping.type_label().to_string(), mapping, Phase::Entities)?;
    }

    // Containers reference objects from every earlier phase
    let aggregates = [
        named("grouping")?
            .has(AttributeMapping::string("context", "context"))
            .include(&object_references())?
            .build()?,
        named("report")?
            .has(AttributeMapping::strings("report_types", "report-type"))
            .has(AttributeMapping::raw("published", "published"))
            .include(&object_references())?
            .build()?,
        sdo("note")?
            .has(AttributeMapping::string("abstract", "abstract-text"))
            .has(AttributeMapping::string("content", "content"))
            .has(AttributeMapping::strings("authors", "author"))
            .include(&object_references())?
            .build()?,
        sdo("opinion")?
            .has(AttributeMapping::string("explanation", "explanation"))
            .has(AttributeMapping::strings("authors", "author"))
            .has(AttributeMapping::string("opinion", "opinion-value"))
            .include(&object_references())?
            .build()?,
        sdo("observed-data")?
            .has(AttributeMapping::raw("first_observed", "first-observed"))
            .has(AttributeMapping::raw("last_observed", "last-observed"))
            .has(AttributeMapping::number("number_observed", "number-observed"))
            .include(&object_references())?
            .build()?,
    ];
    for mapping in aggregates {
        registry.register(mapping.type_label().to_string(), mapping, Phase::Aggregates)?;
    }

    Ok(())
}
