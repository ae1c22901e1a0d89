//! STIX cyber-observable objects
//!
//! Observables are keyed by `id` like every other object. Their natural
//! values (`value`, `path`, `number`) are plain attributes so that stubs,
//! which only know the id, merge with the full object.

use super::common::object_properties;
use crate::mapping::{
    AttributeMapping, DocumentMapping, MappingBuilder, PlayerType, PropertyMappings, ReferenceRelation, Registry,
    SchemaError,
};
use crate::plan::Phase;

fn sco(type_label: &str) -> Result<MappingBuilder, SchemaError> {
    DocumentMapping::entity(type_label).include(&object_properties()?)
}

fn reference(field: &str, relation: &str, self_role: &str, player_role: &str) -> ReferenceRelation {
    ReferenceRelation::new(field, "id", relation, self_role, player_role).player_type(PlayerType::IdPrefix)
}

fn file_times(builder: MappingBuilder) -> MappingBuilder {
    builder
        .has(AttributeMapping::raw("ctime", "ctime"))
        .has(AttributeMapping::raw("mtime", "mtime"))
        .has(AttributeMapping::raw("atime", "atime"))
}

fn contains() -> PropertyMappings {
    PropertyMappings::new().reference(reference("contains_refs", "containment", "container", "contained"))
}

/// References from a malware analysis to the environment and samples
pub fn analysis_references() -> PropertyMappings {
    PropertyMappings::new()
        .reference(reference("host_vm_ref", "host-vm", "hosted", "host").single())
        .reference(reference("operating_system_ref", "operating-system", "hosted", "os").single())
        .reference(reference("installed_software_refs", "installed-software", "hosted", "software"))
        .reference(reference("analysis_sco_refs", "analysis-sco", "analyzed", "analysis"))
        .reference(reference("sample_ref", "sample", "source", "sample").single())
}

fn email_references() -> PropertyMappings {
    PropertyMappings::new()
        .reference(reference("from_ref", "header-from", "email", "address").single())
        .reference(reference("sender_ref", "header-sender", "email", "address").single())
        .reference(reference("to_refs", "header-to", "email", "address"))
        .reference(reference("cc_refs", "header-cc", "email", "address"))
        .reference(reference("bcc_refs", "header-bcc", "email", "address"))
        .reference(reference("raw_email_ref", "raw-email", "email", "artifact").single())
}

pub(super) fn register(registry: &mut Registry) -> Result<(), SchemaError> {
    let observables = [
        sco("artifact")?
            .has(AttributeMapping::string("mime_type", "mime-type"))
            .has(AttributeMapping::string("payload_bin", "payload-bin"))
            .has(AttributeMapping::string("url", "artifact-url"))
            .has(AttributeMapping::string("encryption_algorithm", "encryption-algorithm"))
            .has(AttributeMapping::string("decryption_key", "decryption-key"))
            .build()?,
        sco("autonomous-system")?
            .has(AttributeMapping::number("number", "system-number"))
            .has(AttributeMapping::string("name", "system-name"))
            .has(AttributeMapping::string("rir", "rir"))
            .build()?,
        file_times(
            sco("directory")?
                .has(AttributeMapping::string("path", "path"))
                .has(AttributeMapping::string("path_enc", "path-enc")),
        )
        .include(&contains())?
        .build()?,
        sco("domain-name")?
            .has(AttributeMapping::string("value", "domain-value"))
            .build()?,
        sco("email-addr")?
            .has(AttributeMapping::string("value", "email-value"))
            .has(AttributeMapping::string("display_name", "display-name"))
            .build()?,
        sco("email-message")?
            .has(AttributeMapping::boolean("is_multipart", "is-multipart"))
            .has(AttributeMapping::raw("date", "message-date"))
            .has(AttributeMapping::string("content_type", "content-type"))
            .has(AttributeMapping::string("message_id", "message-id"))
            .has(AttributeMapping::string("subject", "subject"))
            .has(AttributeMapping::strings("received_lines", "received-line"))
            .has(AttributeMapping::string("body", "body"))
            .include(&email_references())?
            .build()?,
        file_times(
            sco("file")?
                .has(AttributeMapping::number("size", "size"))
                .has(AttributeMapping::string("name", "name"))
                .has(AttributeMapping::string("name_enc", "name-enc"))
                .has(AttributeMapping::string("magic_number_hex", "magic-number-hex"))
                .has(AttributeMapping::string("mime_type", "mime-type")),
        )
        .include(&contains())?
        .reference(reference("content_ref", "file-content", "file", "content").single())
        .build()?,
        sco("ipv4-addr")?
            .has(AttributeMapping::string("value", "ipv4-value"))
            .build()?,
        sco("ipv6-addr")?
            .has(AttributeMapping::string("value", "ipv6-value"))
            .build()?,
        sco("mac-addr")?
            .has(AttributeMapping::string("value", "mac-value"))
            .build()?,
        sco("mutex")?.has(AttributeMapping::string("name", "name")).build()?,
        sco("software")?
            .has(AttributeMapping::string("name", "name"))
            .has(AttributeMapping::string("cpe", "cpe"))
            .has(AttributeMapping::strings("languages", "software-language"))
            .has(AttributeMapping::string("vendor", "vendor"))
            .has(AttributeMapping::string("version", "version"))
            .build()?,
        sco("url")?.has(AttributeMapping::string("value", "url-value")).build()?,
        sco("user-account")?
            .has(AttributeMapping::string("user_id", "user-id"))
            .has(AttributeMapping::string("account_login", "account-login"))
            .has(AttributeMapping::string("account_type", "account-type"))
            .has(AttributeMapping::string("display_name", "display-name"))
            .has(AttributeMapping::boolean("is_service_account", "is-service-account"))
            .has(AttributeMapping::boolean("is_privileged", "is-privileged"))
            .has(AttributeMapping::boolean("can_escalate_privs", "can-escalate-privs"))
            .has(AttributeMapping::boolean("is_disabled", "is-disabled"))
            .has(AttributeMapping::raw("account_created", "account-created"))
            .has(AttributeMapping::raw("account_expires", "account-expires"))
            .build()?,
        sco("windows-registry-key")?
            .has(AttributeMapping::string("key", "registry-key"))
            .has(AttributeMapping::raw("modified_time", "modified-time"))
            .has(AttributeMapping::number("number_of_subkeys", "number-of-subkeys"))
            .build()?,
        sco("x509-certificate")?
            .has(AttributeMapping::boolean("is_self_signed", "is-self-signed"))
            .has(AttributeMapping::string("version", "version"))
            .has(AttributeMapping::string("serial_number", "serial-number"))
            .has(AttributeMapping::string("signature_algorithm", "signature-algorithm"))
            .has(AttributeMapping::string("issuer", "issuer"))
            .has(AttributeMapping::raw("validity_not_before", "validity-not-before"))
            .has(AttributeMapping::raw("validity_not_after", "validity-not-after"))
            .has(AttributeMapping::string("subject", "subject"))
            .build()?,
    ];

    for mapping in observables {
        registry.register(mapping.type_label().to_string(), mapping, Phase::Entities)?;
    }
    Ok(())
}
