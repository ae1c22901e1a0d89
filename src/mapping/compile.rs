//! Document compiler
//!
//! Turns a document into an ordered write pipeline. Stages always come in
//! this order, and empty stages are dropped:
//!
//! ```text
//! [participants]  match every player of a relation-rooted document
//! identity        put (keyed) or insert (keyless) the subject and its keys
//! attributes      insert the remaining attributes
//! embedded        nested pipelines, each followed by its link
//! references      per value: match the referenced object, insert the link
//! links           insert the players of a relation-rooted document
//! ```
//!
//! Compilation is pure: the same document and mapping always yield the same
//! text, and nothing here touches a store.

use super::relation::indexed_values;
use super::scope::Scope;
use super::{DocumentMapping, RootKind};
use crate::input::{Document, Value};
use thiserror::Error;
use tql::{Stage, StageKind, Statement, WriteQuery};

/// Errors compiling a single document
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("Document has no 'type' field")]
    MissingType,

    #[error("Malformed value for field '{field}': {reason}")]
    Malformed { field: String, reason: &'static str },

    #[error("Relation document of type '{type_label}' names no players")]
    NoParticipants { type_label: String },

    #[error("Type '{type_label}' declares no key to look objects up by")]
    NoKey { type_label: String },

    #[error("Document of type '{type_label}' has no value for key field '{field}'")]
    MissingKey { type_label: String, field: String },
}

/// Which part of the compiled document a stage belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageRole {
    Participants,
    Identity,
    Attributes,
    Embedded,
    Reference,
    Link,
}

/// Ordered write stages for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<(StageRole, Stage)>,
}

impl Pipeline {
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().map(|(_, stage)| stage)
    }

    pub fn roles(&self) -> Vec<StageRole> {
        self.stages.iter().map(|(role, _)| *role).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Each stage rendered on its own
    pub fn to_strings(&self) -> Vec<String> {
        self.stages().map(|stage| stage.to_string()).collect()
    }

    pub fn to_query(&self) -> WriteQuery {
        WriteQuery {
            stages: self.stages().cloned().collect(),
        }
    }

    /// The whole pipeline as one query string
    pub fn render(&self) -> String {
        self.to_query().to_string()
    }

    fn push(&mut self, role: StageRole, stage: Stage) {
        if !stage.statements.is_empty() {
            self.stages.push((role, stage));
        }
    }

    /// Append a nested pipeline, re-tagged as part of `role`
    fn absorb(&mut self, role: StageRole, nested: Pipeline) {
        self.stages
            .extend(nested.stages.into_iter().map(|(_, stage)| (role, stage)));
    }
}

/// Compile `doc` with `mapping`, naming variables from `scope`
pub fn compile(mapping: &DocumentMapping, doc: &Document, scope: &Scope) -> Result<Pipeline, CompileError> {
    let subject = scope.bind(mapping.type_label());
    let props = mapping.properties();
    let mut pipeline = Pipeline::default();

    // Players must exist before the relation is touched
    let mut links = Vec::new();
    if mapping.root() == RootKind::Relation {
        let mut lookups = Vec::new();
        for link in &props.links {
            for (index, value) in indexed_values(doc.get(&link.field)) {
                let (lookup, statement) = link.statements(&subject, scope, index, value)?;
                lookups.push(lookup);
                links.push(statement);
            }
        }
        if lookups.is_empty() {
            return Err(CompileError::NoParticipants {
                type_label: mapping.type_label().to_string(),
            });
        }
        pipeline.push(StageRole::Participants, Stage::new(StageKind::Match, lookups));
    }

    let mut identity = vec![Statement::isa(&subject, mapping.type_label())];
    for key in &props.keys {
        let statements = key.render(&subject, doc.get(&key.field))?;
        // A partial key would let put bind some unrelated object
        if statements.is_empty() {
            return Err(CompileError::MissingKey {
                type_label: mapping.type_label().to_string(),
                field: key.field.clone(),
            });
        }
        identity.extend(statements);
    }
    let mode = if mapping.has_key() { StageKind::Put } else { StageKind::Insert };
    pipeline.push(StageRole::Identity, Stage::new(mode, identity));

    let mut attributes = Vec::new();
    for attribute in &props.attributes {
        attributes.extend(attribute.render(&subject, doc.get(&attribute.field))?);
    }
    pipeline.push(StageRole::Attributes, Stage::new(StageKind::Insert, attributes));

    for embedded in &props.embedded {
        for (index, value) in indexed_values(doc.get(&embedded.field)) {
            let fields = match value {
                Value::Object(fields) => fields,
                _ => {
                    return Err(CompileError::Malformed {
                        field: embedded.field.clone(),
                        reason: "expected a nested object",
                    })
                }
            };
            let nested_scope = scope.child(&embedded.field, index);
            let nested_doc = Document::from(fields.clone());
            let nested = compile(&embedded.mapping, &nested_doc, &nested_scope)?;
            let nested_var = nested_scope.bind(embedded.mapping.type_label());
            pipeline.absorb(StageRole::Embedded, nested);
            pipeline.push(StageRole::Embedded, embedded.link(&subject, &nested_var));
        }
    }

    for reference in &props.references {
        for (index, value) in indexed_values(doc.get(&reference.field)) {
            let [matched, link] = reference.stages(&subject, scope, index, value)?;
            pipeline.push(StageRole::Reference, matched);
            pipeline.push(StageRole::Reference, link);
        }
    }

    pipeline.push(StageRole::Link, Stage::new(StageKind::Insert, links));

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{
        AttributeMapping, EmbeddedRelation, LinkRelation, PlayerType, ReferenceRelation,
    };
    use std::sync::Arc;

    fn person() -> Arc<DocumentMapping> {
        DocumentMapping::entity("person")
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::string("name", "name"))
            .has(AttributeMapping::strings("aliases", "alias"))
            .build()
            .unwrap()
    }

    fn doc(json: serde_json::Value) -> Document {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_entity_identity_and_attributes() {
        let pipeline = person()
            .compile(&doc(serde_json::json!({"type": "person", "id": "p1", "name": "Ana"})))
            .unwrap();

        assert_eq!(
            pipeline.to_strings(),
            vec![
                "put\n$person isa person;\n$person has id 'p1';",
                "insert\n$person has name 'Ana';",
            ]
        );
        assert_eq!(pipeline.roles(), vec![StageRole::Identity, StageRole::Attributes]);
    }

    #[test]
    fn test_keyless_uses_insert() {
        let mapping = DocumentMapping::entity("note")
            .has(AttributeMapping::string("content", "content"))
            .build()
            .unwrap();
        let pipeline = mapping
            .compile(&doc(serde_json::json!({"content": "hi"})))
            .unwrap();
        assert_eq!(pipeline.to_strings()[0], "insert\n$note isa note;");
    }

    #[test]
    fn test_absent_fields_drop_stages() {
        let pipeline = person()
            .compile(&doc(serde_json::json!({"id": "p1", "name": null, "aliases": []})))
            .unwrap();
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_missing_key_fails() {
        for json in [
            serde_json::json!({"type": "person", "name": "Mallory"}),
            serde_json::json!({"type": "person", "id": null, "name": "Mallory"}),
        ] {
            let result = person().compile(&doc(json));
            assert_eq!(
                result,
                Err(CompileError::MissingKey {
                    type_label: "person".into(),
                    field: "id".into()
                })
            );
        }
    }

    #[test]
    fn test_partial_composite_key_fails() {
        let phase = DocumentMapping::entity("kill-chain-phase")
            .key(AttributeMapping::string("kill_chain_name", "kill-chain-name"))
            .key(AttributeMapping::string("phase_name", "phase-name"))
            .build()
            .unwrap();
        let mapping = DocumentMapping::entity("malware")
            .key(AttributeMapping::string("id", "id"))
            .embedded(EmbeddedRelation::new("kill_chain_phases", phase, "kill-chain-usage", "used", "phase"))
            .build()
            .unwrap();

        let result = mapping.compile(&doc(serde_json::json!({
            "id": "malware--1",
            "kill_chain_phases": [{"kill_chain_name": "lockheed"}]
        })));
        assert!(matches!(
            result,
            Err(CompileError::MissingKey { ref field, .. }) if field == "phase_name"
        ));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let d = doc(serde_json::json!({"id": "p1", "name": "Ana", "aliases": ["A", "B"]}));
        let mapping = person();
        assert_eq!(mapping.compile(&d).unwrap().render(), mapping.compile(&d).unwrap().render());
    }

    #[test]
    fn test_embedded_nested_pipeline_precedes_link() {
        let phase = DocumentMapping::entity("kill-chain-phase")
            .key(AttributeMapping::string("kill_chain_name", "kill-chain-name"))
            .key(AttributeMapping::string("phase_name", "phase-name"))
            .build()
            .unwrap();
        let mapping = DocumentMapping::entity("malware")
            .key(AttributeMapping::string("id", "id"))
            .embedded(EmbeddedRelation::new("kill_chain_phases", phase, "kill-chain-usage", "used", "phase"))
            .build()
            .unwrap();

        let pipeline = mapping
            .compile(&doc(serde_json::json!({
                "id": "malware--1",
                "kill_chain_phases": [
                    {"kill_chain_name": "lockheed", "phase_name": "recon"},
                    {"kill_chain_name": "lockheed", "phase_name": "delivery"}
                ]
            })))
            .unwrap();

        let stages = pipeline.to_strings();
        assert_eq!(stages.len(), 5);
        assert_eq!(
            stages[1],
            "put\n$kill_chain_phases_0_kill-chain-phase isa kill-chain-phase;\n\
             $kill_chain_phases_0_kill-chain-phase has kill-chain-name 'lockheed';\n\
             $kill_chain_phases_0_kill-chain-phase has phase-name 'recon';"
        );
        assert_eq!(
            stages[2],
            "insert\n(used: $malware, phase: $kill_chain_phases_0_kill-chain-phase) isa kill-chain-usage;"
        );
        assert!(stages[3].contains("$kill_chain_phases_1_kill-chain-phase"));
    }

    #[test]
    fn test_embedded_requires_object() {
        let inner = DocumentMapping::entity("thing").build().unwrap();
        let mapping = DocumentMapping::entity("box")
            .embedded(EmbeddedRelation::new("items", inner, "containment", "container", "item"))
            .build()
            .unwrap();
        let result = mapping.compile(&doc(serde_json::json!({"items": ["not-an-object"]})));
        assert!(matches!(result, Err(CompileError::Malformed { .. })));
    }

    #[test]
    fn test_references_after_embedded() {
        let mapping = DocumentMapping::entity("indicator")
            .key(AttributeMapping::string("id", "id"))
            .reference(
                ReferenceRelation::new("created_by_ref", "id", "created-by", "created", "creator")
                    .single()
                    .player_type(PlayerType::IdPrefix),
            )
            .reference(ReferenceRelation::new("object_marking_refs", "id", "object-marking", "marked", "marking"))
            .build()
            .unwrap();

        let pipeline = mapping
            .compile(&doc(serde_json::json!({
                "id": "indicator--1",
                "created_by_ref": "identity--1",
                "object_marking_refs": ["marking-definition--1", "marking-definition--2"]
            })))
            .unwrap();

        assert_eq!(pipeline.len(), 7);
        let stages = pipeline.to_strings();
        assert_eq!(stages[1], "match\n$created_by_ref_ref isa identity, has id 'identity--1';");
        assert_eq!(
            stages[4],
            "insert\n(marked: $indicator, marking: $object_marking_refs_0_ref) isa object-marking;"
        );
        assert!(stages[5].contains("$object_marking_refs_1_ref"));
    }

    #[test]
    fn test_relation_root() {
        let mapping = DocumentMapping::relation("friendship")
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::raw("since", "since"))
            .link(LinkRelation::new("source", "id", "friend").single())
            .link(LinkRelation::new("target", "id", "friend").single())
            .build()
            .unwrap();

        let pipeline = mapping
            .compile(&doc(serde_json::json!({
                "type": "knows", "id": "k1", "source": "p1", "target": "p2", "since": "2020-01-01"
            })))
            .unwrap();

        assert_eq!(
            pipeline.roles(),
            vec![
                StageRole::Participants,
                StageRole::Identity,
                StageRole::Attributes,
                StageRole::Link
            ]
        );
        assert_eq!(
            pipeline.to_strings(),
            vec![
                "match\n$source_player has id 'p1';\n$target_player has id 'p2';",
                "put\n$friendship isa friendship;\n$friendship has id 'k1';",
                "insert\n$friendship has since 2020-01-01;",
                "insert\n$friendship links (friend: $source_player);\n$friendship links (friend: $target_player);",
            ]
        );
    }

    #[test]
    fn test_relation_without_players_fails() {
        let mapping = DocumentMapping::relation("friendship")
            .link(LinkRelation::new("source", "id", "friend"))
            .build()
            .unwrap();
        let result = mapping.compile(&doc(serde_json::json!({"id": "k1"})));
        assert!(matches!(result, Err(CompileError::NoParticipants { .. })));
    }

    #[test]
    fn test_stage_roles_are_ordered() {
        let mapping = DocumentMapping::entity("indicator")
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::string("name", "name"))
            .reference(ReferenceRelation::new("created_by_ref", "id", "created-by", "created", "creator"))
            .build()
            .unwrap();
        let pipeline = mapping
            .compile(&doc(serde_json::json!({"id": "i1", "name": "n", "created_by_ref": "x"})))
            .unwrap();
        let roles = pipeline.roles();
        let mut sorted = roles.clone();
        sorted.sort();
        assert_eq!(roles, sorted);
    }

    #[test]
    fn test_rendered_pipeline_parses() {
        let d = doc(serde_json::json!({"id": "p'1", "name": "Ana \"A\"", "aliases": ["x"]}));
        let query = person().compile(&d).unwrap().to_query();
        assert_eq!(tql::parse_write(&query.to_string()).unwrap(), query);
    }
}
