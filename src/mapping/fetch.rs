//! Fetch compiler
//!
//! Builds the read query that returns a stored object in the shape of the
//! document it was written from, then normalizes the answer back into that
//! shape. The projection mirrors the mapping:
//!
//! ```text
//! key / attribute        "field": $x.attr        or  [ $x.attr ] when multi-valued
//! embedded relation      "field": [ match <link>; fetch { nested projection }; ]
//! reference (one)        "field": match <link>; return first $key;
//! reference (many)       "field": [ match <link>; return { $key }; ]
//! player link            same as reference, over the relation's own players
//! ```

use super::compile::CompileError;
use super::relation::Multiplicity;
use super::scope::Scope;
use super::DocumentMapping;
use crate::input::Value;
use serde_json::Map;
use std::collections::HashSet;
use tql::{
    Entry, FetchQuery, Output, Projected, Projection, RolePlayer, Statement, Subquery, Term, Variable,
};

/// `$var isa <type>, has <first key> <value>;`
pub fn match_by_key(mapping: &DocumentMapping, var: &Variable, key: &Value) -> Result<Statement, CompileError> {
    let key_mapping = mapping
        .properties()
        .keys
        .first()
        .ok_or_else(|| CompileError::NoKey {
            type_label: mapping.type_label().to_string(),
        })?;
    Ok(Statement::isa(var, mapping.type_label()).and(key_mapping.constraint(key)?))
}

/// Fetch query for the object of `mapping`'s type whose first key is `key`
pub fn fetch_query(mapping: &DocumentMapping, key: &Value) -> Result<FetchQuery, CompileError> {
    let scope = Scope::root();
    let var = scope.bind(mapping.type_label());
    Ok(FetchQuery {
        pattern: vec![match_by_key(mapping, &var, key)?],
        projection: projection(mapping, &scope),
    })
}

/// Projection of the subject bound in `scope`
pub fn projection(mapping: &DocumentMapping, scope: &Scope) -> Projection {
    let var = scope.bind(mapping.type_label());
    let props = mapping.properties();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut push = |key: &str, value: Projected| {
        if seen.insert(key.to_string()) {
            entries.push(Entry {
                key: key.to_string(),
                value,
            });
        }
    };

    for m in props.keys.iter().chain(props.attributes.iter()) {
        push(
            &m.field,
            Projected::Attribute {
                var: var.clone(),
                attribute: m.attribute.clone(),
                many: m.is_multi(),
            },
        );
    }

    for e in &props.embedded {
        let nested_scope = scope.child(&e.field, None);
        let nested_var = nested_scope.bind(e.mapping.type_label());
        let query = Subquery {
            pattern: vec![
                Statement::relation(
                    &e.relation,
                    vec![
                        RolePlayer::new(&e.self_role, var.clone()),
                        RolePlayer::new(&e.other_role, nested_var.clone()),
                    ],
                ),
                Statement::isa(&nested_var, e.mapping.type_label()),
            ],
            output: Output::Fetch(projection(&e.mapping, &nested_scope)),
        };
        push(
            &e.field,
            Projected::Subquery {
                many: true,
                query: Box::new(query),
            },
        );
    }

    for r in &props.references {
        let ref_scope = scope.child(&r.field, None);
        let player = ref_scope.bind("ref");
        let key = ref_scope.bind("key");
        let pattern = vec![
            Statement::relation(
                &r.relation,
                vec![
                    RolePlayer::new(&r.self_role, var.clone()),
                    RolePlayer::new(&r.player_role, player.clone()),
                ],
            ),
            Statement::has(&player, &r.key_attribute, Term::Variable(key.clone())),
        ];
        push(&r.field, key_subquery(pattern, key, r.multiplicity));
    }

    for l in &props.links {
        let link_scope = scope.child(&l.field, None);
        let player = link_scope.bind("player");
        let key = link_scope.bind("key");
        let pattern = vec![
            Statement::links(&var, vec![RolePlayer::new(&l.role, player.clone())]),
            Statement::has(&player, &l.key_attribute, Term::Variable(key.clone())),
        ];
        push(&l.field, key_subquery(pattern, key, l.multiplicity));
    }

    Projection { entries }
}

fn key_subquery(pattern: Vec<Statement>, key: Variable, multiplicity: Multiplicity) -> Projected {
    let (many, output) = match multiplicity {
        Multiplicity::One => (false, Output::First(key)),
        Multiplicity::Many => (true, Output::All(key)),
    };
    Projected::Subquery {
        many,
        query: Box::new(Subquery { pattern, output }),
    }
}

/// Reshape a fetch answer into document form
///
/// Absent values and empty lists are dropped, single-valued embedded objects
/// and references are unwrapped, so a schema-consistent document compares
/// equal to the normalized answer for the object written from it.
pub fn normalize(mapping: &DocumentMapping, answer: &serde_json::Value) -> serde_json::Value {
    let Some(object) = answer.as_object() else {
        return serde_json::Value::Null;
    };
    let props = mapping.properties();
    let mut out = Map::new();

    for m in props.keys.iter().chain(props.attributes.iter()) {
        if let Some(value) = object.get(&m.field).filter(|v| is_present(v)) {
            out.entry(m.field.clone()).or_insert_with(|| value.clone());
        }
    }

    for e in &props.embedded {
        let nested: Vec<serde_json::Value> = as_list(object.get(&e.field))
            .into_iter()
            .map(|item| normalize(&e.mapping, item))
            .filter(is_present)
            .collect();
        let value = match e.multiplicity {
            Multiplicity::One => nested.into_iter().next(),
            Multiplicity::Many => Some(serde_json::Value::Array(nested)).filter(is_present),
        };
        if let Some(value) = value {
            out.entry(e.field.clone()).or_insert(value);
        }
    }

    let keyed = props
        .references
        .iter()
        .map(|r| (&r.field, r.multiplicity))
        .chain(props.links.iter().map(|l| (&l.field, l.multiplicity)));
    for (field, multiplicity) in keyed {
        let values: Vec<serde_json::Value> = as_list(object.get(field))
            .into_iter()
            .filter(|v| is_present(v))
            .cloned()
            .collect();
        let value = match multiplicity {
            Multiplicity::One => values.into_iter().next(),
            Multiplicity::Many => Some(serde_json::Value::Array(values)).filter(is_present),
        };
        if let Some(value) = value {
            out.entry(field.clone()).or_insert(value);
        }
    }

    serde_json::Value::Object(out)
}

fn as_list(value: Option<&serde_json::Value>) -> Vec<&serde_json::Value> {
    match value {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

fn is_present(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{AttributeMapping, EmbeddedRelation, ReferenceRelation};
    use serde_json::json;
    use std::sync::Arc;

    fn person() -> Arc<DocumentMapping> {
        DocumentMapping::entity("person")
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::string("name", "name"))
            .has(AttributeMapping::strings("aliases", "alias"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_person_fetch_query() {
        let query = fetch_query(&person(), &"p1".into()).unwrap();
        assert_eq!(
            query.to_string(),
            "match\n$person isa person, has id 'p1';\nfetch {\n  \"id\": $person.id,\n  \"name\": $person.name,\n  \"aliases\": [ $person.alias ]\n};"
        );
        assert_eq!(tql::parse_fetch(&query.to_string()).unwrap(), query);
    }

    #[test]
    fn test_fetch_requires_key() {
        let keyless = DocumentMapping::entity("note").build().unwrap();
        assert!(matches!(
            fetch_query(&keyless, &"x".into()),
            Err(CompileError::NoKey { .. })
        ));
    }

    #[test]
    fn test_projection_shapes() {
        let reference = DocumentMapping::entity("external-reference")
            .has(AttributeMapping::string("source_name", "source-name"))
            .build()
            .unwrap();
        let mapping = DocumentMapping::entity("malware")
            .key(AttributeMapping::string("id", "id"))
            .embedded(EmbeddedRelation::new(
                "external_references",
                reference,
                "external-referencing",
                "referencing",
                "referenced",
            ))
            .reference(ReferenceRelation::new("created_by_ref", "id", "created-by", "created", "creator").single())
            .reference(ReferenceRelation::new("object_marking_refs", "id", "object-marking", "marked", "marking"))
            .build()
            .unwrap();

        let query = fetch_query(&mapping, &"malware--1".into()).unwrap();
        let text = query.to_string();
        assert!(text.contains(
            "\"external_references\": [ match (referencing: $malware, referenced: $external_references_external-reference) isa external-referencing;"
        ));
        assert!(text.contains("\"created_by_ref\": match (created: $malware, creator: $created_by_ref_ref) isa created-by; $created_by_ref_ref has id $created_by_ref_key; return first $created_by_ref_key;"));
        assert!(text.contains("return { $object_marking_refs_key }; ]"));
        assert_eq!(tql::parse_fetch(&text).unwrap(), query);
    }

    #[test]
    fn test_normalize_drops_empty_and_unwraps_single() {
        let inner = DocumentMapping::entity("content")
            .has(AttributeMapping::string("statement", "statement"))
            .build()
            .unwrap();
        let mapping = DocumentMapping::entity("marking")
            .key(AttributeMapping::string("id", "id"))
            .has(AttributeMapping::strings("labels", "label_"))
            .has(AttributeMapping::string("name", "name"))
            .embedded(EmbeddedRelation::new("definition", inner, "defining", "defined", "content").single())
            .reference(ReferenceRelation::new("created_by_ref", "id", "created-by", "created", "creator").single())
            .build()
            .unwrap();

        let answer = json!({
            "id": "m1",
            "labels": [],
            "name": null,
            "definition": [{"statement": "Copyright"}],
            "created_by_ref": "identity--1"
        });
        assert_eq!(
            normalize(&mapping, &answer),
            json!({
                "id": "m1",
                "definition": {"statement": "Copyright"},
                "created_by_ref": "identity--1"
            })
        );
    }

    #[test]
    fn test_normalize_non_object() {
        assert_eq!(normalize(&person(), &json!(null)), serde_json::Value::Null);
    }
}
