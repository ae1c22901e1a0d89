//! Phase planner
//!
//! Compiles a bundle into statement groups and orders them into phases so
//! that every object a group matches on is committed in an earlier phase:
//!
//! ```text
//! 1 referenced        keyed stubs for every object named by a reference field
//! 2 entities          domain objects and observables
//! 3 relationships     relation-rooted documents
//! 4 aggregates        containers that may reference relationships
//! 5 cross-references  relation-rooted documents that name containers
//! ```
//!
//! A stub carries only the key of the referenced object, so the full
//! document compiled later in its own phase resolves to the same object
//! through create-if-absent.

use crate::input::Document;
use crate::mapping::Registry;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Load phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Referenced,
    Entities,
    Relationships,
    Aggregates,
    CrossReferences,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Referenced,
        Phase::Entities,
        Phase::Relationships,
        Phase::Aggregates,
        Phase::CrossReferences,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Referenced => "referenced",
            Phase::Entities => "entities",
            Phase::Relationships => "relationships",
            Phase::Aggregates => "aggregates",
            Phase::CrossReferences => "cross-references",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The compiled pipeline of one document, executed as one query
#[derive(Debug, Clone, PartialEq)]
pub struct StatementGroup {
    /// Document id (or type and position) the group came from
    pub origin: String,
    pub query: String,
}

/// A document left out of the plan
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDocument {
    pub origin: String,
    pub reason: String,
}

/// Statement groups per phase
#[derive(Debug, Clone)]
pub struct Plan {
    phases: Vec<(Phase, Vec<StatementGroup>)>,
    pub skipped: Vec<SkippedDocument>,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            phases: Phase::ALL.iter().map(|p| (*p, Vec::new())).collect(),
            skipped: Vec::new(),
        }
    }
}

impl Plan {
    pub fn groups(&self, phase: Phase) -> &[StatementGroup] {
        self.phases
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, groups)| groups.as_slice())
            .unwrap_or(&[])
    }

    pub fn phases(&self) -> impl Iterator<Item = (Phase, &[StatementGroup])> {
        self.phases.iter().map(|(p, groups)| (*p, groups.as_slice()))
    }

    pub fn into_phases(self) -> Vec<(Phase, Vec<StatementGroup>)> {
        self.phases
    }

    /// Total number of statement groups across phases
    pub fn len(&self) -> usize {
        self.phases.iter().map(|(_, groups)| groups.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, phase: Phase, group: StatementGroup) {
        if let Some((_, groups)) = self.phases.iter_mut().find(|(p, _)| *p == phase) {
            groups.push(group);
        }
    }

    fn skip(&mut self, origin: String, reason: String) {
        tracing::warn!(origin = %origin, reason = %reason, "skipping document");
        self.skipped.push(SkippedDocument { origin, reason });
    }
}

/// Compile `documents` into a phased plan
pub fn plan(registry: &Registry, documents: &[Document]) -> Plan {
    let mut plan = Plan::default();

    let mut by_id: HashMap<&str, usize> = HashMap::new();
    for (index, doc) in documents.iter().enumerate() {
        if let Some(id) = doc.id() {
            by_id.entry(id).or_insert(index);
        }
    }

    let mut seen = HashSet::new();
    for doc in documents {
        let Some(entry) = registry.resolve(doc) else {
            continue;
        };
        for id in entry.mapping.referenced_values(doc) {
            if !seen.insert(id.clone()) {
                continue;
            }
            let target = match by_id.get(id.as_str()) {
                Some(&index) => registry.resolve(&documents[index]),
                None => registry.resolve_id(&id),
            };
            let Some((mapping, stub)) = target.and_then(|t| t.mapping.stub(&id).map(|s| (&t.mapping, s))) else {
                tracing::debug!(id = %id, "referenced object has no stub; relying on phase order");
                continue;
            };
            match mapping.compile(&stub) {
                Ok(pipeline) => plan.push(
                    Phase::Referenced,
                    StatementGroup {
                        origin: id.clone(),
                        query: pipeline.render(),
                    },
                ),
                Err(e) => plan.skip(id.clone(), e.to_string()),
            }
        }
    }

    for (index, doc) in documents.iter().enumerate() {
        let origin = doc.origin(index);
        let Some(type_name) = doc.type_name() else {
            plan.skip(origin, crate::mapping::CompileError::MissingType.to_string());
            continue;
        };
        let Some(entry) = registry.resolve(doc) else {
            plan.skip(origin, format!("no mapping registered for type '{}'", type_name));
            continue;
        };
        match entry.mapping.compile(doc) {
            Ok(pipeline) => plan.push(
                entry.phase,
                StatementGroup {
                    origin,
                    query: pipeline.render(),
                },
            ),
            Err(e) => plan.skip(origin, e.to_string()),
        }
    }

    tracing::debug!(groups = plan.len(), skipped = plan.skipped.len(), "planned bundle");
    plan
}
