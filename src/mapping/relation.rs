//! Relation descriptors
//!
//! Three ways a document field turns into a relation:
//! - `EmbeddedRelation`: the field holds nested objects that are created
//!   alongside the subject and linked to it
//! - `ReferenceRelation`: the field holds keys of objects that already exist;
//!   they are matched and linked to the subject
//! - `LinkRelation`: on a relation-rooted document, the field holds keys of
//!   the players the relation itself connects

use super::attribute::{present_values, to_literal};
use super::compile::CompileError;
use super::scope::Scope;
use super::DocumentMapping;
use crate::input::Value;
use crate::validation::type_prefix;
use std::sync::Arc;
use tql::{Constraint, RolePlayer, Stage, StageKind, Statement, Term, Variable};

/// How many values a relation field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    One,
    Many,
}

/// Type constraint placed on a matched player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerType {
    /// Match by key alone
    Any,
    /// Always this type
    Fixed(String),
    /// The `<type>--` prefix of the key value
    IdPrefix,
}

impl PlayerType {
    fn resolve(&self, value: &Value) -> Option<String> {
        match self {
            PlayerType::Any => None,
            PlayerType::Fixed(label) => Some(label.clone()),
            PlayerType::IdPrefix => value.as_str().and_then(type_prefix).map(str::to_string),
        }
    }
}

/// `$player isa <type>, has <key> <value>;`
fn lookup(
    player: &Variable,
    player_type: &PlayerType,
    field: &str,
    key_attribute: &str,
    value: &Value,
    quoted: bool,
) -> Result<Statement, CompileError> {
    let mut constraints = Vec::new();
    if let Some(label) = player_type.resolve(value) {
        constraints.push(Constraint::Isa(label));
    }
    constraints.push(Constraint::Has {
        attribute: key_attribute.to_string(),
        value: Term::Literal(to_literal(field, value, quoted)?),
    });
    Ok(Statement::Thing {
        var: player.clone(),
        constraints,
    })
}

/// Present values paired with their list index (`None` for scalars)
pub(crate) fn indexed_values(value: Option<&Value>) -> Vec<(Option<usize>, &Value)> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (Some(i), v))
            .collect(),
        other => present_values(other).into_iter().map(|v| (None, v)).collect(),
    }
}

// ============================================================================
// Embedded
// ============================================================================

#[derive(Debug, Clone)]
pub struct EmbeddedRelation {
    pub field: String,
    pub mapping: Arc<DocumentMapping>,
    pub relation: String,
    /// Role the subject plays
    pub self_role: String,
    /// Role the nested object plays
    pub other_role: String,
    pub multiplicity: Multiplicity,
}

impl EmbeddedRelation {
    pub fn new(
        field: impl Into<String>,
        mapping: Arc<DocumentMapping>,
        relation: impl Into<String>,
        self_role: impl Into<String>,
        other_role: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            mapping,
            relation: relation.into(),
            self_role: self_role.into(),
            other_role: other_role.into(),
            multiplicity: Multiplicity::Many,
        }
    }

    pub fn single(mut self) -> Self {
        self.multiplicity = Multiplicity::One;
        self
    }

    /// `(self: $subject, other: $nested) isa relation;`
    pub fn link(&self, subject: &Variable, nested: &Variable) -> Stage {
        Stage::new(
            StageKind::Insert,
            vec![Statement::relation(
                &self.relation,
                vec![
                    RolePlayer::new(&self.self_role, subject.clone()),
                    RolePlayer::new(&self.other_role, nested.clone()),
                ],
            )],
        )
    }
}

// ============================================================================
// Reference
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRelation {
    pub field: String,
    /// Key attribute the referenced object is matched on
    pub key_attribute: String,
    pub relation: String,
    pub self_role: String,
    pub player_role: String,
    pub player_type: PlayerType,
    pub quoted: bool,
    pub multiplicity: Multiplicity,
}

impl ReferenceRelation {
    pub fn new(
        field: impl Into<String>,
        key_attribute: impl Into<String>,
        relation: impl Into<String>,
        self_role: impl Into<String>,
        player_role: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            key_attribute: key_attribute.into(),
            relation: relation.into(),
            self_role: self_role.into(),
            player_role: player_role.into(),
            player_type: PlayerType::Any,
            quoted: true,
            multiplicity: Multiplicity::Many,
        }
    }

    pub fn single(mut self) -> Self {
        self.multiplicity = Multiplicity::One;
        self
    }

    pub fn player_type(mut self, player_type: PlayerType) -> Self {
        self.player_type = player_type;
        self
    }

    pub fn quoted(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }

    /// Variable bound to the referenced object
    pub fn player_var(&self, scope: &Scope, index: Option<usize>) -> Variable {
        scope.child(&self.field, index).bind("ref")
    }

    /// Match stage then link stage for one referenced value
    pub fn stages(
        &self,
        subject: &Variable,
        scope: &Scope,
        index: Option<usize>,
        value: &Value,
    ) -> Result<[Stage; 2], CompileError> {
        let player = self.player_var(scope, index);
        let matched = lookup(
            &player,
            &self.player_type,
            &self.field,
            &self.key_attribute,
            value,
            self.quoted,
        )?;
        let link = Statement::relation(
            &self.relation,
            vec![
                RolePlayer::new(&self.self_role, subject.clone()),
                RolePlayer::new(&self.player_role, player),
            ],
        );
        Ok([
            Stage::new(StageKind::Match, vec![matched]),
            Stage::new(StageKind::Insert, vec![link]),
        ])
    }
}

// ============================================================================
// Link
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LinkRelation {
    pub field: String,
    pub key_attribute: String,
    /// Role the player takes in the relation under compilation
    pub role: String,
    pub player_type: PlayerType,
    pub quoted: bool,
    pub multiplicity: Multiplicity,
}

impl LinkRelation {
    pub fn new(field: impl Into<String>, key_attribute: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key_attribute: key_attribute.into(),
            role: role.into(),
            player_type: PlayerType::Any,
            quoted: true,
            multiplicity: Multiplicity::Many,
        }
    }

    pub fn single(mut self) -> Self {
        self.multiplicity = Multiplicity::One;
        self
    }

    pub fn player_type(mut self, player_type: PlayerType) -> Self {
        self.player_type = player_type;
        self
    }

    pub fn quoted(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }

    pub fn player_var(&self, scope: &Scope, index: Option<usize>) -> Variable {
        scope.child(&self.field, index).bind("player")
    }

    /// Participant lookup and `links` statement for one player value
    pub fn statements(
        &self,
        subject: &Variable,
        scope: &Scope,
        index: Option<usize>,
        value: &Value,
    ) -> Result<(Statement, Statement), CompileError> {
        let player = self.player_var(scope, index);
        let matched = lookup(
            &player,
            &self.player_type,
            &self.field,
            &self.key_attribute,
            value,
            self.quoted,
        )?;
        let link = Statement::links(subject, vec![RolePlayer::new(&self.role, player)]);
        Ok((matched, link))
    }
}
