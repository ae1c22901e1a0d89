//! Abstract Syntax Tree for the emitted TypeQL subset
//!
//! Every node renders itself through `Display`, so a compiled pipeline is
//! turned into query text with `to_string()`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Terms
// ============================================================================

/// A query variable, rendered as `$name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A value literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Quoted string, rendered as `'...'` with escaping
    String(String),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    /// Unquoted token rendered verbatim (datetimes, enum-like values)
    Token(String),
}

impl Literal {
    /// Classify an unquoted token the way the store would read it back
    pub fn from_token(token: &str) -> Self {
        match token {
            "true" => Literal::Boolean(true),
            "false" => Literal::Boolean(false),
            _ => {
                if let Ok(i) = token.parse::<i64>() {
                    Literal::Integer(i)
                } else if let Ok(f) = token.parse::<f64>() {
                    Literal::Double(f)
                } else {
                    Literal::Token(token.to_string())
                }
            }
        }
    }

    /// JSON form of this literal, as a fetch answer would carry it
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::String(s) | Literal::Token(s) => serde_json::Value::String(s.clone()),
            Literal::Boolean(b) => serde_json::Value::Bool(*b),
            Literal::Integer(i) => serde_json::Value::from(*i),
            Literal::Double(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", crate::escape(s)),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            // Debug keeps the fractional part of whole numbers (1.0, not 1)
            Literal::Double(d) => write!(f, "{:?}", d),
            Literal::Token(t) => f.write_str(t),
        }
    }
}

/// Right-hand side of a `has` constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Literal(Literal),
    Variable(Variable),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Literal(lit) => lit.fmt(f),
            Term::Variable(var) => var.fmt(f),
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// `role: $player`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePlayer {
    pub role: String,
    pub player: Variable,
}

impl RolePlayer {
    pub fn new(role: impl Into<String>, player: Variable) -> Self {
        Self { role: role.into(), player }
    }
}

impl fmt::Display for RolePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.player)
    }
}

struct Tuple<'a>(&'a [RolePlayer]);

impl fmt::Display for Tuple<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, rp) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            rp.fmt(f)?;
        }
        f.write_str(")")
    }
}

/// A constraint on a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// `isa label`
    Isa(String),
    /// `has attribute value`
    Has { attribute: String, value: Term },
    /// `links (role: $player, ...)`
    Links(Vec<RolePlayer>),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Isa(label) => write!(f, "isa {}", label),
            Constraint::Has { attribute, value } => write!(f, "has {} {}", attribute, value),
            Constraint::Links(players) => write!(f, "links {}", Tuple(players)),
        }
    }
}

/// A single `;`-terminated statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `$var constraint, constraint;`
    Thing {
        var: Variable,
        constraints: Vec<Constraint>,
    },
    /// `(role: $a, role: $b) isa label;`
    Relation {
        players: Vec<RolePlayer>,
        label: String,
    },
}

impl Statement {
    pub fn isa(var: &Variable, label: impl Into<String>) -> Self {
        Statement::Thing {
            var: var.clone(),
            constraints: vec![Constraint::Isa(label.into())],
        }
    }

    pub fn has(var: &Variable, attribute: impl Into<String>, value: Term) -> Self {
        Statement::Thing {
            var: var.clone(),
            constraints: vec![Constraint::Has {
                attribute: attribute.into(),
                value,
            }],
        }
    }

    pub fn links(var: &Variable, players: Vec<RolePlayer>) -> Self {
        Statement::Thing {
            var: var.clone(),
            constraints: vec![Constraint::Links(players)],
        }
    }

    pub fn relation(label: impl Into<String>, players: Vec<RolePlayer>) -> Self {
        Statement::Relation {
            players,
            label: label.into(),
        }
    }

    /// Append a constraint to a `Thing` statement
    pub fn and(mut self, constraint: Constraint) -> Self {
        if let Statement::Thing { constraints, .. } = &mut self {
            constraints.push(constraint);
        }
        self
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Thing { var, constraints } => {
                write!(f, "{}", var)?;
                for (i, c) in constraints.iter().enumerate() {
                    if i == 0 {
                        write!(f, " {}", c)?;
                    } else {
                        write!(f, ", {}", c)?;
                    }
                }
                f.write_str(";")
            }
            Statement::Relation { players, label } => {
                write!(f, "{} isa {};", Tuple(players), label)
            }
        }
    }
}

// ============================================================================
// Write pipelines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Match,
    /// Create-if-absent
    Put,
    Insert,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Match => "match",
            StageKind::Put => "put",
            StageKind::Insert => "insert",
        })
    }
}

/// One clause of a write pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub statements: Vec<Statement>,
}

impl Stage {
    pub fn new(kind: StageKind, statements: Vec<Statement>) -> Self {
        Self { kind, statements }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for stmt in &self.statements {
            write!(f, "\n{}", stmt)?;
        }
        Ok(())
    }
}

/// A complete write query: stages executed in order over a shared row stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteQuery {
    pub stages: Vec<Stage>,
}

impl fmt::Display for WriteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            stage.fmt(f)?;
        }
        Ok(())
    }
}

// ============================================================================
// Fetch queries
// ============================================================================

/// `match <pattern> fetch { ... };`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchQuery {
    pub pattern: Vec<Statement>,
    pub projection: Projection,
}

impl fmt::Display for FetchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("match")?;
        for stmt in &self.pattern {
            write!(f, "\n{}", stmt)?;
        }
        write!(f, "\nfetch {};", self.projection)
    }
}

/// A JSON object template: `{ "key": value, ... }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub entries: Vec<Entry>,
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "\n  {}", entry)?;
        }
        f.write_str("\n}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Projected,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key.replace('\\', "\\\\").replace('"', "\\\"");
        write!(f, "\"{}\": {}", key, self.value)
    }
}

/// The value side of a projection entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projected {
    /// `$var.attribute`, or `[ $var.attribute ]` when `many`
    Attribute {
        var: Variable,
        attribute: String,
        many: bool,
    },
    /// A nested query, bracketed when `many`
    Subquery { many: bool, query: Box<Subquery> },
}

impl fmt::Display for Projected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projected::Attribute {
                var,
                attribute,
                many: true,
            } => write!(f, "[ {}.{} ]", var, attribute),
            Projected::Attribute { var, attribute, .. } => write!(f, "{}.{}", var, attribute),
            Projected::Subquery { many: true, query } => write!(f, "[ {} ]", query),
            Projected::Subquery { query, .. } => query.fmt(f),
        }
    }
}

/// `match <pattern> <output>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subquery {
    pub pattern: Vec<Statement>,
    pub output: Output,
}

impl fmt::Display for Subquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("match")?;
        for stmt in &self.pattern {
            write!(f, " {}", stmt)?;
        }
        write!(f, " {}", self.output)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Output {
    /// `fetch { ... };`
    Fetch(Projection),
    /// `return first $var;`
    First(Variable),
    /// `return { $var };`
    All(Variable),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Fetch(projection) => write!(f, "fetch {};", projection),
            Output::First(var) => write!(f, "return first {};", var),
            Output::All(var) => write!(f, "return {{ {} }};", var),
        }
    }
}

/// Any query the parser accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Write(WriteQuery),
    Fetch(FetchQuery),
}
