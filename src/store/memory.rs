//! In-memory store
//!
//! A small graph engine that executes exactly the query forms the compiler
//! emits. Objects are entities or relations with a type label, an ordered
//! set of attribute values and an ordered set of role players. Variables
//! bind to objects or to attribute values; each stage maps a stream of rows
//! to a new stream:
//!
//! ```text
//! match   every extension of each row that satisfies all statements
//! insert  one new row per input row, after creating what the statements name
//! put     the first match of the statements, or an insert when there is none
//! ```
//!
//! A transaction works on a snapshot and records the queries it ran; commit
//! replays them on the shared graph under its lock.

use super::{Store, Transaction};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tql::{
    Constraint, FetchQuery, Literal, Output, Projected, Projection, RolePlayer, StageKind, Statement,
    Term, Variable, WriteQuery,
};

type ObjectId = usize;

#[derive(Debug, Clone)]
struct Object {
    label: String,
    attributes: Vec<(String, Literal)>,
    players: Vec<(String, ObjectId)>,
}

impl Object {
    fn has(&self, attribute: &str, value: &Literal) -> bool {
        self.attributes
            .iter()
            .any(|(a, v)| a == attribute && v == value)
    }

    fn values<'a>(&'a self, attribute: &'a str) -> impl Iterator<Item = &'a Literal> + 'a {
        self.attributes
            .iter()
            .filter(move |(a, _)| a == attribute)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Concept {
    Object(ObjectId),
    Value(Literal),
}

type Row = HashMap<Variable, Concept>;

fn bind(row: &Row, var: &Variable, concept: Concept) -> Row {
    let mut next = row.clone();
    next.insert(var.clone(), concept);
    next
}

fn resolve_value(row: &Row, term: &Term) -> std::result::Result<Literal, String> {
    match term {
        Term::Literal(literal) => Ok(literal.clone()),
        Term::Variable(var) => match row.get(var) {
            Some(Concept::Value(literal)) => Ok(literal.clone()),
            _ => Err(format!("{} is not bound to a value", var)),
        },
    }
}

fn resolve_object(row: &Row, var: &Variable) -> std::result::Result<ObjectId, String> {
    match row.get(var) {
        Some(Concept::Object(id)) => Ok(*id),
        _ => Err(format!("{} is not bound to an object", var)),
    }
}

#[derive(Debug, Clone, Default)]
struct Graph {
    objects: Vec<Object>,
    /// (attribute, rendered literal) -> owners
    index: HashMap<(String, String), Vec<ObjectId>>,
    schema: Option<Vec<String>>,
}

impl Graph {
    fn execute(&mut self, query: &WriteQuery) -> std::result::Result<usize, String> {
        let mut rows = vec![Row::new()];
        for stage in &query.stages {
            rows = match stage.kind {
                StageKind::Match => rows
                    .iter()
                    .flat_map(|row| self.solve(&stage.statements, row))
                    .collect(),
                StageKind::Insert => {
                    let mut out = Vec::with_capacity(rows.len());
                    for row in rows {
                        out.push(self.insert(&stage.statements, row)?);
                    }
                    out
                }
                StageKind::Put => {
                    let mut out = Vec::with_capacity(rows.len());
                    for row in rows {
                        let existing = self.solve(&stage.statements, &row).into_iter().next();
                        match existing {
                            Some(found) => out.push(found),
                            None => out.push(self.insert(&stage.statements, row)?),
                        }
                    }
                    out
                }
            };
        }
        Ok(rows.len())
    }

    // ------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------

    fn solve(&self, statements: &[Statement], row: &Row) -> Vec<Row> {
        let mut rows = vec![row.clone()];
        for statement in statements {
            rows = rows
                .iter()
                .flat_map(|r| self.solve_statement(statement, r))
                .collect();
            if rows.is_empty() {
                break;
            }
        }
        rows
    }

    fn solve_statement(&self, statement: &Statement, row: &Row) -> Vec<Row> {
        match statement {
            Statement::Thing { var, constraints } => {
                let candidates = match row.get(var) {
                    Some(Concept::Object(id)) => vec![*id],
                    Some(Concept::Value(_)) => return Vec::new(),
                    None => self.candidates(constraints),
                };
                let mut out = Vec::new();
                for id in candidates {
                    let mut rows = vec![bind(row, var, Concept::Object(id))];
                    for constraint in constraints {
                        rows = rows
                            .iter()
                            .flat_map(|r| self.check(id, constraint, r))
                            .collect();
                        if rows.is_empty() {
                            break;
                        }
                    }
                    out.extend(rows);
                }
                out
            }
            Statement::Relation { players, label } => self
                .objects
                .iter()
                .enumerate()
                .filter(|(_, object)| &object.label == label)
                .flat_map(|(id, _)| self.match_players(id, players, row))
                .collect(),
        }
    }

    /// Objects worth checking for an unbound variable
    fn candidates(&self, constraints: &[Constraint]) -> Vec<ObjectId> {
        let keyed = constraints.iter().find_map(|c| match c {
            Constraint::Has {
                attribute,
                value: Term::Literal(literal),
            } => Some((attribute.clone(), literal.to_string())),
            _ => None,
        });
        match keyed {
            Some(key) => self.index.get(&key).cloned().unwrap_or_default(),
            None => (0..self.objects.len()).collect(),
        }
    }

    fn check(&self, id: ObjectId, constraint: &Constraint, row: &Row) -> Vec<Row> {
        let Some(object) = self.objects.get(id) else {
            return Vec::new();
        };
        match constraint {
            Constraint::Isa(label) if &object.label == label => vec![row.clone()],
            Constraint::Isa(_) => Vec::new(),
            Constraint::Has {
                attribute,
                value: Term::Literal(literal),
            } => {
                if object.has(attribute, literal) {
                    vec![row.clone()]
                } else {
                    Vec::new()
                }
            }
            Constraint::Has {
                attribute,
                value: Term::Variable(var),
            } => match row.get(var) {
                Some(Concept::Value(literal)) if object.has(attribute, literal) => vec![row.clone()],
                Some(_) => Vec::new(),
                None => object
                    .values(attribute)
                    .map(|literal| bind(row, var, Concept::Value(literal.clone())))
                    .collect(),
            },
            Constraint::Links(players) => self.match_players(id, players, row),
        }
    }

    fn match_players(&self, relation: ObjectId, players: &[RolePlayer], row: &Row) -> Vec<Row> {
        let Some((first, rest)) = players.split_first() else {
            return vec![row.clone()];
        };
        let Some(object) = self.objects.get(relation) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (role, player) in &object.players {
            if role != &first.role {
                continue;
            }
            match row.get(&first.player) {
                Some(Concept::Object(bound)) if bound == player => {
                    out.extend(self.match_players(relation, rest, row));
                }
                Some(_) => {}
                None => {
                    let next = bind(row, &first.player, Concept::Object(*player));
                    out.extend(self.match_players(relation, rest, &next));
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    fn create(&mut self, label: String) -> ObjectId {
        self.objects.push(Object {
            label,
            attributes: Vec::new(),
            players: Vec::new(),
        });
        self.objects.len() - 1
    }

    fn add_attribute(&mut self, id: ObjectId, attribute: &str, value: Literal) {
        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        if object.has(attribute, &value) {
            return;
        }
        self.index
            .entry((attribute.to_string(), value.to_string()))
            .or_default()
            .push(id);
        object.attributes.push((attribute.to_string(), value));
    }

    fn add_player(&mut self, id: ObjectId, role: &str, player: ObjectId) {
        if let Some(object) = self.objects.get_mut(id) {
            if !object.players.iter().any(|(r, p)| r == role && *p == player) {
                object.players.push((role.to_string(), player));
            }
        }
    }

    fn insert(&mut self, statements: &[Statement], mut row: Row) -> std::result::Result<Row, String> {
        for statement in statements {
            match statement {
                Statement::Thing { var, constraints } => {
                    let id = match row.get(var) {
                        Some(Concept::Object(id)) => {
                            if constraints.iter().any(|c| matches!(c, Constraint::Isa(_))) {
                                return Err(format!("cannot redeclare the type of bound variable {}", var));
                            }
                            *id
                        }
                        Some(Concept::Value(_)) => {
                            return Err(format!("{} is bound to a value, not an object", var));
                        }
                        None => {
                            let label = constraints
                                .iter()
                                .find_map(|c| match c {
                                    Constraint::Isa(label) => Some(label.clone()),
                                    _ => None,
                                })
                                .ok_or_else(|| format!("{} is unbound and declares no type", var))?;
                            let id = self.create(label);
                            row.insert(var.clone(), Concept::Object(id));
                            id
                        }
                    };
                    for constraint in constraints {
                        match constraint {
                            Constraint::Isa(_) => {}
                            Constraint::Has { attribute, value } => {
                                let literal = resolve_value(&row, value)?;
                                self.add_attribute(id, attribute, literal);
                            }
                            Constraint::Links(players) => {
                                for rp in players {
                                    let player = resolve_object(&row, &rp.player)?;
                                    self.add_player(id, &rp.role, player);
                                }
                            }
                        }
                    }
                }
                Statement::Relation { players, label } => {
                    let resolved = players
                        .iter()
                        .map(|rp| resolve_object(&row, &rp.player).map(|p| (rp.role.as_str(), p)))
                        .collect::<std::result::Result<Vec<_>, String>>()?;
                    let id = self.create(label.clone());
                    for (role, player) in resolved {
                        self.add_player(id, role, player);
                    }
                }
            }
        }
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    fn fetch(&self, query: &FetchQuery) -> Option<serde_json::Value> {
        let row = self.solve(&query.pattern, &Row::new()).into_iter().next()?;
        Some(self.project(&query.projection, &row))
    }

    fn project(&self, projection: &Projection, row: &Row) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for entry in &projection.entries {
            let (many, items) = match &entry.value {
                Projected::Attribute { var, attribute, many } => {
                    let items: Vec<serde_json::Value> = match row.get(var) {
                        Some(Concept::Object(id)) => self
                            .objects
                            .get(*id)
                            .map(|o| o.values(attribute).map(Literal::to_json).collect())
                            .unwrap_or_default(),
                        _ => Vec::new(),
                    };
                    (*many, items)
                }
                Projected::Subquery { many, query } => {
                    let rows = self.solve(&query.pattern, row);
                    let items: Vec<serde_json::Value> = match &query.output {
                        Output::Fetch(nested) => rows.iter().map(|r| self.project(nested, r)).collect(),
                        Output::First(var) | Output::All(var) => rows
                            .iter()
                            .filter_map(|r| match r.get(var) {
                                Some(Concept::Value(literal)) => Some(literal.to_json()),
                                _ => None,
                            })
                            .collect(),
                    };
                    (*many, items)
                }
            };
            let value = if many {
                serde_json::Value::Array(items)
            } else {
                items.into_iter().next().unwrap_or(serde_json::Value::Null)
            };
            map.insert(entry.key.clone(), value);
        }
        serde_json::Value::Object(map)
    }
}

// ============================================================================
// Store
// ============================================================================

/// In-process graph store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    graph: Arc<Mutex<Graph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed objects
    pub async fn len(&self) -> usize {
        self.graph.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of committed objects with the given type label
    pub async fn count(&self, label: &str) -> usize {
        self.graph
            .lock()
            .await
            .objects
            .iter()
            .filter(|o| o.label == label)
            .count()
    }

    /// Schema text passed to the last `setup`
    pub async fn schema(&self) -> Option<Vec<String>> {
        self.graph.lock().await.schema.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn setup(&self, schema: &[String], force: bool) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if graph.schema.is_some() && !force {
            return Err(Error::Store {
                message: "database already exists (use force to recreate it)".to_string(),
            });
        }
        *graph = Graph {
            schema: Some(schema.to_vec()),
            ..Graph::default()
        };
        tracing::debug!(definitions = schema.len(), "memory store reset");
        Ok(())
    }

    async fn begin_write(&self) -> Result<Box<dyn Transaction>> {
        let snapshot = self.graph.lock().await.clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.graph),
            working: snapshot,
            log: Vec::new(),
        }))
    }

    async fn fetch(&self, query: &str) -> Result<Option<serde_json::Value>> {
        let parsed = tql::parse_fetch(query)?;
        Ok(self.graph.lock().await.fetch(&parsed))
    }
}

struct MemoryTransaction {
    shared: Arc<Mutex<Graph>>,
    working: Graph,
    /// Queries run so far with the rows each produced on the snapshot
    log: Vec<(WriteQuery, usize)>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn query(&mut self, query: &str) -> Result<usize> {
        let parsed = tql::parse_write(query)?;
        let rows = self
            .working
            .execute(&parsed)
            .map_err(|message| Error::Transaction { message })?;
        self.log.push((parsed, rows));
        tokio::task::yield_now().await;
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut graph = self.shared.lock().await;
        let mut next = graph.clone();
        for (query, rows) in &self.log {
            let replayed = next
                .execute(query)
                .map_err(|message| Error::Transaction { message })?;
            if replayed == 0 && *rows > 0 {
                return Err(Error::Transaction {
                    message: "a matched object no longer exists at commit".to_string(),
                });
            }
        }
        *graph = next;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(store: &MemoryStore, query: &str) -> Result<usize> {
        let mut tx = store.begin_write().await?;
        let rows = tx.query(query).await?;
        tx.commit().await?;
        Ok(rows)
    }

    const PUT_P1: &str = "put\n$person isa person;\n$person has id 'p1';";

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(run(&store, PUT_P1).await.unwrap(), 1);
        assert_eq!(run(&store, PUT_P1).await.unwrap(), 1);
        assert_eq!(store.count("person").await, 1);
    }

    #[tokio::test]
    async fn test_insert_duplicates() {
        let store = MemoryStore::new();
        let query = "insert\n$n isa note;\n$n has content 'x';";
        run(&store, query).await.unwrap();
        run(&store, query).await.unwrap();
        assert_eq!(store.count("note").await, 2);
    }

    #[tokio::test]
    async fn test_match_without_answers_yields_zero_rows() {
        let store = MemoryStore::new();
        let rows = run(
            &store,
            "match\n$p has id 'missing';\ninsert\n(friend: $p, friend: $p) isa friendship;",
        )
        .await
        .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store.count("friendship").await, 0);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin_write().await.unwrap();
        tx.query(PUT_P1).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_isolated() {
        let store = MemoryStore::new();
        let mut tx = store.begin_write().await.unwrap();
        tx.query(PUT_P1).await.unwrap();
        assert_eq!(store.count("person").await, 0);
        tx.commit().await.unwrap();
        assert_eq!(store.count("person").await, 1);
    }

    #[tokio::test]
    async fn test_commit_fails_when_match_no_longer_holds() {
        let store = MemoryStore::new();
        run(&store, PUT_P1).await.unwrap();

        let mut tx = store.begin_write().await.unwrap();
        let rows = tx
            .query("match\n$p has id 'p1';\ninsert\n(friend: $p, friend: $p) isa friendship;")
            .await
            .unwrap();
        assert_eq!(rows, 1);

        store.setup(&[], true).await.unwrap();
        assert!(matches!(tx.commit().await, Err(Error::Transaction { .. })));
        assert_eq!(store.count("friendship").await, 0);
    }

    #[tokio::test]
    async fn test_relation_links_and_fetch() {
        let store = MemoryStore::new();
        run(&store, "put\n$a isa person;\n$a has id 'p1';\ninsert\n$a has alias 'A';\n$a has alias 'B';")
            .await
            .unwrap();
        run(&store, "put\n$b isa person;\n$b has id 'p2';").await.unwrap();
        let rows = run(
            &store,
            "match\n$x has id 'p1';\n$y has id 'p2';\nput\n$k isa friendship;\n$k has id 'k1';\ninsert\n$k links (friend: $x);\n$k links (friend: $y);",
        )
        .await
        .unwrap();
        assert_eq!(rows, 1);

        let answer = store
            .fetch(
                "match\n$p isa person, has id 'p1';\nfetch {\n  \"id\": $p.id,\n  \"aliases\": [ $p.alias ],\n  \"friends\": [ match $k isa friendship, links (friend: $p); $k has id $kid; return { $kid }; ]\n};",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            answer,
            serde_json::json!({"id": "p1", "aliases": ["A", "B"], "friends": ["k1"]})
        );
    }

    #[tokio::test]
    async fn test_fetch_missing_object() {
        let store = MemoryStore::new();
        let answer = store
            .fetch("match\n$p isa person, has id 'nobody';\nfetch {\n  \"id\": $p.id\n};")
            .await
            .unwrap();
        assert!(answer.is_none());
    }

    #[tokio::test]
    async fn test_insert_errors() {
        let store = MemoryStore::new();
        let mut tx = store.begin_write().await.unwrap();
        let result = tx.query("insert\n$x has name 'no type';").await;
        assert!(matches!(result, Err(Error::Transaction { .. })));
        let result = tx.query("not a query").await;
        assert!(matches!(result, Err(Error::QueryParse { .. })));
    }

    #[tokio::test]
    async fn test_setup_requires_force_to_recreate() {
        let store = MemoryStore::new();
        store.setup(&["define entity person;".to_string()], false).await.unwrap();
        run(&store, PUT_P1).await.unwrap();

        assert!(store.setup(&[], false).await.is_err());
        store.setup(&[], true).await.unwrap();
        assert!(store.is_empty().await);
    }
}
