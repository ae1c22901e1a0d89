//! TQL - the TypeQL subset spoken by ctimap
//!
//! Write pipelines are sequences of stages over a shared row stream:
//!
//! ```tql
//! # Create-if-absent on the key, then attach plain attributes
//! put
//! $attack-pattern isa attack-pattern;
//! $attack-pattern has id 'attack-pattern--0c7b5b88';
//! insert
//! $attack-pattern has name 'Spear Phishing';
//!
//! # Resolve an existing player by key and link to it
//! match
//! $attack-pattern_created_by_ref_0 has id 'identity--f431f809';
//! insert
//! (created: $attack-pattern, creator: $attack-pattern_created_by_ref_0) isa created-by;
//! ```
//!
//! Read projections use `fetch`:
//!
//! ```tql
//! match
//! $person isa person, has id 'p1';
//! fetch {
//!   "id": $person.id,
//!   "aliases": [ $person.alias ]
//! };
//! ```
//!
//! The parser accepts exactly this subset; anything else is a `ParseError`.

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::{Location, ParseError};

/// Escape a string for use inside a single-quoted literal
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Parse a write pipeline
pub fn parse_write(input: &str) -> Result<WriteQuery, ParseError> {
    parser::parse_write_query(input)
}

/// Parse a fetch query
pub fn parse_fetch(input: &str) -> Result<FetchQuery, ParseError> {
    parser::parse_fetch_query(input)
}

/// Parse a query of either kind
pub fn parse(input: &str) -> Result<Query, ParseError> {
    parser::parse_query(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("it's"), "it\\'s");
        assert_eq!(escape("C:\\temp"), "C:\\\\temp");
    }

    #[test]
    fn test_render_stage() {
        let var = Variable::new("person");
        let stage = Stage::new(
            StageKind::Put,
            vec![
                Statement::isa(&var, "person"),
                Statement::has(&var, "id", Term::Literal(Literal::String("p1".into()))),
            ],
        );
        assert_eq!(stage.to_string(), "put\n$person isa person;\n$person has id 'p1';");
    }

    #[test]
    fn test_render_then_parse_write() {
        let a = Variable::new("a");
        let b = Variable::new("b");
        let query = WriteQuery {
            stages: vec![
                Stage::new(
                    StageKind::Match,
                    vec![Statement::has(&b, "id", Term::Literal(Literal::String("x'y".into())))],
                ),
                Stage::new(
                    StageKind::Insert,
                    vec![
                        Statement::isa(&a, "thing")
                            .and(Constraint::Has {
                                attribute: "score".into(),
                                value: Term::Literal(Literal::Double(1.0)),
                            }),
                        Statement::relation(
                            "pairing",
                            vec![RolePlayer::new("left", a.clone()), RolePlayer::new("right", b.clone())],
                        ),
                    ],
                ),
            ],
        };
        let text = query.to_string();
        assert!(text.contains("has score 1.0"));
        assert_eq!(parse_write(&text).unwrap(), query);
    }

    #[test]
    fn test_parse_dispatch() {
        assert!(matches!(parse("insert\n$x isa person;"), Ok(Query::Write(_))));
        assert!(matches!(
            parse("match\n$x isa person, has id 'p1';\nfetch {\n  \"id\": $x.id\n};"),
            Ok(Query::Fetch(_))
        ));
        assert!(parse("SELECT * FROM people").is_err());
    }
}
