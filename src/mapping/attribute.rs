//! Attribute descriptors
//!
//! An attribute descriptor copies one document field onto the subject as
//! `has` statements. Key descriptors are attribute descriptors stored in the
//! key list of a `PropertyMappings`.

use super::compile::CompileError;
use crate::input::Value;
use tql::{Constraint, Literal, Statement, Term, Variable};

/// Shape of the values a descriptor expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Boolean,
    Number,
    /// Zero or more values, one `has` per element
    Multi,
}

/// Maps a document field to an attribute label
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMapping {
    pub field: String,
    pub attribute: String,
    pub kind: ValueKind,
    /// Render string values as quoted literals
    pub quoted: bool,
}

impl AttributeMapping {
    pub fn new(field: impl Into<String>, attribute: impl Into<String>, kind: ValueKind, quoted: bool) -> Self {
        Self {
            field: field.into(),
            attribute: attribute.into(),
            kind,
            quoted,
        }
    }

    /// A quoted string attribute
    pub fn string(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(field, attribute, ValueKind::String, true)
    }

    /// An unquoted attribute (datetimes, numbers written as text)
    pub fn raw(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(field, attribute, ValueKind::String, false)
    }

    pub fn boolean(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(field, attribute, ValueKind::Boolean, false)
    }

    pub fn number(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(field, attribute, ValueKind::Number, false)
    }

    /// A multi-valued quoted string attribute
    pub fn strings(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(field, attribute, ValueKind::Multi, true)
    }

    /// A multi-valued unquoted attribute
    pub fn raws(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(field, attribute, ValueKind::Multi, false)
    }

    pub fn quoted(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }

    pub fn is_multi(&self) -> bool {
        self.kind == ValueKind::Multi
    }

    /// Literal for one field value
    pub fn literal(&self, value: &Value) -> Result<Literal, CompileError> {
        to_literal(&self.field, value, self.quoted)
    }

    /// `has` constraint for one field value
    pub fn constraint(&self, value: &Value) -> Result<Constraint, CompileError> {
        Ok(Constraint::Has {
            attribute: self.attribute.clone(),
            value: Term::Literal(self.literal(value)?),
        })
    }

    /// Render `$var has attribute value;` for every present value of the field
    ///
    /// Absent and null fields render nothing. A list renders one statement per
    /// non-null element, whatever the declared kind.
    pub fn render(&self, var: &Variable, value: Option<&Value>) -> Result<Vec<Statement>, CompileError> {
        let mut statements = Vec::new();
        for value in present_values(value) {
            statements.push(Statement::Thing {
                var: var.clone(),
                constraints: vec![self.constraint(value)?],
            });
        }
        Ok(statements)
    }
}

/// Non-null values of a field: the elements of a list, or the scalar itself
pub(crate) fn present_values(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
        Some(v) => vec![v],
    }
}

/// Convert a field value to a literal
///
/// Quoted descriptors emit strings for any scalar. Unquoted descriptors keep
/// numbers and booleans typed and pass strings through as bare tokens, which
/// must not contain query syntax.
pub(crate) fn to_literal(field: &str, value: &Value, quoted: bool) -> Result<Literal, CompileError> {
    match value {
        Value::Bool(b) => Ok(Literal::Boolean(*b)),
        Value::Object(_) | Value::Array(_) => Err(CompileError::Malformed {
            field: field.to_string(),
            reason: "expected a scalar value, found a nested structure",
        }),
        Value::Null => Err(CompileError::Malformed {
            field: field.to_string(),
            reason: "null is not a value",
        }),
        Value::Int(i) if quoted => Ok(Literal::String(i.to_string())),
        Value::Float(f) if quoted => Ok(Literal::String(f.to_string())),
        Value::String(s) if quoted => Ok(Literal::String(s.clone())),
        Value::Int(i) => Ok(Literal::Integer(*i)),
        Value::Float(f) => Ok(Literal::Double(*f)),
        Value::String(s) => {
            if is_bare_token(s) {
                Ok(Literal::Token(s.clone()))
            } else {
                Err(CompileError::Malformed {
                    field: field.to_string(),
                    reason: "unquoted value is empty or contains query syntax",
                })
            }
        }
    }
}

fn is_bare_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| !c.is_whitespace() && !matches!(c, ';' | ',' | '(' | ')' | '[' | ']' | '{' | '}' | '\'' | '"' | '$' | '#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(mapping: &AttributeMapping, value: Value) -> Vec<String> {
        let var = Variable::new("x");
        mapping
            .render(&var, Some(&value))
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_quoted_string() {
        let m = AttributeMapping::string("name", "name");
        assert_eq!(render(&m, "Ana".into()), vec!["$x has name 'Ana';"]);
        assert_eq!(render(&m, "O'Brien".into()), vec!["$x has name 'O\\'Brien';"]);
    }

    #[test]
    fn test_raw_and_typed_values() {
        let created = AttributeMapping::raw("created", "created");
        assert_eq!(
            render(&created, "2017-05-31T21:30:19.735Z".into()),
            vec!["$x has created 2017-05-31T21:30:19.735Z;"]
        );
        let revoked = AttributeMapping::boolean("revoked", "revoked");
        assert_eq!(render(&revoked, true.into()), vec!["$x has revoked true;"]);
        let confidence = AttributeMapping::number("confidence", "confidence");
        assert_eq!(render(&confidence, 85i64.into()), vec!["$x has confidence 85;"]);
        assert_eq!(render(&confidence, 0.5.into()), vec!["$x has confidence 0.5;"]);
    }

    #[test]
    fn test_absent_null_and_lists() {
        let m = AttributeMapping::strings("aliases", "alias");
        let var = Variable::new("x");
        assert!(m.render(&var, None).unwrap().is_empty());
        assert!(m.render(&var, Some(&Value::Null)).unwrap().is_empty());
        assert!(m.render(&var, Some(&Value::Array(vec![]))).unwrap().is_empty());

        let list = Value::Array(vec!["a".into(), Value::Null, "b".into()]);
        assert_eq!(render(&m, list), vec!["$x has alias 'a';", "$x has alias 'b';"]);
    }

    #[test]
    fn test_quoted_number_becomes_string() {
        let m = AttributeMapping::string("number", "number");
        assert_eq!(render(&m, 64512i64.into()), vec!["$x has number '64512';"]);
    }

    #[test]
    fn test_malformed_values() {
        let var = Variable::new("x");
        let nested = Value::Object(Default::default());
        let m = AttributeMapping::string("name", "name");
        assert!(matches!(
            m.render(&var, Some(&nested)),
            Err(CompileError::Malformed { .. })
        ));

        let raw = AttributeMapping::raw("created", "created");
        assert!(raw.render(&var, Some(&"x; match".into())).is_err());
        assert!(raw.render(&var, Some(&"".into())).is_err());
    }
}
