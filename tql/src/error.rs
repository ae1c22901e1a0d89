//! Parse errors, located in the query text

use std::fmt;

/// 1-based line and column of a byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn of(input: &str, offset: usize) -> Self {
        let before = input.get(..offset).unwrap_or(input);
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Self {
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
        }
    }
}

/// Query text the parser could not accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// Byte offset of the offending input
    pub offset: Option<usize>,
    pub location: Option<Location>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: None,
            location: None,
        }
    }

    /// Error at `offset` within `input`
    pub fn at(input: &str, offset: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: Some(offset),
            location: Some(Location::of(input, offset)),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(Location { line, column }) = self.location {
            write!(f, " (line {}, column {})", line, column)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location() {
        let input = "put\n$x isa person;\n$x has id ?;";
        let offset = input.find('?').unwrap();
        assert_eq!(Location::of(input, offset), Location { line: 3, column: 11 });
        assert_eq!(Location::of(input, 0), Location { line: 1, column: 1 });
    }

    #[test]
    fn test_display() {
        let err = ParseError::at("insert\n$x", 7, "Unexpected input near: $x");
        assert_eq!(err.to_string(), "Unexpected input near: $x (line 2, column 1)");
        assert_eq!(ParseError::new("Incomplete input").to_string(), "Incomplete input");
    }
}
