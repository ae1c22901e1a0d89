//! TQL parser using nom
//!
//! Accepts exactly what the renderer in `ast` produces, plus free whitespace.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{map, not, opt, recognize, value},
    error::ErrorKind,
    multi::{many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
};

use crate::ast::*;
use crate::error::ParseError;

/// Parse a write pipeline (`match` / `put` / `insert` stages)
pub fn parse_write_query(input: &str) -> Result<WriteQuery, ParseError> {
    let (remaining, stages) = many1(stage)(input).map_err(|e| located(input, e))?;
    expect_end(input, remaining)?;
    Ok(WriteQuery { stages })
}

/// Parse a `match ... fetch { ... };` query
pub fn parse_fetch_query(input: &str) -> Result<FetchQuery, ParseError> {
    let (remaining, query) = fetch_query(input).map_err(|e| located(input, e))?;
    expect_end(input, remaining)?;
    Ok(query)
}

/// Parse either kind of query
pub fn parse_query(input: &str) -> Result<Query, ParseError> {
    match parse_fetch_query(input) {
        Ok(fetch) => Ok(Query::Fetch(fetch)),
        Err(_) => parse_write_query(input).map(Query::Write),
    }
}

fn expect_end(input: &str, remaining: &str) -> Result<(), ParseError> {
    let rest = remaining.trim();
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ParseError::at(
            input,
            input.len() - rest.len(),
            format!("Unexpected trailing content: {}", snippet(rest)),
        ))
    }
}

fn located(input: &str, err: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match err {
        nom::Err::Incomplete(_) => ParseError::new("Incomplete input"),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = input.len() - e.input.len();
            ParseError::at(input, offset, format!("Unexpected input near: {}", snippet(e.input)))
        }
    }
}

fn snippet(input: &str) -> String {
    input.chars().take(24).collect()
}

// ============================================================================
// Write pipelines
// ============================================================================

fn stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = multispace0(input)?;
    let (input, kind) = stage_kind(input)?;
    let (input, statements) = statements(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, Stage { kind, statements }))
}

fn stage_kind(input: &str) -> IResult<&str, StageKind> {
    alt((
        value(StageKind::Match, keyword("match")),
        value(StageKind::Put, keyword("put")),
        value(StageKind::Insert, keyword("insert")),
    ))(input)
}

fn statements(input: &str) -> IResult<&str, Vec<Statement>> {
    many1(preceded(multispace0, statement))(input)
}

fn statement(input: &str) -> IResult<&str, Statement> {
    alt((thing_statement, relation_statement))(input)
}

fn thing_statement(input: &str) -> IResult<&str, Statement> {
    let (input, var) = variable(input)?;
    let (input, _) = multispace1(input)?;
    let (input, constraints) = separated_list1(ws(char(',')), constraint)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(';')(input)?;
    Ok((input, Statement::Thing { var, constraints }))
}

fn relation_statement(input: &str) -> IResult<&str, Statement> {
    let (input, players) = role_tuple(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = keyword("isa")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, label) = label(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(';')(input)?;
    Ok((input, Statement::Relation {
        players,
        label: label.to_string(),
    }))
}

fn constraint(input: &str) -> IResult<&str, Constraint> {
    alt((
        map(
            preceded(pair(keyword("isa"), multispace1), label),
            |l| Constraint::Isa(l.to_string()),
        ),
        map(
            tuple((keyword("has"), multispace1, label, multispace1, term)),
            |(_, _, attribute, _, value)| Constraint::Has {
                attribute: attribute.to_string(),
                value,
            },
        ),
        map(
            preceded(pair(keyword("links"), multispace0), role_tuple),
            Constraint::Links,
        ),
    ))(input)
}

fn role_tuple(input: &str) -> IResult<&str, Vec<RolePlayer>> {
    delimited(
        pair(char('('), multispace0),
        separated_list1(ws(char(',')), role_player),
        pair(multispace0, char(')')),
    )(input)
}

fn role_player(input: &str) -> IResult<&str, RolePlayer> {
    map(
        separated_pair(label, ws(char(':')), variable),
        |(role, player)| RolePlayer {
            role: role.to_string(),
            player,
        },
    )(input)
}

// ============================================================================
// Fetch queries
// ============================================================================

fn fetch_query(input: &str) -> IResult<&str, FetchQuery> {
    let (input, _) = multispace0(input)?;
    let (input, _) = keyword("match")(input)?;
    let (input, pattern) = statements(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = keyword("fetch")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, projection) = projection(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(char(';'))(input)?;
    Ok((input, FetchQuery { pattern, projection }))
}

fn projection(input: &str) -> IResult<&str, Projection> {
    let (input, _) = pair(char('{'), multispace0)(input)?;
    let (input, entries) = separated_list0(ws(char(',')), entry)(input)?;
    let (input, _) = tuple((multispace0, opt(char(',')), multispace0, char('}')))(input)?;
    Ok((input, Projection { entries }))
}

fn entry(input: &str) -> IResult<&str, Entry> {
    let (input, key) = double_quoted(input)?;
    let (input, _) = ws(char(':'))(input)?;
    let (input, value) = projected(input)?;
    Ok((input, Entry { key, value }))
}

fn projected(input: &str) -> IResult<&str, Projected> {
    alt((
        delimited(
            pair(char('['), multispace0),
            alt((
                map(subquery, |query| Projected::Subquery {
                    many: true,
                    query: Box::new(query),
                }),
                map(attribute_path, |(var, attribute)| Projected::Attribute {
                    var,
                    attribute,
                    many: true,
                }),
            )),
            pair(multispace0, char(']')),
        ),
        map(subquery, |query| Projected::Subquery {
            many: false,
            query: Box::new(query),
        }),
        map(attribute_path, |(var, attribute)| Projected::Attribute {
            var,
            attribute,
            many: false,
        }),
    ))(input)
}

fn attribute_path(input: &str) -> IResult<&str, (Variable, String)> {
    map(separated_pair(variable, char('.'), label), |(var, attr)| {
        (var, attr.to_string())
    })(input)
}

fn subquery(input: &str) -> IResult<&str, Subquery> {
    let (input, _) = keyword("match")(input)?;
    let (input, pattern) = statements(input)?;
    let (input, _) = multispace0(input)?;
    let (input, output) = output(input)?;
    Ok((input, Subquery { pattern, output }))
}

fn output(input: &str) -> IResult<&str, Output> {
    alt((
        map(
            tuple((keyword("fetch"), multispace0, projection, multispace0, char(';'))),
            |(_, _, projection, _, _)| Output::Fetch(projection),
        ),
        map(
            tuple((
                keyword("return"),
                multispace1,
                keyword("first"),
                multispace1,
                variable,
                multispace0,
                char(';'),
            )),
            |(_, _, _, _, var, _, _)| Output::First(var),
        ),
        map(
            tuple((
                keyword("return"),
                multispace0,
                delimited(pair(char('{'), multispace0), variable, pair(multispace0, char('}'))),
                multispace0,
                char(';'),
            )),
            |(_, _, var, _, _)| Output::All(var),
        ),
    ))(input)
}

// ============================================================================
// Primitives
// ============================================================================

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(satisfy(is_label_char)))
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn label(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic()),
        take_while(is_label_char),
    ))(input)
}

fn variable(input: &str) -> IResult<&str, Variable> {
    map(preceded(char('$'), take_while1(is_label_char)), Variable::new)(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    alt((
        map(variable, Term::Variable),
        map(literal, Term::Literal),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(single_quoted, Literal::String),
        map(double_quoted, Literal::String),
        map(token, Literal::from_token),
    ))(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| {
        !c.is_whitespace()
            && !matches!(c, ';' | ',' | '(' | ')' | '[' | ']' | '{' | '}' | '\'' | '"' | '$')
    })(input)
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    quoted(input, '\'')
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    quoted(input, '"')
}

/// Quoted string where a backslash escapes the next character
fn quoted(input: &str, delim: char) -> IResult<&str, String> {
    let (mut rest, _) = char(delim)(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => {
                return Err(nom::Err::Error(nom::error::Error::new(rest, ErrorKind::Char)));
            }
            Some(c) if c == delim => return Ok((chars.as_str(), out)),
            Some('\\') => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => {
                    return Err(nom::Err::Error(nom::error::Error::new(rest, ErrorKind::Escaped)));
                }
            },
            Some(c) => out.push(c),
        }
        rest = chars.as_str();
    }
}
