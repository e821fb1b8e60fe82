//! RETURN clause column extraction for Apache AGE.
//!
//! AGE wraps every Cypher statement in `SELECT * FROM cypher(...) AS (...)`,
//! so the SQL column list must mirror the RETURN items. Statements are parsed
//! with a trimmed openCypher grammar and the items of the final RETURN
//! clause are read off the parse tree.
//!
//! # Example
//!
//! ```
//! use pricegraph::graph::extract_return_columns;
//!
//! let columns = extract_return_columns("MATCH (n) RETURN n.uid AS uid, n").unwrap();
//! assert_eq!(columns, vec!["uid", "n"]);
//! ```

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "graph/cypher.pest"]
struct CypherParser;

/// Extracts the column names of the last RETURN clause.
///
/// Aliased items (`expr AS alias`) yield the alias, others the trimmed
/// expression text. Statements that only write (no RETURN) give
/// [`ParseError::NoReturnClause`].
pub fn extract_return_columns(query: &str) -> Result<Vec<String>, ParseError> {
    let pairs = CypherParser::parse(Rule::Cypher, query)
        .map_err(|e| ParseError::InvalidSyntax(e.to_string()))?;

    let last_return = pairs
        .flatten()
        .filter(|pair| pair.as_rule() == Rule::Return)
        .last()
        .ok_or(ParseError::NoReturnClause)?;

    let items = last_return
        .into_inner()
        .flatten()
        .find(|pair| pair.as_rule() == Rule::ProjectionItems)
        .ok_or(ParseError::NoReturnClause)?;

    if items.as_str().trim_start().starts_with('*') {
        return Err(ParseError::ReturnStarNotSupported);
    }

    Ok(items
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::ProjectionItem)
        .map(column_name)
        .collect())
}

/// Errors that can occur while parsing a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidSyntax(String),
    NoReturnClause,
    ReturnStarNotSupported,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidSyntax(msg) => write!(f, "invalid Cypher syntax: {}", msg),
            ParseError::NoReturnClause => write!(f, "query has no RETURN clause"),
            ParseError::ReturnStarNotSupported => {
                write!(f, "RETURN * is not supported, list columns explicitly")
            }
        }
    }
}

impl std::error::Error for ParseError {}

fn column_name(item: Pair<'_, Rule>) -> String {
    let mut expression = "";
    let mut alias = None;

    for part in item.into_inner() {
        match part.as_rule() {
            Rule::Expression => expression = part.as_str(),
            Rule::Variable => alias = Some(part.as_str().trim().trim_matches('`')),
            _ => {}
        }
    }

    alias.unwrap_or(expression).trim().to_string()
}
