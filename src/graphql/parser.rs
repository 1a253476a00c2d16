use graphql_parser::query::parse_query;

use crate::{
    graphql::document::Document,
    model::apperror::{ApplicationError, ErrorType},
};

/**
 * Deepest nesting of selection sets, lists, objects and argument lists a document may use.
 */
pub const MAX_DEPTH: usize = 64;

/**
 * Parses a query document.
 *
 * The nesting depth is checked on the raw text first, so the recursive parser never sees a
 * document deeper than `MAX_DEPTH`.
 *
 * # Arguments
 * `source`: Query text as sent by the client.
 *
 * # Returns
 * The parsed document or a `QuerySyntax` error carrying the position of the problem.
 */
pub fn parse_document(source: &str) -> Result<Document<'_>, ApplicationError> {
    check_depth(source)?;
    let parsed = parse_query::<String>(source).map_err(|err| {
        let detail = err.to_string();
        let detail = detail.strip_prefix("query parse error: ").unwrap_or(&detail);
        ApplicationError::new(ErrorType::QuerySyntax, format!("Syntax error: {}", detail.lines().map(str::trim).filter(|line| !line.is_empty()).collect::<Vec<_>>().join("; ")))
    })?;
    Document::new(parsed)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    String,
    BlockString,
    Comment,
}

/**
 * Walks the text once and rejects it when brackets nest deeper than `MAX_DEPTH`.
 * Brackets inside strings and comments are not counted.
 */
fn check_depth(source: &str) -> Result<(), ApplicationError> {
    let bytes = source.as_bytes();
    let mut state = ScanState::Code;
    let mut depth = 0usize;
    let (mut line, mut column) = (1usize, 0usize);
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if byte == b'\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
        match state {
            ScanState::Code => match byte {
                b'{' | b'[' | b'(' => {
                    depth += 1;
                    if depth > MAX_DEPTH {
                        return Err(ApplicationError::new(ErrorType::QuerySyntax, format!("Syntax error at {line}:{column}: document nests deeper than {MAX_DEPTH} levels")));
                    }
                }
                b'}' | b']' | b')' => depth = depth.saturating_sub(1),
                b'#' => state = ScanState::Comment,
                b'"' if bytes[index..].starts_with(b"\"\"\"") => {
                    state = ScanState::BlockString;
                    index += 2;
                    column += 2;
                }
                b'"' => state = ScanState::String,
                _ => {}
            },
            ScanState::String => match byte {
                b'\\' => {
                    index += 1;
                    column += 1;
                }
                b'"' | b'\n' => state = ScanState::Code,
                _ => {}
            },
            ScanState::BlockString => {
                if bytes[index..].starts_with(b"\\\"\"\"") {
                    index += 3;
                    column += 3;
                } else if bytes[index..].starts_with(b"\"\"\"") {
                    state = ScanState::Code;
                    index += 2;
                    column += 2;
                }
            }
            ScanState::Comment => {
                if byte == b'\n' || byte == b'\r' {
                    state = ScanState::Code;
                }
            }
        }
        index += 1;
    }
    Ok(())
}
