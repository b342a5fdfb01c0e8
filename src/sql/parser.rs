//! # Statement Parser
//!
//! Turns one line of the SQL-ish dialect into a [`Statement`] for the
//! engine façade. The dialect is deliberately small — the engine contract
//! addresses rows by position, so UPDATE and DELETE name an explicit row:
//!
//! ```text
//! CREATE TABLE users (id, name)
//! CREATE INDEX ON users (name)
//! DROP TABLE users
//! INSERT INTO users VALUES (1, 'Alice')
//! UPDATE users SET name = 'Bob' ROW 0
//! DELETE FROM users ROW 0
//! SELECT * FROM users WHERE name LIKE 'A%' AND id > 1
//! BEGIN TRANSACTION ISOLATION LEVEL READ COMMITTED
//! COMMIT / ROLLBACK / SAVEPOINT s1 / ROLLBACK TO SAVEPOINT s1
//! ```
//!
//! Keywords are case-insensitive; identifiers and values keep their case.
//! A trailing semicolon is stripped. Quoting follows the WHERE tokenizer:
//! single pairs with single, double with double, quoted text is literal.

use crate::sql::ast::{IsolationLevel, Statement, WhereExpr};
use eyre::{bail, ensure, Result};

/// One whitespace-delimited word with its source location. Quoted words
/// never match keywords.
#[derive(Debug)]
struct Span {
    text: String,
    start: usize,
    end: usize,
    quoted: bool,
}

impl Span {
    fn is_keyword(&self, keyword: &str) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Parses one statement. The input may carry a trailing semicolon.
pub fn parse(input: &str) -> Result<Statement> {
    let input = input.trim().trim_end_matches(';').trim();
    ensure!(!input.is_empty(), "empty statement");

    let spans = split_spans(input);
    ensure!(!spans.is_empty(), "empty statement");

    let head = spans[0].text.to_uppercase();
    match head.as_str() {
        "CREATE" if keyword_at(&spans, 1, "TABLE") => parse_create_table(input),
        "CREATE" if keyword_at(&spans, 1, "INDEX") => parse_create_index(input, &spans),
        "DROP" if keyword_at(&spans, 1, "TABLE") => {
            ensure!(spans.len() >= 3, "Syntax error: DROP TABLE table_name");
            Ok(Statement::DropTable {
                table: spans[2].text.to_lowercase(),
            })
        }
        "INSERT" if keyword_at(&spans, 1, "INTO") => parse_insert(input, &spans),
        "UPDATE" => parse_update(input, &spans),
        "DELETE" if keyword_at(&spans, 1, "FROM") => parse_delete(&spans),
        "SELECT" => parse_select(input, &spans),
        "BEGIN" => parse_begin(&spans),
        "COMMIT" => Ok(Statement::Commit),
        "ROLLBACK" => parse_rollback(&spans),
        "SAVEPOINT" => {
            ensure!(spans.len() >= 2, "Syntax error: SAVEPOINT name");
            Ok(Statement::Savepoint {
                name: spans[1].text.clone(),
            })
        }
        _ => bail!("Unknown command: {}", spans[0].text),
    }
}

fn keyword_at(spans: &[Span], index: usize, keyword: &str) -> bool {
    spans.get(index).map(|s| s.is_keyword(keyword)) == Some(true)
}

fn parse_create_table(input: &str) -> Result<Statement> {
    // CREATE TABLE users (id, name)
    let Some(paren) = input.find('(') else {
        bail!("Syntax error: CREATE TABLE table_name (col, ...)");
    };
    let header: Vec<&str> = input[..paren].split_whitespace().collect();
    ensure!(
        header.len() >= 3,
        "Syntax error: CREATE TABLE table_name (col, ...)"
    );
    let table = header[2].to_lowercase();

    let cols_raw = input[paren + 1..].trim().trim_end_matches(')');
    let columns: Vec<String> = cols_raw
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    ensure!(!columns.is_empty(), "no columns specified");

    Ok(Statement::CreateTable { table, columns })
}

fn parse_create_index(input: &str, _spans: &[Span]) -> Result<Statement> {
    // CREATE INDEX ON users (name)
    let Some(paren) = input.find('(') else {
        bail!("Syntax error: CREATE INDEX ON table_name (column)");
    };
    let header: Vec<&str> = input[..paren].split_whitespace().collect();
    ensure!(
        header.len() >= 4 && header[2].eq_ignore_ascii_case("ON"),
        "Syntax error: CREATE INDEX ON table_name (column)"
    );
    let table = header[3].to_lowercase();

    let column = input[paren + 1..]
        .trim()
        .trim_end_matches(')')
        .trim()
        .to_string();
    ensure!(!column.is_empty(), "Syntax error: missing column name");

    Ok(Statement::CreateIndex { table, column })
}

fn parse_insert(input: &str, spans: &[Span]) -> Result<Statement> {
    // INSERT INTO users VALUES (1, 'Alice')
    let Some(values_kw) = spans.iter().find(|s| s.is_keyword("VALUES")) else {
        bail!("Syntax error: missing VALUES");
    };
    ensure!(spans.len() >= 3, "Syntax error: INSERT INTO table_name VALUES (...)");
    let table = spans[2].text.to_lowercase();

    let raw = input[values_kw.end..].trim();
    ensure!(
        raw.starts_with('(') && raw.ends_with(')'),
        "Syntax error: values must be in (...)"
    );
    let values = split_values(&raw[1..raw.len() - 1]);

    Ok(Statement::Insert { table, values })
}

fn parse_update(input: &str, spans: &[Span]) -> Result<Statement> {
    // UPDATE users SET name = 'Bob', email = 'b@x' ROW 0
    ensure!(
        spans.len() >= 6 && spans[2].is_keyword("SET"),
        "Syntax error: UPDATE table_name SET column = value ROW index"
    );
    let table = spans[1].text.to_lowercase();

    let Some(row_pos) = spans
        .iter()
        .rposition(|s| s.is_keyword("ROW"))
        .filter(|&i| i + 1 < spans.len())
    else {
        bail!("Syntax error: missing ROW index");
    };
    let row_index: usize = spans[row_pos + 1]
        .text
        .parse()
        .map_err(|_| eyre::eyre!("Syntax error: missing ROW index"))?;

    let set_clause = input[spans[2].end..spans[row_pos].start].trim();
    let assignments = parse_assignments(set_clause)?;
    ensure!(!assignments.is_empty(), "Syntax error: missing SET clause");

    Ok(Statement::Update {
        table,
        row_index,
        assignments,
    })
}

fn parse_delete(spans: &[Span]) -> Result<Statement> {
    // DELETE FROM users ROW 0
    ensure!(
        spans.len() >= 5,
        "Syntax error: DELETE FROM table_name ROW index"
    );
    let table = spans[2].text.to_lowercase();

    let Some(row_pos) = spans
        .iter()
        .rposition(|s| s.is_keyword("ROW"))
        .filter(|&i| i + 1 < spans.len())
    else {
        bail!("Syntax error: missing ROW index");
    };
    let row_index: usize = spans[row_pos + 1]
        .text
        .parse()
        .map_err(|_| eyre::eyre!("Syntax error: missing ROW index"))?;

    Ok(Statement::Delete { table, row_index })
}

fn parse_select(input: &str, spans: &[Span]) -> Result<Statement> {
    // SELECT * FROM users [WHERE ...]
    ensure!(
        spans.len() >= 4
            && spans[1].is_keyword("*")
            && spans[2].is_keyword("FROM"),
        "Syntax error: SELECT * FROM table_name [WHERE conditions]"
    );
    let table = spans[3].text.to_lowercase();

    match spans.iter().find(|s| s.is_keyword("WHERE")) {
        None => Ok(Statement::SelectAll { table }),
        Some(where_kw) => {
            let expr = WhereExpr::parse(input[where_kw.end..].trim())?;
            Ok(Statement::SelectWhere { table, expr })
        }
    }
}

fn parse_begin(spans: &[Span]) -> Result<Statement> {
    // BEGIN [TRANSACTION] [ISOLATION LEVEL level]
    let mut isolation = IsolationLevel::default();

    if let Some(iso_pos) = spans.iter().position(|s| s.is_keyword("ISOLATION")) {
        ensure!(
            keyword_at(spans, iso_pos + 1, "LEVEL") && spans.len() > iso_pos + 2,
            "Invalid isolation level"
        );
        let level_words: Vec<&str> = spans[iso_pos + 2..]
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        isolation = level_words
            .join(" ")
            .parse()
            .map_err(|_| eyre::eyre!("Invalid isolation level"))?;
    }

    Ok(Statement::Begin { isolation })
}

fn parse_rollback(spans: &[Span]) -> Result<Statement> {
    // ROLLBACK [TRANSACTION] | ROLLBACK TO SAVEPOINT name
    if keyword_at(spans, 1, "TO") {
        ensure!(
            keyword_at(spans, 2, "SAVEPOINT") && spans.len() >= 4,
            "Syntax error: ROLLBACK TO SAVEPOINT name"
        );
        return Ok(Statement::RollbackToSavepoint {
            name: spans[3].text.clone(),
        });
    }
    Ok(Statement::Rollback)
}

/// Splits input into whitespace-delimited words, keeping quoted stretches
/// whole and remembering byte offsets so callers can slice the original.
fn split_spans(input: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    let mut quoted = false;

    for (pos, ch) in input.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    if current.is_empty() {
                        start = pos;
                    }
                    quoted = true;
                    quote = Some(ch);
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() || quoted {
                        spans.push(Span {
                            text: std::mem::take(&mut current),
                            start,
                            end: pos,
                            quoted,
                        });
                        quoted = false;
                    }
                }
                c => {
                    if current.is_empty() && !quoted {
                        start = pos;
                    }
                    current.push(c);
                }
            },
        }
    }

    if !current.is_empty() || quoted {
        spans.push(Span {
            text: current,
            start,
            end: input.len(),
            quoted,
        });
    }

    spans
}

/// Splits a comma-separated value list, honoring quotes. Each value is
/// trimmed and unquoted.
fn split_values(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    split_top_level_commas(raw)
        .into_iter()
        .map(|v| unquote(v.trim()))
        .collect()
}

/// Parses `col = value, col = value` with quote-aware value handling.
fn parse_assignments(raw: &str) -> Result<Vec<(String, String)>> {
    let mut assignments = Vec::new();

    for segment in split_top_level_commas(raw) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let Some((column, value)) = segment.split_once('=') else {
            bail!("Invalid assignment: {}", segment);
        };
        let column = column.trim().to_string();
        ensure!(!column.is_empty(), "Invalid assignment: {}", segment);
        assignments.push((column, unquote(value.trim())));
    }

    Ok(assignments)
}

fn split_top_level_commas(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                ',' => segments.push(std::mem::take(&mut current)),
                '\'' | '"' => {
                    current.push(ch);
                    quote = Some(ch);
                }
                c => current.push(c),
            },
        }
    }
    segments.push(current);
    segments
}

/// Strips one pair of matching surrounding quotes, if present.
fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
