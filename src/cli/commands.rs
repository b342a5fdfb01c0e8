//! # Dot Command Handler
//!
//! Parses and executes dot commands for database introspection and CLI
//! control. Dot commands start with a period and are not SQL.
//!
//! | Command            | Description                              |
//! |--------------------|------------------------------------------|
//! | `.quit` / `.exit`  | Exit the CLI                             |
//! | `.tables`          | List all tables                          |
//! | `.schema [table]`  | Show columns for table(s)                |
//! | `.indexes [table]` | List indexed columns                     |
//! | `.help`            | Show available commands                  |
//!
//! Commands are case-insensitive; arguments are whitespace-separated.

use crate::Database;

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    Output(String),
    Exit,
    Continue,
    Error(String),
}

pub struct CommandHandler;

impl CommandHandler {
    pub fn is_command(input: &str) -> bool {
        input.trim().starts_with('.')
    }

    pub fn execute(input: &str, db: &Database) -> CommandResult {
        let input = input.trim();
        let parts: Vec<&str> = input.split_whitespace().collect();

        if parts.is_empty() {
            return CommandResult::Continue;
        }

        let cmd = parts[0].to_lowercase();
        let args = &parts[1..];

        match cmd.as_str() {
            ".quit" | ".exit" | ".q" => CommandResult::Exit,
            ".help" | ".h" | ".?" => CommandResult::Output(help_text()),
            ".tables" => list_tables(db),
            ".schema" => show_schema(db, args),
            ".indexes" => list_indexes(db, args),
            _ => CommandResult::Error(format!(
                "Unknown command: {}. Type .help for available commands.",
                cmd
            )),
        }
    }
}

fn help_text() -> String {
    r#"RowanDB CLI Commands:

  .quit, .exit, .q     Exit the CLI
  .help, .h, .?        Show this help message
  .tables              List all tables in the database
  .schema [TABLE]      Show columns for TABLE (or all tables)
  .indexes [TABLE]     List indexed columns (optionally for one table)

Statements end with a semicolon (;). Examples:
  CREATE TABLE users (id, name);
  INSERT INTO users VALUES (1, 'Alice');
  SELECT * FROM users WHERE name LIKE 'A%';
  UPDATE users SET name = 'Bob' ROW 0;
  BEGIN TRANSACTION ISOLATION LEVEL READ COMMITTED;"#
        .to_string()
}

fn list_tables(db: &Database) -> CommandResult {
    let tables = db.tables();
    if tables.is_empty() {
        CommandResult::Output("No tables found.".to_string())
    } else {
        CommandResult::Output(tables.join("\n"))
    }
}

fn show_schema(db: &Database, args: &[&str]) -> CommandResult {
    let targets: Vec<String> = match args.first() {
        Some(name) => vec![name.to_string()],
        None => db.tables(),
    };

    if targets.is_empty() {
        return CommandResult::Output("No tables found.".to_string());
    }

    let mut out = Vec::new();
    for name in &targets {
        match db.table_info(name) {
            Ok((columns, _)) => {
                out.push(format!("CREATE TABLE {} ({})", name, columns.join(", ")));
            }
            Err(_) => return CommandResult::Error(format!("Table '{}' not found.", name)),
        }
    }
    CommandResult::Output(out.join("\n"))
}

fn list_indexes(db: &Database, args: &[&str]) -> CommandResult {
    let targets: Vec<String> = match args.first() {
        Some(name) => vec![name.to_string()],
        None => db.tables(),
    };

    let mut out = Vec::new();
    for name in &targets {
        match db.table_info(name) {
            Ok((_, indexed)) => {
                for column in indexed {
                    out.push(format!("INDEX ON {} ({})", name, column));
                }
            }
            Err(_) => return CommandResult::Error(format!("Table '{}' not found.", name)),
        }
    }

    if out.is_empty() {
        CommandResult::Output("No indexes found.".to_string())
    } else {
        CommandResult::Output(out.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn is_command_returns_true_for_dot_prefix() {
        assert!(CommandHandler::is_command(".quit"));
        assert!(CommandHandler::is_command("  .help"));
        assert!(!CommandHandler::is_command("SELECT * FROM users"));
        assert!(!CommandHandler::is_command(""));
    }

    #[test]
    fn quit_commands_return_exit() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test")).unwrap();

        assert_eq!(CommandHandler::execute(".quit", &db), CommandResult::Exit);
        assert_eq!(CommandHandler::execute(".exit", &db), CommandResult::Exit);
        assert_eq!(CommandHandler::execute(".q", &db), CommandResult::Exit);
    }

    #[test]
    fn tables_command_lists_tables() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test")).unwrap();
        db.execute("CREATE TABLE users (id)").unwrap();
        db.execute("CREATE TABLE orders (id)").unwrap();

        match CommandHandler::execute(".tables", &db) {
            CommandResult::Output(text) => {
                assert!(text.contains("users"));
                assert!(text.contains("orders"));
            }
            other => panic!("Expected Output, got {:?}", other),
        }
    }

    #[test]
    fn schema_command_shows_columns() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test")).unwrap();
        db.execute("CREATE TABLE users (id, name)").unwrap();

        match CommandHandler::execute(".schema users", &db) {
            CommandResult::Output(text) => {
                assert!(text.contains("CREATE TABLE users"));
                assert!(text.contains("id, name"));
            }
            other => panic!("Expected Output, got {:?}", other),
        }
    }

    #[test]
    fn schema_nonexistent_table_returns_error() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test")).unwrap();

        match CommandHandler::execute(".schema ghost", &db) {
            CommandResult::Error(msg) => assert!(msg.contains("not found")),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_command_returns_error() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test")).unwrap();

        match CommandHandler::execute(".unknown", &db) {
            CommandResult::Error(msg) => assert!(msg.contains("Unknown command")),
            other => panic!("Expected Error, got {:?}", other),
        }
    }
}
