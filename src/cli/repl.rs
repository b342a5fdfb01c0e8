//! # REPL - Read-Eval-Print Loop
//!
//! The interactive loop for the RowanDB CLI:
//!
//! - Reads input with rustyline (history, line editing)
//! - Dispatches dot commands immediately; accumulates SQL until `;`
//! - Executes statements and prints rendered results
//!
//! Multi-line statements are supported; the prompt switches from
//! `rowandb>` to `     ->` in continuation mode. Statement errors are
//! printed without terminating the loop.

use crate::cli::commands::{CommandHandler, CommandResult};
use crate::cli::history::history_path;
use crate::Database;
use eyre::{Result, WrapErr};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::time::Instant;

const PRIMARY_PROMPT: &str = "rowandb> ";
const CONTINUATION_PROMPT: &str = "     -> ";

pub struct Repl {
    db: Database,
    editor: DefaultEditor,
    sql_buffer: String,
}

impl Repl {
    pub fn new(db: Database) -> Result<Self> {
        let mut editor = DefaultEditor::new().wrap_err("failed to initialize line editor")?;

        if let Some(history_file) = history_path() {
            let _ = editor.load_history(&history_file);
        }

        Ok(Self {
            db,
            editor,
            sql_buffer: String::new(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = if self.sql_buffer.is_empty() {
                PRIMARY_PROMPT
            } else {
                CONTINUATION_PROMPT
            };

            match self.editor.readline(prompt) {
                Ok(line) => {
                    if !self.handle_line(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    self.sql_buffer.clear();
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("Bye");
                    break;
                }
                Err(err) => {
                    eprintln!("Error reading input: {}", err);
                    break;
                }
            }
        }

        self.save_history();
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return true;
        }

        if self.sql_buffer.is_empty() && CommandHandler::is_command(trimmed) {
            self.editor.add_history_entry(trimmed).ok();
            return self.execute_command(trimmed);
        }

        if !self.sql_buffer.is_empty() {
            self.sql_buffer.push(' ');
        }
        self.sql_buffer.push_str(trimmed);

        if self.sql_buffer.trim_end().ends_with(';') {
            let sql = std::mem::take(&mut self.sql_buffer);
            self.editor.add_history_entry(&sql).ok();
            self.execute_sql(&sql);
        }

        true
    }

    fn execute_command(&mut self, input: &str) -> bool {
        match CommandHandler::execute(input, &self.db) {
            CommandResult::Exit => false,
            CommandResult::Output(text) => {
                println!("{}", text);
                true
            }
            CommandResult::Continue => true,
            CommandResult::Error(msg) => {
                eprintln!("Error: {}", msg);
                true
            }
        }
    }

    fn execute_sql(&mut self, sql: &str) {
        let start = Instant::now();

        match self.db.execute(sql) {
            Ok(result) => {
                let elapsed = start.elapsed();
                print!("{}", ensure_trailing_newline(result.render()));
                println!("({:.3} sec)", elapsed.as_secs_f64());
            }
            Err(err) => {
                eprintln!("Error: {}", err);
            }
        }
    }

    fn print_welcome(&self) {
        println!("RowanDB version {}", env!("CARGO_PKG_VERSION"));
        println!("Enter \".help\" for usage hints.");
        println!("Connected to: {}", self.db.path().display());
        println!();
    }

    fn save_history(&mut self) {
        if let Some(history_file) = history_path() {
            if let Err(e) = self.editor.save_history(&history_file) {
                eprintln!("Warning: could not save history: {}", e);
            }
        }
    }
}

fn ensure_trailing_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
