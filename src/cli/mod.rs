//! Interactive command-line interface.

pub mod commands;
pub mod history;
pub mod repl;

pub use repl::Repl;
