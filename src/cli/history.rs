//! # History File Management
//!
//! Resolves the CLI history file location. By default history is stored in
//! `~/.rowandb_history`; set `ROWANDB_HISTORY` to override the path or to
//! an empty string to disable persistence. rustyline handles the file I/O.

use std::env;
use std::path::PathBuf;

const DEFAULT_HISTORY_FILE: &str = ".rowandb_history";
const HISTORY_ENV_VAR: &str = "ROWANDB_HISTORY";

pub fn history_path() -> Option<PathBuf> {
    if let Ok(custom_path) = env::var(HISTORY_ENV_VAR) {
        if custom_path.is_empty() {
            return None;
        }
        return Some(PathBuf::from(custom_path));
    }

    home_dir().map(|home| home.join(DEFAULT_HISTORY_FILE))
}

fn home_dir() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}
