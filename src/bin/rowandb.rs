//! # RowanDB CLI Entry Point
//!
//! ```bash
//! # Open (or create) a database directory
//! rowandb ./mydb
//!
//! # Show version / help
//! rowandb --version
//! rowandb --help
//! ```

use eyre::{bail, Result, WrapErr};
use rowandb::cli::Repl;
use rowandb::Database;
use std::env;
use std::path::PathBuf;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;

    for arg in &args[1..] {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("rowandb {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            flag if flag.starts_with('-') => {
                bail!("Unknown option: {}", flag);
            }
            path => {
                if db_path.is_some() {
                    bail!("Multiple database paths specified");
                }
                db_path = Some(PathBuf::from(path));
            }
        }
    }

    let Some(db_path) = db_path else {
        print_usage();
        return Ok(());
    };

    let db = Database::open(&db_path)
        .wrap_err_with(|| format!("failed to open database at {:?}", db_path))?;

    let mut repl = Repl::new(db)?;
    repl.run()?;

    Ok(())
}

fn print_usage() {
    println!("RowanDB - durable single-node relational store");
    println!();
    println!("USAGE:");
    println!("    rowandb [OPTIONS] <DATABASE_PATH>");
    println!();
    println!("ARGS:");
    println!("    <DATABASE_PATH>    Path to the database directory (created if missing)");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version information");
}
