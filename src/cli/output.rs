//! Output formatting for one-shot commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(items)?),
    }
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}

pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}
