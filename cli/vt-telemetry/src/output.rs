//! Output formatting for CLI commands.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", format_table(data));
            }
        }
        OutputFormat::Json => print_json(&data),
    }
}

/// Render rows as a table.
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    Table::new(data).to_string()
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{} failed to format output: {}", "Error:".red().bold(), e),
    }
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// `-` for absent values in table cells.
pub fn display_option<T: ToString>(opt: &Option<T>) -> String {
    opt.as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}
