//! Shared styling utilities for the CLI.

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use console::Style;

use taskweave_core::ConflictSeverity;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Severity label, colored by how bad it is.
pub fn severity(level: ConflictSeverity) -> String {
    let style = match level {
        ConflictSeverity::None => Style::new().dim(),
        ConflictSeverity::Low => Style::new().green(),
        ConflictSeverity::Medium => Style::new().yellow(),
        ConflictSeverity::High => Style::new().red(),
        ConflictSeverity::Critical => Style::new().red().bold(),
    };
    style.apply_to(level.to_string()).to_string()
}

/// First seven characters of a commit hash.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

/// An empty table with the house preset.
pub fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}
