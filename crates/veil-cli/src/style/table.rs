//! Tables rendered with comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use veil::Rows;

use super::SemanticStyle;

/// An empty table with a bold header row.
pub fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = headers
        .iter()
        .map(|h| {
            if super::no_color() {
                Cell::new(h)
            } else {
                Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header);
    table
}

/// Prints query rows followed by a row count.
pub fn print_rows(rows: &Rows) {
    if rows.columns.is_empty() {
        println!("{}", "(no result columns)".muted());
        return;
    }

    let headers: Vec<&str> = rows.columns.iter().map(String::as_str).collect();
    let mut table = styled_table(&headers);
    for row in &rows.rows {
        table.add_row(row.iter().map(ToString::to_string));
    }
    println!("{table}");

    let count = rows.len();
    let word = if count == 1 { "row" } else { "rows" };
    println!("{}", format!("({count} {word})").muted());
}
