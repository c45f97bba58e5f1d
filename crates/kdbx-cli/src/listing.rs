//! Attachment listings: a table for people, tab-separated lines for scripts.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use kdbx_xml::AttachmentListing;

/// Hex digits of the SHA-256 fingerprint shown per attachment.
const FINGERPRINT_DIGITS: usize = 12;

pub fn listing_table(rows: &[AttachmentListing]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Entry"),
        header_cell("File"),
        header_cell("Pool"),
        header_cell("Size"),
        header_cell("SHA-256"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);

    let mut total = 0usize;
    for row in rows {
        total += row.size;
        let entry = if row.history {
            dim_cell(&row.owner_label)
        } else {
            Cell::new(&row.owner_label)
        };
        table.add_row(vec![
            entry,
            Cell::new(&row.filename),
            Cell::new(row.pool_index),
            Cell::new(format_size(row.size)),
            Cell::new(row.fingerprint.short_hex(FINGERPRINT_DIGITS)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(format!("{} files", rows.len())).add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(format_size(total)).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    table
}

/// One line per attachment: entry, file, pool index, size in bytes, fingerprint.
pub fn listing_lines(rows: &[AttachmentListing]) -> String {
    rows.iter()
        .map(|row| {
            format!(
                "{}\t{}\t{}\t{}\t{}",
                row.owner_label,
                row.filename,
                row.pool_index,
                row.size,
                row.fingerprint.short_hex(FINGERPRINT_DIGITS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
