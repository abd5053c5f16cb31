use comfy_table::{presets::NOTHING, Attribute, Cell, CellAlignment, ContentArrangement, Table};

/// Create a table with the standard CLI styling (no borders, no wrapping)
pub fn styled_table() -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Disabled);
    table
}

pub fn apply_column_padding(table: &mut Table, padding: (u16, u16)) {
    for i in 0..table.column_count() {
        if let Some(col) = table.column_mut(i) {
            col.set_padding(padding);
        }
    }
}

/// Create a header cell with dim + bold styling
pub fn header(text: &str) -> Cell {
    Cell::new(text)
        .add_attribute(Attribute::Bold)
        .add_attribute(Attribute::Dim)
}

/// Right-aligned cell for counts.
pub fn number(value: u64) -> Cell {
    Cell::new(crate::utils::format_count(value)).set_alignment(CellAlignment::Right)
}

/// Keep the tail of long values such as file paths, where the end is the
/// distinguishing part.
pub fn truncate_start(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let tail: String = text.chars().skip(count - keep).collect();
    format!("…{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_start_keeps_short_text() {
        assert_eq!(truncate_start("teams.csv", 20), "teams.csv");
    }

    #[test]
    fn truncate_start_keeps_tail() {
        assert_eq!(truncate_start("/data/exports/contacts.csv", 13), "…contacts.csv");
    }

    #[test]
    fn truncate_start_counts_chars_not_bytes() {
        assert_eq!(truncate_start("ééééé", 3), "…éé");
    }
}
