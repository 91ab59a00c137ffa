//! CSV encoding of result tables (transport concern only).

use crate::table::ResultTable;

/// RFC 4180-style quoting: fields containing a comma, quote or newline
/// are wrapped in quotes with inner quotes doubled.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Encode a table as CSV text with a header row. Null cells encode as
/// empty fields.
pub fn encode(table: &ResultTable) -> String {
    let mut out = String::new();
    let header: Vec<String> = table.columns().iter().map(|c| escape(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in table.rows() {
        let fields: Vec<String> = row.iter().map(|cell| escape(&cell.display())).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}
