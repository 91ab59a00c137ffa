use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::table::ResultTable;

/// Render a query result as a rounded terminal table.
pub fn render_table(result: &ResultTable) -> String {
    if result.is_empty() {
        return String::new();
    }
    let mut builder = Builder::default();
    builder.push_record(result.columns().iter().map(String::as_str));
    for row in result.rows() {
        builder.push_record(row.iter().map(|cell| cell.display()));
    }
    builder.build().with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    if stats.is_empty() {
        return String::new();
    }
    let rows: Vec<StatsRow> = stats
        .iter()
        .map(|(label, value)| StatsRow {
            metric: label.to_string(),
            value: value.clone(),
        })
        .collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_columns_and_cells() {
        let mut result = ResultTable::new(["gene_name", "psi_mean"]);
        result.push_row(vec!["Alb".into(), 0.9.into()]);
        let rendered = render_table(&result);
        assert!(rendered.contains("gene_name"));
        assert!(rendered.contains("Alb"));
        assert!(rendered.contains("0.9"));
    }

    #[test]
    fn empty_result_renders_nothing() {
        let result = ResultTable::new(["gene_name"]);
        assert!(render_table(&result).is_empty());
    }
}
