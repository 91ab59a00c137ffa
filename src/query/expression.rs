//! Expression summary engine
//!
//! Mean/variance pairs from the second store, keyed by (gene,
//! condition). The two stores share no foreign key, so this is a
//! tolerant join: a gene that exists in the specificity store may have
//! no rows here, and that is an empty result for the gene, not an
//! error. The set difference between requested and answered genes is
//! surfaced explicitly so collaborators can report "no expression
//! data" distinctly from "no such gene".

use std::collections::BTreeSet;

use crate::storage::ExpressionStore;
use crate::table::ResultTable;
use crate::{GeneSelection, Result};

pub(crate) const EXPRESSION_TABLE_COLUMNS: [&str; 5] =
    ["gene_name", "ensembl_id", "condition", "mean", "variance"];

/// Engine for expression mean/variance retrieval.
pub struct ExpressionEngine<'a> {
    store: &'a ExpressionStore,
}

impl<'a> ExpressionEngine<'a> {
    pub fn new(store: &'a ExpressionStore) -> Self {
        Self { store }
    }

    /// Expression rows for a gene selection, optionally filtered to a
    /// condition set (empty slice means every condition). Rows sorted
    /// by gene_name then condition.
    pub fn get_expression(
        &self,
        selection: &GeneSelection,
        conditions: &[String],
    ) -> Result<ResultTable> {
        let rows = self.store.expression_rows(selection, conditions)?;
        let mut table = ResultTable::new(EXPRESSION_TABLE_COLUMNS);
        for row in rows {
            table.push_row(vec![
                row.gene_name.into(),
                row.ensembl_id.into(),
                row.condition.into(),
                row.mean.into(),
                row.variance.into(),
            ]);
        }
        Ok(table)
    }

    /// Requested identifiers that matched no row in `table` (by
    /// gene_name or ensembl_id). Empty for `All` selections.
    pub fn missing_genes(selection: &GeneSelection, table: &ResultTable) -> Vec<String> {
        let GeneSelection::Ids(requested) = selection else {
            return Vec::new();
        };
        let mut answered: BTreeSet<&str> = BTreeSet::new();
        for column in ["gene_name", "ensembl_id"] {
            answered.extend(
                table
                    .column_values(column)
                    .into_iter()
                    .filter_map(|v| v.as_str()),
            );
        }
        requested
            .iter()
            .filter(|id| !answered.contains(id.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::test_fixtures::seeded_expression_store;

    #[test]
    fn joins_by_gene_and_condition() {
        let store = seeded_expression_store();
        let engine = ExpressionEngine::new(&store);
        let table = engine
            .get_expression(
                &GeneSelection::from_ids(["Alb", "Gapdh"]),
                &["liver".to_string()],
            )
            .unwrap();
        assert_eq!(table.len(), 2);
        let genes: Vec<_> = table
            .column_values("gene_name")
            .into_iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(genes, vec!["Alb", "Gapdh"]);
    }

    #[test]
    fn gene_without_expression_rows_is_not_an_error() {
        let store = seeded_expression_store();
        let engine = ExpressionEngine::new(&store);
        let selection = GeneSelection::from_ids(["Alb", "Xist"]);
        let table = engine.get_expression(&selection, &[]).unwrap();
        // Alb answered, Xist silently absent from the rows...
        assert_eq!(table.len(), 2);
        // ...but surfaced through the set-difference check.
        assert_eq!(
            ExpressionEngine::missing_genes(&selection, &table),
            vec!["Xist".to_string()]
        );
    }

    #[test]
    fn ensembl_ids_count_as_answered() {
        let store = seeded_expression_store();
        let engine = ExpressionEngine::new(&store);
        let selection = GeneSelection::from_ids(["ENSMUSG_Gapdh"]);
        let table = engine.get_expression(&selection, &[]).unwrap();
        assert_eq!(table.len(), 2);
        assert!(ExpressionEngine::missing_genes(&selection, &table).is_empty());
    }

    #[test]
    fn all_selection_reports_no_missing_genes() {
        let store = seeded_expression_store();
        let engine = ExpressionEngine::new(&store);
        let table = engine.get_expression(&GeneSelection::All, &[]).unwrap();
        assert_eq!(table.len(), 4);
        assert!(ExpressionEngine::missing_genes(&GeneSelection::All, &table).is_empty());
    }
}
