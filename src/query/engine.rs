//! Specificity and psi-block query engines
//!
//! Retrieval operations over the specificity store:
//! - per-gene global Ψ/ζ rows for one (level, type)
//! - a whole-vocabulary specificity profile for a gene selection
//! - per-block Ψ decomposition rows, optionally narrowed to one block
//!
//! Every operation validates (level, type[, block]) against the
//! injected vocabulary before building any SQL, so out-of-vocabulary
//! requests are rejected with zero store access.

use crate::storage::{PsiBlockRow, SpecificityRow, SpecificityStore};
use crate::table::ResultTable;
use crate::vocab::ConfigVocabulary;
use crate::{GeneSelection, Result};

pub(crate) const SPECIFICITY_TABLE_COLUMNS: [&str; 8] = [
    "gene_name",
    "ensembl_id",
    "analysis_level",
    "analysis_type",
    "psi_mean",
    "psi_std",
    "zeta_mean",
    "zeta_std",
];

pub(crate) const PSI_BLOCK_TABLE_COLUMNS: [&str; 7] = [
    "gene_name",
    "ensembl_id",
    "analysis_level",
    "analysis_type",
    "block_label",
    "psi_block",
    "block_rank",
];

pub(crate) fn specificity_table(rows: Vec<SpecificityRow>) -> ResultTable {
    let mut table = ResultTable::new(SPECIFICITY_TABLE_COLUMNS);
    for row in rows {
        table.push_row(vec![
            row.gene_name.into(),
            row.ensembl_id.into(),
            row.analysis_level.into(),
            row.analysis_type.into(),
            row.psi_mean.into(),
            row.psi_std.into(),
            row.zeta_mean.into(),
            row.zeta_std.into(),
        ]);
    }
    table
}

pub(crate) fn psi_block_table(rows: Vec<PsiBlockRow>) -> ResultTable {
    let mut table = ResultTable::new(PSI_BLOCK_TABLE_COLUMNS);
    for row in rows {
        table.push_row(vec![
            row.gene_name.into(),
            row.ensembl_id.into(),
            row.analysis_level.into(),
            row.analysis_type.into(),
            row.block_label.into(),
            row.psi_block.into(),
            row.block_rank.into(),
        ]);
    }
    table
}

/// Engine for specificity and psi-block retrieval.
pub struct QueryEngine<'a> {
    store: &'a SpecificityStore,
    vocab: &'a ConfigVocabulary,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a SpecificityStore, vocab: &'a ConfigVocabulary) -> Self {
        Self { store, vocab }
    }

    /// Global Ψ/ζ rows for (level, type), restricted to `selection`
    /// unless it is `All`. Requested genes absent from the store are
    /// silently omitted; the caller can compare input size to row
    /// count. Rows sorted by gene_name.
    pub fn get_specificity(
        &self,
        selection: &GeneSelection,
        level: &str,
        analysis_type: &str,
    ) -> Result<ResultTable> {
        self.vocab.validate(level, analysis_type, None)?;
        let rows = self.store.specificity_rows(selection, level, analysis_type)?;
        Ok(specificity_table(rows))
    }

    /// Specificity rows for a gene selection across every (level, type)
    /// in the store. The partition survey behind the gene-centric
    /// dashboard and MCP views.
    pub fn get_specificity_profile(&self, selection: &GeneSelection) -> Result<ResultTable> {
        let rows = self.store.specificity_profile(selection)?;
        Ok(specificity_table(rows))
    }

    /// Per-block Ψ rows for (level, type): one row per (gene, block),
    /// or one row per gene when `block_label` is given. Sorted by
    /// gene_name then block_label.
    pub fn get_psi_block(
        &self,
        selection: &GeneSelection,
        level: &str,
        analysis_type: &str,
        block_label: Option<&str>,
    ) -> Result<ResultTable> {
        self.vocab.validate(level, analysis_type, block_label)?;
        let rows = self
            .store
            .psi_block_rows(selection, level, analysis_type, block_label)?;
        Ok(psi_block_table(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::storage::sqlite::test_fixtures::seeded_store;

    fn engine_fixture() -> (SpecificityStore, ConfigVocabulary) {
        let store = seeded_store();
        let vocab = ConfigVocabulary::discover(&store).unwrap();
        (store, vocab)
    }

    #[test]
    fn all_selection_returns_every_stored_row() {
        let (store, vocab) = engine_fixture();
        let engine = QueryEngine::new(&store, &vocab);
        let table = engine
            .get_specificity(&GeneSelection::All, "tissue", "global")
            .unwrap();
        // Gapdh, Alb, Cyp2e1 at tissue/global
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns()[0], "gene_name");
    }

    #[test]
    fn absent_gene_returns_zero_rows() {
        let (store, vocab) = engine_fixture();
        let engine = QueryEngine::new(&store, &vocab);
        let table = engine
            .get_specificity(&GeneSelection::from_ids(["NotAGene"]), "tissue", "global")
            .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn invalid_level_rejected_before_store_access() {
        let (store, vocab) = engine_fixture();
        // With the data tables gone, any store access would surface a
        // Storage error; an UnknownLevel proves we never queried.
        store.drop_tables().unwrap();
        let engine = QueryEngine::new(&store, &vocab);
        let err = engine
            .get_psi_block(&GeneSelection::All, "organism_wide", "global", None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownLevel(v) if v == "organism_wide"));
    }

    #[test]
    fn unknown_block_label_rejected() {
        let (store, vocab) = engine_fixture();
        let engine = QueryEngine::new(&store, &vocab);
        let err = engine
            .get_psi_block(&GeneSelection::All, "tissue", "global", Some("kidney"))
            .unwrap_err();
        assert_eq!(err.code(), "unknown_block_label");
    }

    #[test]
    fn psi_block_rows_sorted_by_gene_then_block() {
        let (store, vocab) = engine_fixture();
        let engine = QueryEngine::new(&store, &vocab);
        let table = engine
            .get_psi_block(&GeneSelection::All, "tissue", "global", None)
            .unwrap();
        let keys: Vec<(String, String)> = table
            .rows()
            .iter()
            .map(|r| {
                (
                    r[0].as_str().unwrap().to_string(),
                    r[4].as_str().unwrap().to_string(),
                )
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn per_block_queries_reproduce_the_unfiltered_set() {
        // Grouping the unfiltered (level, type) rows by block client-side
        // must equal the union of single-block queries.
        let (store, vocab) = engine_fixture();
        let engine = QueryEngine::new(&store, &vocab);

        let all = engine
            .get_psi_block(&GeneSelection::All, "tissue", "global", None)
            .unwrap();

        let mut rejoined: Vec<Vec<crate::Value>> = Vec::new();
        for block in vocab.blocks("tissue", "global") {
            let single = engine
                .get_psi_block(&GeneSelection::All, "tissue", "global", Some(block))
                .unwrap();
            assert!(
                single
                    .column_values("block_label")
                    .iter()
                    .all(|v| v.as_str() == Some(block))
            );
            rejoined.extend(single.rows().iter().cloned());
        }

        let sort_key = |r: &Vec<crate::Value>| {
            (
                r[0].as_str().unwrap().to_string(),
                r[4].as_str().unwrap().to_string(),
            )
        };
        let mut expected: Vec<_> = all.rows().to_vec();
        expected.sort_by_key(sort_key);
        rejoined.sort_by_key(sort_key);
        assert_eq!(rejoined, expected);
    }

    #[test]
    fn profile_spans_all_level_types_for_a_gene() {
        let (store, vocab) = engine_fixture();
        let engine = QueryEngine::new(&store, &vocab);
        let table = engine
            .get_specificity_profile(&GeneSelection::from_ids(["Alb"]))
            .unwrap();
        // Alb has rows at tissue/global and celltype/strain
        assert_eq!(table.len(), 2);
        let levels: Vec<_> = table
            .column_values("analysis_level")
            .into_iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(levels, vec!["celltype", "tissue"]);
    }
}
