//! Classification engine: highly-specific, housekeeping and marker sets
//!
//! Partitions the gene universe for one (level, type[, block]) under a
//! fixed numeric policy:
//! - `highly_specific`: block-local Ψ above a cutoff for one block
//! - `non_specific`: global Ψ below a cutoff (housekeeping - expression
//!   spread evenly rather than concentrated)
//! - `marker`: both tests at once, with independently configurable
//!   cutoffs. Block specificity alone does not make a marker; the gene
//!   must also be specific overall, so marker results are always a
//!   subset of the highly-specific set for the same block cutoff.

use crate::query::engine::{psi_block_table, specificity_table};
use crate::storage::SpecificityStore;
use crate::table::ResultTable;
use crate::vocab::ConfigVocabulary;
use crate::{Error, Result};

pub(crate) const MARKER_TABLE_COLUMNS: [&str; 10] = [
    "gene_name",
    "ensembl_id",
    "analysis_level",
    "analysis_type",
    "psi_mean",
    "psi_std",
    "zeta_mean",
    "zeta_std",
    "block_label",
    "psi_block",
];

/// Reject Ψ thresholds outside the metric's [0, 1] domain. Never
/// clamps.
fn check_threshold(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(Error::InvalidThreshold { name, value });
    }
    Ok(())
}

/// Engine for threshold-based gene classification.
pub struct ClassificationEngine<'a> {
    store: &'a SpecificityStore,
    vocab: &'a ConfigVocabulary,
}

impl<'a> ClassificationEngine<'a> {
    pub fn new(store: &'a SpecificityStore, vocab: &'a ConfigVocabulary) -> Self {
        Self { store, vocab }
    }

    /// Genes whose block-local Ψ for `block_label` exceeds `threshold`,
    /// sorted by contribution descending with ties broken by gene_name
    /// ascending. `top_k` truncates after sorting.
    pub fn highly_specific(
        &self,
        level: &str,
        analysis_type: &str,
        block_label: &str,
        threshold: f64,
        top_k: Option<usize>,
    ) -> Result<ResultTable> {
        self.vocab.validate(level, analysis_type, Some(block_label))?;
        check_threshold("block psi", threshold)?;
        let rows = self
            .store
            .blocks_above(level, analysis_type, block_label, threshold)?;
        let mut table = psi_block_table(rows);
        if let Some(k) = top_k {
            table.truncate(k);
        }
        Ok(table)
    }

    /// Housekeeping genes: global Ψ for (level, type) below `threshold`.
    /// Low global Ψ means expression is spread evenly across blocks.
    pub fn non_specific(
        &self,
        level: &str,
        analysis_type: &str,
        threshold: f64,
    ) -> Result<ResultTable> {
        self.vocab.validate(level, analysis_type, None)?;
        check_threshold("global psi", threshold)?;
        let rows = self.store.global_psi_below(level, analysis_type, threshold)?;
        Ok(specificity_table(rows))
    }

    /// Marker genes for one block: block-local Ψ above
    /// `block_threshold` AND global Ψ above `global_threshold`.
    pub fn marker(
        &self,
        level: &str,
        analysis_type: &str,
        block_label: &str,
        block_threshold: f64,
        global_threshold: f64,
    ) -> Result<ResultTable> {
        self.vocab.validate(level, analysis_type, Some(block_label))?;
        check_threshold("block psi", block_threshold)?;
        check_threshold("global psi", global_threshold)?;
        let rows = self.store.marker_rows(
            level,
            analysis_type,
            block_label,
            block_threshold,
            global_threshold,
        )?;
        let mut table = ResultTable::new(MARKER_TABLE_COLUMNS);
        for row in rows {
            let s = row.specificity;
            table.push_row(vec![
                s.gene_name.into(),
                s.ensembl_id.into(),
                s.analysis_level.into(),
                s.analysis_type.into(),
                s.psi_mean.into(),
                s.psi_std.into(),
                s.zeta_mean.into(),
                s.zeta_std.into(),
                row.block_label.into(),
                row.psi_block.into(),
            ]);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::storage::sqlite::test_fixtures::seeded_store;

    fn fixture() -> (SpecificityStore, ConfigVocabulary) {
        let store = seeded_store();
        let vocab = ConfigVocabulary::discover(&store).unwrap();
        (store, vocab)
    }

    fn gene_set(table: &ResultTable) -> BTreeSet<String> {
        table
            .column_values("gene_name")
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn gapdh_is_housekeeping_not_liver_specific() {
        // Gapdh: global Ψ 0.05, liver block Ψ 0.04
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);

        let housekeeping = engine.non_specific("tissue", "global", 0.1).unwrap();
        assert!(gene_set(&housekeeping).contains("Gapdh"));

        let specific = engine
            .highly_specific("tissue", "global", "liver", 0.3, None)
            .unwrap();
        assert!(!gene_set(&specific).contains("Gapdh"));
    }

    #[test]
    fn alb_is_both_highly_specific_and_marker() {
        // Alb: global Ψ 0.9, liver block Ψ 0.85
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);

        let specific = engine
            .highly_specific("tissue", "global", "liver", 0.5, None)
            .unwrap();
        let markers = engine
            .marker("tissue", "global", "liver", 0.5, 0.5)
            .unwrap();
        assert!(gene_set(&specific).contains("Alb"));
        assert!(gene_set(&markers).contains("Alb"));
    }

    #[test]
    fn marker_set_is_subset_of_highly_specific_set() {
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);
        for t_block in [0.0, 0.3, 0.5, 0.8] {
            for t_global in [0.0, 0.5, 0.95] {
                let specific = engine
                    .highly_specific("tissue", "global", "liver", t_block, None)
                    .unwrap();
                let markers = engine
                    .marker("tissue", "global", "liver", t_block, t_global)
                    .unwrap();
                assert!(
                    gene_set(&markers).is_subset(&gene_set(&specific)),
                    "markers must be a subset at t_block={t_block} t_global={t_global}"
                );
            }
        }
    }

    #[test]
    fn thresholds_are_independent() {
        // Cyp2e1: liver block Ψ 0.7, global Ψ 0.6. Raising only the
        // global cutoff must drop it from markers while it stays
        // highly specific.
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);

        let specific = engine
            .highly_specific("tissue", "global", "liver", 0.5, None)
            .unwrap();
        assert!(gene_set(&specific).contains("Cyp2e1"));

        let markers = engine
            .marker("tissue", "global", "liver", 0.5, 0.8)
            .unwrap();
        assert_eq!(gene_set(&markers), BTreeSet::from(["Alb".to_string()]));
    }

    #[test]
    fn housekeeping_and_block_specific_sets_are_disjoint() {
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);
        let housekeeping = engine.non_specific("tissue", "global", 0.1).unwrap();
        let specific = engine
            .highly_specific("tissue", "global", "liver", 0.5, None)
            .unwrap();
        assert!(gene_set(&housekeeping).is_disjoint(&gene_set(&specific)));
    }

    #[test]
    fn top_k_truncates_after_descending_sort() {
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);
        let table = engine
            .highly_specific("tissue", "global", "liver", 0.0, Some(1))
            .unwrap();
        assert_eq!(table.len(), 1);
        // Alb has the largest liver contribution (0.85)
        assert_eq!(table.rows()[0][0].as_str(), Some("Alb"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected_not_clamped() {
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);
        for bad in [-0.1, 1.5, f64::NAN] {
            let err = engine.non_specific("tissue", "global", bad).unwrap_err();
            assert!(matches!(err, Error::InvalidThreshold { .. }), "{bad}");
        }
        let err = engine
            .marker("tissue", "global", "liver", 0.5, 1.01)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_threshold");
    }

    #[test]
    fn vocabulary_errors_take_precedence_over_store_state() {
        let (store, vocab) = fixture();
        store.drop_tables().unwrap();
        let engine = ClassificationEngine::new(&store, &vocab);
        let err = engine
            .highly_specific("tissue", "global", "kidney", 0.5, None)
            .unwrap_err();
        assert_eq!(err.code(), "unknown_block_label");
    }

    #[test]
    fn empty_classification_result_is_a_table_not_an_error() {
        let (store, vocab) = fixture();
        let engine = ClassificationEngine::new(&store, &vocab);
        let table = engine
            .marker("tissue", "global", "heart", 0.9, 0.9)
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), MARKER_TABLE_COLUMNS.len());
    }
}
