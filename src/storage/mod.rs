//! Storage Layer - two read-only SQLite stores
//!
//! Specificity store (`8cube.db`):
//! - specificity(gene_name, ensembl_id, analysis_level, analysis_type,
//!   psi_mean, psi_std, zeta_mean, zeta_std)
//! - psi_block(gene_name, ensembl_id, analysis_level, analysis_type,
//!   block_label, psi_block, block_rank)
//!
//! Expression store (`expression.db`):
//! - expression_summary(gene_name, ensembl_id, condition, mean, variance)
//!
//! The stores are populated upstream by the analysis pipeline; at
//! request time they are opened read-only and the key columns above are
//! a fixed contract.

pub mod schema;
pub mod sqlite;

pub use sqlite::{
    DbStats, ExpressionRow, ExpressionStore, MarkerRow, PsiBlockRow, SpecificityRow,
    SpecificityStore,
};
