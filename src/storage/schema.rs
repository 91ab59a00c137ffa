//! Database schema definitions
//!
//! The schema is created upstream by the analysis pipeline; these
//! statements exist so tests and local fixtures can build identical
//! stores, and to document the key-column contract the engines rely on.

/// SQL to create the global specificity table (one row per gene per
/// analysis level/type)
pub const CREATE_SPECIFICITY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS specificity (
    gene_name TEXT NOT NULL,
    ensembl_id TEXT,
    analysis_level TEXT NOT NULL,
    analysis_type TEXT NOT NULL,
    psi_mean REAL NOT NULL,
    psi_std REAL NOT NULL DEFAULT 0.0,
    zeta_mean REAL NOT NULL,
    zeta_std REAL NOT NULL DEFAULT 0.0,
    PRIMARY KEY (gene_name, analysis_level, analysis_type)
)
"#;

/// SQL to create the per-block Ψ decomposition table (one row per gene
/// per block; block labels are level/type specific)
pub const CREATE_PSI_BLOCK_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS psi_block (
    gene_name TEXT NOT NULL,
    ensembl_id TEXT,
    analysis_level TEXT NOT NULL,
    analysis_type TEXT NOT NULL,
    block_label TEXT NOT NULL,
    psi_block REAL NOT NULL,
    block_rank INTEGER,
    PRIMARY KEY (gene_name, analysis_level, analysis_type, block_label)
)
"#;

/// SQL to create the expression summary table (second store; keyed
/// independently, joined to the specificity store by gene name only)
pub const CREATE_EXPRESSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS expression_summary (
    gene_name TEXT NOT NULL,
    ensembl_id TEXT,
    condition TEXT NOT NULL,
    mean REAL NOT NULL,
    variance REAL NOT NULL,
    PRIMARY KEY (gene_name, condition)
)
"#;

/// Indexes for the specificity store
pub const SPECIFICITY_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_specificity_level_type ON specificity(analysis_level, analysis_type)",
    "CREATE INDEX IF NOT EXISTS idx_specificity_ensembl ON specificity(ensembl_id)",
    "CREATE INDEX IF NOT EXISTS idx_psi_block_level_type ON psi_block(analysis_level, analysis_type, block_label)",
    "CREATE INDEX IF NOT EXISTS idx_psi_block_ensembl ON psi_block(ensembl_id)",
];

/// Indexes for the expression store
pub const EXPRESSION_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_expression_condition ON expression_summary(condition)",
    "CREATE INDEX IF NOT EXISTS idx_expression_ensembl ON expression_summary(ensembl_id)",
];

/// All statements for the specificity store
pub fn specificity_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_SPECIFICITY_TABLE, CREATE_PSI_BLOCK_TABLE];
    stmts.extend(SPECIFICITY_INDEXES.iter().copied());
    stmts
}

/// All statements for the expression store
pub fn expression_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_EXPRESSION_TABLE];
    stmts.extend(EXPRESSION_INDEXES.iter().copied());
    stmts
}
