//! SQLite storage implementation
//!
//! Both stores are opened read-only at request time; every reader gets
//! its own connection, so concurrent requests only rely on SQLite's
//! reader isolation. Insert helpers exist for fixtures and the upstream
//! loading pipeline and are never reachable over HTTP or MCP.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, params, params_from_iter};

use super::schema;
use crate::{Error, GeneSelection, Result};

/// One row of the global specificity table.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecificityRow {
    pub gene_name: String,
    pub ensembl_id: Option<String>,
    pub analysis_level: String,
    pub analysis_type: String,
    pub psi_mean: f64,
    pub psi_std: f64,
    pub zeta_mean: f64,
    pub zeta_std: f64,
}

/// One row of the per-block Ψ decomposition table.
#[derive(Debug, Clone, PartialEq)]
pub struct PsiBlockRow {
    pub gene_name: String,
    pub ensembl_id: Option<String>,
    pub analysis_level: String,
    pub analysis_type: String,
    pub block_label: String,
    pub psi_block: f64,
    pub block_rank: Option<i64>,
}

/// Join row produced by the marker query: global specificity plus the
/// block-local contribution for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRow {
    pub specificity: SpecificityRow,
    pub block_label: String,
    pub psi_block: f64,
}

/// One row of the expression summary table (second store).
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRow {
    pub gene_name: String,
    pub ensembl_id: Option<String>,
    pub condition: String,
    pub mean: f64,
    pub variance: f64,
}

/// Row counts reported by the `stats` command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub specificity_rows: usize,
    pub psi_block_rows: usize,
    pub expression_rows: usize,
}

const SPECIFICITY_COLUMNS: &str =
    "gene_name, ensembl_id, analysis_level, analysis_type, psi_mean, psi_std, zeta_mean, zeta_std";

const PSI_BLOCK_COLUMNS: &str =
    "gene_name, ensembl_id, analysis_level, analysis_type, block_label, psi_block, block_rank";

/// Append a gene-selection filter to a WHERE clause.
///
/// Identifiers match either `gene_name` or `ensembl_id`, mirroring the
/// upstream API which accepts both forms interchangeably.
fn gene_clause(selection: &GeneSelection, params: &mut Vec<SqlValue>) -> Option<String> {
    match selection {
        GeneSelection::All => None,
        GeneSelection::Ids(ids) => {
            let marks = vec!["?"; ids.len()].join(", ");
            for id in ids {
                params.push(SqlValue::Text(id.clone()));
            }
            for id in ids {
                params.push(SqlValue::Text(id.clone()));
            }
            Some(format!(
                "(gene_name IN ({marks}) OR ensembl_id IN ({marks}))"
            ))
        }
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(Error::StoreUnavailable(path.display().to_string()));
    }
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", path.display())))
}

/// SQLite-backed specificity store (global Ψ/ζ plus per-block Ψ).
#[derive(Debug)]
pub struct SpecificityStore {
    conn: Connection,
}

impl SpecificityStore {
    /// Open an existing store read-only. A missing file is
    /// `StoreUnavailable`, not an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_read_only(path)?,
        })
    }

    /// Open an in-memory store with the schema created (fixtures/tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        for stmt in schema::specificity_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self { conn })
    }

    /// Create or open a writable store on disk with the schema in place
    /// (used by the upstream loading pipeline, not by the service).
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        for stmt in schema::specificity_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self { conn })
    }

    // ========== Load helpers (fixtures / upstream pipeline) ==========

    pub fn insert_specificity(&self, row: &SpecificityRow) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO specificity
                (gene_name, ensembl_id, analysis_level, analysis_type, psi_mean, psi_std, zeta_mean, zeta_std)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                row.gene_name,
                row.ensembl_id,
                row.analysis_level,
                row.analysis_type,
                row.psi_mean,
                row.psi_std,
                row.zeta_mean,
                row.zeta_std,
            ],
        )?;
        Ok(())
    }

    pub fn insert_psi_block(&self, row: &PsiBlockRow) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO psi_block
                (gene_name, ensembl_id, analysis_level, analysis_type, block_label, psi_block, block_rank)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                row.gene_name,
                row.ensembl_id,
                row.analysis_level,
                row.analysis_type,
                row.block_label,
                row.psi_block,
                row.block_rank,
            ],
        )?;
        Ok(())
    }

    /// Drop the data tables. Test hook for proving that validation
    /// rejects bad requests before any store access happens.
    #[cfg(test)]
    pub fn drop_tables(&self) -> Result<()> {
        self.conn.execute("DROP TABLE specificity", [])?;
        self.conn.execute("DROP TABLE psi_block", [])?;
        Ok(())
    }

    // ========== Vocabulary discovery ==========

    /// Distinct (analysis_level, analysis_type) pairs present in either
    /// relation.
    pub fn level_types(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT analysis_level, analysis_type FROM specificity
             UNION
             SELECT DISTINCT analysis_level, analysis_type FROM psi_block
             ORDER BY 1, 2",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Distinct block labels defined for one (level, type).
    pub fn block_labels(&self, level: &str, analysis_type: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT block_label FROM psi_block
             WHERE analysis_level = ?1 AND analysis_type = ?2
             ORDER BY block_label",
        )?;
        let labels = stmt
            .query_map([level, analysis_type], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }

    // ========== Specificity queries ==========

    /// Specificity rows for one (level, type), optionally restricted to
    /// a gene selection. Sorted by gene_name for determinism.
    pub fn specificity_rows(
        &self,
        selection: &GeneSelection,
        level: &str,
        analysis_type: &str,
    ) -> Result<Vec<SpecificityRow>> {
        let mut sql_params: Vec<SqlValue> = vec![
            SqlValue::Text(level.to_string()),
            SqlValue::Text(analysis_type.to_string()),
        ];
        let mut sql = format!(
            "SELECT {SPECIFICITY_COLUMNS} FROM specificity
             WHERE analysis_level = ? AND analysis_type = ?"
        );
        if let Some(clause) = gene_clause(selection, &mut sql_params) {
            sql.push_str(" AND ");
            sql.push_str(&clause);
        }
        sql.push_str(" ORDER BY gene_name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(sql_params), row_to_specificity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Specificity rows for a gene selection across every (level, type)
    /// pair. Sorted by gene_name, level, type.
    pub fn specificity_profile(&self, selection: &GeneSelection) -> Result<Vec<SpecificityRow>> {
        let mut sql_params: Vec<SqlValue> = Vec::new();
        let mut sql = format!("SELECT {SPECIFICITY_COLUMNS} FROM specificity");
        if let Some(clause) = gene_clause(selection, &mut sql_params) {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        sql.push_str(" ORDER BY gene_name, analysis_level, analysis_type");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(sql_params), row_to_specificity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Genes whose global Ψ for (level, type) is below `threshold`:
    /// the housekeeping set. Sorted ascending by Ψ, ζ as the secondary
    /// rank, gene_name last for determinism.
    pub fn global_psi_below(
        &self,
        level: &str,
        analysis_type: &str,
        threshold: f64,
    ) -> Result<Vec<SpecificityRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SPECIFICITY_COLUMNS} FROM specificity
             WHERE analysis_level = ?1 AND analysis_type = ?2 AND psi_mean < ?3
             ORDER BY psi_mean ASC, zeta_mean ASC, gene_name ASC"
        ))?;
        let rows = stmt
            .query_map(params![level, analysis_type, threshold], row_to_specificity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========== Psi-block queries ==========

    /// Per-block rows for one (level, type); one row per (gene, block),
    /// or per gene when `block_label` narrows to a single block.
    /// Sorted by gene_name then block_label.
    pub fn psi_block_rows(
        &self,
        selection: &GeneSelection,
        level: &str,
        analysis_type: &str,
        block_label: Option<&str>,
    ) -> Result<Vec<PsiBlockRow>> {
        let mut sql_params: Vec<SqlValue> = vec![
            SqlValue::Text(level.to_string()),
            SqlValue::Text(analysis_type.to_string()),
        ];
        let mut sql = format!(
            "SELECT {PSI_BLOCK_COLUMNS} FROM psi_block
             WHERE analysis_level = ? AND analysis_type = ?"
        );
        if let Some(block) = block_label {
            sql.push_str(" AND block_label = ?");
            sql_params.push(SqlValue::Text(block.to_string()));
        }
        if let Some(clause) = gene_clause(selection, &mut sql_params) {
            sql.push_str(" AND ");
            sql.push_str(&clause);
        }
        sql.push_str(" ORDER BY gene_name, block_label");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(sql_params), row_to_psi_block)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Genes whose block-local Ψ for one block exceeds `threshold`.
    /// Sorted by contribution descending, ties broken by gene_name
    /// ascending.
    pub fn blocks_above(
        &self,
        level: &str,
        analysis_type: &str,
        block_label: &str,
        threshold: f64,
    ) -> Result<Vec<PsiBlockRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PSI_BLOCK_COLUMNS} FROM psi_block
             WHERE analysis_level = ?1 AND analysis_type = ?2
               AND block_label = ?3 AND psi_block > ?4
             ORDER BY psi_block DESC, gene_name ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![level, analysis_type, block_label, threshold],
                row_to_psi_block,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Marker join: block-local Ψ above `block_threshold` AND global Ψ
    /// above `global_threshold` for the same (gene, level, type).
    /// The two relations share the (gene, level, type) key space, so
    /// this is an inner join inside one store. Same ordering as
    /// `blocks_above` so the marker set stays a prefix-compatible
    /// subset of the highly-specific set.
    pub fn marker_rows(
        &self,
        level: &str,
        analysis_type: &str,
        block_label: &str,
        block_threshold: f64,
        global_threshold: f64,
    ) -> Result<Vec<MarkerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.gene_name, s.ensembl_id, s.analysis_level, s.analysis_type,
                    s.psi_mean, s.psi_std, s.zeta_mean, s.zeta_std,
                    b.block_label, b.psi_block
             FROM specificity s
             INNER JOIN psi_block b
                ON b.gene_name = s.gene_name
               AND b.analysis_level = s.analysis_level
               AND b.analysis_type = s.analysis_type
             WHERE s.analysis_level = ?1 AND s.analysis_type = ?2
               AND b.block_label = ?3
               AND b.psi_block > ?4
               AND s.psi_mean > ?5
             ORDER BY b.psi_block DESC, s.gene_name ASC",
        )?;
        let rows = stmt
            .query_map(
                params![
                    level,
                    analysis_type,
                    block_label,
                    block_threshold,
                    global_threshold
                ],
                |row| {
                    Ok(MarkerRow {
                        specificity: row_to_specificity(row)?,
                        block_label: row.get(8)?,
                        psi_block: row.get(9)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========== Stats ==========

    pub fn count_specificity(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM specificity", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_psi_block(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM psi_block", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// SQLite-backed expression summary store.
///
/// Keyed independently from the specificity store; joined to gene
/// identifiers only by string equality, with no referential guarantee.
#[derive(Debug)]
pub struct ExpressionStore {
    conn: Connection,
}

impl ExpressionStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_read_only(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        for stmt in schema::expression_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self { conn })
    }

    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        for stmt in schema::expression_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self { conn })
    }

    pub fn insert_expression(&self, row: &ExpressionRow) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO expression_summary
                (gene_name, ensembl_id, condition, mean, variance)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                row.gene_name,
                row.ensembl_id,
                row.condition,
                row.mean,
                row.variance,
            ],
        )?;
        Ok(())
    }

    /// Expression rows for a gene selection, optionally restricted to a
    /// condition set (empty slice means all conditions). Genes with no
    /// rows here simply contribute nothing; the caller distinguishes
    /// "no expression data" from "no such gene".
    pub fn expression_rows(
        &self,
        selection: &GeneSelection,
        conditions: &[String],
    ) -> Result<Vec<ExpressionRow>> {
        let mut sql_params: Vec<SqlValue> = Vec::new();
        let mut clauses: Vec<String> = Vec::new();

        if let Some(clause) = gene_clause(selection, &mut sql_params) {
            clauses.push(clause);
        }
        if !conditions.is_empty() {
            let marks = vec!["?"; conditions.len()].join(", ");
            clauses.push(format!("condition IN ({marks})"));
            for c in conditions {
                sql_params.push(SqlValue::Text(c.clone()));
            }
        }

        let mut sql = String::from(
            "SELECT gene_name, ensembl_id, condition, mean, variance FROM expression_summary",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY gene_name, condition");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(sql_params), |row| {
                Ok(ExpressionRow {
                    gene_name: row.get(0)?,
                    ensembl_id: row.get(1)?,
                    condition: row.get(2)?,
                    mean: row.get(3)?,
                    variance: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_expression(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM expression_summary", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }
}

fn row_to_specificity(row: &rusqlite::Row) -> rusqlite::Result<SpecificityRow> {
    Ok(SpecificityRow {
        gene_name: row.get(0)?,
        ensembl_id: row.get(1)?,
        analysis_level: row.get(2)?,
        analysis_type: row.get(3)?,
        psi_mean: row.get(4)?,
        psi_std: row.get(5)?,
        zeta_mean: row.get(6)?,
        zeta_std: row.get(7)?,
    })
}

fn row_to_psi_block(row: &rusqlite::Row) -> rusqlite::Result<PsiBlockRow> {
    Ok(PsiBlockRow {
        gene_name: row.get(0)?,
        ensembl_id: row.get(1)?,
        analysis_level: row.get(2)?,
        analysis_type: row.get(3)?,
        block_label: row.get(4)?,
        psi_block: row.get(5)?,
        block_rank: row.get(6)?,
    })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub fn specificity_row(
        gene: &str,
        level: &str,
        analysis_type: &str,
        psi: f64,
        zeta: f64,
    ) -> SpecificityRow {
        SpecificityRow {
            gene_name: gene.to_string(),
            ensembl_id: Some(format!("ENSMUSG_{gene}")),
            analysis_level: level.to_string(),
            analysis_type: analysis_type.to_string(),
            psi_mean: psi,
            psi_std: 0.01,
            zeta_mean: zeta,
            zeta_std: 0.01,
        }
    }

    pub fn psi_block_row(
        gene: &str,
        level: &str,
        analysis_type: &str,
        block: &str,
        psi_block: f64,
    ) -> PsiBlockRow {
        PsiBlockRow {
            gene_name: gene.to_string(),
            ensembl_id: Some(format!("ENSMUSG_{gene}")),
            analysis_level: level.to_string(),
            analysis_type: analysis_type.to_string(),
            block_label: block.to_string(),
            psi_block,
            block_rank: None,
        }
    }

    /// The scenario from the concrete acceptance cases: tissue/global
    /// with liver and heart blocks, Gapdh broadly expressed, Alb a
    /// liver marker.
    pub fn seeded_store() -> SpecificityStore {
        let store = SpecificityStore::open_in_memory().unwrap();
        store
            .insert_specificity(&specificity_row("Gapdh", "tissue", "global", 0.05, 0.1))
            .unwrap();
        store
            .insert_specificity(&specificity_row("Alb", "tissue", "global", 0.9, 0.8))
            .unwrap();
        store
            .insert_specificity(&specificity_row("Cyp2e1", "tissue", "global", 0.6, 0.7))
            .unwrap();
        store
            .insert_specificity(&specificity_row("Alb", "celltype", "strain", 0.4, 0.3))
            .unwrap();
        for (gene, liver, heart) in [
            ("Gapdh", 0.04, 0.03),
            ("Alb", 0.85, 0.02),
            ("Cyp2e1", 0.7, 0.1),
        ] {
            store
                .insert_psi_block(&psi_block_row(gene, "tissue", "global", "liver", liver))
                .unwrap();
            store
                .insert_psi_block(&psi_block_row(gene, "tissue", "global", "heart", heart))
                .unwrap();
        }
        store
            .insert_psi_block(&psi_block_row(
                "Alb",
                "celltype",
                "strain",
                "C57BL_6J",
                0.5,
            ))
            .unwrap();
        store
    }

    pub fn seeded_expression_store() -> ExpressionStore {
        let store = ExpressionStore::open_in_memory().unwrap();
        for (gene, condition, mean, variance) in [
            ("Alb", "liver", 2500.0, 310.0),
            ("Alb", "heart", 12.0, 4.0),
            ("Gapdh", "liver", 800.0, 95.0),
            ("Gapdh", "heart", 760.0, 88.0),
        ] {
            store
                .insert_expression(&ExpressionRow {
                    gene_name: gene.to_string(),
                    ensembl_id: Some(format!("ENSMUSG_{gene}")),
                    condition: condition.to_string(),
                    mean,
                    variance,
                })
                .unwrap();
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    #[test]
    fn missing_store_file_is_store_unavailable() {
        let err = SpecificityStore::open(Path::new("/nonexistent/8cube.db")).unwrap_err();
        assert_eq!(err.code(), "store_unavailable");
    }

    #[test]
    fn open_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("8cube.db");
        {
            let store = SpecificityStore::create(&path).unwrap();
            store
                .insert_specificity(&specificity_row("Alb", "tissue", "global", 0.9, 0.8))
                .unwrap();
        }
        let store = SpecificityStore::open(&path).unwrap();
        assert_eq!(store.count_specificity().unwrap(), 1);
        let err = store
            .insert_specificity(&specificity_row("Gapdh", "tissue", "global", 0.1, 0.1))
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn level_types_union_both_relations() {
        let store = seeded_store();
        let pairs = store.level_types().unwrap();
        assert_eq!(
            pairs,
            vec![
                ("celltype".to_string(), "strain".to_string()),
                ("tissue".to_string(), "global".to_string()),
            ]
        );
    }

    #[test]
    fn block_labels_are_level_type_specific() {
        let store = seeded_store();
        assert_eq!(
            store.block_labels("tissue", "global").unwrap(),
            vec!["heart", "liver"]
        );
        assert_eq!(
            store.block_labels("celltype", "strain").unwrap(),
            vec!["C57BL_6J"]
        );
    }

    #[test]
    fn selection_matches_gene_name_or_ensembl_id() {
        let store = seeded_store();
        let by_name = store
            .specificity_rows(&GeneSelection::from_ids(["Alb"]), "tissue", "global")
            .unwrap();
        let by_ensembl = store
            .specificity_rows(
                &GeneSelection::from_ids(["ENSMUSG_Alb"]),
                "tissue",
                "global",
            )
            .unwrap();
        assert_eq!(by_name, by_ensembl);
        assert_eq!(by_name.len(), 1);
    }

    #[test]
    fn absent_gene_yields_zero_rows_not_error() {
        let store = seeded_store();
        let rows = store
            .specificity_rows(&GeneSelection::from_ids(["Nope1"]), "tissue", "global")
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn specificity_rows_sorted_by_gene() {
        let store = seeded_store();
        let rows = store
            .specificity_rows(&GeneSelection::All, "tissue", "global")
            .unwrap();
        let genes: Vec<_> = rows.iter().map(|r| r.gene_name.as_str()).collect();
        assert_eq!(genes, vec!["Alb", "Cyp2e1", "Gapdh"]);
    }

    #[test]
    fn psi_block_filter_narrows_to_one_row_per_gene() {
        let store = seeded_store();
        let all = store
            .psi_block_rows(&GeneSelection::All, "tissue", "global", None)
            .unwrap();
        assert_eq!(all.len(), 6);
        let liver = store
            .psi_block_rows(&GeneSelection::All, "tissue", "global", Some("liver"))
            .unwrap();
        assert_eq!(liver.len(), 3);
        assert!(liver.iter().all(|r| r.block_label == "liver"));
    }

    #[test]
    fn blocks_above_sorted_by_contribution_then_gene() {
        let store = seeded_store();
        let rows = store.blocks_above("tissue", "global", "liver", 0.3).unwrap();
        let genes: Vec<_> = rows.iter().map(|r| r.gene_name.as_str()).collect();
        assert_eq!(genes, vec!["Alb", "Cyp2e1"]);
        assert!(rows[0].psi_block > rows[1].psi_block);
    }

    #[test]
    fn marker_join_requires_both_thresholds() {
        let store = seeded_store();
        // Cyp2e1 passes the block test at 0.5 but not the global test at 0.8
        let rows = store.marker_rows("tissue", "global", "liver", 0.5, 0.8).unwrap();
        let genes: Vec<_> = rows.iter().map(|r| r.specificity.gene_name.as_str()).collect();
        assert_eq!(genes, vec!["Alb"]);
        assert_eq!(rows[0].block_label, "liver");
    }

    #[test]
    fn corrupt_cell_is_an_error_not_partial_rows() {
        // SQLite's dynamic typing lets a TEXT value sit in the REAL
        // psi_mean column; the conversion failure must surface instead
        // of the row quietly vanishing from an otherwise-Ok result.
        let store = seeded_store();
        store
            .conn
            .execute(
                "INSERT INTO specificity
                     (gene_name, ensembl_id, analysis_level, analysis_type,
                      psi_mean, psi_std, zeta_mean, zeta_std)
                 VALUES ('Bad1', NULL, 'tissue', 'global', 'oops', 0.0, 0.1, 0.0)",
                [],
            )
            .unwrap();
        let err = store
            .specificity_rows(&GeneSelection::All, "tissue", "global")
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn expression_rows_filter_by_gene_and_condition() {
        let store = seeded_expression_store();
        let all = store
            .expression_rows(&GeneSelection::All, &[])
            .unwrap();
        assert_eq!(all.len(), 4);

        let alb_liver = store
            .expression_rows(&GeneSelection::from_ids(["Alb"]), &["liver".to_string()])
            .unwrap();
        assert_eq!(alb_liver.len(), 1);
        assert_eq!(alb_liver[0].mean, 2500.0);
    }
}
