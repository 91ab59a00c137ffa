//! # cubedb - 8cube founder-mouse gene specificity explorer
//!
//! Query layer over the Rebboah et al. (2025) 8cube founder dataset:
//! per-gene specificity (Ψ) and selectivity (ζ) measurements across
//! tissues, cell types, sexes and the eight founder mouse strains.
//!
//! cubedb provides:
//! - Vocabulary discovery for analysis levels, types and block labels
//! - Specificity and per-block Ψ decomposition queries
//! - Marker / housekeeping / block-specific gene classification
//! - Expression mean/variance summaries from a second store
//! - HTTP API (axum) and MCP stdio server over the same operations

pub mod config;
pub mod query;
pub mod server;
pub mod storage;
pub mod table;
pub mod ui;
pub mod vocab;

// Re-exports for convenient access
pub use config::Thresholds;
pub use query::{ClassificationEngine, ExpressionEngine, QueryEngine};
pub use storage::{ExpressionStore, SpecificityStore};
pub use table::{ResultTable, Value};
pub use vocab::ConfigVocabulary;

/// Result type alias for cubedb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cubedb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown analysis level: {0}")]
    UnknownLevel(String),

    #[error("unknown analysis type for level {level}: {analysis_type}")]
    UnknownType { level: String, analysis_type: String },

    #[error("unknown block label for {level}/{analysis_type}: {block_label}")]
    UnknownBlockLabel {
        level: String,
        analysis_type: String,
        block_label: String,
    },

    #[error("invalid {name} threshold {value}: must be within [0, 1]")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for each error kind, used by the
    /// HTTP layer so callers can branch without parsing messages.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnknownLevel(_) => "unknown_level",
            Error::UnknownType { .. } => "unknown_type",
            Error::UnknownBlockLabel { .. } => "unknown_block_label",
            Error::InvalidThreshold { .. } => "invalid_threshold",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Storage(_) => "storage_error",
            Error::Io(_) => "io_error",
        }
    }

    /// True for errors caused by the caller's request rather than the
    /// stores. These are rejected before any store access happens.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownLevel(_)
                | Error::UnknownType { .. }
                | Error::UnknownBlockLabel { .. }
                | Error::InvalidThreshold { .. }
        )
    }
}

/// Gene selection for query operations.
///
/// `All` means "every gene in the store"; `Ids` matches rows whose
/// `gene_name` or `ensembl_id` is in the set. Requested genes absent
/// from a store are silently omitted from results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneSelection {
    All,
    Ids(std::collections::BTreeSet<String>),
}

impl GeneSelection {
    /// Build a selection from an iterator of identifiers. An empty
    /// iterator collapses to `All`, matching the query contract.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: std::collections::BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        if set.is_empty() {
            GeneSelection::All
        } else {
            GeneSelection::Ids(set)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, GeneSelection::All)
    }

    /// Number of distinct requested identifiers (0 for `All`).
    pub fn len(&self) -> usize {
        match self {
            GeneSelection::All => 0,
            GeneSelection::Ids(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_list_collapses_to_all() {
        let sel = GeneSelection::from_ids(Vec::<String>::new());
        assert!(sel.is_all());
    }

    #[test]
    fn error_codes_are_distinct_per_kind() {
        let errors = vec![
            Error::UnknownLevel("x".into()),
            Error::UnknownType {
                level: "x".into(),
                analysis_type: "y".into(),
            },
            Error::UnknownBlockLabel {
                level: "x".into(),
                analysis_type: "y".into(),
                block_label: "z".into(),
            },
            Error::InvalidThreshold {
                name: "psi",
                value: 1.5,
            },
            Error::StoreUnavailable("gone.db".into()),
        ];
        let codes: std::collections::BTreeSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn vocabulary_errors_echo_the_offending_value() {
        let err = Error::UnknownLevel("organism_wide".into());
        assert!(err.to_string().contains("organism_wide"));
        assert!(err.is_request_error());
    }
}
