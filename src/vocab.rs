//! Schema/config resolver
//!
//! `ConfigVocabulary` is the process-lifetime vocabulary of analysis
//! levels, analysis types per level, and block labels per (level, type),
//! discovered once from the specificity store at startup. It is an
//! immutable value injected into every engine, so engines can be
//! constructed with a synthetic vocabulary in tests without touching a
//! real store. Every query operation validates against it before any
//! store access.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::storage::SpecificityStore;
use crate::{Error, Result};

/// level -> analysis type -> block labels, all orderings stable.
/// Serializes as the bare nested map, the `analysis_config` shape the
/// dashboard consumes.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ConfigVocabulary {
    levels: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl ConfigVocabulary {
    /// Discover the vocabulary from the store. Called once at startup;
    /// the result is shared read-only for the process lifetime.
    pub fn discover(store: &SpecificityStore) -> Result<Self> {
        let mut levels: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
        for (level, analysis_type) in store.level_types()? {
            let blocks: BTreeSet<String> = store
                .block_labels(&level, &analysis_type)?
                .into_iter()
                .collect();
            levels
                .entry(level)
                .or_default()
                .insert(analysis_type, blocks);
        }
        Ok(Self { levels })
    }

    /// Build a vocabulary directly, for tests and synthetic setups.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S, Vec<S>)>,
        S: Into<String>,
    {
        let mut levels: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
        for (level, analysis_type, blocks) in entries {
            levels
                .entry(level.into())
                .or_default()
                .insert(
                    analysis_type.into(),
                    blocks.into_iter().map(Into::into).collect(),
                );
        }
        Self { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// All analysis levels, sorted.
    pub fn levels(&self) -> Vec<&str> {
        self.levels.keys().map(String::as_str).collect()
    }

    /// Analysis types valid for one level, sorted.
    pub fn types(&self, level: &str) -> Vec<&str> {
        self.levels
            .get(level)
            .map(|types| types.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Block labels valid for one (level, type), sorted.
    pub fn blocks(&self, level: &str, analysis_type: &str) -> Vec<&str> {
        self.levels
            .get(level)
            .and_then(|types| types.get(analysis_type))
            .map(|blocks| blocks.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Validate a (level, type[, block]) triple against the vocabulary.
    ///
    /// Pure check, no store access. Fails with the specific error kind
    /// for the first out-of-vocabulary value, echoing it verbatim.
    pub fn validate(
        &self,
        level: &str,
        analysis_type: &str,
        block_label: Option<&str>,
    ) -> Result<()> {
        let types = self
            .levels
            .get(level)
            .ok_or_else(|| Error::UnknownLevel(level.to_string()))?;
        let blocks = types.get(analysis_type).ok_or_else(|| Error::UnknownType {
            level: level.to_string(),
            analysis_type: analysis_type.to_string(),
        })?;
        if let Some(block) = block_label {
            if !blocks.contains(block) {
                return Err(Error::UnknownBlockLabel {
                    level: level.to_string(),
                    analysis_type: analysis_type.to_string(),
                    block_label: block.to_string(),
                });
            }
        }
        Ok(())
    }
}
