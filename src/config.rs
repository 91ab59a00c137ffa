//! Process configuration: store paths and classification thresholds.
//!
//! Loaded from `cubedb.toml` when present; every field falls back to a
//! documented default. Thresholds are the defaults published with the
//! upstream 8cube analysis, not values this crate derives.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default block-local Ψ cutoff for `highly_specific` and the block
/// half of `marker` (upstream default: 0.7).
pub const DEFAULT_BLOCK_PSI_CUTOFF: f64 = 0.7;

/// Default global Ψ cutoff for the global half of `marker`
/// (upstream default: 0.7).
pub const DEFAULT_GLOBAL_PSI_CUTOFF: f64 = 0.7;

/// Default global Ψ ceiling for `non_specific` (housekeeping) genes
/// (upstream default: 0.2). A gene below this is considered broadly,
/// uniformly expressed.
pub const DEFAULT_HOUSEKEEPING_PSI_CUTOFF: f64 = 0.2;

/// Classification thresholds. Block-local and global cutoffs are kept
/// independently configurable: a marker gene must pass both tests and
/// the two policies must never be conflated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_block_psi")]
    pub block_psi: f64,
    #[serde(default = "default_global_psi")]
    pub global_psi: f64,
    #[serde(default = "default_housekeeping_psi")]
    pub housekeeping_psi: f64,
}

fn default_block_psi() -> f64 {
    DEFAULT_BLOCK_PSI_CUTOFF
}

fn default_global_psi() -> f64 {
    DEFAULT_GLOBAL_PSI_CUTOFF
}

fn default_housekeeping_psi() -> f64 {
    DEFAULT_HOUSEKEEPING_PSI_CUTOFF
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            block_psi: DEFAULT_BLOCK_PSI_CUTOFF,
            global_psi: DEFAULT_GLOBAL_PSI_CUTOFF,
            housekeeping_psi: DEFAULT_HOUSEKEEPING_PSI_CUTOFF,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CubedbConfig {
    /// Path to the specificity store (global Ψ/ζ and per-block Ψ).
    pub database: Option<String>,
    /// Path to the expression summary store.
    pub expression_database: Option<String>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

impl CubedbConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }

    pub fn expression_database_path(&self) -> PathBuf {
        self.expression_database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_expression_database_path)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds.unwrap_or_default()
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("cubedb.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("8cube.db")
}

pub fn default_expression_database_path() -> PathBuf {
    PathBuf::from("expression.db")
}

/// Load the config file if it exists; `Ok(None)` when absent.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<CubedbConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CubedbConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CubedbConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
