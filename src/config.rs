use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime settings, overridable via `PLANTWIKI_*` environment variables
/// (e.g. `PLANTWIKI_DATA_DIR=/tmp/run plantwiki taxonomy`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Root directory for every pipeline artifact.
    pub data_dir: PathBuf,
    /// NCBI division kept when building the plant table (4 = Plants).
    pub division_id: u32,
    /// MediaWiki API endpoint.
    pub api_base: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .set_default("data_dir", "data")?
            .set_default("division_id", 4)?
            .set_default("api_base", "https://en.wikipedia.org/w/api.php")?
            .add_source(config::Environment::with_prefix("PLANTWIKI"))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn ncbi_dir(&self) -> PathBuf {
        self.data_dir.join("ncbi_taxonomy")
    }

    pub fn taxdump_path(&self) -> PathBuf {
        self.ncbi_dir().join("ncbi_taxdump.tar.gz")
    }

    pub fn nodes_path(&self) -> PathBuf {
        self.ncbi_dir().join("nodes.dmp")
    }

    pub fn names_path(&self) -> PathBuf {
        self.ncbi_dir().join("names.dmp")
    }

    pub fn table_path(&self) -> PathBuf {
        self.data_dir.join("ncbi_tax.csv")
    }

    pub fn map_path(&self) -> PathBuf {
        self.data_dir.join("tax2pg.json")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.data_dir.join("wiki_pgs")
    }
}
