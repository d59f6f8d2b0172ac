use std::fs::{self, File};
use std::io::Write;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;

use crate::config::Settings;

const TAXDUMP_URL: &str = "https://ftp.ncbi.nih.gov/pub/taxonomy/taxdump.tar.gz";

/// Download and extract the NCBI taxonomy dump. A no-op when the archive
/// file is already on disk; re-running after a failure resumes from scratch.
pub fn ensure_taxdump(cfg: &Settings) -> Result<()> {
    let ncbi_dir = cfg.ncbi_dir();
    let archive_path = cfg.taxdump_path();

    fs::create_dir_all(&ncbi_dir)
        .with_context(|| format!("Failed to create {}", ncbi_dir.display()))?;

    if archive_path.exists() {
        info!("{} is already on disk", archive_path.display());
        return Ok(());
    }

    info!("Retrieving {} from {}", archive_path.display(), TAXDUMP_URL);
    let client = reqwest::blocking::Client::new();
    let bytes = client
        .get(TAXDUMP_URL)
        .send()
        .and_then(|r| r.error_for_status())
        .context("Failed to download taxonomy dump")?
        .bytes()
        .context("Failed to read taxonomy dump body")?;

    File::create(&archive_path)
        .and_then(|mut f| f.write_all(&bytes))
        .with_context(|| format!("Failed to write {}", archive_path.display()))?;

    info!("Extracting {}", archive_path.display());
    let file = File::open(&archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(&ncbi_dir)
        .context("Failed to extract taxonomy dump")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_settings(data_dir: PathBuf) -> Settings {
        Settings {
            data_dir,
            division_id: 4,
            api_base: "http://localhost".into(),
        }
    }

    #[test]
    fn existing_archive_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_settings(tmp.path().to_path_buf());
        fs::create_dir_all(cfg.ncbi_dir()).unwrap();
        fs::write(cfg.taxdump_path(), b"placeholder").unwrap();

        // Must return without touching the network or the file.
        ensure_taxdump(&cfg).unwrap();
        assert_eq!(fs::read(cfg.taxdump_path()).unwrap(), b"placeholder");
    }

    #[test]
    fn creates_missing_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_settings(tmp.path().join("nested").join("data"));
        fs::create_dir_all(cfg.ncbi_dir()).unwrap();
        fs::write(cfg.taxdump_path(), b"placeholder").unwrap();
        ensure_taxdump(&cfg).unwrap();
        assert!(cfg.ncbi_dir().is_dir());
    }
}
