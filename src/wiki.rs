//! Wikipedia page resolution and the on-disk page cache.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

/// Sentinel page id recorded when the search finds no matching page.
/// Distinct from "not yet looked up" (absent from the map).
pub const NO_PAGE: i64 = -1;

/// Persisted tax_id → page id map (tax2pg.json). Serialized with string
/// keys, as JSON objects require; ordered so the file diffs cleanly.
pub type PageMap = BTreeMap<u32, i64>;

/// Read the map from disk, or start empty when the file doesn't exist yet.
pub fn load_map(path: &Path) -> Result<PageMap> {
    if !path.exists() {
        return Ok(PageMap::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Malformed page map in {}", path.display()))
}

/// Write the whole map as indented JSON, replacing the previous file.
pub fn save_map(path: &Path, map: &PageMap) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to write {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), map)?;
    Ok(())
}

/// Thin blocking client for the MediaWiki query/parse API.
pub struct WikiClient {
    http: reqwest::blocking::Client,
    api_base: String,
}

impl WikiClient {
    pub fn new(api_base: &str) -> Self {
        WikiClient {
            http: reqwest::blocking::Client::new(),
            api_base: api_base.to_string(),
        }
    }

    /// Near-match search for a name. Returns the first hit's page id, or
    /// NO_PAGE when the search comes back empty.
    pub fn search_page_id(&self, name: &str) -> Result<i64> {
        let response: Value = self
            .http
            .get(&self.api_base)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("list", "search"),
                ("srwhat", "nearmatch"),
                ("srsearch", name),
            ])
            .send()
            .with_context(|| format!("Search request failed for {:?}", name))?
            .json()
            .with_context(|| format!("Malformed search response for {:?}", name))?;
        Ok(page_id_from_search(&response))
    }

    /// Fetch the full parsed content of a page by id.
    pub fn fetch_page(&self, page_id: i64) -> Result<Value> {
        let pid = page_id.to_string();
        self.http
            .get(&self.api_base)
            .query(&[
                ("action", "parse"),
                ("format", "json"),
                ("pageid", pid.as_str()),
            ])
            .send()
            .with_context(|| format!("Page request failed for page id {}", page_id))?
            .json()
            .with_context(|| format!("Malformed page response for page id {}", page_id))
    }
}

/// First search hit's page id, NO_PAGE when the result list is empty.
pub fn page_id_from_search(response: &Value) -> i64 {
    response
        .get("query")
        .and_then(|q| q.get("search"))
        .and_then(|s| s.as_array())
        .and_then(|hits| hits.first())
        .and_then(|hit| hit.get("pageid"))
        .and_then(|id| id.as_i64())
        .unwrap_or(NO_PAGE)
}

/// HTML body of a parse API response (parse → text → "*").
pub fn page_html(response: &Value) -> Option<&str> {
    response
        .get("parse")
        .and_then(|p| p.get("text"))
        .and_then(|t| t.get("*"))
        .and_then(|h| h.as_str())
}

/// Resolve a page id for each (name, tax_id) pair, positionally aligned
/// with the inputs. Ids already in `map` are returned without a request.
pub fn resolve_page_ids(
    client: &WikiClient,
    names: &[String],
    tax_ids: &[u32],
    map: &PageMap,
) -> Result<Vec<i64>> {
    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} Searching for wiki pages")?
            .progress_chars("=> "),
    );

    let mut page_ids = Vec::with_capacity(names.len());
    for (name, tax_id) in names.iter().zip(tax_ids) {
        let page_id = match map.get(tax_id) {
            Some(cached) => *cached,
            None => client.search_page_id(name)?,
        };
        page_ids.push(page_id);
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(page_ids)
}

/// Cache file location for one tax id.
pub fn page_cache_path(pages_dir: &Path, tax_id: u32) -> PathBuf {
    pages_dir.join(format!("{}.json.gz", tax_id))
}

/// Whether a page still needs downloading: the NO_PAGE sentinel is never
/// fetched, and an existing cache file is never fetched again.
pub fn needs_fetch(page_id: i64, cache_path: &Path) -> bool {
    page_id != NO_PAGE && !cache_path.exists()
}

/// Download and cache every page in the map that isn't cached yet.
/// Returns the number of pages actually fetched.
pub fn fetch_pages(client: &WikiClient, map: &PageMap, pages_dir: &Path) -> Result<usize> {
    fs::create_dir_all(pages_dir)
        .with_context(|| format!("Failed to create {}", pages_dir.display()))?;

    let pb = ProgressBar::new(map.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} Retrieving wiki pages")?
            .progress_chars("=> "),
    );

    let mut fetched = 0;
    for (tax_id, page_id) in map {
        let path = page_cache_path(pages_dir, *tax_id);
        if needs_fetch(*page_id, &path) {
            let page = client.fetch_page(*page_id)?;
            write_cached_page(&path, &page)?;
            fetched += 1;
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} new pages into {}", fetched, pages_dir.display());
    Ok(fetched)
}

/// Gzip-compressed JSON, written once and never mutated afterwards.
fn write_cached_page(path: &Path, page: &Value) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to write {}", path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, page)?;
    encoder
        .finish()
        .with_context(|| format!("Failed to finish {}", path.display()))?;
    Ok(())
}

/// Read one cached page back.
pub fn read_cached_page(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(GzDecoder::new(BufReader::new(file)))
        .with_context(|| format!("Malformed cached page in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tax2pg.json");

        let mut map = PageMap::new();
        map.insert(4070, 1234567);
        map.insert(4081, NO_PAGE);
        save_map(&path, &map).unwrap();

        assert_eq!(load_map(&path).unwrap(), map);
    }

    #[test]
    fn map_file_uses_string_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tax2pg.json");

        let mut map = PageMap::new();
        map.insert(4070, 42);
        save_map(&path, &map).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("4070").and_then(|v| v.as_i64()), Some(42));
    }

    #[test]
    fn missing_map_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let map = load_map(&tmp.path().join("tax2pg.json")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn save_overwrites_the_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tax2pg.json");

        let mut first = PageMap::new();
        first.insert(1, 10);
        first.insert(2, 20);
        save_map(&path, &first).unwrap();

        let mut second = PageMap::new();
        second.insert(3, 30);
        save_map(&path, &second).unwrap();

        assert_eq!(load_map(&path).unwrap(), second);
    }

    #[test]
    fn sentinel_and_cached_pages_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let cached = tmp.path().join("4070.json.gz");
        fs::write(&cached, b"already here").unwrap();

        assert!(!needs_fetch(NO_PAGE, &tmp.path().join("4081.json.gz")));
        assert!(!needs_fetch(1234567, &cached));
        assert!(needs_fetch(1234567, &tmp.path().join("4081.json.gz")));
    }

    #[test]
    fn search_response_yields_first_hit() {
        let response = json!({
            "query": {
                "search": [
                    {"title": "Solanoideae", "pageid": 4533490},
                    {"title": "Solanaceae", "pageid": 57965}
                ]
            }
        });
        assert_eq!(page_id_from_search(&response), 4533490);
    }

    #[test]
    fn empty_search_yields_sentinel() {
        assert_eq!(page_id_from_search(&json!({"query": {"search": []}})), NO_PAGE);
        assert_eq!(page_id_from_search(&json!({})), NO_PAGE);
    }

    #[test]
    fn page_html_follows_parse_text_star() {
        let response = json!({
            "parse": {
                "title": "Solanoideae",
                "text": {"*": "<div class=\"mw-parser-output\"><p>x</p></div>"}
            }
        });
        assert_eq!(
            page_html(&response),
            Some("<div class=\"mw-parser-output\"><p>x</p></div>")
        );
        assert_eq!(page_html(&json!({})), None);
    }

    #[test]
    fn cached_page_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = page_cache_path(tmp.path(), 4070);
        let page = json!({"parse": {"pageid": 1234567, "text": {"*": "<p>hi</p>"}}});

        write_cached_page(&path, &page).unwrap();
        assert_eq!(read_cached_page(&path).unwrap(), page);
    }
}
