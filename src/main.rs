mod config;
mod parser;
mod taxdump;
mod taxonomy;
mod wiki;

use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "plantwiki", about = "NCBI plant taxonomy to Wikipedia text pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the NCBI taxonomy dump and build the plant table
    Taxonomy,
    /// Resolve and cache Wikipedia pages for a subtree of the plant table
    Retrieve {
        /// Scientific name of the subtree root
        #[arg(short, long, default_value = "Solanoideae")]
        root: String,
        /// Max subtree records to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Tokenize every cached page
    Parse,
    /// Taxonomy + retrieve + parse in one pipeline
    Run {
        /// Scientific name of the subtree root
        #[arg(short, long, default_value = "Solanoideae")]
        root: String,
        /// Max subtree records to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show pipeline statistics
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = Settings::load()?;

    let result = match cli.command {
        Commands::Taxonomy => cmd_taxonomy(&cfg),
        Commands::Retrieve { root, limit } => cmd_retrieve(&cfg, &root, limit),
        Commands::Parse => cmd_parse(&cfg).map(|counts| counts.print()),
        Commands::Run { root, limit } => {
            cmd_taxonomy(&cfg)?;
            cmd_retrieve(&cfg, &root, limit)?;
            cmd_parse(&cfg).map(|counts| counts.print())
        }
        Commands::Stats => cmd_stats(&cfg),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn cmd_taxonomy(cfg: &Settings) -> Result<()> {
    taxdump::ensure_taxdump(cfg)?;
    let records =
        taxonomy::build_plant_table(&cfg.nodes_path(), &cfg.names_path(), cfg.division_id)?;
    taxonomy::write_table(&cfg.table_path(), &records)?;
    println!(
        "Wrote {} plant records to {}",
        records.len(),
        cfg.table_path().display()
    );
    Ok(())
}

fn cmd_retrieve(cfg: &Settings, root: &str, limit: Option<usize>) -> Result<()> {
    let records = taxonomy::read_table(&cfg.table_path())?;
    let Some(root_record) = taxonomy::find_by_name(&records, root) else {
        bail!(
            "No record named {:?} in {}. Run 'taxonomy' first?",
            root,
            cfg.table_path().display()
        );
    };

    let subtree_ids = taxonomy::collect_descendants(&records, root_record.tax_id);
    let mut subtree = taxonomy::filter_subtree(&records, &subtree_ids);
    if let Some(n) = limit {
        subtree.truncate(n);
    }
    println!("Subtree of {:?}: {} records", root, subtree.len());

    let names: Vec<String> = subtree.iter().map(|r| r.name.clone()).collect();
    let tax_ids: Vec<u32> = subtree.iter().map(|r| r.tax_id).collect();

    let client = wiki::WikiClient::new(&cfg.api_base);

    // Load fresh, merge this run's results, rewrite the file whole.
    let mut map = wiki::load_map(&cfg.map_path())?;
    let page_ids = wiki::resolve_page_ids(&client, &names, &tax_ids, &map)?;
    for (tax_id, page_id) in tax_ids.iter().zip(&page_ids) {
        map.insert(*tax_id, *page_id);
    }
    wiki::save_map(&cfg.map_path(), &map)?;

    let fetched = wiki::fetch_pages(&client, &map, &cfg.pages_dir())?;
    println!(
        "Cached {} new pages ({} map entries total)",
        fetched,
        map.len()
    );
    Ok(())
}

struct ParseCounts {
    pages: usize,
    paragraphs: usize,
    sentences: usize,
    tokens: usize,
}

impl ParseCounts {
    fn print(&self) {
        println!(
            "Parsed {} pages: {} paragraphs, {} sentences, {} tokens.",
            self.pages, self.paragraphs, self.sentences, self.tokens,
        );
    }
}

fn cmd_parse(cfg: &Settings) -> Result<ParseCounts> {
    let map = wiki::load_map(&cfg.map_path())?;
    let mut counts = ParseCounts {
        pages: 0,
        paragraphs: 0,
        sentences: 0,
        tokens: 0,
    };
    if map.is_empty() {
        println!("Page map is empty. Run 'retrieve' first.");
        return Ok(counts);
    }

    let pb = ProgressBar::new(map.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} Parsing wiki pages")?
            .progress_chars("=> "),
    );

    for (tax_id, page_id) in &map {
        if *page_id == wiki::NO_PAGE {
            pb.inc(1);
            continue;
        }
        let path = wiki::page_cache_path(&cfg.pages_dir(), *tax_id);
        let page = wiki::read_cached_page(&path)?;
        let Some(html) = wiki::page_html(&page) else {
            bail!("No parse text in cached page for tax id {}", tax_id);
        };

        let paragraphs = parser::parse_page(html)?;
        counts.pages += 1;
        counts.paragraphs += paragraphs.len();
        for sentences in &paragraphs {
            counts.sentences += sentences.len();
            for words in sentences {
                counts.tokens += words.len();
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn cmd_stats(cfg: &Settings) -> Result<()> {
    let table_rows = if cfg.table_path().exists() {
        taxonomy::read_table(&cfg.table_path())?.len()
    } else {
        0
    };

    let map = wiki::load_map(&cfg.map_path())?;
    let missing = map.values().filter(|&&id| id == wiki::NO_PAGE).count();

    let cached = match std::fs::read_dir(cfg.pages_dir()) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".json.gz"))
            .count(),
        Err(_) => 0,
    };

    println!("Table rows: {}", table_rows);
    println!("Resolved:   {}", map.len() - missing);
    println!("No page:    {}", missing);
    println!("Cached:     {}", cached);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
