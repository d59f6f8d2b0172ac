//! NCBI taxonomy dump tables: parsing, the plant join, and subtree traversal.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Field separator inside a dump row.
const FIELD_SEP: &str = "\t|\t";
/// Terminator fragment trailing the last field of every row.
const LINE_TERM: &str = "\t|";

const SCIENTIFIC_NAME: &str = "scientific name";

/// One row of nodes.dmp.
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub tax_id: u32,
    pub parent_tax_id: u32,
    pub rank: String,
    pub embl_code: String,
    pub division_id: u32,
    pub inherited_div: u8,
    pub genetic_code_id: u32,
    pub inherited_gc: u8,
    pub mito_genetic_code_id: u32,
    pub inherited_mgc: u8,
    pub genbank_hidden: u8,
    pub hidden_subtree: u8,
    pub comments: String,
}

/// One row of names.dmp. Several rows may share a tax_id (one per name class).
#[derive(Debug, Clone)]
pub struct NameRow {
    pub tax_id: u32,
    pub name: String,
    pub unique_name: String,
    pub name_class: String,
}

/// A scientific name joined with its node row. The CSV header is the union
/// of the name and node fields, in this declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantRecord {
    pub tax_id: u32,
    pub name: String,
    pub name_class: String,
    pub parent_tax_id: u32,
    pub rank: String,
    pub embl_code: String,
    pub division_id: u32,
    pub inherited_div: u8,
    pub genetic_code_id: u32,
    pub inherited_gc: u8,
    pub mito_genetic_code_id: u32,
    pub inherited_mgc: u8,
    pub genbank_hidden: u8,
    pub hidden_subtree: u8,
    pub comments: String,
}

fn split_dmp_line(line: &str) -> Vec<&str> {
    let mut fields: Vec<&str> = line.split(FIELD_SEP).collect();
    if let Some(last) = fields.last_mut() {
        *last = last.trim_end_matches(LINE_TERM);
    }
    fields
}

fn parse_nodes(path: &Path) -> Result<Vec<NodeRow>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut rows = Vec::new();
    for line in content.lines() {
        let f = split_dmp_line(line);
        ensure!(f.len() >= 13, "Malformed nodes.dmp row: {:?}", line);
        rows.push(NodeRow {
            tax_id: f[0].parse()?,
            parent_tax_id: f[1].parse()?,
            rank: f[2].to_string(),
            embl_code: f[3].to_string(),
            division_id: f[4].parse()?,
            inherited_div: f[5].parse()?,
            genetic_code_id: f[6].parse()?,
            inherited_gc: f[7].parse()?,
            mito_genetic_code_id: f[8].parse()?,
            inherited_mgc: f[9].parse()?,
            genbank_hidden: f[10].parse()?,
            hidden_subtree: f[11].parse()?,
            comments: f[12].to_string(),
        });
    }
    Ok(rows)
}

fn parse_names(path: &Path) -> Result<Vec<NameRow>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut rows = Vec::new();
    for line in content.lines() {
        let f = split_dmp_line(line);
        ensure!(f.len() >= 4, "Malformed names.dmp row: {:?}", line);
        rows.push(NameRow {
            tax_id: f[0].parse()?,
            name: f[1].to_string(),
            unique_name: f[2].to_string(),
            name_class: f[3].to_string(),
        });
    }
    Ok(rows)
}

/// Build the plant table: nodes filtered to `division_id`, names filtered to
/// scientific names, inner-joined on tax_id. Output order follows the
/// filtered names table; rows without a partner on either side are dropped.
pub fn build_plant_table(
    nodes_path: &Path,
    names_path: &Path,
    division_id: u32,
) -> Result<Vec<PlantRecord>> {
    let nodes = parse_nodes(nodes_path)?;
    let names = parse_names(names_path)?;
    info!("Parsed {} nodes, {} names", nodes.len(), names.len());

    let division_nodes: HashMap<u32, &NodeRow> = nodes
        .iter()
        .filter(|n| n.division_id == division_id)
        .map(|n| (n.tax_id, n))
        .collect();

    let records: Vec<PlantRecord> = names
        .iter()
        .filter(|n| n.name_class == SCIENTIFIC_NAME)
        .filter_map(|name| {
            let node = division_nodes.get(&name.tax_id)?;
            Some(PlantRecord {
                tax_id: name.tax_id,
                name: name.name.clone(),
                name_class: name.name_class.clone(),
                parent_tax_id: node.parent_tax_id,
                rank: node.rank.clone(),
                embl_code: node.embl_code.clone(),
                division_id: node.division_id,
                inherited_div: node.inherited_div,
                genetic_code_id: node.genetic_code_id,
                inherited_gc: node.inherited_gc,
                mito_genetic_code_id: node.mito_genetic_code_id,
                inherited_mgc: node.inherited_mgc,
                genbank_hidden: node.genbank_hidden,
                hidden_subtree: node.hidden_subtree,
                comments: node.comments.clone(),
            })
        })
        .collect();

    info!("Plant table: {} records", records.len());
    Ok(records)
}

/// Write the table as CSV with a header row.
pub fn write_table(path: &Path, records: &[PlantRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a table previously written by `write_table`.
pub fn read_table(path: &Path) -> Result<Vec<PlantRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Look up a record by scientific name.
pub fn find_by_name<'a>(records: &'a [PlantRecord], name: &str) -> Option<&'a PlantRecord> {
    records.iter().find(|r| r.name == name)
}

/// Collect `root_id` and every tax_id reachable through parent→child edges.
///
/// Stack-based: pop an id, push its children, record the popped id. Sibling
/// order is whatever the stack yields. The table is assumed to encode a
/// forest; the visited set exists so a malformed dump with a cycle still
/// terminates (NCBI's root node lists itself as its own parent).
pub fn collect_descendants(records: &[PlantRecord], root_id: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for r in records {
        children.entry(r.parent_tax_id).or_default().push(r.tax_id);
    }

    let mut visited: HashSet<u32> = HashSet::new();
    let mut result = Vec::new();
    let mut stack = vec![root_id];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            stack.extend(kids.iter().copied());
        }
        result.push(id);
    }

    result
}

/// Filter the table down to the given ids, preserving table order.
pub fn filter_subtree(records: &[PlantRecord], ids: &[u32]) -> Vec<PlantRecord> {
    let keep: HashSet<u32> = ids.iter().copied().collect();
    records
        .iter()
        .filter(|r| keep.contains(&r.tax_id))
        .cloned()
        .collect()
}
