//! Readers for the `names.dmp` and `nodes.dmp` files of the NCBI taxonomy dump.
//!
//! Rows are separated into fields by `\t|\t` and terminated by `\t|\n`:
//!
//! ```text
//! 9606	|	9605	|	species	|	HS	|	...	|
//! 9606	|	Homo sapiens	|		|	scientific name	|
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::BufRead;

use indexmap::IndexMap;
use indexmap::map::Entry as IndexEntry;
use tracing::{debug, warn};

use crate::domain::{TaxonId, TaxonRecord};
use crate::error::TaxTreeError;

pub const FIELD_SEPARATOR: &str = "\t|\t";
pub const LINE_TERMINATOR: &str = "\t|\n";
pub const SCIENTIFIC_NAME: &str = "scientific name";
pub const NAMES_ENTRY: &str = "names.dmp";
pub const NODES_ENTRY: &str = "nodes.dmp";

/// Both files carry at least id, two payload columns and a class/code column.
const MIN_FIELDS: usize = 4;

/// Scientific names keyed by taxon id.
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    names: HashMap<TaxonId, String>,
    duplicates: usize,
}

impl NameTable {
    pub fn get(&self, id: &TaxonId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Scientific-name rows dropped because an earlier row already named the taxon.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// First scientific name wins; later ones are counted, not applied.
    pub fn insert(&mut self, id: TaxonId, name: String) -> bool {
        match self.names.entry(id) {
            Entry::Occupied(existing) => {
                warn!(
                    taxon = %existing.key(),
                    kept = %existing.get(),
                    dropped = %name,
                    "duplicate scientific name"
                );
                self.duplicates += 1;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(name);
                true
            }
        }
    }
}

/// Node records keyed by taxon id, in file order.
pub type NodeRecords = IndexMap<TaxonId, TaxonRecord>;

pub fn read_names<R: BufRead>(reader: R) -> Result<NameTable, TaxTreeError> {
    let mut table = NameTable::default();
    let mut rows = 0usize;
    for_each_row(reader, NAMES_ENTRY, |_, fields| {
        rows += 1;
        if fields[3] == SCIENTIFIC_NAME {
            table.insert(TaxonId::from_field(fields[0]), fields[1].to_string());
        }
        Ok(())
    })?;
    debug!(rows, names = table.len(), "parsed {NAMES_ENTRY}");
    Ok(table)
}

pub fn read_nodes<R: BufRead>(reader: R) -> Result<NodeRecords, TaxTreeError> {
    let mut records = NodeRecords::new();
    for_each_row(reader, NODES_ENTRY, |_, fields| {
        let id = TaxonId::from_field(fields[0]);
        let parent = TaxonId::from_field(fields[1]);
        let parent_id = if id.is_root_sentinel() || parent == id {
            None
        } else {
            Some(parent)
        };
        let record = TaxonRecord {
            id: id.clone(),
            parent_id,
            rank: fields[2].trim().to_string(),
        };
        match records.entry(id) {
            IndexEntry::Occupied(existing) => Err(TaxTreeError::DuplicateTaxon {
                id: existing.key().to_string(),
            }),
            IndexEntry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    })?;
    debug!(nodes = records.len(), "parsed {NODES_ENTRY}");
    Ok(records)
}

/// Splits one line, with or without its terminator, into fields.
pub fn split_record(line: &str) -> Vec<&str> {
    let line = line
        .strip_suffix(LINE_TERMINATOR)
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    let line = line.strip_suffix("\t|").unwrap_or(line);
    line.split(FIELD_SEPARATOR).collect()
}

fn for_each_row<R, F>(reader: R, source_name: &str, mut handle: F) -> Result<(), TaxTreeError>
where
    R: BufRead,
    F: FnMut(usize, &[&str]) -> Result<(), TaxTreeError>,
{
    for (index, line) in reader.lines().enumerate() {
        let line_num = index + 1;
        let line = line
            .map_err(|err| TaxTreeError::Archive(format!("read {source_name}: {err}")))?;
        if line.is_empty() {
            continue;
        }
        let fields = split_record(&line);
        if fields.len() < MIN_FIELDS {
            return Err(TaxTreeError::MalformedRecord {
                source_name: source_name.to_string(),
                line: line_num,
                found: fields.len(),
                expected: MIN_FIELDS,
            });
        }
        handle(line_num, &fields)?;
    }
    Ok(())
}
