//! SQLite persistence for a linked taxonomy.
//!
//! The `tax` table references its own primary key from `parent_id`, and
//! foreign keys are enforced on every insert, so rows have to arrive in
//! parent-before-child order (see [`crate::order::persistence_order`]).

use std::fs;
use std::path::Path;

use camino::Utf8Path;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{TaxonId, TaxonRecord};
use crate::error::TaxTreeError;
use crate::lineage::Lineage;
use crate::parser::NameTable;
use crate::tree::{NodeRef, Taxonomy};

/// Upper bound on parent hops followed by stored lineage queries.
pub const MAX_LINEAGE_DEPTH: i64 = 4096;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tax (
    id TEXT PRIMARY KEY NOT NULL,
    parent_id TEXT REFERENCES tax(id),
    rank TEXT NOT NULL,
    name TEXT
);
CREATE INDEX IF NOT EXISTS idx_tax_parent ON tax(parent_id);
CREATE INDEX IF NOT EXISTS idx_tax_rank ON tax(rank);
CREATE INDEX IF NOT EXISTS idx_tax_name ON tax(name);
"#;

/// One stored taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonRow {
    pub id: TaxonId,
    pub parent_id: Option<TaxonId>,
    pub rank: String,
    pub name: Option<String>,
}

impl TaxonRow {
    pub fn from_node(taxonomy: &Taxonomy, node: NodeRef) -> Self {
        let taxon = taxonomy.node(node);
        Self {
            id: taxon.id().clone(),
            parent_id: taxon
                .parent()
                .map(|parent| taxonomy.node(parent).id().clone()),
            rank: taxon.rank().to_string(),
            name: taxon.name().map(str::to_string),
        }
    }

    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let id: String = row.get(0)?;
        let parent_id: Option<String> = row.get(1)?;
        Ok(Self {
            id: TaxonId::from_field(&id),
            parent_id: parent_id.as_deref().map(TaxonId::from_field),
            rank: row.get(2)?,
            name: row.get(3)?,
        })
    }
}

pub struct TaxonStore {
    conn: Connection,
}

impl TaxonStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TaxTreeError> {
        let conn = Connection::open(path.as_ref())?;
        Self::configure(conn)
    }

    /// Opens an existing store; a missing file is an error rather than a new empty store.
    pub fn open_existing(path: &Utf8Path) -> Result<Self, TaxTreeError> {
        if !path.as_std_path().exists() {
            return Err(TaxTreeError::Store(format!(
                "no taxonomy database at {path}; run `taxtree load` first"
            )));
        }
        Self::open(path.as_std_path())
    }

    pub fn in_memory() -> Result<Self, TaxTreeError> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, TaxTreeError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn create_schema(&self) -> Result<(), TaxTreeError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Inserts a single row outside of any batch. Fails if the parent row is absent.
    pub fn insert_row(&self, row: &TaxonRow) -> Result<(), TaxTreeError> {
        self.conn.execute(
            "INSERT INTO tax (id, parent_id, rank, name) VALUES (?1, ?2, ?3, ?4)",
            params![
                row.id.as_str(),
                row.parent_id.as_ref().map(TaxonId::as_str),
                row.rank,
                row.name
            ],
        )?;
        Ok(())
    }

    /// Writes `order` in one transaction. Nothing is committed unless every
    /// row is accepted. `on_insert` receives `(inserted, total)` after each row.
    pub fn insert_ordered<F>(
        &mut self,
        taxonomy: &Taxonomy,
        order: &[NodeRef],
        mut on_insert: F,
    ) -> Result<usize, TaxTreeError>
    where
        F: FnMut(usize, usize),
    {
        let total = order.len();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO tax (id, parent_id, rank, name) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, node) in order.iter().enumerate() {
                let taxon = taxonomy.node(*node);
                let parent_id = taxon
                    .parent()
                    .map(|parent| taxonomy.node(parent).id().as_str());
                stmt.execute(params![
                    taxon.id().as_str(),
                    parent_id,
                    taxon.rank(),
                    taxon.name()
                ])
                .map_err(|err| {
                    TaxTreeError::Store(format!("insert taxon {}: {err}", taxon.id()))
                })?;
                on_insert(position + 1, total);
            }
        }
        tx.commit()?;
        info!(rows = total, "committed taxonomy");
        Ok(total)
    }

    pub fn count(&self) -> Result<usize, TaxTreeError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tax", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn get(&self, id: &TaxonId) -> Result<Option<TaxonRow>, TaxTreeError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, parent_id, rank, name FROM tax WHERE id = ?1",
                params![id.as_str()],
                TaxonRow::from_sql,
            )
            .optional()?;
        Ok(row)
    }

    pub fn load_rows(&self) -> Result<Vec<TaxonRow>, TaxTreeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, parent_id, rank, name FROM tax ORDER BY rowid")?;
        let rows = stmt
            .query_map([], TaxonRow::from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Rebuilds the in-memory taxonomy from stored rows.
    pub fn load_taxonomy(&self) -> Result<Taxonomy, TaxTreeError> {
        let rows = self.load_rows()?;
        let mut names = NameTable::default();
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(name) = row.name {
                names.insert(row.id.clone(), name);
            }
            records.push(TaxonRecord {
                id: row.id,
                parent_id: row.parent_id,
                rank: row.rank,
            });
        }
        let mut taxonomy = Taxonomy::from_records(records)?;
        crate::names::resolve_names(&mut taxonomy, &names);
        debug!(nodes = taxonomy.len(), "reloaded taxonomy from store");
        Ok(taxonomy)
    }

    /// The stored row for `id` followed by its ancestors, nearest first.
    pub fn ancestor_chain(&self, id: &TaxonId) -> Result<Vec<TaxonRow>, TaxTreeError> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            WITH RECURSIVE chain(id, parent_id, rank, name, depth) AS (
                SELECT id, parent_id, rank, name, 0 FROM tax WHERE id = ?1
                UNION ALL
                SELECT t.id, t.parent_id, t.rank, t.name, chain.depth + 1
                FROM tax t JOIN chain ON t.id = chain.parent_id
                WHERE chain.depth < ?2
            )
            SELECT id, parent_id, rank, name FROM chain ORDER BY depth
            "#,
        )?;
        let rows = stmt
            .query_map(params![id.as_str(), MAX_LINEAGE_DEPTH], TaxonRow::from_sql)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn lineage(&self, id: &TaxonId) -> Result<(TaxonRow, Lineage<TaxonRow>), TaxTreeError> {
        let chain = self.ancestor_chain(id)?;
        let taxon = chain
            .first()
            .cloned()
            .ok_or_else(|| TaxTreeError::TaxonNotFound(id.to_string()))?;
        Ok((taxon, Lineage::from_chain(chain, |row| row.rank.as_str())))
    }

    pub fn close(self) -> Result<(), TaxTreeError> {
        self.conn.close().map_err(|(_, err)| err.into())
    }
}

/// Sidecar written next to the database after a successful load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadMetadata {
    pub source: String,
    pub archive: String,
    pub loaded_at: String,
    pub taxa: usize,
    pub named: usize,
    pub tool: String,
}

pub fn write_metadata(path: &Utf8Path, metadata: &LoadMetadata) -> Result<(), TaxTreeError> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    let content = serde_json::to_vec_pretty(metadata)
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".taxtree-meta")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), &content).map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn read_metadata(path: &Utf8Path) -> Result<LoadMetadata, TaxTreeError> {
    let content =
        fs::read_to_string(path.as_std_path()).map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    serde_json::from_str(&content).map_err(|err| TaxTreeError::Filesystem(err.to_string()))
}

/// Directory holding `path`; bare file names resolve to the working directory.
pub(crate) fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}
