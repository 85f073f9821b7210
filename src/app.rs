use std::io::BufRead;
use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::TaxdumpArchive;
use crate::config::LoadConfig;
use crate::domain::{Rank, TaxonId};
use crate::download::TaxdumpClient;
use crate::error::TaxTreeError;
use crate::names::{NameReport, resolve_names};
use crate::order::persistence_order;
use crate::parser::{NAMES_ENTRY, NODES_ENTRY, read_names, read_nodes};
use crate::store::{LoadMetadata, TaxonRow, TaxonStore, parent_dir, write_metadata};
use crate::tree::{NodeRef, Taxonomy, TreeBuilder};

/// Rows written between two persistence progress events.
const PERSIST_PROGRESS_STRIDE: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Fetch,
    Parse,
    Build,
    Order,
    Persist,
    Verify,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Fetch => "Fetch",
            Phase::Parse => "Parse",
            Phase::Build => "Build",
            Phase::Order => "Order",
            Phase::Persist => "Persist",
            Phase::Verify => "Verify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub progress: Option<Progress>,
}

impl ProgressEvent {
    pub fn message(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            progress: None,
        }
    }

    pub fn counter(phase: Phase, message: impl Into<String>, done: u64, total: Option<u64>) -> Self {
        Self {
            phase,
            message: message.into(),
            progress: Some(Progress { done, total }),
        }
    }
}

/// Observer for load progress. The core never talks to a terminal directly.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankCount {
    pub rank: Rank,
    pub taxa: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub db_path: String,
    pub archive: String,
    pub downloaded: bool,
    pub root: String,
    pub taxa: usize,
    pub named: usize,
    pub missing_names: usize,
    pub duplicate_names: usize,
    pub rank_counts: Vec<RankCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineageEntry {
    pub rank: Rank,
    pub id: Option<TaxonId>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineageResult {
    pub taxon: TaxonRow,
    pub lineage: Vec<LineageEntry>,
}

/// A linked, named taxonomy plus what was learned while building it.
#[derive(Debug)]
pub struct ParsedDump {
    pub taxonomy: Taxonomy,
    pub names: NameReport,
    pub duplicate_names: usize,
}

/// Parses both dump streams and builds the named tree. No store is touched,
/// so any structural error surfaces before a single row is written.
pub fn build_taxonomy<N, T>(
    names: N,
    nodes: T,
    sink: &dyn ProgressSink,
) -> Result<ParsedDump, TaxTreeError>
where
    N: BufRead,
    T: BufRead,
{
    sink.event(ProgressEvent::message(Phase::Parse, format!("reading {NAMES_ENTRY}")));
    let name_table = read_names(names)?;
    sink.event(ProgressEvent::message(Phase::Parse, format!("reading {NODES_ENTRY}")));
    let records = read_nodes(nodes)?;

    sink.event(ProgressEvent::message(
        Phase::Build,
        format!("linking {} taxa", records.len()),
    ));
    let mut taxonomy = TreeBuilder::from_records(records.into_values())?.link()?;
    let report = resolve_names(&mut taxonomy, &name_table);
    Ok(ParsedDump {
        taxonomy,
        names: report,
        duplicate_names: name_table.duplicates(),
    })
}

pub struct App<C: TaxdumpClient> {
    client: C,
}

impl<C: TaxdumpClient> App<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Fetch (if needed), parse, build, and persist the taxonomy described by `config`.
    pub fn load(
        &self,
        config: &LoadConfig,
        sink: &dyn ProgressSink,
    ) -> Result<LoadReport, TaxTreeError> {
        let downloaded = self.ensure_archive(config, sink)?;
        let archive_path = config.archive_path();
        let mut report = load_archive(&archive_path, &config.db_path, sink)?;
        report.downloaded = downloaded;

        let metadata = LoadMetadata {
            source: config.source_url.clone(),
            archive: archive_path.to_string(),
            loaded_at: chrono::Utc::now().to_rfc3339(),
            taxa: report.taxa,
            named: report.named,
            tool: format!("taxtree/{}", env!("CARGO_PKG_VERSION")),
        };
        // The store is already live at this point.
        if let Err(err) = write_metadata(&config.metadata_path(), &metadata) {
            warn!(path = %config.metadata_path(), error = %err, "failed to write load metadata");
        }
        Ok(report)
    }

    fn ensure_archive(
        &self,
        config: &LoadConfig,
        sink: &dyn ProgressSink,
    ) -> Result<bool, TaxTreeError> {
        let archive_path = config.archive_path();
        if archive_path.as_std_path().exists() {
            match check_archive(&archive_path) {
                Ok(()) => {
                    sink.event(ProgressEvent::message(
                        Phase::Fetch,
                        format!("using cached archive {archive_path}"),
                    ));
                    return Ok(false);
                }
                Err(err) if config.offline => return Err(err),
                Err(err) => {
                    warn!(archive = %archive_path, error = %err, "cached archive is unusable, downloading again");
                }
            }
        } else if config.offline {
            return Err(TaxTreeError::ArchiveMissing(archive_path));
        }

        sink.event(ProgressEvent::message(
            Phase::Fetch,
            format!("downloading {}", config.source_url),
        ));
        let start = Instant::now();
        let mut on_bytes = |done: u64, total: Option<u64>| {
            sink.event(ProgressEvent::counter(
                Phase::Fetch,
                "downloading taxdmp.zip",
                done,
                total,
            ));
        };
        let bytes = self
            .client
            .download(&config.source_url, &archive_path, &mut on_bytes)?;
        info!(
            bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "downloaded taxonomy dump"
        );
        Ok(true)
    }
}

/// Both dump entries must be present and decompress cleanly.
fn check_archive(path: &Utf8Path) -> Result<(), TaxTreeError> {
    TaxdumpArchive::open(path)?.validate(&[NAMES_ENTRY, NODES_ENTRY])
}

/// Core load from a local archive into `db_path`, replacing any previous store.
pub fn load_archive(
    archive_path: &Utf8Path,
    db_path: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<LoadReport, TaxTreeError> {
    // One handle per entry, so both streams can be open at once.
    let mut names_archive = TaxdumpArchive::open(archive_path)?;
    let mut nodes_archive = TaxdumpArchive::open(archive_path)?;
    let ParsedDump {
        taxonomy,
        names: name_report,
        duplicate_names,
    } = build_taxonomy(
        names_archive.entry(NAMES_ENTRY)?,
        nodes_archive.entry(NODES_ENTRY)?,
        sink,
    )?;
    drop(names_archive);
    drop(nodes_archive);

    sink.event(ProgressEvent::message(Phase::Order, "ordering parents before children"));
    let order = persistence_order(&taxonomy)?;

    persist(&taxonomy, &order, db_path, sink)?;

    sink.event(ProgressEvent::message(Phase::Verify, "verifying store"));
    let root = taxonomy.node(taxonomy.root()).id();
    verify_store(db_path, taxonomy.len(), root)?;

    let named = name_report.assigned + name_report.already_named;
    let report = LoadReport {
        db_path: db_path.to_string(),
        archive: archive_path.to_string(),
        downloaded: false,
        root: root.to_string(),
        taxa: taxonomy.len(),
        named,
        missing_names: name_report.missing.len(),
        duplicate_names,
        rank_counts: rank_counts(&taxonomy),
    };
    info!(taxa = report.taxa, named = report.named, db = %db_path, "taxonomy loaded");
    Ok(report)
}

/// Writes every node in `order` to a fresh store beside `db_path`, then renames
/// it into place. On failure the previous database, if any, is untouched.
pub fn persist(
    taxonomy: &Taxonomy,
    order: &[NodeRef],
    db_path: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<usize, TaxTreeError> {
    let parent = parent_dir(db_path);
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    let temp_path = tempfile::Builder::new()
        .prefix(".taxtree")
        .suffix(".db")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?
        .into_temp_path();

    let mut store = TaxonStore::open(&temp_path)?;
    store.create_schema()?;
    let written = store.insert_ordered(taxonomy, order, |done, total| {
        if done % PERSIST_PROGRESS_STRIDE == 0 || done == total {
            sink.event(ProgressEvent::counter(
                Phase::Persist,
                "saving taxa",
                done as u64,
                Some(total as u64),
            ));
        }
    })?;
    store.close()?;

    temp_path
        .persist(db_path.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    Ok(written)
}

/// Re-reads the committed store: the row count must match and the root must
/// resolve through the stored parent chain to itself.
fn verify_store(db_path: &Utf8Path, expected: usize, root: &TaxonId) -> Result<(), TaxTreeError> {
    let store = TaxonStore::open_existing(db_path)?;
    let stored = store.count()?;
    if stored != expected {
        return Err(TaxTreeError::Store(format!(
            "expected {expected} rows in {db_path}, found {stored}"
        )));
    }

    let chain = store.ancestor_chain(root)?;
    match chain.as_slice() {
        [row] if row.id == *root && row.parent_id.is_none() => Ok(()),
        _ => Err(TaxTreeError::Store(format!(
            "root {root} does not resolve to a parentless row in {db_path}"
        ))),
    }
}

pub fn rank_counts(taxonomy: &Taxonomy) -> Vec<RankCount> {
    let mut counts = [0usize; 7];
    for (_, node) in taxonomy.iter() {
        if let Some(rank) = Rank::ALL.into_iter().find(|rank| rank.matches(node.rank())) {
            counts[rank.index()] += 1;
        }
    }
    Rank::ALL
        .into_iter()
        .map(|rank| RankCount {
            rank,
            taxa: counts[rank.index()],
        })
        .collect()
}

/// Seven-rank lineage of a stored taxon.
pub fn lookup_lineage(db_path: &Utf8Path, id: &TaxonId) -> Result<LineageResult, TaxTreeError> {
    let store = TaxonStore::open_existing(db_path)?;
    let (taxon, lineage) = store.lineage(id)?;
    let lineage = lineage
        .iter()
        .map(|(rank, row)| LineageEntry {
            rank,
            id: row.map(|row| row.id.clone()),
            name: row.and_then(|row| row.name.clone()),
        })
        .collect();
    Ok(LineageResult { taxon, lineage })
}
