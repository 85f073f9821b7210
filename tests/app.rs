use std::io::Write;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use zip::write::SimpleFileOptions;

use taxtree::app::{App, Phase, ProgressEvent, ProgressSink, load_archive, lookup_lineage};
use taxtree::config::LoadConfig;
use taxtree::domain::Rank;
use taxtree::download::{DownloadProgress, TaxdumpClient};
use taxtree::error::TaxTreeError;
use taxtree::output::JsonOutput;
use taxtree::store::{TaxonStore, read_metadata};

const NAMES: &str = "1\t|\troot\t|\t\t|\tscientific name\t|\n\
                     2759\t|\tEukaryota\t|\t\t|\tscientific name\t|\n\
                     33208\t|\tMetazoa\t|\t\t|\tscientific name\t|\n\
                     33208\t|\tAnimalia\t|\t\t|\tsynonym\t|\n\
                     7711\t|\tChordata\t|\t\t|\tscientific name\t|\n\
                     40674\t|\tMammalia\t|\t\t|\tscientific name\t|\n\
                     9443\t|\tPrimates\t|\t\t|\tscientific name\t|\n\
                     9604\t|\tHominidae\t|\t\t|\tscientific name\t|\n\
                     9605\t|\tHomo\t|\t\t|\tscientific name\t|\n\
                     9606\t|\tHomo sapiens\t|\t\t|\tscientific name\t|\n\
                     9606\t|\thuman\t|\t\t|\tgenbank common name\t|\n";

const NODES: &str = "9606\t|\t9605\t|\tspecies\t|\tHS\t|\n\
                     9605\t|\t9604\t|\tgenus\t|\t\t|\n\
                     9604\t|\t9443\t|\tfamily\t|\t\t|\n\
                     9443\t|\t40674\t|\torder\t|\t\t|\n\
                     40674\t|\t7711\t|\tclass\t|\t\t|\n\
                     7711\t|\t33208\t|\tphylum\t|\t\t|\n\
                     33208\t|\t2759\t|\tkingdom\t|\t\t|\n\
                     2759\t|\t131567\t|\tsuperkingdom\t|\t\t|\n\
                     131567\t|\t1\t|\tno rank\t|\t\t|\n\
                     1\t|\t1\t|\tno rank\t|\t\t|\n";

fn write_taxdump(path: &Utf8Path, names: &str, nodes: &str) {
    std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
    let file = std::fs::File::create(path.as_std_path()).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("names.dmp", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(names.as_bytes()).unwrap();
    writer
        .start_file("nodes.dmp", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(nodes.as_bytes()).unwrap();
    writer.finish().unwrap();
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn config(root: &Utf8Path, offline: bool) -> LoadConfig {
    LoadConfig {
        cache_dir: root.join("cache"),
        db_path: root.join("db").join("taxtree.db"),
        source_url: "https://example.invalid/taxdmp.zip".to_string(),
        offline,
    }
}

#[derive(Default)]
struct MockClient {
    calls: Arc<Mutex<usize>>,
}

impl TaxdumpClient for MockClient {
    fn download(
        &self,
        _url: &str,
        destination: &Utf8Path,
        progress: DownloadProgress<'_>,
    ) -> Result<u64, TaxTreeError> {
        *self.calls.lock().unwrap() += 1;
        write_taxdump(destination, NAMES, NODES);
        let size = std::fs::metadata(destination.as_std_path()).unwrap().len();
        progress(size, Some(size));
        Ok(size)
    }
}

struct FailingClient;

impl TaxdumpClient for FailingClient {
    fn download(
        &self,
        _url: &str,
        _destination: &Utf8Path,
        _progress: DownloadProgress<'_>,
    ) -> Result<u64, TaxTreeError> {
        Err(TaxTreeError::Http("network disabled".to_string()))
    }
}

#[derive(Default)]
struct RecordingSink {
    phases: Mutex<Vec<Phase>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.phases.lock().unwrap().push(event.phase);
    }
}

#[test]
fn load_downloads_missing_archive() {
    let (_temp, root) = temp_root();
    let config = config(&root, false);
    let client = MockClient::default();
    let calls = Arc::clone(&client.calls);
    let app = App::new(client);
    let sink = RecordingSink::default();

    let report = app.load(&config, &sink).unwrap();
    assert!(report.downloaded);
    assert_eq!(report.taxa, 10);
    assert_eq!(report.named, 9);
    assert_eq!(report.missing_names, 1);
    assert_eq!(report.duplicate_names, 0);
    assert_eq!(report.root, "1");
    assert_eq!(report.rank_counts[Rank::Family.index()].taxa, 1);
    assert_eq!(*calls.lock().unwrap(), 1);

    let phases = sink.phases.lock().unwrap();
    assert_eq!(phases.first(), Some(&Phase::Fetch));
    assert!(phases.contains(&Phase::Persist));
    assert_eq!(phases.last(), Some(&Phase::Verify));

    let metadata = read_metadata(&config.metadata_path()).unwrap();
    assert_eq!(metadata.taxa, 10);
    assert_eq!(metadata.source, config.source_url);

    let result = lookup_lineage(&config.db_path, &"9606".parse().unwrap()).unwrap();
    assert_eq!(result.taxon.name.as_deref(), Some("Homo sapiens"));
    let names = result
        .lineage
        .iter()
        .map(|entry| entry.name.as_deref().unwrap_or(""))
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["Metazoa", "Chordata", "Mammalia", "Primates", "Hominidae", "Homo", "Homo sapiens"]
    );
}

#[test]
fn cached_archive_skips_download() {
    let (_temp, root) = temp_root();
    let config = config(&root, false);
    write_taxdump(&config.archive_path(), NAMES, NODES);

    let report = App::new(FailingClient).load(&config, &JsonOutput).unwrap();
    assert!(!report.downloaded);
    assert_eq!(report.taxa, 10);
}

#[test]
fn offline_without_archive_fails() {
    let (_temp, root) = temp_root();
    let config = config(&root, true);

    let err = App::new(MockClient::default())
        .load(&config, &JsonOutput)
        .unwrap_err();
    assert_matches!(err, TaxTreeError::ArchiveMissing(_));
    assert!(!config.db_path.as_std_path().exists());
}

#[test]
fn download_failure_propagates() {
    let (_temp, root) = temp_root();
    let config = config(&root, false);

    let err = App::new(FailingClient).load(&config, &JsonOutput).unwrap_err();
    assert_matches!(err, TaxTreeError::Http(_));
    assert!(!config.archive_path().as_std_path().exists());
}

#[test]
fn structural_error_keeps_previous_store() {
    let (_temp, root) = temp_root();
    let archive = root.join("taxdmp.zip");
    let db_path = root.join("taxtree.db");

    write_taxdump(&archive, NAMES, NODES);
    load_archive(&archive, &db_path, &JsonOutput).unwrap();

    let broken_nodes = format!("{NODES}3\t|\t99\t|\tgenus\t|\t\t|\n");
    write_taxdump(&archive, NAMES, &broken_nodes);
    let err = load_archive(&archive, &db_path, &JsonOutput).unwrap_err();
    assert!(err.is_structural());
    assert_matches!(
        err,
        TaxTreeError::DanglingParent { id, parent_id } if id == "3" && parent_id == "99"
    );

    let store = TaxonStore::open_existing(&db_path).unwrap();
    assert_eq!(store.count().unwrap(), 10);
}

#[test]
fn archive_without_names_entry_is_rejected() {
    let (_temp, root) = temp_root();
    let archive = root.join("taxdmp.zip");
    let file = std::fs::File::create(archive.as_std_path()).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("nodes.dmp", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(NODES.as_bytes()).unwrap();
    writer.finish().unwrap();

    let err = load_archive(&archive, &root.join("taxtree.db"), &JsonOutput).unwrap_err();
    assert_matches!(err, TaxTreeError::ArchiveEntry { entry, .. } if entry == "names.dmp");
}

fn write_truncated_archive(path: &Utf8Path) {
    write_taxdump(path, NAMES, NODES);
    let bytes = std::fs::read(path.as_std_path()).unwrap();
    std::fs::write(path.as_std_path(), &bytes[..bytes.len() / 2]).unwrap();
}

#[test]
fn truncated_cached_archive_is_downloaded_again() {
    let (_temp, root) = temp_root();
    let config = config(&root, false);
    write_truncated_archive(&config.archive_path());

    let client = MockClient::default();
    let calls = Arc::clone(&client.calls);
    let report = App::new(client).load(&config, &JsonOutput).unwrap();
    assert!(report.downloaded);
    assert_eq!(report.taxa, 10);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn truncated_cached_archive_fails_offline() {
    let (_temp, root) = temp_root();
    let config = config(&root, true);
    write_truncated_archive(&config.archive_path());

    let err = App::new(MockClient::default())
        .load(&config, &JsonOutput)
        .unwrap_err();
    assert_matches!(err, TaxTreeError::Archive(_));
    assert!(!config.db_path.as_std_path().exists());
}

#[test]
fn metadata_failure_does_not_fail_load() {
    let (_temp, root) = temp_root();
    let config = config(&root, false);
    write_taxdump(&config.archive_path(), NAMES, NODES);
    // A directory where the sidecar file should go cannot be replaced by a file.
    std::fs::create_dir_all(config.metadata_path().as_std_path()).unwrap();

    let report = App::new(FailingClient).load(&config, &JsonOutput).unwrap();
    assert_eq!(report.taxa, 10);
    let store = TaxonStore::open_existing(&config.db_path).unwrap();
    assert_eq!(store.count().unwrap(), 10);
    assert!(read_metadata(&config.metadata_path()).is_err());
}
