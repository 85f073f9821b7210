use std::fs::File;
use std::io::{self, BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::TaxTreeError;

/// Name of the dump archive inside the cache directory.
pub const TAXDUMP_ARCHIVE: &str = "taxdmp.zip";

/// Read access to the entries of a taxonomy dump zip.
pub struct TaxdumpArchive {
    path: Utf8PathBuf,
    archive: ZipArchive<File>,
}

impl TaxdumpArchive {
    pub fn open(path: &Utf8Path) -> Result<Self, TaxTreeError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| TaxTreeError::Filesystem(format!("open zip {path}: {err}")))?;
        let archive = ZipArchive::new(file)
            .map_err(|err| TaxTreeError::Archive(format!("{path}: {err}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Buffered stream over the named entry. The entry is decompressed as it is read.
    pub fn entry(&mut self, name: &str) -> Result<impl BufRead + '_, TaxTreeError> {
        match self.archive.by_name(name) {
            Ok(file) => Ok(BufReader::new(file)),
            Err(ZipError::FileNotFound) => Err(TaxTreeError::ArchiveEntry {
                archive: self.path.clone(),
                entry: name.to_string(),
            }),
            Err(err) => Err(TaxTreeError::Archive(format!("{}: {err}", self.path))),
        }
    }

    /// Fails unless every named entry is present and decompresses cleanly.
    pub fn validate(&mut self, entries: &[&str]) -> Result<(), TaxTreeError> {
        let path = self.path.clone();
        for name in entries {
            let mut reader = self.entry(name)?;
            io::copy(&mut reader, &mut io::sink()).map_err(|err| {
                TaxTreeError::Archive(format!("{path}: entry {name}: {err}"))
            })?;
        }
        Ok(())
    }
}
