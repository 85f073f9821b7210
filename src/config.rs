use std::fs;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::archive::TAXDUMP_ARCHIVE;
use crate::download::DEFAULT_SOURCE_URL;
use crate::error::TaxTreeError;

pub const CONFIG_FILE_NAME: &str = "taxtree.json";
pub const DEFAULT_DB_PATH: &str = "./taxtree.db";
/// Environment variable the CLI reads for the database path.
pub const DB_PATH_ENV: &str = "TAX_TREE_DBFILE";

/// On-disk config file. Every key is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Values given on the command line; they take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<Utf8PathBuf>,
    pub cache_dir: Option<Utf8PathBuf>,
    pub source_url: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub cache_dir: Utf8PathBuf,
    pub db_path: Utf8PathBuf,
    pub source_url: String,
    pub offline: bool,
}

impl LoadConfig {
    pub fn archive_path(&self) -> Utf8PathBuf {
        self.cache_dir.join(TAXDUMP_ARCHIVE)
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.json", self.db_path))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `taxtree.json` in the working directory when no path is
    /// given. Only an explicitly named file has to exist.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<LoadConfig, TaxTreeError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(CONFIG_FILE_NAME),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default(), overrides);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| TaxTreeError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TaxTreeError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<LoadConfig, TaxTreeError> {
        let db_path = overrides
            .db_path
            .or_else(|| config.db_path.map(Utf8PathBuf::from))
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DB_PATH));

        let cache_dir = match overrides
            .cache_dir
            .or_else(|| config.cache_dir.map(Utf8PathBuf::from))
        {
            Some(dir) => dir,
            None => default_cache_dir()?,
        };

        let source_url = overrides
            .source_url
            .or(config.source_url)
            .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());

        Ok(LoadConfig {
            cache_dir,
            db_path,
            source_url,
            offline: overrides.offline,
        })
    }
}

/// `~/.cache/taxtree`
pub fn default_cache_dir() -> Result<Utf8PathBuf, TaxTreeError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("taxtree")).ok()
        })
        .ok_or_else(|| TaxTreeError::Filesystem("unable to resolve cache directory".to_string()))
}
