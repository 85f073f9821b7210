use std::fs;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{info, warn};

use crate::error::TaxTreeError;
use crate::store::parent_dir;

pub const DEFAULT_SOURCE_URL: &str = "https://ftp.ncbi.nlm.nih.gov/pub/taxonomy/taxdmp.zip";

const CHUNK_SIZE: usize = 64 * 1024;

/// Byte counts reported while a download is in flight: `(downloaded, total)`.
pub type DownloadProgress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

pub trait TaxdumpClient: Send + Sync {
    /// Fetches `url` into `destination`, returning the number of bytes written.
    fn download(
        &self,
        url: &str,
        destination: &Utf8Path,
        progress: DownloadProgress<'_>,
    ) -> Result<u64, TaxTreeError>;
}

#[derive(Clone)]
pub struct TaxdumpHttpClient {
    client: Client,
}

impl TaxdumpHttpClient {
    pub fn new() -> Result<Self, TaxTreeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("taxtree/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TaxTreeError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30 * 60))
            .build()
            .map_err(|err| TaxTreeError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, TaxTreeError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        warn!(status, attempt, "retrying taxonomy download");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        warn!(error = %err, attempt, "retrying taxonomy download");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(TaxTreeError::Http(err.to_string()));
                }
            }
        }
    }
}

impl TaxdumpClient for TaxdumpHttpClient {
    fn download(
        &self,
        url: &str,
        destination: &Utf8Path,
        progress: DownloadProgress<'_>,
    ) -> Result<u64, TaxTreeError> {
        info!(%url, "downloading taxonomy dump");
        let mut response = self.send_with_retries(url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "taxonomy download failed".to_string());
            return Err(TaxTreeError::HttpStatus { status, message });
        }
        let total = response.content_length();
        write_atomic(destination, |file| {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            let mut downloaded = 0u64;
            loop {
                let read = response
                    .read(&mut buffer)
                    .map_err(|err| TaxTreeError::Http(err.to_string()))?;
                if read == 0 {
                    break;
                }
                file.write_all(&buffer[..read])
                    .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
                downloaded += read as u64;
                progress(downloaded, total);
            }
            Ok(downloaded)
        })
    }
}

/// Streams into a temp file beside `destination`, renaming it into place
/// only after `write` succeeds.
pub fn write_atomic<F>(destination: &Utf8Path, write: F) -> Result<u64, TaxTreeError>
where
    F: FnOnce(&mut fs::File) -> Result<u64, TaxTreeError>,
{
    let parent = parent_dir(destination);
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".taxtree-download")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    let written = write(temp.as_file_mut())?;
    temp.as_file_mut()
        .flush()
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    temp.persist(destination.as_std_path())
        .map_err(|err| TaxTreeError::Filesystem(err.to_string()))?;
    Ok(written)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
