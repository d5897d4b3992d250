//! Download, decompress and persist one archive file
//!
//! For each URL:
//!
//! 1. Resolve the canonical output path; if it exists, skip without any
//!    network call.
//! 2. GET the URL and stream the body to the compressed intermediate
//!    (same directory, remote `.gz` name).
//! 3. Decompress on the blocking pool into a `.part` staging file, then
//!    rename it onto the canonical path.
//! 4. Delete the intermediate.
//!
//! On any failure the intermediate and the staging file are removed before
//! the error is returned, so a retry starts clean.

use flate2::read::MultiGzDecoder;
use futures_util::StreamExt;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::fetcher::{FetcherError, FetcherResult, HttpFetch};
use crate::output::csv::staging_path;
use crate::output::PathResolver;
use crate::resume::is_complete;
use crate::shutdown::{self, SharedShutdown};

/// Result of fetching one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The file was downloaded and decompressed
    Downloaded {
        /// Canonical output path
        path: PathBuf,
        /// Decompressed size in bytes
        bytes: u64,
    },
    /// The canonical output already existed
    Skipped {
        /// Canonical output path
        path: PathBuf,
    },
}

impl FetchOutcome {
    /// Canonical output path
    pub fn path(&self) -> &Path {
        match self {
            FetchOutcome::Downloaded { path, .. } | FetchOutcome::Skipped { path } => path,
        }
    }
}

/// Fetches archive URLs into the local mirror
#[derive(Clone)]
pub struct ArchiveFetcher {
    http: Arc<dyn HttpFetch>,
    resolver: PathResolver,
    shutdown: Option<SharedShutdown>,
}

impl ArchiveFetcher {
    /// Fetcher writing below the resolver's root
    pub fn new(http: Arc<dyn HttpFetch>, resolver: PathResolver) -> Self {
        Self {
            http,
            resolver,
            shutdown: None,
        }
    }

    /// Refuse new downloads once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Fetch one archive. Idempotent.
    pub async fn fetch(&self, url: &str) -> FetcherResult<FetchOutcome> {
        let target = self
            .resolver
            .resolve_archive(url)
            .map_err(|e| FetcherError::InvalidUrl(e.to_string()))?;

        if is_complete(&target) {
            debug!("Skipping {}, already present", target.display());
            return Ok(FetchOutcome::Skipped { path: target });
        }

        if shutdown::is_requested(self.shutdown.as_ref()) {
            return Err(FetcherError::Cancelled);
        }

        let compressed = self
            .resolver
            .compressed_path(url)
            .map_err(|e| FetcherError::InvalidUrl(e.to_string()))?;
        if compressed == target {
            return Err(FetcherError::InvalidUrl(format!(
                "{url}: not a .gz archive"
            )));
        }
        let staging = staging_path(&target);

        match self.download(url, &compressed, &staging, &target).await {
            Ok(bytes) => {
                remove_if_exists(&compressed).await;
                info!("Downloaded {} ({} bytes)", target.display(), bytes);
                Ok(FetchOutcome::Downloaded {
                    path: target,
                    bytes,
                })
            }
            Err(e) => {
                remove_if_exists(&compressed).await;
                remove_if_exists(&staging).await;
                Err(e)
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        compressed: &Path,
        staging: &Path,
        target: &Path,
    ) -> FetcherResult<u64> {
        let response = self.http.get(url).await?;
        if !response.is_success() {
            return Err(FetcherError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        if let Some(parent) = compressed.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FetcherError::IoError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = tokio::fs::File::create(compressed).await.map_err(|e| {
            FetcherError::IoError(format!("Failed to create {}: {}", compressed.display(), e))
        })?;

        let mut body = response.body;
        let mut downloaded = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            downloaded += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(|e| {
                FetcherError::IoError(format!("Failed to write {}: {}", compressed.display(), e))
            })?;
        }
        file.flush().await.map_err(|e| {
            FetcherError::IoError(format!("Failed to flush {}: {}", compressed.display(), e))
        })?;
        drop(file);

        debug!("Fetched {} compressed bytes from {}", downloaded, url);

        let (compressed, staging, target) = (
            compressed.to_path_buf(),
            staging.to_path_buf(),
            target.to_path_buf(),
        );
        tokio::task::spawn_blocking(move || decompress_file(&compressed, &staging, &target))
            .await
            .map_err(|e| FetcherError::IoError(format!("Decompression task failed: {e}")))?
    }
}

/// Decompress a (possibly multi-member) gzip file into `staging`, then rename
/// it onto `target`. Returns the decompressed size.
pub fn decompress_file(compressed: &Path, staging: &Path, target: &Path) -> FetcherResult<u64> {
    let input = std::fs::File::open(compressed).map_err(|e| {
        FetcherError::IoError(format!("Failed to open {}: {}", compressed.display(), e))
    })?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));

    let output = std::fs::File::create(staging).map_err(|e| {
        FetcherError::IoError(format!("Failed to create {}: {}", staging.display(), e))
    })?;
    let mut writer = BufWriter::new(output);

    let bytes = copy_decoded(&mut decoder, &mut writer, compressed, staging)?;

    let output = writer.into_inner().map_err(|e| {
        FetcherError::IoError(format!("Failed to flush {}: {}", staging.display(), e))
    })?;
    output.sync_all().map_err(|e| {
        FetcherError::IoError(format!("Failed to sync {}: {}", staging.display(), e))
    })?;
    drop(output);

    std::fs::rename(staging, target).map_err(|e| {
        FetcherError::IoError(format!(
            "Failed to move {} to {}: {}",
            staging.display(),
            target.display(),
            e
        ))
    })?;

    Ok(bytes)
}

/// Copy decoded bytes into `writer`.
///
/// Read failures mean a corrupt payload; write failures are filesystem errors.
fn copy_decoded<R: Read, W: Write>(
    decoder: &mut R,
    writer: &mut W,
    source: &Path,
    dest: &Path,
) -> FetcherResult<u64> {
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FetcherError::DecompressionError(format!(
                    "{}: {}",
                    source.display(),
                    e
                )))
            }
        };
        writer.write_all(&buf[..n]).map_err(|e| {
            FetcherError::IoError(format!("Failed to write {}: {}", dest.display(), e))
        })?;
        total += n as u64;
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
