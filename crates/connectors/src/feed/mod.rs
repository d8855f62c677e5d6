use crate::file::error::FileError;
use chunks::FeedChunks;
use model::{
    core::identifiers::RunId,
    execution::connection::FeedSource,
    records::feed::FeedRecord,
};
use scratch::ScratchDir;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::info;

pub mod chunks;
pub mod download;
pub mod scratch;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Feed unreachable, empty or corrupt. Aborts the run.
    #[error("Feed source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Scratch storage error: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Downloads feeds into per-run scratch storage and splits them into chunk
/// files.
#[derive(Clone)]
pub struct FeedIngestor {
    client: reqwest::Client,
    scratch_root: PathBuf,
}

impl FeedIngestor {
    pub fn new(scratch_root: impl Into<PathBuf>, download_timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, scratch_root))
    }

    pub fn with_client(client: reqwest::Client, scratch_root: impl Into<PathBuf>) -> Self {
        FeedIngestor {
            client,
            scratch_root: scratch_root.into(),
        }
    }

    /// Creates the run's scratch directory. It is removed when the last
    /// handle is dropped.
    pub fn scratch_for(&self, run_id: &RunId) -> Result<ScratchDir, FeedError> {
        Ok(ScratchDir::create(self.scratch_root.join(run_id.as_str()))?)
    }

    /// Fetches the feed into `scratch` and returns the local file path.
    pub async fn download(&self, source: &FeedSource, scratch: &ScratchDir) -> Result<PathBuf, FeedError> {
        let target = scratch.path().join(format!("feed.{}", source.format.extension()));
        let bytes = download::fetch(&self.client, &source.url, &target).await?;
        if bytes == 0 {
            return Err(FeedError::SourceUnavailable("downloaded feed is empty".into()));
        }

        info!(bytes, path = %target.display(), "Feed downloaded");
        Ok(target)
    }

    /// Lazily splits a downloaded feed into chunk files of at most
    /// `chunk_size` records. The first record is read eagerly so an empty or
    /// unreadable feed fails here, before any chunk exists.
    pub fn chunks(
        &self,
        feed_path: &Path,
        source: &FeedSource,
        run_id: &RunId,
        chunk_size: usize,
        scratch: &ScratchDir,
    ) -> Result<FeedChunks, FeedError> {
        let mut records = crate::file::open_records(feed_path, source)
            .map_err(|e| FeedError::SourceUnavailable(format!("cannot parse feed: {e}")))?;

        let first = match records.next() {
            None => {
                return Err(FeedError::SourceUnavailable("feed contains no records".into()));
            }
            Some(Err(e)) => {
                return Err(FeedError::SourceUnavailable(format!("corrupt feed: {e}")));
            }
            Some(Ok(record)) => record,
        };

        let dir = scratch.path().join("chunks");
        std::fs::create_dir_all(&dir)?;

        Ok(FeedChunks::new(records, first, run_id.clone(), dir, chunk_size))
    }
}

/// Loads the records of one materialised chunk.
pub fn read_chunk(path: &Path) -> Result<Vec<FeedRecord>, FileError> {
    let file = File::open(path).map_err(|_| FileError::NotFound(path.display().to_string()))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
