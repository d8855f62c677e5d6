use crate::feed::FeedError;
use std::path::{Path, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::debug;

/// Copies the feed at `url` to `target` and returns the byte count.
/// `http(s)://` is streamed; `file://` and plain paths are copied.
pub async fn fetch(client: &reqwest::Client, url: &str, target: &Path) -> Result<u64, FeedError> {
    match local_path(url) {
        Some(path) => copy_local(&path, target).await,
        None => fetch_http(client, url, target).await,
    }
}

fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(rest) = url.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }
    Some(PathBuf::from(url))
}

async fn copy_local(source: &Path, target: &Path) -> Result<u64, FeedError> {
    debug!(path = %source.display(), "Copying local feed");
    tokio::fs::copy(source, target).await.map_err(|e| {
        FeedError::SourceUnavailable(format!("cannot read {}: {e}", source.display()))
    })
}

async fn fetch_http(client: &reqwest::Client, url: &str, target: &Path) -> Result<u64, FeedError> {
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid url>".to_string());
    debug!(host = %host, "Downloading feed");

    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FeedError::SourceUnavailable(format!("request to {host} failed: {}", e.without_url())))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::SourceUnavailable(format!(
            "{host} answered with HTTP {status}"
        )));
    }

    let mut file = File::create(target).await?;
    let mut bytes = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FeedError::SourceUnavailable(format!("download from {host} interrupted: {}", e.without_url())))?
    {
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_local_sources() {
        assert_eq!(local_path("file:///tmp/a.csv"), Some(PathBuf::from("/tmp/a.csv")));
        assert_eq!(local_path("./feeds/a.csv"), Some(PathBuf::from("./feeds/a.csv")));
        assert_eq!(local_path("https://example.com/a.csv"), None);
    }
}
