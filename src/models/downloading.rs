// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::StoreError;

/// Retrieves an artifact from `url` into `dest`
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the number of bytes written
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, show_progress: bool) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self {
            client,
            show_progress,
        })
    }

    fn progress_bar(&self, total: Option<u64>, name: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes} ({bytes_per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(format!("Downloading {}", name));
        bar
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StoreError> {
        info!("Fetching {} -> {}", url, dest.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StoreError::Network(format!("{}: {}", url, e)))?;

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_string());
        let progress = self.progress_bar(response.content_length(), &name);

        let partial = partial_path(dest);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", partial.display(), e)))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StoreError::Network(format!("{}: {}", url, e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| StoreError::Io(format!("{}: {}", partial.display(), e)))?;
            written += chunk.len() as u64;
            progress.set_position(written);
        }
        file.flush()
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", partial.display(), e)))?;
        drop(file);

        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", dest.display(), e)))?;
        progress.finish_and_clear();
        debug!("Fetched {} bytes from {}", written, url);
        Ok(written)
    }
}
