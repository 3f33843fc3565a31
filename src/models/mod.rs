// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Content-addressed model store
//!
//! Annotators may need model artifacts (weights, tag tables) before their
//! first use. The store maps artifact names to a URL and an expected SHA-256
//! digest, keeps the files under an explicit root directory, and makes sure
//! every artifact is present and intact before any worker starts.

pub mod downloading;
pub mod validation;

pub use downloading::{Fetcher, HttpFetcher};
pub use validation::{calculate_checksum, verify_checksum};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Checksum mismatch for {name} - expected: {expected}, actual: {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),
    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },
}

/// One entry of the digest table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub url: String,
    pub sha256: String,
    /// File name inside the store; defaults to the last URL segment
    #[serde(default)]
    pub file_name: Option<String>,
}

impl ArtifactSpec {
    pub fn local_file_name(&self) -> String {
        if let Some(name) = &self.file_name {
            return name.clone();
        }
        self.url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }
}

/// TOML manifest: a list of `[[artifact]]` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactSpec>,
}

impl ModelManifest {
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        let manifest: Self = toml::from_str(&content).map_err(|e| StoreError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut seen = std::collections::HashSet::new();
        for artifact in &manifest.artifacts {
            if !seen.insert(artifact.name.as_str()) {
                return Err(StoreError::InvalidManifest {
                    path: path.to_path_buf(),
                    reason: format!("duplicate artifact name '{}'", artifact.name),
                });
            }
        }
        Ok(manifest)
    }
}

pub struct ModelStore<F = HttpFetcher> {
    root: PathBuf,
    artifacts: BTreeMap<String, ArtifactSpec>,
    fetcher: F,
}

impl<F: Fetcher> ModelStore<F> {
    pub fn new(root: impl Into<PathBuf>, artifacts: Vec<ArtifactSpec>, fetcher: F) -> Self {
        Self {
            root: root.into(),
            artifacts: artifacts
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
            fetcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn local_path(&self, spec: &ArtifactSpec) -> PathBuf {
        self.root.join(spec.local_file_name())
    }

    pub async fn verify(&self, path: &Path, expected_sha256: &str) -> Result<bool, StoreError> {
        verify_checksum(path, expected_sha256).await
    }

    /// Fetch `url` into the store root and return the local path
    pub async fn fetch(&self, url: &str, file_name: &str) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", self.root.display(), e)))?;
        let dest = self.root.join(file_name);
        self.fetcher.fetch(url, &dest).await?;
        Ok(dest)
    }

    /// Make sure artifact `name` is present and intact, fetching it if needed.
    ///
    /// Two digest mismatches abort: a stale cached file counts as the first,
    /// so it gets one re-fetch; a missing file gets a fetch and one retry.
    pub async fn ensure(&self, name: &str) -> Result<PathBuf, StoreError> {
        let spec = self
            .artifacts
            .get(name)
            .ok_or_else(|| StoreError::UnknownArtifact(name.to_string()))?;
        let path = self.local_path(spec);

        let mut mismatches = 0;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if self.verify(&path, &spec.sha256).await? {
                info!("Using cached artifact {} at {}", name, path.display());
                return Ok(path);
            }
            warn!("Artifact {} failed verification, re-fetching", name);
            remove_if_present(&path).await?;
            mismatches += 1;
        }

        let file_name = spec.local_file_name();
        loop {
            let fetched = self.fetch(&spec.url, &file_name).await?;
            if self.verify(&fetched, &spec.sha256).await? {
                info!("Artifact {} ready at {}", name, fetched.display());
                return Ok(fetched);
            }

            let actual = calculate_checksum(&fetched).await?;
            remove_if_present(&fetched).await?;
            mismatches += 1;
            if mismatches >= 2 {
                return Err(StoreError::ChecksumMismatch {
                    name: name.to_string(),
                    expected: spec.sha256.clone(),
                    actual,
                });
            }
            warn!("Fetched artifact {} has digest {}, retrying once", name, actual);
        }
    }

    /// Ensure every artifact in the table; stops at the first failure
    pub async fn ensure_all(&self) -> Result<BTreeMap<String, PathBuf>, StoreError> {
        let mut resolved = BTreeMap::new();
        for name in self.artifacts.keys() {
            let path = self.ensure(name).await?;
            resolved.insert(name.clone(), path);
        }
        Ok(resolved)
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(format!("{}: {}", path.display(), e))),
    }
}
