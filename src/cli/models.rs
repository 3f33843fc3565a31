// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{HttpFetcher, ModelManifest, ModelStore};

/// Per-request timeout for artifact downloads
const FETCH_TIMEOUT: Duration = Duration::from_secs(3600);

/// Arguments for fetch-models command
#[derive(Args, Debug)]
pub struct FetchModelsArgs {
    /// TOML manifest with [[artifact]] entries (name, url, sha256)
    #[arg(long)]
    pub manifest: PathBuf,

    /// Directory holding downloaded artifacts
    #[arg(long, env = "ANNOTATE_MODEL_STORE", default_value = "./models")]
    pub model_store: PathBuf,

    /// Hide download progress bars
    #[arg(long)]
    pub no_progress: bool,
}

/// Make every artifact of `manifest` available under `store_root`
pub async fn prepare_artifacts(
    manifest: &Path,
    store_root: &Path,
    show_progress: bool,
) -> Result<BTreeMap<String, PathBuf>> {
    let manifest = ModelManifest::from_file(manifest)?;
    let fetcher = HttpFetcher::new(FETCH_TIMEOUT, show_progress)?;
    let store = ModelStore::new(store_root, manifest.artifacts, fetcher);
    store
        .ensure_all()
        .await
        .context("Failed to prepare model artifacts")
}

pub async fn fetch_models(args: FetchModelsArgs) -> Result<()> {
    println!("📦 Preparing model artifacts in {}", args.model_store.display());
    let resolved = prepare_artifacts(&args.manifest, &args.model_store, !args.no_progress).await?;
    for (name, path) in &resolved {
        println!("   ✅ {} -> {}", name, path.display());
    }
    Ok(())
}
