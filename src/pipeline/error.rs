// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("No items to annotate")]
    NoItems,
    #[error("Failed to resolve the working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
    #[error("Failed to open output {path}: {source}")]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write output: {0}")]
    OutputWrite(#[source] std::io::Error),
    #[error("Failed to encode output record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to spawn worker {worker}: {source}")]
    SpawnWorker {
        worker: usize,
        #[source]
        source: std::io::Error,
    },
}
