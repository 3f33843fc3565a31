// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pipeline configuration
//!
//! Values are layered: defaults, then an optional TOML file, then
//! `ANNOTATE_*` environment variables, then command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::annotators::Device;
use crate::pipeline::{CompletionMode, PrefixJoin};

pub const DEFAULT_OUTPUT_FILE: &str = "metadata.jsonl";

/// Worker count used when neither a parallelism nor GPU devices are given
pub const DEFAULT_PARALLELISM: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Where annotation records go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Stdout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dataset root; output file names are relative to it
    pub root: PathBuf,
    /// Explicit output file; defaults to `<root>/metadata.jsonl`
    pub output: Option<PathBuf>,
    pub parallelism: Option<usize>,
    pub devices: Vec<Device>,
    pub batch_size: usize,
    /// `None` keeps the result channel unbounded
    pub channel_capacity: Option<usize>,
    pub completion: CompletionMode,
    pub poll_interval_ms: u64,
    pub prefix: PrefixJoin,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            output: None,
            parallelism: None,
            devices: Vec::new(),
            batch_size: 1,
            channel_capacity: None,
            completion: CompletionMode::Sentinel,
            poll_interval_ms: 5,
            prefix: PrefixJoin::default(),
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `ANNOTATE_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("ANNOTATE_PARALLELISM") {
            match val.parse() {
                Ok(num) => self.parallelism = Some(num),
                Err(_) => warn!("Ignoring invalid ANNOTATE_PARALLELISM: {}", val),
            }
        }

        if let Ok(val) = std::env::var("ANNOTATE_DEVICES") {
            match Device::parse_list(&val) {
                Ok(devices) => self.devices = devices,
                Err(e) => warn!("Ignoring ANNOTATE_DEVICES: {}", e),
            }
        }

        if let Ok(val) = std::env::var("ANNOTATE_BATCH_SIZE") {
            match val.parse() {
                Ok(num) => self.batch_size = num,
                Err(_) => warn!("Ignoring invalid ANNOTATE_BATCH_SIZE: {}", val),
            }
        }

        if let Ok(val) = std::env::var("ANNOTATE_CHANNEL_CAPACITY") {
            match val.parse() {
                Ok(num) => self.channel_capacity = Some(num),
                Err(_) => warn!("Ignoring invalid ANNOTATE_CHANNEL_CAPACITY: {}", val),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero { field: "batch_size" });
        }
        if self.parallelism == Some(0) {
            return Err(ConfigError::Zero { field: "parallelism" });
        }
        if self.channel_capacity == Some(0) {
            return Err(ConfigError::Zero {
                field: "channel_capacity",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero {
                field: "poll_interval_ms",
            });
        }
        Ok(())
    }

    /// Worker count for `item_count` items, never more than the items
    pub fn resolve_parallelism(&self, item_count: usize) -> usize {
        let wanted = match self.parallelism {
            Some(parallelism) => parallelism,
            None if self.devices.iter().any(Device::is_gpu) => self.devices.len(),
            None => DEFAULT_PARALLELISM,
        };
        wanted.max(1).min(item_count)
    }

    /// A single item with no explicit output path is printed to stdout
    pub fn output_target(&self, item_count: usize) -> OutputTarget {
        match &self.output {
            Some(path) => OutputTarget::File(path.clone()),
            None if item_count == 1 => OutputTarget::Stdout,
            None => OutputTarget::File(self.root.join(DEFAULT_OUTPUT_FILE)),
        }
    }
}
