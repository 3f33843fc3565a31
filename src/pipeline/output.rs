// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! JSONL output writer
//!
//! Every annotation becomes one line `{"file_name": ..., "text": ...}` where
//! `file_name` is relative to the dataset root. Lines are flushed as soon as
//! they are written so a crash loses nothing that was already reported.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::channel::Annotation;
use super::error::PipelineError;

pub const DEFAULT_PREFIX_SEPARATOR: &str = ", ";

/// One line of the output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub file_name: String,
    pub text: String,
}

/// How a common description is combined with each generated payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixJoin {
    pub text: Option<String>,
    pub separator: String,
}

impl Default for PrefixJoin {
    fn default() -> Self {
        Self {
            text: None,
            separator: DEFAULT_PREFIX_SEPARATOR.to_string(),
        }
    }
}

impl PrefixJoin {
    pub fn new(text: Option<String>, separator: impl Into<String>) -> Self {
        Self {
            text,
            separator: separator.into(),
        }
    }

    pub fn apply(&self, payload: &str) -> String {
        match &self.text {
            Some(prefix) => format!("{}{}{}", prefix, self.separator, payload),
            None => payload.to_string(),
        }
    }
}

/// Make `path` absolute against `base` and fold `.` and `..` lexically
fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Express item paths relative to a dataset root
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    root: PathBuf,
}

impl PathNormalizer {
    /// `cwd` anchors a relative root
    pub fn new(root: &Path, cwd: &Path) -> Self {
        Self {
            root: absolutize(root, cwd),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative items are taken to be relative to the root already
    pub fn relative_name(&self, item: &Path) -> String {
        let item = absolutize(item, &self.root);

        let root_parts: Vec<Component> = self.root.components().collect();
        let item_parts: Vec<Component> = item.components().collect();
        let common = root_parts
            .iter()
            .zip(item_parts.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<String> = Vec::new();
        for _ in common..root_parts.len() {
            parts.push("..".to_string());
        }
        for part in &item_parts[common..] {
            parts.push(part.as_os_str().to_string_lossy().into_owned());
        }

        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }
}

/// Append-only JSONL sink owned by the collector
pub struct OutputWriter<W> {
    sink: W,
    normalizer: PathNormalizer,
    prefix: PrefixJoin,
    written: usize,
}

impl<W: AsyncWrite + Unpin> OutputWriter<W> {
    pub fn new(sink: W, normalizer: PathNormalizer, prefix: PrefixJoin) -> Self {
        Self {
            sink,
            normalizer,
            prefix,
            written: 0,
        }
    }

    pub fn record_for(&self, annotation: &Annotation) -> MetadataRecord {
        MetadataRecord {
            file_name: self.normalizer.relative_name(annotation.item.path()),
            text: self.prefix.apply(&annotation.text),
        }
    }

    /// Write one line and flush it
    pub async fn write(&mut self, annotation: &Annotation) -> Result<MetadataRecord, PipelineError> {
        let record = self.record_for(annotation);
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        self.sink
            .write_all(&line)
            .await
            .map_err(PipelineError::OutputWrite)?;
        self.sink.flush().await.map_err(PipelineError::OutputWrite)?;
        self.written += 1;
        Ok(record)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
