// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotator interface
//!
//! An annotator turns one item into a payload string (a tag list or a
//! caption). The pipeline never looks inside an item; it only hands the
//! item to the annotator a worker owns and forwards whatever comes back.
//!
//! Annotators are loaded once per worker through an [`AnnotatorFactory`],
//! bound to the [`Device`] the worker was assigned, so an expensive model
//! load is paid once per partition rather than once per item.

pub mod subprocess;

pub use subprocess::{CommandAnnotator, CommandAnnotatorFactory};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::pipeline::Item;

/// Compute resource a worker's annotator is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    Gpu(u32),
}

impl Device {
    /// Device for worker `index` given the configured device list.
    ///
    /// Workers are assigned round-robin; an empty list means CPU for all.
    pub fn for_worker(devices: &[Device], index: usize) -> Device {
        if devices.is_empty() {
            Device::Cpu
        } else {
            devices[index % devices.len()]
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Gpu(_))
    }

    /// Parse a comma-separated device list such as `cpu` or `0,1,cuda:2`
    pub fn parse_list(list: &str) -> Result<Vec<Device>, DeviceParseError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Device::from_str)
            .collect()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(id) => write!(f, "cuda:{}", id),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid device '{0}': expected 'cpu', a GPU index or 'cuda:<index>'")]
pub struct DeviceParseError(pub String);

impl FromStr for Device {
    type Err = DeviceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        if lowered == "cpu" {
            return Ok(Device::Cpu);
        }
        let index = lowered
            .strip_prefix("cuda:")
            .or_else(|| lowered.strip_prefix("gpu:"))
            .unwrap_or(&lowered);
        index
            .parse::<u32>()
            .map(Device::Gpu)
            .map_err(|_| DeviceParseError(s.to_string()))
    }
}

impl TryFrom<String> for Device {
    type Error = DeviceParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// Per-item annotation failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotateError {
    /// The item could not be read or decoded. The item is skipped.
    #[error("Unreadable item: {0}")]
    Unreadable(String),
    /// Inference failed for this item. The worker moves on to the next one.
    #[error("Inference failed: {0}")]
    Inference(String),
    /// The annotator instance is unusable; no further item can be processed.
    #[error("Annotator unusable: {0}")]
    Fatal(String),
}

/// One loaded annotator, owned by exactly one worker
pub trait Annotator: Send {
    fn annotate(&mut self, item: &Item) -> Result<String, AnnotateError>;

    /// Annotate several items in one call.
    ///
    /// Must return exactly one outcome per input item, in input order. The
    /// default runs [`Annotator::annotate`] on each item and stops after the
    /// first fatal error, reporting the rest of the batch as fatal too.
    fn annotate_batch(&mut self, items: &[Item]) -> Vec<Result<String, AnnotateError>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            if let Some(Err(AnnotateError::Fatal(reason))) = outcomes.last() {
                let reason = reason.clone();
                outcomes.push(Err(AnnotateError::Fatal(reason)));
                continue;
            }
            outcomes.push(self.annotate(item));
        }
        outcomes
    }
}

/// Loads annotators for workers
pub trait AnnotatorFactory: Send + Sync + 'static {
    type Annotator: Annotator;

    fn load(&self, device: Device) -> anyhow::Result<Self::Annotator>;
}
