// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fan-out/fan-in annotation pipeline
//!
//! The item list is split into contiguous partitions, one worker thread is
//! started per partition, and a single collector running on the async
//! runtime drains the shared result channel into a JSONL file while
//! advancing a progress bar.

pub mod channel;
pub mod collector;
pub mod error;
pub mod item;
pub mod output;
pub mod splitter;
pub mod worker;

pub use channel::{
    result_channel, Annotation, ResultReceiver, ResultSender, TryRecv, WorkerEvent, WorkerReport,
};
pub use collector::{Collector, CompletionMode, ItemIssue, RunSummary};
pub use error::PipelineError;
pub use item::{dedup_items, Item, Partition};
pub use output::{MetadataRecord, OutputWriter, PathNormalizer, PrefixJoin};
pub use splitter::{partition_count, split_items};
pub use worker::{run_worker, spawn_worker, Liveness, WorkerHandle, WorkerSpec};

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

use crate::annotators::{AnnotatorFactory, Device};
use crate::config::{OutputTarget, PipelineConfig};

pub struct Pipeline<F> {
    config: PipelineConfig,
    factory: Arc<F>,
}

impl<F: AnnotatorFactory> Pipeline<F> {
    pub fn new(config: PipelineConfig, factory: F) -> Result<Self, PipelineError> {
        Self::with_shared_factory(config, Arc::new(factory))
    }

    pub fn with_shared_factory(
        config: PipelineConfig,
        factory: Arc<F>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, factory })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Annotate `items`, writing to the configured output target
    pub async fn run(&self, items: Vec<Item>) -> Result<RunSummary, PipelineError> {
        let items = dedup_items(items);
        if items.is_empty() {
            return Err(PipelineError::NoItems);
        }
        match self.config.output_target(items.len()) {
            OutputTarget::File(path) => {
                let file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|source| PipelineError::OutputOpen {
                        path: path.clone(),
                        source,
                    })?;
                info!("Writing annotations to {}", path.display());
                let (_, summary) = self.run_with_sink(items, file).await?;
                Ok(summary)
            }
            OutputTarget::Stdout => {
                let (_, summary) = self.run_with_sink(items, tokio::io::stdout()).await?;
                Ok(summary)
            }
        }
    }

    /// Annotate `items` into an arbitrary sink and hand the sink back
    pub async fn run_with_sink<W: AsyncWrite + Unpin>(
        &self,
        items: Vec<Item>,
        sink: W,
    ) -> Result<(W, RunSummary), PipelineError> {
        let items = dedup_items(items);
        if items.is_empty() {
            return Err(PipelineError::NoItems);
        }

        let parallelism = self.config.resolve_parallelism(items.len());
        let partitions = split_items(&items, parallelism);
        info!(
            "Will use {} workers to annotate {} items",
            partitions.len(),
            items.len()
        );

        let cwd = std::env::current_dir().map_err(PipelineError::WorkingDir)?;
        let normalizer = PathNormalizer::new(&self.config.root, &cwd);
        let writer = OutputWriter::new(sink, normalizer, self.config.prefix.clone());

        let (tx, mut rx) = result_channel(self.config.channel_capacity);
        let mut handles = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let spec = WorkerSpec {
                device: Device::for_worker(&self.config.devices, partition.index),
                batch_size: self.config.batch_size,
                partition,
            };
            match spawn_worker(spec, self.factory.clone(), tx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    drop(tx);
                    drop(rx);
                    join_workers(handles).await;
                    return Err(e);
                }
            }
        }
        drop(tx);

        let progress = self.progress_bar(items.len());
        let mut collector = Collector::new(writer, progress, items.len(), handles.len());
        let collected = match self.config.completion {
            CompletionMode::Sentinel => collector.collect_until_finished(&mut rx).await,
            CompletionMode::LivenessPoll => {
                let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
                collector
                    .collect_until_idle(&mut rx, handles.as_slice(), poll_interval)
                    .await
            }
        };

        drop(rx);
        join_workers(handles).await;
        collected?;

        let (sink, summary) = collector.finish();
        summary.log();
        Ok((sink, summary))
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("Generating annotations");
        bar
    }
}

/// Join worker threads without blocking the runtime
async fn join_workers(handles: Vec<WorkerHandle>) {
    let joined = tokio::task::spawn_blocking(move || {
        handles
            .into_iter()
            .filter_map(|handle| {
                let index = handle.index();
                (!handle.join()).then_some(index)
            })
            .collect::<Vec<usize>>()
    })
    .await;

    match joined {
        Ok(panicked) => {
            for index in panicked {
                warn!("Worker {} panicked", index);
            }
        }
        Err(e) => warn!("Failed to join workers: {}", e),
    }
}
