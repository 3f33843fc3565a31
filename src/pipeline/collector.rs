// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Collector: drains worker events, persists annotations and decides when
//! the run is over.
//!
//! Two completion protocols are available:
//!
//! - **Sentinel** (default): every worker sends `Finished` after its last
//!   event, so the collector is done once it has seen one `Finished` per
//!   worker. If the channel closes first, the missing workers died without
//!   reporting and are counted as lost.
//! - **Liveness poll**: the collector polls the channel and, whenever it is
//!   empty, asks whether any worker is still alive. "Channel empty" and "all
//!   workers dead" are two separate observations, and a worker can push its
//!   last event in between, so once no worker is alive the channel gets one
//!   more exhaustive drain.

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use super::channel::{ResultReceiver, TryRecv, WorkerEvent, WorkerReport};
use super::error::PipelineError;
use super::item::Item;
use super::output::OutputWriter;
use super::worker::Liveness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionMode {
    #[default]
    Sentinel,
    LivenessPoll,
}

impl std::str::FromStr for CompletionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentinel" => Ok(CompletionMode::Sentinel),
            "liveness-poll" | "poll" => Ok(CompletionMode::LivenessPoll),
            other => Err(format!(
                "unknown completion mode '{}', expected 'sentinel' or 'liveness-poll'",
                other
            )),
        }
    }
}

/// An item that produced no annotation, and why
#[derive(Debug, Clone, PartialEq)]
pub struct ItemIssue {
    pub item: Item,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub expected_items: usize,
    pub expected_workers: usize,
    pub annotated: usize,
    pub skipped: Vec<ItemIssue>,
    pub failed: Vec<ItemIssue>,
    pub workers: Vec<WorkerReport>,
    /// Workers that terminated without sending `Finished`
    pub lost_workers: usize,
}

impl RunSummary {
    /// Items with no outcome at all (only possible when a worker was lost)
    pub fn unaccounted(&self) -> usize {
        self.expected_items
            .saturating_sub(self.annotated + self.skipped.len() + self.failed.len())
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty() && self.lost_workers == 0
    }

    pub fn log(&self) {
        info!(
            "Annotated {} of {} items ({} skipped, {} failed)",
            self.annotated,
            self.expected_items,
            self.skipped.len(),
            self.failed.len()
        );
        for issue in &self.skipped {
            warn!("Skipped {}: {}", issue.item, issue.reason);
        }
        for issue in &self.failed {
            warn!("Failed {}: {}", issue.item, issue.reason);
        }
        if self.lost_workers > 0 {
            warn!(
                "{} worker(s) terminated without reporting; {} items have no outcome",
                self.lost_workers,
                self.unaccounted()
            );
        }
    }
}

pub struct Collector<W> {
    writer: OutputWriter<W>,
    progress: ProgressBar,
    summary: RunSummary,
}

impl<W: AsyncWrite + Unpin> Collector<W> {
    pub fn new(
        writer: OutputWriter<W>,
        progress: ProgressBar,
        expected_items: usize,
        expected_workers: usize,
    ) -> Self {
        Self {
            writer,
            progress,
            summary: RunSummary {
                expected_items,
                expected_workers,
                ..Default::default()
            },
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    async fn handle(&mut self, event: WorkerEvent) -> Result<(), PipelineError> {
        match event {
            WorkerEvent::Annotated(annotation) => {
                self.writer.write(&annotation).await?;
                self.summary.annotated += 1;
                self.progress.inc(1);
            }
            WorkerEvent::Skipped { item, reason } => {
                self.summary.skipped.push(ItemIssue { item, reason });
                self.progress.inc(1);
            }
            WorkerEvent::Failed { item, error } => {
                self.summary.failed.push(ItemIssue {
                    item,
                    reason: error,
                });
                self.progress.inc(1);
            }
            WorkerEvent::Finished(report) => {
                debug!("Worker {} reported completion", report.worker);
                self.summary.workers.push(report);
            }
        }
        Ok(())
    }

    /// Receive until every worker has sent `Finished` or the channel closes
    pub async fn collect_until_finished(
        &mut self,
        rx: &mut ResultReceiver,
    ) -> Result<(), PipelineError> {
        while self.summary.workers.len() < self.summary.expected_workers {
            match rx.recv().await {
                Some(event) => self.handle(event).await?,
                None => {
                    warn!(
                        "Result channel closed after {} of {} worker reports",
                        self.summary.workers.len(),
                        self.summary.expected_workers
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// Poll the channel until it is empty and no worker is alive, then drain
    /// it one final time.
    pub async fn collect_until_idle<L: Liveness + ?Sized>(
        &mut self,
        rx: &mut ResultReceiver,
        liveness: &L,
        poll_interval: Duration,
    ) -> Result<(), PipelineError> {
        loop {
            match rx.try_recv() {
                Ok(event) => self.handle(event).await?,
                Err(TryRecv::Empty) => {
                    if !liveness.any_alive() {
                        break;
                    }
                    tokio::time::sleep(poll_interval).await;
                }
                Err(TryRecv::Disconnected) => break,
            }
        }

        // A worker may have pushed between the empty check and the liveness check.
        while let Ok(event) = rx.try_recv() {
            self.handle(event).await?;
        }
        Ok(())
    }

    /// Stop the progress bar and hand back the sink and the summary
    pub fn finish(mut self) -> (W, RunSummary) {
        self.progress.finish();
        self.summary.lost_workers = self
            .summary
            .expected_workers
            .saturating_sub(self.summary.workers.len());
        (self.writer.into_inner(), self.summary)
    }
}
