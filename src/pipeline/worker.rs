// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Worker harness
//!
//! A worker is a dedicated OS thread that loads one annotator for its
//! device, walks its partition in order and pushes one event per item onto
//! the result channel. Item-level failures never stop the worker; only a
//! fatal annotator error does, and even then every remaining item is
//! reported as failed so nothing disappears silently.

use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use super::channel::{Annotation, ResultSender, WorkerEvent, WorkerReport};
use super::error::PipelineError;
use super::item::{Item, Partition};
use crate::annotators::{AnnotateError, Annotator, AnnotatorFactory, Device};

#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub partition: Partition,
    pub device: Device,
    pub batch_size: usize,
}

/// Handle to a running worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    index: usize,
    items: usize,
    thread: thread::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn item_count(&self) -> usize {
        self.items
    }

    pub fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Wait for the thread; `false` if it panicked
    pub fn join(self) -> bool {
        self.thread.join().is_ok()
    }
}

/// Source of "is any worker still running" observations
pub trait Liveness {
    fn any_alive(&self) -> bool;
}

impl Liveness for [WorkerHandle] {
    fn any_alive(&self) -> bool {
        self.iter().any(WorkerHandle::is_alive)
    }
}

impl Liveness for Vec<WorkerHandle> {
    fn any_alive(&self) -> bool {
        self.as_slice().any_alive()
    }
}

pub fn spawn_worker<F: AnnotatorFactory>(
    spec: WorkerSpec,
    factory: Arc<F>,
    tx: ResultSender,
) -> Result<WorkerHandle, PipelineError> {
    let index = spec.partition.index;
    let items = spec.partition.len();

    let thread = thread::Builder::new()
        .name(format!("annotate-worker-{}", index))
        .spawn(move || {
            run_worker(spec, factory.as_ref(), &tx);
        })
        .map_err(|source| PipelineError::SpawnWorker {
            worker: index,
            source,
        })?;

    Ok(WorkerHandle {
        index,
        items,
        thread,
    })
}

/// Process a whole partition on the calling thread.
///
/// Sends `Finished` as the very last event unless the collector has already
/// gone away.
pub fn run_worker<F: AnnotatorFactory>(
    spec: WorkerSpec,
    factory: &F,
    tx: &ResultSender,
) -> WorkerReport {
    let WorkerSpec {
        partition,
        device,
        batch_size,
    } = spec;
    let worker = partition.index;
    let mut report = WorkerReport {
        worker,
        device,
        annotated: 0,
        skipped: 0,
        failed: 0,
        load_error: None,
    };

    info!(
        "Worker {} loading annotator on {} for {} items",
        worker,
        device,
        partition.len()
    );

    let mut annotator = match factory.load(device) {
        Ok(annotator) => annotator,
        Err(e) => {
            let reason = format!("annotator failed to load: {:#}", e);
            error!("Worker {}: {}", worker, reason);
            for item in partition.items {
                if !emit_failed(tx, &mut report, item, reason.clone()) {
                    return report;
                }
            }
            report.load_error = Some(reason);
            let _ = tx.send(WorkerEvent::Finished(report.clone()));
            return report;
        }
    };

    let mut fatal: Option<String> = None;
    for batch in partition.items.chunks(batch_size.max(1)) {
        if let Some(reason) = &fatal {
            for item in batch {
                if !emit_failed(tx, &mut report, item.clone(), reason.clone()) {
                    return report;
                }
            }
            continue;
        }

        let mut outcomes = annotator.annotate_batch(batch).into_iter();
        for item in batch {
            let event = match outcomes.next() {
                Some(Ok(text)) => {
                    report.annotated += 1;
                    WorkerEvent::Annotated(Annotation {
                        item: item.clone(),
                        text,
                    })
                }
                Some(Err(AnnotateError::Unreadable(reason))) => {
                    warn!("Worker {}: could not load {}: {}", worker, item, reason);
                    report.skipped += 1;
                    WorkerEvent::Skipped {
                        item: item.clone(),
                        reason,
                    }
                }
                Some(Err(AnnotateError::Inference(error))) => {
                    warn!("Worker {}: annotation failed for {}: {}", worker, item, error);
                    report.failed += 1;
                    WorkerEvent::Failed {
                        item: item.clone(),
                        error,
                    }
                }
                Some(Err(AnnotateError::Fatal(reason))) => {
                    if fatal.is_none() {
                        error!(
                            "Worker {}: annotator unusable, failing the rest of the partition: {}",
                            worker, reason
                        );
                        fatal = Some(reason.clone());
                    }
                    report.failed += 1;
                    WorkerEvent::Failed {
                        item: item.clone(),
                        error: reason,
                    }
                }
                None => {
                    report.failed += 1;
                    WorkerEvent::Failed {
                        item: item.clone(),
                        error: "annotator returned no outcome for this item".to_string(),
                    }
                }
            };

            if tx.send(event).is_err() {
                debug!("Worker {}: collector gone, stopping", worker);
                return report;
            }
        }
    }

    drop(annotator);
    info!(
        "Worker {} finished: {} annotated, {} skipped, {} failed",
        worker, report.annotated, report.skipped, report.failed
    );
    let _ = tx.send(WorkerEvent::Finished(report.clone()));
    report
}

fn emit_failed(tx: &ResultSender, report: &mut WorkerReport, item: Item, error: String) -> bool {
    report.failed += 1;
    tx.send(WorkerEvent::Failed { item, error }).is_ok()
}
