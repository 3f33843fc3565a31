// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Result channel between workers and the collector
//!
//! Many producers (one per worker thread), one consumer (the collector task).
//! Unbounded by default so workers never block on a push; an optional
//! capacity turns pushes into blocking sends to cap memory when the
//! collector's output I/O cannot keep up.
//!
//! Events from one worker arrive in the order that worker sent them. There
//! is no ordering between different workers.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::item::Item;
use crate::annotators::Device;

/// Output record for one successfully annotated item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub item: Item,
    pub text: String,
}

/// Counts a worker reports when it finishes its partition
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker: usize,
    pub device: Device,
    pub annotated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the annotator could not be loaded at all
    pub load_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Annotated(Annotation),
    Skipped { item: Item, reason: String },
    Failed { item: Item, error: String },
    /// Last event a worker sends
    Finished(WorkerReport),
}

/// The consumer side has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecv {
    Empty,
    Disconnected,
}

/// Create a result channel; `None` capacity means unbounded
pub fn result_channel(capacity: Option<usize>) -> (ResultSender, ResultReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (ResultSender::Bounded(tx), ResultReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (ResultSender::Unbounded(tx), ResultReceiver::Unbounded(rx))
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResultSender {
    Unbounded(mpsc::UnboundedSender<WorkerEvent>),
    Bounded(mpsc::Sender<WorkerEvent>),
}

impl ResultSender {
    /// Push an event from a worker thread.
    ///
    /// Never blocks on an unbounded channel. On a bounded channel this parks
    /// the calling thread until there is room, so it must not be called from
    /// inside an async task.
    pub fn send(&self, event: WorkerEvent) -> Result<(), ChannelClosed> {
        match self {
            ResultSender::Unbounded(tx) => tx.send(event).map_err(|_| ChannelClosed),
            ResultSender::Bounded(tx) => tx.blocking_send(event).map_err(|_| ChannelClosed),
        }
    }
}

#[derive(Debug)]
pub enum ResultReceiver {
    Unbounded(mpsc::UnboundedReceiver<WorkerEvent>),
    Bounded(mpsc::Receiver<WorkerEvent>),
}

impl ResultReceiver {
    /// Wait for the next event; `None` once every sender is gone and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        match self {
            ResultReceiver::Unbounded(rx) => rx.recv().await,
            ResultReceiver::Bounded(rx) => rx.recv().await,
        }
    }

    pub fn try_recv(&mut self) -> Result<WorkerEvent, TryRecv> {
        let result = match self {
            ResultReceiver::Unbounded(rx) => rx.try_recv(),
            ResultReceiver::Bounded(rx) => rx.try_recv(),
        };
        result.map_err(|e| match e {
            TryRecvError::Empty => TryRecv::Empty,
            TryRecvError::Disconnected => TryRecv::Disconnected,
        })
    }
}
