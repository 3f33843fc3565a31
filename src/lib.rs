// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod annotators;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod models;
pub mod pipeline;
pub mod version;

pub use annotators::{
    AnnotateError, Annotator, AnnotatorFactory, CommandAnnotator, CommandAnnotatorFactory, Device,
};
pub use config::{ConfigError, OutputTarget, PipelineConfig};
pub use models::{ArtifactSpec, Fetcher, HttpFetcher, ModelManifest, ModelStore, StoreError};
pub use pipeline::{
    Annotation, CompletionMode, Item, MetadataRecord, Partition, Pipeline, PipelineError,
    PrefixJoin, RunSummary, WorkerEvent, WorkerReport,
};
