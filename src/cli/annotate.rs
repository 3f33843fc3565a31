// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use super::models::prepare_artifacts;
use crate::annotators::{CommandAnnotatorFactory, Device};
use crate::config::PipelineConfig;
use crate::discovery::{dataset_root, find_image_files};
use crate::pipeline::{CompletionMode, Pipeline};

/// Arguments for annotate command
#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// A directory containing the images to annotate, or a single image
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Annotator program started once per worker
    #[arg(long)]
    pub command: String,

    /// Argument passed to the annotator program (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub command_args: Vec<String>,

    /// TOML file with pipeline settings
    #[arg(long, env = "ANNOTATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Model manifest; its artifacts are fetched and verified before any worker starts
    #[arg(long)]
    pub models: Option<PathBuf>,

    /// Directory holding downloaded model artifacts
    #[arg(long, env = "ANNOTATE_MODEL_STORE", default_value = "./models")]
    pub model_store: PathBuf,

    /// Comma-separated devices, e.g. "0,1" or "cpu"
    #[arg(long)]
    pub devices: Option<String>,

    /// Force CPU for every worker
    #[arg(long, conflicts_with = "devices")]
    pub cpu: bool,

    /// Number of workers (capped at the number of images)
    #[arg(long, short = 'j')]
    pub parallelism: Option<usize>,

    /// Items handed to the annotator per call
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Bound the result channel; unbounded when omitted
    #[arg(long)]
    pub channel_capacity: Option<usize>,

    /// Completion protocol: sentinel or liveness-poll
    #[arg(long)]
    pub completion: Option<CompletionMode>,

    /// An optional description prepended to every generated one
    #[arg(long, short = 'c', alias = "common-description")]
    pub prefix: Option<String>,

    /// Text placed between the description and the generated text
    #[arg(long, allow_hyphen_values = true)]
    pub prefix_separator: Option<String>,

    /// Output file (defaults to <input>/metadata.jsonl)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl AnnotateArgs {
    /// Defaults, then the config file, then ANNOTATE_* variables, then flags
    pub fn build_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        config.apply_env();

        config.root = dataset_root(&self.input)?;
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
        if self.cpu {
            config.devices = vec![Device::Cpu];
        } else if let Some(devices) = &self.devices {
            config.devices = Device::parse_list(devices)?;
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = Some(parallelism);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(capacity) = self.channel_capacity {
            config.channel_capacity = Some(capacity);
        }
        if let Some(completion) = self.completion {
            config.completion = completion;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix.text = Some(prefix.clone());
        }
        if let Some(separator) = &self.prefix_separator {
            config.prefix.separator = separator.clone();
        }
        if self.no_progress {
            config.show_progress = false;
        }

        config.validate()?;
        Ok(config)
    }
}

pub async fn run_annotate(args: AnnotateArgs) -> Result<()> {
    let config = args.build_config()?;
    let items = find_image_files(&args.input)?;
    if items.is_empty() {
        return Err(anyhow!("Unable to find any images at {}", args.input.display()));
    }

    let artifacts = match &args.models {
        Some(manifest) => {
            prepare_artifacts(manifest, &args.model_store, config.show_progress).await?
        }
        None => BTreeMap::new(),
    };

    info!(
        "Annotating {} images under {} with '{}'",
        items.len(),
        config.root.display(),
        args.command
    );
    let factory = CommandAnnotatorFactory::new(args.command.clone(), args.command_args.clone())
        .with_artifacts(&artifacts);
    let pipeline = Pipeline::new(config, factory)?;
    let summary = pipeline.run(items).await.context("Annotation run failed")?;

    println!(
        "✅ Annotated {} of {} images",
        summary.annotated, summary.expected_items
    );
    if !summary.is_clean() {
        println!(
            "⚠️  {} skipped, {} failed, {} without outcome",
            summary.skipped.len(),
            summary.failed.len(),
            summary.unaccounted()
        );
    }
    Ok(())
}
