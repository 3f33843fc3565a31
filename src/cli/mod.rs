// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod annotate;
pub mod models;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::Path;

/// Fan-out batch annotator CLI
#[derive(Parser, Debug)]
#[command(name = "fanout-annotator")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "Annotate image datasets in parallel and collect the results into metadata.jsonl", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Annotate every image under a directory (or a single image)
    Annotate(annotate::AnnotateArgs),

    /// Download and verify the model artifacts listed in a manifest
    FetchModels(models::FetchModelsArgs),
}

/// Load `env_file` (when present) into the environment, then parse `args`.
///
/// Variables already set in the environment win over the file.
pub fn parse_with_env_file<I, T>(env_file: &Path, args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    if env_file.is_file() {
        dotenv::from_path(env_file).ok();
    }
    Cli::try_parse_from(args)
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Annotate(args) => annotate::run_annotate(args).await,
        Commands::FetchModels(args) => models::fetch_models(args).await,
    }
}
