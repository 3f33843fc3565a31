// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use fanout_annotator::cli::{execute, parse_with_env_file};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match parse_with_env_file(Path::new(".env"), std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    // Initialize logging
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    tracing::info!("{}", fanout_annotator::version::get_version_string());

    match execute(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
