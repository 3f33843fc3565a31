// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::pipeline::Item;

/// Image extensions picked up by discovery (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "jpeg", "jpg", "png"];

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Directory an input path annotates relative to: the path itself for a
/// directory, its parent for a single file
pub fn dataset_root(input: &Path) -> Result<PathBuf> {
    let canonical = input
        .canonicalize()
        .with_context(|| format!("Failed to access {}", input.display()))?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Ok(canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(canonical))
    }
}

/// Find image files under `input` (recursively), or `input` itself if it is
/// an image file. Paths are absolute and sorted.
pub fn find_image_files(input: &Path) -> Result<Vec<Item>> {
    let canonical = input
        .canonicalize()
        .with_context(|| format!("Failed to access {}", input.display()))?;

    if !canonical.is_dir() {
        return Ok(if has_image_extension(&canonical) {
            vec![Item::new(canonical)]
        } else {
            Vec::new()
        });
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(&canonical) {
        let entry = entry
            .with_context(|| format!("Failed to read directory entry under {}", canonical.display()))?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(Item::new).collect())
}
