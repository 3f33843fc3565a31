// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

use super::StoreError;

const READ_CHUNK: usize = 1 << 20;

/// Hex-encoded SHA-256 of a file, read in chunks
pub async fn calculate_checksum(path: &Path) -> Result<String, StoreError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `true` when `path` exists and hashes to `expected_sha256`
pub async fn verify_checksum(path: &Path, expected_sha256: &str) -> Result<bool, StoreError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(false);
    }
    let actual = calculate_checksum(path).await?;
    Ok(actual.eq_ignore_ascii_case(expected_sha256.trim()))
}
