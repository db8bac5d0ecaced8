// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base64 file snapshots and writes.

use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Read the whole file and return it Base64-encoded.
pub fn read_file_to_base64(path: &Path) -> anyhow::Result<String> {
    let contents = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(BASE64.encode(contents))
}

/// Decode Base64 contents and replace the file with them.
pub fn write_file_from_base64(path: &Path, encoded: &str) -> anyhow::Result<()> {
    let decoded = BASE64.decode(encoded).context("failed to decode Base64 contents")?;
    std::fs::write(path, decoded)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Delete the watched file.
pub fn remove_file(path: &Path) -> anyhow::Result<()> {
    std::fs::remove_file(path)
        .with_context(|| format!("failed to remove {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "io_tests.rs"]
mod tests;
