// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdio wire frames: line-delimited JSON with Base64 payloads.
//!
//! Stdout carries contents snapshots, stderr carries typed errors, stdin
//! accepts contents and removal commands.

use serde::{Deserialize, Serialize};

/// Commands accepted on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputFrame {
    /// Replace the watched file with the decoded contents.
    Contents { contents: String },
    /// Delete the watched file.
    Removal,
}

/// Snapshots emitted on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutputFrame {
    Contents { contents: String },
}

/// Typed error reported on stderr, e.g. `{"type":"readError","message":…}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Emit one error frame on stderr. `kind` is the bare kind; the `Error`
/// suffix is appended here.
pub fn report_error(kind: &str, error: &anyhow::Error) {
    let frame = ErrorFrame { kind: format!("{kind}Error"), message: format!("{error:#}") };
    match serde_json::to_string(&frame) {
        Ok(line) => eprintln!("{line}"),
        Err(_) => eprintln!(r#"{{"type":"{kind}Error","message":"unserializable error"}}"#),
    }
}

#[cfg(test)]
#[path = "proto_tests.rs"]
mod tests;
