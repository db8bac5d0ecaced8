// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Widget-scoped wire frames.
//!
//! Every frame is a self-contained JSON object. Opaque payload bytes travel
//! as JSON byte arrays on the client leg; Base64 appears only on the
//! monitor-write stdio leg.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Inbound button frame; anything but `{"click": true}` is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonClick {
    pub click: bool,
}

/// Emitted once per accepted click so clients can reset their output view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonClear {
    pub clear: bool,
}

impl ButtonClear {
    pub fn new() -> Self {
        Self { clear: true }
    }
}

impl Default for ButtonClear {
    fn default() -> Self {
        Self::new()
    }
}

/// Which pipe a button output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputOrigin {
    Stdout,
    Stderr,
}

/// One line of button command output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonOutput {
    pub origin: OutputOrigin,
    pub data: Vec<u8>,
}

/// Monitored file contents; both an inbound (editor) and outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contents {
    pub contents: Vec<u8>,
}

/// Monitor-side failure surfaced to clients; replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorError {
    pub error: Vec<u8>,
}

/// Raw terminal bytes; identical shape in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalData {
    pub data: Vec<u8>,
}

/// Serialize a frame to bytes. The frame types above cannot fail to
/// serialize; an empty object stands in if one ever does.
pub fn encode<T: Serialize>(frame: &T) -> Bytes {
    serde_json::to_vec(frame).map(Bytes::from).unwrap_or_else(|_| Bytes::from_static(b"{}"))
}

/// Decode an inbound frame. `Ok(None)` for well-formed JSON that doesn't
/// match the driver's input schema (dropped), `Err` for malformed JSON.
pub fn decode_inbound<T: serde::de::DeserializeOwned>(data: &[u8]) -> anyhow::Result<Option<T>> {
    match serde_json::from_slice(data) {
        Ok(frame) => Ok(Some(frame)),
        Err(_) => match serde_json::from_slice::<serde_json::Value>(data) {
            Ok(_) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("malformed frame: {e}")),
        },
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
