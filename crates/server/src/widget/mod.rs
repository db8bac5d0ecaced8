// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-widget-kind subprocess adapters.
//!
//! Every driver owns its container subprocess(es) through a supervisor task
//! and exposes the same capability set: `read` blocks for the next outbound
//! frame (`Ok(None)` is end of stream), `write` applies one inbound frame,
//! `close` is the idempotent cancellation primitive, and `current_state` is
//! the late-joiner replay payload.

pub mod button;
pub mod frame;
pub mod monitor;
pub mod terminal;

pub use button::ButtonDriver;
pub use monitor::MonitorDriver;
pub use terminal::TerminalDriver;

use bytes::Bytes;

/// Replay payload for drivers with no meaningful state.
pub const EMPTY_STATE: &[u8] = b"{}";

/// Delay before relaunching a child that exited without a stop request,
/// and after pipe-creation failures.
pub const RESTART_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

/// A live widget instance, dispatching to its kind-specific driver.
pub enum WidgetDriver {
    Button(ButtonDriver),
    Monitor(MonitorDriver),
    Terminal(TerminalDriver),
}

impl WidgetDriver {
    /// Next outbound frame; `Ok(None)` once the driver has fully stopped.
    pub async fn read(&self) -> anyhow::Result<Option<Bytes>> {
        match self {
            Self::Button(driver) => driver.read().await,
            Self::Monitor(driver) => driver.read().await,
            Self::Terminal(driver) => driver.read().await,
        }
    }

    /// Apply one inbound frame. Malformed JSON is an error; frames that
    /// don't match the driver's input schema are silently dropped.
    pub async fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        match self {
            Self::Button(driver) => driver.write(data).await,
            Self::Monitor(driver) => driver.write(data).await,
            Self::Terminal(driver) => driver.write(data).await,
        }
    }

    /// Stop the driver and wait for every child process to be reaped.
    pub async fn close(&self) -> anyhow::Result<()> {
        match self {
            Self::Button(driver) => driver.close().await,
            Self::Monitor(driver) => driver.close().await,
            Self::Terminal(driver) => driver.close().await,
        }
    }

    /// Payload a late joiner receives as its initial view.
    pub fn current_state(&self) -> Bytes {
        match self {
            Self::Button(driver) => driver.current_state(),
            Self::Monitor(driver) => driver.current_state(),
            Self::Terminal(driver) => driver.current_state(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Button(_) => "button",
            Self::Monitor(_) => "monitor",
            Self::Terminal(_) => "terminal",
        }
    }
}
