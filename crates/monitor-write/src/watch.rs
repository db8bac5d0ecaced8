// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking until the watched file changes.

use std::path::Path;

use anyhow::Context;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wait for a filesystem event on `path`, its creation, or its removal.
///
/// Watches the parent directory so a not-yet-existing file still wakes us
/// when it appears. Returns immediately when `done` is cancelled.
pub async fn wait_for_event(path: &Path, done: &CancellationToken) -> anyhow::Result<()> {
    let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
    let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
        let _ = wake_tx.try_send(());
    })
    .context("failed to create watcher")?;

    if path.exists() {
        // best-effort: the parent watch below covers it if this fails
        let _ = watcher.watch(path, RecursiveMode::NonRecursive);
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("/"),
    };
    watcher
        .watch(parent, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", parent.display()))?;

    tokio::select! {
        _ = wake_rx.recv() => Ok(()),
        _ = done.cancelled() => Ok(()),
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
