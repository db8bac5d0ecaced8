// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-container helper: watch one file, stream Base64 snapshots on stdout,
//! apply Base64 writes from stdin. Runs until SIGINT/SIGTERM.

pub mod io;
pub mod proto;
pub mod watch;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use proto::{InputFrame, OutputFrame};

/// Pause after a read or watch failure before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Watch `path` until a termination signal arrives.
pub async fn run(path: PathBuf) -> anyhow::Result<()> {
    let done = CancellationToken::new();
    spawn_signal_handler(done.clone())?;
    tokio::spawn(apply_input(path.clone(), done.clone()));

    // `None` until the first snapshot: the initial state is always emitted,
    // even for a missing or empty file
    let mut last_emitted: Option<String> = None;

    loop {
        let (encoded, read_error) = match io::read_file_to_base64(&path) {
            Ok(encoded) => (encoded, None),
            Err(e) => (String::new(), Some(e)),
        };

        if last_emitted.as_deref() != Some(encoded.as_str()) {
            emit_snapshot(&encoded)?;
            last_emitted = Some(encoded);
        }

        if let Some(e) = read_error {
            proto::report_error("read", &e);
            if backoff(&done).await {
                break;
            }
            continue;
        }

        if let Err(e) = watch::wait_for_event(&path, &done).await {
            proto::report_error("watch", &e);
            if backoff(&done).await {
                break;
            }
            continue;
        }

        if done.is_cancelled() {
            break;
        }
    }

    Ok(())
}

/// Cancel `done` on SIGINT or SIGTERM.
fn spawn_signal_handler(done: CancellationToken) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        done.cancel();
    });
    Ok(())
}

/// Apply stdin command frames until stdin closes or a write fails.
async fn apply_input(path: PathBuf, done: CancellationToken) {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = done.cancelled() => return,
        };
        match line {
            Ok(Some(line)) => match serde_json::from_str::<InputFrame>(&line) {
                Ok(InputFrame::Contents { contents }) => {
                    if let Err(e) = io::write_file_from_base64(&path, &contents) {
                        proto::report_error("write", &e);
                        return;
                    }
                }
                Ok(InputFrame::Removal) => {
                    if let Err(e) = io::remove_file(&path) {
                        proto::report_error("write", &e);
                    }
                }
                Err(e) => proto::report_error("input", &e.into()),
            },
            Ok(None) => return,
            Err(e) => {
                proto::report_error("input", &e.into());
                return;
            }
        }
    }
}

/// Write one contents frame to stdout. Stdout is pipe-buffered, so every
/// line is flushed explicitly.
fn emit_snapshot(encoded: &str) -> anyhow::Result<()> {
    let frame = OutputFrame::Contents { contents: encoded.to_owned() };
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &frame)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

/// Sleep out the error backoff; true when `done` fired meanwhile.
async fn backoff(done: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ERROR_BACKOFF) => false,
        _ = done.cancelled() => true,
    }
}
