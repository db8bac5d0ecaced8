// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor-write widget driver, backing text, image, and editor widgets.
//!
//! A supervisor task owns the sidecar container that watches one file and
//! speaks line-delimited JSON over stdio (Base64 contents on stdout, writes
//! on stdin). The child is relaunched with a fixed backoff until a stop is
//! requested. Editor widgets (`connect_write`) forward client contents to
//! the child's stdin; text and image widgets leave stdin closed.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::frame::{self, Contents, MonitorError};
use super::RESTART_BACKOFF;

/// Stdio leg of the helper contract: line-delimited JSON with Base64
/// payloads.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HelperFrame {
    Contents { contents: String },
    Removal,
}

#[derive(Default)]
struct MonitorState {
    /// Serialized contents frame last emitted to clients.
    last_contents: Option<Bytes>,
    /// Serialized error frame; replaced by each stderr line, cleared by the
    /// next emitted contents.
    last_error: Option<Bytes>,
}

/// Driver for one monitor-write widget instance.
pub struct MonitorDriver {
    connect_write: bool,
    output_rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    input_tx: mpsc::Sender<Vec<u8>>,
    stop: CancellationToken,
    done: CancellationToken,
    state: Arc<Mutex<MonitorState>>,
    teardown_errors: Arc<Mutex<Vec<String>>>,
}

impl MonitorDriver {
    /// Launch the supervisor for `argv`, the long-running sidecar
    /// invocation. `connect_write` keeps the child's stdin attached for
    /// editor widgets.
    pub fn start(argv: Vec<String>, connect_write: bool) -> Self {
        let (output_tx, output_rx) = mpsc::channel(64);
        let (input_tx, input_rx) = mpsc::channel(64);
        let stop = CancellationToken::new();
        let done = CancellationToken::new();
        let state = Arc::new(Mutex::new(MonitorState::default()));
        let teardown_errors = Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(supervise(
            argv,
            connect_write,
            output_tx,
            input_rx,
            stop.clone(),
            done.clone(),
            Arc::clone(&state),
            Arc::clone(&teardown_errors),
        ));

        Self {
            connect_write,
            output_rx: tokio::sync::Mutex::new(output_rx),
            input_tx,
            stop,
            done,
            state,
            teardown_errors,
        }
    }

    pub async fn read(&self) -> anyhow::Result<Option<Bytes>> {
        if let Some(frame) = self.output_rx.lock().await.recv().await {
            return Ok(Some(frame));
        }
        let errors = std::mem::take(&mut *self.teardown_errors.lock());
        if errors.is_empty() {
            Ok(None)
        } else {
            Err(anyhow::anyhow!("monitor-write teardown: {}", errors.join("; ")))
        }
    }

    pub async fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        let Some(message) = frame::decode_inbound::<Contents>(data)? else {
            return Ok(());
        };
        if !self.connect_write {
            return Ok(());
        }
        self.input_tx
            .send(message.contents)
            .await
            .context("monitor-write input closed")?;
        Ok(())
    }

    /// Idempotent. Requests stop, lets the supervisor SIGTERM the child,
    /// and waits for the supervision loop to exit.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.stop.cancel();
        self.done.cancelled().await;
        Ok(())
    }

    pub fn current_state(&self) -> Bytes {
        let state = self.state.lock();
        if let Some(error) = &state.last_error {
            return error.clone();
        }
        state
            .last_contents
            .clone()
            .unwrap_or_else(|| frame::encode(&Contents { contents: Vec::new() }))
    }
}

impl Drop for MonitorDriver {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Restart loop: run the child until it exits, relaunch after the backoff
/// unless a stop was requested.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    argv: Vec<String>,
    connect_write: bool,
    output_tx: mpsc::Sender<Bytes>,
    mut input_rx: mpsc::Receiver<Vec<u8>>,
    stop: CancellationToken,
    done: CancellationToken,
    state: Arc<Mutex<MonitorState>>,
    teardown_errors: Arc<Mutex<Vec<String>>>,
) {
    let mut last_emitted: Option<Vec<u8>> = None;
    let mut errors: Vec<String> = Vec::new();

    loop {
        let result = run_child(
            &argv,
            connect_write,
            &output_tx,
            &mut input_rx,
            &stop,
            &state,
            &mut last_emitted,
            &mut errors,
        )
        .await;
        if let Err(e) = result {
            warn!(error = %e, "monitor-write child failed");
            if stop.is_cancelled() {
                errors.push(e.to_string());
            }
        }

        if stop.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(RESTART_BACKOFF) => {}
            _ = stop.cancelled() => break,
        }
    }

    *teardown_errors.lock() = errors;
    drop(output_tx);
    done.cancel();
}

/// One child lifetime: spawn, pump stdio until both pipes close, reap.
#[allow(clippy::too_many_arguments)]
async fn run_child(
    argv: &[String],
    connect_write: bool,
    output_tx: &mpsc::Sender<Bytes>,
    input_rx: &mut mpsc::Receiver<Vec<u8>>,
    stop: &CancellationToken,
    state: &Mutex<MonitorState>,
    last_emitted: &mut Option<Vec<u8>>,
    errors: &mut Vec<String>,
) -> anyhow::Result<()> {
    let Some((program, args)) = argv.split_first() else {
        anyhow::bail!("empty argv");
    };

    let stdin_mode = if connect_write { Stdio::piped() } else { Stdio::null() };
    let mut child = Command::new(program)
        .args(args)
        .stdin(stdin_mode)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn monitor-write child")?;

    let mut stdin = child.stdin.take();
    let mut stdout_lines = child.stdout.take().map(|out| BufReader::new(out).lines());
    let mut stderr_lines = child.stderr.take().map(|err| BufReader::new(err).lines());

    let mut stdout_open = stdout_lines.is_some();
    let mut stderr_open = stderr_lines.is_some();
    let mut input_open = true;
    let mut signalled = false;

    while stdout_open || stderr_open {
        tokio::select! {
            line = next_line(&mut stdout_lines), if stdout_open => match line {
                Ok(Some(line)) => {
                    handle_stdout_line(output_tx, stop, state, last_emitted, &line).await;
                }
                Ok(None) => stdout_open = false,
                Err(e) => {
                    errors.push(format!("stdout: {e}"));
                    stdout_open = false;
                }
            },
            line = next_line(&mut stderr_lines), if stderr_open => match line {
                Ok(Some(line)) => {
                    let frame = frame::encode(&MonitorError { error: line.into_bytes() });
                    state.lock().last_error = Some(frame.clone());
                    if output_tx.send(frame).await.is_err() {
                        stop.cancel();
                    }
                }
                Ok(None) => stderr_open = false,
                Err(e) => {
                    errors.push(format!("stderr: {e}"));
                    stderr_open = false;
                }
            },
            message = input_rx.recv(), if input_open && !signalled => match message {
                Some(contents) => {
                    if let Some(stdin) = stdin.as_mut() {
                        let frame = HelperFrame::Contents { contents: BASE64.encode(&contents) };
                        if let Err(e) = write_helper_frame(stdin, &frame).await {
                            warn!(error = %e, "monitor-write stdin write failed");
                            errors.push(format!("stdin: {e}"));
                        }
                    }
                }
                None => input_open = false,
            },
            _ = stop.cancelled(), if !signalled => {
                signalled = true;
                signal_child(&child);
            }
        }
    }

    let status = child.wait().await.context("failed to reap monitor-write child")?;
    debug!(?status, "monitor-write child exited");
    Ok(())
}

/// Decode one helper stdout line; emit a contents frame when it differs
/// from the last one emitted. State is updated before the frame is sent so
/// a replay never lags the live stream.
async fn handle_stdout_line(
    output_tx: &mpsc::Sender<Bytes>,
    stop: &CancellationToken,
    state: &Mutex<MonitorState>,
    last_emitted: &mut Option<Vec<u8>>,
    line: &str,
) {
    let contents = match serde_json::from_str::<HelperFrame>(line) {
        Ok(HelperFrame::Contents { contents }) => match BASE64.decode(contents) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "monitor-write emitted invalid Base64");
                return;
            }
        },
        Ok(HelperFrame::Removal) => return,
        Err(e) => {
            warn!(error = %e, "monitor-write emitted malformed frame");
            return;
        }
    };

    if last_emitted.as_deref() == Some(&contents[..]) {
        return;
    }
    *last_emitted = Some(contents.clone());

    let frame = frame::encode(&Contents { contents });
    {
        let mut state = state.lock();
        state.last_contents = Some(frame.clone());
        state.last_error = None;
    }
    if output_tx.send(frame).await.is_err() {
        // nobody is reading anymore; wind the supervisor down
        stop.cancel();
    }
}

async fn next_line<R>(
    lines: &mut Option<tokio::io::Lines<BufReader<R>>>,
) -> std::io::Result<Option<String>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

async fn write_helper_frame(
    stdin: &mut tokio::process::ChildStdin,
    frame: &HelperFrame,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    stdin.write_all(&line).await?;
    stdin.flush().await?;
    Ok(())
}

fn signal_child(child: &Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(error = %e, "failed to signal monitor-write child");
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
