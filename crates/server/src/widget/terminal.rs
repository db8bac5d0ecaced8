// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal widget driver: a PTY-attached interactive container shell.
//!
//! Chunks read from the PTY master become `{"data": …}` frames; inbound
//! frames are written to the PTY unmodified. EIO on the master means the
//! child is gone and triggers the restart policy. Scrollback is not
//! reconstructed for late joiners.

use bytes::Bytes;
use nix::sys::signal::Signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::frame::{self, TerminalData};
use super::{EMPTY_STATE, RESTART_BACKOFF};
use crate::pty::{PtyProcess, PtyRead};

/// PTY read size per chunk.
const CHUNK_SIZE: usize = 4096;
/// Unexpected read errors tolerated before the child is recycled.
const MAX_READ_RETRIES: u32 = 5;
const READ_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

/// Driver for one terminal widget instance.
pub struct TerminalDriver {
    output_rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    input_tx: mpsc::Sender<Vec<u8>>,
    stop: CancellationToken,
    done: CancellationToken,
}

impl TerminalDriver {
    /// Launch the supervisor for `argv`, the PTY-attached container
    /// invocation.
    pub fn start(argv: Vec<String>) -> Self {
        let (output_tx, output_rx) = mpsc::channel(64);
        let (input_tx, input_rx) = mpsc::channel(64);
        let stop = CancellationToken::new();
        let done = CancellationToken::new();

        tokio::spawn(supervise(argv, output_tx, input_rx, stop.clone(), done.clone()));

        Self {
            output_rx: tokio::sync::Mutex::new(output_rx),
            input_tx,
            stop,
            done,
        }
    }

    pub async fn read(&self) -> anyhow::Result<Option<Bytes>> {
        Ok(self.output_rx.lock().await.recv().await)
    }

    pub async fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        let Some(message) = frame::decode_inbound::<TerminalData>(data)? else {
            return Ok(());
        };
        self.input_tx
            .send(message.data)
            .await
            .map_err(|_| anyhow::anyhow!("terminal input closed"))?;
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
        Bytes::from_static(EMPTY_STATE)
    }
}

impl Drop for TerminalDriver {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Restart loop: run the PTY child until it exits, relaunch after the
/// backoff unless a stop was requested.
async fn supervise(
    argv: Vec<String>,
    output_tx: mpsc::Sender<Bytes>,
    mut input_rx: mpsc::Receiver<Vec<u8>>,
    stop: CancellationToken,
    done: CancellationToken,
) {
    loop {
        match PtyProcess::spawn(&argv) {
            Ok(pty) => {
                run_session(&pty, &output_tx, &mut input_rx, &stop).await;
                match pty.wait().await {
                    Ok(status) => debug!(?status, "terminal child exited"),
                    Err(e) => warn!(error = %e, "failed to reap terminal child"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn terminal child");
                let message = format!("{e}\n");
                let _ = output_tx
                    .send(frame::encode(&TerminalData { data: message.into_bytes() }))
                    .await;
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

    drop(output_tx);
    done.cancel();
}

/// Pump one child's PTY until it ends: chunks out, raw writes in.
async fn run_session(
    pty: &PtyProcess,
    output_tx: &mpsc::Sender<Bytes>,
    input_rx: &mut mpsc::Receiver<Vec<u8>>,
    stop: &CancellationToken,
) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut retries = 0u32;
    let mut input_open = true;
    let mut signalled = false;

    loop {
        tokio::select! {
            result = pty.read_chunk(&mut buf) => match result {
                Ok(PtyRead::Data(n)) => {
                    retries = 0;
                    let frame = frame::encode(&TerminalData { data: buf[..n].to_vec() });
                    if output_tx.send(frame).await.is_err() {
                        // nobody is reading anymore; wind the supervisor down
                        stop.cancel();
                    }
                }
                // the child is gone; reap and let the restart policy decide
                Ok(PtyRead::Closed) => return,
                Err(e) => {
                    retries += 1;
                    warn!(error = %e, retries, "terminal read failed");
                    if retries > MAX_READ_RETRIES {
                        let _ = pty.signal(Signal::SIGTERM);
                        return;
                    }
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
            },
            message = input_rx.recv(), if input_open && !signalled => match message {
                Some(data) => {
                    if let Err(e) = pty.write_all(&data).await {
                        warn!(error = %e, "terminal write failed");
                    }
                }
                None => input_open = false,
            },
            _ = stop.cancelled(), if !signalled => {
                signalled = true;
                if let Err(e) = pty.signal(Signal::SIGTERM) {
                    warn!(error = %e, "failed to signal terminal child");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
