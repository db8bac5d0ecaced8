// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Button widget driver: one bounded command run per click.
//!
//! State machine per instance is `Idle → Running → Idle` with a shadow
//! stop-requested flag. A click while Running is silently ignored, so at
//! most one child process exists per instance at any time.

use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::frame::{self, ButtonClear, ButtonClick, ButtonOutput, OutputOrigin};
use super::EMPTY_STATE;

struct ButtonState {
    running: bool,
    stop_requested: bool,
    child_pid: Option<Pid>,
    /// Dropped to close the outbound stream once the driver is done.
    output_tx: Option<mpsc::Sender<Bytes>>,
}

/// Driver for one button widget instance.
pub struct ButtonDriver {
    argv: Vec<String>,
    output_rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    state: Arc<Mutex<ButtonState>>,
    tracker: TaskTracker,
}

impl ButtonDriver {
    /// Create an idle button driver; `argv` is the full one-shot container
    /// invocation to run on click.
    pub fn new(argv: Vec<String>) -> Self {
        let (output_tx, output_rx) = mpsc::channel(64);
        Self {
            argv,
            output_rx: tokio::sync::Mutex::new(output_rx),
            state: Arc::new(Mutex::new(ButtonState {
                running: false,
                stop_requested: false,
                child_pid: None,
                output_tx: Some(output_tx),
            })),
            tracker: TaskTracker::new(),
        }
    }

    pub async fn read(&self) -> anyhow::Result<Option<Bytes>> {
        Ok(self.output_rx.lock().await.recv().await)
    }

    pub async fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        let Some(message) = frame::decode_inbound::<ButtonClick>(data)? else {
            return Ok(());
        };
        if !message.click {
            return Ok(());
        }

        let (argv, output_tx) = {
            let mut state = self.state.lock();
            if state.running || state.stop_requested {
                // a second click while Running is silently ignored
                return Ok(());
            }
            let Some(output_tx) = state.output_tx.clone() else {
                return Ok(());
            };
            state.running = true;
            (self.argv.clone(), output_tx)
        };

        let state = Arc::clone(&self.state);
        self.tracker.spawn(run_command(argv, output_tx, state));
        Ok(())
    }

    /// Idempotent. Requests stop, SIGTERMs a running child, and waits for
    /// every launched process to be reaped.
    pub async fn close(&self) -> anyhow::Result<()> {
        let child_pid = {
            let mut state = self.state.lock();
            state.stop_requested = true;
            if !state.running {
                state.output_tx = None;
            }
            state.child_pid
        };

        if let Some(pid) = child_pid {
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                warn!(error = %e, "failed to signal button child");
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }

    pub fn current_state(&self) -> Bytes {
        Bytes::from_static(EMPTY_STATE)
    }
}

/// One click's child run: emit the clear frame, stream line-scanned
/// stdout/stderr, then return to Idle.
async fn run_command(argv: Vec<String>, output_tx: mpsc::Sender<Bytes>, state: Arc<Mutex<ButtonState>>) {
    let _ = output_tx.send(frame::encode(&ButtonClear::new())).await;

    let Some((program, args)) = argv.split_first() else {
        finish_run(&state);
        return;
    };
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = output_tx
                .send(frame::encode(&ButtonOutput {
                    origin: OutputOrigin::Stderr,
                    data: e.to_string().into_bytes(),
                }))
                .await;
            finish_run(&state);
            return;
        }
    };

    // close() may have run while the spawn was in flight and found no pid
    // to signal; the stop flag is re-checked in the same transaction that
    // records the pid, so one side always delivers the SIGTERM
    let pid = child.id().map(|raw| Pid::from_raw(raw as i32));
    let stop_requested = {
        let mut state = state.lock();
        state.child_pid = pid;
        state.stop_requested
    };
    if stop_requested {
        if let Some(pid) = pid {
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                warn!(error = %e, "failed to signal button child");
            }
        }
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let wait = async {
        match child.wait().await {
            Ok(status) => debug!(?status, "button command exited"),
            Err(e) => warn!(error = %e, "failed to wait for button command"),
        }
    };
    tokio::join!(
        scan_lines(stdout, OutputOrigin::Stdout, &output_tx),
        scan_lines(stderr, OutputOrigin::Stderr, &output_tx),
        wait,
    );

    finish_run(&state);
}

fn finish_run(state: &Mutex<ButtonState>) {
    let mut state = state.lock();
    state.running = false;
    state.child_pid = None;
    if state.stop_requested {
        state.output_tx = None;
    }
}

/// Forward each line of a child pipe as an output frame.
async fn scan_lines<R>(pipe: Option<R>, origin: OutputOrigin, output_tx: &mpsc::Sender<Bytes>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let frame = frame::encode(&ButtonOutput { origin, data: line.into_bytes() });
                if output_tx.send(frame).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "button pipe read failed");
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "button_tests.rs"]
mod tests;
