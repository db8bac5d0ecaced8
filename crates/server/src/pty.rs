// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY plumbing for the terminal widget driver.
//!
//! One [`PtyProcess`] is one child command on a fresh pseudo-terminal. The
//! master side is non-blocking and driven through tokio's fd readiness.
//! Reads report [`PtyRead::Closed`] for both EOF and EIO — on Linux the
//! master raises EIO once the slave side is gone, so either way the child
//! has exited and the caller should reap it.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, Pid};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// Terminal geometry handed to the kernel at spawn; the driver never
/// resizes.
const PTY_COLS: u16 = 80;
const PTY_ROWS: u16 = 24;

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited on its own with this code.
    Code(i32),
    /// Killed by this signal.
    Signal(i32),
}

/// Outcome of one master-side read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtyRead {
    /// This many bytes were placed at the start of the buffer.
    Data(usize),
    /// EOF or EIO: the child has exited and the stream is over.
    Closed,
}

/// Wrapper so the master fd can live inside [`AsyncFd`].
#[derive(Debug)]
struct Master(OwnedFd);

impl AsRawFd for Master {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

/// A child process attached to a pseudo-terminal.
pub struct PtyProcess {
    master: AsyncFd<Master>,
    child_pid: Pid,
    reaped: AtomicBool,
}

impl PtyProcess {
    /// Fork `argv` onto a fresh PTY.
    // fork+exec requires unsafe; the child branch stays on
    // async-signal-safe ground
    #[allow(unsafe_code)]
    pub fn spawn(argv: &[String]) -> anyhow::Result<Self> {
        let program = argv.first().ok_or_else(|| anyhow::anyhow!("terminal argv is empty"))?;
        // the argv is converted before forking: the child must not
        // allocate, so everything it touches is prepared here
        let c_argv = argv
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("argv for {program} contains a NUL byte"))?;

        let geometry = Winsize {
            ws_col: PTY_COLS,
            ws_row: PTY_ROWS,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: after the fork the child only calls execvp and _exit,
        // both async-signal-safe; the prepared argv is plain memory.
        let forked = unsafe { forkpty(&geometry, None) }.context("forkpty failed")?;
        match forked {
            ForkptyResult::Child => {
                let _ = execvp(&c_argv[0], &c_argv);
                // exec failed; this process has nothing left to run
                unsafe { libc::_exit(127) }
            }
            ForkptyResult::Parent { child, master } => Ok(Self {
                master: nonblocking_master(master)?,
                child_pid: child,
                reaped: AtomicBool::new(false),
            }),
        }
    }

    pub fn child_pid(&self) -> Pid {
        self.child_pid
    }

    /// Send a signal to the child.
    pub fn signal(&self, signal: Signal) -> io::Result<()> {
        kill(self.child_pid, signal).map_err(errno_to_io)
    }

    /// Read the next chunk from the master into `buf`.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<PtyRead> {
        let result = self
            .master
            .async_io(Interest::READABLE, |master| {
                nix::unistd::read(&master.0, buf).map_err(errno_to_io)
            })
            .await;
        match result {
            Ok(0) => Ok(PtyRead::Closed),
            Ok(n) => Ok(PtyRead::Data(n)),
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(PtyRead::Closed),
            Err(e) => Err(e),
        }
    }

    /// Write all of `data` to the master.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let written = self
                .master
                .async_io(Interest::WRITABLE, |master| {
                    nix::unistd::write(&master.0, remaining).map_err(errno_to_io)
                })
                .await?;
            remaining = &remaining[written..];
        }
        Ok(())
    }

    /// Reap the child on a blocking thread and return how it ended.
    pub async fn wait(&self) -> anyhow::Result<ExitStatus> {
        let pid = self.child_pid;
        let status = tokio::task::spawn_blocking(move || reap(pid))
            .await
            .context("reaper thread failed")??;
        self.reaped.store(true, Ordering::Release);
        Ok(status)
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.reaped.load(Ordering::Acquire) {
            return;
        }
        // the supervisor never reaped this child; don't leave it behind
        let _ = kill(self.child_pid, Signal::SIGKILL);
        let _ = waitpid(self.child_pid, None);
    }
}

/// Block until the child is gone, swallowing signal interruptions and
/// stop/continue states.
fn reap(pid: Pid) -> anyhow::Result<ExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus::Code(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(ExitStatus::Signal(signal as i32))
            }
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(e) => anyhow::bail!("cannot reap terminal child {pid}: {e}"),
        }
    }
}

/// Put the master fd into non-blocking mode and register it with the
/// runtime.
fn nonblocking_master(fd: OwnedFd) -> anyhow::Result<AsyncFd<Master>> {
    let flags = OFlag::from_bits_truncate(fcntl(&fd, FcntlArg::F_GETFL).map_err(errno_to_io)?);
    fcntl(&fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(errno_to_io)?;
    AsyncFd::new(Master(fd)).context("failed to register PTY master with the runtime")
}

fn errno_to_io(errno: Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
