// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

/// Read PTY output until the stream reports the child gone.
async fn drain(pty: &PtyProcess) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut buf = vec![0u8; 4096];
    loop {
        match pty.read_chunk(&mut buf).await {
            Ok(PtyRead::Data(n)) => collected.extend_from_slice(&buf[..n]),
            Ok(PtyRead::Closed) | Err(_) => break,
        }
    }
    collected
}

#[tokio::test]
async fn spawn_captures_output() -> anyhow::Result<()> {
    let pty = PtyProcess::spawn(&["echo".into(), "pty-marker".into()])?;
    let output = drain(&pty).await;
    let status = pty.wait().await?;

    assert!(String::from_utf8_lossy(&output).contains("pty-marker"));
    assert_eq!(status, ExitStatus::Code(0));
    Ok(())
}

#[tokio::test]
async fn write_round_trips_through_cat() -> anyhow::Result<()> {
    let pty = PtyProcess::spawn(&["/bin/cat".into()])?;
    pty.write_all(b"roundtrip\n").await?;

    let mut collected = Vec::new();
    let mut buf = vec![0u8; 4096];
    while !String::from_utf8_lossy(&collected).contains("roundtrip") {
        match pty.read_chunk(&mut buf).await? {
            PtyRead::Data(n) => collected.extend_from_slice(&buf[..n]),
            PtyRead::Closed => break,
        }
    }
    assert!(String::from_utf8_lossy(&collected).contains("roundtrip"));

    // EOT closes cat
    pty.write_all(b"\x04").await?;
    let status = pty.wait().await?;
    assert_eq!(status, ExitStatus::Code(0));
    Ok(())
}

#[tokio::test]
async fn sigterm_is_reported() -> anyhow::Result<()> {
    let pty = PtyProcess::spawn(&["sleep".into(), "30".into()])?;
    pty.signal(Signal::SIGTERM)?;
    let status = pty.wait().await?;
    assert_eq!(status, ExitStatus::Signal(Signal::SIGTERM as i32));
    Ok(())
}

#[tokio::test]
async fn closed_after_child_exit() -> anyhow::Result<()> {
    let pty = PtyProcess::spawn(&["true".into()])?;
    let _ = drain(&pty).await;

    // once drained, further reads keep reporting the stream as over
    let mut buf = vec![0u8; 64];
    assert_eq!(pty.read_chunk(&mut buf).await?, PtyRead::Closed);

    pty.wait().await?;
    Ok(())
}

#[test]
fn empty_argv_is_rejected() {
    assert!(PtyProcess::spawn(&[]).is_err());
}
