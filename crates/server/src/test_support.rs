// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit and end-to-end tests.
//!
//! `MemoryClient` is an in-process [`Client`] backed by channels, and
//! `fake_runtime` writes a shell shim that stands in for the container
//! runtime CLI: volumes and builds succeed silently, `run` either executes
//! the trailing command directly or emulates the monitor-write helper by
//! polling the watched file.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::{Client, ClientFuture};
use crate::id::WidgetId;
use crate::page::{PageMetadata, PageSpec, WidgetSpec};

/// In-process client: the test side speaks through [`MemoryClientHandle`].
pub struct MemoryClient {
    incoming: tokio::sync::Mutex<mpsc::Receiver<(WidgetId, Bytes)>>,
    outgoing: mpsc::Sender<(WidgetId, Bytes)>,
    closed: CancellationToken,
}

/// The test's end of a [`MemoryClient`]. Dropping `to_server` reads as an
/// orderly disconnect on the multiplexer side.
pub struct MemoryClientHandle {
    pub to_server: mpsc::Sender<(WidgetId, Bytes)>,
    pub from_server: mpsc::Receiver<(WidgetId, Bytes)>,
}

impl MemoryClient {
    pub fn pair() -> (Arc<Self>, MemoryClientHandle) {
        let (to_server, incoming) = mpsc::channel(64);
        let (outgoing, from_server) = mpsc::channel(64);
        let client = Arc::new(Self {
            incoming: tokio::sync::Mutex::new(incoming),
            outgoing,
            closed: CancellationToken::new(),
        });
        (client, MemoryClientHandle { to_server, from_server })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Client for MemoryClient {
    fn read(&self) -> ClientFuture<'_, Option<(WidgetId, Bytes)>> {
        Box::pin(async move {
            let mut incoming = self.incoming.lock().await;
            tokio::select! {
                message = incoming.recv() => Ok(message),
                _ = self.closed.cancelled() => Ok(None),
            }
        })
    }

    fn write(&self, widget_id: &WidgetId, data: Bytes) -> ClientFuture<'_, ()> {
        let widget_id = widget_id.clone();
        Box::pin(async move {
            if self.closed.is_cancelled() {
                anyhow::bail!("client is closed");
            }
            self.outgoing
                .send((widget_id, data))
                .await
                .map_err(|_| anyhow::anyhow!("client receiver dropped"))
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.closed.cancel();
        })
    }
}

/// Build a page spec without going through the directory parser.
pub fn spec_page(
    url: &str,
    base_path: &Path,
    is_interactive: bool,
    widgets: Vec<WidgetSpec>,
) -> anyhow::Result<PageSpec> {
    Ok(PageSpec {
        metadata: PageMetadata {
            is_interactive,
            base_path: base_path.to_path_buf(),
            url: crate::id::PageUrl::parse(url)?,
            title: url.trim_start_matches('/').to_owned(),
        },
        widgets,
    })
}

/// Shell shim standing in for the container runtime CLI.
const FAKE_RUNTIME: &str = r#"#!/bin/sh
# fake container runtime: volumes and builds succeed, `run` is emulated
cmd="$1"
shift 2>/dev/null || true
[ "$cmd" = run ] || exit 0

image=""
while [ $# -gt 0 ]; do
    arg="$1"
    shift
    case "$arg" in
        --name|--mount|--workdir) shift ;;
        --*) ;;
        *) image="$arg"; break ;;
    esac
done

case "$image" in
    *-monitor-write)
        file="$1"
        last="__unset__"
        while :; do
            enc=$(base64 < "$file" 2>/dev/null | tr -d '\n')
            if [ "$enc" != "$last" ]; then
                printf '{"type":"contents","contents":"%s"}\n' "$enc"
                last="$enc"
            fi
            sleep 0.1
        done
        ;;
    *)
        if [ $# -gt 0 ]; then
            exec "$@"
        fi
        exec sleep 30
        ;;
esac
"#;

/// Write the fake runtime shim into `dir` and return its path.
pub fn fake_runtime(dir: &Path) -> anyhow::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-runtime");
    std::fs::write(&path, FAKE_RUNTIME)?;
    let mut permissions = std::fs::metadata(&path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions)?;
    Ok(path)
}
