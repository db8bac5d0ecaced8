// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session-plane scenarios.
//!
//! Builds a deployment whose container runtime is a shell shim: volumes and
//! builds succeed silently, monitor-write widgets run the real helper
//! binary against host paths, and buttons/terminals exec their trailing
//! command directly. No container runtime is required.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use pagemux::executor::ContainerExecutor;
use pagemux::id::{PageId, PageUrl, RoomId, WidgetId};
use pagemux::mux::Multiplexer;
use pagemux::page::PageSpec;
use pagemux::runtime::ContainerRuntime;
use pagemux::test_support::MemoryClientHandle;

/// Resolve the path to the compiled monitor-write helper binary.
pub fn helper_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("pagemux-monitor-write")
}

/// A deployment wired onto the fake runtime, plus its scratch directory.
pub struct Deployment {
    pub mux: Arc<Multiplexer>,
    pub dir: tempfile::TempDir,
}

/// Build a multiplexer + executor over the given pages.
pub fn deploy(dir: tempfile::TempDir, pages: Vec<PageSpec>) -> anyhow::Result<Deployment> {
    let shim = write_runtime_shim(dir.path(), &helper_binary())?;
    let runtime = ContainerRuntime::new(shim.display().to_string(), "pagemux-e2e")
        .with_shell("/bin/sh");
    let executor = Arc::new(ContainerExecutor::new(pages.clone(), runtime));
    let mux = Arc::new(Multiplexer::new(pages, executor));
    Ok(Deployment { mux, dir })
}

/// A fresh room ID for every test run.
pub fn fresh_room() -> anyhow::Result<RoomId> {
    Ok(RoomId::parse(&uuid::Uuid::new_v4().to_string())?)
}

pub fn page_id(url: &str, room: &RoomId) -> anyhow::Result<PageId> {
    Ok(PageId::from_parts(PageUrl::parse(url)?, room.clone()))
}

/// Receive the next frame, decoded to JSON, within a deadline.
pub async fn recv_frame(
    handle: &mut MemoryClientHandle,
) -> anyhow::Result<(WidgetId, serde_json::Value)> {
    let (widget_id, data) = tokio::time::timeout(Duration::from_secs(10), handle.from_server.recv())
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for frame"))?
        .ok_or_else(|| anyhow::anyhow!("client stream closed"))?;
    Ok((widget_id, serde_json::from_slice(&data)?))
}

/// Receive frames until one matches, within a deadline.
pub async fn recv_until(
    handle: &mut MemoryClientHandle,
    mut matches: impl FnMut(&serde_json::Value) -> bool,
) -> anyhow::Result<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .ok_or_else(|| anyhow::anyhow!("timed out waiting for matching frame"))?;
        let (_, value) = tokio::time::timeout(remaining, handle.from_server.recv())
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for matching frame"))?
            .map(|(id, data)| {
                serde_json::from_slice::<serde_json::Value>(&data).map(|v| (id, v))
            })
            .transpose()?
            .ok_or_else(|| anyhow::anyhow!("client stream closed"))?;
        if matches(&value) {
            return Ok(value);
        }
    }
}

/// The JSON byte-array form of a text payload.
pub fn byte_array(text: &str) -> serde_json::Value {
    serde_json::Value::Array(text.bytes().map(|b| serde_json::Value::from(b as u64)).collect())
}

/// Encode a widget-scoped frame for `MemoryClientHandle::to_server`.
pub fn frame(value: serde_json::Value) -> Bytes {
    Bytes::from(value.to_string())
}

/// Shell shim standing in for the container runtime CLI. Monitor images
/// exec the real helper binary.
fn write_runtime_shim(dir: &Path, helper: &Path) -> anyhow::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
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
    *-monitor-write) exec "{helper}" "$1" ;;
    *)
        if [ $# -gt 0 ]; then
            exec "$@"
        fi
        exec sleep 30
        ;;
esac
"#,
        helper = helper.display(),
    );

    let path = dir.join("runtime-shim");
    std::fs::write(&path, script)?;
    let mut permissions = std::fs::metadata(&path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions)?;
    Ok(path)
}
