// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::executor::{ExecFuture, UnknownWidget};
use crate::id::{PageUrl, RoomId, WidgetId, WidgetIndex};
use crate::page::WidgetSpec;
use crate::test_support::{spec_page, MemoryClient, MemoryClientHandle};

const ROOM_A: &str = "00000000-0000-4000-8000-aaaaaaaaaaaa";
const ROOM_B: &str = "00000000-0000-4000-8000-bbbbbbbbbbbb";

fn page_id(url: &str, room: &str) -> anyhow::Result<PageId> {
    Ok(PageId::from_parts(PageUrl::parse(url)?, RoomId::parse(room)?))
}

struct FakeWidget {
    /// Test side pushes outbound frames here; `None` once stopped.
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    state: Mutex<Bytes>,
}

/// Scripted executor: tests push outbound frames and observe writes.
struct FakeExecutor {
    pages: Vec<PageSpec>,
    widgets: Mutex<HashMap<WidgetId, Arc<FakeWidget>>>,
    started: Mutex<Vec<PageId>>,
    stopped: Mutex<Vec<PageId>>,
    writes: Mutex<Vec<(WidgetId, Bytes)>>,
    stop_delay: Duration,
    fail_start: bool,
}

impl FakeExecutor {
    fn new(pages: Vec<PageSpec>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            widgets: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            stop_delay: Duration::ZERO,
            fail_start: false,
        })
    }

    fn with_stop_delay(pages: Vec<PageSpec>, delay: Duration) -> Arc<Self> {
        let mut fake = Self::new(pages);
        if let Some(inner) = Arc::get_mut(&mut fake) {
            inner.stop_delay = delay;
        }
        fake
    }

    fn widget(&self, widget_id: &WidgetId) -> anyhow::Result<Arc<FakeWidget>> {
        self.widgets
            .lock()
            .get(widget_id)
            .cloned()
            .ok_or_else(|| anyhow::Error::new(UnknownWidget(widget_id.clone())))
    }

    async fn push_frame(&self, widget_id: &WidgetId, data: &[u8]) -> anyhow::Result<()> {
        let sender = {
            let widget = self.widget(widget_id)?;
            let sender = widget.outbound.lock().clone();
            sender.ok_or_else(|| anyhow::anyhow!("widget stopped"))?
        };
        sender.send(Bytes::copy_from_slice(data)).await?;
        Ok(())
    }

    fn set_state(&self, widget_id: &WidgetId, state: &[u8]) -> anyhow::Result<()> {
        *self.widget(widget_id)?.state.lock() = Bytes::copy_from_slice(state);
        Ok(())
    }

    fn start_count(&self, page_id: &PageId) -> usize {
        self.started.lock().iter().filter(|p| *p == page_id).count()
    }

    fn stop_count(&self, page_id: &PageId) -> usize {
        self.stopped.lock().iter().filter(|p| *p == page_id).count()
    }
}

impl Executor for FakeExecutor {
    fn start_page(&self, page_id: PageId) -> ExecFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_start {
                anyhow::bail!("start refused");
            }
            let page = page_from_url(&self.pages, page_id.url())
                .ok_or_else(|| anyhow::anyhow!("no page with URL \"{}\"", page_id.url()))?;
            self.started.lock().push(page_id.clone());

            let mut widgets = self.widgets.lock();
            for (index, _) in page.interactive_widgets() {
                let (outbound_tx, outbound_rx) = mpsc::channel(64);
                widgets.insert(
                    page_id.widget(index),
                    Arc::new(FakeWidget {
                        outbound: Mutex::new(Some(outbound_tx)),
                        outbound_rx: tokio::sync::Mutex::new(outbound_rx),
                        state: Mutex::new(Bytes::from_static(b"{}")),
                    }),
                );
            }
            Ok(())
        })
    }

    fn stop_page(&self, page_id: PageId) -> ExecFuture<'_, ()> {
        Box::pin(async move {
            tokio::time::sleep(self.stop_delay).await;
            self.stopped.lock().push(page_id.clone());
            let page = page_from_url(&self.pages, page_id.url())
                .ok_or_else(|| anyhow::anyhow!("no page with URL \"{}\"", page_id.url()))?;
            let mut widgets = self.widgets.lock();
            for (index, _) in page.interactive_widgets() {
                if let Some(widget) = widgets.remove(&page_id.widget(index)) {
                    // dropping the sender ends the reader's stream
                    widget.outbound.lock().take();
                }
            }
            Ok(())
        })
    }

    fn read(&self, widget_id: WidgetId) -> ExecFuture<'_, Option<Bytes>> {
        Box::pin(async move {
            let widget = self.widget(&widget_id)?;
            let mut receiver = widget.outbound_rx.lock().await;
            Ok(receiver.recv().await)
        })
    }

    fn write(&self, widget_id: WidgetId, data: Bytes) -> ExecFuture<'_, ()> {
        Box::pin(async move {
            self.widget(&widget_id)?;
            self.writes.lock().push((widget_id, data));
            Ok(())
        })
    }

    fn current_state(&self, widget_id: WidgetId) -> ExecFuture<'_, Bytes> {
        Box::pin(async move { Ok(self.widget(&widget_id)?.state.lock().clone()) })
    }
}

fn demo_pages() -> anyhow::Result<Vec<PageSpec>> {
    let base = std::path::Path::new("/tmp");
    Ok(vec![
        spec_page(
            "/demo",
            base,
            true,
            vec![
                WidgetSpec::Markdown { contents: "intro".to_owned() },
                WidgetSpec::Text { file: "/data/out.txt".to_owned() },
            ],
        )?,
        spec_page("/other", base, true, vec![WidgetSpec::Text { file: "/data/x".to_owned() }])?,
        spec_page("/inert", base, false, vec![])?,
    ])
}

async fn recv_frame(
    handle: &mut MemoryClientHandle,
) -> anyhow::Result<(WidgetId, Bytes)> {
    tokio::time::timeout(Duration::from_secs(5), handle.from_server.recv())
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for fan-out"))?
        .ok_or_else(|| anyhow::anyhow!("client stream closed"))
}

#[tokio::test]
async fn attach_starts_page_once_and_fans_out() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let executor = FakeExecutor::new(pages.clone());
    let mux = Multiplexer::new(pages, executor.clone());
    let page_id = page_id("/demo", ROOM_A)?;
    let widget_id = page_id.widget(WidgetIndex(1));

    let (client_a, mut handle_a) = MemoryClient::pair();
    let (client_b, mut handle_b) = MemoryClient::pair();

    mux.attach(page_id.clone(), client_a).await?;
    executor.set_state(&widget_id, br#"{"contents":[104,105]}"#)?;
    mux.attach(page_id.clone(), client_b).await?;
    assert_eq!(executor.start_count(&page_id), 1);

    // the late joiner got exactly one replay frame on connect
    let (replay_widget, replay) = recv_frame(&mut handle_b).await?;
    assert_eq!(replay_widget, widget_id);
    assert_eq!(&replay[..], br#"{"contents":[104,105]}"#);

    executor.push_frame(&widget_id, br#"{"contents":[104,111]}"#).await?;
    let (_, frame_a) = recv_frame(&mut handle_a).await?;
    let (_, frame_b) = recv_frame(&mut handle_b).await?;
    assert_eq!(&frame_a[..], br#"{"contents":[104,111]}"#);
    assert_eq!(&frame_b[..], br#"{"contents":[104,111]}"#);

    mux.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn frames_preserve_order_per_widget() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let executor = FakeExecutor::new(pages.clone());
    let mux = Multiplexer::new(pages, executor.clone());
    let page_id = page_id("/demo", ROOM_A)?;
    let widget_id = page_id.widget(WidgetIndex(1));

    let (client, mut handle) = MemoryClient::pair();
    mux.attach(page_id.clone(), client).await?;

    for n in 0u8..5 {
        executor.push_frame(&widget_id, &[b'[', b'0' + n, b']']).await?;
    }
    for n in 0u8..5 {
        let (_, frame) = recv_frame(&mut handle).await?;
        assert_eq!(&frame[..], &[b'[', b'0' + n, b']']);
    }

    mux.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn attach_errors_for_bad_pages() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let executor = FakeExecutor::new(pages.clone());
    let mux = Multiplexer::new(pages, executor.clone());

    let (client, _handle) = MemoryClient::pair();
    assert!(mux.attach(page_id("/missing", ROOM_A)?, client.clone()).await.is_err());
    assert!(mux.attach(page_id("/inert", ROOM_A)?, client).await.is_err());

    mux.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn failed_start_fails_the_attach() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let mut executor = FakeExecutor::new(pages.clone());
    if let Some(inner) = Arc::get_mut(&mut executor) {
        inner.fail_start = true;
    }
    let mux = Multiplexer::new(pages, executor.clone());

    let (client, _handle) = MemoryClient::pair();
    assert!(mux.attach(page_id("/demo", ROOM_A)?, client).await.is_err());
    assert_eq!(executor.stop_count(&page_id("/demo", ROOM_A)?), 0);

    mux.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn client_writes_reach_the_executor() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let executor = FakeExecutor::new(pages.clone());
    let mux = Multiplexer::new(pages, executor.clone());
    let page_id = page_id("/demo", ROOM_A)?;
    let widget_id = page_id.widget(WidgetIndex(1));

    let (client, handle) = MemoryClient::pair();
    mux.attach(page_id.clone(), client).await?;

    handle
        .to_server
        .send((widget_id.clone(), Bytes::from_static(br#"{"contents":[88]}"#)))
        .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if executor.writes.lock().iter().any(|(id, _)| *id == widget_id) {
            break;
        }
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "write never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    mux.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn last_detach_stops_the_page_exactly_once() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let executor = FakeExecutor::new(pages.clone());
    let mux = Multiplexer::new(pages, executor.clone());
    let page_id = page_id("/demo", ROOM_A)?;

    let (client, handle) = MemoryClient::pair();
    mux.attach(page_id.clone(), client).await?;

    drop(handle); // orderly disconnect

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while executor.stop_count(&page_id) == 0 {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "page never stopped");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(executor.stop_count(&page_id), 1);

    // a new attach starts a fresh instance
    let (client, _handle) = MemoryClient::pair();
    mux.attach(page_id.clone(), client).await?;
    assert_eq!(executor.start_count(&page_id), 2);

    mux.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn attach_during_teardown_waits_for_fresh_room() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let executor = FakeExecutor::with_stop_delay(pages.clone(), Duration::from_millis(200));
    let mux = Multiplexer::new(pages, executor.clone());
    let page_id = page_id("/demo", ROOM_A)?;

    let (client_a, handle_a) = MemoryClient::pair();
    mux.attach(page_id.clone(), client_a).await?;
    drop(handle_a);

    // give the detach a moment to enter the Stopping phase
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (client_b, _handle_b) = MemoryClient::pair();
    mux.attach(page_id.clone(), client_b).await?;

    assert_eq!(executor.stop_count(&page_id), 1);
    assert_eq!(executor.start_count(&page_id), 2);

    mux.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_clients_and_stops_rooms() -> anyhow::Result<()> {
    let pages = demo_pages()?;
    let executor = FakeExecutor::new(pages.clone());
    let mux = Multiplexer::new(pages, executor.clone());
    let demo = page_id("/demo", ROOM_A)?;
    let other = page_id("/other", ROOM_B)?;

    let (client_a, _handle_a) = MemoryClient::pair();
    let (client_b, _handle_b) = MemoryClient::pair();
    mux.attach(demo.clone(), client_a.clone()).await?;
    mux.attach(other.clone(), client_b.clone()).await?;

    mux.shutdown().await;

    assert!(client_a.is_closed());
    assert!(client_b.is_closed());
    assert_eq!(executor.stop_count(&demo), 1);
    assert_eq!(executor.stop_count(&other), 1);

    // no new attaches after shutdown
    let (client, _handle) = MemoryClient::pair();
    assert!(mux.attach(demo, client).await.is_err());
    Ok(())
}
