// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The multiplexer attaches and detaches clients to room-scoped page
//! instances and fans messages between them and the executor.
//!
//! All room state lives in one reducer task; attach requests, client
//! frames, widget frames, detaches, and teardown completions arrive as
//! events over channels. Per-client and per-widget I/O runs in helper tasks
//! that post events back, so the reducer itself never blocks on a
//! transport. Room membership, page lifecycle, and fan-out state are
//! tightly coupled — funnelling them through one serial reducer removes
//! the attach-during-stop and read-during-detach races outright.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use bytes::Bytes;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::executor::{Executor, UnknownWidget};
use crate::id::{PageId, WidgetId};
use crate::page::{page_from_url, PageSpec};

struct AttachRequest {
    page_id: PageId,
    client: Arc<dyn Client>,
    /// 1-buffered so the reducer's reply never blocks on the submitter.
    reply: mpsc::Sender<anyhow::Result<()>>,
}

/// Lifecycle phase of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomPhase {
    Running,
    Stopping,
}

struct Room {
    phase: RoomPhase,
    clients: Vec<(u64, Arc<dyn Client>)>,
    /// Attach requests that arrived while the room was draining; replayed
    /// once teardown completes.
    pending: Vec<AttachRequest>,
}

/// Public handle: concurrent `attach` plus coordinated `shutdown`.
pub struct Multiplexer {
    attach_tx: mpsc::Sender<AttachRequest>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Multiplexer {
    /// Start the reducer for the given pages on top of an executor.
    pub fn new(pages: Vec<PageSpec>, executor: Arc<dyn Executor>) -> Self {
        let (attach_tx, attach_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        let reducer = Reducer {
            pages,
            executor,
            rooms: HashMap::new(),
            next_client_token: 0,
            closing: false,
            tracker: tracker.clone(),
            shutdown: shutdown.clone(),
        };
        tracker.spawn(reducer.run(attach_rx));

        Self { attach_tx, shutdown, tracker }
    }

    /// Attach a client to a page instance, starting the page if this is the
    /// first client. On success the multiplexer owns the client's read loop
    /// until it disconnects. Safe to call concurrently.
    pub async fn attach(&self, page_id: PageId, client: Arc<dyn Client>) -> anyhow::Result<()> {
        if self.shutdown.is_cancelled() {
            bail!("multiplexer is shutting down");
        }
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        let request = AttachRequest { page_id: page_id.clone(), client, reply: reply_tx };
        if self.attach_tx.send(request).await.is_err() {
            bail!("multiplexer is shutting down");
        }
        match reply_rx.recv().await {
            Some(result) => result,
            None => bail!("attach to page \"{page_id}\" was dropped"),
        }
    }

    /// Stop accepting attaches, close every client, and wait until all
    /// rooms have drained and every multiplexer task has finished.
    pub async fn shutdown(&self) {
        info!("multiplexer shutting down");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Events posted back to the reducer by helper tasks.
struct Frame {
    widget_id: WidgetId,
    data: Bytes,
}

struct Detach {
    page_id: PageId,
    client_token: u64,
}

struct Reducer {
    pages: Vec<PageSpec>,
    executor: Arc<dyn Executor>,
    rooms: HashMap<PageId, Room>,
    next_client_token: u64,
    closing: bool,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Reducer {
    async fn run(mut self, mut attach_rx: mpsc::Receiver<AttachRequest>) {
        let (client_frames_tx, mut client_frames_rx) = mpsc::channel::<Frame>(256);
        let (widget_frames_tx, mut widget_frames_rx) = mpsc::channel::<Frame>(256);
        let (detach_tx, mut detach_rx) = mpsc::channel::<Detach>(64);
        let (stop_done_tx, mut stop_done_rx) = mpsc::channel::<PageId>(64);
        let shutdown = self.shutdown.clone();

        loop {
            let closing = self.closing;
            tokio::select! {
                // 1. Attach requests
                request = attach_rx.recv() => {
                    if let Some(request) = request {
                        self.handle_attach(request, &client_frames_tx, &widget_frames_tx, &detach_tx).await;
                    }
                }

                // 2. Client frames → executor writes
                frame = client_frames_rx.recv() => {
                    if let Some(frame) = frame {
                        if let Err(e) = self.executor.write(frame.widget_id.clone(), frame.data).await {
                            warn!(widget = %frame.widget_id, error = %e, "widget write failed");
                        }
                    }
                }

                // 3. Widget frames → fan out to the room's clients
                frame = widget_frames_rx.recv() => {
                    if let Some(frame) = frame {
                        self.fan_out(frame).await;
                    }
                }

                // 4. Client disconnects
                detach = detach_rx.recv() => {
                    if let Some(detach) = detach {
                        self.handle_detach(detach, &stop_done_tx);
                    }
                }

                // 5. Page teardown completed
                page_id = stop_done_rx.recv() => {
                    if let Some(page_id) = page_id {
                        self.handle_stop_done(page_id, &client_frames_tx, &widget_frames_tx, &detach_tx).await;
                    }
                }

                // 6. Shutdown: close every client, let detaches cascade
                _ = shutdown.cancelled(), if !closing => {
                    self.closing = true;
                    self.close_all_clients();
                }
            }

            if self.closing && self.rooms.is_empty() {
                debug!("all rooms drained, reducer exiting");
                return;
            }
        }
    }

    async fn handle_attach(
        &mut self,
        request: AttachRequest,
        client_frames_tx: &mpsc::Sender<Frame>,
        widget_frames_tx: &mpsc::Sender<Frame>,
        detach_tx: &mpsc::Sender<Detach>,
    ) {
        if self.closing {
            reply(&request, Err(anyhow::anyhow!("multiplexer is shutting down")));
            return;
        }

        let page_id = request.page_id.clone();
        let Some(page) = page_from_url(&self.pages, page_id.url()) else {
            reply(&request, Err(anyhow::anyhow!("no page with URL \"{}\"", page_id.url())));
            return;
        };
        if !page.is_interactive() {
            reply(
                &request,
                Err(anyhow::anyhow!("page \"{}\" is not interactive", page_id.url())),
            );
            return;
        }
        let page = page.clone();

        match self.rooms.get(&page_id).map(|room| room.phase) {
            None => {
                if let Err(e) = self.executor.start_page(page_id.clone()).await {
                    reply(&request, Err(e.context(format!("failed to start page \"{page_id}\""))));
                    return;
                }

                // one reader task per interactive widget
                for (index, _) in page.interactive_widgets() {
                    let widget_id = page_id.widget(index);
                    let executor = Arc::clone(&self.executor);
                    let frames = widget_frames_tx.clone();
                    self.tracker.spawn(async move {
                        loop {
                            match executor.read(widget_id.clone()).await {
                                Ok(Some(data)) => {
                                    let frame = Frame { widget_id: widget_id.clone(), data };
                                    if frames.send(frame).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => return,
                                Err(e) => {
                                    // an unknown widget here just means the page
                                    // stopped under us
                                    if e.downcast_ref::<UnknownWidget>().is_some() {
                                        debug!(widget = %widget_id, "widget gone, reader exiting");
                                    } else {
                                        warn!(widget = %widget_id, error = %e, "widget read failed");
                                    }
                                    return;
                                }
                            }
                        }
                    });
                }

                self.rooms.insert(
                    page_id.clone(),
                    Room { phase: RoomPhase::Running, clients: Vec::new(), pending: Vec::new() },
                );
            }
            Some(RoomPhase::Stopping) => {
                // park the attach until teardown completes, then replay it
                debug!(page = %page_id, "attach parked on stopping room");
                if let Some(room) = self.rooms.get_mut(&page_id) {
                    room.pending.push(request);
                }
                return;
            }
            Some(RoomPhase::Running) => {
                // late joiner: replay current state before registering
                for (index, _) in page.interactive_widgets() {
                    let widget_id = page_id.widget(index);
                    let state = match self.executor.current_state(widget_id.clone()).await {
                        Ok(state) => state,
                        Err(e) => {
                            reply(
                                &request,
                                Err(e.context(format!(
                                    "failed to get current state of widget \"{widget_id}\""
                                ))),
                            );
                            return;
                        }
                    };
                    if let Err(e) = request.client.write(&widget_id, state).await {
                        reply(
                            &request,
                            Err(e.context(format!(
                                "failed to replay state to client for page \"{page_id}\""
                            ))),
                        );
                        return;
                    }
                }
            }
        }

        let token = self.next_client_token;
        self.next_client_token += 1;

        let client = Arc::clone(&request.client);
        if let Some(room) = self.rooms.get_mut(&page_id) {
            room.clients.push((token, Arc::clone(&client)));
        }

        // the client's read loop; one detach event on EOF or error
        let frames = client_frames_tx.clone();
        let detach = detach_tx.clone();
        let reader_page_id = page_id.clone();
        self.tracker.spawn(async move {
            loop {
                match client.read().await {
                    Ok(Some((widget_id, data))) => {
                        if frames.send(Frame { widget_id, data }).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // treated like a disconnect
                        warn!(page = %reader_page_id, error = %e, "client read failed");
                        break;
                    }
                }
            }
            let _ = detach.send(Detach { page_id: reader_page_id, client_token: token }).await;
        });

        debug!(page = %page_id, token, "client attached");
        reply(&request, Ok(()));
    }

    /// Deliver one widget frame to every client of its room, in parallel,
    /// but frame-sequentially per widget.
    async fn fan_out(&self, frame: Frame) {
        let page_id = frame.widget_id.page();
        let Some(room) = self.rooms.get(page_id) else {
            return;
        };

        let writes = room.clients.iter().map(|(token, client)| {
            let token = *token;
            let widget_id = &frame.widget_id;
            let data = frame.data.clone();
            async move {
                if let Err(e) = client.write(widget_id, data).await {
                    warn!(widget = %widget_id, token, error = %e, "client write failed");
                }
            }
        });
        join_all(writes).await;
    }

    fn handle_detach(&mut self, detach: Detach, stop_done_tx: &mpsc::Sender<PageId>) {
        let Some(room) = self.rooms.get_mut(&detach.page_id) else {
            return;
        };
        room.clients.retain(|(token, _)| *token != detach.client_token);
        debug!(page = %detach.page_id, token = detach.client_token, "client detached");

        if room.clients.is_empty() && room.phase == RoomPhase::Running {
            room.phase = RoomPhase::Stopping;
            // stop in a helper task so the reducer stays responsive and can
            // drain the stopping page's widget frames
            let executor = Arc::clone(&self.executor);
            let page_id = detach.page_id.clone();
            let done = stop_done_tx.clone();
            self.tracker.spawn(async move {
                if let Err(e) = executor.stop_page(page_id.clone()).await {
                    // no error channel to the clients; continue removal
                    warn!(page = %page_id, error = %e, "stop page failed");
                }
                let _ = done.send(page_id).await;
            });
        }
    }

    async fn handle_stop_done(
        &mut self,
        page_id: PageId,
        client_frames_tx: &mpsc::Sender<Frame>,
        widget_frames_tx: &mpsc::Sender<Frame>,
        detach_tx: &mpsc::Sender<Detach>,
    ) {
        let pending = match self.rooms.remove(&page_id) {
            Some(room) => room.pending,
            None => Vec::new(),
        };
        debug!(page = %page_id, pending = pending.len(), "room removed");

        // attaches that parked during teardown now start a fresh room
        for request in pending {
            self.handle_attach(request, client_frames_tx, widget_frames_tx, detach_tx).await;
        }
    }

    fn close_all_clients(&mut self) {
        for (page_id, room) in &self.rooms {
            debug!(page = %page_id, clients = room.clients.len(), "closing room clients");
            let clients: Vec<Arc<dyn Client>> =
                room.clients.iter().map(|(_, client)| Arc::clone(client)).collect();
            self.tracker.spawn(async move {
                join_all(clients.iter().map(|client| client.close())).await;
            });
        }
    }
}

fn reply(request: &AttachRequest, result: anyhow::Result<()>) {
    let _ = request.reply.try_send(result);
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
