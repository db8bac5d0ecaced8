// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket attach endpoint and the client adapter it produces.
//!
//! The outer envelope is `{"widgetIndex": <int>, "data": <object>}` in both
//! directions; the core only ever sees `(WidgetId, bytes)` pairs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::AppState;
use crate::client::{Client, ClientFuture};
use crate::id::{PageId, PageUrl, RoomId, WidgetId, WidgetIndex};
use crate::page::page_from_url;

#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    pub page_url: String,
    pub room_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "widgetIndex")]
    widget_index: usize,
    data: serde_json::Value,
}

/// `GET /page/attach?page_url=&room_id=` — upgrade and attach.
pub async fn attach_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttachQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let url = match PageUrl::parse(&query.page_url) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let room = match RoomId::parse(&query.room_id) {
        Ok(room) => room,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let Some(page) = page_from_url(&state.pages, &url) else {
        return (StatusCode::NOT_FOUND, format!("no page with URL \"{url}\"")).into_response();
    };
    if !page.is_interactive() {
        return (
            StatusCode::FORBIDDEN,
            format!("cannot attach to non-interactive page \"{url}\""),
        )
            .into_response();
    }

    let page_id = PageId::from_parts(url, room);
    let widget_count = page.widgets.len();
    ws.on_upgrade(move |socket| handle_socket(state, socket, page_id, widget_count))
}

async fn handle_socket(
    state: Arc<AppState>,
    socket: WebSocket,
    page_id: PageId,
    widget_count: usize,
) {
    let client = Arc::new(WsClient::new(socket, page_id.clone(), widget_count));

    if let Err(e) = state.mux.attach(page_id.clone(), Arc::clone(&client) as Arc<dyn Client>).await {
        warn!(page = %page_id, error = %e, "attach failed");
        client.close_with_diagnostic(&format!("attach failed: {e:#}")).await;
        return;
    }

    // the multiplexer owns the read loop from here; hold the connection
    // open until it ends
    client.wait_closed().await;
    debug!(page = %page_id, "connection closed");
}

/// One WebSocket connection adapted to the [`Client`] contract.
pub struct WsClient {
    page_id: PageId,
    widget_count: usize,
    reader: tokio::sync::Mutex<SplitStream<WebSocket>>,
    writer: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
    closed: CancellationToken,
}

impl WsClient {
    pub fn new(socket: WebSocket, page_id: PageId, widget_count: usize) -> Self {
        let (writer, reader) = socket.split();
        Self {
            page_id,
            widget_count,
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            closed: CancellationToken::new(),
        }
    }

    pub async fn wait_closed(&self) {
        self.closed.cancelled().await;
    }

    /// Close the socket with a diagnostic close frame.
    pub async fn close_with_diagnostic(&self, reason: &str) {
        let mut writer = self.writer.lock().await;
        let _ = writer
            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                code: axum::extract::ws::close_code::POLICY,
                reason: reason.to_owned().into(),
            })))
            .await;
        self.closed.cancel();
    }

    fn decode(&self, raw: &[u8]) -> anyhow::Result<(WidgetId, Bytes)> {
        decode_envelope(&self.page_id, self.widget_count, raw)
    }
}

impl Client for WsClient {
    fn read(&self) -> ClientFuture<'_, Option<(WidgetId, Bytes)>> {
        Box::pin(async move {
            let mut reader = self.reader.lock().await;
            loop {
                let message = tokio::select! {
                    message = reader.next() => message,
                    _ = self.closed.cancelled() => return Ok(None),
                };
                match message {
                    None => {
                        self.closed.cancel();
                        return Ok(None);
                    }
                    Some(Err(e)) => {
                        self.closed.cancel();
                        return Err(e.into());
                    }
                    Some(Ok(Message::Text(text))) => {
                        return match self.decode(text.as_bytes()) {
                            Ok(pair) => Ok(Some(pair)),
                            Err(e) => {
                                self.closed.cancel();
                                Err(e)
                            }
                        };
                    }
                    Some(Ok(Message::Binary(data))) => {
                        return match self.decode(&data) {
                            Ok(pair) => Ok(Some(pair)),
                            Err(e) => {
                                self.closed.cancel();
                                Err(e)
                            }
                        };
                    }
                    Some(Ok(Message::Close(_))) => {
                        self.closed.cancel();
                        return Ok(None);
                    }
                    Some(Ok(_)) => continue,
                }
            }
        })
    }

    fn write(&self, widget_id: &WidgetId, data: Bytes) -> ClientFuture<'_, ()> {
        let text = encode_envelope(&self.page_id, widget_id, &data);
        Box::pin(async move {
            let text = text?;
            let mut writer = self.writer.lock().await;
            writer.send(Message::Text(text.into())).await.map_err(|e| {
                self.closed.cancel();
                anyhow::anyhow!("websocket send failed: {e}")
            })
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            let _ = writer.send(Message::Close(None)).await;
            self.closed.cancel();
        })
    }
}

/// Parse an inbound envelope into the core's `(WidgetId, bytes)` pair.
fn decode_envelope(
    page_id: &PageId,
    widget_count: usize,
    raw: &[u8],
) -> anyhow::Result<(WidgetId, Bytes)> {
    let envelope: Envelope = serde_json::from_slice(raw)?;
    if envelope.widget_index >= widget_count {
        anyhow::bail!(
            "widget index {} at page \"{page_id}\" is out of range",
            envelope.widget_index
        );
    }
    let widget_id = page_id.widget(WidgetIndex(envelope.widget_index));
    let data = Bytes::from(serde_json::to_vec(&envelope.data)?);
    Ok((widget_id, data))
}

/// Wrap an outbound frame in the envelope, checking the widget belongs to
/// this connection's page instance.
fn encode_envelope(page_id: &PageId, widget_id: &WidgetId, data: &[u8]) -> anyhow::Result<String> {
    if widget_id.page() != page_id {
        anyhow::bail!("widget ID \"{widget_id}\" does not belong to page \"{page_id}\"");
    }
    let envelope = Envelope {
        widget_index: widget_id.index().0,
        data: serde_json::from_slice(data).unwrap_or(serde_json::Value::Null),
    };
    Ok(serde_json::to_string(&envelope)?)
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
