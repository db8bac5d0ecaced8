// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket boundary: page metadata endpoints plus the attach
//! endpoint that wraps an upgraded socket as a [`Client`](crate::client::Client).

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::mux::Multiplexer;
use crate::page::PageSpec;

/// Shared state for all transport handlers.
pub struct AppState {
    pub pages: Vec<PageSpec>,
    pub mux: Arc<Multiplexer>,
}

/// Assemble the service router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/pages", get(http::list_pages))
        .route("/page", get(http::get_page))
        .route("/page/attach", get(ws::attach_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
