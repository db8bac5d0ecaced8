// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Page metadata endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use super::AppState;
use crate::id::PageUrl;
use crate::page::{page_from_url, PageMetadata};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page_url: String,
}

/// `GET /pages` — metadata of every loaded page.
pub async fn list_pages(State(state): State<Arc<AppState>>) -> Json<Vec<PageMetadata>> {
    Json(state.pages.iter().map(|page| page.metadata.clone()).collect())
}

/// `GET /page?page_url=` — one page with its widgets.
pub async fn get_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let url = match PageUrl::parse(&query.page_url) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    match page_from_url(&state.pages, &url) {
        Some(page) => Json(page).into_response(),
        None => {
            (StatusCode::NOT_FOUND, format!("no page with URL \"{url}\"")).into_response()
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
