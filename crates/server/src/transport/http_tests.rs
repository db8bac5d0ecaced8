// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use crate::executor::ContainerExecutor;
use crate::mux::Multiplexer;
use crate::page::WidgetSpec;
use crate::runtime::ContainerRuntime;
use crate::test_support::spec_page;
use crate::transport::{build_router, AppState};

fn test_router() -> anyhow::Result<axum::Router> {
    let pages = vec![
        spec_page(
            "/demo",
            std::path::Path::new("/tmp"),
            true,
            vec![WidgetSpec::Text { file: "/data/out.txt".to_owned() }],
        )?,
        spec_page("/inert", std::path::Path::new("/tmp"), false, vec![])?,
    ];
    let runtime = ContainerRuntime::new("true", "pagemux-test");
    let executor = Arc::new(ContainerExecutor::new(pages.clone(), runtime));
    let mux = Arc::new(Multiplexer::new(pages.clone(), executor));
    Ok(build_router(Arc::new(AppState { pages, mux })))
}

async fn body_json(response: axum::response::Response) -> anyhow::Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn pages_endpoint_lists_metadata() -> anyhow::Result<()> {
    let router = test_router()?;
    let response =
        router.oneshot(Request::builder().uri("/pages").body(Body::empty())?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let value = body_json(response).await?;
    let urls: Vec<&str> =
        value.as_array().map_or(vec![], |a| a.iter().filter_map(|p| p["url"].as_str()).collect());
    assert_eq!(urls, vec!["/demo", "/inert"]);
    assert_eq!(value[0]["isInteractive"], true);
    assert_eq!(value[1]["isInteractive"], false);
    Ok(())
}

#[tokio::test]
async fn page_endpoint_serves_widgets() -> anyhow::Result<()> {
    let router = test_router()?;
    let response = router
        .oneshot(Request::builder().uri("/page?page_url=/demo").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let value = body_json(response).await?;
    assert_eq!(value["widgets"][0]["type"], "text");
    Ok(())
}

#[tokio::test]
async fn page_endpoint_errors() -> anyhow::Result<()> {
    let router = test_router()?;

    let missing = router
        .clone()
        .oneshot(Request::builder().uri("/page?page_url=/missing").body(Body::empty())?)
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let malformed = router
        .clone()
        .oneshot(Request::builder().uri("/page?page_url=demo").body(Body::empty())?)
        .await?;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let no_param =
        router.oneshot(Request::builder().uri("/page").body(Body::empty())?).await?;
    assert_eq!(no_param.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

/// A GET request carrying the WebSocket upgrade headers, so the upgrade
/// extractor succeeds and the handler's own validation is what responds.
fn ws_request(uri: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .uri(uri)
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())?)
}

#[tokio::test]
async fn attach_endpoint_validates_before_upgrade() -> anyhow::Result<()> {
    let router = test_router()?;

    let bad_room = router
        .clone()
        .oneshot(ws_request("/page/attach?page_url=/demo&room_id=nope")?)
        .await?;
    assert_eq!(bad_room.status(), StatusCode::BAD_REQUEST);

    let missing = router
        .clone()
        .oneshot(ws_request(
            "/page/attach?page_url=/missing&room_id=00000000-0000-4000-8000-aaaaaaaaaaaa",
        )?)
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let forbidden = router
        .oneshot(ws_request(
            "/page/attach?page_url=/inert&room_id=00000000-0000-4000-8000-aaaaaaaaaaaa",
        )?)
        .await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    Ok(())
}
