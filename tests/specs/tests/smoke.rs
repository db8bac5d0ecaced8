// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end session-plane scenarios: fan-out, button exclusivity,
//! last-detach teardown, late-joiner replay, and graceful shutdown.

use std::time::Duration;

use pagemux::id::WidgetIndex;
use pagemux::page::WidgetSpec;
use pagemux::test_support::{spec_page, MemoryClient};

use pagemux_specs::{
    byte_array, deploy, frame, fresh_room, page_id, recv_frame, recv_until, Deployment,
};

const ROOM: &str = "00000000-0000-4000-8000-aaaaaaaaaaaa";

fn text_deployment(file_name: &str) -> anyhow::Result<(Deployment, std::path::PathBuf)> {
    let dir = tempfile::tempdir()?;
    let watched = dir.path().join(file_name);
    std::fs::write(&watched, "")?;
    let pages = vec![spec_page(
        "/demo",
        dir.path(),
        true,
        vec![WidgetSpec::Text { file: watched.display().to_string() }],
    )?];
    Ok((deploy(dir, pages)?, watched))
}

// S1: two clients share a room; a file change reaches both, and the second
// attacher additionally received a replay frame on connect.
#[tokio::test]
async fn fan_out_to_all_room_clients() -> anyhow::Result<()> {
    let (deployment, watched) = text_deployment("t")?;
    let room = pagemux::id::RoomId::parse(ROOM)?;
    let page_id = page_id("/demo", &room)?;

    let (client_a, mut handle_a) = MemoryClient::pair();
    deployment.mux.attach(page_id.clone(), client_a).await?;
    // initial snapshot of the empty file
    let initial = recv_until(&mut handle_a, |v| v.get("contents").is_some()).await?;
    assert_eq!(initial["contents"], byte_array(""));

    let (client_b, mut handle_b) = MemoryClient::pair();
    deployment.mux.attach(page_id.clone(), client_b).await?;
    // late joiner: exactly one replay frame before any live traffic
    let (replay_widget, replay) = recv_frame(&mut handle_b).await?;
    assert_eq!(replay_widget, page_id.widget(WidgetIndex(0)));
    assert!(replay.get("contents").is_some());

    std::fs::write(&watched, "hi")?;
    let a = recv_until(&mut handle_a, |v| v["contents"] == byte_array("hi")).await?;
    let b = recv_until(&mut handle_b, |v| v["contents"] == byte_array("hi")).await?;
    assert_eq!(a, b);

    deployment.mux.shutdown().await;
    Ok(())
}

// S2: three rapid clicks spawn one child: one clear frame, one output
// line, then silence.
#[tokio::test]
async fn button_clicks_are_exclusive() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pages = vec![spec_page(
        "/demo",
        dir.path(),
        true,
        vec![WidgetSpec::Button {
            label: "Run".to_owned(),
            command: "sleep 0.3; echo done".to_owned(),
        }],
    )?];
    let deployment = deploy(dir, pages)?;
    let room = fresh_room()?;
    let page_id = page_id("/demo", &room)?;
    let widget_id = page_id.widget(WidgetIndex(0));

    let (client, mut handle) = MemoryClient::pair();
    deployment.mux.attach(page_id.clone(), client).await?;

    for _ in 0..3 {
        handle
            .to_server
            .send((widget_id.clone(), frame(serde_json::json!({"click": true}))))
            .await?;
    }

    let (_, clear) = recv_frame(&mut handle).await?;
    assert_eq!(clear, serde_json::json!({"clear": true}));

    let (_, output) = recv_frame(&mut handle).await?;
    assert_eq!(output["origin"], "stdout");
    assert_eq!(output["data"], byte_array("done"));

    // no second clear or output: the extra clicks were ignored
    let extra =
        tokio::time::timeout(Duration::from_millis(500), handle.from_server.recv()).await;
    assert!(extra.is_err(), "unexpected extra frame: {extra:?}");

    deployment.mux.shutdown().await;
    Ok(())
}

// S3: the last detach tears the room down; a fresh attach sees fresh
// widgets, not the previous instance's cache.
#[tokio::test]
async fn last_detach_tears_down_and_restarts_fresh() -> anyhow::Result<()> {
    let (deployment, watched) = text_deployment("t")?;
    let room = fresh_room()?;
    let page_id = page_id("/demo", &room)?;

    let (client, mut handle) = MemoryClient::pair();
    deployment.mux.attach(page_id.clone(), client).await?;
    std::fs::write(&watched, "v1")?;
    recv_until(&mut handle, |v| v["contents"] == byte_array("v1")).await?;

    // disconnect; the room drains and the page stops
    drop(handle);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // mutate while no room exists, then attach again: the first frame is
    // the fresh driver's snapshot of the current file
    std::fs::write(&watched, "v2")?;
    let (client, mut handle) = MemoryClient::pair();
    deployment.mux.attach(page_id.clone(), client).await?;
    let first = recv_until(&mut handle, |v| v.get("contents").is_some()).await?;
    assert_eq!(first["contents"], byte_array("v2"));

    deployment.mux.shutdown().await;
    Ok(())
}

// S4: an editor write comes back as a contents frame, and a late joiner's
// first payload is the cached state rather than a recomputation.
#[tokio::test]
async fn editor_late_joiner_replays_written_state() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let edited = dir.path().join("doc");
    std::fs::write(&edited, "")?;
    let pages = vec![spec_page(
        "/demo",
        dir.path(),
        true,
        vec![WidgetSpec::Editor { file: edited.display().to_string() }],
    )?];
    let deployment = deploy(dir, pages)?;
    let room = fresh_room()?;
    let page_id = page_id("/demo", &room)?;
    let widget_id = page_id.widget(WidgetIndex(0));

    let (client_a, mut handle_a) = MemoryClient::pair();
    deployment.mux.attach(page_id.clone(), client_a).await?;

    handle_a
        .to_server
        .send((widget_id.clone(), frame(serde_json::json!({"contents": byte_array("X")}))))
        .await?;
    recv_until(&mut handle_a, |v| v["contents"] == byte_array("X")).await?;

    let (client_b, mut handle_b) = MemoryClient::pair();
    deployment.mux.attach(page_id.clone(), client_b).await?;
    let (_, replay) = recv_frame(&mut handle_b).await?;
    assert_eq!(replay["contents"], byte_array("X"));

    deployment.mux.shutdown().await;
    Ok(())
}

// S6: shutdown with live rooms closes every client and terminates.
#[tokio::test]
async fn graceful_shutdown_closes_everything() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let watched = dir.path().join("t");
    std::fs::write(&watched, "")?;
    let pages = vec![
        spec_page(
            "/demo",
            dir.path(),
            true,
            vec![WidgetSpec::Text { file: watched.display().to_string() }],
        )?,
        spec_page(
            "/other",
            dir.path(),
            true,
            vec![WidgetSpec::Button { label: "Run".to_owned(), command: "true".to_owned() }],
        )?,
    ];
    let deployment = deploy(dir, pages)?;

    let room_a = fresh_room()?;
    let room_b = fresh_room()?;
    let (client_a, _handle_a) = MemoryClient::pair();
    let (client_b, _handle_b) = MemoryClient::pair();
    deployment.mux.attach(page_id("/demo", &room_a)?, client_a.clone()).await?;
    deployment.mux.attach(page_id("/other", &room_b)?, client_b.clone()).await?;

    tokio::time::timeout(Duration::from_secs(10), deployment.mux.shutdown())
        .await
        .map_err(|_| anyhow::anyhow!("shutdown never finished"))?;

    assert!(client_a.is_closed());
    assert!(client_b.is_closed());

    let (client, _handle) = MemoryClient::pair();
    assert!(deployment.mux.attach(page_id("/demo", &room_a)?, client).await.is_err());
    Ok(())
}
