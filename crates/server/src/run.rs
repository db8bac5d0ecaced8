// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level server wiring — shared by `main` and integration tests.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::executor::ContainerExecutor;
use crate::mux::Multiplexer;
use crate::parser::{DirectoryParser, Parser};
use crate::transport::{build_router, AppState};

/// Install the tracing subscriber per config. Safe to call twice (the
/// second call is a no-op), so tests can share it.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let _ = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
}

/// Serve pages until SIGINT/SIGTERM, then drain the multiplexer.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let pages = DirectoryParser::new(&config.pages_dir)
        .pages()
        .with_context(|| format!("failed to load pages from {}", config.pages_dir.display()))?;
    info!(pages = pages.len(), "pages loaded");

    let executor = Arc::new(ContainerExecutor::new(pages.clone(), config.container_runtime()));
    let mux = Arc::new(Multiplexer::new(pages.clone(), executor));
    let router = build_router(Arc::new(AppState { pages, mux: Arc::clone(&mux) }));

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    info!(addr = %listener.local_addr()?, "listening");

    // the multiplexer drains inside the graceful-shutdown future: closing
    // its clients is what lets the open WebSocket connections finish
    let drain_mux = Arc::clone(&mux);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            drain_mux.shutdown().await;
        })
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Build every interactive page's image (administrative one-shot).
pub async fn build_images(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let pages = DirectoryParser::new(&config.pages_dir)
        .pages()
        .with_context(|| format!("failed to load pages from {}", config.pages_dir.display()))?;
    let executor = ContainerExecutor::new(pages, config.container_runtime());
    executor.build_images().await
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    info!("termination signal received");
}
