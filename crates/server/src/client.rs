// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The client contract the multiplexer speaks.
//!
//! A client is one connected session. The multiplexer owns the read loop;
//! writes may happen concurrently from fan-out and replay, so
//! implementations serialize them internally.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::id::WidgetId;

/// Boxed future returned by the object-safe [`Client`] methods.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// One connected session, addressed by widget-scoped frames.
///
/// Object-safe for use as `Arc<dyn Client>`.
pub trait Client: Send + Sync + 'static {
    /// Next inbound frame; `Ok(None)` on orderly disconnect. A read error
    /// is treated like a disconnect by the multiplexer.
    fn read(&self) -> ClientFuture<'_, Option<(WidgetId, Bytes)>>;

    /// Deliver one outbound frame. Safe to call concurrently with `read`.
    fn write(&self, widget_id: &WidgetId, data: Bytes) -> ClientFuture<'_, ()>;

    /// Close the underlying transport; `read` returns `Ok(None)` afterwards.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
