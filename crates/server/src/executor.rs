// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The executor owns every live widget driver, keyed by widget ID.
//!
//! Pages start and stop as a unit: the room volume plus one driver per
//! interactive widget. Start stages drivers and rolls all of them back if
//! any construction fails; stop closes them in parallel. The widget map is
//! guarded by one mutex held only across get/put — drivers carry their own
//! internal concurrency.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::Bytes;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::id::{PageId, WidgetId};
use crate::page::{page_from_url, PageSpec, WidgetSpec};
use crate::runtime::ContainerRuntime;
use crate::widget::{ButtonDriver, MonitorDriver, TerminalDriver, WidgetDriver};

/// Boxed future returned by the object-safe [`Executor`] methods.
pub type ExecFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Routing error for widget IDs with no live driver.
#[derive(Debug, Clone)]
pub struct UnknownWidget(pub WidgetId);

impl fmt::Display for UnknownWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no widget with ID \"{}\"", self.0)
    }
}

impl std::error::Error for UnknownWidget {}

/// The multiplexer's seam onto widget execution.
///
/// Object-safe for use as `Arc<dyn Executor>`.
pub trait Executor: Send + Sync + 'static {
    /// Instantiate a page: create its volume and one driver per
    /// interactive widget. Errors if the page is unknown, not interactive,
    /// or already running.
    fn start_page(&self, page_id: PageId) -> ExecFuture<'_, ()>;

    /// Tear a running page down: close every driver, remove the volume.
    fn stop_page(&self, page_id: PageId) -> ExecFuture<'_, ()>;

    /// Next outbound frame of one widget; `Ok(None)` is end of stream.
    /// Concurrent reads of the same widget ID are not allowed.
    fn read(&self, widget_id: WidgetId) -> ExecFuture<'_, Option<Bytes>>;

    /// Apply one inbound frame to a widget. Concurrent writes are allowed.
    fn write(&self, widget_id: WidgetId, data: Bytes) -> ExecFuture<'_, ()>;

    /// Late-joiner replay payload for one widget.
    fn current_state(&self, widget_id: WidgetId) -> ExecFuture<'_, Bytes>;
}

/// Widgets and rooms that are currently alive. One lock, held only across
/// map operations.
#[derive(Default)]
struct Live {
    pages: HashSet<PageId>,
    widgets: HashMap<WidgetId, Arc<WidgetDriver>>,
}

/// Container-backed executor.
pub struct ContainerExecutor {
    pages: Vec<PageSpec>,
    runtime: ContainerRuntime,
    live: Mutex<Live>,
}

impl ContainerExecutor {
    pub fn new(pages: Vec<PageSpec>, runtime: ContainerRuntime) -> Self {
        Self { pages, runtime, live: Mutex::new(Live::default()) }
    }

    /// Build the image of every interactive page (administrative one-shot).
    pub async fn build_images(&self) -> anyhow::Result<()> {
        for page in self.pages.iter().filter(|p| p.is_interactive()) {
            info!(url = %page.url(), "building page image");
            self.runtime
                .build_image(page.url(), &page.metadata.base_path)
                .await
                .with_context(|| format!("failed to build image for page \"{}\"", page.url()))?;
        }
        Ok(())
    }

    fn page_spec(&self, page_id: &PageId) -> anyhow::Result<&PageSpec> {
        page_from_url(&self.pages, page_id.url())
            .ok_or_else(|| anyhow::anyhow!("no page with URL \"{}\"", page_id.url()))
    }

    fn driver(&self, widget_id: &WidgetId) -> anyhow::Result<Arc<WidgetDriver>> {
        self.live
            .lock()
            .widgets
            .get(widget_id)
            .cloned()
            .ok_or_else(|| anyhow::Error::new(UnknownWidget(widget_id.clone())))
    }

    fn build_driver(
        &self,
        widget_id: &WidgetId,
        spec: &WidgetSpec,
    ) -> anyhow::Result<WidgetDriver> {
        match spec {
            WidgetSpec::Text { file } | WidgetSpec::Image { file, .. } => {
                let argv = self.runtime.monitor_argv(widget_id, file);
                Ok(WidgetDriver::Monitor(MonitorDriver::start(argv, false)))
            }
            WidgetSpec::Editor { file } => {
                let argv = self.runtime.monitor_argv(widget_id, file);
                Ok(WidgetDriver::Monitor(MonitorDriver::start(argv, true)))
            }
            WidgetSpec::Button { command, .. } => {
                let argv = self.runtime.button_argv(widget_id, command);
                Ok(WidgetDriver::Button(ButtonDriver::new(argv)))
            }
            WidgetSpec::Terminal { working_directory } => {
                let argv = self.runtime.terminal_argv(widget_id, working_directory);
                Ok(WidgetDriver::Terminal(TerminalDriver::start(argv)))
            }
            WidgetSpec::Markdown { .. } => bail!("markdown widgets are never instantiated"),
        }
    }

    async fn start_page_inner(&self, page_id: PageId) -> anyhow::Result<()> {
        let page = self.page_spec(&page_id)?;
        if !page.is_interactive() {
            bail!("page \"{}\" is not interactive", page_id.url());
        }
        if self.live.lock().pages.contains(&page_id) {
            bail!("page \"{page_id}\" is already running");
        }

        self.runtime
            .create_volume(&page_id)
            .await
            .with_context(|| format!("failed to create volume for page \"{page_id}\""))?;

        let mut staged: Vec<(WidgetId, WidgetDriver)> = Vec::new();
        for (index, spec) in page.interactive_widgets() {
            let widget_id = page_id.widget(index);
            match self.build_driver(&widget_id, spec) {
                Ok(driver) => {
                    debug!(widget = %widget_id, kind = driver.kind(), "widget staged");
                    staged.push((widget_id, driver));
                }
                Err(e) => {
                    // roll back everything staged so far, then the volume
                    join_all(staged.iter().map(|(_, driver)| driver.close())).await;
                    if let Err(e) = self.runtime.remove_volume(&page_id).await {
                        warn!(error = %e, page = %page_id, "rollback volume removal failed");
                    }
                    return Err(e.context(format!(
                        "failed to construct widget driver for page \"{page_id}\""
                    )));
                }
            }
        }

        let mut live = self.live.lock();
        live.pages.insert(page_id.clone());
        for (widget_id, driver) in staged {
            live.widgets.insert(widget_id, Arc::new(driver));
        }
        info!(page = %page_id, "page started");
        Ok(())
    }

    async fn stop_page_inner(&self, page_id: PageId) -> anyhow::Result<()> {
        let page = self.page_spec(&page_id)?;
        if !self.live.lock().pages.contains(&page_id) {
            bail!("page \"{page_id}\" is not running");
        }

        let widget_ids: Vec<WidgetId> =
            page.interactive_widgets().map(|(index, _)| page_id.widget(index)).collect();

        let drivers: Vec<Arc<WidgetDriver>> = {
            let live = self.live.lock();
            widget_ids.iter().filter_map(|id| live.widgets.get(id).cloned()).collect()
        };

        let results = join_all(drivers.iter().map(|driver| driver.close())).await;
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, page = %page_id, "widget close failed");
            }
        }

        let volume_result = self.runtime.remove_volume(&page_id).await;

        {
            let mut live = self.live.lock();
            for widget_id in &widget_ids {
                live.widgets.remove(widget_id);
            }
            live.pages.remove(&page_id);
        }
        info!(page = %page_id, "page stopped");

        volume_result.with_context(|| format!("failed to remove volume for page \"{page_id}\""))
    }
}

impl Executor for ContainerExecutor {
    fn start_page(&self, page_id: PageId) -> ExecFuture<'_, ()> {
        Box::pin(self.start_page_inner(page_id))
    }

    fn stop_page(&self, page_id: PageId) -> ExecFuture<'_, ()> {
        Box::pin(self.stop_page_inner(page_id))
    }

    fn read(&self, widget_id: WidgetId) -> ExecFuture<'_, Option<Bytes>> {
        Box::pin(async move { self.driver(&widget_id)?.read().await })
    }

    fn write(&self, widget_id: WidgetId, data: Bytes) -> ExecFuture<'_, ()> {
        Box::pin(async move { self.driver(&widget_id)?.write(&data).await })
    }

    fn current_state(&self, widget_id: WidgetId) -> ExecFuture<'_, Bytes> {
        Box::pin(async move { Ok(self.driver(&widget_id)?.current_state()) })
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
