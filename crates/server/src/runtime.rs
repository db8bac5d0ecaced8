// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime CLI plumbing.
//!
//! The core treats the runtime (docker, podman, …) as an opaque tool with
//! four primitives: create volume, remove volume, build image, run
//! container. All external names derive from hex-encoded IDs so they cannot
//! collide across rooms and orphans can be pruned deterministically.

use anyhow::{bail, Context};
use tokio::process::Command;
use tracing::debug;

use crate::id::{PageId, PageUrl, WidgetId};

/// How to talk to the container runtime. Built once from [`Config`](crate::config::Config).
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    /// Runtime binary, e.g. `docker`.
    binary: String,
    /// Deployment-constant prefix for all volume/image/container names.
    prefix: String,
    /// Extra args spliced into every `run` invocation (resource caps etc.).
    run_args: Vec<String>,
    /// Shell executed inside button and terminal containers.
    shell: String,
}

impl ContainerRuntime {
    pub fn new(binary: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            prefix: prefix.into(),
            run_args: vec!["--network=none".to_owned()],
            shell: "/bin/bash".to_owned(),
        }
    }

    pub fn with_run_args(mut self, run_args: Vec<String>) -> Self {
        self.run_args = run_args;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn volume_name(&self, page_id: &PageId) -> String {
        format!("{}-{}", self.prefix, page_id.encode())
    }

    pub fn image_name(&self, page_url: &PageUrl) -> String {
        format!("{}-{}", self.prefix, page_url.encode())
    }

    pub fn container_name(&self, widget_id: &WidgetId) -> String {
        format!("{}-{}", self.prefix, widget_id.encode())
    }

    /// Image holding the monitor-write helper program.
    pub fn monitor_image_name(&self) -> String {
        format!("{}-monitor-write", self.prefix)
    }

    /// Create the room volume for a page instance.
    pub async fn create_volume(&self, page_id: &PageId) -> anyhow::Result<()> {
        let name = self.volume_name(page_id);
        debug!(volume = %name, "creating volume");
        self.run_checked(&["volume".to_owned(), "create".to_owned(), name]).await
    }

    /// Remove the room volume for a page instance.
    pub async fn remove_volume(&self, page_id: &PageId) -> anyhow::Result<()> {
        let name = self.volume_name(page_id);
        debug!(volume = %name, "removing volume");
        self.run_checked(&["volume".to_owned(), "rm".to_owned(), name]).await
    }

    /// Build the page image from its base path.
    pub async fn build_image(&self, page_url: &PageUrl, base_path: &std::path::Path) -> anyhow::Result<()> {
        let tag = self.image_name(page_url);
        debug!(image = %tag, context = %base_path.display(), "building image");
        self.run_checked(&[
            "build".to_owned(),
            "--tag".to_owned(),
            tag,
            base_path.display().to_string(),
        ])
        .await
    }

    /// Argv for a one-shot button container running `command` under the shell.
    pub fn button_argv(&self, widget_id: &WidgetId, command: &str) -> Vec<String> {
        let mut argv = self.run_prefix(widget_id, false, false);
        argv.push(self.image_name(widget_id.page().url()));
        argv.push(self.shell.clone());
        argv.push("-c".to_owned());
        argv.push(command.to_owned());
        argv
    }

    /// Argv for the long-running monitor-write sidecar watching `file`.
    pub fn monitor_argv(&self, widget_id: &WidgetId, file: &str) -> Vec<String> {
        let mut argv = self.run_prefix(widget_id, true, false);
        argv.push(self.monitor_image_name());
        argv.push(file.to_owned());
        argv
    }

    /// Argv for a PTY-attached interactive shell in `working_directory`.
    pub fn terminal_argv(&self, widget_id: &WidgetId, working_directory: &str) -> Vec<String> {
        let mut argv = self.run_prefix(widget_id, true, true);
        argv.push("--workdir".to_owned());
        argv.push(working_directory.to_owned());
        argv.push(self.image_name(widget_id.page().url()));
        argv.push(self.shell.clone());
        argv
    }

    /// Common `run` argv head: binary, flags, deterministic name, volume mount.
    fn run_prefix(&self, widget_id: &WidgetId, interactive: bool, tty: bool) -> Vec<String> {
        let mut argv = vec![self.binary.clone(), "run".to_owned(), "--rm".to_owned()];
        if interactive {
            argv.push("--interactive".to_owned());
        }
        if tty {
            argv.push("--tty".to_owned());
        }
        argv.push("--name".to_owned());
        argv.push(self.container_name(widget_id));
        argv.extend(self.run_args.iter().cloned());
        argv.push("--mount".to_owned());
        argv.push(format!("src={},dst=/data", self.volume_name(widget_id.page())));
        argv
    }

    async fn run_checked(&self, args: &[String]) -> anyhow::Result<()> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to invoke {} {}", self.binary, args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "{} {} failed: {}",
                self.binary,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
