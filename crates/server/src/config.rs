// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

use crate::runtime::ContainerRuntime;

/// Backend for interactive pages backed by ephemeral containers.
#[derive(Debug, Clone, Parser)]
#[command(name = "pagemux", version, about)]
pub struct Config {
    /// Directory holding the page definitions.
    #[arg(long, env = "PAGEMUX_PAGES_DIR", default_value = "pages")]
    pub pages_dir: PathBuf,

    /// Host address to bind to.
    #[arg(long, env = "PAGEMUX_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "PAGEMUX_PORT", default_value = "8080")]
    pub port: u16,

    /// Container runtime binary.
    #[arg(long, env = "PAGEMUX_RUNTIME", default_value = "docker")]
    pub runtime: String,

    /// Prefix for all volume, image, and container names.
    #[arg(long, env = "PAGEMUX_PREFIX", default_value = "pagemux")]
    pub prefix: String,

    /// Extra argument spliced into every container run (repeatable).
    /// Defaults to `--network=none` when none are given.
    #[arg(
        long = "run-arg",
        env = "PAGEMUX_RUN_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true
    )]
    pub run_args: Vec<String>,

    /// Shell executed inside button and terminal containers.
    #[arg(long, env = "PAGEMUX_SHELL", default_value = "/bin/bash")]
    pub shell: String,

    /// Log format (json or text).
    #[arg(long, env = "PAGEMUX_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PAGEMUX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.pages_dir.is_dir() {
            anyhow::bail!("pages directory {} does not exist", self.pages_dir.display());
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format \"{}\"", self.log_format);
        }
        Ok(())
    }

    pub fn container_runtime(&self) -> ContainerRuntime {
        let mut runtime =
            ContainerRuntime::new(&self.runtime, &self.prefix).with_shell(&self.shell);
        if !self.run_args.is_empty() {
            runtime = runtime.with_run_args(self.run_args.clone());
        }
        runtime
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
