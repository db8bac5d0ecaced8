// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Watch one file: Base64 snapshots on stdout, Base64 writes on stdin.
#[derive(Parser)]
#[command(name = "pagemux-monitor-write", version, about)]
struct Args {
    /// File to watch.
    path: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = monitor_write::run(args.path).await {
        monitor_write::proto::report_error("fatal", &e);
        std::process::exit(1);
    }
}
