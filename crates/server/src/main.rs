// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use pagemux::config::Config;

#[derive(Parser)]
#[command(name = "pagemux", version, about = "Backend for container-backed interactive pages.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Build the image of every interactive page, then exit.
    BuildImages,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    let result = match cli.subcommand {
        Some(Commands::BuildImages) => pagemux::run::build_images(cli.config).await,
        None => pagemux::run::run(cli.config).await,
    };

    if let Err(e) = result {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
