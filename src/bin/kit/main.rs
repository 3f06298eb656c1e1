//! `kit`: CLI binary for scriptkit.
//!
//! A thin shim over the library crate that maps flags to each tool's
//! config, draws progress and prints results.

mod args;
mod commands;
mod ui;

use anyhow::Result;
use args::{Cli, Command};
use clap::Parser;
use commands::Ctx;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    ui::init_logging(cli.verbose, cli.quiet, show_progress);

    let ctx = Ctx {
        quiet: cli.quiet,
        json: cli.json,
        show_progress,
    };

    match cli.command {
        Command::Video(a) => commands::video(a, ctx).await,
        Command::Diagram(a) => commands::diagram(a, ctx).await,
        Command::Pdf(a) => commands::pdf(a, ctx).await,
        Command::Stress(a) => commands::stress(a, ctx).await,
        Command::Download(a) => commands::download(a, ctx).await,
    }
}
