//! # exdata CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;

use exdata_cli::{check, download, upload, Context, GlobalArgs};

/// exdata — hash-addressed artifact transfer.
///
/// Downloads, uploads, and checks files tracked by digest sidecars
/// against a project's configured remotes, through a shared local
/// content-addressed cache.
#[derive(Parser, Debug)]
#[command(name = "exdata", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Materialize tracked files from their digest sidecars.
    Download(download::DownloadArgs),
    /// Publish files to their responsible remotes.
    Upload(upload::UploadArgs),
    /// Verify remotes still hold tracked content.
    Check(check::CheckArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::load(&cli.global)?;

    match &cli.command {
        Commands::Download(args) => download::run(args, &ctx),
        Commands::Upload(args) => upload::run(args, &ctx),
        Commands::Check(args) => check::run(args, &ctx),
    }
}
