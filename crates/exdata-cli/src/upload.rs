//! # Upload Subcommand
//!
//! Publishes files to their responsible remotes and refreshes the
//! digest sidecars next to them.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;

use crate::{absolute, run_each, Context};

/// Arguments for the upload subcommand.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Data files to publish (not their sidecar files).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &UploadArgs, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine();
    run_each(&args.files, ctx.keep_going, |file| {
        let file = absolute(file)?;
        let report = engine
            .publish(&file)
            .with_context(|| format!("uploading '{}'", file.display()))?;
        if report.uploaded {
            println!("Uploaded: {} ({})", file.display(), report.hash);
        } else {
            println!("Already uploaded: {} ({})", file.display(), report.hash);
        }
        Ok(())
    })
}
