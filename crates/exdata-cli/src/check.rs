//! # Check Subcommand
//!
//! Verifies that the responsible remote (or its overlays) still holds
//! the content each tracked file's sidecar records. Never touches the
//! cache.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use exdata_transfer::ExdataError;

use crate::{absolute, run_each, Context};

/// Arguments for the check subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Tracked data files to verify.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &CheckArgs, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine();
    run_each(&args.files, ctx.keep_going, |file| {
        let file = absolute(file)?;
        match engine.check(&file) {
            Ok(()) => {
                println!("OK: {}", file.display());
                Ok(())
            }
            Err(err) => {
                if let ExdataError::RemoteMissing { chain, .. } = &err {
                    if !ctx.verbose {
                        eprintln!("{}", serde_json::to_string_pretty(chain)?);
                    }
                }
                Err(err).with_context(|| format!("checking '{}'", file.display()))
            }
        }
    })
}
