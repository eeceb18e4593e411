//! # Download Subcommand
//!
//! Materializes tracked files from their digest sidecars, through the
//! shared cache.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use exdata_transfer::{CheckFile, ExdataError, FetchOptions};

use crate::{absolute, run_each, Context};

/// How `--check-file` maps onto the engine's checking modes.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default)]
pub enum CheckFileArg {
    /// No remote check; fetch through the cache as normal.
    #[default]
    None,
    /// Only check that the remote has the file, ignoring the cache.
    Only,
    /// Check the remote, then still fetch the file as normal.
    Extra,
}

impl From<CheckFileArg> for CheckFile {
    fn from(arg: CheckFileArg) -> Self {
        match arg {
            CheckFileArg::None => CheckFile::None,
            CheckFileArg::Only => CheckFile::Only,
            CheckFileArg::Extra => CheckFile::Extra,
        }
    }
}

/// Arguments for the download subcommand.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Output destination. If specified, only one input file may be
    /// provided; otherwise the destination is inferred by stripping the
    /// sidecar suffix.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file.
    #[arg(short, long)]
    pub force: bool,

    /// Always download; do not consult or populate the cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Symlink from the cache rather than copying the file.
    #[arg(long)]
    pub symlink: bool,

    /// Check that the remote (or its overlays) has the file, ignoring
    /// the cache. For integrity checks.
    #[arg(long, value_enum, default_value = "none")]
    pub check_file: CheckFileArg,

    /// Sidecar files containing the digests of the desired contents.
    #[arg(required = true)]
    pub hash_files: Vec<PathBuf>,
}

pub fn run(args: &DownloadArgs, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine();
    let options = FetchOptions {
        force: args.force,
        use_cache: !args.no_cache,
        symlink: args.symlink,
        check_file: args.check_file.into(),
    };

    if let Some(output) = &args.output {
        if args.hash_files.len() != 1 {
            anyhow::bail!("only one input file may be provided with --output");
        }
        let hash_file = absolute(&args.hash_files[0])?;
        return fetch_one(ctx, &engine, &hash_file, &absolute(output)?, &options);
    }

    run_each(&args.hash_files, ctx.keep_going, |hash_file| {
        let hash_file = absolute(hash_file)?;
        let output = engine.data_path_for(&hash_file)?;
        fetch_one(ctx, &engine, &hash_file, &output, &options)
    })
}

fn fetch_one(
    ctx: &Context,
    engine: &exdata_transfer::TransferEngine<'_>,
    hash_file: &std::path::Path,
    output: &std::path::Path,
    options: &FetchOptions,
) -> anyhow::Result<()> {
    if ctx.verbose {
        let rel = ctx.project.relpath(&engine.data_path_for(hash_file)?)?;
        let dump = engine.describe_remote(&rel)?;
        println!("{}", serde_json::to_string_pretty(&dump)?);
    }
    match engine.fetch(hash_file, output, options) {
        Ok(_) => Ok(()),
        Err(err) => {
            if let ExdataError::RemoteMissing { chain, .. } = &err {
                if !ctx.verbose {
                    eprintln!("{}", serde_json::to_string_pretty(chain)?);
                }
            }
            Err(err).with_context(|| format!("downloading '{}'", hash_file.display()))
        }
    }
}
