//! Command-line interface definition for kiln.
//!
//! - `kiln build` - one-shot deploy build with a manifest on disk
//! - `kiln dev` - watch-mode dev session that keeps a manifest current

mod commands;

use clap::Parser;

pub use commands::{BuildArgs, Command, DevArgs};

/// Kiln - bundles task sources into worker builds
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Bundle task sources into worker builds",
    long_about = "Kiln turns a project's task modules into a worker bundle described by a\n\
                  build manifest, and keeps that bundle current while you edit."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
