use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Available kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the worker bundle for deployment
    ///
    /// Bundles every task module once and writes the outputs together with
    /// build-manifest.json into the output directory.
    Build(BuildArgs),

    /// Start a dev session that rebuilds on change
    ///
    /// Watches the project and publishes a fresh build manifest after every
    /// successful rebuild. Stop with Ctrl+C.
    Dev(DevArgs),
}

/// Arguments for the build command
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Settings file to use instead of kiln.toml / kiln.json
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output directory, relative to the project directory
    #[arg(short = 'o', long, default_value = "dist", value_name = "DIR")]
    pub out_dir: PathBuf,
}

/// Arguments for the dev command
#[derive(Args, Debug, Clone, Default)]
pub struct DevArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Settings file to use instead of kiln.toml / kiln.json
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep temporary build and worker directories after the session stops
    #[arg(long)]
    pub keep_tmp_dirs: bool,
}
