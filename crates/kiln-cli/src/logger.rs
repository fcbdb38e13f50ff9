//! Logging setup for the kiln binary.
//!
//! Library crates only emit `tracing` events; this module installs the one
//! subscriber that prints them.
//!
//! # Verbosity
//!
//! 1. `--verbose`: debug for kiln crates
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`: custom filter
//! 4. otherwise info for kiln crates

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub(crate) const VERBOSE_FILTER: &str =
    "kiln=debug,kiln_cli=debug,kiln_bundler=debug,kiln_config=debug";
pub(crate) const QUIET_FILTER: &str = "kiln=error,kiln_cli=error,kiln_bundler=error,kiln_config=error";
pub(crate) const DEFAULT_FILTER: &str =
    "kiln=info,kiln_cli=info,kiln_bundler=info,kiln_config=info";

/// Install the global tracing subscriber.
///
/// Call once, before anything logs. Output goes to stderr so that stdout
/// stays free for command output.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Install the global subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
