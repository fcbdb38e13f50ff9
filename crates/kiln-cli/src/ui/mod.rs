//! Terminal status output.
//!
//! Status lines go to stderr. Colors follow `NO_COLOR` / `FORCE_COLOR` and
//! the terminal's capabilities, and can be turned off with `--no-color`.
//!
//! ```no_run
//! use kiln_cli::ui;
//!
//! ui::init_colors(false);
//! ui::info("Bundling tasks...");
//! ui::success("Manifest updated");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

mod format;
mod messages;

pub use format::{format_duration, print_manifest_summary};
pub use messages::{error, info, success, warning};

/// Whether we're running under a CI provider.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "BUILDKITE"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Whether colored output should be used on stderr.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::user_attended_stderr() && !is_ci()
}

static COLORS: AtomicBool = AtomicBool::new(false);

/// Apply the color decision to every status line printed afterwards.
pub fn init_colors(no_color: bool) {
    let enabled = !no_color && should_use_color();
    COLORS.store(enabled, Ordering::Relaxed);
    console::set_colors_enabled_stderr(enabled);
}

pub(crate) fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}
