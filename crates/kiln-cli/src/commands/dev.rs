//! `kiln dev`: run a dev session until Ctrl+C.

use tokio::signal;

use crate::cli::DevArgs;
use crate::commands::utils::load_config;
use crate::dev::{DevSessionOptions, start_dev_session};
use crate::error::Result;
use crate::ui;

/// Execute the dev command.
///
/// Starts a session, reports every manifest it publishes and stops it on
/// Ctrl+C. Bad edits only log errors; the session keeps running.
pub async fn execute(args: DevArgs) -> Result<()> {
    let mut config = load_config(args.cwd.as_deref(), args.config.as_deref())?;
    if args.keep_tmp_dirs {
        config.dev.keep_tmp_dirs = true;
    }

    ui::info(&format!("Starting dev session for {}", config.project));
    ui::info(&format!("Working directory: {}", config.working_dir.display()));

    let session = start_dev_session(DevSessionOptions::new(config)).await?;
    let mut manifests = session.subscribe();

    match manifests.borrow_and_update().as_ref() {
        Some(manifest) => {
            ui::success(&format!("Initial build ready ({} task files)", manifest.files.len()));
            ui::print_manifest_summary(manifest);
        }
        None => ui::warning("Initial build failed; waiting for changes"),
    }
    ui::info("Watching for changes. Press Ctrl+C to stop");

    loop {
        tokio::select! {
            changed = manifests.changed() => {
                if changed.is_err() {
                    ui::warning("Dev session ended unexpectedly");
                    break;
                }
                let current = manifests.borrow_and_update().clone();
                if let Some(manifest) = current {
                    ui::success(&format!("Rebuilt ({} task files)", manifest.files.len()));
                    ui::print_manifest_summary(&manifest);
                }
            }
            _ = signal::ctrl_c() => {
                ui::info("Stopping dev session...");
                break;
            }
        }
    }

    session.stop().await;
    ui::success("Dev session stopped");
    Ok(())
}
