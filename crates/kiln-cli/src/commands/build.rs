//! `kiln build`: bundle once for deployment and write the manifest.

use std::sync::Arc;
use std::time::Instant;

use kiln_bundler::{
    BuildContext, BuildManifest, BuildTarget, BundleOptions, Bundler, ExternalsExtension,
    ManifestBuilder,
};

use crate::cli::BuildArgs;
use crate::commands::utils::{load_config, resolve_against};
use crate::error::{CliError, Result, ResultExt};
use crate::ui;

/// Execute the build command.
///
/// 1. Load and validate the project settings
/// 2. Run extension start hooks and bundle once into the output directory
/// 3. Build the deploy manifest, fold it through the complete hooks
/// 4. Write `build-manifest.json` next to the outputs
pub async fn execute(args: BuildArgs) -> Result<()> {
    let started = Instant::now();
    let config = load_config(args.cwd.as_deref(), args.config.as_deref())?;
    let out_dir = resolve_against(&config.working_dir, &args.out_dir);
    if out_dir == config.working_dir {
        return Err(CliError::InvalidArgument(
            "--out-dir must not be the project directory".to_string(),
        ));
    }

    ui::info(&format!("Building {} for deploy", config.project));

    let manifest = build_manifest(&config, &out_dir).await?;
    let path = manifest
        .write_to(&out_dir)
        .await
        .context("Failed to write build manifest")?;

    ui::success(&format!(
        "Built {} task files in {}",
        manifest.files.len(),
        ui::format_duration(started.elapsed())
    ));
    ui::print_manifest_summary(&manifest);
    ui::info(&format!("Manifest: {}", path.display()));
    Ok(())
}

/// Bundle into `out_dir` and return the final deploy manifest.
pub async fn build_manifest(
    config: &kiln_config::ResolvedConfig,
    out_dir: &std::path::Path,
) -> Result<BuildManifest> {
    let mut context = BuildContext::new(BuildTarget::Deploy, config.clone());
    context.add_extension(Arc::new(ExternalsExtension::from_config(config)))?;
    context.notify_build_start().await?;

    let bundler = Bundler::default();
    tracing::debug!(engine = bundler.engine_name(), out = %out_dir.display(), "bundling");
    let outcome = bundler
        .build(
            BundleOptions::new(config.clone(), out_dir),
            context.collect_plugins(),
        )
        .await?;
    let bundle = outcome
        .bundle
        .ok_or_else(|| CliError::Custom("bundler returned no result".to_string()))?;

    let manifest = ManifestBuilder::new(BuildTarget::Deploy)
        .from_bundle(&bundle, out_dir, config, None)
        .await?;
    Ok(context.notify_build_complete(manifest).await?)
}
