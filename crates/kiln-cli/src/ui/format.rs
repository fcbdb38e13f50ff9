//! Human-readable summaries.

use std::time::Duration;

use kiln_bundler::BuildManifest;
use owo_colors::OwoColorize;

use super::colors_enabled;

/// `850ms`, `1.24s`, `2m 5s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Print the task files and externals of a manifest to stderr.
pub fn print_manifest_summary(manifest: &BuildManifest) {
    let label = |text: &str| {
        if colors_enabled() {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    };

    eprintln!(
        "  {} {} ({} runtime)",
        label("target"),
        manifest.target,
        manifest.runtime.as_str()
    );
    for file in manifest.relative_files() {
        eprintln!("  - {}", file.display());
    }
    if let Some(externals) = manifest.externals.as_ref().filter(|e| !e.is_empty()) {
        let names: Vec<String> = externals
            .iter()
            .map(|e| format!("{}@{}", e.name, e.version))
            .collect();
        eprintln!("  {} {}", label("externals"), names.join(", "));
    }
    eprintln!("  {} {}", label("output"), manifest.output_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(1240)), "1.24s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
