//! Structured build diagnostics.
//!
//! Engines report problems as [`BuildDiagnostic`] values: cloneable,
//! serializable, and independent of whichever engine produced them. The
//! logging helpers at the bottom are how failed and noisy passes reach the
//! `tracing` collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A single error or warning from a bundling pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiagnostic {
    pub kind: DiagnosticKind,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    /// Plugin that raised the diagnostic, if any
    pub plugin: Option<String>,
}

/// Diagnostic kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnresolvedEntry,
    UnresolvedImport,
    DynamicImport,
    Plugin,
    Io,
    Other(String),
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

impl BuildDiagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            file: None,
            line: None,
            plugin: None,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            ..Self::error(kind, message)
        }
    }

    pub fn with_location(mut self, file: impl AsRef<Path>, line: Option<u32>) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self.line = line;
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Convert a failing plugin hook into an error diagnostic.
    pub fn from_plugin_error(plugin: &str, hook: &str, error: &anyhow::Error) -> Self {
        Self::error(
            DiagnosticKind::Plugin,
            format!("[plugin {}] {} hook failed: {:#}", plugin, hook, error),
        )
        .with_plugin(plugin)
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::UnresolvedEntry => write!(f, "UnresolvedEntry"),
            DiagnosticKind::UnresolvedImport => write!(f, "UnresolvedImport"),
            DiagnosticKind::DynamicImport => write!(f, "DynamicImport"),
            DiagnosticKind::Plugin => write!(f, "Plugin"),
            DiagnosticKind::Io => write!(f, "Io"),
            DiagnosticKind::Other(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: ", file.display(), line)?,
            (Some(file), None) => write!(f, "{}: ", file.display())?,
            _ => {}
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One diagnostic per line, for log output and error messages.
pub fn format_messages(messages: &[BuildDiagnostic]) -> String {
    messages
        .iter()
        .map(|m| format!("  - {}", m))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Report a failed pass. No manifest is produced for it.
pub fn log_build_failure(errors: &[BuildDiagnostic], warnings: &[BuildDiagnostic]) {
    tracing::error!(
        errors = errors.len(),
        warnings = warnings.len(),
        "Build failed:\n{}",
        format_messages(errors)
    );
    if !warnings.is_empty() {
        log_build_warnings(warnings);
    }
}

/// Report warnings from a pass that otherwise succeeded.
pub fn log_build_warnings(warnings: &[BuildDiagnostic]) {
    tracing::warn!(
        warnings = warnings.len(),
        "Build produced warnings:\n{}",
        format_messages(warnings)
    );
}
