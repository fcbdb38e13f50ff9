//! Import scanning for JavaScript and TypeScript sources.
//!
//! This is a lexical scan, not a parse: it finds `import`/`export ... from`
//! statements, `require()` calls and `import()` expressions. Comments are
//! stripped first so commented-out imports are not reported.

use std::sync::LazyLock;

use regex::Regex;

use crate::plugins::ImportKind;

static STATIC_IMPORT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^\s*(?:import|export)\s+(?:type\s+)?(?:[\w*{}\s,$]+\s+from\s+)?["']([^"']+)["']"#,
    )
    .ok()
});

static REQUIRE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\brequire\(\s*["']([^"']+)["']\s*\)"#).ok());

static DYNAMIC_IMPORT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\bimport\(\s*(["'`]?)([^"'`)]*)"#).ok());

static COMMENTS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|(?m)^\s*//[^\n]*").ok());

/// One import found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// The literal specifier; `None` for `import()` of a computed expression
    pub specifier: Option<String>,
    pub kind: ImportKind,
    /// 1-based line of the import
    pub line: u32,
}

/// Find every import in `source`, in source order.
pub fn scan_imports(source: &str) -> Vec<ImportRef> {
    let (Some(static_import), Some(require), Some(dynamic_import), Some(comments)) = (
        STATIC_IMPORT.as_ref(),
        REQUIRE.as_ref(),
        DYNAMIC_IMPORT.as_ref(),
        COMMENTS.as_ref(),
    ) else {
        return Vec::new();
    };

    // Blank out comments but keep newlines so line numbers stay accurate
    let source = comments.replace_all(source, |caps: &regex::Captures<'_>| {
        caps[0]
            .chars()
            .map(|c| if c == '\n' { '\n' } else { ' ' })
            .collect::<String>()
    });

    let mut imports: Vec<(usize, ImportRef)> = Vec::new();

    for caps in static_import.captures_iter(&source) {
        if let Some(m) = caps.get(1) {
            let import = import_at(&source, m.start(), Some(m.as_str()), ImportKind::Static);
            imports.push((m.start(), import));
        }
    }

    for caps in require.captures_iter(&source) {
        if let Some(m) = caps.get(1) {
            let import = import_at(&source, m.start(), Some(m.as_str()), ImportKind::Require);
            imports.push((m.start(), import));
        }
    }

    for caps in dynamic_import.captures_iter(&source) {
        let (Some(quote), Some(m)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        // Template literals with substitutions are as opaque as expressions
        let literal = match quote.as_str() {
            "\"" | "'" => Some(m.as_str()),
            "`" if !m.as_str().contains("${") => Some(m.as_str()),
            _ => None,
        };
        let import = import_at(&source, m.start(), literal, ImportKind::Dynamic);
        imports.push((m.start(), import));
    }

    imports.sort_by_key(|(offset, _)| *offset);
    imports.into_iter().map(|(_, i)| i).collect()
}

fn import_at(source: &str, offset: usize, specifier: Option<&str>, kind: ImportKind) -> ImportRef {
    ImportRef {
        specifier: specifier.map(str::to_string),
        kind,
        line: line_of(source, offset),
    }
}

fn line_of(source: &str, offset: usize) -> u32 {
    let newlines = source.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count();
    u32::try_from(newlines + 1).unwrap_or(u32::MAX)
}

/// Whether `specifier` is a bare package import rather than a path.
pub fn is_bare(specifier: &str) -> bool {
    !(specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || specifier.starts_with('/'))
}

/// The package name of a bare specifier: `@scope/pkg/sub` -> `@scope/pkg`,
/// `pkg/sub` -> `pkg`.
pub fn package_name(specifier: &str) -> &str {
    let mut parts = specifier.splitn(3, '/');
    let first = parts.next().unwrap_or(specifier);
    if first.starts_with('@') {
        match parts.next() {
            Some(second) => &specifier[..first.len() + 1 + second.len()],
            None => specifier,
        }
    } else {
        first
    }
}
