//! Drops vendored and lock-file sections from unified diffs.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Paths whose diffs are noise for a human summary.
pub const EXCLUDED_PATTERNS: &[&str] = &[
    "**/vendor/**",
    "**/node_modules/**",
    "**/third_party/**",
    "**/Cargo.lock",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/poetry.lock",
    "**/Gemfile.lock",
    "**/composer.lock",
    "**/go.sum",
    "**/*.lock",
];

/// Result of filtering one commit's diff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilteredDiff {
    pub diff: String,
    /// Lines present in the full diff but removed by the filter.
    pub suppressed_lines: usize,
    pub total_lines: usize,
}

#[derive(Debug, Clone)]
pub struct DiffFilter {
    excluded: GlobSet,
}

impl Default for DiffFilter {
    fn default() -> Self {
        Self::new(EXCLUDED_PATTERNS).expect("built-in exclude patterns are valid globs")
    }
}

impl DiffFilter {
    pub fn new(patterns: &[&str]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for p in patterns {
            builder.add(Glob::new(p)?);
        }
        Ok(Self {
            excluded: builder.build()?,
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.is_match(path)
    }

    /// Split at `diff --git` headers and keep only sections whose path is not
    /// excluded. Blank lines before the first header are dropped.
    pub fn apply(&self, full: &str) -> FilteredDiff {
        let mut kept = String::with_capacity(full.len());
        let mut keep = true;
        let mut seen_header = false;

        for line in full.split_inclusive('\n') {
            if let Some(header) = line.strip_prefix("diff --git ") {
                seen_header = true;
                keep = match header_path(header.trim_end()) {
                    Some(path) => !self.is_excluded(path),
                    None => true,
                };
            } else if !seen_header && line.trim().is_empty() {
                continue;
            }
            if keep {
                kept.push_str(line);
            }
        }

        let total_lines = full.lines().count();
        let kept_lines = kept.lines().count();
        FilteredDiff {
            diff: kept,
            suppressed_lines: total_lines.saturating_sub(kept_lines),
            total_lines,
        }
    }
}

/// Post-image path from `a/<old> b/<new>`.
fn header_path(header: &str) -> Option<&str> {
    if let Some(idx) = header.rfind(" b/") {
        return Some(&header[idx + 3..]);
    }
    header.strip_prefix("a/")
}
