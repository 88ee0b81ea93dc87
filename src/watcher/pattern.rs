//! Watch patterns for directory and file subscriptions.
//!
//! A directory watch is scoped by a glob suffix appended to the directory:
//! `*` for immediate children, `**` for every descendant. A file watch is
//! an exact path.

use std::fmt;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use super::WatchError;

/// `*` must not cross path separators; `**` still does.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// How far below its root a pattern reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternScope {
    /// Immediate children of a directory (`dir/*`).
    Shallow,
    /// Every descendant of a directory (`dir/**`).
    Recursive,
    /// A single file.
    File,
}

/// A compiled watch pattern.
#[derive(Debug, Clone)]
pub struct WatchPattern {
    scope: PatternScope,
    root: PathBuf,
    /// Compiled glob for directory scopes; `None` for exact files.
    matcher: Option<Pattern>,
}

impl WatchPattern {
    /// Pattern matching the immediate children of `dir`.
    pub fn shallow(dir: impl Into<PathBuf>) -> Result<Self, WatchError> {
        Self::directory(dir.into(), PatternScope::Shallow)
    }

    /// Pattern matching every descendant of `dir`.
    pub fn recursive(dir: impl Into<PathBuf>) -> Result<Self, WatchError> {
        Self::directory(dir.into(), PatternScope::Recursive)
    }

    /// Pattern matching exactly `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            scope: PatternScope::File,
            root: path.into(),
            matcher: None,
        }
    }

    fn directory(root: PathBuf, scope: PatternScope) -> Result<Self, WatchError> {
        let base = root.to_string_lossy();
        let base = Pattern::escape(base.trim_end_matches('/'));
        let source = match scope {
            PatternScope::Recursive => format!("{base}/**/*"),
            _ => format!("{base}/*"),
        };

        let matcher = Pattern::new(&source).map_err(|e| WatchError::InvalidPattern {
            pattern: source.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            scope,
            root,
            matcher: Some(matcher),
        })
    }

    pub fn scope(&self) -> PatternScope {
        self.scope
    }

    /// The directory or file the pattern was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory matched paths live under, spelled as given.
    ///
    /// Empty for a bare relative file name.
    pub fn base(&self) -> &Path {
        match self.scope {
            PatternScope::File => self.root.parent().unwrap_or(Path::new("")),
            _ => &self.root,
        }
    }

    /// Directory a native watcher must observe to see every match.
    ///
    /// File patterns observe their parent so that replace-by-rename saves
    /// are still reported.
    pub fn watch_root(&self) -> &Path {
        let base = self.base();
        if base.as_os_str().is_empty() {
            Path::new(".")
        } else {
            base
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.scope == PatternScope::Recursive
    }

    /// Glob text of the pattern, e.g. `/src/*`, `/src/**` or `/src/a.ts`.
    pub fn glob(&self) -> String {
        let suffix = match self.scope {
            PatternScope::Shallow => "*",
            PatternScope::Recursive => "**",
            PatternScope::File => return self.root.display().to_string(),
        };
        self.root.join(suffix).display().to_string()
    }

    /// Check whether a changed path falls inside this pattern.
    pub fn matches(&self, path: &Path) -> bool {
        match &self.matcher {
            Some(pattern) => pattern.matches_path_with(path, MATCH_OPTIONS),
            None => path == self.root,
        }
    }
}

impl fmt::Display for WatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob())
    }
}
