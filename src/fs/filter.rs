//! Path predicates used during discovery

use super::path::Path;
use crate::error::{ConnectorError, ErrorCode, Result};
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::sync::Arc;

/// Predicate over a path; `true` keeps the path
pub type FileFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Filter that keeps everything
pub fn accept_all() -> FileFilter {
    Arc::new(|_| true)
}

/// Rejects hidden names (`.foo`) and in-progress markers (`_foo`)
pub fn is_hidden(path: &Path) -> bool {
    let name = path.name();
    name.starts_with('.') || name.starts_with('_')
}

/// Glob-based include/exclude filter.
///
/// A path is kept when it is not hidden, matches no exclude pattern and
/// matches at least one include pattern (or no include patterns are set).
/// Patterns are matched against the full path.
#[derive(Clone)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    skip_hidden: bool,
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field(
                "include",
                &self.include.iter().map(Pattern::as_str).collect::<Vec<_>>(),
            )
            .field(
                "exclude",
                &self.exclude.iter().map(Pattern::as_str).collect::<Vec<_>>(),
            )
            .field("skip_hidden", &self.skip_hidden)
            .finish()
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl Default for PathFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PathFilter {
    /// Filter with only the hidden-file rule
    pub fn new() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            skip_hidden: true,
        }
    }

    pub fn from_patterns<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            skip_hidden: true,
        })
    }

    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include.push(compile_one(pattern)?);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude.push(compile_one(pattern)?);
        Ok(self)
    }

    /// Keep hidden and underscore-prefixed names
    pub fn with_hidden(mut self) -> Self {
        self.skip_hidden = false;
        self
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if self.skip_hidden && is_hidden(path) {
            return false;
        }

        let text = path.to_string();
        if self
            .exclude
            .iter()
            .any(|p| p.matches_with(&text, MATCH_OPTIONS))
        {
            return false;
        }

        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_with(&text, MATCH_OPTIONS))
    }

    pub fn into_filter(self) -> FileFilter {
        Arc::new(move |path| self.accepts(path))
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>> {
    patterns.iter().map(|p| compile_one(p.as_ref())).collect()
}

fn compile_one(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| {
        ConnectorError::config_with_code(
            ErrorCode::CONFIG_INVALID_PATTERN,
            format!("invalid glob pattern '{}'", pattern),
        )
        .with_source(e)
    })
}
