//! Immutable, normalized path value
//!
//! Paths always use `/` as separator. A leading drive letter (`C:/data`) is
//! treated as an absolute path and stored with an extra leading slash
//! (`/C:/data`); the external string form strips it again.

use crate::error::{ConnectorError, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '/';
const CURRENT_DIR: &str = ".";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    path: String,
}

impl Path {
    /// Parse and normalize a path string.
    ///
    /// Backslashes become slashes, repeated slashes collapse and a trailing
    /// slash is dropped unless the path is a root (`/` or `/C:/`).
    pub fn new(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(ConnectorError::config_with_code(
                ErrorCode::CONFIG_INVALID_PATH,
                "cannot create a path from an empty string",
            ));
        }

        let mut normalized = normalize(path);
        if has_drive_letter(&normalized, false) {
            normalized.insert(0, SEPARATOR);
        }
        Ok(Self { path: normalized })
    }

    /// Resolve `child` against `parent`
    pub fn from_parent_child(parent: &str, child: &str) -> Result<Self> {
        Ok(Path::new(parent)?.resolve(&Path::new(child)?))
    }

    /// Build a path from an OS-native path
    pub fn from_native(native: &std::path::Path) -> Result<Self> {
        let text = native.to_string_lossy();
        if std::path::MAIN_SEPARATOR == '/' {
            Path::new(&text)
        } else {
            Path::new(&text.replace(std::path::MAIN_SEPARATOR, "/"))
        }
    }

    /// Internal canonical form, including the leading slash before a drive letter
    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_absolute(&self) -> bool {
        self.path[self.drive_prefix_len()..].starts_with(SEPARATOR)
    }

    pub fn has_windows_drive(&self) -> bool {
        has_drive_letter(&self.path, true)
    }

    /// Final component of the path
    pub fn name(&self) -> &str {
        match self.path.rfind(SEPARATOR) {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Parent directory, or `None` at a root
    pub fn parent(&self) -> Option<Path> {
        let start = self.drive_prefix_len();
        let last_slash = self.path.rfind(SEPARATOR);

        if self.path.len() == start
            || (last_slash == Some(start) && self.path.len() == start + 1)
        {
            return None;
        }

        let parent = match last_slash {
            None => CURRENT_DIR.to_string(),
            Some(idx) if idx == start => self.path[..start + 1].to_string(),
            Some(idx) => self.path[..idx].to_string(),
        };
        Some(Path { path: parent })
    }

    /// Resolve `child` against this path; a leading slash on `child` is ignored
    pub fn resolve(&self, child: &Path) -> Path {
        let mut joined = self.path.clone();
        if !joined.ends_with(SEPARATOR) {
            joined.push(SEPARATOR);
        }
        joined.push_str(child.path.trim_start_matches(SEPARATOR));

        Path {
            path: normalize(&joined),
        }
    }

    /// Append `suffix` to the final component
    pub fn suffix(&self, suffix: &str) -> Path {
        let name = format!("{}{}", self.name(), suffix);
        match self.parent() {
            Some(parent) if self.path.contains(SEPARATOR) => parent.resolve(&Path { path: name }),
            _ => Path { path: name },
        }
    }

    /// Number of elements in the path; the root has depth zero
    pub fn depth(&self) -> usize {
        if self.path == "/" {
            return 0;
        }

        let bytes = self.path.as_bytes();
        let mut depth = 0;
        let mut slash = Some(0);
        while let Some(pos) = slash {
            depth += 1;
            slash = bytes[pos + 1..]
                .iter()
                .position(|b| *b == b'/')
                .map(|offset| pos + 1 + offset);
        }
        depth
    }

    /// Convert to an OS-native path
    pub fn to_native(&self) -> std::path::PathBuf {
        let external = self.to_string();
        if std::path::MAIN_SEPARATOR == '/' {
            std::path::PathBuf::from(external)
        } else {
            std::path::PathBuf::from(external.replace('/', &std::path::MAIN_SEPARATOR.to_string()))
        }
    }

    fn drive_prefix_len(&self) -> usize {
        if self.has_windows_drive() {
            3
        } else {
            0
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_windows_drive() {
            f.write_str(&self.path[1..])
        } else {
            f.write_str(&self.path)
        }
    }
}

impl TryFrom<String> for Path {
    type Error = ConnectorError;

    fn try_from(value: String) -> Result<Self> {
        Path::new(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { SEPARATOR } else { c };
        if c == SEPARATOR && out.ends_with(SEPARATOR) {
            continue;
        }
        out.push(c);
    }

    if out.len() > 1 && out.ends_with(SEPARATOR) && !is_drive_root(&out) {
        out.pop();
    }
    out
}

/// `/C:/` or `C:/`
fn is_drive_root(path: &str) -> bool {
    let trimmed = path.strip_prefix(SEPARATOR).unwrap_or(path);
    trimmed.len() == 3 && has_drive_letter(trimmed, false) && trimmed.ends_with(SEPARATOR)
}

fn has_drive_letter(path: &str, slashed: bool) -> bool {
    let bytes = path.as_bytes();
    let start = usize::from(slashed);

    bytes.len() >= start + 2
        && (!slashed || bytes[0] == b'/')
        && bytes[start + 1] == b':'
        && bytes[start].is_ascii_alphabetic()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::new(s).unwrap()
    }

    #[test]
    fn test_normalizes_duplicate_and_trailing_slashes() {
        let path = p("/a//b/");
        assert_eq!(path.as_str(), "/a/b");
        assert_eq!(path.to_string(), "/a/b");
        assert_eq!(path.parent(), Some(p("/a")));
    }

    #[test]
    fn test_backslashes_become_separators() {
        assert_eq!(p("a\\b\\c").as_str(), "a/b/c");
    }

    #[test]
    fn test_resolve_child_against_parent() {
        assert_eq!(p("/a").resolve(&p("b/c")).as_str(), "/a/b/c");
        assert_eq!(p("/").resolve(&p("/x")).as_str(), "/x");
        assert_eq!(Path::from_parent_child("/a/", "/b").unwrap(), p("/a/b"));
    }

    #[test]
    fn test_drive_letter_paths() {
        let path = p("C:/foo");
        assert_eq!(path.as_str(), "/C:/foo");
        assert_eq!(path.to_string(), "C:/foo");
        assert!(path.has_windows_drive());
        assert!(path.is_absolute());
        assert_eq!(path.parent(), Some(p("/C:/")));
        assert_eq!(p("C:/").as_str(), "/C:/");
        assert_eq!(p("C:/").parent(), None);
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let err = Path::new("").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_PATH);
    }

    #[test]
    fn test_name_parent_and_depth() {
        let path = p("/data/logs/app.log");
        assert_eq!(path.name(), "app.log");
        assert_eq!(path.depth(), 3);
        assert_eq!(p("/").depth(), 0);
        assert_eq!(p("/").parent(), None);
        assert_eq!(p("/a").parent(), Some(p("/")));
        assert_eq!(p("relative").parent(), Some(p(".")));
        assert_eq!(p("a/b").depth(), 2);
    }

    #[test]
    fn test_relative_paths_are_not_absolute() {
        assert!(!p("a/b").is_absolute());
        assert!(p("/a/b").is_absolute());
    }

    #[test]
    fn test_suffix() {
        assert_eq!(p("/a/b").suffix(".tmp"), p("/a/b.tmp"));
        assert_eq!(p("file").suffix(".1"), p("file.1"));
    }

    #[test]
    fn test_serde_uses_external_form() {
        let json = serde_json::to_string(&p("C:/x")).unwrap();
        assert_eq!(json, "\"C:/x\"");
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p("C:/x"));
    }
}
