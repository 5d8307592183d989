//! Ordered directory search for header and database files.
//!
//! A search path is nothing more than an ordered list of directories and a
//! pair of existence checks: find the first directory containing a relative
//! name, or find all of them. No globbing, no recursion. Path strings may
//! reference environment variables with `$VAR` or `${VAR}`, expanded at
//! append time so a path configured as `$HOME/include` behaves the same
//! everywhere it is later searched.

use std::path::{Path, PathBuf};

/// An ordered list of directories to search for relative filenames.
#[derive(Debug, Default, Clone)]
pub struct SearchPath {
    directories: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        SearchPath::default()
    }

    /// Parse a colon-separated path string, expanding `$VAR` references.
    ///
    /// Empty components are skipped.
    pub fn from_string(path: &str) -> Self {
        let mut result = SearchPath::new();
        for component in path.split(':') {
            if !component.is_empty() {
                result.append_directory(expand_environment(component));
            }
        }
        result
    }

    /// Add a directory to the end of the search order.
    pub fn append_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directories.push(directory.into());
    }

    /// Add a directory to the front of the search order.
    pub fn prepend_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directories.insert(0, directory.into());
    }

    /// Append every directory of another search path.
    pub fn append_path(&mut self, other: &SearchPath) {
        self.directories.extend(other.directories.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// The first existing match for `filename`, in search order.
    ///
    /// An absolute filename is returned as-is when it exists, without
    /// consulting the directory list.
    pub fn find_file(&self, filename: impl AsRef<Path>) -> Option<PathBuf> {
        let filename = filename.as_ref();
        if filename.is_absolute() {
            return filename.exists().then(|| filename.to_path_buf());
        }
        self.directories
            .iter()
            .map(|dir| dir.join(filename))
            .find(|candidate| candidate.exists())
    }

    /// Every existing match for `filename`, in search order.
    pub fn find_all_files(&self, filename: impl AsRef<Path>) -> Vec<PathBuf> {
        let filename = filename.as_ref();
        if filename.is_absolute() {
            return if filename.exists() {
                vec![filename.to_path_buf()]
            } else {
                Vec::new()
            };
        }
        self.directories
            .iter()
            .map(|dir| dir.join(filename))
            .filter(|candidate| candidate.exists())
            .collect()
    }
}

impl std::fmt::Display for SearchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for dir in &self.directories {
            if !first {
                write!(f, ":")?;
            }
            write!(f, "{}", dir.display())?;
            first = false;
        }
        Ok(())
    }
}

/// Expand `$VAR` and `${VAR}` references from the process environment.
///
/// Unset variables expand to the empty string. A literal `$` not followed
/// by an identifier or `{` is kept as-is.
pub fn expand_environment(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
        }
        if name.is_empty() {
            result.push('$');
        } else if let Ok(value) = std::env::var(&name) {
            result.push_str(&value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn first_match_wins() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        fs::write(dir_b.path().join("foo.h"), "x").unwrap();

        let mut path = SearchPath::new();
        path.append_directory(dir_a.path());
        path.append_directory(dir_b.path());

        let found = path.find_file("foo.h").unwrap();
        assert_eq!(found, dir_b.path().join("foo.h"));

        fs::write(dir_a.path().join("foo.h"), "y").unwrap();
        let found = path.find_file("foo.h").unwrap();
        assert_eq!(found, dir_a.path().join("foo.h"));
    }

    #[test]
    fn find_all_returns_matches_in_order() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        fs::write(dir_a.path().join("foo.h"), "x").unwrap();
        fs::write(dir_b.path().join("foo.h"), "y").unwrap();

        let mut path = SearchPath::new();
        path.append_directory(dir_a.path());
        path.append_directory(dir_b.path());

        let all = path.find_all_files("foo.h");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], dir_a.path().join("foo.h"));
    }

    #[test]
    fn miss_is_none_not_an_error() {
        let path = SearchPath::new();
        assert!(path.find_file("nowhere.h").is_none());
        assert!(path.find_all_files("nowhere.h").is_empty());
    }

    #[test]
    fn environment_references_expand() {
        std::env::set_var("SCRY_TEST_EXPAND", "/opt/scry");
        assert_eq!(
            expand_environment("$SCRY_TEST_EXPAND/include"),
            "/opt/scry/include"
        );
        assert_eq!(
            expand_environment("${SCRY_TEST_EXPAND}x"),
            "/opt/scryx"
        );
        assert_eq!(expand_environment("no refs"), "no refs");
        assert_eq!(expand_environment("a$"), "a$");
    }
}
