//! Canonical resource filenames.

use std::fmt;

use crate::Error;

/// Resource filename in canonical forward-slash form.
///
/// ### Specification
/// * UTF-8, `/`-separated, relative to a mount root.
/// * `.` components and redundant separators are collapsed.
/// * `..` components resolve against earlier components; a `..` that would
///   leave the mount root is rejected, as are backslashes and leading `/`.
///
/// Two [`ResourcePath`]s compare byte-exact after canonicalisation, so the
/// same logical asset always resolves to the same cache key no matter how a
/// caller spelled it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    inner: String,
}

impl ResourcePath {
    /// Canonicalise `raw` into a [`ResourcePath`].
    pub fn new(raw: &str) -> Result<ResourcePath, Error> {
        if raw.contains('\\') {
            return Err(Error::InvalidPath {
                path: raw.to_owned(),
                reason: "backslash separators are not supported",
            });
        }
        if raw.starts_with('/') {
            return Err(Error::PathEscape {
                path: raw.to_owned(),
            });
        }

        let mut components: Vec<&str> = Vec::new();
        for component in raw.split('/') {
            match component {
                "" | "." => continue,
                ".." => {
                    if components.pop().is_none() {
                        return Err(Error::PathEscape {
                            path: raw.to_owned(),
                        });
                    }
                }
                other => components.push(other),
            }
        }

        if components.is_empty() {
            return Err(Error::InvalidPath {
                path: raw.to_owned(),
                reason: "path has no components",
            });
        }

        Ok(ResourcePath {
            inner: components.join("/"),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// The `/`-separated components of the canonical path.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.inner.split('/')
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalises() {
        assert_eq!(ResourcePath::new("a/b.txt").unwrap().as_str(), "a/b.txt");
        assert_eq!(ResourcePath::new("./a/b.txt").unwrap().as_str(), "a/b.txt");
        assert_eq!(ResourcePath::new("a/./b.txt").unwrap().as_str(), "a/b.txt");
        assert_eq!(ResourcePath::new("a//b.txt").unwrap().as_str(), "a/b.txt");
        assert_eq!(ResourcePath::new("a/x/../b.txt").unwrap().as_str(), "a/b.txt");
    }

    #[test]
    fn rejects_escapes() {
        assert!(matches!(
            ResourcePath::new("../a.txt"),
            Err(Error::PathEscape { .. })
        ));
        assert!(matches!(
            ResourcePath::new("a/../../b.txt"),
            Err(Error::PathEscape { .. })
        ));
        assert!(matches!(
            ResourcePath::new("/abs.txt"),
            Err(Error::PathEscape { .. })
        ));
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            ResourcePath::new("a\\b.txt"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            ResourcePath::new(""),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            ResourcePath::new("./"),
            Err(Error::InvalidPath { .. })
        ));
    }
}
