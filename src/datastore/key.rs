//! Hierarchical datastore keys.
//!
//! Keys are slash-separated paths such as `/providers/<cid>/<peer>`.
//! They are always stored in clean form: a single leading slash, no
//! trailing slash, no empty segments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A clean, namespaced datastore key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Build a key from a path, cleaning it
    pub fn new(path: impl AsRef<str>) -> Self {
        let segments: Vec<&str> = path
            .as_ref()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        Self(format!("/{}", segments.join("/")))
    }

    /// The root key `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Raw string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, excluding the empty root
    pub fn namespaces(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Last segment, or "" for the root
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Append a segment
    pub fn child(&self, name: impl AsRef<str>) -> Self {
        Self::new(format!("{}/{}", self.0, name.as_ref()))
    }

    /// Whether `other` lies strictly below this key
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        if self.0 == "/" {
            return other.0 != "/";
        }

        other
            .0
            .strip_prefix(self.0.as_str())
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    /// Whether this key lies strictly below `other`
    pub fn is_descendant_of(&self, other: &Key) -> bool {
        other.is_ancestor_of(self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_form() {
        assert_eq!(Key::new("providers/a/").as_str(), "/providers/a");
        assert_eq!(Key::new("//providers//a").as_str(), "/providers/a");
        assert_eq!(Key::new("").as_str(), "/");
        assert_eq!(Key::new("/"), Key::root());
    }

    #[test]
    fn test_namespaces() {
        let key = Key::new("/providers/AAA/BBB");
        assert_eq!(key.namespaces(), vec!["providers", "AAA", "BBB"]);
        assert_eq!(key.name(), "BBB");
        assert!(Key::root().namespaces().is_empty());
    }

    #[test]
    fn test_ancestry() {
        let root = Key::new("/providers");

        assert!(root.is_ancestor_of(&Key::new("/providers/AAA")));
        assert!(root.is_ancestor_of(&Key::new("/providers/AAA/BBB")));
        assert!(!root.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&Key::new("/providersX/AAA")));
        assert!(!root.is_ancestor_of(&Key::new("/other/providers/AAA")));

        assert!(Key::root().is_ancestor_of(&root));
        assert!(Key::new("/providers/AAA").is_descendant_of(&root));
    }

    #[test]
    fn test_child() {
        let key = Key::new("/providers").child("AAA").child("BBB");
        assert_eq!(key.as_str(), "/providers/AAA/BBB");
    }
}
