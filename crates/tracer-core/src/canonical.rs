use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TracerError};

/// The two sentinel names that denote a module's own top-level body rather
/// than a nested definition.
pub const TOP_LEVEL_SENTINELS: [&str; 2] = ["<top-level>", "<module>"];

pub fn is_top_level_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    TOP_LEVEL_SENTINELS.iter().any(|s| *s == lowered)
}

/// `/<repo-relative-path>::<name>[::<name>...]`
///
/// Names compose left to right: module scope, then class-or-outer-function,
/// then inner function. A length-2 name list is ambiguous between a
/// class-method and a nested function; resolving that ambiguity is the
/// caller's job (see `tracer_si::lookup`), not this type's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CanonicalId {
    path: String,
    names: Vec<String>,
}

impl CanonicalId {
    pub fn new(path: impl Into<String>, names: Vec<String>) -> Result<Self> {
        let path = path.into();
        if names.is_empty() {
            return Err(TracerError::InvalidCanonicalId(
                "canonical id requires at least one name".to_string(),
            ));
        }
        let path = if let Some(stripped) = path.strip_prefix('/') {
            stripped.to_string()
        } else {
            path
        };
        Ok(Self { path, names })
    }

    /// Repo-relative path, without the leading `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn leaf(&self) -> &str {
        self.names.last().expect("non-empty by construction")
    }

    pub fn is_top_level(&self) -> bool {
        self.names.len() == 1 && is_top_level_name(&self.names[0])
    }

    /// A new canonical id for a name defined directly inside this file
    /// (top-level function, or as the sole path segment under `path`).
    pub fn top_level(path: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        Self::new(path, vec![name.into()])
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path)?;
        for name in &self.names {
            write!(f, "::{}", name)?;
        }
        Ok(())
    }
}

impl FromStr for CanonicalId {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self> {
        if !s.starts_with('/') {
            return Err(TracerError::InvalidCanonicalId(format!(
                "canonical id must begin with '/': {s}"
            )));
        }
        let mut parts = s.splitn(2, "::");
        let path = parts
            .next()
            .ok_or_else(|| TracerError::InvalidCanonicalId(s.to_string()))?;
        let rest = parts
            .next()
            .ok_or_else(|| TracerError::InvalidCanonicalId(format!("missing '::' in {s}")))?;
        let names: Vec<String> = rest.split("::").map(|s| s.to_string()).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(TracerError::InvalidCanonicalId(format!(
                "empty name segment in {s}"
            )));
        }
        CanonicalId::new(&path[1..], names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_function() {
        let id: CanonicalId = "/pkg/mod.py::foo".parse().unwrap();
        assert_eq!(id.path(), "pkg/mod.py");
        assert_eq!(id.names(), &["foo".to_string()]);
        assert_eq!(id.to_string(), "/pkg/mod.py::foo");
    }

    #[test]
    fn round_trips_nested_names() {
        let id: CanonicalId = "/a/b.py::Outer::inner".parse().unwrap();
        assert_eq!(id.names(), &["Outer".to_string(), "inner".to_string()]);
        assert_eq!(id.to_string(), "/a/b.py::Outer::inner");
    }

    #[test]
    fn rejects_missing_leading_slash() {
        assert!("a/b.py::foo".parse::<CanonicalId>().is_err());
    }

    #[test]
    fn rejects_missing_double_colon() {
        assert!("/a/b.py".parse::<CanonicalId>().is_err());
    }

    #[test]
    fn recognises_top_level_sentinels() {
        let id: CanonicalId = "/a.py::<module>".parse().unwrap();
        assert!(id.is_top_level());
        let id: CanonicalId = "/a.py::<top-level>".parse().unwrap();
        assert!(id.is_top_level());
        let id: CanonicalId = "/a.py::main".parse().unwrap();
        assert!(!id.is_top_level());
    }
}
