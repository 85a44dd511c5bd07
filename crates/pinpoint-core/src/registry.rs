//! Repository registry: short names resolved to Gitiles URLs.
//!
//! The registry is read-only configuration. It is loaded once and shared
//! (behind an `Arc`) by every bisection session in the process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ChangeError, ChangeResult, ConfigError};
use crate::services::Gitiles;

/// Registry entry for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub repository_url: String,
}

/// `short_name -> {repository_url}` lookup table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryRegistry {
    repositories: BTreeMap<String, RepositoryInfo>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` at `url`.
    pub fn with_repository(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.repositories.insert(
            name.into(),
            RepositoryInfo {
                repository_url: url.into(),
            },
        );
        self
    }

    /// Parse a registry from its JSON form: `{"name": {"repository_url": "..."}}`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.repositories.contains_key(name)
    }

    /// URL of a registered repository.
    pub fn url(&self, name: &str) -> ChangeResult<&str> {
        self.repositories
            .get(name)
            .map(|info| info.repository_url.as_str())
            .ok_or_else(|| ChangeError::UnknownRepository(name.to_string()))
    }

    /// Reverse lookup: the short name registered for `url`, ignoring a
    /// trailing `/` or `.git`.
    pub fn name_for_url(&self, url: &str) -> Option<&str> {
        let wanted = normalize_url(url);
        self.repositories
            .iter()
            .find(|(_, info)| normalize_url(&info.repository_url) == wanted)
            .map(|(name, _)| name.as_str())
    }

    /// Accept either a short name or a registered URL and return the short name.
    pub fn resolve_name(&self, name_or_url: &str) -> ChangeResult<String> {
        if self.contains(name_or_url) {
            return Ok(name_or_url.to_string());
        }
        self.name_for_url(name_or_url)
            .map(str::to_string)
            .ok_or_else(|| ChangeError::UnknownRepository(name_or_url.to_string()))
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

pub(crate) fn normalize_url(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url)
}

/// Registry plus the Gitiles service used to resolve and walk its repositories.
#[derive(Clone)]
pub struct Repositories {
    registry: Arc<RepositoryRegistry>,
    gitiles: Arc<dyn Gitiles>,
}

impl Repositories {
    pub fn new(registry: Arc<RepositoryRegistry>, gitiles: Arc<dyn Gitiles>) -> Self {
        Self { registry, gitiles }
    }

    pub fn registry(&self) -> &RepositoryRegistry {
        &self.registry
    }

    pub fn gitiles(&self) -> &dyn Gitiles {
        self.gitiles.as_ref()
    }

    pub fn url(&self, name: &str) -> ChangeResult<&str> {
        self.registry.url(name)
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROMIUM_URL: &str = "https://chromium.googlesource.com/chromium/src";

    fn registry() -> RepositoryRegistry {
        RepositoryRegistry::new().with_repository("chromium", CHROMIUM_URL)
    }

    #[test]
    fn test_url_lookup() {
        assert_eq!(registry().url("chromium").unwrap(), CHROMIUM_URL);
        assert!(matches!(
            registry().url("unknown repo"),
            Err(ChangeError::UnknownRepository(_))
        ));
    }

    #[test]
    fn test_reverse_lookup_strips_git_suffix() {
        let reg = registry();
        assert_eq!(reg.name_for_url(CHROMIUM_URL), Some("chromium"));
        assert_eq!(
            reg.name_for_url(&format!("{CHROMIUM_URL}.git")),
            Some("chromium")
        );
        assert_eq!(reg.name_for_url(&format!("{CHROMIUM_URL}/")), Some("chromium"));
        assert_eq!(reg.name_for_url("https://example.com/other"), None);
    }

    #[test]
    fn test_resolve_name_accepts_url_or_name() {
        let reg = registry();
        assert_eq!(reg.resolve_name("chromium").unwrap(), "chromium");
        assert_eq!(reg.resolve_name(CHROMIUM_URL).unwrap(), "chromium");
        assert!(reg.resolve_name("unknown repo").is_err());
    }

    #[test]
    fn test_from_json_str() {
        let reg = RepositoryRegistry::from_json_str(
            r#"{"chromium": {"repository_url": "https://chromium.googlesource.com/chromium/src"}}"#,
        )
        .unwrap();
        assert_eq!(reg, registry());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_from_json_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = RepositoryRegistry::from_json_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
