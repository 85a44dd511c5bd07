use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::deps_file;
use crate::error::{ChangeError, ChangeResult, ServiceError};
use crate::obs;
use crate::registry::{normalize_url, RepositoryRegistry, Repositories};

const DEPS_PATH: &str = "DEPS";

/// A commit pinned in one repository.
///
/// Equality, ordering and hashing are by `(repository, git_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dep {
    repository: String,
    git_hash: String,
}

/// Serialised form of a [`Dep`]. `url` is emitted by `as_dict` and ignored by
/// `from_dict`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepDict {
    /// Registered short name, or a repository URL.
    pub repository: String,
    pub git_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DepDict {
    pub fn new(repository: impl Into<String>, git_hash: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            git_hash: git_hash.into(),
            url: None,
        }
    }
}

impl Dep {
    pub fn new(repository: impl Into<String>, git_hash: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            git_hash: git_hash.into(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn git_hash(&self) -> &str {
        &self.git_hash
    }

    /// `repository@full_hash`.
    pub fn id_string(&self) -> String {
        format!("{}@{}", self.repository, self.git_hash)
    }

    pub fn repository_url<'r>(&self, registry: &'r RepositoryRegistry) -> ChangeResult<&'r str> {
        registry.url(&self.repository)
    }

    pub fn as_dict(&self, registry: &RepositoryRegistry) -> ChangeResult<DepDict> {
        let url = format!("{}/+/{}", self.repository_url(registry)?, self.git_hash);
        Ok(DepDict {
            repository: self.repository.clone(),
            git_hash: self.git_hash.clone(),
            url: Some(url),
        })
    }

    /// Build a `Dep` from request or stored data.
    ///
    /// The repository may be a short name or a registered URL. The hash may be
    /// abbreviated and is expanded through Gitiles.
    pub async fn from_dict(dict: &DepDict, repos: &Repositories) -> ChangeResult<Dep> {
        let repository = repos.registry().resolve_name(&dict.repository)?;
        let url = repos.url(&repository)?;
        let info = repos
            .gitiles()
            .commit_info(url, &dict.git_hash)
            .await
            .map_err(|e| match e {
                ServiceError::NotFound(_) => ChangeError::UnknownCommit {
                    repository: repository.clone(),
                    git_hash: dict.git_hash.clone(),
                },
                other => ChangeError::Service(other),
            })?;
        Ok(Dep::new(repository, info.commit))
    }

    /// Dependencies pinned by the DEPS file at this commit.
    pub async fn deps(&self, repos: &Repositories) -> ChangeResult<BTreeSet<Dep>> {
        Ok(self.pinned(repos).await?.into_iter().collect())
    }

    /// DEPS pins in file order: `deps` first, then each `deps_os` section.
    async fn pinned(&self, repos: &Repositories) -> ChangeResult<Vec<Dep>> {
        let url = repos.url(&self.repository)?;
        let contents = repos
            .gitiles()
            .file_contents(url, &self.git_hash, DEPS_PATH)
            .await?;
        let entries = deps_file::parse(&contents)?;
        debug!(dep = %self, pins = entries.len(), "parsed DEPS");

        Ok(entries
            .into_iter()
            .map(|entry| {
                let repository = repository_name(repos.registry(), &entry.url);
                Dep::new(repository, entry.revision)
            })
            .collect())
    }

    /// DEPS pins at this commit as `repository -> git_hash`.
    ///
    /// A repository pinned more than once keeps its first pin, so `deps`
    /// wins over any `deps_os` section.
    pub(crate) async fn pins(&self, repos: &Repositories) -> ChangeResult<BTreeMap<String, String>> {
        let mut pins = BTreeMap::new();
        for dep in self.pinned(repos).await? {
            match pins.entry(dep.repository) {
                Entry::Vacant(slot) => {
                    slot.insert(dep.git_hash);
                }
                Entry::Occupied(pinned) if *pinned.get() != dep.git_hash => {
                    debug!(
                        repository = %pinned.key(),
                        kept = %pinned.get(),
                        ignored = %dep.git_hash,
                        "repository pinned twice in DEPS"
                    );
                }
                Entry::Occupied(_) => {}
            }
        }
        Ok(pins)
    }

    /// The commit halfway between `a` (exclusive) and `b` (inclusive), or
    /// `None` when they are adjacent.
    ///
    /// Gitiles lists the range newest first; the midpoint is the element at
    /// `len / 2` of that list.
    pub async fn midpoint(a: &Dep, b: &Dep, repos: &Repositories) -> ChangeResult<Option<Dep>> {
        if a.repository != b.repository {
            return Err(ChangeError::RepositoryMismatch {
                a: a.repository.clone(),
                b: b.repository.clone(),
            });
        }
        if a.git_hash == b.git_hash {
            return Ok(None);
        }

        let url = repos.url(&a.repository)?;
        let commits = repos
            .gitiles()
            .commit_range(url, &a.git_hash, &b.git_hash)
            .await?;

        let midpoint = if commits.len() <= 1 {
            None
        } else {
            let commit = &commits[commits.len() / 2];
            Some(Dep::new(a.repository.clone(), commit.commit.clone()))
        };
        obs::emit_midpoint_computed(
            &a.id_string(),
            &b.id_string(),
            midpoint.as_ref().map(Dep::id_string).as_deref(),
        );
        Ok(midpoint)
    }
}

/// Registered short name for `url`, falling back to its last path segment.
fn repository_name(registry: &RepositoryRegistry, url: &str) -> String {
    if let Some(name) = registry.name_for_url(url) {
        return name.to_string();
    }
    let url = normalize_url(url);
    url.rsplit('/').next().unwrap_or(url).to_string()
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.git_hash.get(..7).unwrap_or(&self.git_hash);
        write!(f, "{}@{}", self.repository, short)
    }
}
