//! Change identity: a base commit, dependency overrides and an optional patch.
//!
//! Changes are immutable values usable as map keys. Bisection always produces
//! new values; nothing here mutates a `Change` in place.

pub mod dep;
pub mod deps_file;
pub mod patch;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChangeError, ChangeResult};
use crate::obs;
use crate::registry::{RepositoryRegistry, Repositories};

pub use dep::{Dep, DepDict};
pub use patch::Patch;

/// A fully specified buildable state.
///
/// `deps` is kept sorted by `(repository, git_hash)` and deduplicated, so the
/// order and multiplicity of the input never affect equality, hashing or
/// serialisation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Change {
    base_commit: Dep,
    deps: Vec<Dep>,
    patch: Option<Patch>,
}

/// Serialised form of a [`Change`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDict {
    pub base_commit: DepDict,
    #[serde(default)]
    pub deps: Vec<DepDict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}

impl Change {
    pub fn new(
        base_commit: Dep,
        deps: impl IntoIterator<Item = Dep>,
        patch: Option<Patch>,
    ) -> Self {
        let mut deps: Vec<Dep> = deps.into_iter().collect();
        deps.sort();
        deps.dedup();
        Self {
            base_commit,
            deps,
            patch,
        }
    }

    /// A change with no overrides and no patch.
    pub fn from_commit(base_commit: Dep) -> Self {
        Self::new(base_commit, Vec::new(), None)
    }

    pub fn base_commit(&self) -> &Dep {
        &self.base_commit
    }

    /// Dependency overrides in canonical order.
    pub fn deps(&self) -> &[Dep] {
        &self.deps
    }

    pub fn patch(&self) -> Option<&Patch> {
        self.patch.as_ref()
    }

    /// The base commit followed by the overrides in canonical order.
    pub fn all_deps(&self) -> impl Iterator<Item = &Dep> {
        std::iter::once(&self.base_commit).chain(self.deps.iter())
    }

    pub fn id_string(&self) -> String {
        let mut id = self
            .all_deps()
            .map(Dep::id_string)
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(patch) = &self.patch {
            id.push_str(" + ");
            id.push_str(&patch.id_string());
        }
        id
    }

    pub fn as_dict(&self, registry: &RepositoryRegistry) -> ChangeResult<ChangeDict> {
        Ok(ChangeDict {
            base_commit: self.base_commit.as_dict(registry)?,
            deps: self
                .deps
                .iter()
                .map(|dep| dep.as_dict(registry))
                .collect::<ChangeResult<_>>()?,
            patch: self.patch.clone(),
        })
    }

    /// Inverse of [`Change::as_dict`]. Resolves every commit through Gitiles.
    pub async fn from_dict(dict: &ChangeDict, repos: &Repositories) -> ChangeResult<Change> {
        let base_commit = Dep::from_dict(&dict.base_commit, repos).await?;
        let mut deps = Vec::with_capacity(dict.deps.len());
        for dep in &dict.deps {
            deps.push(Dep::from_dict(dep, repos).await?);
        }
        Ok(Change::new(base_commit, deps, dict.patch.clone()))
    }

    /// The override for `repository`, if any.
    fn override_for(&self, repository: &str) -> Option<&Dep> {
        self.deps.iter().find(|dep| dep.repository() == repository)
    }

    /// A copy of this change with `dep` replacing any override of its repository.
    fn with_override(&self, dep: Dep) -> Change {
        let repository = dep.repository().to_string();
        let deps = self
            .deps
            .iter()
            .filter(|d| d.repository() != repository)
            .cloned()
            .chain(std::iter::once(dep));
        Change::new(self.base_commit.clone(), deps, self.patch.clone())
    }

    /// The change halfway between `a` and `b`, or `None` when they are
    /// adjacent or identical.
    ///
    /// Base commits are bisected first. Once they are adjacent, a DEPS roll
    /// between them is bisected by overriding the rolled dependency.
    pub async fn midpoint(
        a: &Change,
        b: &Change,
        repos: &Repositories,
    ) -> ChangeResult<Option<Change>> {
        if a == b {
            return Ok(None);
        }
        if a.patch != b.patch {
            return Err(ChangeError::NonLinear(format!(
                "change A has patch {} and change B has patch {}",
                describe_patch(a.patch()),
                describe_patch(b.patch()),
            )));
        }
        if a.base_commit.repository() != b.base_commit.repository() {
            return Err(ChangeError::NonLinear(format!(
                "change A has base repository {} and change B has base repository {}",
                a.base_commit.repository(),
                b.base_commit.repository(),
            )));
        }

        if let Some(base_commit) = Dep::midpoint(&a.base_commit, &b.base_commit, repos).await? {
            return Ok(Some(Change::new(base_commit, a.deps.clone(), a.patch.clone())));
        }

        Self::midpoint_across_deps(a, b, repos).await
    }

    async fn midpoint_across_deps(
        a: &Change,
        b: &Change,
        repos: &Repositories,
    ) -> ChangeResult<Option<Change>> {
        let same_base = a.base_commit == b.base_commit;
        let pins_a = a.base_commit.pins(repos).await?;
        let pins_b = if same_base {
            pins_a.clone()
        } else {
            b.base_commit.pins(repos).await?
        };

        let repository = if same_base {
            // Only the overrides differ, e.g. after a previous roll midpoint.
            let differing = differing_keys(&overrides(a), &overrides(b));
            match differing.as_slice() {
                [] => return Ok(None),
                [repository] => repository.clone(),
                _ => {
                    return Err(ChangeError::NonLinear(format!(
                        "changes override multiple dependencies differently: {}",
                        differing.join(", ")
                    )))
                }
            }
        } else {
            let rolled = differing_keys(&pins_a, &pins_b);
            match rolled.as_slice() {
                [] => return Ok(None),
                [repository] => repository.clone(),
                _ => {
                    return Err(ChangeError::NonLinear(format!(
                        "{} and {} roll multiple dependencies: {}",
                        a.base_commit,
                        b.base_commit,
                        rolled.join(", ")
                    )))
                }
            }
        };

        let mut other_a = overrides(a);
        let mut other_b = overrides(b);
        other_a.remove(&repository);
        other_b.remove(&repository);
        if other_a != other_b {
            return Err(ChangeError::NonLinear(format!(
                "changes differ in dependencies other than {repository}"
            )));
        }

        let expected_b = pins_b.get(&repository);
        if let Some(override_b) = b.override_for(&repository) {
            if !same_base && expected_b.map(String::as_str) != Some(override_b.git_hash()) {
                return Err(ChangeError::NonLinear(format!(
                    "{repository} is already overridden to {override_b}, \
                     inconsistent with the DEPS roll between {} and {}",
                    a.base_commit, b.base_commit
                )));
            }
        }

        let start = a
            .override_for(&repository)
            .map(|dep| dep.git_hash().to_string())
            .or_else(|| pins_a.get(&repository).cloned());
        let end = b
            .override_for(&repository)
            .map(|dep| dep.git_hash().to_string())
            .or_else(|| expected_b.cloned());
        let (Some(start), Some(end)) = (start, end) else {
            debug!(repository = %repository, "dependency added or removed; no midpoint");
            return Ok(None);
        };
        obs::emit_deps_roll_detected(&repository, &start, &end);

        let dep_a = Dep::new(repository.clone(), start);
        let dep_b = Dep::new(repository, end);
        Ok(Dep::midpoint(&dep_a, &dep_b, repos)
            .await?
            .map(|midpoint| a.with_override(midpoint)))
    }
}

fn describe_patch(patch: Option<&Patch>) -> String {
    patch.map_or_else(|| "none".to_string(), Patch::id_string)
}

fn overrides(change: &Change) -> BTreeMap<String, String> {
    change
        .deps
        .iter()
        .map(|dep| (dep.repository().to_string(), dep.git_hash().to_string()))
        .collect()
}

/// Keys whose values differ between `a` and `b`, including keys present in only one.
fn differing_keys(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> Vec<String> {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    keys.into_iter()
        .filter(|key| a.get(*key) != b.get(*key))
        .cloned()
        .collect()
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deps = self
            .all_deps()
            .map(Dep::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&deps)?;
        if let Some(patch) = &self.patch {
            write!(f, " + {}", patch.id_string())?;
        }
        Ok(())
    }
}
