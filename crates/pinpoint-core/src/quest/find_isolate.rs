//! Locate, or build, the isolate for a target at a change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Step, ISOLATE_HASH};
use crate::change::Change;
use crate::error::{ExecutionError, ExecutionResult};
use crate::services::{BuildRequest, BuildStatus, Services};

/// Find the isolate of `target` built by the `configuration` builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindIsolate {
    configuration: String,
    target: String,
}

/// Where a FindIsolate execution is in its lookup/build cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    /// Look for an isolate that was already built.
    #[default]
    Lookup,
    /// Nothing found; ask for a build.
    RequestBuild,
    AwaitBuild(String),
    /// The build finished; read back its isolate.
    Verify,
}

impl FindIsolate {
    pub fn new(configuration: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            configuration: configuration.into(),
            target: target.into(),
        }
    }

    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) async fn poll(
        &self,
        change: &Change,
        phase: &mut Phase,
        services: &Services,
    ) -> ExecutionResult<Step> {
        match phase {
            Phase::Lookup => match self.lookup(change, services).await? {
                Some(hash) => Ok(Step::with_argument(ISOLATE_HASH, hash)),
                None => {
                    *phase = Phase::RequestBuild;
                    Ok(Step::Pending)
                }
            },
            Phase::RequestBuild => {
                let request = self.build_request(change, services)?;
                let build_id = services.builds.request_build(&request).await?;
                info!(build = %build_id, change = %change, builder = %self.configuration, "requested build");
                *phase = Phase::AwaitBuild(build_id);
                Ok(Step::Pending)
            }
            Phase::AwaitBuild(build_id) => match services.builds.build_status(build_id).await? {
                BuildStatus::Scheduled | BuildStatus::Started => Ok(Step::Pending),
                BuildStatus::Succeeded => {
                    *phase = Phase::Verify;
                    Ok(Step::Pending)
                }
                BuildStatus::Failed(reason) => Err(ExecutionError::BuildFailed(reason)),
                BuildStatus::Canceled(reason) => Err(ExecutionError::BuildCanceled(reason)),
            },
            Phase::Verify => match self.lookup(change, services).await? {
                Some(hash) => Ok(Step::with_argument(ISOLATE_HASH, hash)),
                None => Err(ExecutionError::IsolateMissing(format!(
                    "{} at {}",
                    self.target, change
                ))),
            },
        }
    }

    async fn lookup(&self, change: &Change, services: &Services) -> ExecutionResult<Option<String>> {
        Ok(services
            .builds
            .find_isolate(&self.configuration, change, &self.target)
            .await?)
    }

    fn build_request(&self, change: &Change, services: &Services) -> ExecutionResult<BuildRequest> {
        let repos = &services.repositories;
        let base = change.base_commit();
        let mut deps_revision_overrides = BTreeMap::new();
        for dep in change.deps() {
            let url = repos.url(dep.repository())?;
            deps_revision_overrides.insert(url.to_string(), dep.git_hash().to_string());
        }

        Ok(BuildRequest {
            builder: self.configuration.clone(),
            change_id: change.id_string(),
            repository_url: repos.url(base.repository())?.to_string(),
            git_hash: base.git_hash().to_string(),
            deps_revision_overrides,
            patch: change.patch().cloned(),
        })
    }
}
