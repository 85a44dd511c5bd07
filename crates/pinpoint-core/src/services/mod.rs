//! External collaborators consumed by the change model and the quest pipeline.
//!
//! Each collaborator is an injectable async trait. Concrete HTTP clients live
//! in the submodules; [`fakes`] provides in-memory implementations for tests.

pub mod fakes;
pub mod gitiles;
pub mod isolate;
pub mod swarming;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::change::{Change, Patch};
use crate::error::ServiceResult;
use crate::registry::Repositories;

pub use gitiles::GitilesClient;
pub use isolate::FsIsolateStore;
pub use swarming::SwarmingClient;

/// One commit as reported by Gitiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full hex hash.
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommitInfo {
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            message: None,
        }
    }
}

/// Version-control query service.
#[async_trait]
pub trait Gitiles: Send + Sync {
    /// Resolve a (possibly abbreviated) hash. Fails with `NotFound` on an unknown commit.
    async fn commit_info(&self, repository_url: &str, git_hash: &str) -> ServiceResult<CommitInfo>;

    /// Commits after `first_git_hash` up to and including `last_git_hash`,
    /// newest first.
    async fn commit_range(
        &self,
        repository_url: &str,
        first_git_hash: &str,
        last_git_hash: &str,
    ) -> ServiceResult<Vec<CommitInfo>>;

    /// Text of `path` at `git_hash`.
    async fn file_contents(
        &self,
        repository_url: &str,
        git_hash: &str,
        path: &str,
    ) -> ServiceResult<String>;
}

/// Content-addressed artifact storage.
#[async_trait]
pub trait IsolateStore: Send + Sync {
    /// Raw bytes stored under `digest`.
    async fn retrieve(&self, digest: &str) -> ServiceResult<Vec<u8>>;
}

/// A swarming bot dimension (`{"key": ..., "value": ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub key: String,
    pub value: String,
}

impl Dimension {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Request for a new swarming task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub name: String,
    pub isolated_hash: String,
    pub extra_args: Vec<String>,
    pub dimensions: Vec<Dimension>,
    pub expiration_secs: u64,
    pub execution_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

/// Swarming task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Expired,
    TimedOut,
    BotDied,
    Canceled,
    Killed,
    NoResource,
}

impl TaskState {
    /// Whether the task will make no further progress.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }
}

/// Reference to a task's output isolate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputsRef {
    pub isolated: String,
}

/// Result of a swarming task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub state: TaskState,
    #[serde(default)]
    pub failure: bool,
    #[serde(default)]
    pub outputs_ref: Option<OutputsRef>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

/// Worker pool that runs test artifacts.
#[async_trait]
pub trait Swarming: Send + Sync {
    /// Trigger a task and return its id.
    async fn new_task(&self, request: &TaskRequest) -> ServiceResult<String>;

    async fn task_result(&self, task_id: &str) -> ServiceResult<TaskResult>;
}

/// Request to build a change on a builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub builder: String,
    /// `id_string` of the change being built, used to tag the build.
    pub change_id: String,
    pub repository_url: String,
    pub git_hash: String,
    /// Dependency pins to override, keyed by repository URL.
    pub deps_revision_overrides: BTreeMap<String, String>,
    pub patch: Option<Patch>,
}

/// Build progress as reported by the build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum BuildStatus {
    Scheduled,
    Started,
    Succeeded,
    Failed(String),
    Canceled(String),
}

/// Build system and the index of isolates it has produced.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Isolate hash of `target` already built for `change` on `builder`, if any.
    async fn find_isolate(
        &self,
        builder: &str,
        change: &Change,
        target: &str,
    ) -> ServiceResult<Option<String>>;

    /// Schedule a build and return its id.
    async fn request_build(&self, request: &BuildRequest) -> ServiceResult<String>;

    async fn build_status(&self, build_id: &str) -> ServiceResult<BuildStatus>;
}

/// All collaborators an execution may touch.
#[derive(Clone)]
pub struct Services {
    pub repositories: Repositories,
    pub isolate: Arc<dyn IsolateStore>,
    pub swarming: Arc<dyn Swarming>,
    pub builds: Arc<dyn BuildService>,
}

impl Services {
    pub fn new(
        repositories: Repositories,
        isolate: Arc<dyn IsolateStore>,
        swarming: Arc<dyn Swarming>,
        builds: Arc<dyn BuildService>,
    ) -> Self {
        Self {
            repositories,
            isolate,
            swarming,
            builds,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("repositories", &self.repositories)
            .finish_non_exhaustive()
    }
}
