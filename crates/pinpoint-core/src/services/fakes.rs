//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `FakeGitiles`, `FakeIsolateStore`, `FakeSwarming` and
//! `FakeBuildService`. Each records the calls it receives so tests can assert
//! on the exact sequence of external requests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;
use crate::error::{ServiceError, ServiceResult};

// ---------------------------------------------------------------------------
// FakeGitiles
// ---------------------------------------------------------------------------

/// Scripted Gitiles. Repository URLs are ignored; commits, ranges and files
/// are keyed by hash only.
#[derive(Debug, Default)]
pub struct FakeGitiles {
    commits: Vec<String>,
    ranges: HashMap<(String, String), Vec<String>>,
    files: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl FakeGitiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `full_hash` resolvable by any prefix.
    pub fn with_commit(mut self, full_hash: &str) -> Self {
        self.commits.push(full_hash.to_string());
        self
    }

    /// Script `commit_range(first, last)`; `commits` newest first.
    pub fn with_range(mut self, first: &str, last: &str, commits: &[&str]) -> Self {
        self.ranges.insert(
            (first.to_string(), last.to_string()),
            commits.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Script `file_contents(_, git_hash, _)`.
    pub fn with_file(mut self, git_hash: &str, contents: &str) -> Self {
        self.files.insert(git_hash.to_string(), contents.to_string());
        self
    }

    /// Calls received so far, e.g. `"commit_range 0e57e2b..babe852"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Gitiles for FakeGitiles {
    async fn commit_info(&self, _repository_url: &str, git_hash: &str) -> ServiceResult<CommitInfo> {
        self.record(format!("commit_info {git_hash}"));
        self.commits
            .iter()
            .find(|c| !git_hash.is_empty() && c.starts_with(git_hash))
            .map(|c| CommitInfo::new(c.clone()))
            .ok_or_else(|| ServiceError::NotFound(git_hash.to_string()))
    }

    async fn commit_range(
        &self,
        _repository_url: &str,
        first_git_hash: &str,
        last_git_hash: &str,
    ) -> ServiceResult<Vec<CommitInfo>> {
        self.record(format!("commit_range {first_git_hash}..{last_git_hash}"));
        self.ranges
            .get(&(first_git_hash.to_string(), last_git_hash.to_string()))
            .map(|commits| commits.iter().map(|c| CommitInfo::new(c.clone())).collect())
            .ok_or_else(|| ServiceError::NotFound(format!("{first_git_hash}..{last_git_hash}")))
    }

    async fn file_contents(
        &self,
        _repository_url: &str,
        git_hash: &str,
        path: &str,
    ) -> ServiceResult<String> {
        self.record(format!("file_contents {git_hash} {path}"));
        self.files
            .get(git_hash)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("{git_hash}/{path}")))
    }
}

// ---------------------------------------------------------------------------
// FakeIsolateStore
// ---------------------------------------------------------------------------

/// In-memory isolate store backed by a `HashMap<digest, bytes>`.
#[derive(Debug, Default)]
pub struct FakeIsolateStore {
    blobs: HashMap<String, Vec<u8>>,
    transient_failures: Mutex<u32>,
    calls: Mutex<Vec<String>>,
}

impl FakeIsolateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(mut self, digest: &str, data: impl Into<Vec<u8>>) -> Self {
        self.blobs.insert(digest.to_string(), data.into());
        self
    }

    pub fn with_json(self, digest: &str, value: &serde_json::Value) -> Self {
        self.with_blob(digest, value.to_string())
    }

    /// Fail the next `count` retrievals with `ServiceError::Transient`.
    pub fn with_transient_failures(self, count: u32) -> Self {
        *self.transient_failures.lock().unwrap() = count;
        self
    }

    /// Digests retrieved so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IsolateStore for FakeIsolateStore {
    async fn retrieve(&self, digest: &str) -> ServiceResult<Vec<u8>> {
        self.calls.lock().unwrap().push(digest.to_string());
        {
            let mut failures = self.transient_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ServiceError::Transient("isolate server unavailable".to_string()));
            }
        }
        self.blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("isolate {digest}")))
    }
}

// ---------------------------------------------------------------------------
// FakeSwarming
// ---------------------------------------------------------------------------

/// Swarming fake that replays scripted task results, one per status check.
/// The last scripted result repeats once the script is exhausted.
#[derive(Debug, Default)]
pub struct FakeSwarming {
    results: Mutex<VecDeque<TaskResult>>,
    requests: Mutex<Vec<TaskRequest>>,
}

impl FakeSwarming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, results: Vec<TaskResult>) -> Self {
        *self.results.lock().unwrap() = results.into();
        self
    }

    /// Task requests received so far.
    pub fn requests(&self) -> Vec<TaskRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Swarming for FakeSwarming {
    async fn new_task(&self, request: &TaskRequest) -> ServiceResult<String> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(format!("task-{}", requests.len()))
    }

    async fn task_result(&self, task_id: &str) -> ServiceResult<TaskResult> {
        let mut results = self.results.lock().unwrap();
        let result = if results.len() > 1 {
            results.pop_front()
        } else {
            results.front().cloned()
        };
        result.ok_or_else(|| ServiceError::NotFound(format!("task {task_id}")))
    }
}

// ---------------------------------------------------------------------------
// FakeBuildService
// ---------------------------------------------------------------------------

/// Build service fake with an isolate index keyed by
/// `(builder, change id_string, target)`.
#[derive(Debug, Default)]
pub struct FakeBuildService {
    isolates: Mutex<HashMap<(String, String, String), String>>,
    statuses: Mutex<VecDeque<BuildStatus>>,
    build_outputs: Vec<(String, String)>,
    requests: Mutex<Vec<BuildRequest>>,
}

impl FakeBuildService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing isolate for `(builder, change, target)`.
    pub fn with_isolate(self, builder: &str, change: &Change, target: &str, hash: &str) -> Self {
        self.isolates.lock().unwrap().insert(
            (builder.to_string(), change.id_string(), target.to_string()),
            hash.to_string(),
        );
        self
    }

    /// Statuses returned by successive `build_status` calls; the last repeats.
    pub fn with_statuses(self, statuses: Vec<BuildStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Isolates indexed for the requested change once a build succeeds.
    pub fn with_build_output(mut self, target: &str, hash: &str) -> Self {
        self.build_outputs.push((target.to_string(), hash.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildService for FakeBuildService {
    async fn find_isolate(
        &self,
        builder: &str,
        change: &Change,
        target: &str,
    ) -> ServiceResult<Option<String>> {
        let key = (builder.to_string(), change.id_string(), target.to_string());
        Ok(self.isolates.lock().unwrap().get(&key).cloned())
    }

    async fn request_build(&self, request: &BuildRequest) -> ServiceResult<String> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(format!("build-{}", requests.len()))
    }

    async fn build_status(&self, build_id: &str) -> ServiceResult<BuildStatus> {
        let status = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            }
        }
        .ok_or_else(|| ServiceError::NotFound(format!("build {build_id}")))?;

        if status == BuildStatus::Succeeded {
            if let Some(request) = self.requests.lock().unwrap().last() {
                let mut isolates = self.isolates.lock().unwrap();
                for (target, hash) in &self.build_outputs {
                    isolates.insert(
                        (request.builder.clone(), request.change_id.clone(), target.clone()),
                        hash.clone(),
                    );
                }
            }
        }
        Ok(status)
    }
}
