//! Error taxonomy for Pinpoint.

use thiserror::Error;

/// Errors produced by external collaborators (Gitiles, isolate, swarming, builds).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or server-side failure that may succeed on retry.
    #[error("transient service failure: {0}")]
    Transient(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return ServiceError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 404 => ServiceError::NotFound(err.to_string()),
            Some(status) if status.is_server_error() => ServiceError::Transient(err.to_string()),
            Some(status) => ServiceError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ServiceError::Decode(err.to_string()),
        }
    }
}

/// Errors from change identity, resolution and bisection.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// The two changes do not lie on a single bisectable axis.
    #[error("non-linear range: {0}")]
    NonLinear(String),

    #[error("can't find the midpoint of commits in different repositories: {a} and {b}")]
    RepositoryMismatch { a: String, b: String },

    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    #[error("unknown commit {git_hash} in repository {repository}")]
    UnknownCommit { repository: String, git_hash: String },

    #[error("malformed DEPS file: {0}")]
    DepsFile(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ChangeError {
    /// Lookup errors are caused by input the caller must correct.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            ChangeError::UnknownRepository(_) | ChangeError::UnknownCommit { .. }
        )
    }
}

/// Validation errors raised while building a quest pipeline from a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestError {
    #[error("missing \"{0}\" argument")]
    MissingArgument(&'static str),

    #[error("invalid \"{field}\" argument: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
}

/// Reasons a pipeline stage cannot complete.
///
/// Everything except a transient [`ServiceError`] is recorded on the
/// execution as failure data rather than returned to the driver.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("missing \"{0}\" input argument")]
    MissingInput(&'static str),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("build canceled: {0}")]
    BuildCanceled(String),

    #[error("build succeeded but produced no isolate for {0}")]
    IsolateMissing(String),

    #[error("test task {task_id} finished with state {state}")]
    TaskFailed { task_id: String, state: String },

    #[error("test task {0} completed without an output isolate")]
    NoOutput(String),

    #[error("output isolate has no {0}")]
    FileMissing(String),

    #[error("chart {0} not found in test output")]
    ChartMissing(String),

    #[error("trace {trace} not found in chart {chart}")]
    TraceMissing { chart: String, trace: String },

    #[error("unsupported value in test output: {0}")]
    UnsupportedValue(String),

    #[error(transparent)]
    Change(#[from] ChangeError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ExecutionError {
    /// The transient service error to hand back to the driver, if any.
    pub fn into_transient(self) -> Result<ServiceError, ExecutionError> {
        match self {
            ExecutionError::Service(err) if err.is_transient() => Ok(err),
            ExecutionError::Change(ChangeError::Service(err)) if err.is_transient() => Ok(err),
            other => Err(other),
        }
    }
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failed to set up service client: {0}")]
    Client(#[from] ServiceError),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
pub type ChangeResult<T> = std::result::Result<T, ChangeError>;
pub type QuestResult<T> = std::result::Result<T, QuestError>;
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Transient("502".to_string()).is_transient());
        assert!(!ServiceError::NotFound("abc".to_string()).is_transient());
        assert!(!ServiceError::Http {
            status: 403,
            message: "forbidden".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_lookup_errors() {
        assert!(ChangeError::UnknownRepository("nope".to_string()).is_lookup());
        assert!(ChangeError::UnknownCommit {
            repository: "chromium".to_string(),
            git_hash: "abc".to_string(),
        }
        .is_lookup());
        assert!(!ChangeError::NonLinear("patch".to_string()).is_lookup());
    }

    #[test]
    fn test_repository_mismatch_display() {
        let err = ChangeError::RepositoryMismatch {
            a: "chromium".to_string(),
            b: "v8".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("chromium"));
        assert!(msg.contains("v8"));
    }

    #[test]
    fn test_execution_error_transient_split() {
        let transient = ExecutionError::Service(ServiceError::Transient("503".to_string()));
        assert!(transient.into_transient().is_ok());

        let nested = ExecutionError::Change(ChangeError::Service(ServiceError::Transient(
            "timeout".to_string(),
        )));
        assert!(nested.into_transient().is_ok());

        let missing = ExecutionError::Service(ServiceError::NotFound("isolate".to_string()));
        let err = missing.into_transient().unwrap_err();
        assert_eq!(err.to_string(), "not found: isolate");
    }

    #[test]
    fn test_quest_error_display() {
        let err = QuestError::MissingArgument("configuration");
        assert_eq!(err.to_string(), "missing \"configuration\" argument");
    }
}
