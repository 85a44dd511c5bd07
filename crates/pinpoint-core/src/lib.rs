//! Pinpoint Core Library
//!
//! Change identity and bisection over commit ranges (including dependency
//! rolls), plus the measurement pipeline that builds, runs and reads values
//! for each change under test.

pub mod attempt;
pub mod change;
pub mod config;
pub mod error;
pub mod obs;
pub mod quest;
pub mod quest_generator;
pub mod registry;
pub mod services;
pub mod telemetry;

pub use attempt::Attempt;

pub use change::{Change, ChangeDict, Dep, DepDict, Patch};

pub use config::ServiceConfig;

pub use error::{
    ChangeError, ChangeResult, ConfigError, ExecutionError, ExecutionResult, QuestError,
    QuestResult, ServiceError, ServiceResult,
};

pub use quest::{Execution, ExecutionState, ExecutionSummary, Quest};
pub use quest_generator::generate_quests;

pub use registry::{Repositories, RepositoryInfo, RepositoryRegistry};

pub use services::{
    BuildService, FsIsolateStore, Gitiles, GitilesClient, IsolateStore, Services, Swarming,
    SwarmingClient,
};

pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
