//! Measurement pipeline stages.
//!
//! A [`Quest`] is an immutable description of one stage. Starting it against a
//! [`Change`] and the previous stage's result arguments yields an
//! [`Execution`], which is advanced one external step at a time by
//! [`Execution::poll`].

pub mod find_isolate;
pub mod read_value;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::Change;
use crate::error::{ExecutionError, ExecutionResult, ServiceResult};
use crate::obs;
use crate::services::Services;

pub use find_isolate::FindIsolate;
pub use read_value::{ReadChartJsonValue, ReadGraphJsonValue};
pub use run_test::RunTest;

/// Result argument carrying a content-addressed artifact between stages.
pub const ISOLATE_HASH: &str = "isolate_hash";

/// One stage of the measurement pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "quest")]
pub enum Quest {
    FindIsolate(FindIsolate),
    RunTest(RunTest),
    ReadChartJsonValue(ReadChartJsonValue),
    ReadGraphJsonValue(ReadGraphJsonValue),
}

impl Quest {
    /// Short stage name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Quest::FindIsolate(_) => "Build",
            Quest::RunTest(_) => "Test",
            Quest::ReadChartJsonValue(_) | Quest::ReadGraphJsonValue(_) => "Values",
        }
    }

    /// Bind this stage to a change and its input arguments. Performs no I/O.
    pub fn start(&self, change: &Change, arguments: &BTreeMap<String, String>) -> Execution {
        let progress = match self {
            Quest::FindIsolate(_) => Progress::FindIsolate(find_isolate::Phase::default()),
            Quest::RunTest(_) => Progress::RunTest(run_test::Phase::default()),
            Quest::ReadChartJsonValue(_) | Quest::ReadGraphJsonValue(_) => Progress::Read,
        };
        Execution {
            quest: self.clone(),
            change: change.clone(),
            arguments: arguments.clone(),
            progress,
            state: ExecutionState::Pending,
            result_values: Vec::new(),
            result_arguments: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Quest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quest::FindIsolate(q) => write!(f, "Build {} on {}", q.target(), q.configuration()),
            Quest::RunTest(q) => write!(f, "Test with {} args", q.extra_args().len()),
            Quest::ReadChartJsonValue(q) => write!(f, "Values {}", q.chart()),
            Quest::ReadGraphJsonValue(q) => write!(f, "Values {}", q.chart()),
        }
    }
}

/// Lifecycle of an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Completed,
    /// Terminal failure, with its description.
    Failed(String),
}

/// Stage-specific bookkeeping between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Progress {
    FindIsolate(find_isolate::Phase),
    RunTest(run_test::Phase),
    Read,
}

/// Outcome of a single successful poll step.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Pending,
    Completed {
        result_values: Vec<f64>,
        result_arguments: BTreeMap<String, String>,
    },
}

impl Step {
    pub(crate) fn with_argument(key: &str, value: impl Into<String>) -> Self {
        Step::Completed {
            result_values: Vec::new(),
            result_arguments: BTreeMap::from([(key.to_string(), value.into())]),
        }
    }

    pub(crate) fn with_values(result_values: Vec<f64>) -> Self {
        Step::Completed {
            result_values,
            result_arguments: BTreeMap::new(),
        }
    }
}

/// A running instance of a [`Quest`] for one change.
#[derive(Debug, Clone)]
pub struct Execution {
    quest: Quest,
    change: Change,
    arguments: BTreeMap<String, String>,
    progress: Progress,
    state: ExecutionState,
    result_values: Vec<f64>,
    result_arguments: BTreeMap<String, String>,
}

impl Execution {
    pub fn quest(&self) -> &Quest {
        &self.quest
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// True once the execution has reached a terminal state, successful or not.
    pub fn completed(&self) -> bool {
        !matches!(self.state, ExecutionState::Pending)
    }

    pub fn failed(&self) -> bool {
        matches!(self.state, ExecutionState::Failed(_))
    }

    /// Failure description, if the execution failed.
    pub fn exception(&self) -> Option<&str> {
        match &self.state {
            ExecutionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn result_values(&self) -> &[f64] {
        &self.result_values
    }

    /// Arguments handed to the next stage.
    pub fn result_arguments(&self) -> &BTreeMap<String, String> {
        &self.result_arguments
    }

    /// Perform at most one external step.
    ///
    /// Stage failures are recorded on the execution. Only transient service
    /// errors are returned, with the execution left as it was, so the caller
    /// can poll again later. Polling a completed execution does nothing.
    pub async fn poll(&mut self, services: &Services) -> ServiceResult<()> {
        if self.completed() {
            return Ok(());
        }
        if self.is_first_poll() {
            obs::emit_stage_started(self.quest.name(), &self.change.id_string());
        }

        match self.step(services).await {
            Ok(Step::Pending) => {
                debug!(quest = self.quest.name(), change = %self.change, "still pending");
            }
            Ok(Step::Completed {
                result_values,
                result_arguments,
            }) => {
                obs::emit_execution_completed(self.quest.name(), result_values.len());
                self.result_values = result_values;
                self.result_arguments = result_arguments;
                self.state = ExecutionState::Completed;
            }
            Err(err) => match err.into_transient() {
                Ok(transient) => return Err(transient),
                Err(failure) => {
                    obs::emit_execution_failed(self.quest.name(), &failure);
                    self.state = ExecutionState::Failed(failure.to_string());
                }
            },
        }
        Ok(())
    }

    fn is_first_poll(&self) -> bool {
        match &self.progress {
            Progress::FindIsolate(phase) => *phase == find_isolate::Phase::default(),
            Progress::RunTest(phase) => *phase == run_test::Phase::default(),
            Progress::Read => true,
        }
    }

    async fn step(&mut self, services: &Services) -> ExecutionResult<Step> {
        match (&self.quest, &mut self.progress) {
            (Quest::FindIsolate(quest), Progress::FindIsolate(phase)) => {
                quest.poll(&self.change, phase, services).await
            }
            (Quest::RunTest(quest), Progress::RunTest(phase)) => {
                let isolate_hash = input(&self.arguments, ISOLATE_HASH)?;
                quest.poll(&self.change, isolate_hash, phase, services).await
            }
            (Quest::ReadChartJsonValue(quest), Progress::Read) => {
                let isolate_hash = input(&self.arguments, ISOLATE_HASH)?;
                let values = quest.values(isolate_hash, services.isolate.as_ref()).await?;
                Ok(Step::with_values(values))
            }
            (Quest::ReadGraphJsonValue(quest), Progress::Read) => {
                let isolate_hash = input(&self.arguments, ISOLATE_HASH)?;
                let values = quest.values(isolate_hash, services.isolate.as_ref()).await?;
                Ok(Step::with_values(values))
            }
            (quest, _) => Err(ExecutionError::UnsupportedValue(format!(
                "{} execution in an inconsistent state",
                quest.name()
            ))),
        }
    }

    /// Serialisable view for reporting.
    pub fn as_summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            quest: self.quest.to_string(),
            change: self.change.id_string(),
            completed: self.completed(),
            failed: self.failed(),
            exception: self.exception().map(str::to_string),
            result_values: self.result_values.clone(),
            result_arguments: self.result_arguments.clone(),
        }
    }
}

fn input<'a>(arguments: &'a BTreeMap<String, String>, key: &'static str) -> ExecutionResult<&'a str> {
    arguments
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(ExecutionError::MissingInput(key))
}

/// Reporting snapshot of an [`Execution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub quest: String,
    pub change: String,
    pub completed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub result_values: Vec<f64>,
    pub result_arguments: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Dep;

    fn change() -> Change {
        Change::from_commit(Dep::new("chromium", "f9f2b720"))
    }

    #[test]
    fn test_start_is_pending() {
        let quest = Quest::ReadGraphJsonValue(ReadGraphJsonValue::new("chart", "trace"));
        let execution = quest.start(&change(), &BTreeMap::new());
        assert!(!execution.completed());
        assert!(!execution.failed());
        assert!(execution.exception().is_none());
        assert!(execution.result_values().is_empty());
        assert!(execution.result_arguments().is_empty());
        assert_eq!(execution.quest(), &quest);
    }

    #[test]
    fn test_quest_names() {
        let find = Quest::FindIsolate(FindIsolate::new("Mac Builder", "telemetry_perf_tests"));
        assert_eq!(find.name(), "Build");
        assert_eq!(find.to_string(), "Build telemetry_perf_tests on Mac Builder");
        let read = Quest::ReadChartJsonValue(ReadChartJsonValue::new("timeToFirst", None, None));
        assert_eq!(read.name(), "Values");
    }

    #[test]
    fn test_missing_input() {
        let mut arguments = BTreeMap::new();
        assert_eq!(
            input(&arguments, ISOLATE_HASH).unwrap_err().to_string(),
            "missing \"isolate_hash\" input argument"
        );
        arguments.insert(ISOLATE_HASH.to_string(), String::new());
        assert!(input(&arguments, ISOLATE_HASH).is_err());
        arguments.insert(ISOLATE_HASH.to_string(), "abc".to_string());
        assert_eq!(input(&arguments, ISOLATE_HASH).unwrap(), "abc");
    }

    #[test]
    fn test_quest_serde_tag() {
        let quest = Quest::ReadGraphJsonValue(ReadGraphJsonValue::new("chart", "trace"));
        let json = serde_json::to_value(&quest).unwrap();
        assert_eq!(json["quest"], "read_graph_json_value");
        assert_eq!(json["chart"], "chart");
    }
}
