//! One pass of the quest pipeline against a single change.

use tracing::debug;

use crate::change::Change;
use crate::error::ServiceResult;
use crate::obs::AttemptSpan;
use crate::quest::{Execution, Quest};
use crate::services::Services;

/// The chain of executions for one change.
///
/// Each quest starts with the result arguments of the stage before it. The
/// attempt stops at the first failed execution.
#[derive(Debug, Clone)]
pub struct Attempt {
    quests: Vec<Quest>,
    change: Change,
    executions: Vec<Execution>,
}

impl Attempt {
    pub fn new(quests: Vec<Quest>, change: Change) -> Self {
        Self {
            quests,
            change,
            executions: Vec::new(),
        }
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    /// All quests have run to completion, or one has failed.
    pub fn completed(&self) -> bool {
        self.failed()
            || (self.executions.len() == self.quests.len()
                && self.executions.iter().all(Execution::completed))
    }

    pub fn failed(&self) -> bool {
        self.executions.iter().any(Execution::failed)
    }

    /// Values of the final stage, once it has completed.
    pub fn result_values(&self) -> &[f64] {
        match self.executions.last() {
            Some(last) if self.executions.len() == self.quests.len() && last.completed() => {
                last.result_values()
            }
            _ => &[],
        }
    }

    /// Advance the attempt by one poll of its current execution.
    ///
    /// Starts the next quest once the current execution succeeds. Transient
    /// service errors are returned unchanged.
    pub async fn schedule_work(&mut self, services: &Services) -> ServiceResult<()> {
        if self.completed() {
            return Ok(());
        }
        let span = AttemptSpan::new(&self.change.id_string());

        let next_arguments = match self.executions.last() {
            None => Some(Default::default()),
            Some(current) if current.completed() => Some(current.result_arguments().clone()),
            Some(_) => None,
        };
        if let Some(arguments) = next_arguments {
            if let Some(quest) = self.quests.get(self.executions.len()) {
                debug!(quest = quest.name(), change = %self.change, "starting execution");
                self.executions.push(quest.start(&self.change, &arguments));
            }
        }

        if let Some(current) = self.executions.last_mut() {
            span.run(current.poll(services)).await?;
        }
        Ok(())
    }
}
