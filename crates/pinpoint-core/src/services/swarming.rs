//! Swarming v1 HTTP client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Swarming, TaskRequest, TaskResult};
use crate::error::ServiceResult;

const API_PATH: &str = "_ah/api/swarming/v1";

#[derive(Debug, Serialize)]
struct NewTaskBody<'a> {
    name: &'a str,
    priority: String,
    expiration_secs: String,
    properties: TaskProperties<'a>,
}

#[derive(Debug, Serialize)]
struct TaskProperties<'a> {
    inputs_ref: InputsRef<'a>,
    extra_args: &'a [String],
    dimensions: &'a [super::Dimension],
    execution_timeout_secs: String,
    io_timeout_secs: String,
}

#[derive(Debug, Serialize)]
struct InputsRef<'a> {
    isolated: &'a str,
}

#[derive(Debug, Deserialize)]
struct NewTaskResponse {
    task_id: String,
}

/// Client for a swarming server.
pub struct SwarmingClient {
    server_url: String,
    http_client: reqwest::Client,
}

impl SwarmingClient {
    pub fn new(server_url: &str, user_agent: &str) -> ServiceResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.server_url, API_PATH, path)
    }
}

fn new_task_body(request: &TaskRequest) -> NewTaskBody<'_> {
    NewTaskBody {
        name: &request.name,
        priority: "100".to_string(),
        expiration_secs: request.expiration_secs.to_string(),
        properties: TaskProperties {
            inputs_ref: InputsRef {
                isolated: &request.isolated_hash,
            },
            extra_args: &request.extra_args,
            dimensions: &request.dimensions,
            execution_timeout_secs: request.execution_timeout_secs.to_string(),
            io_timeout_secs: request.io_timeout_secs.to_string(),
        },
    }
}

#[async_trait]
impl Swarming for SwarmingClient {
    async fn new_task(&self, request: &TaskRequest) -> ServiceResult<String> {
        let url = self.endpoint("tasks/new");
        let response: NewTaskResponse = self
            .http_client
            .post(&url)
            .json(&new_task_body(request))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(task_id = %response.task_id, "swarming task triggered");
        Ok(response.task_id)
    }

    async fn task_result(&self, task_id: &str) -> ServiceResult<TaskResult> {
        let url = self.endpoint(&format!("task/{task_id}/result"));
        debug!(url = %url, "swarming task status");
        Ok(self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Dimension;

    #[test]
    fn test_new_task_body_shape() {
        let request = TaskRequest {
            name: "Pinpoint job".to_string(),
            isolated_hash: "isolate hash".to_string(),
            extra_args: vec!["--gtest_repeat".to_string(), "20".to_string()],
            dimensions: vec![Dimension::new("pool", "Chrome-perf")],
            expiration_secs: 86400,
            execution_timeout_secs: 7200,
            io_timeout_secs: 3600,
        };
        let body = serde_json::to_value(new_task_body(&request)).unwrap();
        assert_eq!(body["properties"]["inputs_ref"]["isolated"], "isolate hash");
        assert_eq!(body["properties"]["dimensions"][0]["key"], "pool");
        assert_eq!(body["expiration_secs"], "86400");
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = SwarmingClient::new("https://swarm.example.com/", "test").unwrap();
        assert_eq!(
            client.endpoint("task/1/result"),
            "https://swarm.example.com/_ah/api/swarming/v1/task/1/result"
        );
    }
}
