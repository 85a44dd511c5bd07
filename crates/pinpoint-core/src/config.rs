//! Service endpoints and local paths, defaulted from the environment.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registry::{Repositories, RepositoryRegistry};
use crate::services::{BuildService, FsIsolateStore, GitilesClient, Services, SwarmingClient};

const DEFAULT_SWARMING_SERVER: &str = "https://chromium-swarm.appspot.com";
const DEFAULT_USER_AGENT: &str = "pinpoint-core/0.3";

/// Pinpoint service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Path to the repository registry JSON (optional).
    pub repositories_path: Option<PathBuf>,
    /// Swarming server base URL.
    pub swarming_server: String,
    /// Root directory of the local isolate store.
    pub artifact_dir: PathBuf,
    /// User agent for outbound HTTP requests.
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            repositories_path: std::env::var("PINPOINT_REPOSITORIES").ok().map(PathBuf::from),
            swarming_server: std::env::var("PINPOINT_SWARMING_SERVER")
                .unwrap_or_else(|_| DEFAULT_SWARMING_SERVER.to_string()),
            artifact_dir: std::env::var("PINPOINT_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("pinpoint-artifacts")),
            user_agent: std::env::var("PINPOINT_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

impl ServiceConfig {
    /// Create a config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Point at a specific registry file.
    pub fn with_repositories(mut self, path: impl Into<PathBuf>) -> Self {
        self.repositories_path = Some(path.into());
        self
    }

    /// Load the registry named by this config, or an empty one.
    pub fn load_registry(&self) -> Result<RepositoryRegistry, ConfigError> {
        match &self.repositories_path {
            Some(path) => RepositoryRegistry::from_json_file(path),
            None => Ok(RepositoryRegistry::new()),
        }
    }

    /// Registry plus a Gitiles client sending this config's user agent.
    pub fn repositories(&self) -> Result<Repositories, ConfigError> {
        let registry = self.load_registry()?;
        let gitiles = GitilesClient::new(&self.user_agent)?;
        Ok(Repositories::new(Arc::new(registry), Arc::new(gitiles)))
    }

    /// Isolate store rooted at `artifact_dir`.
    pub fn isolate_store(&self) -> Result<FsIsolateStore, ConfigError> {
        Ok(FsIsolateStore::new(&self.artifact_dir)?)
    }

    pub fn swarming_client(&self) -> Result<SwarmingClient, ConfigError> {
        Ok(SwarmingClient::new(&self.swarming_server, &self.user_agent)?)
    }

    /// Every collaborator an execution needs. The build service has no
    /// configured client and is supplied by the caller.
    pub fn services(&self, builds: Arc<dyn BuildService>) -> Result<Services, ConfigError> {
        Ok(Services::new(
            self.repositories()?,
            Arc::new(self.isolate_store()?),
            Arc::new(self.swarming_client()?),
            builds,
        ))
    }
}
