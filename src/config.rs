//! Agent configuration.
//!
//! A [`Config`] is built once from [`ConfigParameters`] and never mutated
//! afterwards. [`Config::initialize`] validates the workspace and creates the
//! client handle, which is then available through [`Config::client`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::llm::{AgentClient, ClientError, GeminiChatClient};

/// Model used for chat when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
/// Embedding model used when none is configured.
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
/// OpenAI-compatible endpoint of the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// How tool calls requested by the model get approved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    /// Ask before anything with side effects
    #[default]
    Default,
    /// Approve file edits automatically
    AutoEdit,
    /// Approve everything
    Yolo,
}

/// Parameters a [`Config`] is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigParameters {
    /// Unique identifier of the session
    pub session_id: String,
    /// Root directory the agent operates on
    pub target_dir: PathBuf,
    /// Working directory for the agent
    pub cwd: PathBuf,
    /// Enables verbose diagnostics
    pub debug_mode: bool,
    /// Chat model name
    pub model: String,
    /// Embedding model name
    pub embedding_model: String,
    /// Tool approval mode
    pub approval_mode: ApprovalMode,
    /// API key; falls back to `GEMINI_API_KEY` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL of the chat completions API
    pub base_url: String,
    /// Optional HTTP request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ConfigParameters {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            target_dir: PathBuf::from("."),
            cwd: PathBuf::from("."),
            debug_mode: false,
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            approval_mode: ApprovalMode::Default,
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

impl ConfigParameters {
    /// Parameters rooted at `workspace_root`, with a fresh session id.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let root = workspace_root.into();
        Self {
            target_dir: root.clone(),
            cwd: root,
            ..Self::default()
        }
    }
}

/// Errors raised while initializing a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The workspace directory does not exist
    #[error("Workspace not found: {}", .0.display())]
    WorkspaceNotFound(PathBuf),
    /// The workspace path is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    /// The client was requested before `initialize`
    #[error("Configuration is not initialized")]
    NotInitialized,
    /// Client setup failed
    #[error("Client setup failed: {0}")]
    Client(#[from] ClientError),
}

/// Immutable agent configuration owning the client handle.
pub struct Config {
    params: ConfigParameters,
    client_override: Option<Arc<dyn AgentClient>>,
    client: OnceLock<Arc<dyn AgentClient>>,
}

impl Config {
    /// Creates a configuration that uses the Gemini chat client.
    pub fn new(params: ConfigParameters) -> Self {
        Self {
            params,
            client_override: None,
            client: OnceLock::new(),
        }
    }

    /// Creates a configuration that hands out the given client.
    pub fn with_client(params: ConfigParameters, client: Arc<dyn AgentClient>) -> Self {
        Self {
            params,
            client_override: Some(client),
            client: OnceLock::new(),
        }
    }

    /// Validates the workspace and creates the client handle.
    ///
    /// The client itself is not initialized here.
    pub async fn initialize(&self) -> Result<(), ConfigError> {
        check_dir(&self.params.target_dir).await?;
        if self.params.cwd != self.params.target_dir {
            check_dir(&self.params.cwd).await?;
        }

        self.client.get_or_init(|| {
            let client: Arc<dyn AgentClient> = match &self.client_override {
                Some(client) => client.clone(),
                None => Arc::new(GeminiChatClient::from_config(self)),
            };
            client
        });

        debug!(session_id = %self.params.session_id, model = %self.params.model, "Configuration initialized");
        Ok(())
    }

    /// Returns the client handle created by `initialize`.
    pub fn client(&self) -> Result<Arc<dyn AgentClient>, ConfigError> {
        self.client.get().cloned().ok_or(ConfigError::NotInitialized)
    }

    pub fn session_id(&self) -> &str {
        &self.params.session_id
    }

    pub fn target_dir(&self) -> &Path {
        &self.params.target_dir
    }

    pub fn working_dir(&self) -> &Path {
        &self.params.cwd
    }

    pub fn debug_mode(&self) -> bool {
        self.params.debug_mode
    }

    pub fn model(&self) -> &str {
        &self.params.model
    }

    pub fn embedding_model(&self) -> &str {
        &self.params.embedding_model
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        self.params.approval_mode
    }

    pub fn api_key(&self) -> Option<&str> {
        self.params.api_key.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.params.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.params.timeout_secs.map(Duration::from_secs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("params", &self.params)
            .field("initialized", &self.client.get().is_some())
            .finish_non_exhaustive()
    }
}

async fn check_dir(path: &Path) -> Result<(), ConfigError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ConfigError::WorkspaceNotFound(path.to_path_buf()))?;
    if !metadata.is_dir() {
        return Err(ConfigError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}
