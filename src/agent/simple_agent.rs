use chrono::Utc;
use futures::stream::StreamExt;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, ConfigParameters};
use crate::error::{AgentError, UNKNOWN_ERROR_MESSAGE};
use crate::llm::{AgentClient, StreamEvent};

/// A thin facade over an [`AgentClient`]: send a message, get the full reply,
/// optionally observing chunks as they stream in.
pub struct SimpleAgent {
    config: Config,
    client: Arc<dyn AgentClient>,
    prompt_seq: AtomicU64,
}

impl SimpleAgent {
    /// Creates an agent rooted at `workspace_root` with default settings.
    pub async fn create(workspace_root: impl Into<PathBuf>) -> Result<Self, AgentError> {
        Self::with_config(Config::new(ConfigParameters::for_workspace(workspace_root))).await
    }

    /// Initializes `config` and its client, returning a ready agent.
    pub async fn with_config(config: Config) -> Result<Self, AgentError> {
        config.initialize().await?;

        let client = config.client()?;
        if !client.is_initialized() {
            client.initialize().await.map_err(ConfigError::Client)?;
        }

        info!(session_id = %config.session_id(), model = %config.model(), "Agent ready");

        Ok(Self {
            config,
            client,
            prompt_seq: AtomicU64::new(0),
        })
    }

    /// Sends a message and returns the complete response text.
    ///
    /// `on_chunk` is called with every content chunk, in arrival order.
    pub async fn send_message(
        &self,
        message: &str,
        on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<String, AgentError> {
        self.send_message_with_cancel(message, on_chunk, &CancellationToken::new())
            .await
    }

    /// Like [`send_message`](Self::send_message), aborting with
    /// [`AgentError::Cancelled`] when `cancel` fires.
    ///
    /// The call runs under a child of `cancel`, so it never cancels anything
    /// beyond itself. Dropping the returned future cancels the request.
    pub async fn send_message_with_cancel(
        &self,
        message: &str,
        mut on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        if message.trim().is_empty() {
            return Err(AgentError::EmptyMessage);
        }

        let prompt_id = self.next_prompt_id();
        let cancel = cancel.child_token();
        let _guard = cancel.clone().drop_guard();

        debug!(prompt_id = %prompt_id, "Sending message");

        let mut stream = self
            .client
            .send_message_stream(message, cancel.clone(), &prompt_id)
            .await?;
        let mut response = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                next = stream.next() => next,
            };
            let Some(event) = next else {
                break;
            };

            match event? {
                StreamEvent::Content(text) => {
                    response.push_str(&text);
                    if let Some(callback) = on_chunk.as_deref_mut() {
                        callback(&text);
                    }
                }
                StreamEvent::Finished(reason) => {
                    debug!(prompt_id = %prompt_id, ?reason, "Response finished");
                    return Ok(response);
                }
                StreamEvent::Error { message } => {
                    return Err(AgentError::Stream(
                        message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
                    ));
                }
                StreamEvent::ToolCallRequest(request) => {
                    info!(tool = %request.name, call_id = %request.call_id, "Tool call requested");
                }
                StreamEvent::Usage(_) => {}
            }
        }

        warn!(prompt_id = %prompt_id, "Stream ended without a finished event");
        Ok(response)
    }

    /// The configuration this agent was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying client handle.
    pub fn client(&self) -> &Arc<dyn AgentClient> {
        &self.client
    }

    pub fn session_id(&self) -> &str {
        self.config.session_id()
    }

    fn next_prompt_id(&self) -> String {
        let seq = self.prompt_seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{}",
            self.config.session_id(),
            Utc::now().timestamp_millis(),
            seq
        )
    }
}

impl fmt::Debug for SimpleAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ClientError, EventStream, FinishReason, ToolCallRequest, Usage};
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    mock! {
        pub Client {}

        #[async_trait]
        impl AgentClient for Client {
            fn is_initialized(&self) -> bool;
            async fn initialize(&self) -> Result<(), ClientError>;
            async fn send_message_stream(
                &self,
                message: &str,
                cancel: CancellationToken,
                prompt_id: &str,
            ) -> Result<EventStream, ClientError>;
        }
    }

    fn scripted(events: Vec<Result<StreamEvent, ClientError>>) -> EventStream {
        Box::pin(futures::stream::iter(events))
    }

    fn content(text: &str) -> Result<StreamEvent, ClientError> {
        Ok(StreamEvent::Content(text.to_string()))
    }

    fn finished() -> Result<StreamEvent, ClientError> {
        Ok(StreamEvent::Finished(FinishReason::Stop))
    }

    async fn agent_with(client: MockClient) -> (SimpleAgent, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_client(
            ConfigParameters::for_workspace(dir.path()),
            Arc::new(client),
        );
        let agent = SimpleAgent::with_config(config).await.unwrap();
        (agent, dir)
    }

    fn ready_client() -> MockClient {
        let mut client = MockClient::new();
        client.expect_is_initialized().return_const(true);
        client.expect_initialize().never();
        client
    }

    async fn agent_streaming<F>(script: F) -> (SimpleAgent, tempfile::TempDir)
    where
        F: Fn() -> Vec<Result<StreamEvent, ClientError>> + Send + 'static,
    {
        let mut client = ready_client();
        client
            .expect_send_message_stream()
            .returning(move |_, _, _| Ok(scripted(script())));
        agent_with(client).await
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let (agent, _dir) = agent_streaming(|| vec![content("pong"), finished()]).await;

        let mut chunks = Vec::new();
        let mut on_chunk = |chunk: &str| chunks.push(chunk.to_string());
        let text = assert_ok!(agent.send_message("ping", Some(&mut on_chunk)).await);

        assert_eq!(text, "pong");
        assert_eq!(chunks, vec!["pong"]);
    }

    #[tokio::test]
    async fn chunks_are_concatenated_in_order() {
        let (agent, _dir) = agent_streaming(|| {
            vec![
                content("a"),
                Ok(StreamEvent::Usage(Usage::default())),
                content("b"),
                content("c"),
                finished(),
                content("ignored"),
            ]
        })
        .await;

        let mut chunks = Vec::new();
        let mut on_chunk = |chunk: &str| chunks.push(chunk.to_string());
        let text = agent.send_message("hi", Some(&mut on_chunk)).await.unwrap();

        assert_eq!(text, "abc");
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stream_end_without_finish_returns_accumulated() {
        let (agent, _dir) = agent_streaming(|| vec![content("part"), content("ial")]).await;

        let text = agent.send_message("hi", None).await.unwrap();
        assert_eq!(text, "partial");
    }

    #[tokio::test]
    async fn error_event_fails_with_its_message() {
        let (agent, _dir) = agent_streaming(|| {
            vec![
                content("discarded"),
                Ok(StreamEvent::Error {
                    message: Some("X".to_string()),
                }),
            ]
        })
        .await;

        let err = assert_err!(agent.send_message("hi", None).await);
        assert!(matches!(err, AgentError::Stream(_)));
        assert_eq!(err.to_string(), "X");
    }

    #[tokio::test]
    async fn error_event_without_message_uses_default() {
        let (agent, _dir) =
            agent_streaming(|| vec![Ok(StreamEvent::Error { message: None })]).await;

        let err = agent.send_message("hi", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown error occurred");
    }

    #[tokio::test]
    async fn tool_call_request_does_not_change_response() {
        let (agent, _dir) = agent_streaming(|| {
            vec![
                content("before "),
                Ok(StreamEvent::ToolCallRequest(ToolCallRequest {
                    call_id: "call_1".to_string(),
                    name: "read_file".to_string(),
                    args: serde_json::json!({"path": "a.txt"}),
                })),
                content("after"),
                finished(),
            ]
        })
        .await;

        let text = agent.send_message("hi", None).await.unwrap();
        assert_eq!(text, "before after");
    }

    #[tokio::test]
    async fn transport_error_propagates_unchanged() {
        let (agent, _dir) = agent_streaming(|| {
            vec![
                content("a"),
                Err(ClientError::InvalidResponse("bad frame".to_string())),
            ]
        })
        .await;

        let err = agent.send_message("hi", None).await.unwrap_err();
        assert!(matches!(err, AgentError::Client(ClientError::InvalidResponse(_))));
        assert_eq!(err.to_string(), "Invalid response: bad frame");
    }

    #[tokio::test]
    async fn open_failure_propagates_unchanged() {
        let mut client = ready_client();
        client
            .expect_send_message_stream()
            .returning(|_, _, _| Err(ClientError::RateLimited("slow down".to_string())));
        let (agent, _dir) = agent_with(client).await;

        let err = agent.send_message("hi", None).await.unwrap_err();
        assert!(matches!(err, AgentError::Client(ClientError::RateLimited(_))));
    }

    #[tokio::test]
    async fn transport_abort_is_normalized_to_cancelled() {
        let (agent, _dir) =
            agent_streaming(|| vec![content("a"), Err(ClientError::Aborted)]).await;

        let err = agent.send_message("hi", None).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(err.to_string(), "Request cancelled");
    }

    #[tokio::test]
    async fn external_cancel_fails_and_reaches_client() {
        let seen = Arc::new(Mutex::new(None::<CancellationToken>));
        let seen_in_mock = seen.clone();

        let mut client = ready_client();
        client
            .expect_send_message_stream()
            .returning(move |_, cancel, _| {
                *seen_in_mock.lock().unwrap() = Some(cancel);
                Ok(Box::pin(
                    futures::stream::iter(vec![content("partial")])
                        .chain(futures::stream::pending()),
                ))
            });
        let (agent, _dir) = agent_with(client).await;

        let parent = CancellationToken::new();
        let trigger = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = agent
            .send_message_with_cancel("hi", None, &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));

        let token = seen.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_one_call_leaves_others_running() {
        let mut client = ready_client();
        client
            .expect_send_message_stream()
            .returning(|message, _, _| {
                if message == "slow" {
                    Ok(Box::pin(futures::stream::pending::<Result<StreamEvent, ClientError>>()))
                } else {
                    Ok(scripted(vec![content("done"), finished()]))
                }
            });
        let (agent, _dir) = agent_with(client).await;

        let slow_cancel = CancellationToken::new();
        let fast_cancel = CancellationToken::new();
        slow_cancel.cancel();

        let (slow, fast) = tokio::join!(
            agent.send_message_with_cancel("slow", None, &slow_cancel),
            agent.send_message_with_cancel("fast", None, &fast_cancel),
        );

        assert!(matches!(slow, Err(AgentError::Cancelled)));
        assert_eq!(fast.unwrap(), "done");
        assert!(!fast_cancel.is_cancelled());
    }

    #[tokio::test]
    async fn concurrent_calls_use_distinct_prompt_ids() {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let ids_in_mock = ids.clone();

        let mut client = ready_client();
        client
            .expect_send_message_stream()
            .times(2)
            .returning(move |_, _, prompt_id| {
                ids_in_mock.lock().unwrap().push(prompt_id.to_string());
                Ok(scripted(vec![finished()]))
            });
        let (agent, _dir) = agent_with(client).await;

        let (a, b) = tokio::join!(agent.send_message("one", None), agent.send_message("two", None));
        a.unwrap();
        b.unwrap();

        let ids = ids.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(|id| id.starts_with(agent.session_id())));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let mut client = ready_client();
        client.expect_send_message_stream().never();
        let (agent, _dir) = agent_with(client).await;

        let err = agent.send_message("   ", None).await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyMessage));
    }

    #[tokio::test]
    async fn create_initializes_uninitialized_client() {
        let mut client = MockClient::new();
        client.expect_is_initialized().times(1).return_const(false);
        client.expect_initialize().times(1).returning(|| Ok(()));
        let (agent, dir) = agent_with(client).await;

        assert_eq!(agent.config().target_dir(), dir.path());
        assert_eq!(agent.config().working_dir(), dir.path());
    }

    #[tokio::test]
    async fn client_init_failure_yields_no_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MockClient::new();
        client.expect_is_initialized().return_const(false);
        client
            .expect_initialize()
            .returning(|| Err(ClientError::Auth("no credentials".to_string())));
        let config = Config::with_client(
            ConfigParameters::for_workspace(dir.path()),
            Arc::new(client),
        );

        let err = SimpleAgent::with_config(config).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Initialization(ConfigError::Client(ClientError::Auth(_)))
        ));
    }

    #[tokio::test]
    async fn create_fails_for_missing_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let err = SimpleAgent::create(dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Initialization(ConfigError::WorkspaceNotFound(_))
        ));
    }
}
