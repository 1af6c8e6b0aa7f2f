use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Agent, AgentFactory, Fragment, FragmentSink, AGENT_NAME, DEFAULT_SESSION_ID};
use crate::error::AgentError;

/// Delay between words when simulating token output
pub const DEFAULT_ECHO_DELAY: Duration = Duration::from_millis(100);

/// Offline agent that streams the prompt back one word at a time.
/// Used as a development backend and in tests.
pub struct EchoAgent {
    session_id: String,
    delay: Duration,
}

impl EchoAgent {
    pub fn new(session_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            delay,
        }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn run(
        &self,
        prompt: &str,
        sink: FragmentSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        for word in prompt.split_whitespace() {
            let Some(fragment) = Fragment::content(format!("{} ", word)) else {
                continue;
            };
            if !sink.send(fragment).await {
                return Err(AgentError::Cancelled);
            }
            if !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EchoAgentFactory {
    delay: Duration,
}

impl EchoAgentFactory {
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_ECHO_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoAgentFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentFactory for EchoAgentFactory {
    async fn create_agent(&self, session_id: Option<&str>) -> Result<Arc<dyn Agent>, AgentError> {
        let session_id = session_id.unwrap_or(DEFAULT_SESSION_ID);
        Ok(Arc::new(EchoAgent::new(session_id, self.delay)))
    }
}
