use async_trait::async_trait;
use openai_dive::v1::api::Client;
use std::sync::Arc;
use tracing::debug;

use super::{Agent, AgentFactory, OpenAiAgent, DEFAULT_SESSION_ID};
use crate::config::Settings;
use crate::error::AgentError;
use crate::session::SessionStore;

/// Builds [`OpenAiAgent`]s bound to the configured model and credential,
/// attached to their session's history. A session takes a slot in the
/// store only once one of its runs records a turn.
pub struct OpenAiAgentFactory {
    settings: Arc<Settings>,
    sessions: Arc<SessionStore>,
    add_history_to_context: bool,
}

impl OpenAiAgentFactory {
    pub fn new(settings: Arc<Settings>) -> Self {
        let sessions = Arc::new(SessionStore::new(
            settings.max_sessions,
            settings.history_runs,
        ));
        Self::with_sessions(settings, sessions)
    }

    pub fn with_sessions(settings: Arc<Settings>, sessions: Arc<SessionStore>) -> Self {
        Self {
            settings,
            sessions,
            add_history_to_context: true,
        }
    }

    /// Build agents that ignore and do not record session history
    pub fn with_history_in_context(mut self, enabled: bool) -> Self {
        self.add_history_to_context = enabled;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

#[async_trait]
impl AgentFactory for OpenAiAgentFactory {
    async fn create_agent(&self, session_id: Option<&str>) -> Result<Arc<dyn Agent>, AgentError> {
        if self.settings.api_key.trim().is_empty() {
            return Err(AgentError::Config(
                "OPENAI_API_KEY is not set in environment".to_string(),
            ));
        }

        let session_id = session_id.unwrap_or(DEFAULT_SESSION_ID);
        debug!("[{}] Building agent on {}", session_id, self.settings.model);

        let client = Client::new(self.settings.api_key.clone());
        Ok(Arc::new(OpenAiAgent::new(
            client,
            self.settings.model.clone(),
            session_id,
            self.sessions.clone(),
            self.settings.history_runs,
        )
        .with_history_in_context(self.add_history_to_context)))
    }
}
