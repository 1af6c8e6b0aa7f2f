mod echo;
mod factory;
mod fragment;
mod openai;

pub use echo::{EchoAgent, EchoAgentFactory};
pub use factory::OpenAiAgentFactory;
pub use fragment::Fragment;
pub use openai::OpenAiAgent;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;

/// Session used when a request does not name one
pub const DEFAULT_SESSION_ID: &str = "default";
/// Display name given to every agent built by the factories
pub const AGENT_NAME: &str = "RAGChatbotAgent";

/// Item carried from an agent worker to the streaming layer
pub type FragmentResult = Result<Fragment, AgentError>;

/// Write side of the per-request fragment channel handed to [`Agent::run`]
#[derive(Debug, Clone)]
pub struct FragmentSink {
    tx: Sender<FragmentResult>,
}

impl FragmentSink {
    pub fn new(tx: Sender<FragmentResult>) -> Self {
        Self { tx }
    }

    /// Push a fragment, waiting for room in the channel.
    /// Returns false once the reading side is gone.
    pub async fn send(&self, fragment: Fragment) -> bool {
        self.tx.send(Ok(fragment)).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A conversational agent bound to one model and one session
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn session_id(&self) -> &str;

    /// Run the agent on `prompt`, pushing fragments into `sink` in emission
    /// order. Implementations stop early when `cancel` fires or the sink
    /// closes.
    async fn run(
        &self,
        prompt: &str,
        sink: FragmentSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError>;
}

/// Builds agent handles scoped to a session
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// `None` maps to [`DEFAULT_SESSION_ID`]. The same id continues the same
    /// conversation.
    async fn create_agent(&self, session_id: Option<&str>) -> Result<Arc<dyn Agent>, AgentError>;
}
