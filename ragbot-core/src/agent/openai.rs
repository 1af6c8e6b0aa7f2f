use async_trait::async_trait;
use futures::StreamExt;
use openai_dive::v1::api::Client;
use openai_dive::v1::resources::chat::{
    ChatCompletionParametersBuilder, ChatMessage, ChatMessageContent, ChatMessageContentPart,
    DeltaChatMessage,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Agent, Fragment, FragmentSink, AGENT_NAME};
use crate::error::AgentError;
use crate::session::{SessionStore, Turn};

/// Agent backed by an OpenAI chat model, streaming deltas as fragments
pub struct OpenAiAgent {
    client: Client,
    model: String,
    session_id: String,
    sessions: Arc<SessionStore>,
    history_runs: usize,
    add_history_to_context: bool,
}

impl OpenAiAgent {
    pub fn new(
        client: Client,
        model: impl Into<String>,
        session_id: impl Into<String>,
        sessions: Arc<SessionStore>,
        history_runs: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            session_id: session_id.into(),
            sessions,
            history_runs,
            add_history_to_context: true,
        }
    }

    /// Whether earlier turns are sent with the prompt and the new turn is
    /// recorded (on by default)
    pub fn with_history_in_context(mut self, enabled: bool) -> Self {
        self.add_history_to_context = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn add_history_to_context(&self) -> bool {
        self.add_history_to_context
    }

    /// Recent turns of the session followed by the new prompt
    async fn build_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        if self.add_history_to_context {
            let turns = self.sessions.recent(&self.session_id, self.history_runs).await;
            for turn in turns {
                messages.push(user_message(turn.prompt));
                messages.push(assistant_message(turn.reply));
            }
        }

        messages.push(user_message(prompt.to_string()));
        messages
    }

    /// Store the finished exchange; refusals count as the reply
    async fn record_turn(&self, prompt: &str, reply: String) {
        if !self.add_history_to_context {
            return;
        }
        self.sessions
            .record(
                &self.session_id,
                Turn {
                    prompt: prompt.to_string(),
                    reply,
                },
            )
            .await;
    }
}

#[async_trait]
impl Agent for OpenAiAgent {
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
        let messages = self.build_messages(prompt).await;
        debug!(
            "[{}] Sending {} message(s) to {}",
            self.session_id,
            messages.len(),
            self.model
        );

        let parameters = ChatCompletionParametersBuilder::default()
            .model(self.model.clone())
            .messages(messages)
            .build()
            .map_err(|e| AgentError::Upstream(format!("Invalid request parameters: {}", e)))?;

        let chat = self.client.chat();
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            opened = chat.create_stream(parameters) => {
                opened.map_err(|e| AgentError::Upstream(e.to_string()))?
            }
        };

        let mut reply = String::new();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| AgentError::Upstream(e.to_string()))?;

            for choice in chunk.choices {
                let Some(fragment) = fragment_from_delta(choice.delta) else {
                    continue;
                };
                reply.push_str(fragment.text());
                if !sink.send(fragment).await {
                    return Err(AgentError::Cancelled);
                }
            }
        }

        self.record_turn(prompt, reply).await;
        Ok(())
    }
}

fn user_message(text: String) -> ChatMessage {
    ChatMessage::User {
        content: ChatMessageContent::Text(text),
        name: None,
    }
}

fn assistant_message(text: String) -> ChatMessage {
    ChatMessage::Assistant {
        content: Some(ChatMessageContent::Text(text)),
        tool_calls: None,
        name: None,
        audio: None,
        reasoning: None,
        reasoning_content: None,
        refusal: None,
    }
}

/// Map one streamed delta onto the fragment contract. Content wins over a
/// refusal carried by the same delta; empty text yields nothing.
fn fragment_from_delta(delta: DeltaChatMessage) -> Option<Fragment> {
    match delta {
        DeltaChatMessage::Assistant {
            content, refusal, ..
        }
        | DeltaChatMessage::Untagged {
            content, refusal, ..
        } => content
            .and_then(content_text)
            .and_then(Fragment::content)
            .or_else(|| refusal.and_then(Fragment::refusal)),
        _ => None,
    }
}

fn content_text(content: ChatMessageContent) -> Option<String> {
    match content {
        ChatMessageContent::Text(text) => Some(text),
        ChatMessageContent::ContentPart(parts) => {
            let text = parts
                .iter()
                .filter_map(|p| match p {
                    ChatMessageContentPart::Text(text_part) => Some(text_part.text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            Some(text)
        }
        ChatMessageContent::None => None,
    }
}
