use thiserror::Error;

use crate::config::ConfigError;

/// Failures raised while building or running an agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("upstream model error: {0}")]
    Upstream(String),
    #[error("agent run cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for AgentError {
    fn from(err: ConfigError) -> Self {
        AgentError::Config(err.to_string())
    }
}
