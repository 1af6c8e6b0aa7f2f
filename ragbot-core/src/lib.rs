pub mod agent;
pub mod config;
pub mod error;
pub mod session;

pub use agent::{Agent, AgentFactory, EchoAgentFactory, Fragment, FragmentSink, OpenAiAgentFactory};
pub use config::{ConfigError, Settings};
pub use error::AgentError;
pub use session::SessionStore;
