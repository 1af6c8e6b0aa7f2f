use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Env file read next to the working directory when no other path is given
pub const DEFAULT_ENV_FILE: &str = ".env";
/// Lightweight model used for streaming replies
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HISTORY_RUNS: usize = 3;
pub const DEFAULT_MAX_SESSIONS: usize = 100;
pub const DEFAULT_STREAM_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set in environment")]
    MissingApiKey,
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("missing or invalid environment variables: {0}")]
    Source(#[from] config::ConfigError),
}

/// Shape of the merged sources, keys are the lowercased variable names
#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    openai_api_key: String,
    app_host: String,
    app_port: u16,
    openai_model: String,
    app_history_runs: usize,
    app_max_sessions: usize,
    app_stream_buffer: usize,
}

/// Process-wide settings, built once at startup and handed out behind an `Arc`
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    /// Number of previous turns of a session included in the model context
    pub history_runs: usize,
    /// Cap on distinct live sessions (None = unlimited)
    pub max_sessions: Option<usize>,
    /// Capacity of the per-request fragment channel
    pub stream_buffer: usize,
}

impl Settings {
    /// Settings with every optional field at its default
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model: DEFAULT_MODEL.to_string(),
            history_runs: DEFAULT_HISTORY_RUNS,
            max_sessions: Some(DEFAULT_MAX_SESSIONS),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Load from the env file (if present) and the process environment.
    /// Environment variables win over the file.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(env_file, None)
    }

    /// Same as [`Settings::load`] but reads variables from `vars` instead of
    /// the process environment
    pub fn from_sources(
        env_file: Option<&Path>,
        vars: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        Self::build(env_file, Some(vars))
    }

    fn build(
        env_file: Option<&Path>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let env_file = env_file.unwrap_or_else(|| Path::new(DEFAULT_ENV_FILE));
        debug!("Loading settings (env file: {})", env_file.display());

        let raw: RawSettings = Config::builder()
            .set_default("app_host", DEFAULT_HOST)?
            .set_default("app_port", i64::from(DEFAULT_PORT))?
            .set_default("openai_model", DEFAULT_MODEL)?
            .set_default("app_history_runs", DEFAULT_HISTORY_RUNS as i64)?
            .set_default("app_max_sessions", DEFAULT_MAX_SESSIONS as i64)?
            .set_default("app_stream_buffer", DEFAULT_STREAM_BUFFER as i64)?
            .add_source(Environment::default().source(Some(read_env_file(env_file)?)))
            .add_source(Environment::default().source(vars))
            .build()?
            .try_deserialize()?;

        Self::try_from(raw)
    }

    /// Bind address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `KEY=value` pairs of an env file, keys lowercased to match the environment
/// source. A missing file yields no pairs.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }

    let pairs: HashMap<String, String> = Config::builder()
        .add_source(File::new(&path.to_string_lossy(), FileFormat::Ini))
        .build()?
        .try_deserialize()?;

    Ok(pairs
        .into_iter()
        .map(|(key, value)| {
            let key = key.trim();
            let key = key.strip_prefix("export ").unwrap_or(key).trim();
            (key.to_lowercase(), unquote(value.trim()).to_string())
        })
        .collect())
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q))
        .unwrap_or(value)
}

impl TryFrom<RawSettings> for Settings {
    type Error = ConfigError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let api_key = raw.openai_api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let host = raw.app_host.trim().to_string();
        if host.is_empty() {
            return Err(ConfigError::Invalid {
                field: "APP_HOST",
                reason: "must not be empty".to_string(),
            });
        }

        if raw.app_stream_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "APP_STREAM_BUFFER",
                reason: "must be at least 1".to_string(),
            });
        }

        let model = raw.openai_model.trim().to_string();
        if model.is_empty() {
            return Err(ConfigError::Invalid {
                field: "OPENAI_MODEL",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            api_key,
            host,
            port: raw.app_port,
            model,
            history_runs: raw.app_history_runs,
            max_sessions: (raw.app_max_sessions > 0).then_some(raw.app_max_sessions),
            stream_buffer: raw.app_stream_buffer,
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("model", &self.model)
            .field("history_runs", &self.history_runs)
            .field("max_sessions", &self.max_sessions)
            .field("stream_buffer", &self.stream_buffer)
            .finish()
    }
}
