use axum::body::Bytes;
use serde::{Deserialize, Serialize};

/// Body of `POST /chat/stream`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's prompt; may be empty
    pub prompt: String,
    /// Scopes conversation history; absent means the default session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// One NDJSON record of a streamed reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub content: String,
    #[serde(default)]
    pub is_final: bool,
}

impl ChatChunk {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
        }
    }

    /// Record that closes every successful stream
    pub fn terminal() -> Self {
        Self {
            content: String::new(),
            is_final: true,
        }
    }

    /// Serialize as one newline-terminated JSON line
    pub fn to_ndjson(&self) -> Result<Bytes, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_optional() {
        let request: ChatRequest = serde_json::from_str(r#"{"prompt": "hi"}"#).unwrap();
        assert_eq!(request.prompt, "hi");
        assert_eq!(request.session_id, None);
    }

    #[test]
    fn prompt_is_required() {
        let result = serde_json::from_str::<ChatRequest>(r#"{"session_id": "abc"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn is_final_defaults_to_false() {
        let chunk: ChatChunk = serde_json::from_str(r#"{"content": "x"}"#).unwrap();
        assert!(!chunk.is_final);
    }

    #[test]
    fn terminal_record_is_one_json_line() {
        let line = ChatChunk::terminal().to_ndjson().unwrap();
        assert_eq!(&line[..], b"{\"content\":\"\",\"is_final\":true}\n");
    }
}
