use serde::{Deserialize, Serialize};

/// One unit of text produced by an agent during a single run.
///
/// Every variant carries a mandatory, non-empty text field. Empty text is
/// rejected once, when the fragment is built, so consumers never have to
/// guess whether a fragment holds anything worth forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    /// Assistant reply text
    Content { text: String },
    /// The model declined to answer; forwarded to the client like content
    Refusal { text: String },
}

impl Fragment {
    pub fn content(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        (!text.is_empty()).then_some(Fragment::Content { text })
    }

    pub fn refusal(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        (!text.is_empty()).then_some(Fragment::Refusal { text })
    }

    pub fn text(&self) -> &str {
        match self {
            Fragment::Content { text } | Fragment::Refusal { text } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Fragment::Content { text } | Fragment::Refusal { text } => text,
        }
    }
}
