use serde::{ Serialize, Deserialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Body of `POST /api/v1/chat`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Why a reply was served from the canned fallback templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// The pre-flight connection probe reported the provider as down.
    ProviderOffline,
    /// The completion call ran past its deadline.
    Timeout,
    /// The completion call failed, or returned an in-band error.
    ProviderError,
}

/// Result of one chat turn, as returned to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResult {
    pub response: String,
    pub conversation_id: String,
    /// Unix time, in seconds, at which the reply was produced.
    pub timestamp: f64,
    /// Seconds spent handling the request.
    pub processing_time: f64,
    #[serde(skip)]
    pub fallback: Option<FallbackReason>,
}

impl ChatResult {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}
