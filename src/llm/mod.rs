pub mod groq;
pub mod ollama;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::chat::Message;
use self::groq::GroqProvider;
use self::ollama::OllamaProvider;

/// Deadline for the lightweight connectivity probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for a full completion.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefixes some backends put in front of an error they return as reply text.
const ERROR_SENTINELS: &[&str] = &["GROQ_ERROR:", "OLLAMA_ERROR:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Groq,
    Ollama,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(LlmType::Groq),
            "ollama" => Ok(LlmType::Ollama),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}' (expected 'groq' or 'ollama')", s),
                }),
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmType::Groq => write!(f, "groq"),
            LlmType::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Groq,
            api_key: None,
            model: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider credential is not configured")]
    NotConfigured,
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("model '{0}' not found")]
    ModelNotFound(String),
    #[error("provider request timed out")]
    Timeout,
    #[error("provider error: {0}")]
    Generic(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Unreachable(err.to_string())
        } else {
            ProviderError::Generic(err.to_string())
        }
    }
}

/// A text-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends the system prompt, prior history and the new user message, and
    /// returns the assistant's reply.
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        message: &str,
        timeout: Duration
    ) -> Result<String, ProviderError>;

    /// Minimal round-trip against the backend. Never fails; the flag says
    /// whether the backend is usable and the string says why.
    async fn check_connection(&self) -> (bool, String);

    fn llm_type(&self) -> LlmType;
    fn model(&self) -> String;
    fn base_url(&self) -> Option<String>;

    /// False when the provider is running without a required credential.
    fn is_configured(&self) -> bool {
        true
    }
}

pub fn build_messages(system_prompt: &str, history: &[Message], message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(Message::user(message));
    messages
}

/// Whether a reply is really an error the backend passed back as text.
pub fn is_error_sentinel(response: &str) -> bool {
    let trimmed = response.trim_start();
    ERROR_SENTINELS.iter().any(|prefix| trimmed.starts_with(prefix))
}

/// Shortens an upstream error body for logs and error values.
pub(crate) fn truncate_detail(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

pub fn new_provider(
    config: &LlmConfig
) -> Result<Arc<dyn CompletionProvider>, Box<dyn StdError + Send + Sync>> {
    let provider: Arc<dyn CompletionProvider> = match config.llm_type {
        LlmType::Groq => Arc::new(GroqProvider::from_config(config)?),
        LlmType::Ollama => Arc::new(OllamaProvider::from_config(config)?),
    };
    Ok(provider)
}
