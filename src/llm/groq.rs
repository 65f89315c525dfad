use async_trait::async_trait;
use log::{ info, warn };
use reqwest::{ Client as HttpClient, StatusCode, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::time::Duration;

use super::{ build_messages, truncate_detail, CompletionProvider, LlmConfig, LlmType, ProviderError, PROBE_TIMEOUT };
use crate::models::chat::Message;

const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq cloud inference through its OpenAI compatible chat completions API.
///
/// Without an API key the provider is built in a degraded state: every call
/// returns `ProviderError::NotConfigured` and no request leaves the process.
pub struct GroqProvider {
    http: Option<HttpClient>,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GroqRequest<'a> {
    messages: &'a [Message],
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct GroqResponse {
    choices: Vec<GroqChoice>,
}

#[derive(Deserialize)]
struct GroqChoice {
    message: GroqMessage,
}

#[derive(Deserialize)]
struct GroqMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqProvider {
    pub fn new(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let api_key = api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        let http = match api_key {
            Some(key) => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", key))
                        .map_err(|e| format!("Invalid API key format: {}", e))?
                );
                let client = HttpClient::builder()
                    .default_headers(headers)
                    .build()
                    .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;
                Some(client)
            }
            None => {
                warn!("No GROQ_API_KEY found, Groq provider starting in degraded mode");
                None
            }
        };

        Ok(Self { http, model, base_url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Groq {
            return Err("Invalid config type for GroqProvider".into());
        }
        Self::new(config.api_key.clone(), config.model.clone(), config.base_url.clone())
    }

    async fn send(
        &self,
        messages: &[Message],
        max_tokens: u32,
        timeout: Duration
    ) -> Result<String, ProviderError> {
        let http = self.http.as_ref().ok_or(ProviderError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let req = GroqRequest {
            messages,
            model: &self.model,
            temperature: 0.7,
            max_tokens,
        };

        let resp = http.post(&url).json(&req).timeout(timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, &self.model));
        }

        let parsed = resp.json::<GroqResponse>().await?;
        parsed.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::Generic("No response from Groq API".to_string()))
    }
}

fn classify_status(status: StatusCode, body: &str, model: &str) -> ProviderError {
    if status == StatusCode::NOT_FOUND || body.contains("model_not_found") {
        return ProviderError::ModelNotFound(model.to_string());
    }
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return ProviderError::Timeout;
    }
    ProviderError::Generic(format!("Groq API returned {}: {}", status, truncate_detail(body)))
}

#[async_trait]
impl CompletionProvider for GroqProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        message: &str,
        timeout: Duration
    ) -> Result<String, ProviderError> {
        let messages = build_messages(system_prompt, history, message);
        self.send(&messages, 1000, timeout).await
    }

    async fn check_connection(&self) -> (bool, String) {
        if self.http.is_none() {
            return (false, "GROQ_API_KEY environment variable not set".to_string());
        }
        info!("Testing Groq connection with model: {}", self.model);
        let probe = [Message::system("You are a test assistant."), Message::user("Hello")];
        match self.send(&probe, 10, PROBE_TIMEOUT).await {
            Ok(_) => (true, "Connected".to_string()),
            Err(e) => {
                warn!("Groq connection error: {}", e);
                (false, format!("Error: {}", e))
            }
        }
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Groq
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    fn is_configured(&self) -> bool {
        self.http.is_some()
    }
}
