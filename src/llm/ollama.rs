use reqwest::{ Client as HttpClient, StatusCode };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::time::Duration;
use async_trait::async_trait;
use log::{ info, warn };

use super::{ build_messages, truncate_detail, CompletionProvider, LlmConfig, LlmType, ProviderError, PROBE_TIMEOUT };
use crate::models::chat::Message;

const DEFAULT_MODEL: &str = "llama3.1";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// A self-hosted Ollama service.
#[derive(Debug)]
pub struct OllamaProvider {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaProvider".into());
        }
        if let Some(url) = &config.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Invalid Ollama URL '{}': expected http(s)://", url).into());
            }
        }

        Ok(Self::new(config.base_url.clone(), config.model.clone()))
    }

    fn unreachable(&self, err: reqwest::Error) -> ProviderError {
        match ProviderError::from(err) {
            ProviderError::Unreachable(_) =>
                ProviderError::Unreachable(
                    format!("Cannot connect to Ollama. Make sure it's running on {}", self.base_url)
                ),
            other => other,
        }
    }

    /// Names of the models the service currently has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.http
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send().await
            .map_err(|e| self.unreachable(e))?;

        if !resp.status().is_success() {
            return Err(
                ProviderError::Generic(format!("Ollama not responding (status: {})", resp.status()))
            );
        }
        let tags = resp.json::<TagsResponse>().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Ollama lists models with a tag suffix (`llama3.1:latest`), so a
    /// configured bare name matches any tagged variant.
    fn has_model(&self, available: &[String]) -> bool {
        available.iter().any(|name| name.contains(&self.model))
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        message: &str,
        timeout: Duration
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let messages = build_messages(system_prompt, history, message);
        let req = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
        };

        let resp = self.http
            .post(&url)
            .json(&req)
            .timeout(timeout)
            .send().await
            .map_err(|e| self.unreachable(e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::ModelNotFound(self.model.clone()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Generic(format!("{} - {}", status, truncate_detail(&body))));
        }

        let data = resp.json::<ChatResponse>().await?;
        if data.message.content.trim().is_empty() {
            return Err(ProviderError::Generic("Ollama returned an empty reply".to_string()));
        }
        Ok(data.message.content)
    }

    async fn check_connection(&self) -> (bool, String) {
        match self.list_models().await {
            Ok(models) if self.has_model(&models) => {
                info!("Ollama reachable at {} with model {}", self.base_url, self.model);
                (true, "Connected".to_string())
            }
            Ok(models) => {
                let err = ProviderError::ModelNotFound(self.model.clone());
                warn!("{} on {}", err, self.base_url);
                (false, format!("Model '{}' not found. Available models: {:?}", self.model, models))
            }
            Err(ProviderError::Unreachable(msg)) => (false, msg),
            Err(e) => (false, format!("Error: {}", e)),
        }
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Ollama
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
