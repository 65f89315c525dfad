pub mod fallback;

use chrono::Utc;
use log::{ debug, info, warn };
use serde::Serialize;
use sha2::{ Digest, Sha256 };
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::Arc;
use std::time::{ Duration, Instant };
use thiserror::Error;

use crate::config::persona::PersonaConfig;
use crate::history::{ format_history_for_log, ConversationStore };
use crate::knowledge::{ build_system_prompt, KnowledgeStore };
use crate::llm::{ is_error_sentinel, CompletionProvider, ProviderError, COMPLETION_TIMEOUT };
use crate::models::chat::{ ChatRequest, ChatResult, FallbackReason, Message };
use crate::ratelimit::RateLimiter;
use self::fallback::FallbackPolicy;

pub const MAX_MESSAGE_CHARS: usize = 500;
pub const MAX_CONVERSATION_ID_CHARS: usize = 128;
/// Length of generated conversation ids (hex characters).
pub const CONVERSATION_ID_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Rate limit exceeded. Maximum {max_requests} requests per {window_secs} seconds.")]
    RateLimited {
        max_requests: usize,
        window_secs: u64,
    },
    #[error(
        "Chatbot service unavailable. Configure the chat provider (CHAT_LLM_TYPE with GROQ_API_KEY or OLLAMA_URL) and restart."
    )]
    ServiceUnavailable,
    #[error("{0}")]
    Validation(String),
    #[error("Conversation not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceStats {
    pub active_conversations: usize,
    pub rate_limit_entries: usize,
    pub dataset_categories: usize,
}

/// Runs chat turns: rate limiting, provider call, fallback and history.
///
/// The service owns the conversation store and the rate limiter and is the
/// only thing that mutates them.
pub struct ChatService {
    provider: Option<Arc<dyn CompletionProvider>>,
    knowledge: KnowledgeStore,
    persona: Arc<PersonaConfig>,
    system_prompt: String,
    conversations: ConversationStore,
    limiter: RateLimiter,
    fallback: FallbackPolicy,
    completion_timeout: Duration,
    started: Instant,
    id_seq: AtomicU64,
}

impl ChatService {
    pub fn new(
        provider: Option<Arc<dyn CompletionProvider>>,
        knowledge: KnowledgeStore,
        persona: Arc<PersonaConfig>,
        limiter: RateLimiter
    ) -> Self {
        let system_prompt = build_system_prompt(knowledge.entries(), &persona);
        Self {
            provider,
            knowledge,
            fallback: FallbackPolicy::new(Arc::clone(&persona)),
            persona,
            system_prompt,
            conversations: ConversationStore::default(),
            limiter,
            completion_timeout: COMPLETION_TIMEOUT,
            started: Instant::now(),
            id_seq: AtomicU64::new(0),
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn provider(&self) -> Option<&Arc<dyn CompletionProvider>> {
        self.provider.as_ref()
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Counts a request against `client_id`'s quota.
    pub async fn admit(&self, client_id: &str) -> Result<(), ChatError> {
        if self.limiter.admit(client_id, Instant::now()).await {
            Ok(())
        } else {
            warn!("Rate limit exceeded for client {}", client_id);
            Err(ChatError::RateLimited {
                max_requests: self.limiter.max_requests(),
                window_secs: self.limiter.window().as_secs(),
            })
        }
    }

    /// Handles one chat turn for `client_id`.
    ///
    /// Provider failures never surface as errors: they produce a canned
    /// fallback reply instead. Only rate limiting, bad input and a missing
    /// provider are returned as `Err`.
    pub async fn chat(&self, client_id: &str, request: ChatRequest) -> Result<ChatResult, ChatError> {
        let start = Instant::now();

        self.admit(client_id).await?;
        let message = validate_message(&request.message)?;
        let supplied_id = validate_conversation_id(request.conversation_id.as_deref())?;

        let provider = match &self.provider {
            Some(p) => Arc::clone(p),
            None => return Err(ChatError::ServiceUnavailable),
        };

        let conversation_id = match supplied_id {
            Some(id) => id.to_string(),
            None => self.generate_conversation_id(client_id),
        };

        let (connected, status) = provider.check_connection().await;
        if !connected {
            warn!("Provider offline for client {}: {}", client_id, status);
            return Ok(self.fallback_result(message, conversation_id, FallbackReason::ProviderOffline, start));
        }

        let history = self.conversations.get(&conversation_id).await;
        debug!("Conversation {} history:\n{}", conversation_id, format_history_for_log(&history));

        let completion = tokio::time::timeout(
            self.completion_timeout,
            provider.complete(&self.system_prompt, &history, message, self.completion_timeout)
        ).await.unwrap_or(Err(ProviderError::Timeout));

        let response = match completion {
            Ok(text) if is_error_sentinel(&text) => {
                warn!("Provider returned an in-band error for client {}: {}", client_id, text);
                return Ok(self.fallback_result(message, conversation_id, FallbackReason::ProviderError, start));
            }
            Ok(text) => text,
            Err(e) => {
                let reason = if e.is_timeout() {
                    FallbackReason::Timeout
                } else {
                    FallbackReason::ProviderError
                };
                warn!("Completion failed for client {}: {}", client_id, e);
                return Ok(self.fallback_result(message, conversation_id, reason, start));
            }
        };

        self.conversations
            .append(&conversation_id, Message::user(message), Message::assistant(response.clone()))
            .await;

        let processing_time = start.elapsed().as_secs_f64();
        info!("Chat response generated in {:.2}s for client {}", processing_time, client_id);

        Ok(ChatResult {
            response,
            conversation_id,
            timestamp: unix_now(),
            processing_time,
            fallback: None,
        })
    }

    pub async fn conversation(&self, conversation_id: &str) -> Vec<Message> {
        self.conversations.get(conversation_id).await
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        if self.conversations.clear(conversation_id).await {
            info!("Conversation {} cleared", conversation_id);
            Ok(())
        } else {
            Err(ChatError::NotFound(conversation_id.to_string()))
        }
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            active_conversations: self.conversations.len().await,
            rate_limit_entries: self.limiter.size().await,
            dataset_categories: self.knowledge.categories().len(),
        }
    }

    fn fallback_result(
        &self,
        message: &str,
        conversation_id: String,
        reason: FallbackReason,
        start: Instant
    ) -> ChatResult {
        ChatResult {
            response: self.fallback.respond(message, reason),
            conversation_id,
            timestamp: unix_now(),
            processing_time: start.elapsed().as_secs_f64(),
            fallback: Some(reason),
        }
    }

    /// Hash of the client, the current time and a per-process sequence
    /// number, so two requests in the same instant still get distinct ids.
    fn generate_conversation_id(&self, client_id: &str) -> String {
        let seq = self.id_seq.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let digest = Sha256::digest(format!("{}_{}_{}", client_id, nanos, seq).as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(CONVERSATION_ID_LEN);
        id
    }
}

fn unix_now() -> f64 {
    (Utc::now().timestamp_micros() as f64) / 1_000_000.0
}

fn validate_message(message: &str) -> Result<&str, ChatError> {
    let len = message.chars().count();
    if message.trim().is_empty() {
        return Err(ChatError::Validation("message must not be empty".to_string()));
    }
    if len > MAX_MESSAGE_CHARS {
        return Err(
            ChatError::Validation(
                format!("message must be at most {} characters (got {})", MAX_MESSAGE_CHARS, len)
            )
        );
    }
    Ok(message)
}

fn validate_conversation_id(id: Option<&str>) -> Result<Option<&str>, ChatError> {
    match id.map(str::trim) {
        None | Some("") => Ok(None),
        Some(id) if id.chars().count() > MAX_CONVERSATION_ID_CHARS => {
            Err(
                ChatError::Validation(
                    format!("conversation_id must be at most {} characters", MAX_CONVERSATION_ID_CHARS)
                )
            )
        }
        Some(id) => Ok(Some(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmType;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Provider whose probe result and completion outcomes are scripted.
    struct ScriptedProvider {
        connected: bool,
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        delay: Option<Duration>,
        /// Only this message is delayed; `None` delays every completion.
        slow_for: Option<&'static str>,
        seen_history: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(connected: bool, replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                connected,
                replies: Mutex::new(replies),
                delay: None,
                slow_for: None,
                seen_history: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            _system_prompt: &str,
            history: &[Message],
            message: &str,
            _timeout: Duration
        ) -> Result<String, ProviderError> {
            self.seen_history.lock().unwrap().push(history.len());
            if let Some(delay) = self.delay {
                if self.slow_for.map_or(true, |m| m == message) {
                    tokio::time::sleep(delay).await;
                }
            }
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok("ok".to_string())
            } else {
                replies.remove(0)
            }
        }

        async fn check_connection(&self) -> (bool, String) {
            if self.connected {
                (true, "Connected".into())
            } else {
                (false, "down".into())
            }
        }

        fn llm_type(&self) -> LlmType {
            LlmType::Ollama
        }

        fn model(&self) -> String {
            "scripted".into()
        }

        fn base_url(&self) -> Option<String> {
            None
        }
    }

    fn service(provider: Option<Arc<dyn CompletionProvider>>, max_requests: u32) -> ChatService {
        ChatService::new(
            provider,
            KnowledgeStore::default(),
            Arc::new(PersonaConfig::default()),
            RateLimiter::new(max_requests, Duration::from_secs(60))
        )
    }

    fn request(message: &str, id: Option<&str>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            conversation_id: id.map(String::from),
        }
    }

    #[tokio::test]
    async fn success_persists_exchange_and_reuses_id() {
        let provider = Arc::new(ScriptedProvider::new(true, vec![Ok("first".into()), Ok("second".into())]));
        let svc = service(Some(provider.clone()), 10);

        let first = svc.chat("1.1.1.1", request("hello", None)).await.unwrap();
        assert_eq!(first.response, "first");
        assert_eq!(first.conversation_id.len(), CONVERSATION_ID_LEN);
        assert!(!first.is_fallback());
        assert!(first.processing_time >= 0.0);

        let second = svc.chat("1.1.1.1", request("again", Some(&first.conversation_id))).await.unwrap();
        assert_eq!(second.conversation_id, first.conversation_id);

        let history = svc.conversation(&first.conversation_id).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].content, "second");
        assert_eq!(*provider.seen_history.lock().unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn offline_provider_gets_fallback_without_history() {
        let svc = service(Some(Arc::new(ScriptedProvider::new(false, vec![]))), 10);
        let result = svc.chat("c", request("Tell me about yourself", None)).await.unwrap();

        assert_eq!(result.fallback, Some(FallbackReason::ProviderOffline));
        assert_eq!(result.conversation_id.len(), CONVERSATION_ID_LEN);
        assert!(result.response.contains("AI knowledge database"));
        assert!(svc.conversation(&result.conversation_id).await.is_empty());
    }

    #[tokio::test]
    async fn provider_errors_become_tagged_fallbacks() {
        let provider = ScriptedProvider::new(
            true,
            vec![
                Err(ProviderError::Timeout),
                Err(ProviderError::Unreachable("refused".into())),
                Ok("GROQ_ERROR: quota".into())
            ]
        );
        let svc = service(Some(Arc::new(provider)), 10);

        let timeout = svc.chat("c", request("hi", Some("conv"))).await.unwrap();
        assert_eq!(timeout.fallback, Some(FallbackReason::Timeout));
        assert!(timeout.response.contains("timed out"));

        let error = svc.chat("c", request("hi", Some("conv"))).await.unwrap();
        assert_eq!(error.fallback, Some(FallbackReason::ProviderError));
        assert!(!error.response.contains("refused"));

        let sentinel = svc.chat("c", request("hi", Some("conv"))).await.unwrap();
        assert_eq!(sentinel.fallback, Some(FallbackReason::ProviderError));
        assert!(!sentinel.response.contains("GROQ_ERROR"));

        assert!(svc.conversation("conv").await.is_empty());
    }

    #[tokio::test]
    async fn slow_provider_hits_hard_timeout() {
        let mut provider = ScriptedProvider::new(true, vec![]);
        provider.delay = Some(Duration::from_secs(5));
        let svc = service(Some(Arc::new(provider)), 10).with_completion_timeout(Duration::from_millis(50));

        let result = svc.chat("c", request("hi", None)).await.unwrap();
        assert_eq!(result.fallback, Some(FallbackReason::Timeout));
    }

    #[tokio::test]
    async fn missing_provider_is_unavailable() {
        let svc = service(None, 10);
        let err = svc.chat("c", request("hi", None)).await.unwrap_err();
        assert_eq!(err, ChatError::ServiceUnavailable);
    }

    #[tokio::test]
    async fn rate_limit_checked_before_anything_else() {
        let svc = service(None, 1);
        assert_eq!(svc.chat("c", request("hi", None)).await.unwrap_err(), ChatError::ServiceUnavailable);
        assert!(matches!(
            svc.chat("c", request("hi", None)).await.unwrap_err(),
            ChatError::RateLimited { max_requests: 1, window_secs: 60 }
        ));
    }

    #[tokio::test]
    async fn validates_message_length() {
        let svc = service(Some(Arc::new(ScriptedProvider::new(true, vec![]))), 10);
        assert!(matches!(svc.chat("c", request("   ", None)).await, Err(ChatError::Validation(_))));

        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(svc.chat("c", request(&long, None)).await, Err(ChatError::Validation(_))));

        let max = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(svc.chat("c", request(&max, None)).await.is_ok());
    }

    #[tokio::test]
    async fn generated_ids_are_distinct() {
        let svc = service(None, 10);
        let a = svc.generate_conversation_id("same");
        let b = svc.generate_conversation_id("same");
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn clear_and_stats() {
        let svc = service(Some(Arc::new(ScriptedProvider::new(true, vec![]))), 10);
        svc.chat("a", request("hi", Some("x"))).await.unwrap();
        svc.chat("b", request("hi", Some("y"))).await.unwrap();

        let stats = svc.stats().await;
        assert_eq!(stats.active_conversations, 2);
        assert_eq!(stats.rate_limit_entries, 2);
        assert_eq!(stats.dataset_categories, 0);

        assert!(svc.clear_conversation("x").await.is_ok());
        assert!(svc.conversation("x").await.is_empty());
        assert_eq!(svc.clear_conversation("x").await, Err(ChatError::NotFound("x".into())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_completion_does_not_block_other_clients() {
        let mut provider = ScriptedProvider::new(true, vec![]);
        provider.delay = Some(Duration::from_secs(10));
        provider.slow_for = Some("slow");
        let svc = Arc::new(service(Some(Arc::new(provider)), 10));

        let parked = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.chat("slow-client", request("slow", Some("parked"))).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let quick = Duration::from_secs(1);
        tokio::time::timeout(quick, svc.admit("other")).await.expect("admit blocked").unwrap();
        let stats = tokio::time::timeout(quick, svc.stats()).await.expect("stats blocked");
        assert_eq!(stats.rate_limit_entries, 2);

        let reply = tokio::time::timeout(quick, svc.chat("other", request("fast", Some("fast"))))
            .await
            .expect("chat blocked")
            .unwrap();
        assert_eq!(reply.response, "ok");
        assert_eq!(svc.conversation("fast").await.len(), 2);

        assert!(!parked.is_finished());
        parked.abort();
    }
}
